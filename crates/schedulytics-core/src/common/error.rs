//! Error types for the job service.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a job operation can report. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate with `?` and clients receive the
//! matching status code.
//!
//! ## Error Cases
//! - `InvalidId`: A client supplied identifier is not a valid `ObjectId`.
//! - `MissingField`: A required message field was not set.
//! - `NotFound`: No stored document matches the identifier.
//! - `Store`: The document store failed or could not be reached.
//! - `UnexpectedId`: The store assigned an identifier that is not an
//!   `ObjectId`.
//! - `Decode`: A stored document does not have the shape of a job.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the job service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The identifier could not be parsed into a store-native identifier.
    #[error("Could not convert {id:?} to ObjectId: {reason}")]
    InvalidId { id: String, reason: String },

    /// A required field of the request message was absent.
    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str },

    /// The targeted document does not exist.
    #[error("Could not find Job with id {id}: {reason}")]
    NotFound { id: String, reason: String },

    /// The store rejected the operation or is unreachable.
    #[error("Store error: {context}")]
    Store { context: String },

    /// The store handed back an identifier of an unexpected type.
    #[error("Store assigned a non-ObjectId identifier: {found}")]
    UnexpectedId { found: String },

    /// A stored document could not be decoded into a job.
    #[error("Could not decode data: {context}")]
    Decode { context: String },
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidId { .. } | Error::MissingField { .. } => {
                Status::invalid_argument(message)
            }
            Error::NotFound { .. } => Status::not_found(message),
            Error::Store { .. } | Error::UnexpectedId { .. } => {
                Status::internal(format!("Internal error: {message}"))
            }
            Error::Decode { .. } => Status::unavailable(message),
        }
    }
}
