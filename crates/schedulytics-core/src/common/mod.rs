//! Shared error type and the Job entity codec.
//!
//! - [`error`] - the unified [`Error`](error::Error) and its gRPC status
//!   mapping.
//! - [`id`] - [`JobId`](id::JobId), the string/`ObjectId` identifier pair.
//! - [`job`] - [`JobDocument`](job::JobDocument), the persisted form of a job.

pub mod error;
pub mod id;
pub mod job;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::JobDocument;
