//! Job identifiers.
//!
//! Clients see an identifier as an opaque string; the store keys documents by
//! a BSON [`ObjectId`]. [`JobId`] is the single place where the two meet:
//! parsing a string is fallible ([`FromStr`]), formatting is total
//! ([`Display`](core::fmt::Display)).

use crate::{Error, Result};
use bson::{Bson, oid::ObjectId};
use core::{fmt, str::FromStr};

/// Store-native identifier of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(ObjectId);

impl JobId {
    /// Generates a fresh identifier the same way the store would.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    pub const fn from_object_id(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub const fn object_id(&self) -> ObjectId {
        self.0
    }

    /// Equality filter selecting the document with this identifier.
    pub fn filter(&self) -> bson::Document {
        bson::doc! { "_id": self.0 }
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                id: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl From<ObjectId> for JobId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<JobId> for ObjectId {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl TryFrom<Bson> for JobId {
    type Error = Error;

    /// Accepts the `inserted_id` reported by the store. Anything other than an
    /// `ObjectId` means the collection is not keyed the way this service
    /// expects.
    fn try_from(value: Bson) -> Result<Self> {
        match value {
            Bson::ObjectId(oid) => Ok(Self(oid)),
            other => Err(Error::UnexpectedId {
                found: other.to_string(),
            }),
        }
    }
}
