//! Persisted form of a job and its conversions to and from the wire message.
//!
//! A [`JobDocument`] is what lives in the `job` collection. It is a
//! field-for-field copy of [`proto::Job`] except for the identifier, which is
//! an [`ObjectId`] stored under `_id` and left out entirely when absent so the
//! store assigns one on insert.

use crate::{Error, JobId, Result, proto};
use bson::{Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A job as stored in the document store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub owner: String,
    pub description: String,
}

impl JobDocument {
    /// Builds a document ready for insertion.
    ///
    /// Any identifier carried by the message is dropped: identifiers are
    /// always assigned by the store.
    pub fn from_job(job: proto::Job) -> Self {
        Self {
            id: None,
            name: job.name,
            owner: job.owner,
            description: job.description,
        }
    }

    /// Decodes a raw stored document.
    pub fn decode(document: Document) -> Result<Self> {
        bson::from_document(document).map_err(|e| Error::Decode {
            context: e.to_string(),
        })
    }

    /// Encodes this document for the store.
    pub fn encode(&self) -> Result<Document> {
        bson::to_document(self).map_err(|e| Error::Store {
            context: format!("Could not encode job: {e}"),
        })
    }

    /// The `$set` update rewriting every text field of a job.
    ///
    /// All three fields are always overwritten, even if only one of them
    /// changed.
    pub fn set_fields(job: &proto::Job) -> Document {
        doc! {
            "$set": {
                "name": job.name.as_str(),
                "owner": job.owner.as_str(),
                "description": job.description.as_str(),
            }
        }
    }

    /// Converts to the wire message.
    ///
    /// A document read back from the store always has an identifier, so a
    /// missing one is reported as a decode failure.
    pub fn into_proto(self) -> Result<proto::Job> {
        let id = self.id.ok_or_else(|| Error::Decode {
            context: "document has no `_id`".to_string(),
        })?;
        Ok(self.into_proto_with_id(JobId::from(id)))
    }

    /// Converts to the wire message using an identifier obtained elsewhere,
    /// typically the one assigned on insert.
    pub fn into_proto_with_id(self, id: JobId) -> proto::Job {
        proto::Job {
            id: id.to_string(),
            name: self.name,
            owner: self.owner,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    fn job(id: &str) -> proto::Job {
        proto::Job {
            id: id.to_string(),
            name: "A".to_string(),
            owner: "B".to_string(),
            description: "C".to_string(),
        }
    }

    #[test]
    fn insert_document_has_no_id() {
        let document = JobDocument::from_job(job("65f0c0ffee0000000000beef"))
            .encode()
            .unwrap();

        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_str("name").unwrap(), "A");
        assert_eq!(document.get_str("owner").unwrap(), "B");
        assert_eq!(document.get_str("description").unwrap(), "C");
    }

    #[test]
    fn decodes_stored_document() {
        let oid = ObjectId::new();
        let stored = doc! {
            "_id": oid,
            "name": "A",
            "owner": "B",
            "description": "C",
        };

        let job = JobDocument::decode(stored).unwrap().into_proto().unwrap();
        assert_eq!(job.id, oid.to_hex());
        assert_eq!((job.name.as_str(), job.owner.as_str(), job.description.as_str()), ("A", "B", "C"));
    }

    #[test]
    fn decode_fails_on_wrong_shape() {
        let stored = doc! { "_id": ObjectId::new(), "name": 5, "owner": "B", "description": "C" };
        assert!(matches!(JobDocument::decode(stored), Err(Error::Decode { .. })));

        let missing = doc! { "_id": ObjectId::new(), "name": "A" };
        assert!(matches!(JobDocument::decode(missing), Err(Error::Decode { .. })));
    }

    #[test]
    fn into_proto_requires_id() {
        let document = JobDocument::from_job(job(""));
        assert!(matches!(document.into_proto(), Err(Error::Decode { .. })));
    }

    #[test]
    fn set_fields_rewrites_all_three() {
        let update = JobDocument::set_fields(&job("65f0c0ffee0000000000beef"));
        let set = update.get_document("$set").unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.get("name"), Some(&Bson::String("A".into())));
        assert_eq!(set.get("owner"), Some(&Bson::String("B".into())));
        assert_eq!(set.get("description"), Some(&Bson::String("C".into())));
        assert!(!set.contains_key("_id"));
    }
}
