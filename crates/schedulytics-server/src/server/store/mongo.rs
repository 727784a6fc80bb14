//! MongoDB implementation of [`JobStore`].

use super::{JobCursor, JobStore};
use futures::{StreamExt, TryStreamExt};
use mongodb::{Collection, options::ReturnDocument};
use schedulytics_core::{
    Error, JobId, Result,
    bson::{Bson, Document, doc},
};

/// Job store backed by a single MongoDB collection.
///
/// The collection handle is cheap to clone and safe to share between
/// concurrent requests; the driver pools connections internally.
#[derive(Clone, Debug)]
pub struct MongoJobStore {
    collection: Collection<Document>,
}

impl MongoJobStore {
    pub const fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }
}

fn store_error(operation: &str, err: mongodb::error::Error) -> Error {
    Error::Store {
        context: format!("{operation} failed: {err}"),
    }
}

#[tonic::async_trait]
impl JobStore for MongoJobStore {
    async fn insert(&self, document: Document) -> Result<Bson> {
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| store_error("insert", e))?;
        Ok(result.inserted_id)
    }

    async fn find_one(&self, id: JobId) -> Result<Option<Document>> {
        self.collection
            .find_one(id.filter())
            .await
            .map_err(|e| store_error("find", e))
    }

    async fn set_fields(&self, id: JobId, update: Document) -> Result<Option<Document>> {
        self.collection
            .find_one_and_update(id.filter(), update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| store_error("update", e))
    }

    async fn delete_one(&self, id: JobId) -> Result<u64> {
        let result = self
            .collection
            .delete_one(id.filter())
            .await
            .map_err(|e| store_error("delete", e))?;
        Ok(result.deleted_count)
    }

    async fn find_all(&self) -> Result<JobCursor> {
        let cursor = self
            .collection
            .find(doc! {})
            .await
            .map_err(|e| store_error("find", e))?;
        Ok(cursor.map_err(|e| store_error("cursor", e)).boxed())
    }
}
