//! Document store seam for the job service.
//!
//! The service never talks to the driver directly. It is handed a
//! [`JobStore`] at construction and exchanges raw BSON documents with it,
//! applying the entity codec on its own side of the boundary.
//!
//! - [`mongo`] - the MongoDB implementation used by the binary.

pub mod mongo;

use futures::{Stream, StreamExt, stream::BoxStream};
use schedulytics_core::{
    JobId, Result,
    bson::{Bson, Document},
};

/// Lazy sequence of stored documents.
///
/// Each item is individually fallible and `None` marks the end of the
/// collection. Dropping the cursor releases it on the store side.
pub type JobCursor = BoxStream<'static, Result<Document>>;

/// Single-document operations over the job collection.
///
/// Every call round-trips to the store; implementations hold no copy of the
/// data. Atomicity is per document and provided by the store itself.
#[tonic::async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Inserts a document without `_id` and returns the identifier the store
    /// assigned.
    async fn insert(&self, document: Document) -> Result<Bson>;

    async fn find_one(&self, id: JobId) -> Result<Option<Document>>;

    /// Applies `update` to the matching document and returns its post-update
    /// state, or `None` when nothing matched.
    async fn set_fields(&self, id: JobId, update: Document) -> Result<Option<Document>>;

    /// Returns the number of removed documents (0 or 1).
    async fn delete_one(&self, id: JobId) -> Result<u64>;

    /// Unfiltered, unordered scan of the whole collection.
    async fn find_all(&self) -> Result<JobCursor>;
}

/// Ends `stream` right after the first `Err` it yields.
///
/// The inner stream is not polled again once an error has been passed on, so
/// no further documents are fetched from the cursor.
pub fn stop_after_error<S, T, E>(stream: S) -> impl Stream<Item = core::result::Result<T, E>>
where
    S: Stream<Item = core::result::Result<T, E>> + Unpin,
{
    futures::stream::unfold((stream, false), |(mut stream, failed)| async move {
        if failed {
            return None;
        }
        let item = stream.next().await?;
        let failed = item.is_err();
        Some((item, (stream, failed)))
    })
}
