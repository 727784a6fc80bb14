use super::handler::JobHandler;
use crate::server::store::{JobCursor, JobStore};
use futures::{StreamExt, stream};
use schedulytics_core::{
    Error, JobId, Result,
    bson::{Bson, Document, doc, oid::ObjectId},
    proto::{
        CreateJobReq, DeleteJobReq, Job, ListJobsReq, ReadJobReq, UpdateJobReq,
        job_service_server::JobService,
    },
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use tonic::{Code, Request, Status};

/// What the cursor does once the stored documents are exhausted.
#[derive(Default)]
enum CursorTail {
    #[default]
    End,
    Fail,
    /// Never ends; the flag is raised when the cursor is dropped.
    Hang(Arc<AtomicBool>),
}

#[derive(Default)]
struct Inner {
    documents: Mutex<Vec<Document>>,
    tail: Mutex<CursorTail>,
    offline: AtomicBool,
}

/// In-memory collection of raw documents.
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    async fn seed(&self, document: Document) {
        self.inner.documents.lock().await.push(document);
    }

    async fn set_tail(&self, tail: CursorTail) {
        *self.inner.tail.lock().await = tail;
    }

    fn go_offline(&self) {
        self.inner.offline.store(true, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Store {
                context: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

fn has_id(document: &Document, id: JobId) -> bool {
    document.get_object_id("_id").ok() == Some(id.object_id())
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tonic::async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, mut document: Document) -> Result<Bson> {
        self.check_online()?;
        let oid = ObjectId::new();
        document.insert("_id", oid);
        self.inner.documents.lock().await.push(document);
        Ok(Bson::ObjectId(oid))
    }

    async fn find_one(&self, id: JobId) -> Result<Option<Document>> {
        self.check_online()?;
        let documents = self.inner.documents.lock().await;
        Ok(documents.iter().find(|d| has_id(d, id)).cloned())
    }

    async fn set_fields(&self, id: JobId, update: Document) -> Result<Option<Document>> {
        self.check_online()?;
        let set = update
            .get_document("$set")
            .map_err(|e| Error::Store {
                context: e.to_string(),
            })?
            .clone();

        let mut documents = self.inner.documents.lock().await;
        Ok(documents.iter_mut().find(|d| has_id(d, id)).map(|d| {
            for (key, value) in set {
                d.insert(key, value);
            }
            d.clone()
        }))
    }

    async fn delete_one(&self, id: JobId) -> Result<u64> {
        self.check_online()?;
        let mut documents = self.inner.documents.lock().await;
        let before = documents.len();
        documents.retain(|d| !has_id(d, id));
        Ok((before - documents.len()) as u64)
    }

    async fn find_all(&self) -> Result<JobCursor> {
        self.check_online()?;
        let items: Vec<Result<Document>> = self
            .inner
            .documents
            .lock()
            .await
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        let head = stream::iter(items);

        let cursor = match &*self.inner.tail.lock().await {
            CursorTail::End => head.boxed(),
            CursorTail::Fail => head
                .chain(stream::iter([Err(Error::Store {
                    context: "cursor killed".to_string(),
                })]))
                .boxed(),
            CursorTail::Hang(flag) => {
                let guard = DropFlag(Arc::clone(flag));
                head.chain(stream::pending())
                    .map(move |item| {
                        let _held = &guard;
                        item
                    })
                    .boxed()
            }
        };
        Ok(cursor)
    }
}

fn setup() -> (MemoryStore, JobHandler<MemoryStore>) {
    let store = MemoryStore::default();
    let handler = JobHandler::new(store.clone());
    (store, handler)
}

fn job(name: &str, owner: &str, description: &str) -> Job {
    Job {
        id: String::new(),
        name: name.to_string(),
        owner: owner.to_string(),
        description: description.to_string(),
    }
}

async fn create(handler: &JobHandler<MemoryStore>, job: Job) -> Job {
    handler
        .create_job(Request::new(CreateJobReq { job: Some(job) }))
        .await
        .unwrap()
        .into_inner()
        .job
        .unwrap()
}

async fn read(handler: &JobHandler<MemoryStore>, id: &str) -> core::result::Result<Job, Status> {
    handler
        .read_job(Request::new(ReadJobReq { id: id.to_string() }))
        .await
        .map(|res| res.into_inner().job.unwrap())
}

async fn list(handler: &JobHandler<MemoryStore>) -> Vec<core::result::Result<Job, Status>> {
    handler
        .list_jobs(Request::new(ListJobsReq {}))
        .await
        .unwrap()
        .into_inner()
        .map(|item| item.map(|res| res.job.unwrap()))
        .collect()
        .await
}

const UNKNOWN_ID: &str = "65f0c0ffee0000000000beef";

#[tokio::test]
async fn create_assigns_id_and_keeps_fields() {
    let (_, handler) = setup();

    let created = create(&handler, job("A", "B", "C")).await;

    assert!(!created.id.is_empty());
    assert!(created.id.parse::<JobId>().is_ok());
    assert_eq!((created.name.as_str(), created.owner.as_str(), created.description.as_str()), ("A", "B", "C"));
}

#[tokio::test]
async fn create_ignores_client_supplied_id() {
    let (store, handler) = setup();
    let mut with_id = job("A", "B", "C");
    with_id.id = UNKNOWN_ID.to_string();

    let created = create(&handler, with_id).await;

    assert_ne!(created.id, UNKNOWN_ID);
    let stored = store.inner.documents.lock().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_object_id("_id").unwrap().to_hex(), created.id);
}

#[tokio::test]
async fn create_without_job_is_invalid_argument() {
    let (store, handler) = setup();

    let status = handler
        .create_job(Request::new(CreateJobReq { job: None }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(store.inner.documents.lock().await.is_empty());
}

#[tokio::test]
async fn create_fails_internal_when_store_is_down() {
    let (store, handler) = setup();
    store.go_offline();

    let status = handler
        .create_job(Request::new(CreateJobReq {
            job: Some(job("A", "B", "C")),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("connection refused"));
}

#[tokio::test]
async fn create_rejects_non_object_id_from_store() {
    struct IntKeyedStore;

    #[tonic::async_trait]
    impl JobStore for IntKeyedStore {
        async fn insert(&self, _document: Document) -> Result<Bson> {
            Ok(Bson::Int64(1))
        }
        async fn find_one(&self, _id: JobId) -> Result<Option<Document>> {
            Ok(None)
        }
        async fn set_fields(&self, _id: JobId, _update: Document) -> Result<Option<Document>> {
            Ok(None)
        }
        async fn delete_one(&self, _id: JobId) -> Result<u64> {
            Ok(0)
        }
        async fn find_all(&self) -> Result<JobCursor> {
            Ok(stream::empty().boxed())
        }
    }

    let handler = JobHandler::new(IntKeyedStore);
    let status = handler
        .create_job(Request::new(CreateJobReq {
            job: Some(job("A", "B", "C")),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Internal);
}

#[tokio::test]
async fn read_returns_created_job() {
    let (_, handler) = setup();
    let created = create(&handler, job("A", "B", "C")).await;

    let fetched = read(&handler, &created.id).await.unwrap();

    assert_eq!(fetched, created);
}

#[tokio::test]
async fn read_malformed_id_is_invalid_argument() {
    let (_, handler) = setup();

    let status = read(&handler, "not-an-object-id").await.unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn read_unknown_id_is_not_found() {
    let (_, handler) = setup();
    create(&handler, job("A", "B", "C")).await;

    let status = read(&handler, UNKNOWN_ID).await.unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
    assert!(status.message().contains(UNKNOWN_ID));
}

#[tokio::test]
async fn read_undecodable_document_is_not_found() {
    let (store, handler) = setup();
    let oid = ObjectId::new();
    store
        .seed(doc! { "_id": oid, "name": 42, "owner": "B", "description": "C" })
        .await;

    let status = read(&handler, &oid.to_hex()).await.unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn update_overwrites_every_field() {
    let (_, handler) = setup();
    let created = create(&handler, job("A", "B", "C")).await;

    // Only the name is meant to change, but empty owner and description are
    // written as sent.
    let mut changed = job("A2", "", "");
    changed.id = created.id.clone();
    let updated = handler
        .update_job(Request::new(UpdateJobReq { job: Some(changed) }))
        .await
        .unwrap()
        .into_inner()
        .job
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!((updated.name.as_str(), updated.owner.as_str(), updated.description.as_str()), ("A2", "", ""));
    assert_eq!(read(&handler, &created.id).await.unwrap(), updated);
}

#[tokio::test]
async fn update_with_read_first_keeps_untouched_fields() {
    let (_, handler) = setup();
    let created = create(&handler, job("A", "B", "C")).await;

    let mut current = read(&handler, &created.id).await.unwrap();
    current.description = "C2".to_string();
    let updated = handler
        .update_job(Request::new(UpdateJobReq { job: Some(current) }))
        .await
        .unwrap()
        .into_inner()
        .job
        .unwrap();

    assert_eq!((updated.name.as_str(), updated.owner.as_str(), updated.description.as_str()), ("A", "B", "C2"));
}

#[tokio::test]
async fn update_error_kinds() {
    let (_, handler) = setup();

    let mut malformed = job("A", "B", "C");
    malformed.id = "xyz".to_string();
    let status = handler
        .update_job(Request::new(UpdateJobReq { job: Some(malformed) }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut unknown = job("A", "B", "C");
    unknown.id = UNKNOWN_ID.to_string();
    let status = handler
        .update_job(Request::new(UpdateJobReq { job: Some(unknown) }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = handler
        .update_job(Request::new(UpdateJobReq { job: None }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn delete_then_read_is_not_found() {
    let (_, handler) = setup();
    let created = create(&handler, job("A", "B", "C")).await;

    let res = handler
        .delete_job(Request::new(DeleteJobReq {
            id: created.id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(res.success);

    let status = read(&handler, &created.id).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let (_, handler) = setup();
    let created = create(&handler, job("A", "B", "C")).await;
    let req = || {
        Request::new(DeleteJobReq {
            id: created.id.clone(),
        })
    };

    handler.delete_job(req()).await.unwrap();
    let status = handler.delete_job(req()).await.unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn delete_only_removes_target() {
    let (_, handler) = setup();
    let keep = create(&handler, job("keep", "B", "C")).await;
    let gone = create(&handler, job("gone", "B", "C")).await;

    handler
        .delete_job(Request::new(DeleteJobReq { id: gone.id }))
        .await
        .unwrap();

    assert_eq!(read(&handler, &keep.id).await.unwrap(), keep);
}

#[tokio::test]
async fn delete_error_kinds() {
    let (store, handler) = setup();

    let status = handler
        .delete_job(Request::new(DeleteJobReq {
            id: "12345".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    store.go_offline();
    let status = handler
        .delete_job(Request::new(DeleteJobReq {
            id: UNKNOWN_ID.to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
}

#[tokio::test]
async fn list_yields_every_job() {
    let (_, handler) = setup();
    let created = futures::future::join_all(
        (0..5).map(|i| create(&handler, job(&format!("job-{i}"), "B", "C"))),
    )
    .await;

    let listed: Vec<Job> = list(&handler)
        .await
        .into_iter()
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(listed.len(), 5);
    let created: HashSet<_> = created.into_iter().map(|j| (j.id, j.name)).collect();
    let listed: HashSet<_> = listed.into_iter().map(|j| (j.id, j.name)).collect();
    assert_eq!(created, listed);
}

#[tokio::test]
async fn list_of_empty_collection_ends_immediately() {
    let (_, handler) = setup();

    assert!(list(&handler).await.is_empty());
}

#[tokio::test]
async fn list_aborts_with_unavailable_on_undecodable_document() {
    let (store, handler) = setup();
    create(&handler, job("first", "B", "C")).await;
    store.seed(doc! { "_id": ObjectId::new(), "name": "broken" }).await;
    create(&handler, job("never-sent", "B", "C")).await;

    let items = list(&handler).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().name, "first");
    assert_eq!(items[1].as_ref().unwrap_err().code(), Code::Unavailable);
}

#[tokio::test]
async fn list_aborts_with_internal_on_cursor_failure() {
    let (store, handler) = setup();
    create(&handler, job("A", "B", "C")).await;
    store.set_tail(CursorTail::Fail).await;

    let items = list(&handler).await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert_eq!(items[1].as_ref().unwrap_err().code(), Code::Internal);
}

#[tokio::test]
async fn list_fails_internal_when_store_is_down() {
    let (store, handler) = setup();
    store.go_offline();

    let status = handler
        .list_jobs(Request::new(ListJobsReq {}))
        .await
        .err()
        .unwrap();

    assert_eq!(status.code(), Code::Internal);
}

#[tokio::test]
async fn list_releases_cursor_when_client_goes_away() {
    let (store, handler) = setup();
    let released = Arc::new(AtomicBool::new(false));
    create(&handler, job("A", "B", "C")).await;
    store.set_tail(CursorTail::Hang(Arc::clone(&released))).await;

    let mut stream = handler
        .list_jobs(Request::new(ListJobsReq {}))
        .await
        .unwrap()
        .into_inner();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.job.unwrap().name, "A");
    assert!(!released.load(Ordering::SeqCst));

    drop(stream);

    assert!(released.load(Ordering::SeqCst));
}
