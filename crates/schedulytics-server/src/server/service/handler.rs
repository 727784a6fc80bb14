//! gRPC service implementation for job CRUD and listing.
//!
//! [`JobHandler`] implements the [`JobService`] trait generated from the
//! protobuf definition. Every call round-trips to the injected [`JobStore`];
//! the handler keeps no state of its own between requests.
//!
//! ## Responsibilities
//!
//! - Parse client identifiers into [`JobId`]s before touching the store.
//! - Convert between wire messages and stored documents through the codec.
//! - Map store outcomes onto status codes: a delete or update that matches
//!   nothing is `NOT_FOUND`, driver failures are `INTERNAL`.
//! - Stream `ListJobs` straight off the store cursor, so dropping the response
//!   stream (client cancellation) releases the cursor immediately.

use crate::server::{
    store::{JobStore, stop_after_error},
    telemetry::{
        decrement_streams_inflight, increment_errors, increment_jobs_streamed, increment_requests,
        increment_streams_inflight, record_stream_duration,
    },
};
use core::pin::Pin;
use futures::{Stream, StreamExt, stream::BoxStream};
use schedulytics_core::{
    Error, JobDocument, JobId, Result,
    bson::Document,
    proto::{
        CreateJobReq, CreateJobRes, DeleteJobReq, DeleteJobRes, Job, ListJobsReq, ListJobsRes,
        ReadJobReq, ReadJobRes, UpdateJobReq, UpdateJobRes, job_service_server::JobService,
    },
};
use std::{sync::Arc, time::Instant};
use tonic::{Request, Response, Status};

const CREATE_JOB: &str = "CreateJob";
const READ_JOB: &str = "ReadJob";
const UPDATE_JOB: &str = "UpdateJob";
const DELETE_JOB: &str = "DeleteJob";
const LIST_JOBS: &str = "ListJobs";

/// Decoded jobs as produced by [`JobHandler::list`].
pub type JobStream = BoxStream<'static, Result<ListJobsRes>>;

/// gRPC front of the job collection.
///
/// Cloning is cheap: clones share the same store handle.
pub struct JobHandler<S> {
    store: Arc<S>,
}

impl<S> Clone for JobHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: JobStore> JobHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Inserts a new job. Any identifier sent by the client is ignored.
    pub async fn create(&self, req: CreateJobReq) -> Result<CreateJobRes> {
        let job = req.job.ok_or(Error::MissingField { field: "job" })?;
        let document = JobDocument::from_job(job);

        let inserted = self.store.insert(document.encode()?).await?;
        let id = JobId::try_from(inserted)?;

        Ok(CreateJobRes {
            job: Some(document.into_proto_with_id(id)),
        })
    }

    pub async fn read(&self, req: ReadJobReq) -> Result<ReadJobRes> {
        let id: JobId = req.id.parse()?;

        let document = self
            .store
            .find_one(id)
            .await?
            .ok_or_else(|| no_match(id))?;

        Ok(ReadJobRes {
            job: Some(decode_found(id, document)?),
        })
    }

    /// Overwrites name, owner and description of an existing job and returns
    /// the job as stored after the update.
    pub async fn update(&self, req: UpdateJobReq) -> Result<UpdateJobRes> {
        let job = req.job.ok_or(Error::MissingField { field: "job" })?;
        let id: JobId = job.id.parse()?;

        let document = self
            .store
            .set_fields(id, JobDocument::set_fields(&job))
            .await?
            .ok_or_else(|| no_match(id))?;

        Ok(UpdateJobRes {
            job: Some(decode_found(id, document)?),
        })
    }

    /// Removes a job. Deleting an identifier that matches nothing, including
    /// one that was already deleted, is `NotFound`.
    pub async fn delete(&self, req: DeleteJobReq) -> Result<DeleteJobRes> {
        let id: JobId = req.id.parse()?;

        match self.store.delete_one(id).await? {
            0 => Err(no_match(id)),
            _ => Ok(DeleteJobRes { success: true }),
        }
    }

    /// Lazily decodes the whole collection.
    ///
    /// The sequence ends cleanly when the cursor is exhausted and right after
    /// the first failure otherwise: a document that does not decode yields
    /// `Error::Decode`, a cursor failure `Error::Store`.
    pub async fn list(&self) -> Result<JobStream> {
        let cursor = self.store.find_all().await?;
        Ok(stop_after_error(cursor.map(decode_listed)).boxed())
    }
}

fn no_match(id: JobId) -> Error {
    Error::NotFound {
        id: id.to_string(),
        reason: "no document matched".to_string(),
    }
}

/// Decodes a document the store returned for `id`. A stored document that is
/// not a valid job is indistinguishable from a missing one for the caller.
fn decode_found(id: JobId, document: Document) -> Result<Job> {
    JobDocument::decode(document)
        .and_then(JobDocument::into_proto)
        .map_err(|e| Error::NotFound {
            id: id.to_string(),
            reason: e.to_string(),
        })
}

fn decode_listed(item: Result<Document>) -> Result<ListJobsRes> {
    let job = JobDocument::decode(item?)?.into_proto()?;
    Ok(ListJobsRes { job: Some(job) })
}

/// Counts the failure and converts it for the wire.
fn reject(rpc: &'static str, err: Error) -> Status {
    let status = Status::from(err);
    increment_errors(rpc, status.code());
    #[cfg(feature = "tracing")]
    tracing::warn!(rpc, code = ?status.code(), "{}", status.message());
    status
}

/// Bookkeeping for one open `ListJobs` stream. Dropped together with the
/// response stream, whether it finished or the client went away.
struct StreamTracker {
    start: Instant,
}

impl StreamTracker {
    fn start() -> Self {
        increment_streams_inflight();
        Self {
            start: Instant::now(),
        }
    }

    fn observe(&self, item: Result<ListJobsRes>) -> core::result::Result<ListJobsRes, Status> {
        match item {
            Ok(res) => {
                increment_jobs_streamed();
                Ok(res)
            }
            Err(e) => Err(reject(LIST_JOBS, e)),
        }
    }
}

impl Drop for StreamTracker {
    fn drop(&mut self) {
        decrement_streams_inflight();
        record_stream_duration(self.start.elapsed().as_secs_f64() * 1000.0);
        #[cfg(feature = "tracing")]
        tracing::debug!(elapsed = ?self.start.elapsed(), "ListJobs stream closed");
    }
}

#[tonic::async_trait]
impl<S: JobStore> JobService for JobHandler<S> {
    type ListJobsStream = Pin<Box<dyn Stream<Item = core::result::Result<ListJobsRes, Status>> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn create_job(
        &self,
        req: Request<CreateJobReq>,
    ) -> core::result::Result<Response<CreateJobRes>, Status> {
        increment_requests(CREATE_JOB);
        let res = self
            .create(req.into_inner())
            .await
            .map_err(|e| reject(CREATE_JOB, e))?;

        #[cfg(feature = "tracing")]
        {
            if let Some(job) = &res.job {
                tracing::info!(id = %job.id, "Created job");
            }
        }
        Ok(Response::new(res))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().id)))]
    async fn read_job(
        &self,
        req: Request<ReadJobReq>,
    ) -> core::result::Result<Response<ReadJobRes>, Status> {
        increment_requests(READ_JOB);
        self.read(req.into_inner())
            .await
            .map(Response::new)
            .map_err(|e| reject(READ_JOB, e))
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, fields(id = req.get_ref().job.as_ref().map(|j| j.id.as_str())))
    )]
    async fn update_job(
        &self,
        req: Request<UpdateJobReq>,
    ) -> core::result::Result<Response<UpdateJobRes>, Status> {
        increment_requests(UPDATE_JOB);
        self.update(req.into_inner())
            .await
            .map(Response::new)
            .map_err(|e| reject(UPDATE_JOB, e))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().id)))]
    async fn delete_job(
        &self,
        req: Request<DeleteJobReq>,
    ) -> core::result::Result<Response<DeleteJobRes>, Status> {
        increment_requests(DELETE_JOB);
        let res = self
            .delete(req.into_inner())
            .await
            .map_err(|e| reject(DELETE_JOB, e))?;

        #[cfg(feature = "tracing")]
        tracing::info!("Deleted job");
        Ok(Response::new(res))
    }

    /// Streams every stored job.
    ///
    /// No task is spawned: the returned stream pulls from the cursor as the
    /// transport asks for more, and tonic drops it (and the cursor with it)
    /// when the client cancels or its deadline passes.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_jobs(
        &self,
        _req: Request<ListJobsReq>,
    ) -> core::result::Result<Response<Self::ListJobsStream>, Status> {
        increment_requests(LIST_JOBS);
        let jobs = self.list().await.map_err(|e| reject(LIST_JOBS, e))?;

        let tracker = StreamTracker::start();
        let stream = jobs.map(move |item| tracker.observe(item));

        Ok(Response::new(Box::pin(stream)))
    }
}
