#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so the server binds against the same BSON types the codec
// produces.
pub use bson;

/// gRPC service and message definitions generated from
/// `proto/schedulytics.proto`.
///
/// ## Services
///
/// - `HelloService` - a single stateless `SayHello` greeting.
/// - `JobService` - create, read, update and delete a single job, plus a
///   server-streaming `ListJobs` over the whole collection.
///
/// Every job crossing the wire carries its identifier as the hex string form
/// of a BSON `ObjectId`. See [`JobId`](crate::id::JobId) for the conversion.
pub mod proto {
    tonic::include_proto!("schedulytics");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("schedulytics_descriptor");
}
