//! The outbound half of the courier: the send worker pool, the attachment
//! fetch-and-rehost path, the send-status recorder, and the Redis-backed
//! queue and marker primitives production backends build on.

pub mod attachments;
pub mod markers;
pub mod queue;
pub mod recorder;
pub mod worker;

pub use {
    attachments::AttachmentFetcher,
    markers::{SeenExternalIds, SentMarkers},
    queue::OutboxQueue,
    worker::{Dispatcher, DispatcherHandle},
};
