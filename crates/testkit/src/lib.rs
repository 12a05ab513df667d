//! Test doubles for the courier engine: an in-memory backend that records
//! every write, and a scripted handler for dispatcher tests.
//!
//! The mock keeps dedup and send-once state in process-local maps; that is
//! deliberate — production deployments go through the Redis-backed markers
//! in `herald-dispatch`.

mod backend;
mod handler;

pub use {
    backend::{MockBackend, SavedAttachment, StatusWriteError, mock_channel},
    handler::{MockHandler, SendScript},
};
