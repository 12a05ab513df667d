//! The channel dispatch server: HTTP intake for provider callbacks and the
//! inbound persistence pipeline.

pub mod pipeline;
pub mod server;

pub use server::{AppState, build_app, serve};
