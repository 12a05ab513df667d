//! Core domain model and contracts for the herald courier engine.
//!
//! Everything the rest of the workspace builds on lives here: identifier and
//! value types, the `Msg`/`MsgStatus`/`ChannelEvent` records, the per-request
//! channel log, the backend and handler contracts, and the channel registry.

pub mod backend;
pub mod channel;
pub mod clog;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod ids;
pub mod locale;
pub mod msg;
pub mod registry;
pub mod urn;

pub use {
    backend::{Backend, Media},
    channel::{Channel, keys},
    clog::{ChannelLog, ChannelLogType, HttpLog, LogError},
    config::Config,
    error::{Error, Result},
    event::{ChannelEvent, ChannelEventType},
    handler::{Handler, HandlerOutput, HandlerRegistry, HandlerRequest, HandlerResponse, Route},
    ids::{ChannelAddress, ChannelType, ChannelUuid, ContactUuid, MsgId, MsgUuid},
    locale::Locale,
    msg::{FlowReference, Msg, MsgOrigin, MsgStatus, MsgStatusValue},
    registry::ChannelRegistry,
    urn::Urn,
};
