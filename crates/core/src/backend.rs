//! The persistence/queue substrate contract consumed by the engine.
//!
//! Implementations sit in front of whatever storage a deployment uses; the
//! engine only ever talks through this trait. Every call is expected to run
//! under a caller-side deadline (`tokio::time::timeout` derived from the
//! request or worker scope).

use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    channel::Channel,
    clog::ChannelLog,
    error::Result,
    event::{ChannelEvent, ChannelEventType},
    ids::{ChannelAddress, ChannelType, ChannelUuid, ContactUuid, MsgId},
    msg::{Msg, MsgOrigin, MsgStatus, MsgStatusValue},
    urn::Urn,
};

/// A platform-hosted media object, resolved from an attachment URL.
#[derive(Debug, Clone)]
pub struct Media {
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

/// A contact on the upstream platform.
#[derive(Debug, Clone)]
pub struct Contact {
    pub uuid: ContactUuid,
    pub urn: Urn,
    pub auth: Option<String>,
    pub name: Option<String>,
}

/// Persistence, queue, dedup and media resolution, behind one interface.
#[async_trait]
pub trait Backend: Send + Sync {
    // ── channels ─────────────────────────────────────────────────────────

    /// Look up a channel by type and UUID. `Error::ChannelNotFound` when
    /// missing.
    async fn get_channel(
        &self,
        channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Arc<Channel>>;

    /// Look up a channel by type and provider-side address.
    async fn get_channel_by_address(
        &self,
        channel_type: &ChannelType,
        address: &ChannelAddress,
    ) -> Result<Arc<Channel>>;

    // ── contacts ─────────────────────────────────────────────────────────

    /// Fetch the contact for a URN, creating it if missing.
    async fn get_contact(
        &self,
        channel: &Channel,
        urn: &Urn,
        auth: Option<&str>,
        name: Option<&str>,
        clog: &mut ChannelLog,
    ) -> Result<Contact>;

    async fn add_urn_to_contact(
        &self,
        channel: &Channel,
        contact: &Contact,
        urn: &Urn,
    ) -> Result<Urn>;

    async fn remove_urn_from_contact(
        &self,
        channel: &Channel,
        contact: &Contact,
        urn: &Urn,
    ) -> Result<Urn>;

    // ── factories ────────────────────────────────────────────────────────

    /// Build a new incoming message for this channel. Handlers use this
    /// (never construct and persist directly).
    fn new_incoming_msg(&self, channel: &Channel, urn: Urn, text: &str) -> Msg;

    /// Build a new outgoing message, normally from a queue payload.
    #[allow(clippy::too_many_arguments)]
    fn new_outgoing_msg(
        &self,
        channel: &Channel,
        id: MsgId,
        urn: Urn,
        text: &str,
        high_priority: bool,
        quick_replies: Vec<String>,
        topic: Option<String>,
        response_to_external_id: Option<String>,
        origin: MsgOrigin,
        contact_last_seen_on: Option<DateTime<Utc>>,
    ) -> Msg;

    fn new_msg_status_for_id(
        &self,
        channel: &Channel,
        id: MsgId,
        status: MsgStatusValue,
    ) -> MsgStatus;

    fn new_msg_status_for_external_id(
        &self,
        channel: &Channel,
        external_id: &str,
        status: MsgStatusValue,
    ) -> MsgStatus;

    fn new_channel_event(
        &self,
        channel: &Channel,
        event_type: ChannelEventType,
        urn: Urn,
    ) -> ChannelEvent;

    // ── dedup ────────────────────────────────────────────────────────────

    /// Check whether this msg's `(channel, external_id)` was seen within the
    /// dedup window, setting `already_written` on the returned value if so.
    async fn check_external_id_seen(&self, msg: Msg) -> Msg;

    /// Record this msg's external ID as seen for the dedup window.
    async fn write_external_id_seen(&self, msg: &Msg);

    // ── writes ───────────────────────────────────────────────────────────

    /// Persist an incoming message. Assigns `msg.id` on success.
    async fn write_msg(&self, msg: &mut Msg, clog: &mut ChannelLog) -> Result<()>;

    /// Persist a status update. `Error::MsgNotFound` when neither ID
    /// resolves; `Error::WrongIncomingMsgStatus` when the target is an
    /// incoming message being moved outside pending/handled.
    async fn write_msg_status(&self, status: &MsgStatus) -> Result<()>;

    async fn write_channel_event(
        &self,
        event: &ChannelEvent,
        clog: &mut ChannelLog,
    ) -> Result<()>;

    /// Persist a channel log. Implementations decide retention (typically
    /// errored plus sampled successes).
    async fn write_channel_log(&self, clog: &ChannelLog) -> Result<()>;

    /// Remove a message the provider has retracted.
    async fn delete_msg_with_external_id(
        &self,
        channel: &Channel,
        external_id: &str,
    ) -> Result<()>;

    // ── outbound queue ───────────────────────────────────────────────────

    /// Pop the next queued outgoing message, or `None` when the queue is
    /// empty.
    async fn pop_next_outgoing_msg(&self) -> Result<Option<Msg>>;

    /// Enqueue an outgoing message (testing and re-queue paths).
    async fn push_outgoing_msg(&self, msg: Msg) -> Result<()>;

    /// Whether a send for this msg ID already went to the provider.
    async fn was_msg_sent(&self, id: MsgId) -> Result<bool>;

    async fn clear_msg_sent(&self, id: MsgId) -> Result<()>;

    /// Mark an outgoing message dealt with: sets the send-once marker so
    /// parallel workers cannot re-send. Idempotent.
    async fn mark_outgoing_msg_complete(&self, msg: &Msg, status: &MsgStatus) -> Result<()>;

    // ── media ────────────────────────────────────────────────────────────

    /// Store attachment bytes, returning the re-hosted URL.
    async fn save_attachment(
        &self,
        channel: &Channel,
        content_type: &str,
        data: &[u8],
        extension: &str,
    ) -> Result<String>;

    /// Resolve a media URL to an already-hosted object, if the platform
    /// knows it.
    async fn resolve_media(&self, url: &str) -> Result<Option<Media>>;

    // ── lifecycle ────────────────────────────────────────────────────────

    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn cleanup(&self) -> Result<()>;

    /// Health probe; empty string = healthy.
    async fn health(&self) -> String;

    /// Operational summary for `/status` (queue sizes etc.).
    async fn status(&self) -> String;

    async fn heartbeat(&self) -> Result<()>;
}
