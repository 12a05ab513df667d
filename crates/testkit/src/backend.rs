//! In-memory mock backend recording every write for assertions.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use {
    anyhow::anyhow,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use herald_core::{
    Channel, ChannelEvent, ChannelEventType, ChannelLog, ChannelType, ChannelUuid, Error, Msg,
    MsgId, MsgOrigin, MsgStatus, MsgStatusValue, Result, Urn,
    backend::{Backend, Contact, Media},
    ids::{ChannelAddress, ContactUuid},
};

/// An attachment handed to `save_attachment`.
#[derive(Debug, Clone)]
pub struct SavedAttachment {
    pub channel_uuid: ChannelUuid,
    pub content_type: String,
    pub data: Vec<u8>,
    pub extension: String,
}

#[derive(Default)]
struct State {
    channels: HashMap<ChannelUuid, Arc<Channel>>,
    channels_by_address: HashMap<ChannelAddress, Arc<Channel>>,
    contacts: HashMap<Urn, Contact>,
    media: HashMap<String, Media>,

    outgoing: VecDeque<Msg>,
    written_msgs: Vec<Msg>,
    written_statuses: Vec<MsgStatus>,
    written_events: Vec<ChannelEvent>,
    written_clogs: Vec<ChannelLog>,
    saved_attachments: Vec<SavedAttachment>,

    last_msg_id: i64,
    sent_msgs: HashMap<MsgId, bool>,
    seen_external_ids: Vec<String>,
    channel_fetches: usize,

    error_on_queue: bool,
    storage_error: Option<String>,
    status_error: Option<StatusWriteError>,
}

/// Which error `write_msg_status` should raise, for pipeline drop-path tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWriteError {
    MsgNotFound,
    WrongIncomingMsgStatus,
    Backend,
}

/// A mocked backend which doesn't require a database or cache. All state is
/// behind one mutex; tests inspect it through the `written_*` accessors.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for lookup by uuid and by address.
    pub fn add_channel(&self, channel: Channel) -> Arc<Channel> {
        let channel = Arc::new(channel);
        let mut state = self.state.lock().unwrap();
        state.channels.insert(channel.uuid, Arc::clone(&channel));
        state
            .channels_by_address
            .insert(channel.address.clone(), Arc::clone(&channel));
        channel
    }

    /// Make the next `write_msg` fail.
    pub fn set_error_on_queue(&self, should_error: bool) {
        self.state.lock().unwrap().error_on_queue = should_error;
    }

    /// Make storage operations fail with the given message.
    pub fn set_storage_error(&self, message: Option<&str>) {
        self.state.lock().unwrap().storage_error = message.map(str::to_string);
    }

    /// Make `write_msg_status` fail with the given error.
    pub fn set_status_error(&self, error: Option<StatusWriteError>) {
        self.state.lock().unwrap().status_error = error;
    }

    /// Pre-resolve a media URL.
    pub fn add_media(&self, url: &str, media: Media) {
        self.state.lock().unwrap().media.insert(url.to_string(), media);
    }

    pub fn written_msgs(&self) -> Vec<Msg> {
        self.state.lock().unwrap().written_msgs.clone()
    }

    pub fn written_statuses(&self) -> Vec<MsgStatus> {
        self.state.lock().unwrap().written_statuses.clone()
    }

    pub fn written_events(&self) -> Vec<ChannelEvent> {
        self.state.lock().unwrap().written_events.clone()
    }

    pub fn written_clogs(&self) -> Vec<ChannelLog> {
        self.state.lock().unwrap().written_clogs.clone()
    }

    pub fn saved_attachments(&self) -> Vec<SavedAttachment> {
        self.state.lock().unwrap().saved_attachments.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().outgoing.len()
    }

    /// How many channel lookups hit this backend (cache-behavior tests).
    pub fn channel_fetches(&self) -> usize {
        self.state.lock().unwrap().channel_fetches
    }

    /// Pre-mark a message as already sent (send-once scenarios).
    pub fn mark_sent(&self, id: MsgId) {
        self.state.lock().unwrap().sent_msgs.insert(id, true);
    }

    /// Clear recorded writes and dedup state between cases.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_msg_id = 0;
        state.seen_external_ids.clear();
        state.written_msgs.clear();
        state.written_statuses.clear();
        state.written_events.clear();
        state.written_clogs.clear();
        state.saved_attachments.clear();
        state.outgoing.clear();
        state.sent_msgs.clear();
    }

    fn dedup_key(msg: &Msg) -> Option<String> {
        msg.external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}|{id}", msg.channel_uuid))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_channel(
        &self,
        _channel_type: &ChannelType,
        uuid: &ChannelUuid,
    ) -> Result<Arc<Channel>> {
        let mut state = self.state.lock().unwrap();
        state.channel_fetches += 1;
        state
            .channels
            .get(uuid)
            .cloned()
            .ok_or(Error::ChannelNotFound)
    }

    async fn get_channel_by_address(
        &self,
        _channel_type: &ChannelType,
        address: &ChannelAddress,
    ) -> Result<Arc<Channel>> {
        let mut state = self.state.lock().unwrap();
        state.channel_fetches += 1;
        state
            .channels_by_address
            .get(address)
            .cloned()
            .ok_or(Error::ChannelNotFound)
    }

    async fn get_contact(
        &self,
        _channel: &Channel,
        urn: &Urn,
        auth: Option<&str>,
        name: Option<&str>,
        _clog: &mut ChannelLog,
    ) -> Result<Contact> {
        let mut state = self.state.lock().unwrap();
        let contact = state.contacts.entry(urn.clone()).or_insert_with(|| Contact {
            uuid: ContactUuid::new(),
            urn: urn.clone(),
            auth: auth.map(str::to_string),
            name: name.map(str::to_string),
        });
        Ok(contact.clone())
    }

    async fn add_urn_to_contact(
        &self,
        _channel: &Channel,
        contact: &Contact,
        urn: &Urn,
    ) -> Result<Urn> {
        let mut state = self.state.lock().unwrap();
        state.contacts.insert(urn.clone(), contact.clone());
        Ok(urn.clone())
    }

    async fn remove_urn_from_contact(
        &self,
        _channel: &Channel,
        _contact: &Contact,
        urn: &Urn,
    ) -> Result<Urn> {
        self.state.lock().unwrap().contacts.remove(urn);
        Ok(urn.clone())
    }

    fn new_incoming_msg(&self, channel: &Channel, urn: Urn, text: &str) -> Msg {
        Msg::incoming(channel.uuid, channel.channel_type.clone(), urn, text)
    }

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
    ) -> Msg {
        let mut msg = Msg::incoming(channel.uuid, channel.channel_type.clone(), urn, text)
            .with_id(id);
        msg.high_priority = high_priority;
        msg.quick_replies = quick_replies;
        msg.topic = topic;
        msg.response_to_external_id = response_to_external_id;
        msg.origin = Some(origin);
        msg.contact_last_seen_on = contact_last_seen_on;
        msg
    }

    fn new_msg_status_for_id(
        &self,
        channel: &Channel,
        id: MsgId,
        status: MsgStatusValue,
    ) -> MsgStatus {
        MsgStatus::for_id(channel.uuid, channel.channel_type.clone(), id, status)
    }

    fn new_msg_status_for_external_id(
        &self,
        channel: &Channel,
        external_id: &str,
        status: MsgStatusValue,
    ) -> MsgStatus {
        MsgStatus::for_external_id(
            channel.uuid,
            channel.channel_type.clone(),
            external_id,
            status,
        )
    }

    fn new_channel_event(
        &self,
        channel: &Channel,
        event_type: ChannelEventType,
        urn: Urn,
    ) -> ChannelEvent {
        ChannelEvent::new(channel.uuid, channel.channel_type.clone(), event_type, urn)
    }

    async fn check_external_id_seen(&self, mut msg: Msg) -> Msg {
        if let Some(key) = Self::dedup_key(&msg) {
            let state = self.state.lock().unwrap();
            if state.seen_external_ids.contains(&key) {
                msg.already_written = true;
            }
        }
        msg
    }

    async fn write_external_id_seen(&self, msg: &Msg) {
        if let Some(key) = Self::dedup_key(msg) {
            self.state.lock().unwrap().seen_external_ids.push(key);
        }
    }

    async fn write_msg(&self, msg: &mut Msg, _clog: &mut ChannelLog) -> Result<()> {
        // Received twice: a no-op, the first write stands.
        if msg.already_written {
            return Ok(());
        }

        let mut state = self.state.lock().unwrap();
        if state.error_on_queue {
            return Err(Error::Backend(anyhow!("unable to queue message")));
        }

        state.last_msg_id += 1;
        msg.id = MsgId::new(state.last_msg_id);
        state.written_msgs.push(msg.clone());
        Ok(())
    }

    async fn write_msg_status(&self, status: &MsgStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.status_error {
            Some(StatusWriteError::MsgNotFound) => return Err(Error::MsgNotFound),
            Some(StatusWriteError::WrongIncomingMsgStatus) => {
                return Err(Error::WrongIncomingMsgStatus);
            },
            Some(StatusWriteError::Backend) => {
                return Err(Error::Backend(anyhow!("status store unavailable")));
            },
            None => {},
        }
        state.written_statuses.push(status.clone());
        Ok(())
    }

    async fn write_channel_event(
        &self,
        event: &ChannelEvent,
        _clog: &mut ChannelLog,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .written_events
            .push(event.clone());
        Ok(())
    }

    async fn write_channel_log(&self, clog: &ChannelLog) -> Result<()> {
        self.state.lock().unwrap().written_clogs.push(clog.clone());
        Ok(())
    }

    async fn delete_msg_with_external_id(
        &self,
        _channel: &Channel,
        _external_id: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn pop_next_outgoing_msg(&self) -> Result<Option<Msg>> {
        Ok(self.state.lock().unwrap().outgoing.pop_front())
    }

    async fn push_outgoing_msg(&self, msg: Msg) -> Result<()> {
        self.state.lock().unwrap().outgoing.push_back(msg);
        Ok(())
    }

    async fn was_msg_sent(&self, id: MsgId) -> Result<bool> {
        Ok(*self.state.lock().unwrap().sent_msgs.get(&id).unwrap_or(&false))
    }

    async fn clear_msg_sent(&self, id: MsgId) -> Result<()> {
        self.state.lock().unwrap().sent_msgs.remove(&id);
        Ok(())
    }

    async fn mark_outgoing_msg_complete(&self, msg: &Msg, _status: &MsgStatus) -> Result<()> {
        self.state.lock().unwrap().sent_msgs.insert(msg.id, true);
        Ok(())
    }

    async fn save_attachment(
        &self,
        channel: &Channel,
        content_type: &str,
        data: &[u8],
        extension: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.storage_error {
            return Err(Error::Backend(anyhow!("{message}")));
        }

        state.saved_attachments.push(SavedAttachment {
            channel_uuid: channel.uuid,
            content_type: content_type.to_string(),
            data: data.to_vec(),
            extension: extension.to_string(),
        });
        Ok(format!(
            "https://backend.example.com/attachments/{}.{extension}",
            uuid::Uuid::new_v4()
        ))
    }

    async fn resolve_media(&self, url: &str) -> Result<Option<Media>> {
        Ok(self.state.lock().unwrap().media.get(url).cloned())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health(&self) -> String {
        String::new()
    }

    async fn status(&self) -> String {
        let state = self.state.lock().unwrap();
        format!("ALL GOOD\nqueued: {}", state.outgoing.len())
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }
}

/// Build a test channel with the given config pairs.
pub fn mock_channel(
    uuid: &str,
    channel_type: &str,
    address: &str,
    country: &str,
    config: serde_json::Value,
) -> Channel {
    let config = match config {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => panic!("channel config must be a JSON object, got {other}"),
    };
    Channel::new(
        uuid.parse().expect("valid channel uuid"),
        channel_type,
        address,
        country,
        config,
    )
}

#[cfg(test)]
mod tests {
    use {herald_core::ChannelLogType, serde_json::json};

    use super::*;

    const CHANNEL_UUID: &str = "8eb23e93-5ecb-45ba-b726-3b064e0c56ab";

    #[tokio::test]
    async fn dedup_marks_second_receive() {
        let backend = MockBackend::new();
        let channel = backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));
        let mut clog = ChannelLog::new(ChannelLogType::MsgReceive, channel.uuid);

        let msg = backend
            .new_incoming_msg(&channel, Urn::from_tel("254791541111").unwrap(), "hi")
            .with_external_id("ext-9");

        let mut first = backend.check_external_id_seen(msg.clone()).await;
        assert!(!first.already_written);
        backend.write_msg(&mut first, &mut clog).await.unwrap();
        backend.write_external_id_seen(&first).await;

        let second = backend.check_external_id_seen(msg).await;
        assert!(second.already_written);
        assert_eq!(backend.written_msgs().len(), 1);
    }

    #[tokio::test]
    async fn write_assigns_sequential_ids() {
        let backend = MockBackend::new();
        let channel = backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));
        let mut clog = ChannelLog::new(ChannelLogType::MsgReceive, channel.uuid);

        let mut a = backend.new_incoming_msg(&channel, Urn::from_tel("254791541111").unwrap(), "a");
        let mut b = backend.new_incoming_msg(&channel, Urn::from_tel("254791541112").unwrap(), "b");
        backend.write_msg(&mut a, &mut clog).await.unwrap();
        backend.write_msg(&mut b, &mut clog).await.unwrap();

        assert_eq!(a.id, MsgId::new(1));
        assert_eq!(b.id, MsgId::new(2));
    }

    #[tokio::test]
    async fn mark_complete_is_idempotent() {
        let backend = MockBackend::new();
        let channel = backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));

        let msg = backend
            .new_incoming_msg(&channel, Urn::from_tel("254791541111").unwrap(), "x")
            .with_id(MsgId::new(42));
        let status = backend.new_msg_status_for_id(&channel, msg.id, MsgStatusValue::Wired);

        backend.mark_outgoing_msg_complete(&msg, &status).await.unwrap();
        backend.mark_outgoing_msg_complete(&msg, &status).await.unwrap();
        assert!(backend.was_msg_sent(MsgId::new(42)).await.unwrap());

        backend.clear_msg_sent(MsgId::new(42)).await.unwrap();
        assert!(!backend.was_msg_sent(MsgId::new(42)).await.unwrap());
    }

    #[tokio::test]
    async fn contacts_created_on_first_lookup() {
        let backend = MockBackend::new();
        let channel = backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));
        let mut clog = ChannelLog::new(ChannelLogType::MsgReceive, channel.uuid);

        let urn = Urn::from_tel("254791541111").unwrap();
        let first = backend
            .get_contact(&channel, &urn, None, Some("Ann"), &mut clog)
            .await
            .unwrap();
        let second = backend
            .get_contact(&channel, &urn, None, None, &mut clog)
            .await
            .unwrap();
        assert_eq!(first.uuid, second.uuid);

        let other = Urn::from_tel("254791541112").unwrap();
        backend
            .add_urn_to_contact(&channel, &first, &other)
            .await
            .unwrap();
        let via_other = backend
            .get_contact(&channel, &other, None, None, &mut clog)
            .await
            .unwrap();
        assert_eq!(via_other.uuid, first.uuid);

        backend
            .remove_urn_from_contact(&channel, &first, &other)
            .await
            .unwrap();
        let recreated = backend
            .get_contact(&channel, &other, None, None, &mut clog)
            .await
            .unwrap();
        assert_ne!(recreated.uuid, first.uuid);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let backend = MockBackend::new();
        let channel = backend.add_channel(mock_channel(CHANNEL_UUID, "BS", "2020", "US", json!(null)));

        let a = backend
            .new_incoming_msg(&channel, Urn::from_tel("254791541111").unwrap(), "first")
            .with_id(MsgId::new(1));
        let b = backend
            .new_incoming_msg(&channel, Urn::from_tel("254791541111").unwrap(), "second")
            .with_id(MsgId::new(2));
        backend.push_outgoing_msg(a).await.unwrap();
        backend.push_outgoing_msg(b).await.unwrap();

        assert_eq!(
            backend.pop_next_outgoing_msg().await.unwrap().unwrap().text,
            "first"
        );
        assert_eq!(
            backend.pop_next_outgoing_msg().await.unwrap().unwrap().text,
            "second"
        );
        assert!(backend.pop_next_outgoing_msg().await.unwrap().is_none());
    }
}
