//! The canonical message record and its delivery-status companion.

use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{
    ids::{ChannelType, ChannelUuid, MsgId, MsgUuid},
    locale::Locale,
    urn::Urn,
};

/// Where an outgoing message originated on the upstream platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgOrigin {
    Flow,
    Chat,
    Broadcast,
    Ticket,
}

/// Reference to the flow an outgoing message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReference {
    pub uuid: String,
    pub name: String,
}

/// Delivery state of a message.
///
/// `P` and `H` apply to incoming messages only; `F` is terminal by
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgStatusValue {
    /// Wired: queued to the provider, awaiting confirmation.
    #[serde(rename = "W")]
    Wired,
    #[serde(rename = "S")]
    Sent,
    #[serde(rename = "D")]
    Delivered,
    /// Errored: retryable failure, the upstream platform may re-queue.
    #[serde(rename = "E")]
    Errored,
    /// Failed: permanent failure, never retried.
    #[serde(rename = "F")]
    Failed,
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "P")]
    Pending,
    #[serde(rename = "H")]
    Handled,
}

impl MsgStatusValue {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Wired => "W",
            Self::Sent => "S",
            Self::Delivered => "D",
            Self::Errored => "E",
            Self::Failed => "F",
            Self::Read => "R",
            Self::Pending => "P",
            Self::Handled => "H",
        }
    }
}

impl fmt::Display for MsgStatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// The canonical message record, incoming or outgoing.
///
/// Immutable once persisted; the `with_*` setters below modify the value
/// before it is handed to the backend for writing. Channel linkage is by
/// uuid + type; the registry resolves the full [`crate::Channel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Msg {
    pub id: MsgId,
    pub uuid: MsgUuid,
    pub channel_uuid: ChannelUuid,
    pub channel_type: ChannelType,

    pub urn: Urn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn_auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,

    pub text: String,
    /// Ordered `contentType:url` pairs.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub quick_replies: Vec<String>,
    #[serde(default, skip_serializing_if = "Locale::is_nil")]
    pub locale: Locale,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to_external_id: Option<String>,
    #[serde(default)]
    pub high_priority: bool,
    #[serde(default)]
    pub is_resend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<MsgOrigin>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_last_seen_on: Option<DateTime<Utc>>,

    /// Opaque session context from the upstream platform, not interpreted.
    #[serde(default)]
    pub event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_status: Option<String>,

    /// Set by the dedup layer when this external ID was already written.
    #[serde(skip)]
    pub already_written: bool,
}

impl Msg {
    /// A bare incoming message; backends use this as their factory base.
    pub fn incoming(channel_uuid: ChannelUuid, channel_type: ChannelType, urn: Urn, text: impl Into<String>) -> Self {
        Self {
            id: MsgId::NIL,
            uuid: MsgUuid::new(),
            channel_uuid,
            channel_type,
            urn,
            urn_auth: None,
            contact_name: None,
            text: text.into(),
            attachments: Vec::new(),
            quick_replies: Vec::new(),
            locale: Locale::NIL,
            metadata: Value::Null,
            topic: None,
            external_id: None,
            flow: None,
            response_to_external_id: None,
            high_priority: false,
            is_resend: false,
            origin: None,
            received_on: None,
            sent_on: None,
            contact_last_seen_on: None,
            event_id: 0,
            session_status: None,
            already_written: false,
        }
    }

    pub fn flow_name(&self) -> Option<&str> {
        self.flow.as_ref().map(|f| f.name.as_str())
    }

    pub fn flow_uuid(&self) -> Option<&str> {
        self.flow.as_ref().map(|f| f.uuid.as_str())
    }

    // Value-consuming setters, applied before the record is persisted.

    #[must_use]
    pub fn with_id(mut self, id: MsgId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: MsgUuid) -> Self {
        self.uuid = uuid;
        self
    }

    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_received_on(mut self, date: DateTime<Utc>) -> Self {
        self.received_on = Some(date);
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, url: impl Into<String>) -> Self {
        self.attachments.push(url.into());
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn with_urn_auth(mut self, auth: impl Into<String>) -> Self {
        self.urn_auth = Some(auth.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_flow(mut self, flow: FlowReference) -> Self {
        self.flow = Some(flow);
        self
    }
}

/// A delivery report for one message, addressed by internal ID or by the
/// provider-side external ID; at least one must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgStatus {
    pub channel_uuid: ChannelUuid,
    pub channel_type: ChannelType,
    pub msg_id: MsgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub status: MsgStatusValue,
    pub created_on: DateTime<Utc>,
}

impl MsgStatus {
    pub fn for_id(
        channel_uuid: ChannelUuid,
        channel_type: ChannelType,
        msg_id: MsgId,
        status: MsgStatusValue,
    ) -> Self {
        Self {
            channel_uuid,
            channel_type,
            msg_id,
            external_id: None,
            status,
            created_on: Utc::now(),
        }
    }

    pub fn for_external_id(
        channel_uuid: ChannelUuid,
        channel_type: ChannelType,
        external_id: impl Into<String>,
        status: MsgStatusValue,
    ) -> Self {
        Self {
            channel_uuid,
            channel_type,
            msg_id: MsgId::NIL,
            external_id: Some(external_id.into()),
            status,
            created_on: Utc::now(),
        }
    }

    /// True when either addressing field resolves a target message.
    pub fn has_target(&self) -> bool {
        !self.msg_id.is_nil() || self.external_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }
}
