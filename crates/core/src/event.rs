//! Non-message channel signals: conversation starts, referrals, calls.

use std::collections::HashMap;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    ids::{ChannelType, ChannelUuid},
    urn::Urn,
};

/// The kinds of non-message events a provider can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventType {
    NewConversation,
    Referral,
    Follow,
    StopContact,
    WelcomeMessage,
    MoMiss,
    MtCall,
    MtMiss,
    MoCall,
}

/// A non-message signal received on a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel_uuid: ChannelUuid,
    pub channel_type: ChannelType,
    pub event_type: ChannelEventType,
    pub urn: Urn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    /// Opaque provider-specific extras, passed through to the platform.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
    pub occurred_on: DateTime<Utc>,
}

impl ChannelEvent {
    pub fn new(
        channel_uuid: ChannelUuid,
        channel_type: ChannelType,
        event_type: ChannelEventType,
        urn: Urn,
    ) -> Self {
        Self {
            channel_uuid,
            channel_type,
            event_type,
            urn,
            contact_name: None,
            extra: HashMap::new(),
            occurred_on: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: HashMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    #[must_use]
    pub fn with_occurred_on(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_on = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChannelEventType::NewConversation).unwrap(),
            "\"new_conversation\""
        );
        assert_eq!(
            serde_json::to_string(&ChannelEventType::MtCall).unwrap(),
            "\"mt_call\""
        );
    }
}
