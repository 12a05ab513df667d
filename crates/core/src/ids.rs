//! Identifier newtypes: message, channel and contact IDs.

use std::fmt;

use {
    serde::{Deserialize, Deserializer, Serialize, Serializer},
    uuid::Uuid,
};

// ── MsgId ────────────────────────────────────────────────────────────────────

/// Database-assigned message ID. Nil until the backend persists the message
/// (incoming) or the upstream platform provides one (outgoing).
///
/// Encodes to JSON `null` when nil and a bare integer otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MsgId(Option<i64>);

impl MsgId {
    pub const NIL: MsgId = MsgId(None);

    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(Some(id))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0
    }
}

impl From<i64> for MsgId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "null"),
        }
    }
}

impl Serialize for MsgId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MsgId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Option::<i64>::deserialize(deserializer)?))
    }
}

// ── UUID newtypes ────────────────────────────────────────────────────────────

macro_rules! uuid_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub const NIL: $name = $name(Uuid::nil());

            /// Generate a fresh random (v4) identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_newtype!(
    /// UUID of a message which has been received.
    MsgUuid
);
uuid_newtype!(
    /// UUID identifying a configured channel.
    ChannelUuid
);
uuid_newtype!(
    /// UUID identifying a contact on the upstream platform.
    ContactUuid
);

// ── Channel type & address ───────────────────────────────────────────────────

/// Short opaque code identifying a provider integration, e.g. "BS" or "PM".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(String);

impl ChannelType {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased form used in dispatch URLs (`/c/bs/…`).
    pub fn path_segment(&self) -> String {
        self.0.to_lowercase()
    }
}

impl From<&str> for ChannelType {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-side channel address: a shortcode, phone number or account ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelAddress(String);

impl ChannelAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
