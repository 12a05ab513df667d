/// Crate-wide result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the backend and handler contracts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No channel exists for the requested type/uuid or type/address pair.
    #[error("channel not found")]
    ChannelNotFound,

    /// A status update referenced an external ID we have no message for.
    #[error("message not found")]
    MsgNotFound,

    /// A status update tried to move an incoming message out of pending/handled.
    #[error("incoming messages can only be pending or handled")]
    WrongIncomingMsgStatus,

    /// Request payload or parameter is invalid; surfaced as 400 to providers.
    #[error("{message}")]
    Validation { message: String },

    /// URN failed to parse or normalize.
    #[error("invalid URN: {value}")]
    InvalidUrn { value: String },

    /// Provider-facing HTTP exchange failed at the transport level.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Anything else from the persistence substrate.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn validation(message: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_urn(value: impl Into<String>) -> Self {
        Self::InvalidUrn {
            value: value.into(),
        }
    }

    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// True for errors the provider should be told to retry (5xx).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Transport { .. })
    }
}
