//! Channel configuration: one configured connection to a provider endpoint.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::ids::{ChannelAddress, ChannelType, ChannelUuid};

/// Well-known per-channel config keys. Handlers may also define their own;
/// unknown keys are preserved and returned verbatim.
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const API_KEY: &str = "api_key";
    pub const SECRET: &str = "secret";
    pub const BASE_URL: &str = "base_url";
    pub const SEND_URL: &str = "send_url";
    pub const AUTH_TOKEN: &str = "auth_token";
    pub const SEND_AUTHORIZATION: &str = "send_authorization";
    pub const CALLBACK_DOMAIN: &str = "callback_domain";
    pub const SEND_METHOD: &str = "send_method";
    pub const SEND_BODY: &str = "send_body";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const MAX_LENGTH: &str = "max_length";
    pub const ENCODING: &str = "encoding";
    pub const VERIFY_SSL: &str = "verify_ssl";
    pub const USE_NATIONAL: &str = "use_national";
}

/// A configured channel, shared read-only with handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: ChannelUuid,
    pub channel_type: ChannelType,
    pub address: ChannelAddress,
    /// Two-letter country code, possibly empty.
    pub country: String,
    /// URN schemes this channel can address, primary first.
    pub schemes: Vec<String>,
    /// Opaque typed config map; see [`keys`] for common entries.
    pub config: serde_json::Map<String, Value>,
}

impl Channel {
    pub fn new(
        uuid: ChannelUuid,
        channel_type: impl Into<ChannelType>,
        address: impl Into<ChannelAddress>,
        country: impl Into<String>,
        config: serde_json::Map<String, Value>,
    ) -> Self {
        Self {
            uuid,
            channel_type: channel_type.into(),
            address: address.into(),
            country: country.into(),
            schemes: vec!["tel".to_string()],
            config,
        }
    }

    pub fn scheme(&self) -> &str {
        self.schemes.first().map(String::as_str).unwrap_or("tel")
    }

    /// String config value, falling back to `default` when absent or not a
    /// string.
    pub fn config_string(&self, key: &str, default: &str) -> String {
        match self.config.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Integer config value; accepts JSON numbers and numeric strings.
    pub fn config_int(&self, key: &str, default: i64) -> i64 {
        match self.config.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Boolean config value; accepts JSON booleans and "true"/"false" strings.
    pub fn config_bool(&self, key: &str, default: bool) -> bool {
        match self.config.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// List-of-string config value; non-string entries are skipped.
    pub fn config_string_list(&self, key: &str) -> Vec<String> {
        match self.config.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}
