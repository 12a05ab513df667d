//! Per-request channel logs: a short-lived trace of every HTTP exchange and
//! error that happened while handling one request or one send attempt.

use std::time::{Duration, Instant};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

use crate::ids::ChannelUuid;

const REDACTION_MASK: &str = "**********";

/// What kind of work a channel log traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLogType {
    MsgReceive,
    MsgStatus,
    MsgSend,
    EventReceive,
    AttachmentFetch,
}

/// One recorded HTTP exchange: request, response, latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpLog {
    pub url: String,
    pub status_code: u16,
    pub request: String,
    pub response: String,
    pub elapsed_ms: u64,
    pub created_on: DateTime<Utc>,
}

impl HttpLog {
    pub fn new(
        url: impl Into<String>,
        status_code: u16,
        request: impl Into<String>,
        response: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            status_code,
            request: request.into(),
            response: response.into(),
            elapsed_ms: elapsed.as_millis() as u64,
            created_on: Utc::now(),
        }
    }
}

/// A recorded error with an optional provider-specific code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogError {
    pub code: String,
    pub message: String,
}

/// The per-request trace object. Born at request intake or send attempt,
/// owned by the calling component until handed to the backend via
/// `write_channel_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLog {
    pub uuid: Uuid,
    pub log_type: ChannelLogType,
    pub channel_uuid: ChannelUuid,
    pub http_logs: Vec<HttpLog>,
    pub errors: Vec<LogError>,
    pub created_on: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Secret values masked out of recorded requests and responses.
    #[serde(skip)]
    redact_values: Vec<String>,
    #[serde(skip, default = "Instant::now")]
    started: Instant,
}

impl ChannelLog {
    pub fn new(log_type: ChannelLogType, channel_uuid: ChannelUuid) -> Self {
        Self::with_redaction(log_type, channel_uuid, Vec::new())
    }

    pub fn with_redaction(
        log_type: ChannelLogType,
        channel_uuid: ChannelUuid,
        redact_values: Vec<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            log_type,
            channel_uuid,
            http_logs: Vec::new(),
            errors: Vec::new(),
            created_on: Utc::now(),
            elapsed_ms: 0,
            redact_values,
            started: Instant::now(),
        }
    }

    /// Record one HTTP exchange, masking any configured secrets.
    pub fn http(&mut self, mut log: HttpLog) {
        for secret in &self.redact_values {
            if secret.is_empty() {
                continue;
            }
            log.url = log.url.replace(secret, REDACTION_MASK);
            log.request = log.request.replace(secret, REDACTION_MASK);
            log.response = log.response.replace(secret, REDACTION_MASK);
        }
        self.http_logs.push(log);
    }

    /// Record an error without a provider code.
    pub fn error(&mut self, message: impl std::fmt::Display) {
        self.raw_error("", message);
    }

    /// Record an error with a provider-specific code.
    pub fn raw_error(&mut self, code: impl Into<String>, message: impl std::fmt::Display) {
        let mut message = message.to_string();
        for secret in &self.redact_values {
            if !secret.is_empty() {
                message = message.replace(secret, REDACTION_MASK);
            }
        }
        self.errors.push(LogError {
            code: code.into(),
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Close the trace, stamping total elapsed time.
    pub fn end(&mut self) {
        self.elapsed_ms = self.started.elapsed().as_millis() as u64;
    }
}
