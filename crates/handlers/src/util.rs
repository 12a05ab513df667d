//! Helpers shared across provider adapters.

use std::time::Instant;

use herald_core::{ChannelLog, Error, HttpLog, Msg, Result};

/// What a provider's send API answered with.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Execute a provider request, recording the full exchange into the channel
/// log. Transport-level failures (connect, timeout) come back as
/// `Error::Transport`; HTTP error statuses are returned for the caller to
/// interpret.
pub async fn send_logged(
    client: &reqwest::Client,
    request: reqwest::Request,
    clog: &mut ChannelLog,
) -> Result<ProviderResponse> {
    let url = request.url().to_string();
    let mut summary = format!("{} {url}", request.method());
    if let Some(bytes) = request.body().and_then(|b| b.as_bytes()) {
        if !bytes.is_empty() {
            summary.push_str("\n\n");
            summary.push_str(&String::from_utf8_lossy(bytes));
        }
    }

    let started = Instant::now();
    match client.execute(request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            clog.http(HttpLog::new(&url, status, summary, &body, started.elapsed()));
            Ok(ProviderResponse { status, body })
        },
        Err(e) => {
            clog.http(HttpLog::new(&url, 0, summary, "", started.elapsed()));
            clog.error(format!("request failed: {e}"));
            Err(Error::transport(url, e))
        },
    }
}

/// Extract a required field, with the error message providers see.
pub fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::validation(format!("required field '{field}'"))),
    }
}

/// Message text with attachment URLs folded in, one per line.
pub fn text_and_attachments(msg: &Msg) -> String {
    let mut out = msg.text.clone();
    for attachment in &msg.attachments {
        let url = attachment
            .split_once(':')
            .map(|(_, url)| url)
            .unwrap_or(attachment);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(url);
    }
    out
}

/// Split a message into parts of at most `max_len` characters, breaking on
/// the last space within the limit where possible.
pub fn split_msg(text: &str, max_len: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if rest.chars().count() <= max_len {
            parts.push(rest.to_string());
            break;
        }

        let window: String = rest.chars().take(max_len).collect();
        let cut = window.rfind(' ').unwrap_or(window.len());
        parts.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    if parts.is_empty() {
        parts.push(String::new());
    }
    parts
}

/// A URN path without its leading `+`, as most SMS aggregators want it.
pub fn strip_plus(path: &str) -> &str {
    path.strip_prefix('+').unwrap_or(path)
}
