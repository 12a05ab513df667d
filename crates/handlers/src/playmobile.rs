//! Playmobile (Uzbekistan) adapter: XML receive callbacks, JSON broker send
//! API with basic auth and 640-character message splitting.

use std::sync::Arc;

use {
    async_trait::async_trait,
    http::Method,
    serde::{Deserialize, Serialize},
};

use herald_core::{
    Channel, ChannelLog, ChannelType, Error, Msg, MsgStatus, MsgStatusValue, Result, Urn,
    backend::Backend,
    channel::keys,
    handler::{Handler, HandlerOutput, HandlerRequest, HandlerResponse, Route},
};

use crate::util;

const DEFAULT_MAX_LENGTH: i64 = 640;

pub struct PlayMobileHandler {
    client: reqwest::Client,
}

impl Default for PlayMobileHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayMobileHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

// ── receive XML shapes ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SmsRequest {
    #[serde(rename = "message", default)]
    messages: Vec<XmlMessage>,
}

#[derive(Debug, Deserialize)]
struct XmlMessage {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@msisdn")]
    msisdn: Option<String>,
    #[serde(rename = "content", default)]
    contents: Vec<XmlContent>,
}

#[derive(Debug, Deserialize)]
struct XmlContent {
    #[serde(rename = "$text")]
    text: Option<String>,
}

// ── send JSON shapes ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SendPayload<'a> {
    messages: Vec<OutMessage<'a>>,
}

#[derive(Serialize)]
struct OutMessage<'a> {
    recipient: &'a str,
    #[serde(rename = "message-id")]
    message_id: String,
    sms: OutSms<'a>,
}

#[derive(Serialize)]
struct OutSms<'a> {
    originator: &'a str,
    content: OutContent,
}

#[derive(Serialize)]
struct OutContent {
    text: String,
}

/// Drop a configured prefix (case-insensitive) plus one following space from
/// an incoming message.
fn strip_prefixes(text: &str, prefixes: &[String]) -> String {
    for prefix in prefixes {
        let head: String = text.chars().take(prefix.chars().count()).collect();
        if !head.is_empty() && head.eq_ignore_ascii_case(prefix) {
            let stripped = &text[head.len()..];
            return stripped.strip_prefix(' ').unwrap_or(stripped).to_string();
        }
    }
    text.to_string()
}

#[async_trait]
impl Handler for PlayMobileHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("PM")
    }

    fn name(&self) -> &'static str {
        "Play Mobile"
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::new(Method::POST, "receive")]
    }

    async fn receive(
        &self,
        _action: &str,
        channel: Arc<Channel>,
        request: HandlerRequest,
        backend: &dyn Backend,
        _clog: &mut ChannelLog,
    ) -> Result<HandlerOutput> {
        let payload: SmsRequest = quick_xml::de::from_str(&request.body_str())
            .map_err(|e| Error::validation(format!("unable to parse request XML: {e}")))?;

        if payload.messages.is_empty() {
            return Ok(HandlerOutput::respond(HandlerResponse::ok(
                "no messages, ignored",
            )));
        }

        let prefixes = channel.config_string_list("incoming_prefixes");
        let mut output = HandlerOutput::default();

        for message in payload.messages {
            let msisdn = message.msisdn.as_deref().unwrap_or("");
            let id = message.id.as_deref().unwrap_or("");
            if msisdn.is_empty() || id.is_empty() {
                return Err(Error::validation("missing required fields msidsn or id"));
            }

            let raw_text = message
                .contents
                .first()
                .and_then(|c| c.text.as_deref())
                .unwrap_or("");
            let text = strip_prefixes(raw_text, &prefixes);
            if text.is_empty() {
                return Err(Error::validation("no text"));
            }

            let urn = Urn::from_tel(msisdn)?;
            let msg = backend
                .new_incoming_msg(&channel, urn, &text)
                .with_external_id(id);
            output = output.with_msg(msg);
        }

        output.response = Some(HandlerResponse::ok("Accepted"));
        Ok(output)
    }

    async fn send(
        &self,
        msg: &Msg,
        channel: &Channel,
        _backend: &dyn Backend,
        clog: &mut ChannelLog,
    ) -> Result<MsgStatus> {
        let base_url = channel.config_string(keys::BASE_URL, "");
        if base_url.is_empty() {
            clog.error("missing base_url config");
            return Ok(errored(channel, msg));
        }
        let username = channel.config_string(keys::USERNAME, "");
        let password = channel.config_string(keys::PASSWORD, "");
        let originator = {
            let shortcode = channel.config_string("shortcode", "");
            if shortcode.is_empty() {
                channel.address.as_str().to_string()
            } else {
                shortcode
            }
        };

        let max_length = channel.config_int(keys::MAX_LENGTH, DEFAULT_MAX_LENGTH) as usize;
        let text = util::text_and_attachments(msg);
        let parts = util::split_msg(&text, max_length);
        let multipart = parts.len() > 1;

        let send_url = format!("{base_url}/broker-api/send");
        let recipient = util::strip_plus(msg.urn.path());

        for (i, part) in parts.into_iter().enumerate() {
            let message_id = if multipart {
                format!("{}.{}", msg.id, i + 1)
            } else {
                msg.id.to_string()
            };
            let payload = SendPayload {
                messages: vec![OutMessage {
                    recipient,
                    message_id,
                    sms: OutSms {
                        originator: &originator,
                        content: OutContent { text: part },
                    },
                }],
            };

            let request = self
                .client
                .post(&send_url)
                .basic_auth(&username, Some(&password))
                .json(&payload)
                .build()
                .map_err(|e| Error::transport(&send_url, e))?;

            let response = util::send_logged(&self.client, request, clog).await?;
            if !response.is_success() {
                clog.error(format!("received non-2xx status: {}", response.status));
                return Ok(errored(channel, msg));
            }
        }

        Ok(MsgStatus::for_id(
            channel.uuid,
            channel.channel_type.clone(),
            msg.id,
            MsgStatusValue::Wired,
        ))
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        vec![channel.config_string(keys::PASSWORD, "")]
    }
}

fn errored(channel: &Channel, msg: &Msg) -> MsgStatus {
    MsgStatus::for_id(
        channel.uuid,
        channel.channel_type.clone(),
        msg.id,
        MsgStatusValue::Errored,
    )
}
