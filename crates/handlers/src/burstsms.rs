//! BurstSMS (transmitsms.com) adapter: query-string receive and status
//! callbacks, form-POST send API with basic auth.

use std::sync::Arc;

use {async_trait::async_trait, http::Method, serde::Deserialize};

use herald_core::{
    Channel, ChannelLog, ChannelType, Error, Msg, MsgStatus, MsgStatusValue, Result,
    backend::Backend,
    channel::keys,
    handler::{Handler, HandlerOutput, HandlerRequest, HandlerResponse, Route},
};

use crate::util;

const SEND_URL: &str = "https://api.transmitsms.com/send-sms.json";

pub struct BurstSmsHandler {
    client: reqwest::Client,
    send_url: String,
}

impl Default for BurstSmsHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl BurstSmsHandler {
    pub fn new() -> Self {
        Self::with_send_url(SEND_URL)
    }

    /// Point sends at a different endpoint (tests).
    pub fn with_send_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct ReceiveParams {
    response: Option<String>,
    mobile: Option<String>,
}

#[derive(Deserialize)]
struct StatusParams {
    message_id: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: Option<i64>,
}

fn status_for(value: &str) -> Result<MsgStatusValue> {
    match value {
        "delivered" => Ok(MsgStatusValue::Delivered),
        "pending" => Ok(MsgStatusValue::Sent),
        "soft-bounce" => Ok(MsgStatusValue::Errored),
        "hard-bounce" => Ok(MsgStatusValue::Failed),
        other => Err(Error::validation(format!("unknown status value: '{other}'"))),
    }
}

#[async_trait]
impl Handler for BurstSmsHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("BS")
    }

    fn name(&self) -> &'static str {
        "Burst SMS"
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::new(Method::GET, "receive"),
            Route::new(Method::GET, "status"),
        ]
    }

    async fn receive(
        &self,
        action: &str,
        channel: Arc<Channel>,
        request: HandlerRequest,
        backend: &dyn Backend,
        _clog: &mut ChannelLog,
    ) -> Result<HandlerOutput> {
        match action {
            "receive" => {
                let params: ReceiveParams = request.query_params()?;
                let text = util::required(params.response.as_deref(), "response")?;
                let mobile = util::required(params.mobile.as_deref(), "mobile")?;

                let urn = herald_core::Urn::from_tel(mobile)?;
                let msg = backend.new_incoming_msg(&channel, urn, text);

                Ok(HandlerOutput::respond(HandlerResponse::ok("Message Accepted"))
                    .with_msg(msg))
            },
            "status" => {
                let params: StatusParams = request.query_params()?;
                let message_id = util::required(params.message_id.as_deref(), "message_id")?;
                let value = util::required(params.status.as_deref(), "status")?;
                let status_value = status_for(value)?;

                let status =
                    backend.new_msg_status_for_external_id(&channel, message_id, status_value);

                Ok(
                    HandlerOutput::respond(HandlerResponse::ok("Status Update Accepted"))
                        .with_status(status),
                )
            },
            other => Err(Error::validation(format!("unknown action: {other}"))),
        }
    }

    async fn send(
        &self,
        msg: &Msg,
        channel: &Channel,
        _backend: &dyn Backend,
        clog: &mut ChannelLog,
    ) -> Result<MsgStatus> {
        let username = channel.config_string(keys::USERNAME, "");
        let password = channel.config_string(keys::PASSWORD, "");

        let form = [
            ("to", util::strip_plus(msg.urn.path()).to_string()),
            ("message", util::text_and_attachments(msg)),
            ("from", channel.address.as_str().to_string()),
        ];
        let request = self
            .client
            .post(&self.send_url)
            .basic_auth(&username, Some(&password))
            .form(&form)
            .build()
            .map_err(|e| Error::transport(&self.send_url, e))?;

        let response = util::send_logged(&self.client, request, clog).await?;

        let errored = || {
            backend_status(channel, msg, MsgStatusValue::Errored)
        };

        if !response.is_success() {
            clog.error(format!("received non-2xx status: {}", response.status));
            return Ok(errored());
        }

        let parsed: SendResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                clog.error(format!("unable to parse response body: {e}"));
                return Ok(errored());
            },
        };

        match parsed.message_id {
            Some(id) if id > 0 => Ok(
                backend_status(channel, msg, MsgStatusValue::Wired).with_external_id(id.to_string())
            ),
            _ => {
                clog.error("received invalid message id");
                Ok(backend_status(channel, msg, MsgStatusValue::Failed))
            },
        }
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        vec![channel.config_string(keys::PASSWORD, "")]
    }
}

fn backend_status(channel: &Channel, msg: &Msg, value: MsgStatusValue) -> MsgStatus {
    MsgStatus::for_id(channel.uuid, channel.channel_type.clone(), msg.id, value)
}
