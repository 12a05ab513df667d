//! BongoLive (Tanzania) adapter. One callback route multiplexes incoming
//! messages and delivery reports on the `msgtype` form field; sends go out
//! as a POST with upper-cased query parameters.

use std::sync::Arc;

use {async_trait::async_trait, http::Method, serde::Deserialize};

use herald_core::{
    Channel, ChannelLog, ChannelType, Error, Msg, MsgStatus, MsgStatusValue, Result, Urn,
    backend::Backend,
    channel::keys,
    handler::{Handler, HandlerOutput, HandlerRequest, HandlerResponse, Route},
};

use crate::util;

const SEND_URL: &str = "https://launch.bongolive.co.tz/send_sms_v2_api.php";

const MSG_TYPE_INCOMING: &str = "1";
const MSG_TYPE_STATUS: &str = "5";

pub struct BongoLiveHandler {
    client: reqwest::Client,
    send_url: String,
}

impl Default for BongoLiveHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl BongoLiveHandler {
    pub fn new() -> Self {
        Self::with_send_url(SEND_URL)
    }

    pub fn with_send_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct CallbackForm {
    msgtype: Option<String>,
    id: Option<String>,
    message: Option<String>,
    sourceaddr: Option<String>,
    dlrid: Option<String>,
    status: Option<String>,
}

fn status_for(value: &str) -> Result<MsgStatusValue> {
    match value {
        "1" => Ok(MsgStatusValue::Delivered),
        "2" => Ok(MsgStatusValue::Sent),
        "3" => Ok(MsgStatusValue::Failed),
        other => Err(Error::validation(format!("unknown status value: '{other}'"))),
    }
}

#[derive(Deserialize)]
struct SendResponse {
    results: Vec<SendResult>,
}

#[derive(Deserialize)]
struct SendResult {
    status: String,
    msgid: Option<String>,
}

#[async_trait]
impl Handler for BongoLiveHandler {
    fn channel_type(&self) -> ChannelType {
        ChannelType::new("BL")
    }

    fn name(&self) -> &'static str {
        "Bongo Live"
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
        let form: CallbackForm = request.form_params()?;

        match form.msgtype.as_deref().unwrap_or(MSG_TYPE_INCOMING) {
            MSG_TYPE_INCOMING => {
                let source = util::required(form.sourceaddr.as_deref(), "sourceaddr")?;
                let text = form.message.unwrap_or_default();

                let urn = Urn::from_tel(source)?;
                let mut msg = backend.new_incoming_msg(&channel, urn, &text);
                if let Some(id) = form.id.filter(|id| !id.is_empty()) {
                    msg = msg.with_external_id(id);
                }

                Ok(HandlerOutput::respond(HandlerResponse::ok("")).with_msg(msg))
            },
            MSG_TYPE_STATUS => {
                let dlrid = util::required(form.dlrid.as_deref(), "dlrid")?;
                let value = util::required(form.status.as_deref(), "status")?;
                let status_value = status_for(value)?;

                let status =
                    backend.new_msg_status_for_external_id(&channel, dlrid, status_value);

                Ok(HandlerOutput::respond(HandlerResponse::ok("")).with_status(status))
            },
            other => Err(Error::validation(format!("unknown message type: '{other}'"))),
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

        // The aggregator wants everything in the query string, empty body.
        let params = [
            ("USERNAME", username),
            ("PASSWORD", password),
            ("SOURCEADDR", channel.address.as_str().to_string()),
            ("DESTADDR", util::strip_plus(msg.urn.path()).to_string()),
            ("MESSAGE", util::text_and_attachments(msg)),
            ("DLR", "1".to_string()),
        ];
        let request = self
            .client
            .post(&self.send_url)
            .query(&params)
            .build()
            .map_err(|e| Error::transport(&self.send_url, e))?;

        let response = util::send_logged(&self.client, request, clog).await?;

        let errored = || status_for_msg(channel, msg, MsgStatusValue::Errored);

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

        match parsed.results.first() {
            Some(result) if result.status == "0" => {
                let mut status = status_for_msg(channel, msg, MsgStatusValue::Wired);
                if let Some(msgid) = &result.msgid {
                    status = status.with_external_id(msgid);
                }
                Ok(status)
            },
            Some(result) => {
                clog.error(format!("received non-zero status: '{}'", result.status));
                Ok(errored())
            },
            None => {
                clog.error("response contained no results");
                Ok(errored())
            },
        }
    }

    fn redact_values(&self, channel: &Channel) -> Vec<String> {
        vec![channel.config_string(keys::PASSWORD, "")]
    }
}

fn status_for_msg(channel: &Channel, msg: &Msg, value: MsgStatusValue) -> MsgStatus {
    MsgStatus::for_id(channel.uuid, channel.channel_type.clone(), msg.id, value)
}
