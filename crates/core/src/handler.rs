//! The protocol-adapter contract and its registry.
//!
//! Each provider integration implements [`Handler`]: a capability set of
//! declared routes, a `receive` entry point that parses provider callbacks
//! into domain objects, and a `send` method that performs the outbound
//! exchange. Handlers never write to the backend — they build objects
//! through its factories and return them; the server drives persistence.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    http::{HeaderMap, Method, StatusCode},
};

use crate::{
    backend::Backend,
    channel::Channel,
    clog::ChannelLog,
    error::{Error, Result},
    event::ChannelEvent,
    ids::ChannelType,
    msg::{Msg, MsgStatus},
};

/// One declared route, relative to `/c/{type-lower}/{channel-uuid}/`.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub action: &'static str,
}

impl Route {
    pub fn new(method: Method, action: &'static str) -> Self {
        Self { method, action }
    }
}

/// The inbound HTTP request as handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: Method,
    /// Raw query string, without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HandlerRequest {
    /// Decode the query string into a typed struct.
    pub fn query_params<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(&self.query)
            .map_err(|e| Error::validation(format!("invalid query parameters: {e}")))
    }

    /// Decode a form-encoded body into a typed struct.
    pub fn form_params<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_bytes(&self.body)
            .map_err(|e| Error::validation(format!("invalid form body: {e}")))
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// The provider-facing response a handler authored.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: String,
    pub content_type: &'static str,
}

impl HandlerResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
            content_type: "text/plain; charset=utf-8",
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
            content_type: "application/json",
        }
    }
}

/// Everything a handler route produced: domain objects for the server to
/// persist (in order) and the response to hand back to the provider.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    pub msgs: Vec<Msg>,
    pub statuses: Vec<MsgStatus>,
    pub events: Vec<ChannelEvent>,
    pub response: Option<HandlerResponse>,
}

impl HandlerOutput {
    pub fn respond(response: HandlerResponse) -> Self {
        Self {
            response: Some(response),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_msg(mut self, msg: Msg) -> Self {
        self.msgs.push(msg);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: MsgStatus) -> Self {
        self.statuses.push(status);
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: ChannelEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// A provider integration for one channel type.
#[async_trait]
pub trait Handler: Send + Sync {
    /// The channel type code this handler serves, e.g. "BS".
    fn channel_type(&self) -> ChannelType;

    /// Human-readable provider name.
    fn name(&self) -> &'static str;

    /// The routes this handler answers, in declaration order.
    fn routes(&self) -> Vec<Route>;

    /// Handle an inbound provider callback for one of the declared routes.
    ///
    /// `Error::Validation` becomes a 400 with the error's message; transient
    /// errors become 5xx so the provider retries.
    async fn receive(
        &self,
        action: &str,
        channel: Arc<Channel>,
        request: HandlerRequest,
        backend: &dyn Backend,
        clog: &mut ChannelLog,
    ) -> Result<HandlerOutput>;

    /// Perform the outbound exchange for one message, recording every HTTP
    /// exchange into `clog`, and return the final disposition.
    async fn send(
        &self,
        msg: &Msg,
        channel: &Channel,
        backend: &dyn Backend,
        clog: &mut ChannelLog,
    ) -> Result<MsgStatus>;

    /// Secret values to scrub from channel logs for this channel.
    fn redact_values(&self, _channel: &Channel) -> Vec<String> {
        Vec::new()
    }
}

/// Explicit handler registry, built at startup and injected into the server
/// and dispatcher. Keyed by channel-type string.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ChannelType, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.channel_type(), handler);
    }

    pub fn get(&self, channel_type: &ChannelType) -> Option<Arc<dyn Handler>> {
        self.handlers.get(channel_type).cloned()
    }

    pub fn channel_types(&self) -> Vec<&ChannelType> {
        self.handlers.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;

    #[async_trait]
    impl Handler for NullHandler {
        fn channel_type(&self) -> ChannelType {
            ChannelType::new("XX")
        }

        fn name(&self) -> &'static str {
            "Null"
        }

        fn routes(&self) -> Vec<Route> {
            vec![Route::new(Method::GET, "receive")]
        }

        async fn receive(
            &self,
            _action: &str,
            _channel: Arc<Channel>,
            _request: HandlerRequest,
            _backend: &dyn Backend,
            _clog: &mut ChannelLog,
        ) -> Result<HandlerOutput> {
            Ok(HandlerOutput::respond(HandlerResponse::ok("ok")))
        }

        async fn send(
            &self,
            _msg: &Msg,
            _channel: &Channel,
            _backend: &dyn Backend,
            _clog: &mut ChannelLog,
        ) -> Result<MsgStatus> {
            unimplemented!("not used in this test")
        }
    }

    #[test]
    fn registry_lookup_by_type() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NullHandler));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&ChannelType::new("xx")).is_some());
        assert!(registry.get(&ChannelType::new("YY")).is_none());
    }

    #[test]
    fn query_param_decoding() {
        #[derive(serde::Deserialize)]
        struct Params {
            response: Option<String>,
            mobile: Option<String>,
        }

        let req = HandlerRequest {
            method: Method::GET,
            query: "response=Msg&mobile=254791541111".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        let params: Params = req.query_params().unwrap();
        assert_eq!(params.response.as_deref(), Some("Msg"));
        assert_eq!(params.mobile.as_deref(), Some("254791541111"));
    }
}
