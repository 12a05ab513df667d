//! A scripted handler for exercising the server and dispatcher.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use {async_trait::async_trait, http::Method};

use herald_core::{
    Channel, ChannelLog, ChannelType, Error, Msg, MsgStatus, MsgStatusValue, Result,
    backend::Backend,
    handler::{Handler, HandlerOutput, HandlerRequest, HandlerResponse, Route},
};

/// What `send` should do for the next message.
#[derive(Debug, Clone)]
pub enum SendScript {
    /// Return a status with this value.
    Status(MsgStatusValue),
    /// Fail with a transport error.
    TransportError,
    /// Panic mid-send (worker recovery scenarios).
    Panic,
}

/// Handler double: receive echoes a canned response, send follows a script
/// and counts invocations.
pub struct MockHandler {
    channel_type: ChannelType,
    script: Mutex<SendScript>,
    sends: AtomicUsize,
}

impl MockHandler {
    pub fn new(channel_type: &str) -> Arc<Self> {
        Arc::new(Self {
            channel_type: ChannelType::new(channel_type),
            script: Mutex::new(SendScript::Status(MsgStatusValue::Wired)),
            sends: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, script: SendScript) {
        *self.script.lock().unwrap() = script;
    }

    /// How many times `send` reached the provider call.
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for MockHandler {
    fn channel_type(&self) -> ChannelType {
        self.channel_type.clone()
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::new(Method::GET, "receive"),
            Route::new(Method::POST, "receive"),
            Route::new(Method::GET, "boom"),
        ]
    }

    async fn receive(
        &self,
        action: &str,
        _channel: Arc<Channel>,
        _request: HandlerRequest,
        _backend: &dyn Backend,
        _clog: &mut ChannelLog,
    ) -> Result<HandlerOutput> {
        if action == "boom" {
            panic!("scripted receive panic");
        }
        Ok(HandlerOutput::respond(HandlerResponse::ok("ok")))
    }

    async fn send(
        &self,
        msg: &Msg,
        channel: &Channel,
        _backend: &dyn Backend,
        _clog: &mut ChannelLog,
    ) -> Result<MsgStatus> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        match script {
            SendScript::Status(value) => Ok(MsgStatus::for_id(
                channel.uuid,
                channel.channel_type.clone(),
                msg.id,
                value,
            )),
            SendScript::TransportError => {
                Err(Error::transport("https://provider.example.com", "connection reset"))
            },
            SendScript::Panic => panic!("scripted send panic"),
        }
    }
}
