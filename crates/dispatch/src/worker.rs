//! The send worker pool: pops queued outgoing messages, enforces the
//! send-once guard, invokes handlers under a deadline and panic guard, and
//! records the outcome.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use {
    futures::FutureExt,
    tokio::{sync::watch, task::JoinHandle},
    tracing::{debug, error, info, warn},
};

use herald_core::{
    ChannelLog, ChannelLogType, ChannelRegistry, Config, Msg, MsgStatus, MsgStatusValue,
    backend::Backend,
    handler::HandlerRegistry,
};

use crate::recorder;

/// How long an idle worker sleeps before re-polling an empty queue.
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(500);

/// The outbound dispatcher. Owns nothing but configuration and shared
/// references; `start` spawns the worker pool.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    channels: Arc<ChannelRegistry>,
    handlers: Arc<HandlerRegistry>,
    config: Arc<Config>,
}

/// Running worker pool. Dropping the handle does not stop the workers; call
/// [`DispatcherHandle::stop`].
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        handlers: Arc<HandlerRegistry>,
        config: Config,
    ) -> Self {
        Self {
            channels: Arc::new(ChannelRegistry::new(Arc::clone(&backend))),
            backend,
            handlers,
            config: Arc::new(config),
        }
    }

    /// Spawn the worker pool.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker_count = self.config.worker_count();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let dispatcher = Arc::new(self);

        info!(workers = worker_count, "starting send workers");
        let workers = (0..worker_count)
            .map(|n| {
                let dispatcher = Arc::clone(&dispatcher);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(dispatcher.run_worker(n, shutdown_rx))
            })
            .collect();

        DispatcherHandle {
            shutdown_tx,
            workers,
            grace,
        }
    }

    async fn run_worker(self: Arc<Self>, n: usize, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker = n, "send worker up");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.backend.pop_next_outgoing_msg().await {
                Ok(Some(msg)) => self.process(msg).await,
                Ok(None) => {
                    // Empty queue: back off, racing the shutdown signal so we
                    // exit promptly.
                    tokio::select! {
                        _ = shutdown_rx.changed() => {},
                        _ = tokio::time::sleep(EMPTY_POLL_BACKOFF) => {},
                    }
                },
                Err(e) => {
                    warn!(worker = n, error = %e, "queue pop failed");
                    tokio::select! {
                        _ = shutdown_rx.changed() => {},
                        _ = tokio::time::sleep(EMPTY_POLL_BACKOFF) => {},
                    }
                },
            }
        }
        debug!(worker = n, "send worker stopped");
    }

    /// Drive one popped message to a recorded status. Never propagates —
    /// a single failed send must not take down the pool.
    async fn process(&self, msg: Msg) {
        let errored = |clog: &mut ChannelLog, message: &str| {
            clog.error(message);
            MsgStatus::for_id(
                msg.channel_uuid,
                msg.channel_type.clone(),
                msg.id,
                MsgStatusValue::Errored,
            )
        };

        let mut clog = ChannelLog::new(ChannelLogType::MsgSend, msg.channel_uuid);

        let channel = match self
            .channels
            .get_channel(&msg.channel_type, &msg.channel_uuid)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!(channel = %msg.channel_uuid, error = %e, "channel lookup failed for send");
                let status = errored(&mut clog, "channel not found");
                recorder::record(self.backend.as_ref(), &msg, status, &mut clog).await;
                return;
            },
        };

        let Some(handler) = self.handlers.get(&msg.channel_type) else {
            warn!(channel_type = %msg.channel_type, "no handler registered for send");
            let status = errored(&mut clog, "no handler for channel type");
            recorder::record(self.backend.as_ref(), &msg, status, &mut clog).await;
            return;
        };

        clog = ChannelLog::with_redaction(
            ChannelLogType::MsgSend,
            channel.uuid,
            handler.redact_values(&channel),
        );

        // Send-once guard: never re-invoke the provider for an ID we have
        // already dispatched, even across parallel workers.
        let already_sent = self.backend.was_msg_sent(msg.id).await.unwrap_or_else(|e| {
            warn!(msg_id = %msg.id, error = %e, "sent-marker lookup failed");
            false
        });
        if already_sent {
            debug!(msg_id = %msg.id, "duplicate send suppressed");
            clog.error("duplicate send attempt suppressed");
            let status = MsgStatus::for_id(
                channel.uuid,
                channel.channel_type.clone(),
                msg.id,
                MsgStatusValue::Wired,
            );
            recorder::record(self.backend.as_ref(), &msg, status, &mut clog).await;
            return;
        }

        let deadline = Duration::from_secs(self.config.send_timeout_secs);
        let invocation = handler.send(&msg, &channel, self.backend.as_ref(), &mut clog);
        let outcome =
            tokio::time::timeout(deadline, AssertUnwindSafe(invocation).catch_unwind()).await;

        let status = match outcome {
            Ok(Ok(Ok(status))) => status,
            Ok(Ok(Err(e))) => {
                clog.error(&e);
                MsgStatus::for_id(
                    channel.uuid,
                    channel.channel_type.clone(),
                    msg.id,
                    MsgStatusValue::Errored,
                )
            },
            Ok(Err(panic)) => {
                let message = panic_message(panic);
                error!(msg_id = %msg.id, panic = %message, "send panicked");
                clog.error(format!("panic: {message}"));
                MsgStatus::for_id(
                    channel.uuid,
                    channel.channel_type.clone(),
                    msg.id,
                    MsgStatusValue::Errored,
                )
            },
            Err(_) => {
                clog.error("send deadline exceeded");
                MsgStatus::for_id(
                    channel.uuid,
                    channel.channel_type.clone(),
                    msg.id,
                    MsgStatusValue::Errored,
                )
            },
        };

        recorder::record(self.backend.as_ref(), &msg, status, &mut clog).await;
    }
}

impl DispatcherHandle {
    /// Signal shutdown, then wait up to the grace period for in-flight sends
    /// to drain. Workers still running after that are abandoned; their
    /// messages carry no status and will be retried upstream.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);

        let drain = async {
            for worker in self.workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(self.grace, drain).await.is_err() {
            warn!("shutdown grace expired with sends in flight");
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
