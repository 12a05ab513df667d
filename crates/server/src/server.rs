//! HTTP intake: binds provider callback routes to handlers and drives the
//! inbound pipeline.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::Body,
        extract::{Path, Request, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::{any, get},
    },
    futures::FutureExt,
    tokio::net::TcpListener,
    tower_http::trace::TraceLayer,
    tracing::{error, info, warn},
};

use herald_core::{
    ChannelLog, ChannelLogType, ChannelRegistry, ChannelType, ChannelUuid, Config, Error,
    backend::Backend,
    handler::{Handler, HandlerRegistry, HandlerRequest, HandlerResponse},
};

use crate::pipeline;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub handlers: Arc<HandlerRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
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
}

/// Build the courier router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/healthz", get(health_handler))
        .route(
            "/c/{channel_type}/{channel_uuid}/{action}",
            any(channel_handler),
        )
        .route(
            "/c/{channel_type}/{channel_uuid}/{action}/",
            any(channel_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until interrupted, then shut down gracefully: stop accepting, let
/// in-flight requests finish, stop the backend.
pub async fn serve(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    state.backend.start().await?;

    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&state.backend)));

    let addr = listener.local_addr()?;
    info!(%addr, handlers = state.handlers.len(), "courier server listening");

    let app = build_app(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    heartbeat.abort();
    state.backend.stop().await?;
    state.backend.cleanup().await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn heartbeat_loop(backend: Arc<dyn Backend>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = backend.heartbeat().await {
            warn!(error = %e, "backend heartbeat failed");
        }
    }
}

// ── operational routes ───────────────────────────────────────────────────────

async fn status_handler(State(state): State<AppState>) -> Response {
    let summary = state.backend.status().await;
    (StatusCode::OK, summary).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let health = state.backend.health().await;
    if health.is_empty() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, health).into_response()
    }
}

// ── channel dispatch ─────────────────────────────────────────────────────────

async fn channel_handler(
    State(state): State<AppState>,
    Path((channel_type, channel_uuid, action)): Path<(String, String, String)>,
    request: Request,
) -> Response {
    // 1. Parse the path. A malformed UUID is indistinguishable from an
    //    unknown page.
    let Ok(uuid) = channel_uuid.parse::<ChannelUuid>() else {
        return plain(StatusCode::NOT_FOUND, "not found");
    };

    // 2. Find the handler for this channel type.
    let channel_type = ChannelType::new(channel_type.as_str());
    let Some(handler) = state.handlers.get(&channel_type) else {
        return plain(
            StatusCode::BAD_REQUEST,
            format!("unknown channel type: {channel_type}"),
        );
    };

    // 3. Match the action against the handler's declared routes.
    let routes = handler.routes();
    if !routes.iter().any(|r| r.action == action) {
        return plain(StatusCode::NOT_FOUND, "not found");
    }
    if !routes
        .iter()
        .any(|r| r.action == action && r.method == *request.method())
    {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    // 4. Resolve the channel.
    let channel = match state.channels.get_channel(&channel_type, &uuid).await {
        Ok(channel) => channel,
        Err(Error::ChannelNotFound) => {
            return plain(StatusCode::BAD_REQUEST, "channel not found");
        },
        Err(e) => {
            error!(error = %e, channel = %uuid, "channel lookup failed");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        },
    };

    // 5. Read the body under the configured cap.
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return plain(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
    };

    let handler_request = HandlerRequest {
        method: parts.method.clone(),
        query: parts.uri.query().unwrap_or("").to_string(),
        headers: parts.headers,
        body,
    };

    // 6. Fresh channel log for this request.
    let mut clog = ChannelLog::with_redaction(
        clog_type_for(&action),
        channel.uuid,
        handler.redact_values(&channel),
    );

    // 7. Invoke the handler under a panic guard and the request deadline.
    let deadline = Duration::from_secs(state.config.request_timeout_secs);
    let invocation = handler.receive(
        &action,
        Arc::clone(&channel),
        handler_request,
        state.backend.as_ref(),
        &mut clog,
    );
    let outcome = tokio::time::timeout(deadline, AssertUnwindSafe(invocation).catch_unwind()).await;

    let mut persist_failed = false;
    let response = match outcome {
        Err(_) => {
            clog.error("request deadline exceeded");
            plain(StatusCode::GATEWAY_TIMEOUT, "request timed out")
        },
        Ok(Err(panic)) => {
            let message = panic_message(panic);
            error!(channel = %uuid, %action, panic = %message, "handler panicked");
            clog.error(format!("panic: {message}"));
            plain(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        },
        Ok(Ok(Err(Error::Validation { message }))) => {
            clog.error(&message);
            plain(StatusCode::BAD_REQUEST, message)
        },
        Ok(Ok(Err(e))) => {
            clog.error(&e);
            let status = if e.is_transient() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::BAD_REQUEST
            };
            plain(status, e.to_string())
        },
        Ok(Ok(Ok(output))) => {
            let handler_response = output
                .response
                .clone()
                .unwrap_or_else(|| HandlerResponse::ok(""));
            match pipeline::write_handler_output(state.backend.as_ref(), output, &mut clog).await {
                Ok(_) => render(handler_response),
                Err(e) => {
                    warn!(error = %e, channel = %uuid, "persistence failed");
                    clog.error(&e);
                    persist_failed = true;
                    plain(StatusCode::INTERNAL_SERVER_ERROR, "unable to persist")
                },
            }
        },
    };

    // 8. Flush the channel log: always on error, sampled on success.
    clog.end();
    if clog.has_errors() || persist_failed || sampled(state.config.success_log_sample) {
        if let Err(e) = state.backend.write_channel_log(&clog).await {
            warn!(error = %e, "channel log write failed");
        }
    }

    response
}

fn clog_type_for(action: &str) -> ChannelLogType {
    match action {
        "receive" => ChannelLogType::MsgReceive,
        "status" | "delivered" | "sent" | "failed" => ChannelLogType::MsgStatus,
        _ => ChannelLogType::EventReceive,
    }
}

fn sampled(rate: f64) -> bool {
    rate > 0.0 && rand::random::<f64>() < rate
}

fn plain(status: StatusCode, body: impl Into<String>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body.into()))
        .expect("static response")
}

fn render(response: HandlerResponse) -> Response {
    Response::builder()
        .status(response.status)
        .header(header::CONTENT_TYPE, response.content_type)
        .body(Body::from(response.body))
        .expect("handler response")
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
