//! Table-driven harness for handler tests: receive cases run through the
//! full dispatch server against a mock backend; send cases run against a
//! mocked provider API.

use std::sync::Arc;

use {
    herald_core::{
        Channel, ChannelLog, ChannelLogType, Config, MsgId, MsgOrigin, MsgStatusValue, Urn,
        backend::Backend,
        handler::{Handler, HandlerRegistry},
    },
    herald_server::{AppState, build_app},
    herald_testkit::MockBackend,
    tokio::net::TcpListener,
    wiremock::{Mock, MockServer, ResponseTemplate, matchers::any},
};

pub fn channel(
    uuid: &str,
    channel_type: &str,
    address: &str,
    country: &str,
    config: serde_json::Value,
) -> Channel {
    herald_testkit::mock_channel(uuid, channel_type, address, country, config)
}

// ── receive cases ────────────────────────────────────────────────────────────

/// One provider callback case. An empty `data` issues a GET (mirroring
/// providers that only know query strings); anything else is POSTed as the
/// body.
pub struct ReceiveTestCase {
    pub label: &'static str,
    pub url: String,
    pub data: &'static str,
    pub status: u16,
    /// Substring the response body must contain; empty = not checked.
    pub response: &'static str,
    pub expected_text: Option<&'static str>,
    pub expected_urn: Option<&'static str>,
    pub expected_external_id: Option<&'static str>,
    pub expected_status_external_id: Option<&'static str>,
    pub expected_msg_status: Option<MsgStatusValue>,
}

impl Default for ReceiveTestCase {
    fn default() -> Self {
        Self {
            label: "",
            url: String::new(),
            data: "",
            status: 200,
            response: "",
            expected_text: None,
            expected_urn: None,
            expected_external_id: None,
            expected_status_external_id: None,
            expected_msg_status: None,
        }
    }
}

/// Run receive cases through a real server on an ephemeral port.
pub async fn run_receive_cases<F>(build: F, cases: Vec<ReceiveTestCase>)
where
    F: Fn(String) -> (Arc<dyn Handler>, Channel),
{
    let (handler, channel) = build(String::new());

    let backend = Arc::new(MockBackend::new());
    backend.add_channel(channel);

    let mut handlers = HandlerRegistry::new();
    handlers.register(handler);

    let state = AppState::new(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(handlers),
        Config {
            success_log_sample: 0.0,
            ..Config::default()
        },
    );
    let app = build_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    for case in cases {
        backend.reset();

        let url = format!("http://{addr}{}", case.url);
        let response = if case.data.is_empty() {
            client.get(&url).send().await.unwrap()
        } else {
            client
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(case.data)
                .send()
                .await
                .unwrap()
        };

        assert_eq!(
            response.status().as_u16(),
            case.status,
            "[{}] unexpected response status",
            case.label
        );
        let body = response.text().await.unwrap();
        if !case.response.is_empty() {
            assert!(
                body.contains(case.response),
                "[{}] body {body:?} missing {:?}",
                case.label,
                case.response
            );
        }

        let msgs = backend.written_msgs();
        if let Some(text) = case.expected_text {
            assert_eq!(msgs.len(), 1, "[{}] expected one written msg", case.label);
            assert_eq!(msgs[0].text, text, "[{}] wrong msg text", case.label);
        }
        if let Some(urn) = case.expected_urn {
            assert_eq!(msgs[0].urn.as_str(), urn, "[{}] wrong URN", case.label);
        }
        if let Some(external_id) = case.expected_external_id {
            assert_eq!(
                msgs[0].external_id.as_deref(),
                Some(external_id),
                "[{}] wrong msg external id",
                case.label
            );
        }
        if case.expected_text.is_none() && case.expected_urn.is_none() {
            assert!(
                msgs.is_empty(),
                "[{}] no msg should have been written",
                case.label
            );
        }

        let statuses = backend.written_statuses();
        if let Some(value) = case.expected_msg_status {
            assert_eq!(statuses.len(), 1, "[{}] expected one status", case.label);
            assert_eq!(statuses[0].status, value, "[{}] wrong status", case.label);
            if let Some(external_id) = case.expected_status_external_id {
                assert_eq!(
                    statuses[0].external_id.as_deref(),
                    Some(external_id),
                    "[{}] wrong status external id",
                    case.label
                );
            }
        } else {
            assert!(
                statuses.is_empty(),
                "[{}] no status should have been written",
                case.label
            );
        }
    }
}

/// Deliver the same provider callback twice and assert the duplicate is
/// suppressed: both responses 2xx, exactly one message written.
pub async fn run_duplicate_receive(channel: Channel, url: String, data: &'static str) {
    let backend = Arc::new(MockBackend::new());
    backend.add_channel(channel);

    let mut handlers = HandlerRegistry::new();
    crate::register_all(&mut handlers);

    let state = AppState::new(
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::new(handlers),
        Config {
            success_log_sample: 0.0,
            ..Config::default()
        },
    );
    let app = build_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let response = client
            .post(format!("http://{addr}{url}"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(data)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success(), "both receives must ack 2xx");
    }

    assert_eq!(
        backend.written_msgs().len(),
        1,
        "duplicate within the dedup window must write exactly once"
    );
}

// ── send cases ───────────────────────────────────────────────────────────────

pub struct SendTestCase {
    pub label: &'static str,
    pub msg_text: &'static str,
    pub msg_urn: &'static str,
    pub msg_attachments: &'static [&'static str],
    pub mock_response_status: u16,
    pub mock_response_body: &'static str,
    pub expected_status: MsgStatusValue,
    pub expected_external_id: Option<&'static str>,
    /// Query parameters the (last) provider request must carry.
    pub expected_url_params: &'static [(&'static str, &'static str)],
    /// Form-body parameters the (last) provider request must carry.
    pub expected_post_params: &'static [(&'static str, &'static str)],
    /// Exact body of the last provider request.
    pub expected_request_body: Option<&'static str>,
}

impl Default for SendTestCase {
    fn default() -> Self {
        Self {
            label: "",
            msg_text: "",
            msg_urn: "",
            msg_attachments: &[],
            mock_response_status: 200,
            mock_response_body: "",
            expected_status: MsgStatusValue::Wired,
            expected_external_id: None,
            expected_url_params: &[],
            expected_post_params: &[],
            expected_request_body: None,
        }
    }
}

/// Run send cases against a mocked provider endpoint. `build` receives the
/// mock server's URI and returns the handler plus channel wired to it.
pub async fn run_send_cases<F>(build: F, cases: Vec<SendTestCase>)
where
    F: Fn(String) -> (Arc<dyn Handler>, Channel),
{
    for case in cases {
        let provider = MockServer::start().await;
        Mock::given(any())
            .respond_with(
                ResponseTemplate::new(case.mock_response_status)
                    .set_body_string(case.mock_response_body),
            )
            .mount(&provider)
            .await;

        let (handler, channel) = build(provider.uri());
        let backend = MockBackend::new();
        let channel = backend.add_channel(channel);

        let mut msg = backend.new_outgoing_msg(
            &channel,
            MsgId::new(10),
            Urn::parse(case.msg_urn).unwrap(),
            case.msg_text,
            false,
            Vec::new(),
            None,
            None,
            MsgOrigin::Flow,
            None,
        );
        for attachment in case.msg_attachments {
            msg = msg.with_attachment(*attachment);
        }

        let mut clog = ChannelLog::new(ChannelLogType::MsgSend, channel.uuid);
        let status = handler
            .send(&msg, &channel, &backend, &mut clog)
            .await
            .unwrap_or_else(|e| panic!("[{}] send failed: {e}", case.label));

        assert_eq!(
            status.status, case.expected_status,
            "[{}] wrong send status",
            case.label
        );
        assert_eq!(
            status.external_id.as_deref(),
            case.expected_external_id,
            "[{}] wrong external id",
            case.label
        );

        let requests = provider.received_requests().await.unwrap_or_default();
        assert!(!requests.is_empty(), "[{}] provider never called", case.label);
        let last = requests.last().unwrap();

        if !case.expected_url_params.is_empty() {
            let query: Vec<(String, String)> = last
                .url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            for (key, value) in case.expected_url_params {
                assert!(
                    query.iter().any(|(k, v)| k == key && v == value),
                    "[{}] missing query param {key}={value}, got {query:?}",
                    case.label
                );
            }
        }

        if !case.expected_post_params.is_empty() {
            let form: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&last.body).unwrap_or_default();
            for (key, value) in case.expected_post_params {
                assert!(
                    form.iter().any(|(k, v)| k == key && v == value),
                    "[{}] missing form param {key}={value}, got {form:?}",
                    case.label
                );
            }
        }

        if let Some(expected) = case.expected_request_body {
            let body = String::from_utf8_lossy(&last.body);
            assert_eq!(body, expected, "[{}] wrong request body", case.label);
        }

        // Every attempt must have traced its provider exchange.
        assert!(
            !clog.http_logs.is_empty(),
            "[{}] send recorded no HTTP exchange",
            case.label
        );
    }
}
