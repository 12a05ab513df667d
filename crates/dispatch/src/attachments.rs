//! Attachment fetch-and-rehost: download provider media and move it onto
//! platform storage before sending.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use herald_core::{Channel, ChannelLog, Config, HttpLog, backend::Backend};

/// Downloads external attachment URLs and re-hosts them through backend
/// storage. Failures never block a send — the original URL is returned and
/// the provider gets whatever it can fetch itself.
pub struct AttachmentFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl AttachmentFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_attachment_bytes,
        })
    }

    /// Re-host one `contentType:url` attachment, returning the rewritten
    /// pair. Any failure falls back to the original attachment string.
    pub async fn rehost(
        &self,
        backend: &dyn Backend,
        channel: &Channel,
        attachment: &str,
        clog: &mut ChannelLog,
    ) -> String {
        let Some((declared_type, url)) = attachment.split_once(':') else {
            clog.error(format!("malformed attachment: {attachment}"));
            return attachment.to_string();
        };

        // The platform may already host this media.
        match backend.resolve_media(url).await {
            Ok(Some(media)) => {
                debug!(url, "attachment already hosted");
                return format!("{}:{}", media.content_type, media.url);
            },
            Ok(None) => {},
            Err(e) => {
                clog.error(format!("media resolve failed: {e}"));
                return attachment.to_string();
            },
        }

        let started = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                clog.http(HttpLog::new(
                    url,
                    0,
                    format!("GET {url}"),
                    "",
                    started.elapsed(),
                ));
                clog.error(format!("attachment fetch failed: {e}"));
                return attachment.to_string();
            },
        };

        let status = response.status().as_u16();
        let fetched_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(declared_type)
            .split(';')
            .next()
            .unwrap_or(declared_type)
            .trim()
            .to_string();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                clog.http(HttpLog::new(
                    url,
                    status,
                    format!("GET {url}"),
                    "",
                    started.elapsed(),
                ));
                clog.error(format!("attachment read failed: {e}"));
                return attachment.to_string();
            },
        };
        clog.http(HttpLog::new(
            url,
            status,
            format!("GET {url}"),
            format!("<{} bytes>", body.len()),
            started.elapsed(),
        ));

        if !(200..300).contains(&status) {
            clog.error(format!("attachment fetch returned {status}"));
            return attachment.to_string();
        }

        // The fetched primary type must agree with what the platform said it
        // was sending.
        if primary_type(&fetched_type) != primary_type(declared_type) {
            clog.error(format!(
                "attachment content type mismatch: declared {declared_type}, got {fetched_type}"
            ));
            return attachment.to_string();
        }

        if body.len() > self.max_bytes {
            clog.error(format!(
                "attachment too large: {} bytes (max {})",
                body.len(),
                self.max_bytes
            ));
            return attachment.to_string();
        }

        let extension = extension_for(&fetched_type);
        match backend
            .save_attachment(channel, &fetched_type, &body, extension)
            .await
        {
            Ok(hosted_url) => format!("{fetched_type}:{hosted_url}"),
            Err(e) => {
                warn!(url, error = %e, "attachment store failed");
                clog.error(format!("attachment store failed: {e}"));
                attachment.to_string()
            },
        }
    }
}

fn primary_type(content_type: &str) -> &str {
    content_type.split('/').next().unwrap_or(content_type)
}

/// File extension for a content type; falls back to the subtype.
fn extension_for(content_type: &str) -> &str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "video/mp4" => "mp4",
        "application/pdf" => "pdf",
        other => other.split('/').next_back().unwrap_or("bin"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        herald_testkit::{MockBackend, mock_channel},
        serde_json::json,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{method, path},
        },
    };

    use {
        super::*,
        herald_core::{ChannelLogType, backend::Media},
    };

    const CHANNEL_UUID: &str = "8eb23e93-5ecb-45ba-b726-3b064e0c56ab";

    fn fetcher(max_bytes: usize) -> AttachmentFetcher {
        AttachmentFetcher::new(&Config {
            max_attachment_bytes: max_bytes,
            fetch_timeout_secs: 5,
            ..Config::default()
        })
        .unwrap()
    }

    fn setup() -> (Arc<MockBackend>, Arc<herald_core::Channel>, ChannelLog) {
        let backend = Arc::new(MockBackend::new());
        let channel =
            backend.add_channel(mock_channel(CHANNEL_UUID, "XX", "2020", "US", json!(null)));
        let clog = ChannelLog::new(ChannelLogType::AttachmentFetch, channel.uuid);
        (backend, channel, clog)
    }

    #[tokio::test]
    async fn rehosts_fetched_media() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF]),
            )
            .mount(&provider)
            .await;

        let (backend, channel, mut clog) = setup();
        let attachment = format!("image/jpeg:{}/image.jpg", provider.uri());
        let rehosted = fetcher(1024)
            .rehost(backend.as_ref(), &channel, &attachment, &mut clog)
            .await;

        assert!(rehosted.starts_with("image/jpeg:https://backend.example.com/attachments/"));
        assert!(rehosted.ends_with(".jpg"));
        let saved = backend.saved_attachments();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].data, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(clog.http_logs.len(), 1);
        assert!(!clog.has_errors());
    }

    #[tokio::test]
    async fn resolved_media_short_circuits() {
        let (backend, channel, mut clog) = setup();
        backend.add_media(
            "https://foo.bar/image.jpg",
            Media {
                url: "https://hosted.example.com/abc.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                size: 3,
            },
        );

        let rehosted = fetcher(1024)
            .rehost(
                backend.as_ref(),
                &channel,
                "image/jpeg:https://foo.bar/image.jpg",
                &mut clog,
            )
            .await;

        assert_eq!(rehosted, "image/jpeg:https://hosted.example.com/abc.jpg");
        assert!(backend.saved_attachments().is_empty());
    }

    #[tokio::test]
    async fn content_type_mismatch_keeps_original() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>not an image</html>"),
            )
            .mount(&provider)
            .await;

        let (backend, channel, mut clog) = setup();
        let attachment = format!("image/jpeg:{}/image.jpg", provider.uri());
        let rehosted = fetcher(1024)
            .rehost(backend.as_ref(), &channel, &attachment, &mut clog)
            .await;

        assert_eq!(rehosted, attachment);
        assert!(clog.has_errors());
        assert!(backend.saved_attachments().is_empty());
    }

    #[tokio::test]
    async fn oversized_attachment_keeps_original() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&provider)
            .await;

        let (backend, channel, mut clog) = setup();
        let attachment = format!("image/jpeg:{}/big.jpg", provider.uri());
        let rehosted = fetcher(16)
            .rehost(backend.as_ref(), &channel, &attachment, &mut clog)
            .await;

        assert_eq!(rehosted, attachment);
        assert!(clog.has_errors());
    }

    #[tokio::test]
    async fn provider_error_keeps_original() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&provider)
            .await;

        let (backend, channel, mut clog) = setup();
        let attachment = format!("image/jpeg:{}/gone.jpg", provider.uri());
        let rehosted = fetcher(1024)
            .rehost(backend.as_ref(), &channel, &attachment, &mut clog)
            .await;

        assert_eq!(rehosted, attachment);
        assert!(clog.has_errors());
    }

    #[tokio::test]
    async fn storage_failure_keeps_original() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1, 2, 3]),
            )
            .mount(&provider)
            .await;

        let (backend, channel, mut clog) = setup();
        backend.set_storage_error(Some("bucket unavailable"));
        let attachment = format!("image/png:{}/image.png", provider.uri());
        let rehosted = fetcher(1024)
            .rehost(backend.as_ref(), &channel, &attachment, &mut clog)
            .await;

        assert_eq!(rehosted, attachment);
        assert!(clog.has_errors());
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("audio/mpeg"), "mp3");
        assert_eq!(extension_for("application/zip"), "zip");
    }
}
