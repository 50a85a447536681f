// src/publish/telegram.rs
//! Telegram Bot API destination.
//!
//! Media are re-sent by file id or public URL, so no upload happens here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::Destination;
use crate::config::DestinationConfig;
use crate::error::{RelayError, Result};
use crate::ingest::{MediaKind, MediaRef};

/// Bot API refuses albums larger than this.
pub const MAX_ALBUM: usize = 10;

/// Used when a 429 arrives without `parameters.retry_after`.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct TelegramDestination {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramDestination {
    pub fn new(api_base: &str, token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn from_config(cfg: &DestinationConfig) -> Result<Self> {
        let token = cfg
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RelayError::Configuration("telegram bot token missing".into()))?;
        Self::new(
            &cfg.api_base,
            token,
            &cfg.chat_id,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[async_trait]
impl Destination for TelegramDestination {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn publish(&self, text: Option<&str>, media: &[MediaRef]) -> Result<()> {
        check_album(media)?;
        let Some((method, body)) = build_request(&self.chat_id, text, media) else {
            return Err(RelayError::PermanentReject("nothing to publish".into()));
        };

        // reqwest errors carry the URL; strip it so the token never hits the logs
        let rsp = self
            .client
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::TransientIo(format!("{method}: {}", e.without_url())))?;

        let status = rsp.status().as_u16();
        let raw = rsp
            .text()
            .await
            .map_err(|e| RelayError::TransientIo(format!("{method}: {}", e.without_url())))?;
        classify_response(status, &raw)
    }
}

fn media_field(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Document => ("sendDocument", "document"),
    }
}

/// A group goes out whole or not at all, so an album the Bot API would
/// refuse is rejected up front instead of being cut down.
pub fn check_album(media: &[MediaRef]) -> Result<()> {
    if media.len() > MAX_ALBUM {
        return Err(RelayError::PermanentReject(format!(
            "album of {} attachments exceeds the limit of {MAX_ALBUM}",
            media.len()
        )));
    }
    Ok(())
}

/// Bot API method and JSON body for one post. `None` when there is neither
/// text nor media.
pub fn build_request(
    chat_id: &str,
    text: Option<&str>,
    media: &[MediaRef],
) -> Option<(&'static str, Value)> {
    let text = text.filter(|t| !t.trim().is_empty());
    match media {
        [] => text.map(|t| {
            (
                "sendMessage",
                json!({ "chat_id": chat_id, "text": t, "disable_web_page_preview": true }),
            )
        }),
        [one] => {
            let (method, field) = media_field(one.kind);
            let mut body = json!({ "chat_id": chat_id });
            body[field] = Value::String(one.file.clone());
            if let Some(t) = text {
                body["caption"] = Value::String(t.to_string());
            }
            Some((method, body))
        }
        many => {
            let items: Vec<Value> = many
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let (_, field) = media_field(m.kind);
                    let mut item = json!({ "type": field, "media": m.file });
                    // album caption rides on the first item
                    if i == 0 {
                        if let Some(t) = text {
                            item["caption"] = Value::String(t.to_string());
                        }
                    }
                    item
                })
                .collect();
            Some(("sendMediaGroup", json!({ "chat_id": chat_id, "media": items })))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

/// Map an HTTP status + Bot API body onto the relay's error kinds.
pub fn classify_response(status: u16, body: &str) -> Result<()> {
    let parsed: ApiResponse = serde_json::from_str(body).unwrap_or_default();
    let description = parsed
        .description
        .clone()
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        200..=299 if parsed.ok => Ok(()),
        200..=299 => Err(RelayError::TransientIo(format!(
            "unexpected response: {description}"
        ))),
        429 => {
            let wait = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(FALLBACK_RETRY_AFTER);
            Err(RelayError::Throttled { wait })
        }
        401 => Err(RelayError::Configuration(format!(
            "bot token rejected: {description}"
        ))),
        400..=499 => Err(RelayError::PermanentReject(description)),
        _ => Err(RelayError::TransientIo(description)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(f: &str) -> MediaRef {
        MediaRef {
            kind: MediaKind::Photo,
            file: f.into(),
        }
    }

    #[test]
    fn text_only_uses_send_message() {
        let (m, body) = build_request("@chan", Some("Привет"), &[]).unwrap();
        assert_eq!(m, "sendMessage");
        assert_eq!(body["text"], "Привет");
        assert_eq!(body["chat_id"], "@chan");
        assert!(build_request("@chan", Some("   "), &[]).is_none());
        assert!(build_request("@chan", None, &[]).is_none());
    }

    #[test]
    fn single_media_carries_caption() {
        let video = MediaRef {
            kind: MediaKind::Video,
            file: "vid-1".into(),
        };
        let (m, body) = build_request("@chan", Some("cap"), &[video]).unwrap();
        assert_eq!(m, "sendVideo");
        assert_eq!(body["video"], "vid-1");
        assert_eq!(body["caption"], "cap");

        let (m, body) = build_request("@chan", None, &[photo("p")]).unwrap();
        assert_eq!(m, "sendPhoto");
        assert!(body.get("caption").is_none());
    }

    #[test]
    fn album_caption_on_first_item_only() {
        let media: Vec<MediaRef> = (0..3).map(|i| photo(&format!("p{i}"))).collect();
        let (m, body) = build_request("@chan", Some("cap"), &media).unwrap();
        assert_eq!(m, "sendMediaGroup");
        let items = body["media"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["caption"], "cap");
        assert_eq!(items[0]["type"], "photo");
        assert!(items[1].get("caption").is_none());
    }

    #[test]
    fn oversized_album_is_rejected_whole() {
        let full: Vec<MediaRef> = (0..MAX_ALBUM).map(|i| photo(&format!("p{i}"))).collect();
        assert!(check_album(&full).is_ok());

        let over: Vec<MediaRef> = (0..12).map(|i| photo(&format!("p{i}"))).collect();
        let e = check_album(&over).unwrap_err();
        assert!(
            matches!(e, RelayError::PermanentReject(ref d) if d.contains("12")),
            "{e:?}"
        );
    }

    #[test]
    fn classify_maps_statuses() {
        assert!(classify_response(200, r#"{"ok":true,"result":{}}"#).is_ok());

        let e = classify_response(
            429,
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 30","parameters":{"retry_after":30}}"#,
        )
        .unwrap_err();
        assert!(matches!(e, RelayError::Throttled { wait } if wait == Duration::from_secs(30)));

        let e = classify_response(429, "").unwrap_err();
        assert!(matches!(e, RelayError::Throttled { wait } if wait == FALLBACK_RETRY_AFTER));

        let e = classify_response(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message is too long"}"#,
        )
        .unwrap_err();
        assert!(
            matches!(e, RelayError::PermanentReject(ref d) if d.contains("too long")),
            "{e:?}"
        );

        assert!(matches!(
            classify_response(403, "{}").unwrap_err(),
            RelayError::PermanentReject(_)
        ));
        assert!(matches!(
            classify_response(401, "{}").unwrap_err(),
            RelayError::Configuration(_)
        ));
        assert!(matches!(
            classify_response(502, "<html>bad gateway</html>").unwrap_err(),
            RelayError::TransientIo(_)
        ));
    }
}
