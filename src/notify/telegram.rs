//! Telegram Bot API notifier.
//!
//! Sends `sendMessage` with the alert text, then a best-effort `sendPhoto`
//! with the evidence still. A photo failure is logged and does not fail the
//! notification; a message failure does.

use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use url::Url;

use super::Notifier;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Override for tests and self-hosted bot API servers.
    pub api_base: Option<String>,
}

pub struct TelegramNotifier {
    api_base: Url,
    bot_token: String,
    chat_id: String,
    agent: ureq::Agent,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() || config.chat_id.trim().is_empty() {
            return Err(anyhow!("telegram notifier requires bot token and chat id"));
        }
        let base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        let api_base = Url::parse(base)
            .map_err(|e| anyhow!("invalid telegram api base '{}': {}", base, e))?;
        Ok(Self {
            api_base,
            bot_token: config.bot_token,
            chat_id: config.chat_id,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        // Built from the string form: the token contains a colon, which
        // `Url::join` would misread as a scheme separator.
        let raw = format!(
            "{}/bot{}/{}",
            self.api_base.as_str().trim_end_matches('/'),
            self.bot_token,
            method
        );
        Url::parse(&raw).context("building telegram method url")
    }

    fn send_message(&self, message: &str) -> Result<()> {
        let url = self.method_url("sendMessage")?;
        self.agent
            .post(url.as_str())
            .send_json(json!({ "chat_id": self.chat_id, "text": message }))
            .map_err(|e| anyhow!("telegram sendMessage failed: {}", e))?;
        Ok(())
    }

    fn send_photo(&self, jpeg: &[u8], caption: &str) -> Result<()> {
        let url = self.method_url("sendPhoto")?;
        let boundary = "fallwatch-evidence-boundary";
        let body = multipart_photo_body(boundary, &self.chat_id, caption, jpeg);
        self.agent
            .post(url.as_str())
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(|e| anyhow!("telegram sendPhoto failed: {}", e))?;
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn notify(
        &self,
        message: &str,
        timestamp: SystemTime,
        evidence_image: Option<&[u8]>,
    ) -> Result<()> {
        self.send_message(message)?;
        if let Some(jpeg) = evidence_image {
            let stamp: DateTime<Utc> = timestamp.into();
            let caption = format!("Evidence image - {}", stamp.format("%Y-%m-%d %H:%M:%S"));
            if let Err(e) = self.send_photo(jpeg, &caption) {
                log::warn!("telegram evidence photo not delivered: {:#}", e);
            }
        }
        Ok(())
    }
}

fn multipart_photo_body(boundary: &str, chat_id: &str, caption: &str, jpeg: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(jpeg.len() + 512);
    let mut text_part = |name: &str, value: &str, body: &mut Vec<u8>| {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    };
    text_part("chat_id", chat_id, &mut body);
    text_part("caption", caption, &mut body);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"evidence.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(jpeg);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
