//! Remote judge stage.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint over HTTP. Two
//! entry points share the request plumbing:
//! - `Classifier::analyze` sends the sampled frames as data-URL JPEG images
//!   (single-stage vision classification);
//! - `TextJudge::judge` sends a describer's free-form text verbatim
//!   (second stage of the two-stage shape).
//!
//! Either way the model is prompted to reply with marker-prefixed text; the
//! reply is returned untouched for the `VerdictParser` to interpret.

use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use url::Url;

use super::{Classifier, TextJudge};
use crate::frame::Frame;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REPLY_TOKENS: u32 = 150;

/// Remote judge settings.
#[derive(Clone, Debug)]
pub struct JudgeConfig {
    /// Chat-completions endpoint, e.g. "https://api.openai.com/v1/chat/completions".
    pub endpoint: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token. None for unauthenticated local endpoints.
    pub api_key: Option<String>,
    /// Instruction prompt. Must ask for the marker-prefixed reply protocol.
    pub prompt: String,
}

pub struct RemoteJudge {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    prompt: String,
    agent: ureq::Agent,
}

impl RemoteJudge {
    pub fn new(config: JudgeConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| anyhow!("invalid judge endpoint '{}': {}", config.endpoint, e))?;
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Ok(Self {
            endpoint,
            model: config.model,
            api_key: config.api_key,
            prompt: config.prompt,
            agent,
        })
    }

    fn vision_request_body(&self, frames: &[Frame]) -> Value {
        let mut content = vec![json!({ "type": "text", "text": self.prompt })];
        for frame in frames {
            let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(frame.jpeg()));
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": data_url }
            }));
        }
        json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "messages": [{ "role": "user", "content": content }]
        })
    }

    fn text_request_body(&self, description: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_REPLY_TOKENS,
            "messages": [{
                "role": "user",
                "content": format!("{}\n\n{}", self.prompt, description)
            }]
        })
    }

    fn post(&self, body: Value) -> Result<String> {
        let mut request = self.agent.post(self.endpoint.as_str());
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }
        let response = request
            .send_json(body)
            .map_err(|e| anyhow!("judge request failed: {}", e))?;
        let reply: Value = response
            .into_json()
            .map_err(|e| anyhow!("judge reply was not JSON: {}", e))?;
        let text = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("judge reply missing choices[0].message.content"))?;
        Ok(text.trim().to_string())
    }
}

impl Classifier for RemoteJudge {
    fn name(&self) -> &'static str {
        "remote-judge"
    }

    fn analyze(&self, frames: &[Frame]) -> Result<String> {
        if frames.is_empty() {
            return Err(anyhow!("no frames to classify"));
        }
        self.post(self.vision_request_body(frames))
    }
}

impl TextJudge for RemoteJudge {
    fn judge(&self, description: &str) -> Result<String> {
        self.post(self.text_request_body(description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn judge() -> RemoteJudge {
        RemoteJudge::new(JudgeConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            prompt: "Reply with FALL_DETECTED: or NO_FALL:".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let result = RemoteJudge::new(JudgeConfig {
            endpoint: "not a url".to_string(),
            model: "m".to_string(),
            api_key: None,
            prompt: "p".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn vision_body_carries_one_image_part_per_frame() {
        let frames = vec![
            Frame::new(vec![1, 2, 3], UNIX_EPOCH, 0),
            Frame::new(vec![4, 5, 6], UNIX_EPOCH, 1),
        ];
        let body = judge().vision_request_body(&frames);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3); // prompt + 2 images
        assert_eq!(content[0]["type"], "text");
        let url = content[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn text_body_feeds_description_verbatim() {
        let body = judge().text_request_body("a person lying on the floor");
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.ends_with("a person lying on the floor"));
    }

    #[test]
    fn empty_sample_is_an_error() {
        assert!(judge().analyze(&[]).is_err());
    }
}
