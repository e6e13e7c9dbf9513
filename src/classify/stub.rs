//! Stub classifier for tests and stub:// sources.
//!
//! Deterministic: the reply is a pure function of the frame payloads, so
//! identical input frames always yield identical text (and therefore an
//! identical verdict).

use anyhow::Result;
use sha2::{Digest, Sha256};

use super::Classifier;
use crate::frame::Frame;

/// Deterministic classifier stub.
///
/// In `triggered` mode it replies with the positive text when any frame
/// payload contains the trigger byte sequence, otherwise the negative text.
/// In `fixed` mode it always replies with one configured text.
pub struct StubClassifier {
    positive_text: String,
    negative_text: String,
    trigger: Option<Vec<u8>>,
}

impl StubClassifier {
    /// Reply positive whenever a frame payload contains `trigger`.
    pub fn triggered(positive_text: &str, negative_text: &str, trigger: &[u8]) -> Self {
        Self {
            positive_text: positive_text.to_string(),
            negative_text: negative_text.to_string(),
            trigger: Some(trigger.to_vec()),
        }
    }

    /// Always reply with the same text.
    pub fn fixed(text: &str) -> Self {
        Self {
            positive_text: text.to_string(),
            negative_text: text.to_string(),
            trigger: None,
        }
    }

    fn frames_contain_trigger(&self, frames: &[Frame]) -> bool {
        let Some(trigger) = &self.trigger else {
            return false;
        };
        frames.iter().any(|frame| {
            frame
                .jpeg()
                .windows(trigger.len().max(1))
                .any(|w| w == trigger.as_slice())
        })
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&self, frames: &[Frame]) -> Result<String> {
        // Digest is logged so repeated runs over identical samples are
        // recognizable in the output.
        let mut hasher = Sha256::new();
        for frame in frames {
            hasher.update(frame.jpeg());
        }
        let digest = hasher.finalize();
        log::debug!(
            "stub classifier: {} frames, sample digest {:02x}{:02x}..",
            frames.len(),
            digest[0],
            digest[1]
        );

        if self.trigger.is_some() {
            if self.frames_contain_trigger(frames) {
                Ok(self.positive_text.clone())
            } else {
                Ok(self.negative_text.clone())
            }
        } else {
            Ok(self.positive_text.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn frame(payload: &[u8]) -> Frame {
        Frame::new(payload.to_vec(), UNIX_EPOCH, 0)
    }

    #[test]
    fn trigger_in_payload_yields_positive_text() {
        let stub = StubClassifier::triggered("FALL_DETECTED: stub", "NO_FALL: stub", b"FALL");
        let out = stub.analyze(&[frame(b"....FALL....")]).unwrap();
        assert_eq!(out, "FALL_DETECTED: stub");
    }

    #[test]
    fn no_trigger_yields_negative_text() {
        let stub = StubClassifier::triggered("FALL_DETECTED: stub", "NO_FALL: stub", b"FALL");
        let out = stub.analyze(&[frame(b"quiet corridor")]).unwrap();
        assert_eq!(out, "NO_FALL: stub");
    }

    #[test]
    fn identical_input_yields_identical_output() {
        let stub = StubClassifier::triggered("FALL_DETECTED: stub", "NO_FALL: stub", b"FALL");
        let frames = [frame(b"..FALL..")];
        assert_eq!(
            stub.analyze(&frames).unwrap(),
            stub.analyze(&frames).unwrap()
        );
    }
}
