//! Frame classification.
//!
//! A `Classifier` turns a sampled frame snapshot into free text that the
//! `VerdictParser` maps onto a structured `Verdict`. Two shapes satisfy the
//! same contract:
//! - single-stage: one call that emits marker-prefixed text directly
//!   (the stub, or a remote vision model);
//! - two-stage: a local describer whose free-form output is fed verbatim to
//!   a remote judge that emits the marker-prefixed text.
//!
//! Callers hold an `Arc<dyn Classifier>` and are agnostic to which shape is
//! configured.

pub mod composite;
pub mod judge;
pub mod stub;
pub mod verdict;

use anyhow::Result;

use crate::frame::Frame;

/// Classification over a frame sample.
///
/// Implementations must be safe to call from the analysis thread while the
/// capture path keeps running; they receive an immutable snapshot and must
/// not retain the frames beyond the call.
pub trait Classifier: Send + Sync {
    /// Classifier identifier for logs and evidence manifests.
    fn name(&self) -> &'static str;

    /// Produce free-text output for the given frames.
    fn analyze(&self, frames: &[Frame]) -> Result<String>;
}

/// Second stage of the two-stage shape: maps free-form scene text to
/// marker-prefixed text. Kept separate from `Classifier` so a judge can be
/// mocked without faking frame input.
pub trait TextJudge: Send + Sync {
    fn judge(&self, description: &str) -> Result<String>;
}

pub use composite::TwoStageClassifier;
pub use judge::{JudgeConfig, RemoteJudge};
pub use stub::StubClassifier;
pub use verdict::{Verdict, VerdictKind, VerdictParser};

use std::sync::Arc;

use crate::config::{ClassifierMode, ClassifierSettings, StageSettings};

const DESCRIBER_PROMPT: &str = "Describe the people visible in these video frames: \
their posture, their position relative to furniture and the floor, and any sudden \
downward movement between frames. Be factual and brief.";

fn judge_prompt(positive_marker: &str, negative_marker: &str) -> String {
    format!(
        "You analyze hospital ward footage for human falls. Look for a person \
suddenly changing from standing or sitting to lying, rapid downward movement, or a \
person on the floor in difficulty.\n\
Reply with exactly one of:\n\
\"{positive} [brief description of what you see]\"\n\
\"{negative} [brief description of normal activity]\"\n\
Be conservative: only report {positive} when you are certain a fall occurred.",
        positive = positive_marker,
        negative = negative_marker
    )
}

fn build_stage(stage: &StageSettings, prompt: String) -> Result<RemoteJudge> {
    let api_key = match &stage.api_key_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            anyhow::anyhow!("classifier stage requires the {} env var", var)
        })?),
        None => None,
    };
    RemoteJudge::new(JudgeConfig {
        endpoint: stage.endpoint.clone(),
        model: stage.model.clone(),
        api_key,
        prompt: stage.prompt.clone().unwrap_or(prompt),
    })
}

/// Build the configured classifier shape.
pub fn build_classifier(
    settings: &ClassifierSettings,
    positive_marker: &str,
    negative_marker: &str,
) -> Result<Arc<dyn Classifier>> {
    match settings.mode {
        ClassifierMode::Stub => Ok(Arc::new(StubClassifier::triggered(
            &format!("{} synthetic fall event", positive_marker),
            &format!("{} routine activity", negative_marker),
            b"FALLWATCH-TRIGGER",
        ))),
        ClassifierMode::Judge => {
            let stage = settings
                .judge
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("judge settings missing"))?;
            let judge = build_stage(stage, judge_prompt(positive_marker, negative_marker))?;
            Ok(Arc::new(judge))
        }
        ClassifierMode::TwoStage => {
            let describer_stage = settings
                .describer
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("describer settings missing"))?;
            let judge_stage = settings
                .judge
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("judge settings missing"))?;
            let describer = build_stage(describer_stage, DESCRIBER_PROMPT.to_string())?;
            let judge = build_stage(judge_stage, judge_prompt(positive_marker, negative_marker))?;
            Ok(Arc::new(TwoStageClassifier::new(
                Arc::new(describer),
                Arc::new(judge),
            )))
        }
    }
}
