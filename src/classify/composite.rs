//! Two-stage classifier composition.
//!
//! Stage 1 is a local describer: any `Classifier` whose output is free-form
//! scene text. Stage 2 is a `TextJudge` that maps that text to the
//! marker-prefixed protocol. The describer output is handed to the judge
//! verbatim. Both stages are independently substitutable.

use std::sync::Arc;

use anyhow::Result;

use super::{Classifier, TextJudge};
use crate::frame::Frame;

pub struct TwoStageClassifier {
    describer: Arc<dyn Classifier>,
    judge: Arc<dyn TextJudge>,
}

impl TwoStageClassifier {
    pub fn new(describer: Arc<dyn Classifier>, judge: Arc<dyn TextJudge>) -> Self {
        Self { describer, judge }
    }
}

impl Classifier for TwoStageClassifier {
    fn name(&self) -> &'static str {
        "two-stage"
    }

    fn analyze(&self, frames: &[Frame]) -> Result<String> {
        let description = self.describer.analyze(frames)?;
        log::debug!(
            "describer ({}) produced {} chars",
            self.describer.name(),
            description.len()
        );
        self.judge.judge(&description)
    }
}
