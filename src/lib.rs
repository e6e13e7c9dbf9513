//! fallwatch - frame-stream fall detection pipeline.
//!
//! The pipeline ingests a continuous stream of timestamped frames, keeps a
//! trailing time window of them, and periodically submits a bounded sample
//! to a classifier. Classifier free text is parsed against a marker protocol
//! into a structured verdict; positive verdicts pass through a cooldown gate
//! and fan out to independent notification and evidence-archival sinks on a
//! bounded worker pool, without ever stalling ingestion.
//!
//! Key invariants:
//! - The window buffer has one writer (the capture loop); every reader gets
//!   an immutable snapshot, never a live reference.
//! - At most one analysis is in flight; a tick during a running analysis is
//!   dropped, never queued.
//! - The cooldown gate is a single atomic compare-and-set, so concurrent
//!   positive verdicts admit exactly one alert per cooldown interval.
//! - Sink failures are isolated: a dead notifier cannot affect the archiver
//!   and neither can reach the capture or analysis path.

pub mod alert;
pub mod classify;
pub mod config;
pub mod cooldown;
pub mod evidence;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod schedule;
pub mod workers;

pub use alert::{AlertDispatcher, AlertEvent, AlertHistory};
pub use classify::{
    build_classifier, Classifier, StubClassifier, TextJudge, TwoStageClassifier, Verdict,
    VerdictKind, VerdictParser,
};
pub use config::{ClassifierMode, FallwatchConfig};
pub use cooldown::CooldownGate;
pub use evidence::{EvidenceArchiver, EvidenceBundle, SaveFormat};
pub use frame::{AnalysisRequest, Frame, SlidingWindowBuffer};
pub use ingest::{open_source, FrameSource, StubSource};
pub use notify::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
pub use pipeline::{Pipeline, PipelineReport};
pub use schedule::{AnalysisScheduler, SchedulerConfig, SchedulerStats};
pub use workers::WorkerPool;
