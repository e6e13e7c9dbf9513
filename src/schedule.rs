//! Periodic analysis scheduling.
//!
//! The scheduler ticks on a fixed period measured from the end of the
//! previous tick, so classifier latency cannot make the period drift.
//! At most one analysis is in flight: a tick that lands while the busy flag
//! is set is dropped outright, so no backlog ever accumulates. Classification runs on its own thread and never touches the
//! capture path; a classifier error is logged and simply means no verdict
//! until the next periodic tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::alert::AlertDispatcher;
use crate::classify::{Classifier, VerdictKind, VerdictParser};
use crate::cooldown::CooldownGate;
use crate::frame::{AnalysisRequest, SlidingWindowBuffer};

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub max_frames_per_analysis: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub dropped_ticks: u64,
    pub analyses: u64,
}

pub struct AnalysisScheduler {
    inner: Arc<SchedulerInner>,
    interval: Duration,
}

struct SchedulerInner {
    buffer: Arc<Mutex<SlidingWindowBuffer>>,
    classifier: Arc<dyn Classifier>,
    parser: VerdictParser,
    gate: Arc<CooldownGate>,
    dispatcher: Arc<AlertDispatcher>,
    max_frames: usize,
    busy: AtomicBool,
    ticks: AtomicU64,
    dropped_ticks: AtomicU64,
    analyses: AtomicU64,
}

/// Clears the busy flag however the analysis exits.
struct BusyGuard<'a>(&'a SchedulerInner);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

impl SchedulerInner {
    /// One scheduler tick. Returns the snapshot to analyze, or `None` when
    /// the tick is dropped (analysis in flight) or the buffer is empty.
    fn begin_tick(&self) -> Option<AnalysisRequest> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if self.busy.swap(true, Ordering::AcqRel) {
            self.dropped_ticks.fetch_add(1, Ordering::Relaxed);
            log::debug!("analysis still in flight, tick dropped");
            return None;
        }
        let frames = {
            let buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            buffer.snapshot_sample(self.max_frames)
        };
        if frames.is_empty() {
            self.busy.store(false, Ordering::Release);
            return None;
        }
        Some(AnalysisRequest {
            frames,
            taken_at: SystemTime::now(),
        })
    }

    /// Drive one analysis to completion: classify, parse, gate, dispatch.
    fn run_analysis(&self, request: AnalysisRequest) {
        let _busy = BusyGuard(self);
        let count = self.analyses.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "analysis #{}: {} frames via {}",
            count,
            request.frames.len(),
            self.classifier.name()
        );

        let text = match self.classifier.analyze(&request.frames) {
            Ok(text) => text,
            Err(e) => {
                // No verdict this tick; the next periodic tick retries.
                log::warn!("classifier failed, skipping tick: {:#}", e);
                return;
            }
        };
        log::info!("classifier result: {:?}", text);

        let verdict = self.parser.parse(&text, SystemTime::now());
        match verdict.kind {
            VerdictKind::Positive => {
                if self.gate.try_accept(verdict.produced_at) {
                    self.dispatcher.dispatch(verdict, &request);
                } else {
                    log::info!("positive verdict suppressed by cooldown");
                }
            }
            VerdictKind::Negative => {
                log::debug!("negative verdict");
            }
            VerdictKind::Unknown => {
                log::warn!("classifier text matched no marker: {:?}", verdict.raw_text);
            }
        }
    }
}

impl AnalysisScheduler {
    pub fn new(
        config: SchedulerConfig,
        buffer: Arc<Mutex<SlidingWindowBuffer>>,
        classifier: Arc<dyn Classifier>,
        parser: VerdictParser,
        gate: Arc<CooldownGate>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                buffer,
                classifier,
                parser,
                gate,
                dispatcher,
                max_frames: config.max_frames_per_analysis.max(1),
                busy: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                dropped_ticks: AtomicU64::new(0),
                analyses: AtomicU64::new(0),
            }),
            interval: config.interval,
        }
    }

    /// Run the periodic tick loop on its own thread until `shutdown` is set.
    ///
    /// An analysis in flight at shutdown is abandoned to run to completion on
    /// its own thread; nothing waits on it.
    pub fn spawn(&self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let interval = self.interval;
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                sleep_interruptible(interval, &shutdown);
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(request) = inner.begin_tick() {
                    let inner = inner.clone();
                    std::thread::spawn(move || inner.run_analysis(request));
                }
            }
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            dropped_ticks: self.inner.dropped_ticks.load(Ordering::Relaxed),
            analyses: self.inner.analyses.load(Ordering::Relaxed),
        }
    }
}

fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let step = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let slice = remaining.min(step);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}
