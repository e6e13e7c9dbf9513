//! Frames and the sliding window buffer.
//!
//! The capture path is the single writer of `SlidingWindowBuffer`. Every other
//! component (scheduler, archiver, notifier) only ever receives an immutable
//! snapshot taken with `snapshot_sample`, never a live reference. A slow
//! downstream consumer therefore cannot observe later mutations or block the
//! writer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image plus its capture timestamp. Immutable once created.
///
/// The payload is an encoded JPEG shared behind an `Arc`, so cloning a frame
/// into a snapshot copies a pointer, not pixels.
#[derive(Clone, Debug)]
pub struct Frame {
    jpeg: Arc<Vec<u8>>,
    captured_at: SystemTime,
    sequence: u64,
}

impl Frame {
    pub fn new(jpeg: Vec<u8>, captured_at: SystemTime, sequence: u64) -> Self {
        Self {
            jpeg: Arc::new(jpeg),
            captured_at,
            sequence,
        }
    }

    /// Encoded JPEG bytes.
    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Monotonically increasing capture sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Age of this frame relative to `now`. Zero if `now` is earlier.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.captured_at)
            .unwrap_or(Duration::ZERO)
    }
}

// ----------------------------------------------------------------------------
// AnalysisRequest
// ----------------------------------------------------------------------------

/// An immutable sampled snapshot of the window, taken at one instant.
/// Never mutated after creation; handed to the classifier and, on an accepted
/// alert, to the evidence archiver.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub frames: Vec<Frame>,
    pub taken_at: SystemTime,
}

// ----------------------------------------------------------------------------
// SlidingWindowBuffer
// ----------------------------------------------------------------------------

/// Time-windowed frame retention.
///
/// Invariant: after every `append`, no retained frame has
/// `age >= window_duration` relative to the newest frame. Insertion order is
/// time order; the capture path appends monotonically.
pub struct SlidingWindowBuffer {
    frames: VecDeque<Frame>,
    window_duration: Duration,
}

impl SlidingWindowBuffer {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            frames: VecDeque::new(),
            window_duration,
        }
    }

    /// Append a frame and prune everything that has aged out of the window.
    /// Amortized O(1): each frame is pushed and popped at most once.
    pub fn append(&mut self, frame: Frame) {
        let now = frame.captured_at();
        self.frames.push_back(frame);
        while let Some(oldest) = self.frames.front() {
            if oldest.age(now) >= self.window_duration {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    /// Immutable copy of up to `max_count` frames, evenly strided.
    ///
    /// With `n` retained frames the stride is `max(1, n / max_count)` and
    /// frames are taken at indices `0, stride, 2*stride, ...` until
    /// `max_count` is reached. Deterministic for identical buffer contents,
    /// temporal order preserved.
    pub fn snapshot_sample(&self, max_count: usize) -> Vec<Frame> {
        if max_count == 0 || self.frames.is_empty() {
            return Vec::new();
        }
        let len = self.frames.len();
        let stride = (len / max_count).max(1);
        let mut out = Vec::with_capacity(max_count.min(len));
        let mut idx = 0;
        while idx < len && out.len() < max_count {
            out.push(self.frames[idx].clone());
            idx += stride;
        }
        out
    }

    /// Most recent frame, if any. Used for best-effort evidence images.
    pub fn latest(&self) -> Option<Frame> {
        self.frames.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn frame_at(secs: u64, seq: u64) -> Frame {
        Frame::new(
            vec![seq as u8],
            UNIX_EPOCH + Duration::from_secs(secs),
            seq,
        )
    }

    fn frame_at_ms(millis: u64, seq: u64) -> Frame {
        Frame::new(
            vec![seq as u8],
            UNIX_EPOCH + Duration::from_millis(millis),
            seq,
        )
    }

    #[test]
    fn append_prunes_aged_frames() {
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(10));
        for s in 0..=30 {
            buf.append(frame_at(s, s));
            // Invariant holds after every append.
            let newest = UNIX_EPOCH + Duration::from_secs(s);
            for frame in buf.snapshot_sample(usize::MAX) {
                assert!(frame.age(newest) < Duration::from_secs(10));
            }
        }
    }

    #[test]
    fn one_frame_per_second_keeps_ten_most_recent() {
        // window_duration=10s, one frame per second for 30s: after the append
        // at t=30 the buffer holds exactly frames 21..=30.
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(10));
        for s in 0..=30 {
            buf.append(frame_at(s, s));
        }
        assert_eq!(buf.len(), 10);
        let frames = buf.snapshot_sample(usize::MAX);
        let seqs: Vec<u64> = frames.iter().map(|f| f.sequence()).collect();
        assert_eq!(seqs, (21..=30).collect::<Vec<u64>>());
    }

    #[test]
    fn sample_returns_min_of_k_and_n() {
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(60));
        for ms in 0..12u64 {
            buf.append(frame_at_ms(ms * 100, ms));
        }
        assert_eq!(buf.snapshot_sample(5).len(), 5);
        assert_eq!(buf.snapshot_sample(12).len(), 12);
        assert_eq!(buf.snapshot_sample(50).len(), 12);
        assert_eq!(buf.snapshot_sample(0).len(), 0);
    }

    #[test]
    fn sample_uses_fixed_stride_indices() {
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(60));
        for ms in 0..12u64 {
            buf.append(frame_at_ms(ms * 100, ms));
        }
        // n=12, k=5 -> stride=2 -> indices 0,2,4,6,8
        let seqs: Vec<u64> = buf
            .snapshot_sample(5)
            .iter()
            .map(|f| f.sequence())
            .collect();
        assert_eq!(seqs, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn sample_preserves_temporal_order() {
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(60));
        for ms in 0..37u64 {
            buf.append(frame_at_ms(ms * 50, ms));
        }
        let frames = buf.snapshot_sample(7);
        for pair in frames.windows(2) {
            assert!(pair[0].captured_at() < pair[1].captured_at());
        }
    }

    #[test]
    fn snapshot_is_insulated_from_later_appends() {
        let mut buf = SlidingWindowBuffer::new(Duration::from_secs(60));
        buf.append(frame_at(0, 0));
        let snap = buf.snapshot_sample(10);
        buf.append(frame_at(1, 1));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].sequence(), 0);
    }
}
