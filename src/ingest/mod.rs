//! Frame sources.
//!
//! A `FrameSource` delivers timestamped JPEG frames to the capture loop:
//! - `StubSource` for `stub://` URLs: synthetic frames, used by tests and
//!   self-contained demo runs;
//! - `DirSource`: replays a directory of JPEG files through the same
//!   pipeline as a live source.
//!
//! `next_frame` returning `Ok(None)` is a clean end of stream; an error is
//! fatal to the capture path (the pipeline stops, no automatic restart).

pub mod dir;
pub mod stub;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use dir::DirSource;
pub use stub::StubSource;

pub trait FrameSource: Send {
    /// Source identifier for logs and evidence manifests.
    fn name(&self) -> &str;

    /// Block until the next frame is available.
    ///
    /// `Ok(None)` signals end of stream; `Err` signals the source is
    /// unavailable and terminates the pipeline.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Build a source from a configured URL.
pub fn open_source(url: &str, target_fps: u32) -> Result<Box<dyn FrameSource>> {
    if let Some(name) = url.strip_prefix("stub://") {
        return Ok(Box::new(StubSource::new(name, target_fps, None)));
    }
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(DirSource::open(path, target_fps)?));
    }
    Err(anyhow!(
        "unsupported source '{}': expected stub:// or dir://",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_url_opens_synthetic_source() {
        let source = open_source("stub://ward_camera", 10).unwrap();
        assert_eq!(source.name(), "stub://ward_camera");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(open_source("rtsp://camera-1", 10).is_err());
    }
}
