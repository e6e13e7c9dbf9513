//! Directory replay source for dir:// URLs.
//!
//! Reads the `.jpg`/`.jpeg` files of a directory in name order and feeds
//! them through the pipeline at the target rate, stamping frames with the
//! wall clock at read time. Used to analyze recorded footage with the same
//! scheduler/verdict/alert machinery as a live source.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

pub struct DirSource {
    name: String,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_interval: Duration,
    sequence: u64,
}

impl DirSource {
    pub fn open(path: impl AsRef<Path>, target_fps: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("opening frame directory {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        if files.is_empty() {
            return Err(anyhow!("no JPEG frames in {}", path.display()));
        }
        files.sort();
        Ok(Self {
            name: format!("dir://{}", path.display()),
            files,
            next_index: 0,
            frame_interval: Duration::from_millis(1000 / u64::from(target_fps.max(1))),
            sequence: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for DirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        if self.sequence > 0 {
            std::thread::sleep(self.frame_interval);
        }
        let jpeg = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let frame = Frame::new(jpeg, SystemTime::now(), self.sequence);
        self.next_index += 1;
        self.sequence += 1;
        Ok(Some(frame))
    }
}
