//! Synthetic frame source for stub:// URLs.

use std::time::{Duration, SystemTime};

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use super::FrameSource;
use crate::frame::Frame;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

/// Generates small JPEG frames at the target rate, cycling through a handful
/// of scene shades so consecutive frames differ. `frame_limit` lets tests and
/// demo runs terminate cleanly.
pub struct StubSource {
    name: String,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    sequence: u64,
    paced: bool,
}

impl StubSource {
    pub fn new(name: &str, target_fps: u32, frame_limit: Option<u64>) -> Self {
        Self {
            name: format!("stub://{}", name),
            frame_interval: Duration::from_millis(1000 / u64::from(target_fps.max(1))),
            frame_limit,
            sequence: 0,
            paced: true,
        }
    }

    /// Disable inter-frame sleeping. Tests use this to feed the pipeline as
    /// fast as it will take frames.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn render(&self) -> Result<Vec<u8>> {
        // Scene shade shifts every 50 frames.
        let shade = ((self.sequence / 50) % 5) as u8 * 40;
        let image = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([shade, shade, 64]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80).encode_image(&image)?;
        Ok(jpeg)
    }
}

impl FrameSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.frame_limit {
            if self.sequence >= limit {
                return Ok(None);
            }
        }
        if self.paced && self.sequence > 0 {
            std::thread::sleep(self.frame_interval);
        }
        let jpeg = self.render()?;
        let frame = Frame::new(jpeg, SystemTime::now(), self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_valid_jpeg_with_increasing_sequence() {
        let mut source = StubSource::new("test", 10, Some(3)).unpaced();
        let mut sequences = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert!(image::load_from_memory(frame.jpeg()).is_ok());
            sequences.push(frame.sequence());
        }
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn limit_ends_the_stream_cleanly() {
        let mut source = StubSource::new("test", 10, Some(1)).unpaced();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
