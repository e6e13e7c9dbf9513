//! Evidence archival.
//!
//! On an accepted alert the archiver renders the sampled frame snapshot into
//! one or more durable artifacts under a timestamp-named directory:
//! - still: the individual JPEG frames as captured
//! - animated: a looping GIF at a fixed 100 ms per frame
//! - video: an MJPEG AVI at a fixed 10 fps, assembled from the JPEG frames
//!
//! Formats are produced independently; a failure in one is logged and does
//! not prevent the others. A plain-text manifest records what was written.
//! Inputs are immutable snapshots, so archiver latency can never corrupt or
//! block capture.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame as GifFrame, ImageFormat};

use crate::frame::Frame;

/// Fixed per-frame delay for the animated artifact.
const ANIMATED_FRAME_MS: u64 = 100;
/// Fixed frame rate for the video artifact.
const VIDEO_FPS: u32 = 10;

// ----------------------------------------------------------------------------
// Formats
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Still,
    Animated,
    Video,
}

impl SaveFormat {
    /// Parse a configured format list. "all" expands to every format.
    pub fn parse_list(names: &[String]) -> Result<Vec<SaveFormat>> {
        let mut formats = Vec::new();
        for name in names {
            match name.as_str() {
                "still" => formats.push(SaveFormat::Still),
                "animated" => formats.push(SaveFormat::Animated),
                "video" => formats.push(SaveFormat::Video),
                "all" => {
                    return Ok(vec![SaveFormat::Still, SaveFormat::Animated, SaveFormat::Video])
                }
                other => return Err(anyhow!("unknown save format '{}'", other)),
            }
        }
        formats.dedup();
        Ok(formats)
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Still => write!(f, "still"),
            SaveFormat::Animated => write!(f, "animated"),
            SaveFormat::Video => write!(f, "video"),
        }
    }
}

// ----------------------------------------------------------------------------
// Archiver
// ----------------------------------------------------------------------------

/// Result of one archival run: what was produced and where.
#[derive(Debug)]
pub struct EvidenceBundle {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub manifest: PathBuf,
    pub frame_count: usize,
    /// Formats that completed. May be a subset of the requested set.
    pub completed: Vec<SaveFormat>,
}

pub struct EvidenceArchiver {
    root: PathBuf,
    formats: Vec<SaveFormat>,
}

impl EvidenceArchiver {
    pub fn new(root: impl Into<PathBuf>, formats: Vec<SaveFormat>) -> Self {
        Self {
            root: root.into(),
            formats,
        }
    }

    /// Destination directory for a snapshot taken at `taken_at`.
    ///
    /// Deterministic, so the dispatcher can record the evidence reference
    /// before the archival job has run.
    pub fn destination_for(&self, taken_at: SystemTime) -> PathBuf {
        let stamp: DateTime<Utc> = taken_at.into();
        self.root.join(format!(
            "alert_{}_{:03}",
            stamp.format("%Y%m%d_%H%M%S"),
            stamp.timestamp_subsec_millis()
        ))
    }

    /// Archive a frame snapshot taken at `taken_at`.
    ///
    /// Creates `<root>/alert_<YYYYmmdd_HHMMSS>_<millis>/`, writes each
    /// requested format independently, then the manifest. Only an empty
    /// snapshot or an unwritable destination fails the whole run.
    pub fn archive(
        &self,
        frames: &[Frame],
        taken_at: SystemTime,
        source: &str,
        detection_method: &str,
    ) -> Result<EvidenceBundle> {
        if frames.is_empty() {
            return Err(anyhow!("no frames to archive"));
        }
        let stamp: DateTime<Utc> = taken_at.into();
        let dir = self.destination_for(taken_at);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating evidence dir {}", dir.display()))?;

        let mut files = Vec::new();
        let mut completed = Vec::new();
        for format in &self.formats {
            match write_format(*format, frames, &dir) {
                Ok(mut produced) => {
                    files.append(&mut produced);
                    completed.push(*format);
                }
                Err(e) => {
                    log::error!("evidence: failed to write {} artifact: {:#}", format, e);
                }
            }
        }

        let manifest = dir.join("manifest.txt");
        write_manifest(
            &manifest,
            stamp,
            source,
            detection_method,
            frames.len(),
            &self.formats,
            &completed,
            &files,
        )?;

        log::info!(
            "evidence: wrote {} file(s) ({} of {} formats) to {}",
            files.len(),
            completed.len(),
            self.formats.len(),
            dir.display()
        );
        Ok(EvidenceBundle {
            dir,
            files,
            manifest,
            frame_count: frames.len(),
            completed,
        })
    }
}

fn write_format(format: SaveFormat, frames: &[Frame], dir: &Path) -> Result<Vec<PathBuf>> {
    match format {
        SaveFormat::Still => write_stills(frames, dir),
        SaveFormat::Animated => write_animated(frames, dir).map(|p| vec![p]),
        SaveFormat::Video => write_video(frames, dir).map(|p| vec![p]),
    }
}

fn write_stills(frames: &[Frame], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(frames.len());
    for (i, frame) in frames.iter().enumerate() {
        let stamp: DateTime<Utc> = frame.captured_at().into();
        let path = dir.join(format!(
            "frame_{:03}_{}_{:03}.jpg",
            i + 1,
            stamp.format("%H%M%S"),
            stamp.timestamp_subsec_millis()
        ));
        fs::write(&path, frame.jpeg())
            .with_context(|| format!("writing {}", path.display()))?;
        paths.push(path);
    }
    Ok(paths)
}

fn write_animated(frames: &[Frame], dir: &Path) -> Result<PathBuf> {
    let path = dir.join("alert.gif");
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite)?;
    for frame in frames {
        let image = image::load_from_memory_with_format(frame.jpeg(), ImageFormat::Jpeg)
            .context("decoding frame for animated artifact")?
            .to_rgba8();
        let delay = Delay::from_numer_denom_ms(ANIMATED_FRAME_MS as u32, 1);
        encoder.encode_frame(GifFrame::from_parts(image, 0, 0, delay))?;
    }
    Ok(path)
}

/// MJPEG-in-AVI: the frames are already JPEG, so the video artifact is a
/// RIFF container around them, written directly. Fixed 10 fps.
fn write_video(frames: &[Frame], dir: &Path) -> Result<PathBuf> {
    let (width, height) = first_frame_dimensions(frames)?;
    let path = dir.join("alert.avi");
    let bytes = build_mjpeg_avi(frames, width, height);
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn first_frame_dimensions(frames: &[Frame]) -> Result<(u32, u32)> {
    let first = frames.first().ok_or_else(|| anyhow!("empty snapshot"))?;
    let image = image::load_from_memory_with_format(first.jpeg(), ImageFormat::Jpeg)
        .context("decoding frame for video dimensions")?;
    Ok((image.width(), image.height()))
}

// ----------------------------------------------------------------------------
// AVI container
// ----------------------------------------------------------------------------

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn chunk(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len() + 1);
    out.extend_from_slice(fourcc);
    push_u32(&mut out, body.len() as u32);
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0); // RIFF chunks are word-aligned
    }
    out
}

fn list(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(4 + body.len());
    inner.extend_from_slice(fourcc);
    inner.extend_from_slice(body);
    chunk(b"LIST", &inner)
}

fn build_mjpeg_avi(frames: &[Frame], width: u32, height: u32) -> Vec<u8> {
    let frame_count = frames.len() as u32;
    let max_frame_bytes = frames.iter().map(|f| f.jpeg().len()).max().unwrap_or(0) as u32;

    // avih: MainAVIHeader
    let mut avih = Vec::new();
    push_u32(&mut avih, 1_000_000 / VIDEO_FPS); // microseconds per frame
    push_u32(&mut avih, max_frame_bytes * VIDEO_FPS); // max bytes per second
    push_u32(&mut avih, 0); // padding granularity
    push_u32(&mut avih, 0x10); // AVIF_HASINDEX
    push_u32(&mut avih, frame_count);
    push_u32(&mut avih, 0); // initial frames
    push_u32(&mut avih, 1); // streams
    push_u32(&mut avih, max_frame_bytes);
    push_u32(&mut avih, width);
    push_u32(&mut avih, height);
    avih.extend_from_slice(&[0u8; 16]); // reserved

    // strh: AVIStreamHeader (vids/MJPG, rate = VIDEO_FPS)
    let mut strh = Vec::new();
    strh.extend_from_slice(b"vids");
    strh.extend_from_slice(b"MJPG");
    push_u32(&mut strh, 0); // flags
    push_u16(&mut strh, 0); // priority
    push_u16(&mut strh, 0); // language
    push_u32(&mut strh, 0); // initial frames
    push_u32(&mut strh, 1); // scale
    push_u32(&mut strh, VIDEO_FPS); // rate
    push_u32(&mut strh, 0); // start
    push_u32(&mut strh, frame_count); // length
    push_u32(&mut strh, max_frame_bytes);
    push_u32(&mut strh, u32::MAX); // quality
    push_u32(&mut strh, 0); // sample size
    push_u16(&mut strh, 0); // rcFrame left
    push_u16(&mut strh, 0); // top
    push_u16(&mut strh, width as u16); // right
    push_u16(&mut strh, height as u16); // bottom

    // strf: BITMAPINFOHEADER
    let mut strf = Vec::new();
    push_u32(&mut strf, 40);
    push_u32(&mut strf, width);
    push_u32(&mut strf, height);
    push_u16(&mut strf, 1); // planes
    push_u16(&mut strf, 24); // bit count
    strf.extend_from_slice(b"MJPG");
    push_u32(&mut strf, width * height * 3);
    strf.extend_from_slice(&[0u8; 16]); // resolution + color table fields

    let mut strl = Vec::new();
    strl.extend_from_slice(&chunk(b"strh", &strh));
    strl.extend_from_slice(&chunk(b"strf", &strf));

    let mut hdrl = Vec::new();
    hdrl.extend_from_slice(&chunk(b"avih", &avih));
    hdrl.extend_from_slice(&list(b"strl", &strl));

    // movi payload plus idx1 offsets (relative to the 'movi' fourcc)
    let mut movi = Vec::new();
    let mut idx1 = Vec::new();
    for frame in frames {
        let offset = movi.len() as u32 + 4;
        let data = chunk(b"00dc", frame.jpeg());
        movi.extend_from_slice(&data);
        idx1.extend_from_slice(b"00dc");
        push_u32(&mut idx1, 0x10); // AVIIF_KEYFRAME
        push_u32(&mut idx1, offset);
        push_u32(&mut idx1, frame.jpeg().len() as u32);
    }

    let mut riff_body = Vec::new();
    riff_body.extend_from_slice(b"AVI ");
    riff_body.extend_from_slice(&list(b"hdrl", &hdrl));
    riff_body.extend_from_slice(&list(b"movi", &movi));
    riff_body.extend_from_slice(&chunk(b"idx1", &idx1));

    chunk(b"RIFF", &riff_body)
}

// ----------------------------------------------------------------------------
// Manifest
// ----------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn write_manifest(
    path: &Path,
    stamp: DateTime<Utc>,
    source: &str,
    detection_method: &str,
    frame_count: usize,
    requested: &[SaveFormat],
    completed: &[SaveFormat],
    files: &[PathBuf],
) -> Result<()> {
    let mut out = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(out, "Timestamp: {}", stamp.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Source: {}", source)?;
    writeln!(out, "DetectionMethod: {}", detection_method)?;
    writeln!(out, "TotalFrames: {}", frame_count)?;
    writeln!(out, "SaveFormat: {}", join_formats(requested))?;
    writeln!(out, "Duration: {}", durations(completed, frame_count))?;
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        writeln!(out, "FilesSaved: {}", name)?;
    }
    Ok(())
}

fn join_formats(formats: &[SaveFormat]) -> String {
    formats
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Computed playback duration per completed format.
fn durations(completed: &[SaveFormat], frame_count: usize) -> String {
    let mut parts = Vec::new();
    for format in completed {
        let duration = match format {
            SaveFormat::Still => continue,
            SaveFormat::Animated => {
                Duration::from_millis(ANIMATED_FRAME_MS * frame_count as u64)
            }
            SaveFormat::Video => {
                Duration::from_millis(1000 * frame_count as u64 / VIDEO_FPS as u64)
            }
        };
        parts.push(format!("{}={:.1}s", format, duration.as_secs_f64()));
    }
    if parts.is_empty() {
        "n/a".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::RgbImage;
    use std::time::UNIX_EPOCH;

    fn jpeg_frame(shade: u8, secs: u64, seq: u64) -> Frame {
        let img = RgbImage::from_pixel(32, 24, image::Rgb([shade, shade, shade]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80)
            .encode_image(&img)
            .unwrap();
        Frame::new(jpeg, UNIX_EPOCH + Duration::from_secs(secs), seq)
    }

    fn corrupt_frame(secs: u64, seq: u64) -> Frame {
        Frame::new(vec![0xde, 0xad], UNIX_EPOCH + Duration::from_secs(secs), seq)
    }

    #[test]
    fn still_format_writes_one_file_per_frame() {
        let root = tempfile::tempdir().unwrap();
        let archiver = EvidenceArchiver::new(root.path(), vec![SaveFormat::Still]);
        let frames = vec![jpeg_frame(10, 1, 1), jpeg_frame(20, 2, 2)];
        let bundle = archiver
            .archive(&frames, UNIX_EPOCH + Duration::from_secs(2), "cam", "stub")
            .unwrap();
        assert_eq!(bundle.files.len(), 2);
        assert_eq!(bundle.completed, vec![SaveFormat::Still]);
        for file in &bundle.files {
            assert!(file.exists());
        }
    }

    #[test]
    fn all_formats_produce_three_artifact_kinds() {
        let root = tempfile::tempdir().unwrap();
        let formats = SaveFormat::parse_list(&["all".to_string()]).unwrap();
        let archiver = EvidenceArchiver::new(root.path(), formats);
        let frames = vec![jpeg_frame(10, 1, 1), jpeg_frame(200, 2, 2)];
        let bundle = archiver
            .archive(&frames, UNIX_EPOCH, "cam", "stub")
            .unwrap();
        assert_eq!(bundle.completed.len(), 3);
        assert!(bundle.dir.join("alert.gif").exists());
        assert!(bundle.dir.join("alert.avi").exists());
    }

    #[test]
    fn failing_format_does_not_block_the_others() {
        // Corrupt JPEG payloads: stills are byte-for-byte copies and succeed,
        // the animated encoder has to decode and fails.
        let root = tempfile::tempdir().unwrap();
        let archiver = EvidenceArchiver::new(
            root.path(),
            vec![SaveFormat::Still, SaveFormat::Animated],
        );
        let frames = vec![corrupt_frame(1, 1), corrupt_frame(2, 2)];
        let bundle = archiver
            .archive(&frames, UNIX_EPOCH, "cam", "stub")
            .unwrap();
        assert_eq!(bundle.completed, vec![SaveFormat::Still]);
        assert_eq!(bundle.files.len(), 2);
        // Manifest still reflects the partial outcome.
        let manifest = fs::read_to_string(&bundle.manifest).unwrap();
        assert!(manifest.contains("SaveFormat: still, animated"));
        assert!(!manifest.contains("alert.gif"));
    }

    #[test]
    fn manifest_records_required_fields() {
        let root = tempfile::tempdir().unwrap();
        let archiver = EvidenceArchiver::new(root.path(), vec![SaveFormat::Animated]);
        let frames = vec![jpeg_frame(1, 1, 1), jpeg_frame(2, 2, 2), jpeg_frame(3, 3, 3)];
        let bundle = archiver
            .archive(
                &frames,
                UNIX_EPOCH + Duration::from_secs(3),
                "stub://ward_camera",
                "two-stage",
            )
            .unwrap();
        let manifest = fs::read_to_string(&bundle.manifest).unwrap();
        assert!(manifest.contains("Timestamp: 1970-01-01 00:00:03"));
        assert!(manifest.contains("Source: stub://ward_camera"));
        assert!(manifest.contains("DetectionMethod: two-stage"));
        assert!(manifest.contains("TotalFrames: 3"));
        assert!(manifest.contains("Duration: animated=0.3s"));
        assert!(manifest.contains("FilesSaved: alert.gif"));
    }

    #[test]
    fn avi_container_is_well_formed() {
        let frames = vec![jpeg_frame(1, 1, 1), jpeg_frame(2, 2, 2)];
        let avi = build_mjpeg_avi(&frames, 32, 24);
        assert_eq!(&avi[0..4], b"RIFF");
        assert_eq!(&avi[8..12], b"AVI ");
        // Declared RIFF size covers the rest of the file.
        let declared = u32::from_le_bytes(avi[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared + 8, avi.len());
        assert!(avi.windows(4).any(|w| w == b"MJPG"));
        assert!(avi.windows(4).any(|w| w == b"idx1"));
    }

    #[test]
    fn parse_list_rejects_unknown_format() {
        assert!(SaveFormat::parse_list(&["hologram".to_string()]).is_err());
    }
}
