//! Frame sources for gesture classification.
//!
//! The ingest controller samples "the current frame" at its own cadence and
//! never buffers. Live camera plumbing lives behind [`FrameSource`]; the
//! sources here replay still images.

use image::imageops::FilterType;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, EncodeError};

/// Something that can hand out the current video frame.
pub trait FrameSource {
    /// The most recent frame.
    fn current_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<RgbImage, CaptureError>,
{
    fn current_frame(&mut self) -> Result<RgbImage, CaptureError> {
        self()
    }
}

/// Always returns the same image.
pub struct StillFrame {
    frame: RgbImage,
}

impl StillFrame {
    pub fn new(frame: RgbImage) -> Self {
        Self { frame }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        Ok(Self::new(image::open(path)?.to_rgb8()))
    }
}

impl FrameSource for StillFrame {
    fn current_frame(&mut self) -> Result<RgbImage, CaptureError> {
        Ok(self.frame.clone())
    }
}

/// Cycles through the image files of a directory, one per request.
pub struct DirectoryFrames {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirectoryFrames {
    /// Collect `.png`/`.jpg`/`.jpeg` files, sorted by name.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        if paths.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no image frames in {}",
                dir.display()
            )));
        }
        paths.sort();
        Ok(Self { paths, next: 0 })
    }

    /// Number of frames in the replay loop. Never zero.
    pub fn frame_count(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for DirectoryFrames {
    fn current_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        Ok(image::open(path)?.to_rgb8())
    }
}

/// Still-frame encoding sent to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameEncoding {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for FrameEncoding {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            quality: 60,
        }
    }
}

/// Resize to the fixed classifier resolution and JPEG-encode.
pub fn encode_frame(frame: &RgbImage, encoding: &FrameEncoding) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, encoding.quality.clamp(1, 100));
    if frame.dimensions() == (encoding.width, encoding.height) {
        encoder.encode_image(frame)?;
    } else {
        let resized = image::imageops::resize(frame, encoding.width, encoding.height, FilterType::Triangle);
        encoder.encode_image(&resized)?;
    }
    Ok(bytes)
}
