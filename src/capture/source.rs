//! Frame sources feeding the capture cycle.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{CoachError, Result};

/// Something that yields still camera frames.
pub trait FrameSource: Send {
    /// Acquire the device. Called once when a capture cycle starts.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Camera`] when the source cannot be opened. The
    /// cycle keeps running without frames.
    fn open(&mut self) -> Result<()>;

    /// Current frame, or `None` when nothing is ready.
    fn grab(&mut self) -> Option<RgbaImage>;
}

/// Replays image files as a camera feed, cycling through them in name order.
///
/// The path can be a single PNG/JPEG file or a directory of them.
pub struct ImageSequenceSource {
    path: PathBuf,
    frames: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: Vec::new(),
            next: 0,
        }
    }

    /// Number of frame files found by [`open`](FrameSource::open).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<()> {
        let frames = if self.path.is_dir() {
            let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.path)
                .map_err(|e| {
                    CoachError::Camera(format!("cannot read {}: {e}", self.path.display()))
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            frames.sort();
            frames
        } else if self.path.is_file() {
            vec![self.path.clone()]
        } else {
            return Err(CoachError::Camera(format!(
                "frame source {} does not exist",
                self.path.display()
            )));
        };

        if frames.is_empty() {
            return Err(CoachError::Camera(format!(
                "no PNG or JPEG frames in {}",
                self.path.display()
            )));
        }
        info!(path = %self.path.display(), frames = frames.len(), "frame source opened");
        self.frames = frames;
        self.next = 0;
        Ok(())
    }

    fn grab(&mut self) -> Option<RgbaImage> {
        if self.frames.is_empty() {
            return None;
        }
        let path = &self.frames[self.next % self.frames.len()];
        self.next = (self.next + 1) % self.frames.len();
        match image::open(path) {
            Ok(img) => {
                debug!(path = %path.display(), "frame grabbed");
                Some(img.to_rgba8())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot decode frame");
                None
            }
        }
    }
}

/// A fixed frame, available immediately.
pub struct StillFrameSource {
    frame: RgbaImage,
}

impl StillFrameSource {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// A `width`×`height` frame of one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }
}

impl FrameSource for StillFrameSource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn grab(&mut self) -> Option<RgbaImage> {
        Some(self.frame.clone())
    }
}

/// Encode a frame as PNG.
///
/// # Errors
///
/// Returns [`CoachError::Camera`] if encoding fails.
pub fn encode_png(frame: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| CoachError::Camera(format!("PNG encoding failed: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    #[test]
    fn png_encoding_has_signature_and_decodes() {
        let frame = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let png = encode_png(&frame).unwrap();
        assert!(png.starts_with(PNG_MAGIC));
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn sequence_cycles_through_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::new(dir.path());
        assert!(source.grab().is_none());
        source.open().unwrap();
        assert_eq!(source.len(), 2);

        let first = source.grab().unwrap();
        let second = source.grab().unwrap();
        let third = source.grab().unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(second.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(third, first);
    }

    #[test]
    fn missing_path_is_a_camera_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageSequenceSource::new(dir.path().join("nope"));
        assert!(matches!(source.open(), Err(CoachError::Camera(_))));
        assert!(source.grab().is_none());
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageSequenceSource::new(dir.path());
        assert!(source.open().is_err());
    }

    #[test]
    fn still_source_always_has_a_frame() {
        let mut source = StillFrameSource::solid(8, 8, [1, 2, 3, 255]);
        source.open().unwrap();
        assert_eq!(source.grab().unwrap().dimensions(), (8, 8));
    }
}
