// THEORY:
// Frames enter and leave the system through two small traits so the monitor loop
// never needs to know whether it is reading a video file, a camera, or a folder
// of stills.
//
// A `FrameSource` yields frames until it runs dry. A read failure is not an
// error from the loop's point of view: the source logs it and reports the end of
// the stream, and the run finishes normally with whatever was processed.
//
// The image-sequence adapters below are the always-available implementation,
// built on the `image` crate. Video adapters live in the runner crate.

use anyhow::{Context, Result, bail};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

const SEQUENCE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Geometry and timing of a frame stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frames if known; only used for progress reporting.
    pub total_frames: Option<u64>,
}

/// A sequential supplier of frames.
pub trait FrameSource {
    fn info(&self) -> StreamInfo;

    /// The next frame, or `None` once the stream is exhausted or unreadable.
    fn next_frame(&mut self) -> Option<RgbImage>;
}

/// A consumer of annotated frames.
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes and closes the sink. Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable location of the output, for the run summary.
    fn location(&self) -> String;
}

/// Reads every still image in a directory, in file-name order.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    info: StreamInfo,
}

impl ImageSequenceSource {
    /// Opens `dir`. The first frame fixes the stream geometry; `fps` is only
    /// carried through for sinks that need it.
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to list frames in {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_sequence_frame(path))
            .collect();
        files.sort();

        let Some(first) = files.first() else {
            bail!("no frames found in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("failed to read frame {}", first.display()))?;

        let info = StreamInfo {
            width,
            height,
            fps,
            total_frames: Some(files.len() as u64),
        };
        log::info!(
            "Opened image sequence {} ({} frames, {}x{})",
            dir.display(),
            files.len(),
            width,
            height
        );
        Ok(Self {
            files,
            cursor: 0,
            info,
        })
    }
}

fn is_sequence_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SEQUENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        let path = self.files.get(self.cursor)?;
        self.cursor += 1;
        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                log::warn!("Failed to read frame {}: {}; ending stream", path.display(), e);
                self.cursor = self.files.len();
                None
            }
        }
    }
}

/// Writes each frame as `frame_NNNNNN.png` into a directory.
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame
            .save(&path)
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
