// OpenCV-backed video input, video output, and live preview.
// Frames cross the boundary as BGR `Mat`s on the OpenCV side and RGB
// `RgbImage`s on ours.

use anyhow::{Context, Result, bail};
use image::RgbImage;
use log::{info, warn};
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use parking_vision::stream::{FrameSink, FrameSource, StreamInfo};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

const ESC_KEY: i32 = 27;

fn mat_to_rgb(frame: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let size = rgb.size()?;
    let data = rgb.data_bytes()?.to_vec();
    RgbImage::from_raw(size.width as u32, size.height as u32, data)
        .context("decoded frame does not match its dimensions")
}

fn rgb_to_mat(image: &RgbImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    let mut rgb = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        core::CV_8UC3,
        core::Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(image.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Decodes a video file frame by frame.
pub struct VideoFileSource {
    cap: VideoCapture,
    info: StreamInfo,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_str().context("video path is not valid UTF-8")?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("failed to open video {}", path.display());
        }

        let total = cap.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let info = StreamInfo {
            width: cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
            height: cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
            fps: cap.get(videoio::CAP_PROP_FPS)?,
            total_frames: (total > 0.0).then_some(total as u64),
        };
        info!(
            "Opened video {} ({}x{} @ {:.1} fps)",
            path.display(),
            info.width,
            info.height,
            info.fps
        );
        Ok(Self { cap, info })
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        let mut frame = Mat::default();
        match self.cap.read(&mut frame) {
            Ok(true) if !frame.empty() => match mat_to_rgb(&frame) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Failed to convert frame: {:#}; ending stream", e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                warn!("Error reading frame: {:?}; ending stream", e);
                None
            }
        }
    }
}

/// Encodes annotated frames into an mp4v video.
pub struct VideoFileSink {
    writer: VideoWriter,
    path: PathBuf,
}

impl VideoFileSink {
    pub fn create(path: &Path, info: &StreamInfo) -> Result<Self> {
        let path_str = path.to_str().context("output path is not valid UTF-8")?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            path_str,
            fourcc,
            info.fps,
            core::Size::new(info.width as i32, info.height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            bail!("failed to open video writer for {}", path.display());
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let mat = rgb_to_mat(frame)?;
        self.writer.write(&mat)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Shows every written frame in a window before passing it on.
/// Pressing ESC raises the stop flag.
pub struct DisplaySink {
    inner: Box<dyn FrameSink>,
    window: String,
    stop: watch::Sender<bool>,
}

impl DisplaySink {
    pub fn new(inner: Box<dyn FrameSink>, window: &str, stop: watch::Sender<bool>) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            inner,
            window: window.to_string(),
            stop,
        })
    }
}

impl FrameSink for DisplaySink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        self.inner.write(frame)?;
        let mat = rgb_to_mat(frame)?;
        highgui::imshow(&self.window, &mat)?;
        if highgui::wait_key(1)? == ESC_KEY {
            info!("ESC pressed; stopping after the current frame");
            self.stop.send_replace(true);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()?;
        highgui::destroy_all_windows()?;
        Ok(())
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}
