// THEORY:
// The engine annotates frames but must not depend on a rendering backend. The
// `Canvas` trait is the narrow drawing surface it is given: outlined rectangles
// and (optionally boxed) text. Two surfaces ship with the crate:
// - `RasterCanvas` draws straight into an `RgbImage` with `imageproc`. Text
//   needs a font; without one, text calls are dropped and only outlines appear.
// - `RecordingCanvas` draws nothing and keeps a list of commands, which is what
//   tests inspect.

use crate::core_modules::region::Region;
use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

/// How a piece of text is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Glyph height in pixels.
    pub px: f32,
    pub color: Rgb<u8>,
    /// Fill colour of a box drawn behind the text, if any.
    pub background: Option<Rgb<u8>>,
    /// Space between the text and the edge of its background box.
    pub padding: u32,
}

impl TextStyle {
    pub fn plain(px: f32, color: Rgb<u8>) -> Self {
        Self {
            px,
            color,
            background: None,
            padding: 0,
        }
    }

    pub fn boxed(px: f32, color: Rgb<u8>, background: Rgb<u8>, padding: u32) -> Self {
        Self {
            px,
            color,
            background: Some(background),
            padding,
        }
    }
}

/// The drawing surface handed to the occupancy engine.
pub trait Canvas {
    /// Outlines `region`; the outline grows outwards for `thickness > 1`.
    fn draw_rect(&mut self, region: &Region, color: Rgb<u8>, thickness: u32);

    /// Writes `text` with its top-left corner at `origin`.
    fn draw_text(&mut self, text: &str, origin: (i32, i32), style: &TextStyle);
}

/// Draws onto an `RgbImage` in place.
pub struct RasterCanvas<'a> {
    image: &'a mut RgbImage,
    font: Option<&'a FontArc>,
}

impl<'a> RasterCanvas<'a> {
    pub fn new(image: &'a mut RgbImage, font: Option<&'a FontArc>) -> Self {
        Self { image, font }
    }
}

impl Canvas for RasterCanvas<'_> {
    fn draw_rect(&mut self, region: &Region, color: Rgb<u8>, thickness: u32) {
        let (width, height) = self.image.dimensions();
        if region.width == 0 || region.height == 0 || region.x >= width || region.y >= height {
            return;
        }
        for t in 0..thickness.max(1) {
            let rect = Rect::at(region.x as i32 - t as i32, region.y as i32 - t as i32)
                .of_size(region.width + 2 * t, region.height + 2 * t);
            draw_hollow_rect_mut(&mut *self.image, rect, color);
        }
    }

    fn draw_text(&mut self, text: &str, origin: (i32, i32), style: &TextStyle) {
        let Some(font) = self.font else {
            return;
        };
        // Text grows right and down from its origin.
        let (width, height) = self.image.dimensions();
        if i64::from(origin.0) >= i64::from(width) || i64::from(origin.1) >= i64::from(height) {
            return;
        }
        let scale = PxScale::from(style.px);
        if let Some(background) = style.background {
            let (w, h) = text_size(scale, font, text);
            if w > 0 {
                let pad = style.padding as i32;
                let rect = Rect::at(origin.0 - pad, origin.1 - pad)
                    .of_size(w + 2 * style.padding, h.max(1) + 2 * style.padding);
                draw_filled_rect_mut(&mut *self.image, rect, background);
            }
        }
        draw_text_mut(&mut *self.image, style.color, origin.0, origin.1, scale, font, text);
    }
}

/// One recorded drawing call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        region: Region,
        color: Rgb<u8>,
        thickness: u32,
    },
    Text {
        text: String,
        origin: (i32, i32),
        style: TextStyle,
    },
}

/// A headless canvas that only remembers what it was asked to draw.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub commands: Vec<DrawCommand>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// All text drawn so far, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                DrawCommand::Rect { .. } => None,
            })
            .collect()
    }

    /// Outline colour used for each rectangle, in order.
    pub fn rect_colors(&self) -> Vec<Rgb<u8>> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Rect { color, .. } => Some(*color),
                DrawCommand::Text { .. } => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn draw_rect(&mut self, region: &Region, color: Rgb<u8>, thickness: u32) {
        self.commands.push(DrawCommand::Rect {
            region: *region,
            color,
            thickness,
        });
    }

    fn draw_text(&mut self, text: &str, origin: (i32, i32), style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            origin,
            style: style.clone(),
        });
    }
}

/// Loads a TrueType/OpenType font for text annotations.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("{} is not a usable font", path.display()))
}
