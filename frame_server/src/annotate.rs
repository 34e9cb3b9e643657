//! Drawing of detections onto frames.
//!
use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use lazy_static::lazy_static;
use rusttype::{point, Font, Scale};

use crate::nn::Bbox;

lazy_static! {
    /// Font compiled into the binary, used when no other font is configured.
    static ref DEJAVU_MONO: Font<'static> = {
        let font_data: &[u8] = include_bytes!("../resources/DejaVuSansMono.ttf");
        Font::try_from_bytes(font_data).expect("failed to load embedded font")
    };
}

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_PADDING: i32 = 2;

pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl Annotator {
    pub fn new(font: Option<Font<'static>>, text_size: f32) -> Self {
        Self {
            font,
            scale: Scale::uniform(text_size),
        }
    }

    /// Annotator drawing captions with the embedded DejaVu Sans Mono.
    pub fn embedded(text_size: f32) -> Self {
        Self::new(Some(DEJAVU_MONO.clone()), text_size)
    }

    /// Load the font from `font_path`, falling back to the embedded one.
    ///
    /// A configured font that cannot be read is an error.
    pub fn load(font_path: Option<&Path>, text_size: f32) -> Result<Self> {
        match font_path {
            Some(path) => {
                let font = read_font(path)?;
                log::info!("Using font {}", path.display());
                Ok(Self::new(Some(font), text_size))
            }
            None => Ok(Self::embedded(text_size)),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a box outline and, when a font is loaded, a filled caption.
    pub fn draw(&self, frame: &mut RgbImage, bbox: &Bbox, caption: &str) {
        let (x_tl, y_tl) = (bbox[0].round() as i32, bbox[1].round() as i32);
        let width = (bbox[2] - bbox[0]).round().max(1.0) as u32;
        let height = (bbox[3] - bbox[1]).round().max(1.0) as u32;

        draw_hollow_rect_mut(frame, Rect::at(x_tl, y_tl).of_size(width, height), BOX_COLOR);
        if width > 2 && height > 2 {
            draw_hollow_rect_mut(
                frame,
                Rect::at(x_tl + 1, y_tl + 1).of_size(width - 2, height - 2),
                BOX_COLOR,
            );
        }

        let font = match &self.font {
            Some(font) => font,
            None => return,
        };

        let text_width = text_width(font, self.scale, caption);
        let label_width = text_width + 2 * LABEL_PADDING;
        let label_height = self.scale.y.ceil() as i32 + 2 * LABEL_PADDING;
        let (x_label, y_label) = label_origin(x_tl, y_tl, label_height);

        draw_filled_rect_mut(
            frame,
            Rect::at(x_label, y_label).of_size(label_width.max(1) as u32, label_height as u32),
            BOX_COLOR,
        );
        draw_text_mut(
            frame,
            TEXT_COLOR,
            x_label + LABEL_PADDING,
            y_label + LABEL_PADDING,
            self.scale,
            font,
            caption,
        );
    }
}

/// Top left corner of a label for a box whose top left corner is `(x, y)`.
///
/// The label sits on top of the box unless that would cross the upper frame edge; then it is
/// placed just below the top edge of the box.
pub fn label_origin(x: i32, y: i32, label_height: i32) -> (i32, i32) {
    if y - label_height >= 0 {
        (x, y - label_height)
    } else {
        (x, y)
    }
}

fn text_width(font: &Font, scale: Scale, text: &str) -> i32 {
    font.layout(text, scale, point(0.0, 0.0))
        .filter_map(|glyph| glyph.pixel_bounding_box())
        .map(|bbox| bbox.max.x)
        .max()
        .unwrap_or(0)
        .max(0)
}

fn read_font(path: &Path) -> Result<Font<'static>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    Font::try_from_vec(data).with_context(|| format!("invalid font file {}", path.display()))
}
