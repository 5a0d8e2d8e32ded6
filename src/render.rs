//! Key label rasterization.
//!
//! Lays the label out with fontdue and draws it white-on-black, centered
//! both ways in the key's image square. Conversion of the raster to the
//! device-native encoding happens behind the driver boundary.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::driver::KeyImageFormat;

const FONT_SIZE: f32 = 20.0;

/// Common locations for a usable sans-serif TTF, tried in order.
const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
];

pub struct LabelRenderer {
    font: Font,
}

impl LabelRenderer {
    /// Load the font at `override_path`, or the first hit from the built-in
    /// search list.
    pub fn new(override_path: Option<&Path>) -> Result<Self> {
        let path = match override_path {
            Some(path) => path.to_path_buf(),
            None => FONT_SEARCH_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
                .ok_or_else(|| anyhow!("no usable font found (set `font` in daemon.toml)"))?,
        };
        let data =
            std::fs::read(&path).with_context(|| format!("reading font {}", path.display()))?;
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|e| anyhow!("loading font {}: {e}", path.display()))?;
        debug!("Key label font: {}", path.display());
        Ok(Self { font })
    }

    /// Render `label` centered in a `format`-sized raster.
    pub fn render(&self, label: &str, format: KeyImageFormat) -> DynamicImage {
        let mut image = RgbImage::new(format.width, format.height);

        let text_width: f32 = label
            .chars()
            .map(|c| self.font.metrics(c, FONT_SIZE).advance_width)
            .sum();
        let (ascent, descent) = match self.font.horizontal_line_metrics(FONT_SIZE) {
            Some(metrics) => (metrics.ascent, metrics.descent),
            None => (FONT_SIZE, 0.0),
        };
        let text_height = ascent - descent;

        let origin_x = (format.width as f32 - text_width) / 2.0;
        let baseline = (format.height as f32 - text_height) / 2.0 + ascent;

        let mut pen_x = origin_x;
        for ch in label.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, FONT_SIZE);
            let glyph_top = baseline - metrics.height as f32 - metrics.ymin as f32;
            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let coverage = bitmap[row * metrics.width + col];
                    if coverage == 0 {
                        continue;
                    }
                    let px = pen_x as isize + col as isize + metrics.xmin as isize;
                    let py = glyph_top as isize + row as isize;
                    if px >= 0
                        && py >= 0
                        && (px as u32) < format.width
                        && (py as u32) < format.height
                    {
                        image.put_pixel(px as u32, py as u32, Rgb([coverage, coverage, coverage]));
                    }
                }
            }
            pen_x += metrics.advance_width;
        }

        DynamicImage::ImageRgb8(image)
    }
}
