//! Grid rendering for the decision-maker.
//!
//! Rendering is pure: the same grid and scale always produce byte-identical
//! PNG output.

use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use crate::core::types::{Grid, ImagePayload};

/// 16-colour palette indexed by cell value.
const PALETTE: [[u8; 3]; 16] = [
    [0xFF, 0xFF, 0xFF],
    [0xCC, 0xCC, 0xCC],
    [0x99, 0x99, 0x99],
    [0x66, 0x66, 0x66],
    [0x33, 0x33, 0x33],
    [0x00, 0x00, 0x00],
    [0xE5, 0x3A, 0xA3],
    [0xFF, 0x7B, 0xCC],
    [0xF9, 0x3C, 0x31],
    [0x1E, 0x93, 0xFF],
    [0x88, 0xD8, 0xF1],
    [0xFF, 0xDC, 0x00],
    [0xFF, 0x85, 0x1B],
    [0x92, 0x12, 0x31],
    [0x4F, 0xCC, 0x30],
    [0xA3, 0x56, 0xD6],
];

/// Abstraction over grid renderers.
pub trait Renderer {
    fn render(&self, grid: &Grid) -> Result<ImagePayload>;
}

/// Renders each cell as a `scale`×`scale` block of its palette colour.
#[derive(Debug, Clone, Copy)]
pub struct PngRenderer {
    scale: u32,
}

impl PngRenderer {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
        }
    }

    fn pixels(&self, cells: usize) -> Result<u32> {
        u32::try_from(cells)
            .ok()
            .and_then(|cells| cells.checked_mul(self.scale))
            .ok_or_else(|| anyhow!("{cells} cells at scale {} overflow the image size", self.scale))
    }
}

impl Renderer for PngRenderer {
    fn render(&self, grid: &Grid) -> Result<ImagePayload> {
        let rows = grid.len();
        let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
        if rows == 0 || cols == 0 {
            return Err(anyhow!("cannot render an empty grid"));
        }
        let width = self.pixels(cols)?;
        let height = self.pixels(rows)?;

        let image = RgbImage::from_fn(width, height, |px, py| {
            let row = (py / self.scale) as usize;
            let col = (px / self.scale) as usize;
            // Ragged rows render their missing cells black.
            let cell = grid[row].get(col).copied().unwrap_or(5);
            Rgb(PALETTE[usize::from(cell) % PALETTE.len()])
        });

        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        let data_url = format!("data:image/png;base64,{}", BASE64.encode(&png));
        Ok(ImagePayload { png, data_url })
    }
}

/// Text form of a grid: one line per row, one hex digit per cell.
pub fn grid_to_text(grid: &Grid) -> String {
    grid.iter()
        .map(|row| {
            row.iter()
                .map(|cell| {
                    char::from_digit(u32::from(*cell % 16), 16)
                        .unwrap_or('?')
                        .to_ascii_uppercase()
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
