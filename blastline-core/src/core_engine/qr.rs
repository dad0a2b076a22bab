//! QR encoding of pairing codes
//!
//! The companion device scans the PNG served over HTTP; the CLI prints the
//! same code as block characters.

use crate::core_engine::errors::{QrError, QrResult};
use image::{ImageFormat, Luma};
use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// Side length of the PNG in pixels, quiet zone included
pub const PNG_SIZE: u32 = 256;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

fn encode(payload: &str) -> QrResult<QrCode> {
    QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M).map_err(QrError::Encode)
}

/// Grayscale PNG, at least `PNG_SIZE` pixels square
pub fn render_png(payload: &str) -> QrResult<Vec<u8>> {
    let image = encode(payload)?.render::<Luma<u8>>().min_dimensions(PNG_SIZE, PNG_SIZE).build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Half-height block glyphs, light modules drawn as spaces
pub fn render_terminal(payload: &str) -> QrResult<String> {
    Ok(encode(payload)?
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .build())
}
