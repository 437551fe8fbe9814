//! PNG rendering of QR code payloads

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Pixels per QR module
const MODULE_PIXELS: u32 = 10;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Renders `payload` as a black on white PNG and returns it as a data URL
pub fn png_data_url(payload: &str) -> Result<String> {
    let code = QrCode::new(payload.as_bytes()).context("Failed to encode QR code")?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to write QR code PNG")?;

    Ok(format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(&png)))
}
