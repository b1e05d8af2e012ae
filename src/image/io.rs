//! Decoding to RGBA8 and PNG encoding via the `image` crate.

use std::path::Path;

use ::image::codecs::png::PngEncoder;
use ::image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Decodes any supported raster format into an RGBA8 bitmap.
pub fn decode_rgba(bytes: &[u8]) -> BlueMarbleResult<RgbaImage> {
    let img = ::image::load_from_memory(bytes).map_err(BlueMarbleError::decode)?;
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(BlueMarbleError::decode("image has no pixels"));
    }
    Ok(rgba)
}

/// Reads and decodes an image file from disk.
pub fn load_rgba<P: AsRef<Path>>(path: P) -> BlueMarbleResult<RgbaImage> {
    let bytes = std::fs::read(path.as_ref()).map_err(|err| BlueMarbleError::Decode {
        reason: format!("{}: {err}", path.as_ref().display()),
    })?;
    decode_rgba(&bytes)
}

/// Encodes an RGBA8 bitmap as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> BlueMarbleResult<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(BlueMarbleError::encode)?;
    Ok(buf)
}
