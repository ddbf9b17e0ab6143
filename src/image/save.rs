//! Image saving utilities.

use std::path::Path;

use image::DynamicImage;

use crate::error::{Error, Result};

use super::{postprocess, ImageTensor};

/// Save a tensor as an image file.
///
/// The tensor is:
/// 1. Shifted back by the channel means, rounded and clipped to [0, 255]
/// 2. Saved to the specified path (format inferred from extension)
///
/// # Arguments
///
/// * `tensor` - NHWC mean-subtracted tensor
/// * `path` - Output file path
/// * `quality` - JPEG quality (1-100), ignored for other formats
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_image<P: AsRef<Path>>(tensor: &ImageTensor, path: P, quality: u8) -> Result<()> {
    let path = path.as_ref();

    let img = DynamicImage::ImageRgb8(postprocess(tensor));

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut output = std::fs::File::create(path)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
            img.write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        _ => {
            img.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}
