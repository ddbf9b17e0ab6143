//! Image loading utilities.

use std::path::Path;

use image::DynamicImage;
use ndarray::Array3;

use crate::error::{Error, Result};

use super::resize::{fit_within, resize_area};
use super::{preprocess, ImageTensor, RGB_CHANNELS};

/// Load an image from disk as an `(H, W, 3)` RGB array of floats in [0, 255].
///
/// # Errors
///
/// Returns [`Error::MissingFile`] if the path does not exist and
/// [`Error::ImageLoad`] if the file cannot be decoded.
pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(image_to_array(&img))
}

/// Load the content image.
///
/// The image is:
/// 1. Loaded from the specified path as RGB
/// 2. Downscaled with area averaging if its larger side exceeds `max_size`
/// 3. Mean-subtracted and returned as an NHWC tensor
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn load_content_image<P: AsRef<Path>>(path: P, max_size: usize) -> Result<ImageTensor> {
    let pixels = load_rgb(path)?;
    let (height, width, _) = pixels.dim();

    let (new_height, new_width) = fit_within(height, width, max_size);
    let pixels = if (new_height, new_width) == (height, width) {
        pixels
    } else {
        tracing::debug!("Resizing content {width}x{height} -> {new_width}x{new_height}");
        resize_area(&pixels, new_height, new_width)
    };

    Ok(preprocess(&pixels))
}

/// Load a style image, resized to the content image's `(height, width)`.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn load_style_image<P: AsRef<Path>>(path: P, dims: (usize, usize)) -> Result<ImageTensor> {
    let pixels = load_rgb(path)?;
    let resized = resize_area(&pixels, dims.0, dims.1);
    Ok(preprocess(&resized))
}

/// Convert a `DynamicImage` to an RGB float array.
fn image_to_array(img: &DynamicImage) -> Array3<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    Array3::from_shape_fn(
        (height as usize, width as usize, RGB_CHANNELS),
        |(y, x, c)| {
            // Safe: x and y are bounded by the source image dimensions
            #[allow(clippy::cast_possible_truncation)]
            let pixel = rgb.get_pixel(x as u32, y as u32);
            f32::from(pixel[c])
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{Rgb, RgbImage};

    #[test]
    fn test_array_shape() {
        let img = DynamicImage::new_rgb8(100, 40);
        let pixels = image_to_array(&img);

        assert_eq!(pixels.shape(), &[40, 100, 3]);
    }

    #[test]
    fn test_channel_order_is_rgb() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        let pixels = image_to_array(&DynamicImage::ImageRgb8(img));

        assert_eq!(pixels[[0, 0, 0]], 10.0);
        assert_eq!(pixels[[0, 0, 1]], 20.0);
        assert_eq!(pixels[[0, 0, 2]], 30.0);
    }

    #[test]
    fn test_missing_file() {
        let err = load_rgb("definitely/not/here.png").unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
    }

    #[test]
    fn test_content_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::from_pixel(300, 120, Rgb([50, 60, 70]))
            .save(&path)
            .unwrap();

        let tensor = load_content_image(&path, 100).unwrap();
        assert_eq!(tensor.shape(), &[1, 40, 100, 3]);
        assert!((tensor[[0, 20, 50, 0]] - (50.0 - 123.68)).abs() < 1e-3);
    }

    #[test]
    fn test_style_matches_content_dims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.png");
        RgbImage::from_pixel(64, 48, Rgb([1, 2, 3])).save(&path).unwrap();

        let tensor = load_style_image(&path, (20, 30)).unwrap();
        assert_eq!(tensor.shape(), &[1, 20, 30, 3]);
    }
}
