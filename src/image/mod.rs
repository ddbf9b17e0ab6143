//! Image loading, processing, and saving utilities.

mod load;
mod resize;
mod save;
mod weight_map;

pub use load::{load_content_image, load_rgb, load_style_image};
pub use resize::{fit_within, resize_area};
pub use save::save_image;
pub use weight_map::{read_weight_map, WeightMap};

use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::{Array3, Array4, Axis};

/// Image tensor in NHWC format (batch, height, width, channels).
/// Values are mean-subtracted RGB in the [0, 255] scale.
pub type ImageTensor = Array4<f32>;

/// Per-channel ImageNet mean the VGG19 weights were trained against (RGB order).
pub const MEAN_PIXEL: [f32; 3] = [123.68, 116.779, 103.939];

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Convert an `(H, W, 3)` RGB array in [0, 255] to a mean-subtracted `(1, H, W, 3)` tensor.
#[must_use]
pub fn preprocess(pixels: &Array3<f32>) -> ImageTensor {
    let mut tensor = pixels.clone().insert_axis(Axis(0));
    for (c, mean) in MEAN_PIXEL.iter().enumerate() {
        tensor.index_axis_mut(Axis(3), c).mapv_inplace(|v| v - mean);
    }
    tensor
}

/// Convert a mean-subtracted tensor back into an 8-bit RGB image.
///
/// The mean is added back, values are rounded and clamped to [0, 255].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn postprocess(tensor: &ImageTensor) -> RgbImage {
    let (_, height, width, _) = tensor.dim();

    // Safe: image dimensions originate from u32 image sizes
    let mut img = ImageBuffer::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let mut px = [0u8; RGB_CHANNELS];
            for (c, mean) in MEAN_PIXEL.iter().enumerate() {
                px[c] = (tensor[[0, y, x, c]] + mean).round().clamp(0.0, 255.0) as u8;
            }
            img.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    img
}

/// Spatial `(height, width)` of an image tensor.
#[must_use]
pub fn spatial_dims(tensor: &ImageTensor) -> (usize, usize) {
    let (_, h, w, _) = tensor.dim();
    (h, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_mean() {
        let pixels = Array3::<f32>::from_elem((4, 5, 3), 200.0);
        let tensor = preprocess(&pixels);

        assert_eq!(tensor.shape(), &[1, 4, 5, 3]);
        assert!((tensor[[0, 0, 0, 0]] - (200.0 - 123.68)).abs() < 1e-4);
        assert!((tensor[[0, 3, 4, 2]] - (200.0 - 103.939)).abs() < 1e-4);
    }

    #[test]
    fn test_round_trip_all_values() {
        let pixels = Array3::from_shape_fn((16, 16, 3), |(y, x, c)| {
            #[allow(clippy::cast_precision_loss)]
            let v = ((y * 16 + x + c * 7) % 256) as f32;
            v
        });
        let img = postprocess(&preprocess(&pixels));

        for (x, y, px) in img.enumerate_pixels() {
            for c in 0..3 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let expected = pixels[[y as usize, x as usize, c]] as u8;
                assert_eq!(px[c], expected);
            }
        }
    }

    #[test]
    fn test_postprocess_clamps() {
        let mut tensor = ImageTensor::zeros((1, 1, 2, 3));
        tensor[[0, 0, 0, 0]] = -500.0;
        tensor[[0, 0, 1, 0]] = 500.0;
        let img = postprocess(&tensor);

        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 255);
    }
}
