//! Area-averaging resampling for float RGB arrays.

use ndarray::{Array3, Axis};

/// Target `(height, width)` so that the larger side is at most `max_size`.
///
/// The larger side becomes exactly `max_size`; the smaller side is scaled by
/// the same factor and truncated, never below one pixel.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn fit_within(height: usize, width: usize, max_size: usize) -> (usize, usize) {
    if height.max(width) <= max_size {
        return (height, width);
    }

    let scale = |small: usize, large: usize| {
        ((max_size as f64 / large as f64) * small as f64).max(1.0) as usize
    };

    if height > width {
        (max_size, scale(width, height))
    } else {
        (scale(height, width), max_size)
    }
}

/// Resize an `(H, W, C)` array with area interpolation.
///
/// Each output pixel averages the input pixels its footprint covers, weighted
/// by coverage. Along an axis that grows, this falls back to linear
/// interpolation between pixel centres.
#[must_use]
pub fn resize_area(pixels: &Array3<f32>, height: usize, width: usize) -> Array3<f32> {
    let (in_h, in_w, _) = pixels.dim();
    if (in_h, in_w) == (height, width) {
        return pixels.clone();
    }

    let rows = resample_axis(pixels, Axis(0), height);
    resample_axis(&rows, Axis(1), width)
}

fn resample_axis(input: &Array3<f32>, axis: Axis, out_len: usize) -> Array3<f32> {
    let in_len = input.len_of(axis);
    let mut shape = input.raw_dim();
    shape[axis.index()] = out_len;
    let mut output = Array3::<f32>::zeros(shape);

    for (i, taps) in axis_taps(in_len, out_len).iter().enumerate() {
        let mut lane = output.index_axis_mut(axis, i);
        for &(j, weight) in taps {
            lane.scaled_add(weight, &input.index_axis(axis, j));
        }
    }

    output
}

/// Per output index, the input indices and weights contributing to it.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn axis_taps(in_len: usize, out_len: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = in_len as f64 / out_len as f64;

    (0..out_len)
        .map(|i| {
            if scale >= 1.0 {
                let start = i as f64 * scale;
                let end = start + scale;
                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(in_len);
                (first..last)
                    .filter_map(|j| {
                        let overlap = end.min(j as f64 + 1.0) - start.max(j as f64);
                        (overlap > 1e-9).then(|| (j, (overlap / scale) as f32))
                    })
                    .collect()
            } else {
                let centre = ((i as f64 + 0.5) * scale - 0.5).max(0.0);
                let lo = (centre.floor() as usize).min(in_len - 1);
                let hi = (lo + 1).min(in_len - 1);
                let frac = (centre - lo as f64) as f32;
                if hi == lo || frac <= 0.0 {
                    vec![(lo, 1.0)]
                } else {
                    vec![(lo, 1.0 - frac), (hi, frac)]
                }
            }
        })
        .collect()
}
