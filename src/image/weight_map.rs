//! Plaintext region-of-interest weight maps.
//!
//! The first line holds `<width> <height>`, followed by `height` rows of
//! `width` whitespace-separated numbers. Values below 255 map to 0, the rest
//! to 1, and the mask is replicated across the three colour channels.

use std::path::Path;

use ndarray::{Array2, Array3, Axis};

use crate::error::{Error, Result};

use super::RGB_CHANNELS;

/// Binary `(height, width, 3)` mask.
pub type WeightMap = Array3<f32>;

/// Read and threshold a weight map file.
///
/// # Errors
///
/// Returns [`Error::MissingFile`] if the file does not exist and
/// [`Error::InvalidWeightMap`] if the header or any row is malformed.
pub fn read_weight_map<P: AsRef<Path>>(path: P) -> Result<WeightMap> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path)?;
    parse_weight_map(&text).map_err(|(line, reason)| Error::InvalidWeightMap {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

fn parse_weight_map(text: &str) -> std::result::Result<WeightMap, (usize, String)> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or((1, "missing header".to_string()))?;
    let dims = header
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| (1, format!("bad header: {e}")))?;
    let &[width, height] = dims.as_slice() else {
        return Err((1, format!("expected `<width> <height>`, got {header:?}")));
    };

    let mut mask = Array2::<f32>::zeros((height, width));
    let mut rows = 0;
    for (row, (idx, line)) in lines.enumerate() {
        let line_no = idx + 1;
        if row >= height {
            return Err((line_no, format!("more than {height} rows")));
        }

        let mut cols = 0;
        for (col, token) in line.split_whitespace().enumerate() {
            if col >= width {
                return Err((line_no, format!("more than {width} values")));
            }
            let value: f32 = token
                .parse()
                .map_err(|e| (line_no, format!("bad value {token:?}: {e}")))?;
            mask[[row, col]] = if value < 255.0 { 0.0 } else { 1.0 };
            cols += 1;
        }
        if cols != width {
            return Err((line_no, format!("expected {width} values, got {cols}")));
        }
        rows += 1;
    }

    if rows != height {
        return Err((rows + 2, format!("expected {height} rows, got {rows}")));
    }

    let plane = mask.insert_axis(Axis(2));
    let views = vec![plane.view(); RGB_CHANNELS];
    ndarray::concatenate(Axis(2), &views).map_err(|e| (1, e.to_string()))
}
