//! VGG19 weight store loading and validation.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array4, ArrayD, Ix4};
use ndarray_npy::{NpzReader, NpzWriter};
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::image::RGB_CHANNELS;

use super::layers::{conv_block, store_index, CONV_LAYERS};

/// Frozen kernel and bias of one convolution layer.
#[derive(Debug, Clone)]
pub struct ConvWeights {
    /// Kernel in `(kh, kw, c_in, c_out)` layout.
    pub kernel: Array4<f32>,
    /// Per-output-channel bias.
    pub bias: Array1<f32>,
}

impl ConvWeights {
    /// Input channel count.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.kernel.dim().2
    }

    /// Output channel count.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.kernel.dim().3
    }
}

/// Weights of the 16 VGG19 convolution layers, validated against the topology.
#[derive(Debug, Clone)]
pub struct WeightStore {
    layers: Vec<ConvWeights>,
}

impl WeightStore {
    /// Archive entry holding the kernel for a store index.
    #[must_use]
    pub fn weights_key(index: usize) -> String {
        format!("layers.{index}.weights")
    }

    /// Archive entry holding the bias for a store index.
    #[must_use]
    pub fn bias_key(index: usize) -> String {
        format!("layers.{index}.bias")
    }

    /// Load a weight store from an `.npz` archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFile`] if the archive does not exist and
    /// [`Error::MalformedWeightStore`] if an expected entry is absent or
    /// does not fit the VGG19 topology.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
            });
        }

        tracing::info!("Loading model weights from {}", path.display());

        let mut npz = NpzReader::new(File::open(path)?).map_err(|source| Error::WeightStoreRead {
            entry: path.display().to_string(),
            source,
        })?;

        let names: HashSet<String> = npz
            .names()
            .map_err(|source| Error::WeightStoreRead {
                entry: "archive index".to_string(),
                source,
            })?
            .into_iter()
            .collect();

        let mut layers = Vec::with_capacity(CONV_LAYERS);
        for conv in 0..CONV_LAYERS {
            let index = store_index(conv);
            let kernel = read_entry(&mut npz, &names, index, &Self::weights_key(index))?;
            let bias = read_entry(&mut npz, &names, index, &Self::bias_key(index))?;

            let kernel = kernel.into_dimensionality::<Ix4>().map_err(|_| {
                Error::malformed(index, "kernel must have 4 dimensions (kh, kw, c_in, c_out)")
            })?;
            let bias = Array1::from_iter(bias.iter().copied());

            layers.push(ConvWeights { kernel, bias });
        }

        Self::from_layers(layers)
    }

    /// Build a store from in-memory layers, in conv order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedWeightStore`] if the layers do not chain.
    pub fn from_layers(layers: Vec<ConvWeights>) -> Result<Self> {
        if layers.len() != CONV_LAYERS {
            return Err(Error::WeightStoreLayerCount {
                expected: CONV_LAYERS,
                found: layers.len(),
            });
        }

        let mut channels = RGB_CHANNELS;
        for (conv, layer) in layers.iter().enumerate() {
            let index = store_index(conv);
            let (kh, kw, c_in, c_out) = layer.kernel.dim();

            if kh != 3 || kw != 3 {
                return Err(Error::malformed(index, format!("kernel is {kh}x{kw}, expected 3x3")));
            }
            if c_in != channels {
                return Err(Error::malformed(
                    index,
                    format!("kernel consumes {c_in} channels, previous layer produces {channels}"),
                ));
            }
            if c_out == 0 {
                return Err(Error::malformed(index, "kernel has no output channels"));
            }
            if layer.bias.len() != c_out {
                return Err(Error::malformed(
                    index,
                    format!("bias has {} entries, kernel has {c_out} outputs", layer.bias.len()),
                ));
            }
            channels = c_out;
        }

        Ok(Self { layers })
    }

    /// Randomly initialised store with the given per-block channel widths.
    ///
    /// Kernels use He-uniform initialisation from a seeded generator. Useful
    /// for smoke tests and benchmarks where the published weights are unavailable.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn random(block_widths: [usize; 5], seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut c_in = RGB_CHANNELS;

        let layers = (0..CONV_LAYERS)
            .map(|conv| {
                let c_out = block_widths[conv_block(conv)].max(1);
                let limit = (6.0 / (9 * c_in) as f32).sqrt();
                let kernel =
                    Array4::from_shape_fn((3, 3, c_in, c_out), |_| rng.random_range(-limit..limit));
                let bias = Array1::from_shape_fn(c_out, |_| rng.random_range(0.0..0.1));
                c_in = c_out;
                ConvWeights { kernel, bias }
            })
            .collect();

        Self { layers }
    }

    /// Write the store as an `.npz` archive readable by [`WeightStore::open`].
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let write_err = |source| Error::WeightStoreWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut npz = NpzWriter::new(File::create(path)?);
        for (conv, layer) in self.layers.iter().enumerate() {
            let index = store_index(conv);
            npz.add_array(Self::weights_key(index), &layer.kernel)
                .map_err(write_err)?;
            npz.add_array(Self::bias_key(index), &layer.bias)
                .map_err(write_err)?;
        }
        npz.finish().map_err(write_err)?;

        Ok(())
    }

    /// Weights of the conv layer with the given ordinal (0..16).
    #[must_use]
    pub fn layer(&self, conv: usize) -> &ConvWeights {
        &self.layers[conv]
    }
}

/// Read one array, accepting names stored with or without the `.npy` suffix.
fn read_entry(
    npz: &mut NpzReader<File>,
    names: &HashSet<String>,
    index: usize,
    key: &str,
) -> Result<ArrayD<f32>> {
    let with_ext = format!("{key}.npy");
    let name = if names.contains(key) {
        key
    } else if names.contains(&with_ext) {
        with_ext.as_str()
    } else {
        return Err(Error::malformed(index, format!("missing entry {key}")));
    };

    npz.by_name(name).map_err(|source| Error::WeightStoreRead {
        entry: key.to_string(),
        source,
    })
}
