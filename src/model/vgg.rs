//! The VGG19 feature extractor on burn's autodiff `NdArray` backend.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::activation::relu;
use burn::tensor::module::{avg_pool2d, conv2d};
use burn::tensor::ops::ConvOptions;
use burn::tensor::{backend, Tensor, TensorData};

use crate::error::{Error, Result};
use crate::image::{ImageTensor, RGB_CHANNELS};
use crate::observer::RenderObserver;

use super::layers::{LayerId, LayerOp, CONV_LAYERS};
use super::loader::WeightStore;

/// Tensor backend: reverse-mode autodiff over CPU `ndarray`, in f64.
pub type Backend = Autodiff<NdArray<f64>>;

/// Activation tensor of one layer, NCHW.
pub type Activation = Tensor<Backend, 4>;

/// A VGG19 network bound to a fixed input size.
///
/// Construction uploads the kernels, computes every layer's output shape up
/// to `depth` and reports it to the observer; evaluation never logs.
#[derive(Debug, Clone)]
pub struct Vgg19 {
    kernels: Vec<Tensor<Backend, 4>>,
    biases: Vec<Tensor<Backend, 4>>,
    height: usize,
    width: usize,
    depth: usize,
    device: NdArrayDevice,
}

impl Vgg19 {
    /// Build the network for `(1, height, width, 3)` images, up to and including `depth`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input has no pixels.
    pub fn build(
        weights: &WeightStore,
        height: usize,
        width: usize,
        depth: LayerId,
        observer: &mut dyn RenderObserver,
    ) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(Error::ShapeMismatch {
                expected: "non-empty image".to_string(),
                actual: format!("{width}x{height}"),
            });
        }

        let device = NdArrayDevice::default();
        let mut kernels = Vec::with_capacity(CONV_LAYERS);
        let mut biases = Vec::with_capacity(CONV_LAYERS);
        for conv in 0..CONV_LAYERS {
            let layer = weights.layer(conv);
            let (kh, kw, c_in, c_out) = layer.kernel.dim();

            // (kh, kw, c_in, c_out) -> (c_out, c_in, kh, kw)
            let kernel = Tensor::<Backend, 4>::from_data(
                TensorData::new(
                    layer.kernel.iter().map(|&v| f64::from(v)).collect(),
                    [kh, kw, c_in, c_out],
                ),
                &device,
            )
            .permute([3, 2, 0, 1]);
            let bias = Tensor::<Backend, 4>::from_data(
                TensorData::new(
                    layer.bias.iter().map(|&v| f64::from(v)).collect(),
                    [1, c_out, 1, 1],
                ),
                &device,
            );

            kernels.push(kernel);
            biases.push(bias);
        }

        let mut shape = [1, height, width, RGB_CHANNELS];
        for &layer in &LayerId::ALL[..=depth.position()] {
            shape = match layer.op() {
                LayerOp::Conv { conv } => [1, shape[1], shape[2], weights.layer(conv).out_channels()],
                LayerOp::Relu { .. } => shape,
                LayerOp::Pool => [1, shape[1].div_ceil(2), shape[2].div_ceil(2), shape[3]],
            };
            observer.layer_built(layer, shape);
        }

        Ok(Self {
            kernels,
            biases,
            height,
            width,
            depth: depth.position() + 1,
            device,
        })
    }

    /// Upload an NHWC image as an NCHW input tensor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the image is not the size the
    /// network was built for.
    pub fn input(&self, image: &ImageTensor) -> Result<Activation> {
        let expected = [1, self.height, self.width, RGB_CHANNELS];
        if image.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", image.shape()),
            });
        }

        let data = TensorData::new(image.iter().map(|&v| f64::from(v)).collect(), expected);
        Ok(Tensor::<Backend, 4>::from_data(data, &self.device).permute([0, 3, 1, 2]))
    }

    /// Evaluate every layer up to depth on an input from [`Vgg19::input`].
    ///
    /// Gradients flow back to `input` if it requires them.
    #[must_use]
    pub fn forward(&self, input: &Activation) -> Activations {
        let mut outputs: Vec<Activation> = Vec::with_capacity(self.depth);
        for &layer in &LayerId::ALL[..self.depth] {
            let prev = outputs.last().unwrap_or(input).clone();
            let out = match layer.op() {
                LayerOp::Conv { conv } => conv2d(
                    prev,
                    self.kernels[conv].clone(),
                    None,
                    ConvOptions::new([1, 1], [1, 1], [1, 1], 1),
                ),
                LayerOp::Relu { conv } => relu(prev + self.biases[conv].clone()),
                LayerOp::Pool => avg_pool_same(prev),
            };
            outputs.push(out);
        }

        Activations { outputs }
    }
}

/// 2x2 stride-2 average pooling with SAME padding.
///
/// Odd edges are zero-padded at the end and windows average only the cells
/// they cover.
fn avg_pool_same(x: Activation) -> Activation {
    let [_, _, h, w] = x.dims();
    let (pad_h, pad_w) = (h % 2, w % 2);
    if pad_h == 0 && pad_w == 0 {
        return avg_pool2d(x, [2, 2], [2, 2], [0, 0], true);
    }

    let device = x.device();
    let sums = avg_pool2d(pad_end(x, pad_h, pad_w), [2, 2], [2, 2], [0, 0], true);
    let coverage = avg_pool2d(
        pad_end(Tensor::ones([1, 1, h, w], &device), pad_h, pad_w),
        [2, 2],
        [2, 2],
        [0, 0],
        true,
    );
    sums / coverage
}

/// Append `pad_h` zero rows and `pad_w` zero columns.
fn pad_end(x: Activation, pad_h: usize, pad_w: usize) -> Activation {
    let [n, c, h, w] = x.dims();
    let device = x.device();

    let x = if pad_h > 0 {
        Tensor::cat(vec![x, Tensor::zeros([n, c, pad_h, w], &device)], 2)
    } else {
        x
    };
    if pad_w > 0 {
        Tensor::cat(vec![x, Tensor::zeros([n, c, h + pad_h, pad_w], &device)], 3)
    } else {
        x
    }
}

/// Download an NCHW tensor as an NHWC image array.
///
/// # Errors
///
/// Returns an error if the tensor data cannot be read back as floats.
#[allow(clippy::cast_possible_truncation)]
pub fn to_image<B: backend::Backend>(tensor: Tensor<B, 4>) -> Result<ImageTensor> {
    let [n, c, h, w] = tensor.dims();
    let values = tensor
        .permute([0, 2, 3, 1])
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|err| Error::ShapeMismatch {
            expected: "f64 tensor data".to_string(),
            actual: format!("{err:?}"),
        })?;

    Ok(ImageTensor::from_shape_vec(
        (n, h, w, c),
        values.into_iter().map(|v| v as f32).collect(),
    )?)
}

/// Activations of one forward pass, addressable by layer.
#[derive(Debug, Clone)]
pub struct Activations {
    outputs: Vec<Activation>,
}

impl Activations {
    /// Activation of a layer, if the pass reached it.
    #[must_use]
    pub fn get(&self, layer: LayerId) -> Option<&Activation> {
        self.outputs.get(layer.position())
    }

    /// Activation of a layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the pass stopped before `layer`.
    pub fn require(&self, layer: LayerId) -> Result<&Activation> {
        self.get(layer).ok_or_else(|| Error::ShapeMismatch {
            expected: format!("activation for {layer}"),
            actual: format!("network depth {}", self.outputs.len()),
        })
    }
}
