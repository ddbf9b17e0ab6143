//! The weighted style-transfer objective over a frozen feature extractor.

use burn::tensor::Tensor;

use crate::error::Result;
use crate::image::ImageTensor;
use crate::model::{to_image, Activation, Backend, LayerId, Vgg19};

use super::config::Config;
use super::loss::{content_layer_loss, gram_matrix, style_layer_loss, total_variation, Scalar};

/// Loss value and gradient of an objective at one image.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Weighted total loss.
    pub loss: f64,
    /// Unweighted breakdown of the total.
    pub terms: LossTerms,
    /// Gradient of `loss` with respect to the image.
    pub gradient: ImageTensor,
}

/// The three sub-objectives, before their alpha/beta/theta weights.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossTerms {
    /// Aggregate content loss.
    pub content: f64,
    /// Aggregate style loss.
    pub style: f64,
    /// Total variation of the image.
    pub tv: f64,
}

/// A differentiable scalar function of the output image.
pub trait Objective {
    /// Evaluate the loss and its gradient at `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image` does not fit the objective.
    fn evaluate(&self, image: &ImageTensor) -> Result<Evaluation>;
}

/// Frozen reference activation of one content layer.
#[derive(Debug, Clone)]
struct ContentTarget {
    layer: LayerId,
    weight: f64,
    activation: Activation,
}

/// Frozen reference Gram matrix of one style layer.
#[derive(Debug, Clone)]
struct StyleTarget {
    layer: LayerId,
    weight: f64,
    gram: Tensor<Backend, 2>,
}

/// Weighted sum of content, style and total-variation losses.
///
/// Reference activations are computed once at construction and treated as
/// constants; gradients only flow through the image being optimized.
#[derive(Debug, Clone)]
pub struct StyleObjective {
    net: Vgg19,
    content: Vec<ContentTarget>,
    styles: Vec<(f64, Vec<StyleTarget>)>,
    alpha: f64,
    beta: f64,
    theta: f64,
}

impl StyleObjective {
    /// Freeze content and style targets against `net`.
    ///
    /// `config` must already be normalized so weight vectors sum to 1.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference image does not fit the network or a
    /// configured layer lies beyond its depth.
    pub fn new(
        net: Vgg19,
        config: &Config,
        content: &ImageTensor,
        styles: &[ImageTensor],
    ) -> Result<Self> {
        let acts = net.forward(&net.input(content)?);
        let content_targets = config
            .content_layers
            .iter()
            .zip(&config.content_layer_weights)
            .map(|(&layer, &weight)| {
                Ok(ContentTarget {
                    layer,
                    weight,
                    activation: acts.require(layer)?.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut style_targets = Vec::with_capacity(styles.len());
        for (style, &image_weight) in styles.iter().zip(&config.style_imgs_weights) {
            let acts = net.forward(&net.input(style)?);
            let layers = config
                .style_layers
                .iter()
                .zip(&config.style_layer_weights)
                .map(|(&layer, &weight)| {
                    Ok(StyleTarget {
                        layer,
                        weight,
                        gram: gram_matrix(acts.require(layer)?),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            style_targets.push((image_weight, layers));
        }

        Ok(Self {
            net,
            content: content_targets,
            styles: style_targets,
            alpha: config.content_weight,
            beta: config.style_weight,
            theta: config.tv_weight,
        })
    }
}

impl Objective for StyleObjective {
    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, image: &ImageTensor) -> Result<Evaluation> {
        let input = self.net.input(image)?.require_grad();
        let acts = self.net.forward(&input);
        let device = input.device();

        let content_layers = self.content.len() as f64;
        let mut content: Scalar = Tensor::zeros([1], &device);
        for target in &self.content {
            let loss = content_layer_loss(&target.activation, acts.require(target.layer)?);
            content = content + loss.mul_scalar(target.weight / content_layers);
        }

        let style_images = self.styles.len() as f64;
        let mut style: Scalar = Tensor::zeros([1], &device);
        for (image_weight, layers) in &self.styles {
            let style_layers = layers.len() as f64;
            for target in layers {
                let loss = style_layer_loss(&target.gram, acts.require(target.layer)?);
                style = style
                    + loss.mul_scalar(image_weight * target.weight / (style_layers * style_images));
            }
        }

        let tv = total_variation(&input);

        let terms = LossTerms {
            content: content.clone().into_scalar(),
            style: style.clone().into_scalar(),
            tv: tv.clone().into_scalar(),
        };
        let total = content.mul_scalar(self.alpha)
            + style.mul_scalar(self.beta)
            + tv.mul_scalar(self.theta);
        let loss = total.clone().into_scalar();

        let grads = total.backward();
        let gradient = match input.grad(&grads) {
            Some(grad) => to_image(grad)?,
            None => ImageTensor::zeros(image.raw_dim()),
        };

        Ok(Evaluation {
            loss,
            terms,
            gradient,
        })
    }
}
