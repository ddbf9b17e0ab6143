//! Render configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::LayerId;

/// Hyperparameters of the Adam strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamParams {
    /// Step size.
    pub learning_rate: f64,
    /// Decay rate of the first moment estimate.
    pub beta1: f64,
    /// Decay rate of the second moment estimate.
    pub beta2: f64,
    /// Added to the denominator for numerical stability.
    pub epsilon: f64,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 10.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Hyperparameters of the L-BFGS strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbfgsParams {
    /// Number of correction pairs kept for the inverse Hessian estimate.
    pub history: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self { history: 10 }
    }
}

/// Optimization strategy with its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    /// Limited-memory quasi-Newton, checkpointed once per block.
    Lbfgs(LbfgsParams),
    /// First-order Adam, checkpointed every `print_iterations` steps.
    Adam(AdamParams),
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Lbfgs(LbfgsParams::default())
    }
}

impl OptimizerKind {
    /// Short name, as accepted on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lbfgs(_) => "lbfgs",
            Self::Adam(_) => "adam",
        }
    }
}

/// How the output image is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitImage {
    /// Start from the content image.
    #[default]
    Content,
    /// Start from the first style image.
    Style,
    /// Blend uniform noise in [-20, 20] into the content image.
    Random {
        /// Seed of the noise generator.
        seed: u64,
        /// Share of noise in the blend, 0 to 1.
        noise_ratio: f64,
    },
}

impl fmt::Display for InitImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => f.write_str("content"),
            Self::Style => f.write_str("style"),
            Self::Random { seed, noise_ratio } => {
                write!(f, "random(seed={seed}, noise_ratio={noise_ratio})")
            }
        }
    }
}

/// Configuration for one render.
#[derive(Debug, Clone)]
pub struct Config {
    /// Content image filename, relative to `content_img_dir`.
    pub content_img: PathBuf,

    /// Directory holding the content image.
    pub content_img_dir: PathBuf,

    /// Style image filenames, relative to `style_imgs_dir`.
    pub style_imgs: Vec<PathBuf>,

    /// Directory holding the style images.
    pub style_imgs_dir: PathBuf,

    /// Blend weight of each style image.
    pub style_imgs_weights: Vec<f64>,

    /// Explicit output filename. Derived from the inputs when `None`.
    pub img_name: Option<String>,

    /// Maximum width or height of the content image.
    pub max_size: usize,

    /// Weight of the content loss (alpha).
    pub content_weight: f64,

    /// Weight of the style loss (beta).
    pub style_weight: f64,

    /// Weight of the total-variation loss (theta).
    pub tv_weight: f64,

    /// Layers compared against the content image.
    pub content_layers: Vec<LayerId>,

    /// Layers compared against the style images.
    pub style_layers: Vec<LayerId>,

    /// Contribution of each content layer.
    pub content_layer_weights: Vec<f64>,

    /// Contribution of each style layer.
    pub style_layer_weights: Vec<f64>,

    /// Path to the VGG19 weight archive.
    pub model_weights: PathBuf,

    /// Root directory for render outputs.
    pub img_output_dir: PathBuf,

    /// Optimization strategy and hyperparameters.
    pub optimizer: OptimizerKind,

    /// Number of optimization blocks; images are saved between blocks.
    pub blocks: usize,

    /// Iterations per block.
    pub max_iterations: usize,

    /// Iterations between loss reports (and Adam checkpoints). Zero disables them.
    pub print_iterations: usize,

    /// Initial output image.
    pub init: InitImage,

    /// Output JPEG quality (1-100).
    pub output_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_img: PathBuf::new(),
            content_img_dir: PathBuf::from("./image_input"),
            style_imgs: Vec::new(),
            style_imgs_dir: PathBuf::from("./styles"),
            style_imgs_weights: vec![1.0],
            img_name: None,
            max_size: 512,
            content_weight: 5.0,
            style_weight: 1e4,
            tv_weight: 1e-3,
            content_layers: vec![LayerId::Conv4_2],
            style_layers: vec![
                LayerId::Relu1_1,
                LayerId::Relu2_1,
                LayerId::Relu3_1,
                LayerId::Relu4_1,
                LayerId::Relu5_1,
            ],
            content_layer_weights: vec![1.0],
            style_layer_weights: vec![0.2; 5],
            model_weights: PathBuf::from("imagenet-vgg-verydeep-19.npz"),
            img_output_dir: PathBuf::from("./image_output"),
            optimizer: OptimizerKind::default(),
            blocks: 1,
            max_iterations: 1000,
            print_iterations: 50,
            init: InitImage::default(),
            output_quality: 95,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any parameter is out of
    /// range or list lengths disagree.
    pub fn validate(&self) -> Result<()> {
        if self.content_img.as_os_str().is_empty() {
            return Err(Error::config("content_img", "a content image is required"));
        }

        if self.style_imgs.is_empty() {
            return Err(Error::config("style_imgs", "at least one style image is required"));
        }

        check_lengths(
            "style_imgs_weights",
            self.style_imgs.len(),
            &self.style_imgs_weights,
        )?;
        check_lengths(
            "content_layer_weights",
            self.content_layers.len(),
            &self.content_layer_weights,
        )?;
        check_lengths(
            "style_layer_weights",
            self.style_layers.len(),
            &self.style_layer_weights,
        )?;

        if self.content_layers.is_empty() {
            return Err(Error::config("content_layers", "must name at least one layer"));
        }
        if self.style_layers.is_empty() {
            return Err(Error::config("style_layers", "must name at least one layer"));
        }

        for (name, value) in [
            ("content_weight", self.content_weight),
            ("style_weight", self.style_weight),
            ("tv_weight", self.tv_weight),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::config(name, "must be a non-negative number"));
            }
        }

        for (name, value) in [
            ("max_size", self.max_size),
            ("blocks", self.blocks),
            ("max_iterations", self.max_iterations),
        ] {
            if value == 0 {
                return Err(Error::config(name, "must be greater than 0"));
            }
        }

        match self.optimizer {
            OptimizerKind::Adam(params) => {
                if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
                    return Err(Error::config("learning_rate", "must be greater than 0"));
                }
                for (name, beta) in [("beta1", params.beta1), ("beta2", params.beta2)] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(Error::config(name, "must be in [0, 1)"));
                    }
                }
                if !(params.epsilon.is_finite() && params.epsilon > 0.0) {
                    return Err(Error::config("epsilon", "must be greater than 0"));
                }
            }
            OptimizerKind::Lbfgs(params) => {
                if params.history == 0 {
                    return Err(Error::config("history", "must be greater than 0"));
                }
            }
        }

        if let InitImage::Random { noise_ratio, .. } = self.init {
            if !(0.0..=1.0).contains(&noise_ratio) {
                return Err(Error::config("noise_ratio", "must be between 0.0 and 1.0"));
            }
        }

        if !(1..=100).contains(&self.output_quality) {
            return Err(Error::config("output_quality", "must be between 1 and 100"));
        }

        Ok(())
    }

    /// Validate and return a copy with every weight vector normalized to sum to 1.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn normalized(&self) -> Result<Self> {
        self.validate()?;

        Ok(Self {
            style_imgs_weights: normalize(&self.style_imgs_weights),
            content_layer_weights: normalize(&self.content_layer_weights),
            style_layer_weights: normalize(&self.style_layer_weights),
            ..self.clone()
        })
    }

    /// Full path of the content image.
    #[must_use]
    pub fn content_path(&self) -> PathBuf {
        self.content_img_dir.join(&self.content_img)
    }

    /// Full paths of the style images.
    #[must_use]
    pub fn style_paths(&self) -> Vec<PathBuf> {
        self.style_imgs
            .iter()
            .map(|p| self.style_imgs_dir.join(p))
            .collect()
    }

    /// Deepest layer any loss term reads.
    #[must_use]
    pub fn deepest_layer(&self) -> LayerId {
        self.content_layers
            .iter()
            .chain(&self.style_layers)
            .copied()
            .max()
            .unwrap_or(LayerId::Conv1_1)
    }
}

/// Scale weights to sum to 1; all zeros if the sum is not positive.
#[must_use]
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    let denom: f64 = weights.iter().sum();
    if denom > 0.0 {
        weights.iter().map(|w| w / denom).collect()
    } else {
        vec![0.0; weights.len()]
    }
}

fn check_lengths(name: &str, expected: usize, weights: &[f64]) -> Result<()> {
    if weights.len() != expected {
        return Err(Error::config(
            name,
            format!("expected {expected} weights, got {}", weights.len()),
        ));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(Error::config(name, "weights must be finite"));
    }
    Ok(())
}

/// File stem of a path as a string, empty if it has none.
pub(crate) fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
