//! Render orchestration: load inputs, build the objective, optimize, write outputs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::image::{self, spatial_dims, ImageTensor};
use crate::model::{Vgg19, WeightStore};
use crate::observer::RenderObserver;

use super::config::{Config, InitImage};
use super::objective::{Objective, StyleObjective};
use super::optimizer::{self, CheckpointSink, Schedule};
use super::output::{CheckpointWriter, OutputLayout};

/// Half-width of the uniform noise used for random initialization.
const NOISE_RANGE: f32 = 20.0;

/// Result of optimizing one image in memory.
#[derive(Debug, Clone)]
pub struct Stylized {
    /// The optimized image, mean-subtracted NHWC.
    pub image: ImageTensor,
    /// Loss at the initial image.
    pub initial_loss: f64,
    /// Loss at the optimized image.
    pub final_loss: f64,
}

/// Result of a full render to disk.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// The optimized image, mean-subtracted NHWC.
    pub image: ImageTensor,
    /// Directory holding every file of the render.
    pub output_dir: PathBuf,
    /// Path of the final image.
    pub final_path: PathBuf,
    /// Loss at the initial image.
    pub initial_loss: f64,
    /// Loss at the optimized image.
    pub final_loss: f64,
}

/// Style-transfer pipeline bound to one configuration and weight store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    weights: Arc<WeightStore>,
}

impl Pipeline {
    /// Create a pipeline, loading the weight store named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the weight store
    /// cannot be loaded.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let weights = WeightStore::open(&config.model_weights)?;
        Self::with_weights(config, Arc::new(weights))
    }

    /// Create a pipeline over an already loaded weight store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_weights(config: Config, weights: Arc<WeightStore>) -> Result<Self> {
        let config = config.normalized()?;
        tracing::debug!("Pipeline config: {config:?}");
        Ok(Self { config, weights })
    }

    /// The normalized configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render to disk as the configuration describes.
    ///
    /// The render:
    /// 1. Loads the content image, downscaled to `max_size`
    /// 2. Loads every style image, resized to the content dimensions
    /// 3. Optimizes, writing checkpoints under the `iters` directory
    /// 4. Writes the final image, input copies and `meta_data.txt`
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or unreadable, the
    /// optimization diverges, or an output cannot be written.
    pub fn render(&self, observer: &mut dyn RenderObserver) -> Result<RenderOutput> {
        let config = &self.config;

        let content_path = config.content_path();
        tracing::info!("Loading content image: {}", content_path.display());
        let content = image::load_content_image(&content_path, config.max_size)?;
        let dims = spatial_dims(&content);

        let styles = config
            .style_paths()
            .iter()
            .map(|path| {
                tracing::info!("Loading style image: {}", path.display());
                image::load_style_image(path, dims)
            })
            .collect::<Result<Vec<_>>>()?;

        let layout = OutputLayout::new(config);
        layout.create()?;
        tracing::info!("Writing outputs to {}", layout.dir().display());

        let mut sink = CheckpointWriter::new(&layout, config.output_quality);
        let stylized = self.stylize(&content, &styles, &mut sink, observer)?;

        let final_path = layout.write_final(config, &stylized.image, &content, &styles)?;
        observer.image_written(&final_path);
        tracing::info!("Saved {}", final_path.display());

        Ok(RenderOutput {
            image: stylized.image,
            output_dir: layout.dir().to_path_buf(),
            final_path,
            initial_loss: stylized.initial_loss,
            final_loss: stylized.final_loss,
        })
    }

    /// Optimize an image from in-memory inputs.
    ///
    /// Every style image must already have the content image's dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs do not fit the network, the
    /// optimization diverges, or the sink fails.
    pub fn stylize(
        &self,
        content: &ImageTensor,
        styles: &[ImageTensor],
        sink: &mut dyn CheckpointSink,
        observer: &mut dyn RenderObserver,
    ) -> Result<Stylized> {
        let config = &self.config;
        let (height, width) = spatial_dims(content);

        if styles.len() != config.style_imgs_weights.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} style images", config.style_imgs_weights.len()),
                actual: styles.len().to_string(),
            });
        }

        tracing::info!("Building network for {width}x{height} input");
        let net = Vgg19::build(&self.weights, height, width, config.deepest_layer(), observer)?;
        let objective = StyleObjective::new(net, config, content, styles)?;

        let mut image = initial_image(config.init, content, styles)?;
        let initial = objective.evaluate(&image)?;
        tracing::debug!(
            "Initial loss {} (content {}, style {}, tv {})",
            initial.loss,
            initial.terms.content,
            initial.terms.style,
            initial.terms.tv
        );

        let strategy = optimizer::from_kind(config.optimizer);
        let schedule = Schedule {
            blocks: config.blocks,
            max_iterations: config.max_iterations,
            print_iterations: config.print_iterations,
        };

        observer.optimization_started(strategy.name(), schedule.total_steps());
        let start = Instant::now();
        let final_loss = strategy.minimize(&objective, &mut image, &schedule, sink, observer)?;
        observer.finished(final_loss, start.elapsed());

        Ok(Stylized {
            image,
            initial_loss: initial.loss,
            final_loss,
        })
    }
}

/// The image optimization starts from.
///
/// # Errors
///
/// Returns an error if a style start is requested without style images.
pub fn initial_image(
    init: InitImage,
    content: &ImageTensor,
    styles: &[ImageTensor],
) -> Result<ImageTensor> {
    match init {
        InitImage::Content => Ok(content.clone()),
        InitImage::Style => styles
            .first()
            .cloned()
            .ok_or_else(|| Error::config("init_img_type", "no style image to start from")),
        InitImage::Random { seed, noise_ratio } => {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let noise = ImageTensor::from_shape_fn(content.raw_dim(), |_| {
                rng.random_range(-NOISE_RANGE..NOISE_RANGE)
            });

            // Safe: noise_ratio is validated to lie in [0, 1]
            #[allow(clippy::cast_possible_truncation)]
            let ratio = noise_ratio as f32;
            Ok(noise * ratio + content * (1.0 - ratio))
        }
    }
}
