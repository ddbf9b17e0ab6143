//! # neural-style
//!
//! Neural style transfer: render a content image in the style of one or more
//! style images by optimizing the pixels of an output image against a frozen
//! VGG19 feature extractor.
//!
//! The loss is a weighted sum of a content term (feature differences at
//! deep layers), a style term (Gram matrix differences at several layers)
//! and a total-variation smoothness term. It is minimized with L-BFGS or
//! Adam, checkpointing intermediate images to disk.
//!
//! ## Example
//!
//! ```no_run
//! use neural_style::{Config, LogObserver, Pipeline};
//!
//! # fn main() -> neural_style::Result<()> {
//! let config = Config {
//!     content_img: "lion.jpg".into(),
//!     style_imgs: vec!["starry-night.jpg".into()],
//!     ..Config::default()
//! };
//! let pipeline = Pipeline::new(config)?;
//!
//! let output = pipeline.render(&mut LogObserver::new())?;
//! println!("{}", output.final_path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod observer;
pub mod pipeline;

pub use error::{Error, Result};
pub use model::{LayerId, WeightStore};
pub use observer::{LogObserver, NullObserver, RenderObserver};
pub use pipeline::{
    AdamParams, Config, InitImage, LbfgsParams, OptimizerKind, Pipeline, RenderOutput,
};
