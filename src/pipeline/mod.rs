//! Style-transfer pipeline: configuration, losses, optimizers and outputs.

pub mod config;
pub mod loss;
pub mod objective;
pub mod optimizer;
mod output;
mod stylize;

pub use config::{AdamParams, Config, InitImage, LbfgsParams, OptimizerKind};
pub use objective::{Evaluation, LossTerms, Objective, StyleObjective};
pub use optimizer::{CheckpointSink, Optimizer, Schedule};
pub use output::{meta_data, CheckpointWriter, OutputLayout};
pub use stylize::{initial_image, Pipeline, RenderOutput, Stylized};
