//! Diagnostic hooks invoked at defined points of a render.

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::model::LayerId;

/// Receives progress notifications from network construction and optimization.
///
/// Every method has a no-op default so implementors only override what they need.
pub trait RenderObserver {
    /// A layer was added to the network with the given NHWC output shape.
    fn layer_built(&mut self, _layer: LayerId, _shape: [usize; 4]) {}

    /// Optimization is about to start with the named strategy.
    fn optimization_started(&mut self, _strategy: &str, _total_steps: u64) {}

    /// A block of iterations is starting.
    fn block_started(&mut self, _block: usize) {}

    /// The loss was evaluated at a reporting point.
    fn iteration(&mut self, _block: usize, _iteration: usize, _loss: f64) {}

    /// An optimizer step completed.
    fn step(&mut self) {}

    /// An image was written to disk.
    fn image_written(&mut self, _path: &Path) {}

    /// The render finished with the given final loss.
    fn finished(&mut self, _loss: f64, _elapsed: Duration) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RenderObserver for NullObserver {}

/// Observer that reports through `tracing` and draws a progress bar.
#[derive(Debug, Default)]
pub struct LogObserver {
    progress: Option<ProgressBar>,
}

impl LogObserver {
    /// Create an observer with no progress bar yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderObserver for LogObserver {
    fn layer_built(&mut self, layer: LayerId, shape: [usize; 4]) {
        tracing::debug!("--{layer} | shape={shape:?}");
    }

    fn optimization_started(&mut self, strategy: &str, total_steps: u64) {
        tracing::info!("Minimizing loss using {strategy}");

        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Optimizing [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.progress = Some(pb);
    }

    fn block_started(&mut self, block: usize) {
        tracing::debug!("Block {block}");
    }

    fn iteration(&mut self, block: usize, iteration: usize, loss: f64) {
        tracing::debug!("Block {block}, iterate {iteration}\tf= {loss}");
    }

    fn step(&mut self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    fn image_written(&mut self, path: &Path) {
        tracing::debug!("Wrote {}", path.display());
    }

    fn finished(&mut self, loss: f64, elapsed: Duration) {
        if let Some(pb) = self.progress.take() {
            pb.finish_with_message("Optimization complete");
        }
        tracing::info!("Final loss {loss}, elapsed time: {:.2}s", elapsed.as_secs_f64());
    }
}
