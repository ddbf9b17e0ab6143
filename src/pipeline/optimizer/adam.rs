//! First-order Adam strategy.

use ndarray::Zip;

use crate::error::Result;
use crate::image::ImageTensor;
use crate::observer::RenderObserver;
use crate::pipeline::config::AdamParams;
use crate::pipeline::objective::Objective;

use super::{evaluate_finite, CheckpointSink, Optimizer, Schedule};

/// Adam with bias-corrected moment estimates.
///
/// Runs `blocks * max_iterations` steps. After step `i` of a block, when `i`
/// is a multiple of `print_iterations`, the loss is reported and the image
/// checkpointed at `(block, i)`. Moments carry over between blocks.
#[derive(Debug, Clone, Copy)]
pub struct Adam {
    params: AdamParams,
}

impl Adam {
    /// Create the strategy.
    #[must_use]
    pub const fn new(params: AdamParams) -> Self {
        Self { params }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn minimize(
        &self,
        objective: &dyn Objective,
        image: &mut ImageTensor,
        schedule: &Schedule,
        sink: &mut dyn CheckpointSink,
        observer: &mut dyn RenderObserver,
    ) -> Result<f64> {
        let AdamParams {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.params;

        let mut m = ImageTensor::zeros(image.raw_dim());
        let mut v = ImageTensor::zeros(image.raw_dim());
        let mut t = 0_i32;

        for block in 0..schedule.blocks {
            observer.block_started(block);

            for iteration in 0..schedule.max_iterations {
                let eval = evaluate_finite(objective, image, block, iteration)?;
                t = t.saturating_add(1);

                let step = learning_rate * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));
                let (b1, b2) = (beta1 as f32, beta2 as f32);
                let (step, eps) = (step as f32, epsilon as f32);

                Zip::from(&mut *image)
                    .and(&mut m)
                    .and(&mut v)
                    .and(&eval.gradient)
                    .for_each(|x, m, v, &g| {
                        *m = b1 * *m + (1.0 - b1) * g;
                        *v = b2 * *v + (1.0 - b2) * g * g;
                        *x -= step * *m / (v.sqrt() + eps);
                    });
                observer.step();

                if schedule.is_report(iteration) {
                    let loss = evaluate_finite(objective, image, block, iteration)?.loss;
                    observer.iteration(block, iteration, loss);
                    let path = sink.checkpoint(block, iteration, image)?;
                    observer.image_written(&path);
                }
            }
        }

        Ok(evaluate_finite(objective, image, schedule.blocks, 0)?.loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::error::Error;
    use crate::observer::NullObserver;
    use crate::pipeline::optimizer::testing::{Exploding, Quadratic};

    #[test]
    fn test_checkpoints_every_print_interval() {
        let objective = Quadratic::new((1, 3, 3, 3));
        let mut image = ImageTensor::zeros((1, 3, 3, 3));
        let schedule = Schedule {
            blocks: 2,
            max_iterations: 10,
            print_iterations: 5,
        };

        let mut seen = Vec::new();
        let mut sink = |block: usize, iteration: usize, _: &ImageTensor| -> Result<PathBuf> {
            seen.push((block, iteration));
            Ok(PathBuf::from(format!("{block}.{iteration}.png")))
        };

        Adam::new(AdamParams::default())
            .minimize(&objective, &mut image, &schedule, &mut sink, &mut NullObserver)
            .unwrap();

        assert_eq!(seen, vec![(0, 0), (0, 5), (1, 0), (1, 5)]);
    }

    #[test]
    fn test_reduces_loss() {
        let objective = Quadratic::new((1, 4, 4, 3));
        let mut image = ImageTensor::zeros((1, 4, 4, 3));
        let initial = objective.evaluate(&image).unwrap().loss;

        let schedule = Schedule {
            blocks: 1,
            max_iterations: 500,
            print_iterations: 0,
        };
        let params = AdamParams {
            learning_rate: 0.5,
            ..AdamParams::default()
        };
        let mut sink = |_: usize, _: usize, _: &ImageTensor| -> Result<PathBuf> {
            panic!("no checkpoints expected")
        };

        let last = Adam::new(params)
            .minimize(&objective, &mut image, &schedule, &mut sink, &mut NullObserver)
            .unwrap();

        assert!(last < initial * 0.05, "{last} vs {initial}");
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // With bias correction the first update is lr * g / (|g| + eps) per pixel.
        let objective = Quadratic::new((1, 1, 2, 1));
        let mut image = ImageTensor::zeros((1, 1, 2, 1));
        let schedule = Schedule {
            blocks: 1,
            max_iterations: 1,
            print_iterations: 0,
        };
        let mut sink =
            |_: usize, _: usize, _: &ImageTensor| -> Result<PathBuf> { Ok(PathBuf::new()) };

        Adam::new(AdamParams {
            learning_rate: 0.25,
            ..AdamParams::default()
        })
        .minimize(&objective, &mut image, &schedule, &mut sink, &mut NullObserver)
        .unwrap();

        // target is (0, 2): pixel 0 has zero gradient, pixel 1 moves towards 2
        assert_eq!(image[[0, 0, 0, 0]], 0.0);
        assert!((image[[0, 0, 1, 0]] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_non_finite_loss_fails() {
        let mut image = ImageTensor::zeros((1, 2, 2, 3));
        let schedule = Schedule {
            blocks: 1,
            max_iterations: 3,
            print_iterations: 1,
        };
        let mut sink =
            |_: usize, _: usize, _: &ImageTensor| -> Result<PathBuf> { Ok(PathBuf::new()) };

        let err = Adam::new(AdamParams::default())
            .minimize(&Exploding, &mut image, &schedule, &mut sink, &mut NullObserver)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NumericInstability {
                block: 0,
                iteration: 0,
                what: "loss"
            }
        ));
    }
}
