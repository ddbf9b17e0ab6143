//! Interchangeable minimization strategies over the output image.

mod adam;
mod lbfgs;

pub use adam::Adam;
pub use lbfgs::Lbfgs;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::image::ImageTensor;
use crate::observer::RenderObserver;

use super::config::OptimizerKind;
use super::objective::{Evaluation, Objective};

/// Iteration budget and reporting cadence shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Number of blocks.
    pub blocks: usize,
    /// Iterations per block.
    pub max_iterations: usize,
    /// Iterations between loss reports; zero disables reporting.
    pub print_iterations: usize,
}

impl Schedule {
    /// Whether `iteration` is a reporting point.
    #[must_use]
    pub fn is_report(&self, iteration: usize) -> bool {
        self.print_iterations > 0 && iteration % self.print_iterations == 0
    }

    /// Total number of optimizer steps.
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        (self.blocks as u64).saturating_mul(self.max_iterations as u64)
    }
}

/// Receives intermediate images and persists them.
pub trait CheckpointSink {
    /// Persist the image reached at `(block, iteration)`, returning where it went.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be written.
    fn checkpoint(&mut self, block: usize, iteration: usize, image: &ImageTensor)
        -> Result<PathBuf>;
}

impl<F> CheckpointSink for F
where
    F: FnMut(usize, usize, &ImageTensor) -> Result<PathBuf>,
{
    fn checkpoint(
        &mut self,
        block: usize,
        iteration: usize,
        image: &ImageTensor,
    ) -> Result<PathBuf> {
        self(block, iteration, image)
    }
}

/// A strategy that minimizes an objective over the pixels of `image` in place.
pub trait Optimizer {
    /// Human-readable strategy name.
    fn name(&self) -> &'static str;

    /// Run the full schedule, checkpointing as the strategy dictates.
    ///
    /// Returns the loss at the final image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NumericInstability`] if the objective stops being
    /// finite, or any error raised by the objective or the sink.
    fn minimize(
        &self,
        objective: &dyn Objective,
        image: &mut ImageTensor,
        schedule: &Schedule,
        sink: &mut dyn CheckpointSink,
        observer: &mut dyn RenderObserver,
    ) -> Result<f64>;
}

/// Build the strategy selected in the configuration.
#[must_use]
pub fn from_kind(kind: OptimizerKind) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Lbfgs(params) => Box::new(Lbfgs::new(params)),
        OptimizerKind::Adam(params) => Box::new(Adam::new(params)),
    }
}

/// Evaluate and reject non-finite losses or gradients.
fn evaluate_finite(
    objective: &dyn Objective,
    image: &ImageTensor,
    block: usize,
    iteration: usize,
) -> Result<Evaluation> {
    let eval = objective.evaluate(image)?;
    if !eval.loss.is_finite() {
        return Err(Error::NumericInstability {
            block,
            iteration,
            what: "loss",
        });
    }
    if !eval.gradient.iter().all(|g| g.is_finite()) {
        return Err(Error::NumericInstability {
            block,
            iteration,
            what: "gradient",
        });
    }
    Ok(eval)
}

#[cfg(test)]
pub(crate) mod testing {
    use ndarray::Array4;

    use super::*;
    use crate::pipeline::objective::LossTerms;

    /// `0.5 * sum(scale_i * (x_i - target_i)^2)`, an ill-conditioned bowl.
    pub struct Quadratic {
        pub target: ImageTensor,
        pub scale: ImageTensor,
    }

    impl Quadratic {
        #[allow(clippy::cast_precision_loss)]
        pub fn new(shape: (usize, usize, usize, usize)) -> Self {
            Self {
                target: Array4::from_shape_fn(shape, |(_, y, x, c)| (y + 2 * x + 3 * c) as f32),
                scale: Array4::from_shape_fn(shape, |(_, y, x, c)| 1.0 + ((y + x + c) % 5) as f32),
            }
        }
    }

    impl Objective for Quadratic {
        fn evaluate(&self, image: &ImageTensor) -> Result<Evaluation> {
            let diff = image - &self.target;
            let gradient = &diff * &self.scale;
            let loss = 0.5
                * diff
                    .iter()
                    .zip(gradient.iter())
                    .map(|(d, g)| f64::from(*d) * f64::from(*g))
                    .sum::<f64>();
            Ok(Evaluation {
                loss,
                terms: LossTerms::default(),
                gradient,
            })
        }
    }

    /// Objective whose loss is never finite.
    pub struct Exploding;

    impl Objective for Exploding {
        fn evaluate(&self, image: &ImageTensor) -> Result<Evaluation> {
            Ok(Evaluation {
                loss: f64::NAN,
                terms: LossTerms::default(),
                gradient: image.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_reporting() {
        let schedule = Schedule {
            blocks: 2,
            max_iterations: 10,
            print_iterations: 5,
        };
        let reports: Vec<usize> = (0..10).filter(|&i| schedule.is_report(i)).collect();

        assert_eq!(reports, vec![0, 5]);
        assert_eq!(schedule.total_steps(), 20);
        assert!(!Schedule {
            print_iterations: 0,
            ..schedule
        }
        .is_report(0));
    }

    #[test]
    fn test_from_kind_names() {
        use crate::pipeline::config::{AdamParams, LbfgsParams};

        assert_eq!(from_kind(OptimizerKind::Lbfgs(LbfgsParams::default())).name(), "L-BFGS");
        assert_eq!(from_kind(OptimizerKind::Adam(AdamParams::default())).name(), "Adam");
    }
}
