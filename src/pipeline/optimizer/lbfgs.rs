//! Limited-memory BFGS strategy on `argmin`.

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{CostFunction, Error as ArgminError, Executor, Gradient, IterState, State, KV};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::Ix4;

use crate::error::{Error, Result};
use crate::image::ImageTensor;
use crate::observer::RenderObserver;
use crate::pipeline::config::LbfgsParams;
use crate::pipeline::objective::Objective;

use super::{evaluate_finite, CheckpointSink, Optimizer, Schedule};

type LbfgsState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// L-BFGS with a More-Thuente line search.
///
/// Each block is an independent `argmin` run of at most `max_iterations`
/// iterations started from the current image; the best image of the run is
/// checkpointed once at the end of every block as `(block, max_iterations)`.
/// A block ends early when the solver's gradient or cost tolerance is met or
/// the line search stalls after the first iteration.
#[derive(Debug, Clone, Copy)]
pub struct Lbfgs {
    params: LbfgsParams,
}

impl Lbfgs {
    /// Create the strategy.
    #[must_use]
    pub const fn new(params: LbfgsParams) -> Self {
        Self { params }
    }
}

impl Optimizer for Lbfgs {
    fn name(&self) -> &'static str {
        "L-BFGS"
    }

    fn minimize(
        &self,
        objective: &dyn Objective,
        image: &mut ImageTensor,
        schedule: &Schedule,
        sink: &mut dyn CheckpointSink,
        observer: &mut dyn RenderObserver,
    ) -> Result<f64> {
        let shape = image.raw_dim();
        let mut loss = 0.0;

        for block in 0..schedule.blocks {
            observer.block_started(block);

            let log = IterationLog::default();
            let best = RefCell::new(None);
            let problem = ImageProblem {
                objective,
                shape,
                block,
                log: log.clone(),
                last: RefCell::new(None),
                best: &best,
            };
            let x0 = flatten(image);
            let initial = problem.evaluate(&x0)?.0;

            let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.params.history);
            let result = Executor::new(problem, solver)
                .configure(|state| state.param(x0).max_iters(schedule.max_iterations as u64))
                .add_observer(log.clone(), ObserverMode::Always)
                .run();

            let costs = log.costs();
            match result {
                Ok(result) => tracing::debug!(
                    "Block {block} finished after {} iterations: {:?}",
                    costs.len(),
                    result.state().get_termination_status()
                ),
                Err(err) => match err.downcast::<Error>() {
                    Ok(err) => return Err(err),
                    Err(err) if costs.is_empty() => {
                        tracing::warn!("L-BFGS could not start block {block}: {err}");
                        return Err(Error::NumericInstability {
                            block,
                            iteration: 0,
                            what: "line search",
                        });
                    }
                    Err(err) => tracing::debug!(
                        "Line search stalled in block {block} after {} iterations: {err}",
                        costs.len()
                    ),
                },
            }

            // costs[i] is the loss after iteration i, reported at the start of i + 1
            for iteration in 0..costs.len() {
                if schedule.is_report(iteration) {
                    let before = if iteration == 0 {
                        initial
                    } else {
                        costs[iteration - 1]
                    };
                    observer.iteration(block, iteration, before);
                }
                observer.step();
            }

            loss = initial;
            if let Some((best_loss, x)) = best.into_inner() {
                *image = unflatten(&x, shape)?;
                loss = best_loss;
            }

            let path = sink.checkpoint(block, schedule.max_iterations, image)?;
            observer.image_written(&path);
        }

        Ok(loss)
    }
}

/// Loss after every completed solver iteration, shared with the executor.
#[derive(Debug, Clone, Default)]
struct IterationLog(Arc<Mutex<Vec<f64>>>);

impl IterationLog {
    fn costs(&self) -> Vec<f64> {
        self.0.lock().map(|costs| costs.clone()).unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.0.lock().map(|costs| costs.len()).unwrap_or_default()
    }
}

impl Observe<LbfgsState> for IterationLog {
    fn observe_iter(&mut self, state: &LbfgsState, _kv: &KV) -> std::result::Result<(), ArgminError> {
        if let Ok(mut costs) = self.0.lock() {
            costs.push(state.get_cost());
        }
        Ok(())
    }
}

/// The objective seen by `argmin`: a function of the flattened image.
///
/// Cost and gradient at the same point share one evaluation. The lowest
/// loss evaluated so far is kept in `best` with its point.
struct ImageProblem<'a> {
    objective: &'a dyn Objective,
    shape: Ix4,
    block: usize,
    log: IterationLog,
    last: RefCell<Option<(Vec<f64>, f64, Vec<f64>)>>,
    best: &'a RefCell<Option<(f64, Vec<f64>)>>,
}

impl ImageProblem<'_> {
    fn evaluate(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        if let Some((at, loss, grad)) = self.last.borrow().as_ref() {
            if at.as_slice() == x {
                return Ok((*loss, grad.clone()));
            }
        }

        let candidate = unflatten(x, self.shape)?;
        let eval = evaluate_finite(self.objective, &candidate, self.block, self.log.len())?;
        let grad = flatten(&eval.gradient);

        let mut best = self.best.borrow_mut();
        if best.as_ref().is_none_or(|(loss, _)| eval.loss < *loss) {
            *best = Some((eval.loss, x.to_vec()));
        }

        *self.last.borrow_mut() = Some((x.to_vec(), eval.loss, grad.clone()));
        Ok((eval.loss, grad))
    }
}

impl CostFunction for ImageProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        Ok(self.evaluate(x)?.0)
    }
}

impl Gradient for ImageProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        Ok(self.evaluate(x)?.1)
    }
}

fn flatten(tensor: &ImageTensor) -> Vec<f64> {
    tensor.iter().map(|&v| f64::from(v)).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn unflatten(x: &[f64], shape: Ix4) -> Result<ImageTensor> {
    Ok(ImageTensor::from_shape_vec(
        shape,
        x.iter().map(|&v| v as f32).collect(),
    )?)
}
