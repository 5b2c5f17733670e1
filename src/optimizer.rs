//! Maximum likelihood estimation.
//!
//! The objective handed to the solvers is the negative average
//! log-likelihood over the unconstrained parameter space, so every iterate
//! maps to a valid (stationary, invertible, positive-variance) model. L-BFGS
//! uses the complex-step gradient; Nelder-Mead needs no derivatives and
//! serves as the fallback when a line search fails.

use std::cell::RefCell;
use std::rc::Rc;

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DMatrix;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use crate::error::{Result, SarimaxError};
use crate::initialization::Initialization;
use crate::kalman::kalman_loglike;
use crate::params::{transform_params, untransform_params, SarimaxParams};
use crate::score;
use crate::start_params::compute_start_params;
use crate::state_space::StateSpace;
use crate::types::{FitMethod, FitOptions, FitResult, SarimaxConfig};

/// Cost reported for parameter points where the filter cannot be evaluated.
const PENALTY: f64 = f64::MAX / 2.0;

type Callback = Rc<RefCell<Option<Box<dyn FnMut(&[f64])>>>>;

#[derive(Clone)]
struct Objective {
    endog: Vec<f64>,
    exog: Option<DMatrix<f64>>,
    config: SarimaxConfig,
    trend_offset: usize,
    callback: Callback,
}

impl Objective {
    /// Negative average log-likelihood plus the constrained point it was
    /// evaluated at.
    fn eval(&self, unconstrained: &[f64]) -> Result<(f64, Vec<f64>)> {
        let constrained = transform_params(unconstrained, &self.config)?;
        let ll = score::loglike_constrained(
            &self.endog,
            self.exog.as_ref(),
            &self.config,
            self.trend_offset,
            &constrained,
        )?;
        if !ll.is_finite() {
            return Err(SarimaxError::DataError("non-finite log-likelihood".into()));
        }
        Ok((-ll / self.endog.len() as f64, constrained))
    }
}

impl CostFunction for Objective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        match self.eval(param) {
            Ok((cost, constrained)) => {
                if let Some(cb) = self.callback.borrow_mut().as_mut() {
                    cb(&constrained);
                }
                Ok(cost)
            }
            Err(_) => Ok(PENALTY),
        }
    }
}

impl Gradient for Objective {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Vec<f64>) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        let n = self.endog.len() as f64;
        if let Ok(g) = score::score(
            &self.endog,
            self.exog.as_ref(),
            &self.config,
            self.trend_offset,
            param,
        ) {
            if g.iter().all(|v| v.is_finite()) {
                return Ok(g.iter().map(|&v| -v / n).collect());
            }
        }

        // The complex step fails outside the feasible region; fall back to
        // forward differences on the penalized cost so the line search can
        // still back out.
        let eps = f64::EPSILON.sqrt();
        let f0 = self.cost(param)?;
        let mut work = param.clone();
        let mut grad = vec![0.0; param.len()];
        for i in 0..param.len() {
            let orig = work[i];
            work[i] = orig + eps;
            let f_plus = self.cost(&work)?;
            work[i] = orig;
            grad[i] = (f_plus - f0) / eps;
            if !grad[i].is_finite() {
                grad[i] = 0.0;
            }
        }
        Ok(grad)
    }
}

struct RunOutcome {
    best: Vec<f64>,
    cost: f64,
    n_iter: u64,
    converged: bool,
    message: String,
    method: &'static str,
}

fn summarize<I>(state: &I, method: &'static str) -> Result<RunOutcome>
where
    I: State<Param = Vec<f64>, Float = f64>,
{
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| SarimaxError::OptimizationFailed("no best parameter found".into()))?;
    let reason = state.get_termination_reason();
    let converged = matches!(
        reason,
        Some(TerminationReason::SolverConverged) | Some(TerminationReason::TargetCostReached)
    );
    let message = match reason {
        Some(r) => r.to_string(),
        None => "terminated without a recorded reason".to_string(),
    };
    Ok(RunOutcome {
        best,
        cost: state.get_best_cost(),
        n_iter: state.get_iter(),
        converged,
        message,
        method,
    })
}

fn run_lbfgs(objective: Objective, x0: Vec<f64>, maxiter: u64) -> Result<RunOutcome> {
    let linesearch = MoreThuenteLineSearch::new();
    let solver = LBFGS::new(linesearch, 10)
        .with_tolerance_grad(1e-5)
        .map_err(|e| SarimaxError::OptimizationFailed(e.to_string()))?
        .with_tolerance_cost(1e-9)
        .map_err(|e| SarimaxError::OptimizationFailed(e.to_string()))?;

    let result = Executor::new(objective, solver)
        .configure(
            |state: argmin::core::IterState<Vec<f64>, Vec<f64>, (), (), (), f64>| {
                state.param(x0).max_iters(maxiter)
            },
        )
        .run()
        .map_err(|e| SarimaxError::OptimizationFailed(format!("L-BFGS failed: {e}")))?;

    summarize(result.state(), "lbfgs")
}

fn run_nelder_mead(objective: Objective, x0: Vec<f64>, maxiter: u64) -> Result<RunOutcome> {
    let n = x0.len();
    let mut simplex = vec![x0.clone()];
    for i in 0..n {
        let mut vertex = x0.clone();
        vertex[i] += if vertex[i].abs() > 1e-8 {
            vertex[i] * 0.05
        } else {
            0.00025
        };
        simplex.push(vertex);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-6)
        .map_err(|e| SarimaxError::OptimizationFailed(e.to_string()))?;

    let result = Executor::new(objective, solver)
        .configure(|state: argmin::core::IterState<Vec<f64>, (), (), (), (), f64>| {
            state.max_iters(maxiter)
        })
        .run()
        .map_err(|e| SarimaxError::OptimizationFailed(format!("Nelder-Mead failed: {e}")))?;

    summarize(result.state(), "nelder-mead")
}

/// Fit the model by maximum likelihood.
///
/// Starting values come from `options.start_params` (constrained space) or
/// the conditional sum of squares estimates. The optimum is reported in
/// constrained space together with delta-method standard errors, unless
/// `options.return_params` skips the inference step.
pub fn fit(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    options: FitOptions,
) -> Result<FitResult> {
    let k_est = config.k_params_estimated();
    let min_obs = k_est.max(config.k_states() + 1);
    if endog.len() <= min_obs {
        return Err(SarimaxError::DataError(format!(
            "not enough observations: {} <= minimum {} for this order",
            endog.len(),
            min_obs
        )));
    }

    let constrained_start = match options.start_params {
        Some(sp) => {
            if sp.len() != k_est {
                return Err(SarimaxError::ParamLengthMismatch {
                    expected: k_est,
                    got: sp.len(),
                });
            }
            sp
        }
        None => compute_start_params(endog, exog, config)?,
    };

    let objective = Objective {
        endog: endog.to_vec(),
        exog: exog.cloned(),
        config: config.clone(),
        trend_offset,
        callback: Rc::new(RefCell::new(options.callback)),
    };

    let x0 = untransform_params(&constrained_start, config)?;
    let mut outcome = if k_est == 0 || options.maxiter == 0 {
        RunOutcome {
            best: x0,
            cost: f64::NAN,
            n_iter: 0,
            converged: k_est == 0,
            message: if k_est == 0 {
                "no parameters to estimate".to_string()
            } else {
                "maximum iterations set to zero; returning starting values".to_string()
            },
            method: options.method.name(),
        }
    } else {
        match options.method {
            FitMethod::Lbfgs => match run_lbfgs(objective.clone(), x0.clone(), options.maxiter) {
                Ok(o) => o,
                Err(e) => {
                    warn!("L-BFGS failed ({e}), retrying with Nelder-Mead");
                    run_nelder_mead(objective.clone(), x0, options.maxiter)?
                }
            },
            FitMethod::NelderMead => run_nelder_mead(objective.clone(), x0, options.maxiter)?,
        }
    };

    if options.refine && k_est > 0 && options.maxiter > 0 {
        match run_lbfgs(objective.clone(), outcome.best.clone(), options.maxiter) {
            Ok(refined) if refined.cost < outcome.cost => {
                debug!(
                    improvement = outcome.cost - refined.cost,
                    "refinement pass improved the objective"
                );
                outcome.n_iter += refined.n_iter;
                outcome.best = refined.best;
                outcome.cost = refined.cost;
                outcome.converged = refined.converged;
                outcome.message = refined.message;
            }
            Ok(refined) => outcome.n_iter += refined.n_iter,
            Err(e) => warn!("refinement pass failed: {e}"),
        }
    }

    if !outcome.converged && k_est > 0 {
        warn!(
            method = outcome.method,
            n_iter = outcome.n_iter,
            message = %outcome.message,
            "optimizer did not converge"
        );
    }

    // Final filter pass at the optimum
    let params = transform_params(&outcome.best, config)?;
    let sp = SarimaxParams::from_flat(&params, config)?;
    let ss = StateSpace::new(config, &sp, endog.len(), exog, trend_offset)?;
    let init = Initialization::from_config(config).initialize(config, &ss)?;
    let output = kalman_loglike(endog, &ss, &init, config.concentrate_scale)?;

    let k = config.k_params() as f64;
    let n = endog.len() as f64;
    let loglike = output.loglike;
    let aic = -2.0 * loglike + 2.0 * k;
    let bic = -2.0 * loglike + k * n.ln();
    let hqic = -2.0 * loglike + 2.0 * k * n.ln().ln();

    let mut param_names = config.param_names(None);
    param_names.truncate(params.len());

    let (cov_params, bse, zvalues, pvalues) = if options.return_params || k_est == 0 {
        (DMatrix::zeros(0, 0), vec![], vec![], vec![])
    } else {
        inference(endog, exog, config, trend_offset, &outcome.best, &params)?
    };

    Ok(FitResult {
        params,
        param_names,
        loglike,
        scale: output.scale,
        nobs: endog.len(),
        k_params: config.k_params(),
        aic,
        bic,
        hqic,
        cov_params,
        bse,
        zvalues,
        pvalues,
        n_iter: outcome.n_iter,
        converged: outcome.converged,
        message: outcome.message,
        method: outcome.method,
    })
}

/// Delta-method covariance, standard errors, z statistics and two-sided
/// p-values at the optimum.
fn inference(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    unconstrained: &[f64],
    constrained: &[f64],
) -> Result<(DMatrix<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    let k = constrained.len();
    let cov = match score::cov_params(endog, exog, config, trend_offset, unconstrained) {
        Ok(c) => c,
        Err(e) => {
            warn!("covariance computation failed: {e}");
            DMatrix::from_element(k, k, f64::NAN)
        }
    };

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SarimaxError::OptimizationFailed(e.to_string()))?;
    let mut bse = Vec::with_capacity(k);
    let mut zvalues = Vec::with_capacity(k);
    let mut pvalues = Vec::with_capacity(k);
    for i in 0..k {
        let var = cov[(i, i)];
        let se = if var > 0.0 { var.sqrt() } else { f64::NAN };
        let z = constrained[i] / se;
        bse.push(se);
        zvalues.push(z);
        pvalues.push(2.0 * (1.0 - normal.cdf(z.abs())));
    }
    Ok((cov, bse, zvalues, pvalues))
}
