//! Derivatives of the log-likelihood via complex-step differentiation.
//!
//! The filter, the parameter transform and the state space construction are
//! all generic over the scalar type, so evaluating them at x + ih·e_i gives
//! the exact directional derivative Im f(x + ih·e_i)/h with no subtractive
//! cancellation. The Hessian combines a complex step in one coordinate with
//! a central real step in the other.

use nalgebra::{ComplexField, DMatrix};
use num_complex::Complex64;

use crate::error::{Result, SarimaxError};
use crate::initialization::Initialization;
use crate::kalman::kalman_loglike;
use crate::params::{transform_params, SarimaxParams};
use crate::state_space::StateSpace;
use crate::types::SarimaxConfig;

/// Imaginary step for first derivatives.
const SCORE_STEP: f64 = 1e-9;

/// Relative real step for the Hessian, EPS^(1/4).
const HESSIAN_STEP: f64 = 1.1920929e-4;

/// Log-likelihood at a constrained parameter point, at any scalar type.
pub(crate) fn loglike_constrained<T>(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    constrained: &[T],
) -> Result<T>
where
    T: ComplexField<RealField = f64> + Copy,
{
    let params = SarimaxParams::from_flat(constrained, config)?;
    let ss = StateSpace::new(config, &params, endog.len(), exog, trend_offset)?;
    let init = Initialization::from_config(config).initialize(config, &ss)?;
    let out = kalman_loglike(endog, &ss, &init, config.concentrate_scale)?;
    Ok(out.loglike)
}

fn loglike_at_complex(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    unconstrained: &[Complex64],
) -> Result<Complex64> {
    let constrained = transform_params(unconstrained, config)?;
    loglike_constrained(endog, exog, config, trend_offset, &constrained)
}

/// Gradient of the log-likelihood with respect to the unconstrained
/// parameters.
pub fn score(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    unconstrained: &[f64],
) -> Result<Vec<f64>> {
    let n = unconstrained.len();
    let base: Vec<Complex64> = unconstrained
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    let mut grad = vec![0.0; n];
    for i in 0..n {
        let mut x = base.clone();
        x[i].im = SCORE_STEP;
        let ll = loglike_at_complex(endog, exog, config, trend_offset, &x)?;
        grad[i] = ll.im / SCORE_STEP;
    }
    Ok(grad)
}

/// Hessian of the log-likelihood with respect to the unconstrained
/// parameters.
///
/// Entry (i, j) uses an imaginary step in coordinate i and central real
/// steps in coordinate j, which keeps the complex-step accuracy in one
/// direction while only the real direction carries truncation error.
pub fn hessian(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    unconstrained: &[f64],
) -> Result<DMatrix<f64>> {
    let n = unconstrained.len();
    let steps: Vec<f64> = unconstrained
        .iter()
        .map(|&v| HESSIAN_STEP * v.abs().max(0.1))
        .collect();
    let base: Vec<Complex64> = unconstrained
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();

    let mut hess = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let mut x_plus = base.clone();
            x_plus[i].im = steps[i];
            x_plus[j].re += steps[j];
            let mut x_minus = base.clone();
            x_minus[i].im = steps[i];
            x_minus[j].re -= steps[j];

            let f_plus = loglike_at_complex(endog, exog, config, trend_offset, &x_plus)?;
            let f_minus = loglike_at_complex(endog, exog, config, trend_offset, &x_minus)?;
            let val = (f_plus.im - f_minus.im) / (2.0 * steps[i] * steps[j]);
            hess[(i, j)] = val;
            hess[(j, i)] = val;
        }
    }
    Ok(hess)
}

/// Jacobian of the constrained parameters with respect to the unconstrained
/// ones, J[i][j] = d constrained_i / d unconstrained_j.
pub fn transform_jacobian(unconstrained: &[f64], config: &SarimaxConfig) -> Result<DMatrix<f64>> {
    let n = unconstrained.len();
    let base: Vec<Complex64> = unconstrained
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    let mut jac = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut x = base.clone();
        x[j].im = SCORE_STEP;
        let constrained = transform_params(&x, config)?;
        for (i, c) in constrained.iter().enumerate() {
            jac[(i, j)] = c.im / SCORE_STEP;
        }
    }
    Ok(jac)
}

/// Covariance of the constrained parameter estimates by the delta method:
/// J (-H)^{-1} J' with H the unconstrained Hessian at the optimum.
pub fn cov_params(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
    trend_offset: usize,
    unconstrained: &[f64],
) -> Result<DMatrix<f64>> {
    let h = hessian(endog, exog, config, trend_offset, unconstrained)?;
    let jac = transform_jacobian(unconstrained, config)?;
    let neg_h = -h;
    let inv = neg_h.lu().try_inverse().ok_or_else(|| {
        SarimaxError::DataError("observed information matrix is singular".into())
    })?;
    Ok(&jac * inv * jac.transpose())
}
