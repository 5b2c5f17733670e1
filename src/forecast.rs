//! Out-of-sample forecasting and residual diagnostics.
//!
//! Forecasts propagate the final predicted state through the transition
//! equation. The system matrices for the forecast horizon come from a state
//! space built over n + steps periods, so trend terms and exogenous
//! regressors continue past the sample with the right time indices.

use nalgebra::DMatrix;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::warn;

use crate::error::{Result, SarimaxError};
use crate::kalman::KalmanOutput;
use crate::params::SarimaxParams;
use crate::state_space::StateSpace;
use crate::types::SarimaxConfig;

/// H-step ahead forecast.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    /// Forecast means E[y_{n+h}] for h = 1..steps.
    pub mean: Vec<f64>,
    /// Forecast variances Var[y_{n+h}].
    pub variance: Vec<f64>,
    pub ci_lower: Vec<f64>,
    pub ci_upper: Vec<f64>,
}

/// One-step-ahead residual diagnostics.
#[derive(Debug, Clone)]
pub struct ResidualOutput {
    /// Raw innovations v_t.
    pub residuals: Vec<f64>,
    /// Standardized residuals v_t / sqrt(F_t * scale).
    pub standardized_residuals: Vec<f64>,
}

/// Forecast `steps` periods ahead from the final filtered state.
///
/// `exog` is the in-sample regressor matrix the filter ran with; future
/// regressor values must be supplied through `future_exog` whenever the
/// model has a regression component.
#[allow(clippy::too_many_arguments)]
pub fn forecast(
    config: &SarimaxConfig,
    params: &SarimaxParams<f64>,
    filter: &KalmanOutput<f64>,
    steps: usize,
    alpha: f64,
    exog: Option<&DMatrix<f64>>,
    future_exog: Option<&DMatrix<f64>>,
    trend_offset: usize,
) -> Result<ForecastResult> {
    if !(0.0..1.0).contains(&alpha) || alpha <= 0.0 {
        return Err(SarimaxError::InvalidConfig(format!(
            "confidence level alpha must be in (0, 1), got {alpha}"
        )));
    }
    if steps == 0 {
        return Ok(ForecastResult {
            mean: vec![],
            variance: vec![],
            ci_lower: vec![],
            ci_upper: vec![],
        });
    }

    let n = filter.innovations.len();
    let k_exog = config.k_exog;

    let combined_exog = if k_exog > 0 {
        let hist = exog.ok_or(SarimaxError::MissingForecastExog)?;
        let fut = future_exog.ok_or(SarimaxError::MissingForecastExog)?;
        if fut.nrows() < steps || fut.ncols() != k_exog {
            return Err(SarimaxError::DataError(format!(
                "future exog has shape ({}, {}), expected ({}, {})",
                fut.nrows(),
                fut.ncols(),
                steps,
                k_exog
            )));
        }
        Some(DMatrix::from_fn(n + steps, k_exog, |r, c| {
            if r < n {
                hist[(r, c)]
            } else {
                fut[(r - n, c)]
            }
        }))
    } else {
        if future_exog.is_some() {
            warn!("future exog values supplied to a model without regressors; ignored");
        }
        None
    };

    // System matrices extended over the forecast horizon
    let ss = StateSpace::new(config, params, n + steps, combined_exog.as_ref(), trend_offset)?;
    let k = ss.k_states;

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SarimaxError::StateSpaceError(e.to_string()))?;
    let z_alpha = normal.inverse_cdf(1.0 - alpha / 2.0);

    let rqr = if ss.k_posdef > 0 {
        &ss.selection * &ss.state_cov * ss.selection.transpose()
    } else {
        DMatrix::zeros(k, k)
    };
    let scale = filter.scale;

    let mut a = filter.final_state.clone();
    let mut p = filter.final_state_cov.clone();

    let mut mean = Vec::with_capacity(steps);
    let mut variance = Vec::with_capacity(steps);
    let mut ci_lower = Vec::with_capacity(steps);
    let mut ci_upper = Vec::with_capacity(steps);

    for h in 0..steps {
        let t = n + h;
        let z = ss.design_row(t);
        let d = ss.obs_intercept.get(t).copied().unwrap_or(0.0);

        let y_hat = z.dot(&a) + d;
        let p_z = &p * &z;
        let f = (z.dot(&p_z) + ss.obs_cov) * scale;
        let f_safe = f.max(0.0);
        let se = f_safe.sqrt();

        mean.push(y_hat);
        variance.push(f_safe);
        ci_lower.push(y_hat - z_alpha * se);
        ci_upper.push(y_hat + z_alpha * se);

        a = &ss.transition * a;
        if !ss.state_intercept.is_empty() {
            for r in 0..k {
                a[r] += ss.state_intercept[t * k + r];
            }
        }
        p = &ss.transition * p * ss.transition.transpose() + &rqr;
    }

    Ok(ForecastResult {
        mean,
        variance,
        ci_lower,
        ci_upper,
    })
}

/// One-step-ahead in-sample predictions, y_t - v_t.
pub fn in_sample_prediction(endog: &[f64], filter: &KalmanOutput<f64>) -> Vec<f64> {
    endog
        .iter()
        .zip(filter.innovations.iter())
        .map(|(&y, &v)| y - v)
        .collect()
}

/// Residuals and standardized residuals from a filter pass.
pub fn residuals(filter: &KalmanOutput<f64>) -> ResidualOutput {
    let scale = filter.scale;
    let standardized = filter
        .innovations
        .iter()
        .zip(filter.innovation_variances.iter())
        .map(|(&v, &f)| {
            if f * scale > 0.0 {
                v / (f * scale).sqrt()
            } else {
                0.0
            }
        })
        .collect();

    ResidualOutput {
        residuals: filter.innovations.clone(),
        standardized_residuals: standardized,
    }
}
