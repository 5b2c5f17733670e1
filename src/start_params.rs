//! Starting values for the optimizer via conditional sum of squares.
//!
//! The series is differenced first, any regression component is removed by
//! ordinary least squares, and the ARMA coefficients come from a combined
//! least squares fit in which lagged proxy residuals stand in for the
//! unobserved MA disturbances.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SarimaxError};
use crate::params::{is_invertible, is_stationary};
use crate::polynomial::expand_lags;
use crate::types::{LagSpec, SarimaxConfig};

/// Apply d-th order regular differencing.
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut out = data.to_vec();
    for _ in 0..d {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Apply D-th order seasonal differencing with period s.
pub fn seasonal_difference(data: &[f64], dd: usize, s: usize) -> Vec<f64> {
    if s == 0 {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    for _ in 0..dd {
        if out.len() <= s {
            return vec![];
        }
        out = (s..out.len()).map(|t| out[t] - out[t - s]).collect();
    }
    out
}

/// Lag matrix: row t (for t in maxlag..n), column j holds data[t - j - 1].
fn lagmat(data: &[f64], maxlag: usize) -> DMatrix<f64> {
    let n = data.len();
    if n < maxlag {
        return DMatrix::zeros(0, maxlag);
    }
    DMatrix::from_fn(n - maxlag, maxlag, |t, j| data[maxlag + t - j - 1])
}

/// Least squares via SVD.
fn lstsq(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    if x.nrows() < x.ncols() {
        return Err(SarimaxError::DataError(format!(
            "too few observations for least squares: {} rows, {} columns",
            x.nrows(),
            x.ncols()
        )));
    }
    x.clone()
        .svd(true, true)
        .solve(y, 1e-12)
        .map_err(|e| SarimaxError::DataError(format!("least squares failed: {e}")))
}

/// Conditional sum of squares estimates for one ARMA component.
///
/// When MA terms are present, an AR(2 k_ma) proxy regression first produces
/// residuals standing in for the unobserved disturbances; a single combined
/// fit of trend + AR lags + MA (residual) lags then yields the starting
/// values. Returns (trend, ar, ma, residual variance).
fn conditional_sum_squares(
    endog: &[f64],
    ar_lags: &[usize],
    ma_lags: &[usize],
    trend_data: Option<&DMatrix<f64>>,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Option<f64>)> {
    let k_ar = ar_lags.iter().copied().max().unwrap_or(0);
    let k_ma = ma_lags.iter().copied().max().unwrap_or(0);
    let k_trend = trend_data.map_or(0, |t| t.ncols());
    let n = endog.len();

    if k_ar + k_ma + k_trend == 0 {
        return Ok((vec![], vec![], vec![], None));
    }

    let k = 2 * k_ma;
    let r = (k + k_ma).max(k_ar);
    if n <= r + ar_lags.len() + ma_lags.len() + k_trend {
        return Err(SarimaxError::DataError(format!(
            "too few observations ({n}) for conditional sum of squares starting values"
        )));
    }

    // Proxy residuals from a long autoregression
    let residuals = if k_ma > 0 {
        let x = lagmat(endog, k);
        let y = DVector::from_iterator(n - k, endog[k..].iter().copied());
        let beta = lstsq(&x, &y)?;
        Some(y - x * beta)
    } else {
        None
    };

    let rows = n - r;
    let n_cols = k_trend + ar_lags.len() + ma_lags.len();
    let mut x = DMatrix::zeros(rows, n_cols);
    let mut col = 0;
    if let Some(td) = trend_data {
        for j in 0..k_trend {
            for t in 0..rows {
                x[(t, col)] = td[(t, j)];
            }
            col += 1;
        }
    }
    for &lag in ar_lags {
        for t in 0..rows {
            x[(t, col)] = endog[r + t - lag];
        }
        col += 1;
    }
    if let Some(resid) = &residuals {
        // residuals start at time k, so row t is observation r + t
        for &lag in ma_lags {
            for t in 0..rows {
                x[(t, col)] = resid[(r - k) + t - lag];
            }
            col += 1;
        }
    }

    let y = DVector::from_iterator(rows, endog[r..].iter().copied());
    let beta = lstsq(&x, &y)?;
    let fit_resid = &y - &x * &beta;

    let trend = beta.as_slice()[..k_trend].to_vec();
    let ar = beta.as_slice()[k_trend..k_trend + ar_lags.len()].to_vec();
    let ma = beta.as_slice()[k_trend + ar_lags.len()..].to_vec();

    let skip = ma_lags.len().min(fit_resid.len());
    let tail = &fit_resid.as_slice()[skip..];
    let variance = if tail.is_empty() {
        None
    } else {
        Some(tail.iter().map(|e| e * e).sum::<f64>() / tail.len() as f64)
    };

    Ok((trend, ar, ma, variance))
}

fn included_lags(spec: &LagSpec, multiplier: usize) -> Vec<usize> {
    spec.inclusion()
        .iter()
        .enumerate()
        .filter(|(_, &inc)| inc)
        .map(|(i, _)| (i + 1) * multiplier)
        .collect()
}

fn sample_variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 1.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / data.len() as f64
}

/// Starting values for the constrained parameter vector, in estimation order.
///
/// Fails fast when the conditional sum of squares estimates violate an
/// enforced stationarity or invertibility constraint.
pub fn compute_start_params(
    endog: &[f64],
    exog: Option<&DMatrix<f64>>,
    config: &SarimaxConfig,
) -> Result<Vec<f64>> {
    // Difference away the integrated part, unless the data already arrived
    // differenced.
    let mut y = if config.simple_differencing {
        endog.to_vec()
    } else {
        let tmp = seasonal_difference(endog, config.order.seasonal_d, config.order.s);
        difference(&tmp, config.order.d)
    };
    if y.is_empty() {
        return Err(SarimaxError::DataError(
            "no observations left after differencing".into(),
        ));
    }

    // Regression coefficients by OLS; remove the fit from the data so the
    // ARMA component sees the residual series.
    let mut exog_params = vec![];
    if let Some(x) = exog {
        let lost = endog.len() - y.len();
        let x_trim = x.rows(lost, y.len()).into_owned();
        let yv = DVector::from_iterator(y.len(), y.iter().copied());
        let beta = lstsq(&x_trim, &yv)?;
        let fitted = &x_trim * &beta;
        for t in 0..y.len() {
            y[t] -= fitted[t];
        }
        if config.mle_regression {
            exog_params = beta.as_slice().to_vec();
        }
    }

    let ar_lags = included_lags(&config.order.ar, 1);
    let ma_lags = included_lags(&config.order.ma, 1);
    let trend_data = if config.k_trend() > 0 {
        Some(config.trend.trend_data(y.len(), 0))
    } else {
        None
    };

    let (trend_params, ar_params, ma_params, variance) =
        conditional_sum_squares(&y, &ar_lags, &ma_lags, trend_data.as_ref())?;

    if !ar_params.is_empty() && config.enforce_stationarity {
        let full = expand_lags(&ar_params, &config.order.ar);
        if !is_stationary(&full) {
            return Err(SarimaxError::NonStationaryAR);
        }
    }
    if !ma_params.is_empty() && config.enforce_invertibility {
        let full = expand_lags(&ma_params, &config.order.ma);
        if !is_invertible(&full) {
            return Err(SarimaxError::NonInvertibleMA);
        }
    }

    // Seasonal component: same data, lags at multiples of the period
    let sar_lags = included_lags(&config.order.seasonal_ar, config.order.s);
    let sma_lags = included_lags(&config.order.seasonal_ma, config.order.s);
    let (_, sar_params, sma_params, seasonal_variance) =
        conditional_sum_squares(&y, &sar_lags, &sma_lags, None)?;

    if !sar_params.is_empty() && config.enforce_stationarity {
        let full = expand_lags(&sar_params, &config.order.seasonal_ar);
        if !is_stationary(&full) {
            return Err(SarimaxError::NonStationaryAR);
        }
    }
    if !sma_params.is_empty() && config.enforce_invertibility {
        let full = expand_lags(&sma_params, &config.order.seasonal_ma);
        if !is_invertible(&full) {
            return Err(SarimaxError::NonInvertibleMA);
        }
    }

    let sigma2 = seasonal_variance
        .or(variance)
        .unwrap_or_else(|| sample_variance(&y))
        .max(1e-10);

    let mut params = Vec::with_capacity(config.k_params_estimated());
    params.extend(trend_params);
    params.extend(exog_params);
    params.extend(ar_params);
    params.extend(ma_params);
    params.extend(sar_params);
    params.extend(sma_params);
    if config.measurement_error {
        params.push(1.0);
    }
    if config.state_error() && !config.concentrate_scale {
        params.push(sigma2);
    }

    debug_assert_eq!(params.len(), config.k_params_estimated());
    Ok(params)
}
