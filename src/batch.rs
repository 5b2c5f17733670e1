//! Rayon-based parallel batch processing for multiple time series.
//!
//! Batch versions of loglike, fit, and forecast that process N series on
//! Rayon's work-stealing thread pool. Errors are reported per series so one
//! bad input never poisons the rest of the batch.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::Result;
use crate::forecast::ForecastResult;
use crate::model::Sarimax;
use crate::types::{FitMethod, FitOptions, FitResult, SarimaxConfig};

fn exog_for(exog_list: Option<&[DMatrix<f64>]>, i: usize) -> Option<DMatrix<f64>> {
    exog_list.map(|el| el[i].clone())
}

/// Evaluate the log-likelihood for multiple series in parallel.
///
/// All series share the same configuration and constrained parameter vector.
/// `exog_list[i]`, when given, is the regressor matrix for `series[i]`.
pub fn batch_loglike(
    series: &[Vec<f64>],
    config: &SarimaxConfig,
    params: &[f64],
    exog_list: Option<&[DMatrix<f64>]>,
) -> Vec<Result<f64>> {
    series
        .par_iter()
        .enumerate()
        .map(|(i, endog)| {
            let model = Sarimax::new(endog.clone(), exog_for(exog_list, i), config.clone())?;
            model.loglike(params)
        })
        .collect()
}

/// Fit the same model specification to multiple series in parallel.
///
/// Each series is fit independently with its own starting values.
pub fn batch_fit(
    series: &[Vec<f64>],
    config: &SarimaxConfig,
    method: Option<FitMethod>,
    maxiter: Option<u64>,
    exog_list: Option<&[DMatrix<f64>]>,
) -> Vec<Result<FitResult>> {
    series
        .par_iter()
        .enumerate()
        .map(|(i, endog)| {
            let model = Sarimax::new(endog.clone(), exog_for(exog_list, i), config.clone())?;
            let options = FitOptions {
                method: method.unwrap_or(FitMethod::Lbfgs),
                maxiter: maxiter.unwrap_or(FitOptions::default().maxiter),
                ..FitOptions::default()
            };
            model.fit(options)
        })
        .collect()
}

/// Forecast multiple series in parallel.
///
/// `params_list[i]` is the constrained parameter vector for `series[i]`,
/// typically the output of [`batch_fit`]. `future_exog_list[i]` carries the
/// out-of-sample regressor rows for series i.
#[allow(clippy::too_many_arguments)]
pub fn batch_forecast(
    series: &[Vec<f64>],
    config: &SarimaxConfig,
    params_list: &[Vec<f64>],
    steps: usize,
    alpha: f64,
    exog_list: Option<&[DMatrix<f64>]>,
    future_exog_list: Option<&[DMatrix<f64>]>,
) -> Vec<Result<ForecastResult>> {
    series
        .par_iter()
        .zip(params_list.par_iter())
        .enumerate()
        .map(|(i, (endog, params))| {
            let model = Sarimax::new(endog.clone(), exog_for(exog_list, i), config.clone())?;
            let future = future_exog_list.map(|el| &el[i]);
            model.forecast(params, steps, alpha, future)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SarimaxOrder, Trend};

    fn lcg_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    fn ar1_series(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let e = lcg_noise(n, seed);
        let mut y = vec![0.0; n];
        for t in 1..n {
            y[t] = phi * y[t - 1] + e[t];
        }
        y
    }

    fn ar1_config() -> SarimaxConfig {
        let mut cfg = SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::None);
        cfg.concentrate_scale = true;
        cfg
    }

    #[test]
    fn test_batch_fit_matches_direct() {
        let data = ar1_series(200, 0.5, 42);
        let config = ar1_config();

        let batch = batch_fit(&[data.clone()], &config, None, None, None);
        assert_eq!(batch.len(), 1);
        let batch_result = batch[0].as_ref().unwrap();

        let model = Sarimax::new(data, None, config).unwrap();
        let direct = model.fit(FitOptions::default()).unwrap();

        assert!((batch_result.loglike - direct.loglike).abs() < 1e-10);
        for (a, b) in batch_result.params.iter().zip(direct.params.iter()) {
            assert!((a - b).abs() < 1e-10, "param mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_batch_fit_multiple_series() {
        let config = ar1_config();
        let series: Vec<Vec<f64>> = (0..8).map(|i| ar1_series(200, 0.5, 100 + i)).collect();
        let results = batch_fit(&series, &config, Some(FitMethod::Lbfgs), Some(100), None);

        assert_eq!(results.len(), 8);
        for (i, r) in results.iter().enumerate() {
            let res = r.as_ref().unwrap();
            assert!(res.converged, "series {} should converge", i);
            assert!(res.loglike.is_finite(), "series {} loglike not finite", i);
            assert!(
                (res.params[0] - 0.5).abs() < 0.2,
                "series {} estimate {} far from 0.5",
                i,
                res.params[0]
            );
        }
    }

    #[test]
    fn test_batch_loglike_matches_single() {
        let data = ar1_series(150, 0.6, 7);
        let config = ar1_config();

        let model = Sarimax::new(data.clone(), None, config.clone()).unwrap();
        let direct = model.loglike(&[0.6]).unwrap();

        let series = vec![data.clone(), data];
        let batch = batch_loglike(&series, &config, &[0.6], None);
        assert_eq!(batch.len(), 2);
        for r in &batch {
            assert!((r.as_ref().unwrap() - direct).abs() < 1e-12);
        }
    }

    #[test]
    fn test_batch_forecast_matches_single() {
        let data = ar1_series(150, 0.6, 11);
        let config = ar1_config();

        let model = Sarimax::new(data.clone(), None, config.clone()).unwrap();
        let direct = model.forecast(&[0.6], 5, 0.05, None).unwrap();

        let series = vec![data.clone(), data];
        let params_list = vec![vec![0.6], vec![0.6]];
        let batch = batch_forecast(&series, &config, &params_list, 5, 0.05, None, None);

        assert_eq!(batch.len(), 2);
        for r in &batch {
            let fc = r.as_ref().unwrap();
            for (a, b) in fc.mean.iter().zip(direct.mean.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_batch_empty() {
        let config = ar1_config();
        let empty: Vec<Vec<f64>> = vec![];
        assert!(batch_fit(&empty, &config, None, None, None).is_empty());
    }

    #[test]
    fn test_batch_error_isolation() {
        let config = ar1_config();
        let series = vec![ar1_series(200, 0.5, 3), vec![]];
        let results = batch_fit(&series, &config, None, None, None);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok(), "good series should succeed");
        assert!(results[1].is_err(), "empty series should fail");
    }
}
