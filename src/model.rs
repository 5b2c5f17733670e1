//! Model facade tying data, configuration and estimation together.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::{Result, SarimaxError};
use crate::forecast::{self, ForecastResult, ResidualOutput};
use crate::initialization::Initialization;
use crate::kalman::{kalman_loglike, KalmanOutput};
use crate::optimizer;
use crate::params::SarimaxParams;
use crate::polynomial;
use crate::score;
use crate::start_params::{self, compute_start_params};
use crate::state_space::StateSpace;
use crate::types::{FitOptions, FitResult, SarimaxConfig};

/// Imaginary step for the constrained-space derivatives.
const CS_STEP: f64 = 1e-9;
/// Relative real step for the constrained-space Hessian, f64::EPSILON^(1/4).
const CS_HESSIAN_STEP: f64 = 1.1920929e-4;

/// A SARIMAX model bound to a data set.
///
/// Under `simple_differencing` the series (and any regressors) are
/// differenced once here, the sample shrinks by d + s*D observations, and
/// everything downstream, forecasts included, refers to the differenced
/// series.
pub struct Sarimax {
    config: SarimaxConfig,
    endog: Vec<f64>,
    exog: Option<DMatrix<f64>>,
    trend_offset: usize,
}

impl Sarimax {
    pub fn new(endog: Vec<f64>, exog: Option<DMatrix<f64>>, config: SarimaxConfig) -> Result<Self> {
        Self::with_trend_offset(endog, exog, config, 0)
    }

    /// `trend_offset` shifts the time index of the trend regressors, for
    /// models refit on a window of a longer series.
    pub fn with_trend_offset(
        mut endog: Vec<f64>,
        mut exog: Option<DMatrix<f64>>,
        config: SarimaxConfig,
        trend_offset: usize,
    ) -> Result<Self> {
        let config = config.validated()?;

        if endog.iter().any(|v| !v.is_finite()) {
            return Err(SarimaxError::DataError(
                "endog contains non-finite values".into(),
            ));
        }
        match (&exog, config.k_exog) {
            (Some(x), k) => {
                if x.ncols() != k {
                    return Err(SarimaxError::DataError(format!(
                        "exog has {} columns but the configuration declares {}",
                        x.ncols(),
                        k
                    )));
                }
                if x.nrows() != endog.len() {
                    return Err(SarimaxError::DataError(format!(
                        "exog has {} rows for {} observations",
                        x.nrows(),
                        endog.len()
                    )));
                }
                if x.iter().any(|v| !v.is_finite()) {
                    return Err(SarimaxError::DataError(
                        "exog contains non-finite values".into(),
                    ));
                }
            }
            (None, k) if k > 0 => {
                return Err(SarimaxError::DataError(format!(
                    "configuration declares {k} exog columns but no exog was given"
                )));
            }
            _ => {}
        }

        if config.simple_differencing {
            let orig = endog.len();
            let tmp =
                start_params::seasonal_difference(&endog, config.order.seasonal_d, config.order.s);
            endog = start_params::difference(&tmp, config.order.d);
            if endog.is_empty() {
                return Err(SarimaxError::DataError(
                    "no observations left after simple differencing".into(),
                ));
            }
            let lost = orig - endog.len();
            exog = exog.map(|x| x.rows(lost, endog.len()).into_owned());
        }

        Ok(Sarimax {
            config,
            endog,
            exog,
            trend_offset,
        })
    }

    /// Fix the initial state distribution instead of deriving it from the
    /// configuration flags. Applies to every subsequent filter pass,
    /// including the ones inside `fit`.
    pub fn with_initialization(mut self, initialization: Initialization) -> Self {
        self.config.initialization = Some(initialization);
        self
    }

    pub fn config(&self) -> &SarimaxConfig {
        &self.config
    }

    /// Number of observations the filter runs over (after any simple
    /// differencing).
    pub fn nobs(&self) -> usize {
        self.endog.len()
    }

    pub fn endog(&self) -> &[f64] {
        &self.endog
    }

    pub fn param_names(&self) -> Vec<String> {
        let mut names = self.config.param_names(None);
        names.truncate(self.config.k_params_estimated());
        names
    }

    /// Roots of the reduced autoregressive polynomial at a constrained
    /// parameter vector; all outside the unit circle for a stationary
    /// process.
    pub fn arroots(&self, params: &[f64]) -> Result<Vec<Complex64>> {
        let sp = SarimaxParams::from_flat(params, &self.config)?;
        Ok(polynomial::polynomial_roots(&polynomial::reduced_ar(
            &sp,
            &self.config.order,
        )))
    }

    /// Roots of the reduced moving average polynomial; all outside the unit
    /// circle for an invertible process.
    pub fn maroots(&self, params: &[f64]) -> Result<Vec<Complex64>> {
        let sp = SarimaxParams::from_flat(params, &self.config)?;
        Ok(polynomial::polynomial_roots(&polynomial::reduced_ma(
            &sp,
            &self.config.order,
        )))
    }

    /// Conditional sum of squares starting values.
    pub fn start_params(&self) -> Result<Vec<f64>> {
        compute_start_params(&self.endog, self.exog.as_ref(), &self.config)
    }

    /// Log-likelihood at a constrained parameter vector.
    pub fn loglike(&self, params: &[f64]) -> Result<f64> {
        score::loglike_constrained(
            &self.endog,
            self.exog.as_ref(),
            &self.config,
            self.trend_offset,
            params,
        )
    }

    /// Per-observation average of the log-likelihood, the scale the
    /// optimizer works on.
    pub fn loglike_average(&self, params: &[f64]) -> Result<f64> {
        Ok(self.loglike(params)? / self.endog.len() as f64)
    }

    /// Score vector at a constrained parameter vector.
    pub fn score(&self, params: &[f64]) -> Result<Vec<f64>> {
        let base: Vec<Complex64> = params.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let mut grad = vec![0.0; params.len()];
        for i in 0..params.len() {
            let mut x = base.clone();
            x[i].im = CS_STEP;
            let ll = score::loglike_constrained(
                &self.endog,
                self.exog.as_ref(),
                &self.config,
                self.trend_offset,
                &x,
            )?;
            grad[i] = ll.im / CS_STEP;
        }
        Ok(grad)
    }

    /// Hessian of the log-likelihood at a constrained parameter vector,
    /// by mixed complex and central steps.
    pub fn hessian(&self, params: &[f64]) -> Result<DMatrix<f64>> {
        let k = params.len();
        let steps: Vec<f64> = params
            .iter()
            .map(|&v| CS_HESSIAN_STEP * v.abs().max(0.1))
            .collect();
        let base: Vec<Complex64> = params.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let mut hess = DMatrix::zeros(k, k);
        for i in 0..k {
            for j in i..k {
                let mut plus = base.clone();
                plus[i].im = steps[i];
                plus[j].re += steps[j];
                let mut minus = base.clone();
                minus[i].im = steps[i];
                minus[j].re -= steps[j];
                let f_plus = score::loglike_constrained(
                    &self.endog,
                    self.exog.as_ref(),
                    &self.config,
                    self.trend_offset,
                    &plus,
                )?;
                let f_minus = score::loglike_constrained(
                    &self.endog,
                    self.exog.as_ref(),
                    &self.config,
                    self.trend_offset,
                    &minus,
                )?;
                let h = (f_plus.im - f_minus.im) / (2.0 * steps[i] * steps[j]);
                hess[(i, j)] = h;
                hess[(j, i)] = h;
            }
        }
        Ok(hess)
    }

    /// Run the Kalman filter at a constrained parameter vector.
    pub fn filter(&self, params: &[f64]) -> Result<KalmanOutput<f64>> {
        let sp = SarimaxParams::from_flat(params, &self.config)?;
        let ss = StateSpace::new(
            &self.config,
            &sp,
            self.endog.len(),
            self.exog.as_ref(),
            self.trend_offset,
        )?;
        let init = Initialization::from_config(&self.config).initialize(&self.config, &ss)?;
        kalman_loglike(&self.endog, &ss, &init, self.config.concentrate_scale)
    }

    /// Maximum likelihood fit.
    pub fn fit(&self, options: FitOptions) -> Result<FitResult> {
        optimizer::fit(
            &self.endog,
            self.exog.as_ref(),
            &self.config,
            self.trend_offset,
            options,
        )
    }

    /// Out-of-sample forecast at a constrained parameter vector.
    pub fn forecast(
        &self,
        params: &[f64],
        steps: usize,
        alpha: f64,
        future_exog: Option<&DMatrix<f64>>,
    ) -> Result<ForecastResult> {
        let sp = SarimaxParams::from_flat(params, &self.config)?;
        let filter = self.filter(params)?;
        forecast::forecast(
            &self.config,
            &sp,
            &filter,
            steps,
            alpha,
            self.exog.as_ref(),
            future_exog,
            self.trend_offset,
        )
    }

    /// One-step-ahead in-sample predictions.
    pub fn predict(&self, params: &[f64]) -> Result<Vec<f64>> {
        let filter = self.filter(params)?;
        Ok(forecast::in_sample_prediction(&self.endog, &filter))
    }

    /// One-step-ahead residual diagnostics.
    pub fn residuals(&self, params: &[f64]) -> Result<ResidualOutput> {
        let filter = self.filter(params)?;
        Ok(forecast::residuals(&filter))
    }
}
