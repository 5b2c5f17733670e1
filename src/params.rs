use crate::error::{Result, SarimaxError};
use crate::types::SarimaxConfig;
use nalgebra::ComplexField;

/// Unpacked SARIMAX parameters, generic over the scalar field so the same
/// segmentation serves both the real filter and the complex-step
/// differentiation path.
///
/// Flat vector layout:
/// `[trend | exog (mle_regression) | ar | ma | seasonal_ar | seasonal_ma |
///   measurement_var? | sigma2?]`
///
/// When `concentrate_scale=true`, sigma2 is omitted from the estimation
/// vector but is still counted toward the information criteria.
#[derive(Debug, Clone)]
pub struct SarimaxParams<T> {
    pub trend_coeffs: Vec<T>,
    pub exog_coeffs: Vec<T>,
    pub ar_coeffs: Vec<T>,
    pub ma_coeffs: Vec<T>,
    pub sar_coeffs: Vec<T>,
    pub sma_coeffs: Vec<T>,
    pub measurement_var: Option<T>,
    pub sigma2: Option<T>,
}

impl<T: ComplexField<RealField = f64> + Copy> SarimaxParams<T> {
    /// Unpack a flat parameter vector into structured segments.
    pub fn from_flat(flat: &[T], config: &SarimaxConfig) -> Result<Self> {
        let kt = config.k_trend();
        let k_exog = if config.mle_regression { config.k_exog } else { 0 };
        let p = config.order.ar.n_params();
        let q = config.order.ma.n_params();
        let pp = config.order.seasonal_ar.n_params();
        let qq = config.order.seasonal_ma.n_params();

        let expected = config.k_params_estimated();
        if flat.len() != expected {
            return Err(SarimaxError::ParamLengthMismatch {
                expected,
                got: flat.len(),
            });
        }

        let mut i = 0;
        let trend_coeffs = flat[i..i + kt].to_vec();
        i += kt;
        let exog_coeffs = flat[i..i + k_exog].to_vec();
        i += k_exog;
        let ar_coeffs = flat[i..i + p].to_vec();
        i += p;
        let ma_coeffs = flat[i..i + q].to_vec();
        i += q;
        let sar_coeffs = flat[i..i + pp].to_vec();
        i += pp;
        let sma_coeffs = flat[i..i + qq].to_vec();
        i += qq;
        let measurement_var = if config.measurement_error {
            let v = flat[i];
            i += 1;
            Some(v)
        } else {
            None
        };
        let sigma2 = if config.state_error() && !config.concentrate_scale {
            Some(flat[i])
        } else {
            None
        };

        Ok(Self {
            trend_coeffs,
            exog_coeffs,
            ar_coeffs,
            ma_coeffs,
            sar_coeffs,
            sma_coeffs,
            measurement_var,
            sigma2,
        })
    }

    /// Pack structured segments back into a flat vector.
    pub fn to_flat(&self) -> Vec<T> {
        let mut v = Vec::new();
        v.extend(&self.trend_coeffs);
        v.extend(&self.exog_coeffs);
        v.extend(&self.ar_coeffs);
        v.extend(&self.ma_coeffs);
        v.extend(&self.sar_coeffs);
        v.extend(&self.sma_coeffs);
        if let Some(m) = self.measurement_var {
            v.push(m);
        }
        if let Some(s) = self.sigma2 {
            v.push(s);
        }
        v
    }
}

// ---------------------------------------------------------------------------
// Monahan (1984) / Jones (1980) parameter transformations
// ---------------------------------------------------------------------------

/// Transform unconstrained parameters to stationary AR coefficients.
///
/// 1. Map each x[k] to a partial autocorrelation via `r[k] = x[k] / sqrt(1 + x[k]^2)`
/// 2. Apply the Levinson-Durbin recursion to get AR coefficients
/// 3. Negate the final row
///
/// All operations are analytic, so a complex perturbation in the input
/// carries the derivative through.
pub fn constrain_stationary<T: ComplexField + Copy>(unconstrained: &[T]) -> Vec<T> {
    let n = unconstrained.len();
    if n == 0 {
        return vec![];
    }

    let pacf: Vec<T> = unconstrained
        .iter()
        .map(|&x| x / (T::one() + x * x).sqrt())
        .collect();

    let mut y = vec![vec![T::zero(); n]; n];
    for k in 0..n {
        for i in 0..k {
            y[k][i] = y[k - 1][i] + pacf[k] * y[k - 1][k - i - 1];
        }
        y[k][k] = pacf[k];
    }

    y[n - 1].iter().map(|&v| -v).collect()
}

/// Inverse transform: stationary AR coefficients → unconstrained parameters.
/// Only ever evaluated at real points (starting values), so it stays on f64.
pub fn unconstrain_stationary(constrained: &[f64]) -> Vec<f64> {
    let n = constrained.len();
    if n == 0 {
        return vec![];
    }

    let mut y = vec![vec![0.0; n]; n];
    for i in 0..n {
        y[n - 1][i] = -constrained[i];
    }

    // Reverse Levinson-Durbin
    for k in (1..n).rev() {
        let rk = y[k][k];
        let denom = (1.0 - rk * rk).max(1e-15);
        for i in 0..k {
            y[k - 1][i] = (y[k][i] - rk * y[k][k - i - 1]) / denom;
        }
    }

    (0..n)
        .map(|k| {
            let r = y[k][k];
            r / (1.0 - r * r).max(1e-15).sqrt()
        })
        .collect()
}

/// Transform unconstrained parameters to invertible MA coefficients.
/// Same as the stationary transform with a sign flip.
pub fn constrain_invertible<T: ComplexField + Copy>(unconstrained: &[T]) -> Vec<T> {
    constrain_stationary(unconstrained)
        .iter()
        .map(|&x| -x)
        .collect()
}

/// Inverse: invertible MA coefficients → unconstrained parameters.
pub fn unconstrain_invertible(constrained: &[f64]) -> Vec<f64> {
    let negated: Vec<f64> = constrained.iter().map(|&x| -x).collect();
    unconstrain_stationary(&negated)
}

/// Constrain a variance: unconstrained → nonnegative (x^2).
pub fn constrain_variance<T: ComplexField + Copy>(x: T) -> T {
    x * x
}

/// Unconstrain a variance: positive → unconstrained (sqrt).
pub fn unconstrain_variance(s: f64) -> Result<f64> {
    if s <= 0.0 {
        return Err(SarimaxError::DataError(format!(
            "variance must be positive, got {}",
            s
        )));
    }
    Ok(s.sqrt())
}

/// Check that an AR/MA coefficient set lies inside the stationary region by
/// mapping it back to partial autocorrelations.
pub fn is_stationary(coeffs: &[f64]) -> bool {
    let n = coeffs.len();
    if n == 0 {
        return true;
    }
    let mut y = vec![vec![0.0; n]; n];
    for i in 0..n {
        y[n - 1][i] = -coeffs[i];
    }
    for k in (0..n).rev() {
        let rk = y[k][k];
        if rk.abs() >= 1.0 || !rk.is_finite() {
            return false;
        }
        if k > 0 {
            let denom = 1.0 - rk * rk;
            for i in 0..k {
                y[k - 1][i] = (y[k][i] - rk * y[k][k - i - 1]) / denom;
            }
        }
    }
    true
}

/// `is_stationary` for MA coefficients (invertibility of 1 + θ(L)).
pub fn is_invertible(coeffs: &[f64]) -> bool {
    let negated: Vec<f64> = coeffs.iter().map(|&x| -x).collect();
    is_stationary(&negated)
}

// ---------------------------------------------------------------------------
// Segment-wise transforms over the full estimation vector
// ---------------------------------------------------------------------------

/// Map an unconstrained estimation vector into model space, segment by
/// segment: AR/MA blocks through the stationarity/invertibility transform
/// when enforced (identity otherwise), variances through squaring, trend and
/// regression coefficients untouched.
pub fn transform_params<T: ComplexField<RealField = f64> + Copy>(
    unconstrained: &[T],
    config: &SarimaxConfig,
) -> Result<Vec<T>> {
    let p = SarimaxParams::from_flat(unconstrained, config)?;

    let ar_coeffs = if config.enforce_stationarity {
        constrain_stationary(&p.ar_coeffs)
    } else {
        p.ar_coeffs
    };
    let ma_coeffs = if config.enforce_invertibility {
        constrain_invertible(&p.ma_coeffs)
    } else {
        p.ma_coeffs
    };
    let sar_coeffs = if config.enforce_stationarity {
        constrain_stationary(&p.sar_coeffs)
    } else {
        p.sar_coeffs
    };
    let sma_coeffs = if config.enforce_invertibility {
        constrain_invertible(&p.sma_coeffs)
    } else {
        p.sma_coeffs
    };

    let constrained = SarimaxParams {
        ar_coeffs,
        ma_coeffs,
        sar_coeffs,
        sma_coeffs,
        measurement_var: p.measurement_var.map(constrain_variance),
        sigma2: p.sigma2.map(constrain_variance),
        ..p
    };
    Ok(constrained.to_flat())
}

/// Inverse of [`transform_params`]; fails if a variance entry is not
/// positive.
pub fn untransform_params(constrained: &[f64], config: &SarimaxConfig) -> Result<Vec<f64>> {
    let p = SarimaxParams::from_flat(constrained, config)?;

    let ar_coeffs = if config.enforce_stationarity {
        unconstrain_stationary(&p.ar_coeffs)
    } else {
        p.ar_coeffs
    };
    let ma_coeffs = if config.enforce_invertibility {
        unconstrain_invertible(&p.ma_coeffs)
    } else {
        p.ma_coeffs
    };
    let sar_coeffs = if config.enforce_stationarity {
        unconstrain_stationary(&p.sar_coeffs)
    } else {
        p.sar_coeffs
    };
    let sma_coeffs = if config.enforce_invertibility {
        unconstrain_invertible(&p.sma_coeffs)
    } else {
        p.sma_coeffs
    };

    let unconstrained = SarimaxParams {
        ar_coeffs,
        ma_coeffs,
        sar_coeffs,
        sma_coeffs,
        measurement_var: match p.measurement_var {
            Some(m) => Some(unconstrain_variance(m)?),
            None => None,
        },
        sigma2: match p.sigma2 {
            Some(s) => Some(unconstrain_variance(s)?),
            None => None,
        },
        ..p
    };
    Ok(unconstrained.to_flat())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
