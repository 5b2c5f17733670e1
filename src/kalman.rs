use nalgebra::{ComplexField, DMatrix, DVector};

use crate::error::{Result, SarimaxError};
use crate::initialization::KalmanInit;
use crate::state_space::StateSpace;

/// Output of one filter pass.
#[derive(Debug, Clone)]
pub struct KalmanOutput<T> {
    /// Total log-likelihood over the post-burn observations.
    pub loglike: T,
    /// Filter scale: the concentrated variance estimate, or one when the
    /// variance is parameterized inside the system matrices.
    pub scale: T,
    /// Per-observation log-likelihood contributions (zero before the burn
    /// point and where the innovation variance degenerates).
    pub loglikelihoods: Vec<T>,
    /// Innovation sequence v_t.
    pub innovations: Vec<T>,
    /// Innovation variances F_t.
    pub innovation_variances: Vec<T>,
    /// Effective number of observations (n - burn).
    pub n_obs_effective: usize,
    /// Predicted state a_{n+1|n}, the forecasting anchor.
    pub final_state: DVector<T>,
    /// Predicted state covariance P_{n+1|n}.
    pub final_state_cov: DMatrix<T>,
}

/// Univariate Kalman filter log-likelihood.
///
///   - Innovation: v_t = y_t - Z_t' * a_{t|t-1} - d_t
///   - Variance:   F_t = Z_t' * P_{t|t-1} * Z_t + H
///   - Update (Joseph form): P_{t|t} = (I - K Z') P (I - K Z')' + K H K'
///   - Predict: a_{t+1|t} = T * a_{t|t} + c_t,  P_{t+1|t} = T P T' + R Q R'
///
/// Under a concentrated scale:
///   sigma2_hat = (1/n_eff) * sum(v_t^2 / F_t)
///   loglike = -n_eff/2 (ln 2pi + ln sigma2_hat + 1) - 1/2 sum(ln F_t)
///
/// All products are plain (non-conjugating), so an imaginary perturbation of
/// the parameters propagates the derivative of the likelihood.
pub fn kalman_loglike<T: ComplexField<RealField = f64> + Copy>(
    endog: &[f64],
    ss: &StateSpace<T>,
    init: &KalmanInit<T>,
    concentrate_scale: bool,
) -> Result<KalmanOutput<T>> {
    let n = endog.len();
    let k = ss.k_states;
    let burn = init.loglikelihood_burn;

    if n <= burn {
        return Err(SarimaxError::DataError(format!(
            "not enough observations: n={} <= burn={}",
            n, burn
        )));
    }

    let n_eff = n - burn;
    let n_eff_t = T::from_real(n_eff as f64);
    let half = T::from_real(0.5);
    let ln_2pi = T::from_real((2.0 * std::f64::consts::PI).ln());

    let mut a = init.initial_state.clone();
    let mut p = init.initial_state_cov.clone();

    let t_mat = &ss.transition;
    let h = ss.obs_cov;

    // R*Q*R' is time-invariant
    let rqr = &ss.selection * &ss.state_cov * ss.selection.transpose();

    let mut sum_log_f = T::zero();
    let mut sum_v2_f = T::zero();
    let mut innovations = Vec::with_capacity(n);
    let mut innovation_variances = Vec::with_capacity(n);

    let eye = DMatrix::<T>::identity(k, k);
    let time_varying = ss.time_varying_design();
    let static_z = ss.design.clone();

    for t in 0..n {
        let z = if time_varying {
            ss.design_row(t)
        } else {
            static_z.clone()
        };

        // v_t = y_t - Z' a_{t|t-1} - d_t
        let d_t = ss.obs_intercept[t];
        let mut za = T::zero();
        for i in 0..k {
            za += z[i] * a[i];
        }
        let v_t = T::from_real(endog[t]) - za - d_t;
        innovations.push(v_t);

        // F_t = Z' P Z + H
        let p_z = &p * &z;
        let mut f_t = h;
        for i in 0..k {
            f_t += z[i] * p_z[i];
        }
        innovation_variances.push(f_t);

        if f_t.real() > 0.0 {
            let k_gain = &p_z / f_t;

            let a_updated = &a + &k_gain * v_t;

            // Joseph form keeps P symmetric positive semidefinite
            let k_z_t = &k_gain * z.transpose();
            let i_kz = &eye - &k_z_t;
            let mut p_updated = &i_kz * &p * i_kz.transpose();
            if h.real() > 0.0 {
                p_updated += &k_gain * k_gain.transpose() * h;
            }

            a = t_mat * &a_updated;
            p = t_mat * &p_updated * t_mat.transpose() + &rqr;

            if t >= burn {
                sum_log_f += f_t.ln();
                sum_v2_f += v_t * v_t / f_t;
            }
        } else {
            // degenerate innovation variance: no update, predict only
            a = t_mat * &a;
            p = t_mat * &p * t_mat.transpose() + &rqr;
        }

        for i in 0..k {
            a[i] += ss.state_intercept[t * k + i];
        }
    }

    let (loglike, scale) = if concentrate_scale {
        let mut sigma2_hat = sum_v2_f / n_eff_t;
        if sigma2_hat.real() < 1e-300 {
            sigma2_hat = T::from_real(1e-300);
        }
        let ll = -half * n_eff_t * (ln_2pi + sigma2_hat.ln() + T::one()) - half * sum_log_f;
        (ll, sigma2_hat)
    } else {
        // variances are parameterized inside the system matrices, so the
        // filter scale is unity
        let ll = -half * n_eff_t * ln_2pi - half * sum_log_f - half * sum_v2_f;
        (ll, T::one())
    };

    // Per-observation decomposition, after the concentrated scale is known.
    let mut loglikelihoods = vec![T::zero(); n];
    for t in burn..n {
        let f_t = innovation_variances[t];
        if f_t.real() > 0.0 {
            let v_t = innovations[t];
            loglikelihoods[t] = if concentrate_scale {
                -half * (ln_2pi + scale.ln() + f_t.ln() + v_t * v_t / (f_t * scale))
            } else {
                -half * (ln_2pi + f_t.ln() + v_t * v_t / f_t)
            };
        }
    }

    Ok(KalmanOutput {
        loglike,
        scale,
        loglikelihoods,
        innovations,
        innovation_variances,
        n_obs_effective: n_eff,
        final_state: a,
        final_state_cov: p,
    })
}
