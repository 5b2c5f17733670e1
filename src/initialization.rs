use nalgebra::{ComplexField, DMatrix, DVector};

use crate::error::{Result, SarimaxError};
use crate::state_space::StateSpace;
use crate::types::SarimaxConfig;

/// Initialization policy for the initial state distribution.
#[derive(Debug, Clone)]
pub enum Initialization {
    /// User-supplied initial state and covariance; suppresses the automatic
    /// re-initialization at each parameter update.
    Known {
        state: DVector<f64>,
        cov: DMatrix<f64>,
    },
    /// a_0 = 0, P_0 = kappa·I over all states.
    ApproximateDiffuse { kappa: f64 },
    /// Diffuse (kappa·I) over the differencing and regression states,
    /// stationary covariance from the discrete Lyapunov equation over the
    /// ARMA block.
    Mixed { kappa: f64 },
}

/// Resolved initial conditions for one filter pass.
pub struct KalmanInit<T> {
    pub initial_state: DVector<T>,
    pub initial_state_cov: DMatrix<T>,
    pub loglikelihood_burn: usize,
}

impl Initialization {
    /// Policy for a configuration: a user-supplied override when present,
    /// otherwise mixed diffuse/stationary under `enforce_stationarity` and
    /// purely approximate diffuse without it.
    pub fn from_config(config: &SarimaxConfig) -> Self {
        if let Some(init) = &config.initialization {
            return init.clone();
        }
        let kappa = Self::default_kappa(config);
        if config.enforce_stationarity {
            Initialization::Mixed { kappa }
        } else {
            Initialization::ApproximateDiffuse { kappa }
        }
    }

    /// 1e6, bumped to 1e10 when diffuse regression states are in play.
    pub fn default_kappa(config: &SarimaxConfig) -> f64 {
        if config.state_regression() {
            1e10
        } else {
            1e6
        }
    }

    /// Resolve the policy against a built representation.
    pub fn initialize<T: ComplexField<RealField = f64> + Copy>(
        &self,
        config: &SarimaxConfig,
        ss: &StateSpace<T>,
    ) -> Result<KalmanInit<T>> {
        let k_states = config.k_states();
        match self {
            Initialization::Known { state, cov } => {
                if state.len() != k_states || cov.nrows() != k_states || cov.ncols() != k_states {
                    return Err(SarimaxError::InitializationFailed(format!(
                        "known initialization has dimension {} but the model has {} states",
                        state.len(),
                        k_states
                    )));
                }
                Ok(KalmanInit {
                    initial_state: state.map(T::from_real),
                    initial_state_cov: cov.map(T::from_real),
                    loglikelihood_burn: 0,
                })
            }
            Initialization::ApproximateDiffuse { kappa } => Ok(KalmanInit {
                initial_state: DVector::zeros(k_states),
                initial_state_cov: DMatrix::identity(k_states, k_states)
                    * T::from_real(*kappa),
                loglikelihood_burn: k_states,
            }),
            Initialization::Mixed { kappa } => {
                let mut cov =
                    DMatrix::identity(k_states, k_states) * T::from_real(*kappa);

                let start = config.k_states_diff();
                let ko = config.k_order();
                if ko > 0 {
                    let t_block = ss.transition.view((start, start), (ko, ko)).into_owned();
                    let rqr = &ss.selection * &ss.state_cov * ss.selection.transpose();
                    let q_block = rqr.view((start, start), (ko, ko)).into_owned();
                    let p_block = solve_discrete_lyapunov(&t_block, &q_block)?;
                    cov.view_mut((start, start), (ko, ko)).copy_from(&p_block);
                }

                Ok(KalmanInit {
                    initial_state: DVector::zeros(k_states),
                    initial_state_cov: cov,
                    loglikelihood_burn: config.k_diffuse_states(),
                })
            }
        }
    }
}

/// Solve P = A P Aᵗ + Q by the doubling iteration:
/// P_{k+1} = P_k + A_k P_k A_kᵗ, A_{k+1} = A_k A_k.
///
/// Converges when the spectral radius of A is below one; fails otherwise.
pub fn solve_discrete_lyapunov<T: ComplexField<RealField = f64> + Copy>(
    a: &DMatrix<T>,
    q: &DMatrix<T>,
) -> Result<DMatrix<T>> {
    const MAX_ITER: usize = 100;
    const TOL: f64 = 1e-12;

    let mut p = q.clone();
    let mut ak = a.clone();
    for _ in 0..MAX_ITER {
        let delta = &ak * &p * ak.transpose();
        let change = delta.norm();
        p += delta;
        if change <= TOL * p.norm().max(1.0) {
            return Ok(p);
        }
        ak = &ak * &ak;
        if !ak.iter().all(|x| x.norm1().is_finite()) {
            break;
        }
    }
    Err(SarimaxError::InitializationFailed(
        "discrete Lyapunov iteration did not converge; \
         the transition matrix is not stable"
            .into(),
    ))
}
