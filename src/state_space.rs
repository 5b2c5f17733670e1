use nalgebra::{ComplexField, DMatrix, DVector};

use crate::error::{Result, SarimaxError};
use crate::params::SarimaxParams;
use crate::polynomial::{reduced_ar, reduced_ma};
use crate::types::SarimaxConfig;

/// State space representation for SARIMAX.
///
/// State equation:  alpha_{t+1} = T * alpha_t + c_t + R * eta_t
/// Observation:     y_t          = Z_t' * alpha_t + d_t + eps_t
///
/// where eta_t ~ N(0, Q) and eps_t ~ N(0, H). The default layout is the
/// Harvey representation (differencing states leading, MA coefficients in
/// the selection matrix); the Hamilton representation transposes the ARMA
/// companion block and moves the MA coefficients into the design.
///
/// Everything is generic over the scalar field so that complex-step
/// differentiation reuses the one construction path.
pub struct StateSpace<T> {
    pub k_states: usize,
    pub k_states_diff: usize,
    pub k_posdef: usize,
    pub transition: DMatrix<T>, // T: k_states × k_states
    pub design: DVector<T>,     // static part of Z (single observation row)
    /// Time-varying tail of the design row: exog values filling the last
    /// k_exog state slots under state regression.
    pub exog_design: Option<DMatrix<T>>,
    pub selection: DMatrix<T>, // R: k_states × k_posdef
    pub state_cov: DMatrix<T>, // Q: k_posdef × k_posdef
    pub obs_cov: T,            // H: measurement error variance
    pub obs_intercept: Vec<T>, // d_t per time step
    pub state_intercept: Vec<T>, // c_t, flat [c_0[0..k], c_1[0..k], ...]
}

impl<T: ComplexField<RealField = f64> + Copy> StateSpace<T> {
    /// Construct the representation for `nobs` observations. `exog` is the
    /// (already aligned) regressor matrix, `trend_offset` shifts the time
    /// index of the deterministic trend.
    pub fn new(
        config: &SarimaxConfig,
        params: &SarimaxParams<T>,
        nobs: usize,
        exog: Option<&DMatrix<f64>>,
        trend_offset: usize,
    ) -> Result<Self> {
        let k_states = config.k_states();
        let k_states_diff = config.k_states_diff();
        let k_posdef = config.k_posdef();

        if let Some(x) = exog {
            if x.nrows() != nobs || x.ncols() != config.k_exog {
                return Err(SarimaxError::DataError(format!(
                    "exog has shape {}×{} but expected {}×{}",
                    x.nrows(),
                    x.ncols(),
                    nobs,
                    config.k_exog
                )));
            }
        } else if config.k_exog > 0 {
            return Err(SarimaxError::DataError(format!(
                "model has {} exogenous regressors but no exog data was given",
                config.k_exog
            )));
        }

        let red_ar = reduced_ar(params, &config.order);
        let red_ma = reduced_ma(params, &config.order);

        let transition = Self::build_transition(config, &red_ar);
        let design = Self::build_design(config, &red_ma);
        let selection = Self::build_selection(config, &red_ma);
        let state_cov = Self::build_state_cov(config, params);
        let obs_cov = params.measurement_var.unwrap_or_else(T::zero);

        let exog_design = if config.state_regression() {
            exog.map(|x| x.map(T::from_real))
        } else {
            None
        };

        let obs_intercept =
            Self::build_obs_intercept(config, params, nobs, exog, trend_offset, &red_ar);
        let state_intercept =
            Self::build_state_intercept(config, params, nobs, k_states, trend_offset);

        Ok(Self {
            k_states,
            k_states_diff,
            k_posdef,
            transition,
            design,
            exog_design,
            selection,
            state_cov,
            obs_cov,
            obs_intercept,
            state_intercept,
        })
    }

    /// Full design row for observation t.
    pub fn design_row(&self, t: usize) -> DVector<T> {
        let mut z = self.design.clone();
        if let Some(x) = &self.exog_design {
            let k_exog = x.ncols();
            let start = self.k_states - k_exog;
            for j in 0..k_exog {
                z[start + j] = x[(t, j)];
            }
        }
        z
    }

    pub fn time_varying_design(&self) -> bool {
        self.exog_design.is_some()
    }

    /// Build the transition matrix.
    ///
    /// Harvey layout:
    /// 1. Regular differencing block [0..d, 0..d]: upper triangular ones
    /// 2. Seasonal differencing: per-layer s×s cyclic shift blocks
    /// 3. Each differencing row → last state of every later seasonal layer
    /// 4. Differencing rows → first ARMA state
    /// 5. ARMA companion (reduced AR in the first column; first row and
    ///    subdiagonal under the Hamilton representation)
    /// 6. State regression: identity block on the trailing exog states
    fn build_transition(config: &SarimaxConfig, red_ar: &[T]) -> DMatrix<T> {
        let k_states = config.k_states();
        let d = config.k_diff();
        let dd = config.k_seasonal_diff();
        let s = config.order.s;
        let sd = config.k_states_diff();
        let ko = config.k_order();

        let mut t = DMatrix::<T>::zeros(k_states, k_states);
        let one = T::one();

        // 1. Regular differencing block: upper triangular ones
        for i in 0..d {
            for j in i..d {
                t[(i, j)] = one;
            }
        }

        // 2. Seasonal differencing: cyclic shift blocks
        for layer in 0..dd {
            let base = d + layer * s;
            // wrap: first row of block ← last column of block
            t[(base, base + s - 1)] = one;
            for i in 0..(s - 1) {
                t[(base + i + 1, base + i)] = one;
            }
            // first row of this layer ← last state of every later layer
            for later in (layer + 1)..dd {
                t[(base, d + (later + 1) * s - 1)] = one;
            }
        }

        // 3. Regular differencing rows ← last state of each seasonal layer
        for layer in 0..dd {
            let last = d + (layer + 1) * s - 1;
            for i in 0..d {
                t[(i, last)] = one;
            }
        }

        if ko > 0 {
            // 4. Differencing rows ← first ARMA state
            for i in 0..d {
                t[(i, sd)] = one;
            }
            for layer in 0..dd {
                t[(d + layer * s, sd)] = one;
            }

            // 5. ARMA companion block
            for i in 0..ko {
                let idx = i + 1;
                if idx < red_ar.len() {
                    let phi = -red_ar[idx];
                    if config.hamilton_representation {
                        t[(sd, sd + i)] = phi;
                    } else {
                        t[(sd + i, sd)] = phi;
                    }
                }
            }
            for i in 0..(ko - 1) {
                if config.hamilton_representation {
                    t[(sd + i + 1, sd + i)] = one;
                } else {
                    t[(sd + i, sd + i + 1)] = one;
                }
            }
        }

        // 6. State regression: exog states carry themselves forward
        if config.state_regression() {
            let start = k_states - config.k_exog;
            for i in start..k_states {
                t[(i, i)] = one;
            }
        }

        t
    }

    /// Build the static part of the design row.
    ///
    /// Ones at the regular differencing states, at the last state of each
    /// seasonal layer, and at the first ARMA state. The Hamilton layout also
    /// carries the reduced MA coefficients here. Exog slots stay zero; they
    /// are filled per observation from `exog_design`.
    fn build_design(config: &SarimaxConfig, red_ma: &[T]) -> DVector<T> {
        let k_states = config.k_states();
        let d = config.k_diff();
        let dd = config.k_seasonal_diff();
        let s = config.order.s;
        let sd = config.k_states_diff();
        let ko = config.k_order();

        let mut z = DVector::<T>::zeros(k_states);
        let one = T::one();

        for i in 0..d {
            z[i] = one;
        }
        for layer in 0..dd {
            z[d + (layer + 1) * s - 1] = one;
        }
        if ko > 0 {
            z[sd] = one;
            if config.hamilton_representation {
                for i in 1..ko {
                    if i < red_ma.len() {
                        z[sd + i] = red_ma[i];
                    }
                }
            }
        }

        z
    }

    /// Build the selection matrix (k_states × k_posdef).
    ///
    /// Harvey: unit entry at the first ARMA state followed by the reduced MA
    /// coefficients. Hamilton: unit entry only (the MA part lives in the
    /// design).
    fn build_selection(config: &SarimaxConfig, red_ma: &[T]) -> DMatrix<T> {
        let k_states = config.k_states();
        let k_posdef = config.k_posdef();
        let sd = config.k_states_diff();
        let ko = config.k_order();

        let mut r = DMatrix::<T>::zeros(k_states, k_posdef);
        if k_posdef == 0 {
            return r;
        }

        r[(sd, 0)] = T::one();
        if !config.hamilton_representation {
            for i in 1..ko {
                if i < red_ma.len() {
                    r[(sd + i, 0)] = red_ma[i];
                }
            }
        }
        r
    }

    /// Q = [[1]] when the scale is concentrated out, [[sigma2]] otherwise.
    fn build_state_cov(config: &SarimaxConfig, params: &SarimaxParams<T>) -> DMatrix<T> {
        let k_posdef = config.k_posdef();
        if k_posdef == 0 {
            return DMatrix::zeros(0, 0);
        }
        let sigma2 = if config.concentrate_scale {
            T::one()
        } else {
            params.sigma2.unwrap_or_else(T::one)
        };
        DMatrix::from_element(1, 1, sigma2)
    }

    /// Observation intercept d_t: the MLE-regression contribution exog_t·β,
    /// plus the trend under the Hamilton layout (rescaled from an intercept
    /// to a process mean) or when there is no ARMA state to inject it into.
    fn build_obs_intercept(
        config: &SarimaxConfig,
        params: &SarimaxParams<T>,
        nobs: usize,
        exog: Option<&DMatrix<f64>>,
        trend_offset: usize,
        red_ar: &[T],
    ) -> Vec<T> {
        let mut d = vec![T::zero(); nobs];

        if config.mle_regression && !params.exog_coeffs.is_empty() {
            if let Some(x) = exog {
                for t in 0..nobs {
                    let mut acc = T::zero();
                    for (j, &b) in params.exog_coeffs.iter().enumerate() {
                        acc += T::from_real(x[(t, j)]) * b;
                    }
                    d[t] = acc;
                }
            }
        }

        let trend_in_obs = config.hamilton_representation || config.k_order() == 0;
        if trend_in_obs && !params.trend_coeffs.is_empty() {
            let trend_data = config.trend.trend_data(nobs, trend_offset);
            let scale = if config.hamilton_representation && config.order.k_ar() > 0 {
                // Hamilton: the parameter is the process mean, so the
                // intercept is c / (1 - sum(phi)), the sum of the reduced
                // AR polynomial.
                let mut sum = T::zero();
                for &c in red_ar {
                    sum += c;
                }
                sum
            } else {
                T::one()
            };
            for t in 0..nobs {
                let mut val = T::zero();
                for (j, &c) in params.trend_coeffs.iter().enumerate() {
                    val += T::from_real(trend_data[(t, j)]) * c;
                }
                d[t] += val / scale;
            }
        }

        d
    }

    /// State intercept c_t: the trend enters the first ARMA state under the
    /// Harvey layout.
    fn build_state_intercept(
        config: &SarimaxConfig,
        params: &SarimaxParams<T>,
        nobs: usize,
        k_states: usize,
        trend_offset: usize,
    ) -> Vec<T> {
        let mut c = vec![T::zero(); nobs * k_states];
        let trend_in_state = !config.hamilton_representation && config.k_order() > 0;
        if !trend_in_state || params.trend_coeffs.is_empty() {
            return c;
        }

        let inject = config.k_states_diff();
        let trend_data = config.trend.trend_data(nobs, trend_offset);
        for t in 0..nobs {
            let mut val = T::zero();
            for (j, &coeff) in params.trend_coeffs.iter().enumerate() {
                val += T::from_real(trend_data[(t, j)]) * coeff;
            }
            c[t * k_states + inject] = val;
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SarimaxParams;
    use crate::types::{SarimaxConfig, SarimaxOrder, Trend};

    fn make_config(p: usize, d: usize, q: usize) -> SarimaxConfig {
        make_seasonal_config(p, d, q, 0, 0, 0, 0)
    }

    fn make_seasonal_config(
        p: usize,
        d: usize,
        q: usize,
        pp: usize,
        dd: usize,
        qq: usize,
        s: usize,
    ) -> SarimaxConfig {
        let mut cfg = SarimaxConfig::new(SarimaxOrder::new(p, d, q, pp, dd, qq, s), Trend::None);
        cfg.enforce_stationarity = false;
        cfg.enforce_invertibility = false;
        cfg.concentrate_scale = true;
        cfg.validated().unwrap()
    }

    fn make_params(ar: &[f64], ma: &[f64]) -> SarimaxParams<f64> {
        make_seasonal_params(ar, ma, &[], &[])
    }

    fn make_seasonal_params(
        ar: &[f64],
        ma: &[f64],
        sar: &[f64],
        sma: &[f64],
    ) -> SarimaxParams<f64> {
        SarimaxParams {
            trend_coeffs: vec![],
            exog_coeffs: vec![],
            ar_coeffs: ar.to_vec(),
            ma_coeffs: ma.to_vec(),
            sar_coeffs: sar.to_vec(),
            sma_coeffs: sma.to_vec(),
            measurement_var: None,
            sigma2: None,
        }
    }

    fn build(config: &SarimaxConfig, params: &SarimaxParams<f64>) -> StateSpace<f64> {
        StateSpace::new(config, params, 50, None, 0).unwrap()
    }

    #[test]
    fn test_ar1_transition() {
        // AR(1) with phi=0.6527: k_states=1, T=[[phi]]
        let config = make_config(1, 0, 0);
        let params = make_params(&[0.6527425084139002], &[]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 1);
        assert_eq!(ss.k_states_diff, 0);
        assert!((ss.transition[(0, 0)] - 0.6527425084139002).abs() < 1e-10);
    }

    #[test]
    fn test_ar1_design_selection() {
        let config = make_config(1, 0, 0);
        let params = make_params(&[0.65], &[]);
        let ss = build(&config, &params);

        // Z = [1.0]
        assert_eq!(ss.design.len(), 1);
        assert!((ss.design[0] - 1.0).abs() < 1e-10);

        // R = [[1.0]]
        assert!((ss.selection[(0, 0)] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_arma11_transition() {
        // ARMA(1,1) with phi=0.4139, theta=0.336
        // k_order=2, k_states=2, k_states_diff=0
        // T = [[phi, 1], [0, 0]]
        let config = make_config(1, 0, 1);
        let params = make_params(&[0.41390307727487496], &[0.33603638737455516]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 2);
        assert_eq!(ss.k_states_diff, 0);

        assert!((ss.transition[(0, 0)] - 0.41390307727487496).abs() < 1e-10);
        assert!((ss.transition[(0, 1)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(1, 0)]).abs() < 1e-10);
        assert!((ss.transition[(1, 1)]).abs() < 1e-10);
    }

    #[test]
    fn test_arma11_selection() {
        // ARMA(1,1) with theta=0.336: R = [[1.0], [theta]]
        let config = make_config(1, 0, 1);
        let params = make_params(&[0.4139], &[0.33603638737455516]);
        let ss = build(&config, &params);

        assert!((ss.selection[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((ss.selection[(1, 0)] - 0.33603638737455516).abs() < 1e-10);
    }

    #[test]
    fn test_arma11_design() {
        // Z = [1, 0]
        let config = make_config(1, 0, 1);
        let params = make_params(&[0.4139], &[0.336]);
        let ss = build(&config, &params);

        assert!((ss.design[0] - 1.0).abs() < 1e-10);
        assert!((ss.design[1]).abs() < 1e-10);
    }

    #[test]
    fn test_arima111_transition() {
        // ARIMA(1,1,1) with phi=-0.6441, theta=0.7
        // k_states=3, k_states_diff=1, k_order=2
        // T = [[1, 1, 0], [0, phi, 1], [0, 0, 0]]
        let config = make_config(1, 1, 1);
        let params = make_params(&[-0.6441303822894944], &[0.7000629128883827]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 3);
        assert_eq!(ss.k_states_diff, 1);

        assert!((ss.transition[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(0, 1)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(0, 2)]).abs() < 1e-10);
        assert!((ss.transition[(1, 0)]).abs() < 1e-10);
        assert!((ss.transition[(1, 1)] - (-0.6441303822894944)).abs() < 1e-10);
        assert!((ss.transition[(1, 2)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(2, 0)]).abs() < 1e-10);
        assert!((ss.transition[(2, 1)]).abs() < 1e-10);
        assert!((ss.transition[(2, 2)]).abs() < 1e-10);
    }

    #[test]
    fn test_arima111_design() {
        // Z = [1, 1, 0]
        let config = make_config(1, 1, 1);
        let params = make_params(&[-0.6441], &[0.7]);
        let ss = build(&config, &params);

        assert!((ss.design[0] - 1.0).abs() < 1e-10);
        assert!((ss.design[1] - 1.0).abs() < 1e-10);
        assert!((ss.design[2]).abs() < 1e-10);
    }

    #[test]
    fn test_arima111_selection() {
        // R = [[0], [1], [theta]]
        let config = make_config(1, 1, 1);
        let params = make_params(&[-0.6441], &[0.7000629128883827]);
        let ss = build(&config, &params);

        assert!((ss.selection[(0, 0)]).abs() < 1e-10);
        assert!((ss.selection[(1, 0)] - 1.0).abs() < 1e-10);
        assert!((ss.selection[(2, 0)] - 0.7000629128883827).abs() < 1e-10);
    }

    #[test]
    fn test_state_cov_concentrated() {
        let config = make_config(1, 0, 0);
        let params = make_params(&[0.5], &[]);
        let ss = build(&config, &params);

        assert!((ss.state_cov[(0, 0)] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_ar2_companion() {
        // AR(2) with phi1=0.5, phi2=-0.3
        // T = [[0.5, 1], [-0.3, 0]]
        let config = make_config(2, 0, 0);
        let params = make_params(&[0.5, -0.3], &[]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 2);
        assert!((ss.transition[(0, 0)] - 0.5).abs() < 1e-10);
        assert!((ss.transition[(0, 1)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(1, 0)] - (-0.3)).abs() < 1e-10);
        assert!((ss.transition[(1, 1)]).abs() < 1e-10);
    }

    // ---- Seasonal tests ----

    #[test]
    fn test_sarima_100_100_4_transition() {
        // SARIMA(1,0,0)(1,0,0,4): k_states=5, no diff
        // reduced_ar = polymul([1,-0.7672], [1,0,0,0,-0.2322])
        //            = [1, -0.7672, 0, 0, -0.2322, 0.17815]
        // ARMA companion first col = [0.7672, 0, 0, 0.2322, -0.17815]
        let config = make_seasonal_config(1, 0, 0, 1, 0, 0, 4);
        let params =
            make_seasonal_params(&[0.7671699347442852], &[], &[0.2322174491752982], &[]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 5);
        assert_eq!(ss.k_states_diff, 0);

        assert!((ss.transition[(0, 0)] - 0.7671699347442852).abs() < 1e-10);
        assert!((ss.transition[(1, 0)]).abs() < 1e-10);
        assert!((ss.transition[(2, 0)]).abs() < 1e-10);
        assert!((ss.transition[(3, 0)] - 0.2322174491752982).abs() < 1e-6);
        let cross = 0.7671699347442852 * 0.2322174491752982;
        assert!((ss.transition[(4, 0)] - (-cross)).abs() < 1e-6);

        // Superdiagonal
        assert!((ss.transition[(0, 1)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(1, 2)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(2, 3)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(3, 4)] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_sarima_100_100_4_design_selection() {
        let config = make_seasonal_config(1, 0, 0, 1, 0, 0, 4);
        let params = make_seasonal_params(&[0.77], &[], &[0.23], &[]);
        let ss = build(&config, &params);

        // Z = [1, 0, 0, 0, 0]
        assert!((ss.design[0] - 1.0).abs() < 1e-10);
        for i in 1..5 {
            assert!(ss.design[i].abs() < 1e-10);
        }

        // R = [[1], [0], [0], [0], [0]] (no MA)
        assert!((ss.selection[(0, 0)] - 1.0).abs() < 1e-10);
        for i in 1..5 {
            assert!(ss.selection[(i, 0)].abs() < 1e-10);
        }
    }

    #[test]
    fn test_sarima_111_111_12_dimensions() {
        // SARIMA(1,1,1)(1,1,1,12): k_states=27
        let config = make_seasonal_config(1, 1, 1, 1, 1, 1, 12);
        let params = make_seasonal_params(&[0.9903], &[0.0660], &[0.0007], &[-1.0664]);
        let ss = build(&config, &params);

        assert_eq!(ss.k_states, 27);
        assert_eq!(ss.k_states_diff, 13);
        assert_eq!(ss.transition.nrows(), 27);
        assert_eq!(ss.transition.ncols(), 27);
        assert_eq!(ss.design.len(), 27);
        assert_eq!(ss.selection.nrows(), 27);
    }

    #[test]
    fn test_sarima_111_111_12_transition() {
        let config = make_seasonal_config(1, 1, 1, 1, 1, 1, 12);
        let params = make_seasonal_params(
            &[0.9903479224371599],
            &[0.0659541127042639],
            &[0.0007132203797734934],
            &[-1.0663518115052784],
        );
        let ss = build(&config, &params);

        // Regular diff: T[0,0] = 1
        assert!((ss.transition[(0, 0)] - 1.0).abs() < 1e-10);

        // Cross-diff: T[0,12] = 1
        assert!((ss.transition[(0, 12)] - 1.0).abs() < 1e-10);

        // Diff → ARMA: T[0,13] = 1, T[1,13] = 1
        assert!((ss.transition[(0, 13)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(1, 13)] - 1.0).abs() < 1e-10);

        // Seasonal cyclic shift: T[1,12]=1 (wrap), T[i+1,i]=1 for i=1..11
        assert!((ss.transition[(1, 12)] - 1.0).abs() < 1e-10);
        for i in 1..12 {
            assert!(
                (ss.transition[(i + 1, i)] - 1.0).abs() < 1e-10,
                "T[{}, {}] should be 1, got {}",
                i + 1,
                i,
                ss.transition[(i + 1, i)]
            );
        }

        // ARMA companion first entry: -reduced_ar[1]
        assert!((ss.transition[(13, 13)] - 0.9903479224371599).abs() < 1e-6);

        // Superdiagonal in ARMA block
        for i in 0..13 {
            assert!(
                (ss.transition[(13 + i, 14 + i)] - 1.0).abs() < 1e-10,
                "Superdiag T[{}, {}] should be 1",
                13 + i,
                14 + i
            );
        }
    }

    #[test]
    fn test_sarima_111_111_12_design() {
        let config = make_seasonal_config(1, 1, 1, 1, 1, 1, 12);
        let params = make_seasonal_params(&[0.99], &[0.07], &[0.001], &[-1.07]);
        let ss = build(&config, &params);

        // Z[0] = 1 (regular diff)
        assert!((ss.design[0] - 1.0).abs() < 1e-10);
        // Z[1..12] = 0
        for i in 1..12 {
            assert!(ss.design[i].abs() < 1e-10, "Z[{}] should be 0", i);
        }
        // Z[12] = 1 (last seasonal state)
        assert!((ss.design[12] - 1.0).abs() < 1e-10);
        // Z[13] = 1 (first ARMA state)
        assert!((ss.design[13] - 1.0).abs() < 1e-10);
        // Z[14..27] = 0
        for i in 14..27 {
            assert!(ss.design[i].abs() < 1e-10, "Z[{}] should be 0", i);
        }
    }

    #[test]
    fn test_sarima_111_111_12_selection() {
        let config = make_seasonal_config(1, 1, 1, 1, 1, 1, 12);
        let params = make_seasonal_params(
            &[0.9903479224371599],
            &[0.0659541127042639],
            &[0.0007132203797734934],
            &[-1.0663518115052784],
        );
        let ss = build(&config, &params);

        // R[0..13, 0] = 0 (diff states)
        for i in 0..13 {
            assert!(ss.selection[(i, 0)].abs() < 1e-10);
        }
        // R[13, 0] = 1 (reduced_ma[0])
        assert!((ss.selection[(13, 0)] - 1.0).abs() < 1e-10);
        // R[14, 0] = reduced_ma[1] = ma_coeff
        assert!((ss.selection[(14, 0)] - 0.0659541127042639).abs() < 1e-6);
        // R[25, 0] = reduced_ma[12] = sma_coeff
        assert!((ss.selection[(25, 0)] - (-1.0663518115052784)).abs() < 1e-6);
        // R[26, 0] = reduced_ma[13] = ma*sma cross term
        let cross_ma = 0.0659541127042639 * (-1.0663518115052784);
        assert!((ss.selection[(26, 0)] - cross_ma).abs() < 1e-6);
    }

    // ---- Hamilton representation ----

    #[test]
    fn test_hamilton_arma11() {
        let mut config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 1, 0, 0, 0, 0), Trend::None);
        config.enforce_stationarity = false;
        config.enforce_invertibility = false;
        config.concentrate_scale = true;
        config.hamilton_representation = true;
        let config = config.validated().unwrap();
        let params = make_params(&[0.4], &[0.3]);
        let ss = build(&config, &params);

        // Transposed companion: AR in the first row, subdiagonal ones
        assert!((ss.transition[(0, 0)] - 0.4).abs() < 1e-10);
        assert!((ss.transition[(0, 1)]).abs() < 1e-10);
        assert!((ss.transition[(1, 0)] - 1.0).abs() < 1e-10);

        // MA in the design, not the selection
        assert!((ss.design[0] - 1.0).abs() < 1e-10);
        assert!((ss.design[1] - 0.3).abs() < 1e-10);
        assert!((ss.selection[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((ss.selection[(1, 0)]).abs() < 1e-10);
    }

    #[test]
    fn test_hamilton_trend_rescaled_to_mean() {
        // AR(1) phi=0.5, trend 'c' with mean 1.0:
        // reduced_ar = [1, -0.5], scale = sum = 0.5, d_t = 1.0 / 0.5 = 2.0
        let mut config =
            SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::Constant);
        config.enforce_stationarity = false;
        config.concentrate_scale = true;
        config.hamilton_representation = true;
        let config = config.validated().unwrap();
        let mut params = make_params(&[0.5], &[]);
        params.trend_coeffs = vec![1.0];
        let ss = build(&config, &params);

        assert!((ss.obs_intercept[0] - 2.0).abs() < 1e-10);
        // state intercept stays empty under Hamilton
        assert!(ss.state_intercept.iter().all(|&c| c.abs() < 1e-12));
    }

    // ---- Trend, regression and measurement error ----

    #[test]
    fn test_harvey_trend_state_intercept() {
        // trend 'ct': c_t enters the first ARMA row, t counted from 1
        let mut config =
            SarimaxConfig::new(SarimaxOrder::new(1, 1, 0, 0, 0, 0, 0), Trend::ConstantTime);
        config.enforce_stationarity = false;
        config.concentrate_scale = true;
        let config = config.validated().unwrap();
        let mut params = make_params(&[0.5], &[]);
        params.trend_coeffs = vec![2.0, 0.5];
        let ss = StateSpace::new(&config, &params, 4, None, 0).unwrap();

        let k = ss.k_states;
        // inject at index k_states_diff = 1
        assert!((ss.state_intercept[1] - (2.0 + 0.5 * 1.0)).abs() < 1e-10);
        assert!((ss.state_intercept[k + 1] - (2.0 + 0.5 * 2.0)).abs() < 1e-10);
        assert!((ss.state_intercept[0]).abs() < 1e-12);
        assert!(ss.obs_intercept.iter().all(|&d| d.abs() < 1e-12));
    }

    #[test]
    fn test_mle_regression_obs_intercept() {
        let mut config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::None);
        config.k_exog = 2;
        config.enforce_stationarity = false;
        config.concentrate_scale = true;
        let config = config.validated().unwrap();
        let mut params = make_params(&[0.5], &[]);
        params.exog_coeffs = vec![2.0, -1.0];
        let exog = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 0.5, 0.0, 3.0]);
        let ss = StateSpace::new(&config, &params, 3, Some(&exog), 0).unwrap();

        assert!((ss.obs_intercept[0] - (2.0 - 1.0)).abs() < 1e-10);
        assert!((ss.obs_intercept[1] - (4.0 - 0.5)).abs() < 1e-10);
        assert!((ss.obs_intercept[2] - (0.0 - 3.0)).abs() < 1e-10);
        assert!(ss.exog_design.is_none());
    }

    #[test]
    fn test_state_regression_design_and_transition() {
        let mut config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::None);
        config.k_exog = 2;
        config.mle_regression = false;
        config.enforce_stationarity = false;
        config.concentrate_scale = true;
        let config = config.validated().unwrap();
        let params = make_params(&[0.5], &[]);
        let exog = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let ss = StateSpace::new(&config, &params, 2, Some(&exog), 0).unwrap();

        assert_eq!(ss.k_states, 3);
        assert!(ss.time_varying_design());
        // identity sub-block for the exog states
        assert!((ss.transition[(1, 1)] - 1.0).abs() < 1e-10);
        assert!((ss.transition[(2, 2)] - 1.0).abs() < 1e-10);
        // per-observation design rows carry the exog values
        let z0 = ss.design_row(0);
        assert!((z0[0] - 1.0).abs() < 1e-10);
        assert!((z0[1] - 1.0).abs() < 1e-10);
        assert!((z0[2] - 2.0).abs() < 1e-10);
        let z1 = ss.design_row(1);
        assert!((z1[1] - 3.0).abs() < 1e-10);
        assert!((z1[2] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_measurement_error_obs_cov() {
        let mut config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::None);
        config.measurement_error = true;
        config.enforce_stationarity = false;
        config.concentrate_scale = true;
        let config = config.validated().unwrap();
        let mut params = make_params(&[0.5], &[]);
        params.measurement_var = Some(0.25);
        let ss = build(&config, &params);

        assert!((ss.obs_cov - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_exog_shape_mismatch() {
        let mut config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 0, 0, 0, 0, 0), Trend::None);
        config.k_exog = 2;
        config.enforce_stationarity = false;
        let config = config.validated().unwrap();
        let params = make_params(&[0.5], &[]);
        let exog = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        assert!(StateSpace::new(&config, &params, 2, Some(&exog), 0).is_err());
        assert!(StateSpace::<f64>::new(&config, &params, 2, None, 0).is_err());
    }
}
