use crate::error::{Result, SarimaxError};
use crate::initialization::Initialization;
use nalgebra::DMatrix;

/// Lag specification for one polynomial: either a maximal order (all lags
/// `1..=n` included) or an explicit set of included lags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LagSpec {
    Count(usize),
    Lags(Vec<usize>),
}

impl LagSpec {
    pub fn none() -> Self {
        LagSpec::Count(0)
    }

    /// Highest included lag (the polynomial degree).
    pub fn max_lag(&self) -> usize {
        match self {
            LagSpec::Count(n) => *n,
            LagSpec::Lags(lags) => lags.iter().copied().max().unwrap_or(0),
        }
    }

    /// Number of free coefficients.
    pub fn n_params(&self) -> usize {
        match self {
            LagSpec::Count(n) => *n,
            LagSpec::Lags(lags) => lags.len(),
        }
    }

    /// Inclusion mask over lags `1..=max_lag()`.
    pub fn inclusion(&self) -> Vec<bool> {
        match self {
            LagSpec::Count(n) => vec![true; *n],
            LagSpec::Lags(lags) => {
                let mut mask = vec![false; self.max_lag()];
                for &l in lags {
                    if l >= 1 {
                        mask[l - 1] = true;
                    }
                }
                mask
            }
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if let LagSpec::Lags(lags) = self {
            if lags.contains(&0) {
                return Err(SarimaxError::InvalidConfig(format!(
                    "{what} lag set must not contain lag 0"
                )));
            }
            let mut seen = lags.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != lags.len() {
                return Err(SarimaxError::InvalidConfig(format!(
                    "{what} lag set contains duplicate lags"
                )));
            }
        }
        Ok(())
    }
}

impl From<usize> for LagSpec {
    fn from(n: usize) -> Self {
        LagSpec::Count(n)
    }
}

/// SARIMA orders (p,d,q)(P,D,Q,s).
#[derive(Debug, Clone, PartialEq)]
pub struct SarimaxOrder {
    pub ar: LagSpec,
    pub d: usize,
    pub ma: LagSpec,
    pub seasonal_ar: LagSpec,
    pub seasonal_d: usize,
    pub seasonal_ma: LagSpec,
    pub s: usize,
}

impl SarimaxOrder {
    pub fn new(p: usize, d: usize, q: usize, pp: usize, dd: usize, qq: usize, s: usize) -> Self {
        SarimaxOrder {
            ar: LagSpec::Count(p),
            d,
            ma: LagSpec::Count(q),
            seasonal_ar: LagSpec::Count(pp),
            seasonal_d: dd,
            seasonal_ma: LagSpec::Count(qq),
            s,
        }
    }

    /// Degree of the reduced AR polynomial.
    pub fn k_ar(&self) -> usize {
        self.ar.max_lag() + self.s * self.seasonal_ar.max_lag()
    }

    /// Degree of the reduced MA polynomial.
    pub fn k_ma(&self) -> usize {
        self.ma.max_lag() + self.s * self.seasonal_ma.max_lag()
    }

    /// Dimension of the ARMA companion block: max(k_ar, k_ma + 1), or zero
    /// for a pure differencing/regression model.
    pub fn k_order(&self) -> usize {
        if self.k_ar() == 0 && self.k_ma() == 0 {
            0
        } else {
            self.k_ar().max(self.k_ma() + 1)
        }
    }

    /// States consumed by in-state differencing.
    pub fn k_states_diff(&self) -> usize {
        self.d + self.s * self.seasonal_d
    }

    fn has_seasonal(&self) -> bool {
        self.seasonal_ar.n_params() > 0
            || self.seasonal_d > 0
            || self.seasonal_ma.n_params() > 0
    }
}

/// Deterministic trend specification. `Polynomial` holds an inclusion mask
/// over powers of t starting at t^0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trend {
    None,
    Constant,
    Time,
    ConstantTime,
    Polynomial(Vec<u8>),
}

impl Trend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "n" | "none" => Ok(Trend::None),
            "c" => Ok(Trend::Constant),
            "t" => Ok(Trend::Time),
            "ct" => Ok(Trend::ConstantTime),
            _ => Err(SarimaxError::InvalidConfig(format!(
                "unknown trend specification '{s}' (expected n, c, t or ct)"
            ))),
        }
    }

    /// Included powers of t, ascending.
    pub fn powers(&self) -> Vec<usize> {
        match self {
            Trend::None => vec![],
            Trend::Constant => vec![0],
            Trend::Time => vec![1],
            Trend::ConstantTime => vec![0, 1],
            Trend::Polynomial(mask) => mask
                .iter()
                .enumerate()
                .filter(|(_, &m)| m != 0)
                .map(|(i, _)| i)
                .collect(),
        }
    }

    pub fn k_trend(&self) -> usize {
        self.powers().len()
    }

    /// Trend regressors for observations `0..n`, with t counted from
    /// `offset + 1`. Row t, column j = t^power_j.
    pub fn trend_data(&self, n: usize, offset: usize) -> DMatrix<f64> {
        let powers = self.powers();
        DMatrix::from_fn(n, powers.len(), |t, j| {
            ((offset + t + 1) as f64).powi(powers[j] as i32)
        })
    }
}

/// Full model configuration. Construct with [`SarimaxConfig::new`], adjust
/// the public flags, then call [`SarimaxConfig::validated`]; all derived
/// dimensions assume a validated config.
#[derive(Debug, Clone)]
pub struct SarimaxConfig {
    pub order: SarimaxOrder,
    pub trend: Trend,
    pub k_exog: usize,
    /// Estimate regression coefficients by MLE (observation intercept) rather
    /// than as diffuse states appended to the design.
    pub mle_regression: bool,
    /// Unsupported; kept in the struct so callers get a specific error.
    pub time_varying_regression: bool,
    pub measurement_error: bool,
    pub enforce_stationarity: bool,
    pub enforce_invertibility: bool,
    pub concentrate_scale: bool,
    /// Difference the data before filtering instead of embedding the
    /// differencing in the state vector.
    pub simple_differencing: bool,
    pub hamilton_representation: bool,
    /// Overrides the derived initial state distribution; `None` selects
    /// mixed diffuse/stationary or approximate diffuse from the flags.
    pub initialization: Option<Initialization>,
}

impl SarimaxConfig {
    pub fn new(order: SarimaxOrder, trend: Trend) -> Self {
        SarimaxConfig {
            order,
            trend,
            k_exog: 0,
            mle_regression: true,
            time_varying_regression: false,
            measurement_error: false,
            enforce_stationarity: true,
            enforce_invertibility: true,
            concentrate_scale: false,
            simple_differencing: false,
            hamilton_representation: false,
            initialization: None,
        }
    }

    /// Check flag compatibility and apply forced flags. A pure-regression
    /// model in the state vector has no state noise, so the observation
    /// disturbance must carry the variance.
    pub fn validated(mut self) -> Result<Self> {
        self.order.ar.validate("AR")?;
        self.order.ma.validate("MA")?;
        self.order.seasonal_ar.validate("seasonal AR")?;
        self.order.seasonal_ma.validate("seasonal MA")?;

        if self.time_varying_regression {
            return Err(SarimaxError::InvalidConfig(
                "time-varying regression coefficients are not implemented".into(),
            ));
        }
        if self.order.has_seasonal() && self.order.s < 2 {
            return Err(SarimaxError::InvalidConfig(
                "seasonal components require a periodicity of at least 2".into(),
            ));
        }
        if self.hamilton_representation
            && !self.simple_differencing
            && self.order.k_states_diff() > 0
        {
            return Err(SarimaxError::InvalidConfig(
                "the Hamilton representation does not support in-state differencing; \
                 enable simple_differencing"
                    .into(),
            ));
        }
        if self.state_regression() && self.order.k_order() == 0 {
            self.measurement_error = true;
        }
        Ok(self)
    }

    pub fn state_regression(&self) -> bool {
        self.k_exog > 0 && !self.mle_regression
    }

    /// In-state regular differencing order (zeroed under simple
    /// differencing).
    pub fn k_diff(&self) -> usize {
        if self.simple_differencing {
            0
        } else {
            self.order.d
        }
    }

    pub fn k_seasonal_diff(&self) -> usize {
        if self.simple_differencing {
            0
        } else {
            self.order.seasonal_d
        }
    }

    pub fn k_states_diff(&self) -> usize {
        self.k_diff() + self.order.s * self.k_seasonal_diff()
    }

    pub fn k_order(&self) -> usize {
        self.order.k_order()
    }

    pub fn k_states(&self) -> usize {
        self.k_order()
            + self.k_states_diff()
            + if self.state_regression() { self.k_exog } else { 0 }
    }

    pub fn k_posdef(&self) -> usize {
        if self.k_order() > 0 {
            1
        } else {
            0
        }
    }

    /// States initialized diffusely: everything outside the stationary ARMA
    /// block, or all of them when stationarity is not enforced.
    pub fn k_diffuse_states(&self) -> usize {
        if self.enforce_stationarity {
            self.k_states() - self.k_order()
        } else {
            self.k_states()
        }
    }

    pub fn loglikelihood_burn(&self) -> usize {
        self.k_diffuse_states()
    }

    pub fn k_trend(&self) -> usize {
        self.trend.k_trend()
    }

    /// Whether the state equation carries a disturbance variance parameter.
    pub fn state_error(&self) -> bool {
        self.k_posdef() > 0
    }

    /// Total estimated parameters, used for the information criteria.
    pub fn k_params(&self) -> usize {
        self.k_trend()
            + if self.mle_regression { self.k_exog } else { 0 }
            + self.order.ar.n_params()
            + self.order.ma.n_params()
            + self.order.seasonal_ar.n_params()
            + self.order.seasonal_ma.n_params()
            + self.measurement_error as usize
            + self.state_error() as usize
    }

    /// Length of the vector the optimizer sees: `sigma2` drops out when the
    /// scale is concentrated.
    pub fn k_params_estimated(&self) -> usize {
        self.k_params() - (self.concentrate_scale && self.state_error()) as usize
    }

    /// Deterministic parameter names, in vector order.
    pub fn param_names(&self, exog_names: Option<&[String]>) -> Vec<String> {
        let mut names = Vec::with_capacity(self.k_params());
        for p in self.trend.powers() {
            names.push(match p {
                0 => "intercept".to_string(),
                1 => "drift".to_string(),
                _ => format!("trend.{p}"),
            });
        }
        if self.mle_regression {
            for i in 0..self.k_exog {
                match exog_names {
                    Some(e) => names.push(e[i].clone()),
                    None => names.push(format!("x{}", i + 1)),
                }
            }
        }
        let lag_names = |spec: &LagSpec| -> Vec<usize> {
            match spec {
                LagSpec::Count(n) => (1..=*n).collect(),
                LagSpec::Lags(lags) => {
                    let mut l = lags.clone();
                    l.sort_unstable();
                    l
                }
            }
        };
        for l in lag_names(&self.order.ar) {
            names.push(format!("ar.L{l}"));
        }
        for l in lag_names(&self.order.ma) {
            names.push(format!("ma.L{l}"));
        }
        for l in lag_names(&self.order.seasonal_ar) {
            names.push(format!("ar.S.L{}", l * self.order.s));
        }
        for l in lag_names(&self.order.seasonal_ma) {
            names.push(format!("ma.S.L{}", l * self.order.s));
        }
        if self.measurement_error {
            names.push("var.measurement_error".to_string());
        }
        if self.state_error() {
            names.push("sigma2".to_string());
        }
        names
    }
}

/// Optimization method for [`crate::optimizer::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMethod {
    Lbfgs,
    NelderMead,
}

impl FitMethod {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "lbfgs" | "bfgs" => Ok(FitMethod::Lbfgs),
            "nm" | "nelder-mead" => Ok(FitMethod::NelderMead),
            _ => Err(SarimaxError::InvalidConfig(format!(
                "unknown fit method '{s}' (expected lbfgs, bfgs or nelder-mead)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FitMethod::Lbfgs => "lbfgs",
            FitMethod::NelderMead => "nelder-mead",
        }
    }
}

/// Options controlling the fit loop.
pub struct FitOptions {
    pub method: FitMethod,
    pub maxiter: u64,
    /// Starting values in the constrained space; derived from the data when
    /// absent.
    pub start_params: Option<Vec<f64>>,
    /// Run a second L-BFGS pass from the optimum using the exact complex-step
    /// gradient.
    pub refine: bool,
    /// Skip post-fit inference and return only the parameter estimates.
    pub return_params: bool,
    /// Invoked with the constrained parameter vector at each finite objective
    /// evaluation.
    pub callback: Option<Box<dyn FnMut(&[f64])>>,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            method: FitMethod::Lbfgs,
            maxiter: 50,
            start_params: None,
            refine: false,
            return_params: false,
            callback: None,
        }
    }
}

/// Outcome of a maximum likelihood fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Constrained parameter estimates, in [`SarimaxConfig::param_names`]
    /// order.
    pub params: Vec<f64>,
    pub param_names: Vec<String>,
    pub loglike: f64,
    /// Concentrated innovation variance estimate, or one when the variance
    /// is parameterized directly.
    pub scale: f64,
    pub nobs: usize,
    pub k_params: usize,
    pub aic: f64,
    pub bic: f64,
    pub hqic: f64,
    pub cov_params: DMatrix<f64>,
    pub bse: Vec<f64>,
    pub zvalues: Vec<f64>,
    pub pvalues: Vec<f64>,
    pub n_iter: u64,
    pub converged: bool,
    pub message: String,
    pub method: &'static str,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
