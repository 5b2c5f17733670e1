//! Seasonal ARIMA with exogenous regressors, estimated by maximum likelihood
//! on a linear Gaussian state-space representation.
//!
//! The model for an observed series y_t with optional regressors x_t is
//!
//! ```text
//! phi(L) Phi(L^s) (1 - L)^d (1 - L^s)^D (y_t - x_t beta - trend_t)
//!     = theta(L) Theta(L^s) eps_t,   eps_t ~ N(0, sigma^2)
//! ```
//!
//! cast in Harvey representation so the Kalman filter delivers the exact
//! likelihood, gradients come from complex-step differentiation, and the
//! optimizer works in an unconstrained space via the Monahan transform.
//!
//! # Example
//!
//! ```no_run
//! use sarimax_ss::model::Sarimax;
//! use sarimax_ss::types::{FitOptions, SarimaxConfig, SarimaxOrder, Trend};
//!
//! # fn main() -> Result<(), sarimax_ss::error::SarimaxError> {
//! let y: Vec<f64> = vec![0.0; 200]; // observed series
//! let config = SarimaxConfig::new(SarimaxOrder::new(1, 0, 1, 0, 0, 0, 0), Trend::Constant);
//! let model = Sarimax::new(y, None, config)?;
//! let fit = model.fit(FitOptions::default())?;
//! let forecast = model.forecast(&fit.params, 12, 0.05, None)?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error;
pub mod forecast;
pub mod initialization;
pub mod kalman;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod polynomial;
pub mod score;
pub mod start_params;
pub mod state_space;
pub mod types;

pub use error::{Result, SarimaxError};
pub use forecast::{ForecastResult, ResidualOutput};
pub use initialization::Initialization;
pub use model::Sarimax;
pub use types::{FitMethod, FitOptions, FitResult, SarimaxConfig, SarimaxOrder, Trend};
