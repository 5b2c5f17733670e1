use thiserror::Error;

#[derive(Error, Debug)]
pub enum SarimaxError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("parameter length mismatch: expected {expected}, got {got}")]
    ParamLengthMismatch { expected: usize, got: usize },

    #[error("state space construction failed: {0}")]
    StateSpaceError(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("non-stationary starting autoregressive parameters")]
    NonStationaryAR,

    #[error("non-invertible starting moving average parameters")]
    NonInvertibleMA,

    #[error("data error: {0}")]
    DataError(String),

    #[error("out-of-sample exogenous variables are required for forecasting")]
    MissingForecastExog,
}

pub type Result<T> = std::result::Result<T, SarimaxError>;
