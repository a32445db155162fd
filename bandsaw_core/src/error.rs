use thiserror::Error;

/// Fault taxonomy for the control path.
#[derive(Debug, Error, Clone)]
pub enum ControlError {
    #[error("transport fault: {0}")]
    TransportFault(String),
    #[error("decoding fault: {0}")]
    DecodingFault(String),
    #[error("strategy fault in {strategy}: {source}")]
    StrategyFault {
        strategy: &'static str,
        source: StrategyError,
    },
    #[error("configuration fault: {0}")]
    ConfigurationFault(String),
}

/// Faults raised inside a control law. Never crosses the dispatcher.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("no data for {0}")]
    NoData(&'static str),
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("strategy registered twice: {0}")]
    DuplicateStrategy(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
