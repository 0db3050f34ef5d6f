use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScatterError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("non-finite amplitude: {0}")]
    NumericOverflow(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ScatterError {
    /// Stable code used in error events and for exit-code mapping.
    pub fn code(&self) -> &'static str {
        match self {
            ScatterError::Config(_) => "config_invalid",
            ScatterError::ResourceExhausted(_) => "resource_exhausted",
            ScatterError::NumericOverflow(_) => "numeric_overflow",
            ScatterError::Transport(_) => "transport_failure",
            ScatterError::Io(_) => "io_failure",
            ScatterError::Fatal(_) => "fatal",
        }
    }
}

pub type ScatterResult<T> = Result<T, ScatterError>;
