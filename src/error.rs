use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MrError {
    #[error("{method} requires at least {required} instruments, found {found}")]
    InsufficientInstruments {
        method: &'static str,
        required: usize,
        found: usize,
    },

    #[error("singular regression: {0}")]
    SingularRegression(String),

    #[error("empty confidence region: {0}")]
    EmptyConfidenceRegion(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, MrError>;
