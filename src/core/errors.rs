use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("A scoring run is already in progress")]
    Busy,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type RiskResult<T> = std::result::Result<T, RiskError>;
