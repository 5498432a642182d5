use thiserror::Error;

#[derive(Error, Debug)]
pub enum CortexError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Percept not found: {0}")]
    PerceptNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Model backend error: {0}")]
    Model(String),

    #[error("Port error: {0}")]
    Port(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CortexResult<T> = Result<T, CortexError>;
