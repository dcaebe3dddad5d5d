use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Degenerate gate: innovation covariance is singular")]
    DegenerateGate,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("BEV sink error: {0}")]
    Sink(String),
}
