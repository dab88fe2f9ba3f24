use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    InvalidConfig(String),

    #[error("Physics error: {0}")]
    PhysicsError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("simplex exceeded {iterations} iterations, best cost {cost:.6e}")]
    SimplexExhausted { iterations: usize, cost: f64 },

    #[error("simplex stuck at local minimum, cost {cost:.6e}")]
    SimplexStuck { cost: f64 },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),
}
