use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Layer or data dimensions do not line up
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Dataset file is malformed, or a partition is empty
    #[error("invalid data: {0}")]
    Data(String),
    #[error("training diverged at epoch {epoch}: loss is {loss}")]
    Diverged { epoch: usize, loss: f32 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
