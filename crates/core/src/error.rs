use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown journey template: {0}")]
    Template(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Journey error: {0}")]
    Journey(String),

    #[error("Message delivery error: {0}")]
    Delivery(String),

    #[error("Action handler error: {0}")]
    Action(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
