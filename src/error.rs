//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;
use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("knowledge error: {0}")]
    Knowledge(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("llm error: {0}")]
    Provider(#[from] ProviderError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
