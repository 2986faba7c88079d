// Library root: the binary in src/main.rs and the integration tests build on it.

pub mod agents;
pub mod config;
pub mod error;
#[cfg(feature = "knowledge")]
pub mod knowledge;
pub mod llm;
pub mod logger;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod refusal;
pub mod render;
pub mod styles;
