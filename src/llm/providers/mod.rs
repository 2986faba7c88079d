//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod freellm;
pub mod openai_compatible;
pub mod replay;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `FREELLM_API_KEY` env (never TOML). FreeLLM
/// refuses to start without it; the OpenAI-compatible backend treats it as
/// optional for keyless local servers.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(replay::ReplayProvider::echo())),
        "freellm" => {
            let key = api_key.ok_or(ProviderError::MissingApiKey)?;
            let p = freellm::FreeLlmProvider::new(&config.freellm, key)?;
            Ok(LlmProvider::FreeLlm(p))
        }
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}
