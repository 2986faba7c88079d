//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! The `complete` method is `async fn` on the enum so callers need no
//! trait-object machinery.

pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("FREELLM_API_KEY not set")]
    MissingApiKey,
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider reported failure: {0}")]
    Api(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Offline echo backend (`default = "dummy"`).
    Dummy(providers::replay::ReplayProvider),
    Replay(providers::replay::ReplayProvider),
    FreeLlm(providers::freellm::FreeLlmProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Send `prompt` to the provider and return its text reply.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(prompt).await,
            LlmProvider::Replay(p) => p.complete(prompt).await,
            LlmProvider::FreeLlm(p) => p.complete(prompt).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(prompt).await,
        }
    }

    /// Short backend name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::Replay(_) => "replay",
            LlmProvider::FreeLlm(_) => "freellm",
            LlmProvider::OpenAiCompatible(_) => "openai",
        }
    }
}

impl From<providers::replay::ReplayProvider> for LlmProvider {
    fn from(p: providers::replay::ReplayProvider) -> Self {
        LlmProvider::Replay(p)
    }
}
