//! Poet: writes the first draft.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use super::head;
use crate::config::PipelineConfig;
use crate::llm::{LlmProvider, ProviderError};
use crate::prompt::{POET, PromptBuilder};
use crate::refusal::is_draft_refusal;
use crate::styles::{CreativeControls, Language, draft_directives, style_rules};

/// Stand-in poem used when the model refuses or keeps failing.
pub const EMERGENCY_POEM: &str = "## [EMERGENCY_FRAGMENT_00]
The machine is quiet, but the ghost is loud.
Errors are just birds hitting the glass of the sky.
We try again, not because we must,
but because silence is a heavy stone.
(The system was overwhelmed, but the poetry remains.)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOrigin {
    Model,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draft {
    /// Raw model reply, trimmed; still carries the output markers.
    pub text: String,
    pub origin: DraftOrigin,
}

impl Draft {
    fn emergency() -> Self {
        Self { text: EMERGENCY_POEM.to_string(), origin: DraftOrigin::Emergency }
    }
}

#[derive(Debug, Clone)]
pub struct Poet {
    llm: LlmProvider,
    prompts_dir: PathBuf,
    attempts: u32,
    min_chars: usize,
}

impl Poet {
    pub fn new(llm: LlmProvider, config: &PipelineConfig) -> Self {
        Self {
            llm,
            prompts_dir: config.prompts_dir.clone(),
            attempts: config.draft_attempts.max(1),
            min_chars: config.min_draft_chars,
        }
    }

    /// Draft a poem on `topic` in `style`.
    ///
    /// A refusal deploys the emergency poem at once. Replies shorter than the
    /// minimum are retried; when every attempt comes back short the emergency
    /// poem is used as well.
    pub async fn write_draft(
        &self,
        topic: &str,
        style_context: &str,
        style: &str,
        language: Language,
        controls: &CreativeControls,
    ) -> Result<Draft, ProviderError> {
        info!(style, %language, "poet is writing");

        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(POET)
            .var("topic", topic)
            .var("style", style)
            .var("language", language.as_str())
            .var("style_context", style_context)
            .var("style_rules", style_rules(style))
            .var("creative_block", draft_directives(controls))
            .build();

        for attempt in 1..=self.attempts {
            let reply = self.llm.complete(&prompt).await?;
            let text = reply.trim();

            if is_draft_refusal(text) {
                warn!(attempt, head = %head(text), "refusal detected in draft, deploying emergency poem");
                return Ok(Draft::emergency());
            }
            if text.chars().count() < self.min_chars {
                warn!(attempt, output = %text, "short draft output");
                continue;
            }
            return Ok(Draft { text: text.to_string(), origin: DraftOrigin::Model });
        }

        error!(attempts = self.attempts, "all draft attempts failed, deploying emergency poem");
        Ok(Draft::emergency())
    }
}
