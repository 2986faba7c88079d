//! Refiner: grades a draft, rewrites it and grades the rewrite, in a single
//! sectioned reply.

use std::path::PathBuf;

use tracing::{error, info, warn};

use super::head;
use crate::config::PipelineConfig;
use crate::llm::{LlmProvider, ProviderError};
use crate::prompt::{PromptBuilder, REFINER};
use crate::refusal::is_critique_refusal;
use crate::styles::{CreativeControls, Language, refinement_directives, refinement_rules};

/// Sectioned critique used when the model never produces a usable one.
/// The draft is passed through unchanged with a middling grade.
pub fn fallback_critique(draft: &str) -> String {
    format!(
        "[SECTION_EVALUATION]
## 📊 VALUTAZIONE INIZIALE
**Voto Iniziale:** 6/10
**Spiegazione:** The draft is solid but lacks the full intensity of the style.

[SECTION_POEM]
## ✍️ POESIA RIVISTA
## [RECONSTRUCTION_ID]
{draft}

[SECTION_NOTES]
## 📊 VALUTAZIONE FINALE
**Voto Finale:** 6.0/10
**Spiegazione:** Minimal changes due to system constraints.
[/SECTION]
[/AUDIT_END]"
    )
}

#[derive(Debug, Clone)]
pub struct Refiner {
    llm: LlmProvider,
    prompts_dir: PathBuf,
    attempts: u32,
    min_chars: usize,
}

impl Refiner {
    pub fn new(llm: LlmProvider, config: &PipelineConfig) -> Self {
        Self {
            llm,
            prompts_dir: config.prompts_dir.clone(),
            attempts: config.refine_attempts.max(1),
            min_chars: config.min_critique_chars,
        }
    }

    /// Raw critique pack for `draft`; see [`crate::parse::split_refinement`].
    pub async fn evaluate_and_refine(
        &self,
        draft: &str,
        style_context: &str,
        style: &str,
        language: Language,
        controls: &CreativeControls,
    ) -> Result<String, ProviderError> {
        info!(
            style,
            originality = controls.originality,
            complexity = controls.complexity,
            "refiner is working"
        );

        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(REFINER)
            .var("draft", draft)
            .var("style", style)
            .var("language", language.as_str())
            .var("ref_rules", refinement_rules(style))
            .var("ref_creative_block", refinement_directives(controls))
            .var("style_context", style_context)
            .build();

        for attempt in 1..=self.attempts {
            let reply = self.llm.complete(&prompt).await?;

            if is_critique_refusal(&reply) {
                warn!(attempt, head = %head(&reply), "refiner refusal");
                continue;
            }
            if reply.chars().count() < self.min_chars {
                warn!(attempt, "refiner short output");
                continue;
            }
            return Ok(reply);
        }

        error!(attempts = self.attempts, "refiner failed all attempts, using fallback critique");
        Ok(fallback_critique(draft))
    }
}
