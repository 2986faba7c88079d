//! Interpreter: a compact reading of the final poem.
//!
//! By default the reading is assembled locally from the refinement result.
//! With `pipeline.interpreter = true` the model is asked for the scheme,
//! metre, devices and a short interpretation; any field it omits keeps the
//! local value.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::llm::LlmProvider;
use crate::prompt::{INTERPRETER, PromptBuilder};
use crate::refusal::is_draft_refusal;
use crate::styles::Language;

pub const INTEGRATED_INTERPRETATION: &str = "Analysis integrated in refinement.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Interpretation {
    pub scheme: String,
    pub metrics: String,
    pub devices: String,
    /// Final score as a percentage, e.g. `"80%"`.
    pub rating_adherence: String,
    pub interpretation: String,
}

impl Interpretation {
    /// Summary built without the model.
    pub fn integrated(final_score: f64) -> Self {
        Self {
            scheme: "Style-Aware".to_string(),
            metrics: "Technical".to_string(),
            devices: "Integrated".to_string(),
            rating_adherence: rating_percent(final_score),
            interpretation: INTEGRATED_INTERPRETATION.to_string(),
        }
    }
}

/// `8.7` → `"87%"`, truncating like an integer cast.
pub fn rating_percent(score: f64) -> String {
    format!("{}%", (score * 10.0) as i64)
}

#[derive(Debug, Clone)]
pub struct Interpreter {
    llm: LlmProvider,
    prompts_dir: PathBuf,
    use_model: bool,
}

impl Interpreter {
    pub fn new(llm: LlmProvider, prompts_dir: PathBuf, use_model: bool) -> Self {
        Self { llm, prompts_dir, use_model }
    }

    pub async fn interpret(&self, poem: &str, style: &str, language: Language, final_score: f64) -> Interpretation {
        let mut reading = Interpretation::integrated(final_score);
        if !self.use_model {
            return reading;
        }

        info!(style, "interpreter reading final poem");
        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(INTERPRETER)
            .var("poem", poem)
            .var("style", style)
            .var("language", language.as_str())
            .build();

        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "interpreter call failed, keeping integrated analysis");
                return reading;
            }
        };
        if is_draft_refusal(&reply) {
            warn!("interpreter refused, keeping integrated analysis");
            return reading;
        }

        for line in reply.lines() {
            let Some((label, value)) = line.split_once(':') else { continue };
            let value = value.trim().trim_matches('*').trim();
            if value.is_empty() {
                continue;
            }
            let slot = match label.trim().trim_matches('*').trim().to_uppercase().as_str() {
                "SCHEME" => &mut reading.scheme,
                "METRICS" => &mut reading.metrics,
                "DEVICES" => &mut reading.devices,
                "INTERPRETATION" => &mut reading.interpretation,
                _ => continue,
            };
            *slot = value.to_string();
        }
        debug!(?reading, "interpretation parsed");
        reading
    }
}
