//! The personas of the composition pipeline.
//!
//! Each persona owns a clone of the shared [`LlmProvider`](crate::llm::LlmProvider)
//! plus the settings it needs, renders its template through
//! [`PromptBuilder`](crate::prompt::PromptBuilder) and guards the reply
//! against refusals. Provider failures surface as typed errors; only
//! model-produced text is string-matched.
//!
//! | persona       | input                      | output                    |
//! |---------------|----------------------------|---------------------------|
//! | `Researcher`  | style name                 | technical style schema    |
//! | `Poet`        | topic + schema             | [`Draft`]                 |
//! | `Refiner`     | draft + schema             | critique pack (raw)       |
//! | `Interpreter` | final poem + score         | [`Interpretation`]        |

pub mod interpreter;
pub mod poet;
pub mod refiner;
pub mod researcher;

pub use interpreter::{Interpretation, Interpreter};
pub use poet::{Draft, DraftOrigin, EMERGENCY_POEM, Poet};
pub use refiner::{Refiner, fallback_critique};
pub use researcher::Researcher;

/// Preview of model output for log lines.
pub(crate) fn head(text: &str) -> String {
    text.chars().take(50).collect()
}
