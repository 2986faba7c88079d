//! Composition pipeline: Researcher → Poet → Refiner rounds → Interpreter.
//!
//! All LLM calls run sequentially on the caller's task. State is threaded
//! through as plain strings; nothing outlives a [`Pipeline::compose`] call
//! except what the caller keeps in a [`Session`].
//!
//! The refinement stage is a bounded loop: each round grades and rewrites
//! the current poem, and the rewrite becomes the next round's input until a
//! round's final grade reaches `score_threshold` or `max_rounds` is spent.
//! The best-graded round wins; on a tie the later round is preferred.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::{Draft, DraftOrigin, Interpretation, Interpreter, Poet, Refiner, Researcher, head};
use crate::config::Config;
#[cfg(feature = "knowledge")]
use crate::knowledge::KnowledgeBase;
use crate::llm::{LlmProvider, ProviderError};
use crate::parse::{ScoreKind, extract_draft, parse_score, split_refinement};
use crate::refusal::stage_failure_marker;
use crate::styles::{CreativeControls, Language};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("research failed: {0}")]
    Research(String),

    #[error("drafting failed: {0}")]
    Draft(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// What to write.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionRequest {
    pub topic: String,
    pub style: String,
    pub language: Language,
    pub controls: CreativeControls,
}

/// One critique/rewrite cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefinementRound {
    /// 1-based.
    pub round: u32,
    /// Poem submitted to the Refiner.
    pub input: String,
    /// Revised poem.
    pub poem: String,
    pub corrections: String,
    pub notes: String,
    pub initial_score: f64,
    pub final_score: f64,
}

/// Everything produced for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub style: String,
    pub language: Language,
    pub topic: String,
    pub controls: CreativeControls,
    pub style_context: String,
    /// Cleaned first draft.
    pub draft: String,
    pub draft_origin: DraftOrigin,
    pub final_poem: String,
    /// Critique of the first draft.
    pub corrections: String,
    /// Notes of the winning round.
    pub final_notes: String,
    /// Grade of the first draft.
    pub initial_score: f64,
    /// Grade of the winning revision.
    pub final_score: f64,
    pub rounds: Vec<RefinementRound>,
    pub interpretation: Interpretation,
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
}

pub struct Pipeline {
    researcher: Researcher,
    poet: Poet,
    refiner: Refiner,
    interpreter: Interpreter,
    max_rounds: u32,
    score_threshold: f64,
}

impl Pipeline {
    pub fn new(llm: LlmProvider, config: &Config) -> Self {
        let p = &config.pipeline;
        Self {
            researcher: Researcher::new(llm.clone(), p.prompts_dir.clone(), &config.knowledge),
            poet: Poet::new(llm.clone(), p),
            refiner: Refiner::new(llm.clone(), p),
            interpreter: Interpreter::new(llm, p.prompts_dir.clone(), p.interpreter),
            max_rounds: p.max_rounds.max(1),
            score_threshold: p.score_threshold,
        }
    }

    /// Attach the style archive used by the Researcher.
    #[cfg(feature = "knowledge")]
    pub fn with_archive(mut self, archive: KnowledgeBase) -> Self {
        self.researcher = self.researcher.with_archive(archive);
        self
    }

    pub async fn compose(&self, request: &CompositionRequest) -> Result<Composition, PipelineError> {
        let CompositionRequest { topic, style, language, controls } = request;
        let language = *language;
        info!(%style, %language, topic = %topic, "composition started");

        let style_context = self.researcher.research(style, language).await?;
        if let Some(marker) = stage_failure_marker(&style_context) {
            return Err(PipelineError::Research(format!(
                "context contains '{marker}': {}",
                head(&style_context)
            )));
        }

        let Draft { text: raw_draft, origin } = self
            .poet
            .write_draft(topic, &style_context, style, language, controls)
            .await?;
        if let Some(marker) = stage_failure_marker(&raw_draft) {
            return Err(PipelineError::Draft(format!("draft contains '{marker}': {}", head(&raw_draft))));
        }
        let draft = extract_draft(&raw_draft);
        debug!(chars = draft.chars().count(), ?origin, "draft ready");

        let rounds = self.refine(&draft, &style_context, style, language, controls).await?;
        let (first, best) = match (rounds.first(), best_round(&rounds)) {
            (Some(first), Some(best)) => (first, best),
            _ => return Err(PipelineError::Draft("no refinement round completed".into())),
        };

        let interpretation = self
            .interpreter
            .interpret(&best.poem, style, language, best.final_score)
            .await;

        info!(
            rounds = rounds.len(),
            best_round = best.round,
            initial_score = first.initial_score,
            final_score = best.final_score,
            "composition finished"
        );

        Ok(Composition {
            style: style.clone(),
            language,
            topic: topic.clone(),
            controls: *controls,
            style_context,
            draft,
            draft_origin: origin,
            final_poem: best.poem.clone(),
            corrections: first.corrections.clone(),
            final_notes: best.notes.clone(),
            initial_score: first.initial_score,
            final_score: best.final_score,
            interpretation,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            rounds,
        })
    }

    async fn refine(
        &self,
        draft: &str,
        style_context: &str,
        style: &str,
        language: Language,
        controls: &CreativeControls,
    ) -> Result<Vec<RefinementRound>, PipelineError> {
        let mut rounds = Vec::new();
        let mut current = draft.to_string();

        for round in 1..=self.max_rounds {
            let pack = self
                .refiner
                .evaluate_and_refine(&current, style_context, style, language, controls)
                .await?;
            let sections = split_refinement(&pack, &current);
            let initial_score = parse_score(&pack, ScoreKind::Initial);
            let final_score = parse_score(&pack, ScoreKind::Final);
            let poem = if sections.poem.is_empty() {
                warn!(round, "revision came back empty, keeping the submitted poem");
                current.clone()
            } else {
                sections.poem
            };
            info!(round, initial_score, final_score, "refinement round done");

            let reached = final_score >= self.score_threshold;
            rounds.push(RefinementRound {
                round,
                input: std::mem::replace(&mut current, poem.clone()),
                poem,
                corrections: sections.corrections,
                notes: sections.notes,
                initial_score,
                final_score,
            });
            if reached {
                debug!(round, threshold = self.score_threshold, "score threshold reached");
                break;
            }
        }
        Ok(rounds)
    }
}

/// Highest final grade; the later round wins a tie.
fn best_round(rounds: &[RefinementRound]) -> Option<&RefinementRound> {
    rounds
        .iter()
        .max_by(|a, b| a.final_score.total_cmp(&b.final_score))
}

/// One entry of the interactive history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub style: String,
    pub text: String,
    pub timestamp: String,
}

/// In-memory history of an interactive run. Never persisted.
#[derive(Debug, Default)]
pub struct Session {
    history: Vec<HistoryEntry>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, composition: &Composition) {
        self.history.push(HistoryEntry {
            style: composition.style.clone(),
            text: composition.final_poem.clone(),
            timestamp: composition.timestamp.clone(),
        });
    }

    /// Oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(n: u32, score: f64) -> RefinementRound {
        RefinementRound {
            round: n,
            input: String::new(),
            poem: format!("poem {n}"),
            corrections: String::new(),
            notes: String::new(),
            initial_score: 5.0,
            final_score: score,
        }
    }

    #[test]
    fn best_round_prefers_later_on_tie() {
        let rounds = vec![round(1, 7.0), round(2, 7.5), round(3, 7.5)];
        assert_eq!(best_round(&rounds).unwrap().round, 3);
    }

    #[test]
    fn best_round_picks_highest() {
        let rounds = vec![round(1, 8.0), round(2, 6.0)];
        assert_eq!(best_round(&rounds).unwrap().round, 1);
        assert!(best_round(&[]).is_none());
    }

    #[test]
    fn research_error_display() {
        let e = PipelineError::Research("context contains 'ERROR'".into());
        assert_eq!(e.to_string(), "research failed: context contains 'ERROR'");
    }
}
