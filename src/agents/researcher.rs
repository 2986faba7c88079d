//! Researcher: retrieves archive passages for a style and asks the model to
//! condense them into a metric/technique schema.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::KnowledgeConfig;
#[cfg(feature = "knowledge")]
use crate::knowledge::KnowledgeBase;
use crate::llm::LlmProvider;
use crate::pipeline::PipelineError;
use crate::prompt::{PromptBuilder, RESEARCHER};
use crate::styles::Language;

/// Context used when retrieval finds nothing for the style.
pub const NO_STYLE_FOUND: &str = "No specific style found.";

#[derive(Debug, Clone)]
pub struct Researcher {
    llm: LlmProvider,
    prompts_dir: PathBuf,
    top_k: usize,
    max_context_chars: usize,
    #[cfg(feature = "knowledge")]
    archive: Option<KnowledgeBase>,
}

impl Researcher {
    pub fn new(llm: LlmProvider, prompts_dir: PathBuf, config: &KnowledgeConfig) -> Self {
        Self {
            llm,
            prompts_dir,
            top_k: config.top_k,
            max_context_chars: config.max_context_chars,
            #[cfg(feature = "knowledge")]
            archive: None,
        }
    }

    #[cfg(feature = "knowledge")]
    pub fn with_archive(mut self, archive: KnowledgeBase) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Technical schema for `style`.
    ///
    /// With no archive (or an empty one) a placeholder is returned without
    /// calling the model.
    pub async fn research(&self, style: &str, language: Language) -> Result<String, PipelineError> {
        info!(style, "researcher looking up style");

        let Some(passages) = self.retrieve(style)? else {
            warn!(style, "style archive is empty, skipping analysis");
            return Ok(format!("[NO ARCHIVE] Style archive empty. Style: {style} (no context loaded)"));
        };

        let raw_context = if passages.is_empty() {
            NO_STYLE_FOUND.to_string()
        } else {
            truncate_chars(&passages.join("\n\n"), self.max_context_chars)
        };
        debug!(style, passages = passages.len(), context_chars = raw_context.chars().count(), "context retrieved");

        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(RESEARCHER)
            .var("style", style)
            .var("language", language.as_str())
            .var("raw_context", raw_context)
            .build();

        info!(style, "researcher analysing context");
        Ok(self.llm.complete(&prompt).await?)
    }

    /// Passage texts for `style`, or `None` when there is nothing to search.
    #[cfg(feature = "knowledge")]
    fn retrieve(&self, style: &str) -> Result<Option<Vec<String>>, PipelineError> {
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        let count = archive
            .document_count()
            .map_err(|e| PipelineError::Research(e.to_string()))?;
        if count == 0 {
            return Ok(None);
        }
        let passages = archive
            .search(style, self.top_k)
            .map_err(|e| PipelineError::Research(e.to_string()))?;
        Ok(Some(passages.into_iter().map(|p| p.text).collect()))
    }

    #[cfg(not(feature = "knowledge"))]
    fn retrieve(&self, _style: &str) -> Result<Option<Vec<String>>, PipelineError> {
        Ok(None)
    }
}

/// First `max` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::replay::ReplayProvider;

    fn knowledge_config() -> KnowledgeConfig {
        KnowledgeConfig {
            source_dir: PathBuf::from("knowledge_base"),
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 2,
            max_context_chars: 8000,
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("àèìòù", 3), "àèì");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn no_archive_skips_the_model() {
        let replay = ReplayProvider::new(["unused"]);
        let researcher = Researcher::new(replay.clone().into(), PathBuf::from("config/prompts"), &knowledge_config());
        let context = researcher.research("Ermetismo", Language::Italiano).await.unwrap();
        assert!(context.contains("Ermetismo"));
        assert!(!crate::refusal::is_stage_failure(&context));
        assert_eq!(replay.calls(), 0);
    }

    #[cfg(feature = "knowledge")]
    #[tokio::test]
    async fn archive_passages_reach_the_prompt() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("ermetismo.txt"), "Ermetismo: analogia, frammento, spazio bianco.").unwrap();
        std::fs::write(src.join("futurismo.txt"), "Futurismo: parole in libertà, onomatopee.").unwrap();

        let kb = KnowledgeBase::open(temp.path(), &knowledge_config()).unwrap();
        kb.ingest_dir(&src).unwrap();

        let replay = ReplayProvider::new(["**📐 METRIC RULES**\n- Verse: short"]);
        let researcher = Researcher::new(replay.clone().into(), PathBuf::from("config/prompts"), &knowledge_config())
            .with_archive(kb);
        let schema = researcher.research("Ermetismo", Language::Italiano).await.unwrap();

        assert!(schema.contains("METRIC RULES"));
        let prompts = replay.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("spazio bianco"));
        assert!(prompts[0].contains("TARGET_OBJECT: Ermetismo"));
    }

    #[cfg(feature = "knowledge")]
    #[tokio::test]
    async fn unmatched_style_gets_placeholder_context() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("sonnet.txt"), "Quatrains and tercets.").unwrap();

        let kb = KnowledgeBase::open(temp.path(), &knowledge_config()).unwrap();
        kb.ingest_dir(&src).unwrap();

        let replay = ReplayProvider::new(["schema"]);
        let researcher = Researcher::new(replay.clone().into(), PathBuf::from("config/prompts"), &knowledge_config())
            .with_archive(kb);
        researcher.research("Cyberpunk", Language::English).await.unwrap();
        assert!(replay.prompts()[0].contains(NO_STYLE_FOUND));
    }
}
