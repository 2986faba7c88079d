//! Detection of model refusals and self-descriptions in generated text.
//!
//! The chat endpoint sometimes answers a creative prompt with an apology or
//! a description of itself. These checks decide whether a reply is usable.

/// Openers that mark a draft as a refusal.
const REFUSAL_OPENERS: &[&str] = &[
    "I'm sorry",
    "I cannot",
    "As an AI",
    "I am unable",
    "Want to talk about",
    "I'm not able",
    "I can't",
    "Sorry",
    "I'd love to help",
    "I'd really like to help",
    "It seems",
    "I'm LLaMA",
    "I am LLaMA",
    "I'm an AI",
];

/// Lowercase keywords that betray a model talking about itself.
const SELF_REFERENCE_KEYWORDS: &[&str] = &[
    "i'm llama",
    "i am llama",
    "developed by meta",
    "language model",
    "off-limits",
    "cannot help",
    "ai assistant",
    "openai",
    "gpt-3",
    "gpt-4",
    "anthropic",
    "mistral",
    "artificial intelligence",
];

/// Extra keywords applied to critiques, which are never apologetic on purpose.
const CRITIQUE_EXTRA_KEYWORDS: &[&str] = &["i cannot", "i'm sorry"];

/// Case-sensitive markers that abort the pipeline when found in a stage output.
const STAGE_FAILURE_MARKERS: &[&str] = &[
    "ERROR",
    "not able to discuss",
    "I'm sorry",
    "I am LLaMA",
    "happy to chat about other",
];

pub fn is_draft_refusal(text: &str) -> bool {
    let trimmed = text.trim();
    if REFUSAL_OPENERS.iter().any(|o| trimmed.starts_with(o)) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if SELF_REFERENCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    lower.contains("i'm ") && lower.contains("model")
}

pub fn is_critique_refusal(text: &str) -> bool {
    let lower = text.to_lowercase();
    SELF_REFERENCE_KEYWORDS
        .iter()
        .chain(CRITIQUE_EXTRA_KEYWORDS.iter())
        .any(|k| lower.contains(k))
}

/// Returns the first failure marker found in `text`, if any.
pub fn stage_failure_marker(text: &str) -> Option<&'static str> {
    STAGE_FAILURE_MARKERS.iter().copied().find(|m| text.contains(m))
}

pub fn is_stage_failure(text: &str) -> bool {
    stage_failure_marker(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_refusal_detected() {
        assert!(is_draft_refusal("  I'm sorry, but I can't write that."));
        assert!(is_draft_refusal("Sorry!"));
        assert!(is_draft_refusal("It seems you want a poem"));
    }

    #[test]
    fn self_reference_anywhere_detected() {
        assert!(is_draft_refusal("Waves rise.\nI was developed by Meta to assist."));
        assert!(is_draft_refusal("The ARTIFICIAL INTELLIGENCE dreams of tides"));
    }

    #[test]
    fn im_plus_model_detected() {
        assert!(is_draft_refusal("Hello, I'm a friendly model of verse"));
    }

    #[test]
    fn genuine_poem_passes() {
        let poem = "## [RECONSTRUCTION_ID]\nThe harbour sleeps beneath a salt-grey moon,\nand oars forget the water's patient tune.";
        assert!(!is_draft_refusal(poem));
    }

    #[test]
    fn critique_extra_keywords() {
        assert!(is_critique_refusal("Unfortunately I cannot evaluate this."));
        assert!(!is_draft_refusal("Unfortunately I cannot evaluate this."));
        assert!(!is_critique_refusal("**Voto Iniziale:** 6/10"));
    }

    #[test]
    fn stage_failure_is_case_sensitive() {
        assert_eq!(stage_failure_marker("[RAG ERROR] db locked"), Some("ERROR"));
        assert!(is_stage_failure("I'd be happy to chat about other topics"));
        assert!(!is_stage_failure("an error of judgement in the third stanza"));
    }
}
