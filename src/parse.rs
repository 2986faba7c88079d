//! Extraction of poems, critiques and scores from marker-delimited model output.
//!
//! Persona prompts ask the model to wrap its answer in bracketed markers
//! (`[SECTION_POEM]`, `[RECONSTRUCTED_CONTENT]`, …). Models follow the
//! schema loosely, so every extractor has a fallback and every section is
//! scrubbed of leftover markers before display.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const RECONSTRUCTED_CONTENT: &str = "[RECONSTRUCTED_CONTENT]";
pub const DATA_SYNTHESIS_END: &str = "[/DATA_SYNTHESIS_END]";
pub const SECTION_EVALUATION: &str = "[SECTION_EVALUATION]";
pub const SECTION_POEM: &str = "[SECTION_POEM]";
pub const SECTION_NOTES: &str = "[SECTION_NOTES]";
pub const SECTION_END: &str = "[/SECTION]";
pub const AUDIT_END: &str = "[/AUDIT_END]";

/// Below this length an extracted poem is treated as a bare header.
const MIN_POEM_CHARS: usize = 50;

/// Score returned when the critique carries no readable grade.
pub const DEFAULT_SCORE: f64 = 5.0;

static RECONSTRUCTION_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[/?(?:RECONSTRUCTION_ID|RECONSTRUCTED_CONTENT|DATA_SYNTHESIS_END)\]").expect("RECONSTRUCTION_MARKERS regex should compile")
});
static SECTION_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[/?SECTION(?:_POEM|_EVALUATION|_NOTES)?\]").expect("SECTION_MARKERS regex should compile")
});
static AUDIT_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[/?AUDIT_END\]").expect("AUDIT_MARKERS regex should compile")
});
static POESIA_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^##[ \t]*.*?POESIA.*$").expect("POESIA_HEADER regex should compile")
});
static RECONSTRUCTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^##[ \t]*.*?RECONSTRUCTION.*$").expect("RECONSTRUCTION_HEADER regex should compile")
});
static TECHNICAL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[A-Z0-9_/]{3,}\]").expect("TECHNICAL_TAG regex should compile")
});
static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\**Voto (?:Iniziale|Finale):\**.*").expect("SCORE_LINE regex should compile")
});
static EXPLANATION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\**Spiegazione:\**").expect("EXPLANATION_LABEL regex should compile")
});

static INITIAL_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Voto Iniziale[:\s*]*(\d+(?:\.\d+)?)/10").expect("INITIAL_SCORE regex should compile")
});
static FINAL_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Voto Finale[:\s*]*(\d+(?:\.\d+)?)/10").expect("FINAL_SCORE regex should compile")
});
static ANY_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Punteggio|Voto|Score)[:\s*]*(\d+(?:\.\d+)?)/10").expect("ANY_SCORE regex should compile")
});

/// Which grade to read from a critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Grade of the draft before revision.
    Initial,
    /// Grade of the revised poem.
    Final,
}

/// The three parts of a Refiner reply, already cleaned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSections {
    pub poem: String,
    pub corrections: String,
    pub notes: String,
}

/// Text following `start` up to the earliest of `terminators`.
///
/// With `until_end` the end of input also terminates the section; without it
/// a missing terminator means no section.
fn section<'a>(text: &'a str, start: &str, terminators: &[&str], until_end: bool) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    match terminators.iter().filter_map(|t| rest.find(t)).min() {
        Some(end) => Some(&rest[..end]),
        None if until_end => Some(rest),
        None => None,
    }
}

/// Pull the Poet's verses out of a raw reply.
pub fn extract_draft(raw: &str) -> String {
    let body = section(raw, RECONSTRUCTED_CONTENT, &[DATA_SYNTHESIS_END], true)
        .map(str::trim)
        .unwrap_or(raw);
    clean_draft(body)
}

/// Strip reconstruction markers, headers and stray technical tags from a draft.
pub fn clean_draft(text: &str) -> String {
    scrub(text, &[&*RECONSTRUCTION_HEADER, &*RECONSTRUCTION_MARKERS, &*TECHNICAL_TAG])
}

/// Remove every marker, schema header and score label the Refiner may leave behind.
pub fn clean_technical_noise(text: &str) -> String {
    scrub(
        text,
        &[
            &*POESIA_HEADER,
            &*RECONSTRUCTION_HEADER,
            &*SECTION_MARKERS,
            &*RECONSTRUCTION_MARKERS,
            &*AUDIT_MARKERS,
            &*TECHNICAL_TAG,
            &*SCORE_LINE,
            &*EXPLANATION_LABEL,
        ],
    )
}

/// Apply `patterns` line by line. A line left blank (or a bare `#` heading)
/// by a removal is dropped; every other line, blank ones included, is kept
/// as written so the poem's spacing survives.
fn scrub(text: &str, patterns: &[&Regex]) -> String {
    let mut kept: Vec<String> = Vec::new();
    for line in text.lines() {
        let cleaned = patterns
            .iter()
            .fold(line.to_string(), |acc, re| re.replace_all(&acc, "").into_owned());
        let emptied = cleaned != line
            && cleaned.trim_matches(|c: char| c == '#' || c.is_whitespace()).is_empty();
        if !emptied {
            kept.push(cleaned);
        }
    }
    kept.join("\n").trim().to_string()
}

/// Split a Refiner reply into revised poem, initial critique and final notes.
///
/// `draft` is the poem that was submitted; it stands in for the revision
/// when the reply carries none.
pub fn split_refinement(pack: &str, draft: &str) -> RefinementSections {
    let mut poem = section(pack, SECTION_POEM, &[SECTION_NOTES, SECTION_END, AUDIT_END], true)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| draft.to_string());
    let corrections = section(pack, SECTION_EVALUATION, &[SECTION_POEM], false)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let notes = section(pack, SECTION_NOTES, &[SECTION_END, AUDIT_END], true)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    if pack.contains(RECONSTRUCTED_CONTENT)
        && (poem.chars().count() < MIN_POEM_CHARS || poem.contains("POESIA RIVISTA"))
    {
        let deep = section(
            pack,
            RECONSTRUCTED_CONTENT,
            &[DATA_SYNTHESIS_END, AUDIT_END, SECTION_NOTES, SECTION_EVALUATION],
            true,
        );
        if let Some(deep) = deep {
            poem = deep.trim().to_string();
        }
    }

    RefinementSections {
        poem: clean_technical_noise(&poem),
        corrections: clean_technical_noise(&corrections),
        notes: clean_technical_noise(&notes),
    }
}

/// Read a `N/10` grade from a critique, falling back to any labelled score,
/// then to [`DEFAULT_SCORE`].
pub fn parse_score(text: &str, kind: ScoreKind) -> f64 {
    let specific = match kind {
        ScoreKind::Initial => &*INITIAL_SCORE,
        ScoreKind::Final => &*FINAL_SCORE,
    };
    [specific, &*ANY_SCORE]
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(DEFAULT_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "
[SECTION_EVALUATION]
## 📊 VALUTAZIONE INIZIALE
**Voto Iniziale:** 6/10
**Spiegazione:** Good start but needs work.

[SECTION_POEM]
## ✍️ POESIA RIVISTA
## [RECONSTRUCTION_ID]
[RECONSTRUCTED_CONTENT]
This is the poem text.
It is very nice.
[/AUDIT_END]
[SECTION_NOTES]
## 📊 VALUTAZIONE FINALE
**Voto Finale:** 8/10
**Spiegazione:** Much better now.
[/SECTION]
[/AUDIT_END]
";

    const TRUNCATED: &str = "
[SECTION_EVALUATION]
Analysis...
[SECTION_POEM]
## [RECONSTRUCTION_ID]
[RECONSTRUCTED_CONTENT]
Only the poem here.
[/AUDIT_END]
";

    const NO_SECTIONS: &str = "
I have analyzed the poem.
It is good.
[RECONSTRUCTED_CONTENT]
The Actual Poem
Is Here
[/AUDIT_END]
";

    #[test]
    fn well_formed_reply_splits_cleanly() {
        let s = split_refinement(WELL_FORMED, "ORIGINAL_DRAFT");
        assert_eq!(s.poem, "This is the poem text.\nIt is very nice.");
        assert!(s.corrections.contains("Good start but needs work."));
        assert!(!s.corrections.contains("Voto"));
        assert!(!s.corrections.contains("Spiegazione"));
        assert!(s.notes.contains("Much better now."));
        assert!(!s.notes.contains("8/10"));
    }

    #[test]
    fn truncated_reply_uses_deep_extraction() {
        let s = split_refinement(TRUNCATED, "ORIGINAL_DRAFT");
        assert_eq!(s.poem, "Only the poem here.");
        assert_eq!(s.corrections, "Analysis...");
        assert!(s.notes.is_empty());
    }

    #[test]
    fn reply_without_sections_falls_back_to_content_marker() {
        let s = split_refinement(NO_SECTIONS, "ORIGINAL_DRAFT");
        assert_eq!(s.poem, "The Actual Poem\nIs Here");
        assert!(s.corrections.is_empty());
    }

    #[test]
    fn reply_without_any_marker_keeps_draft() {
        let s = split_refinement("just chatter about the poem", "the sea\nthe salt");
        assert_eq!(s.poem, "the sea\nthe salt");
    }

    #[test]
    fn long_section_poem_is_not_overridden() {
        let pack = "[SECTION_POEM]\nA long enough revised poem line that clearly exceeds the limit\n[RECONSTRUCTED_CONTENT]\nshort\n[SECTION_NOTES]\nok";
        let s = split_refinement(pack, "d");
        assert!(s.poem.starts_with("A long enough revised poem"));
    }

    #[test]
    fn extract_draft_takes_content_block() {
        let raw = "## [RECONSTRUCTION_ID]\n[RECONSTRUCTED_CONTENT]\nSalt on the tongue,\nnight on the pier.\n[/DATA_SYNTHESIS_END]";
        assert_eq!(extract_draft(raw), "Salt on the tongue,\nnight on the pier.");
    }

    #[test]
    fn extract_draft_without_marker_only_cleans() {
        let raw = "## RECONSTRUCTION 42\nLines of foam\n[EXTRA_TAG]";
        assert_eq!(extract_draft(raw), "Lines of foam");
    }

    #[test]
    fn headings_emptied_by_tag_removal_are_dropped() {
        let raw = "## [EMERGENCY_FRAGMENT_00]\nThe machine is quiet.";
        assert_eq!(extract_draft(raw), "The machine is quiet.");
    }

    #[test]
    fn blank_line_runs_in_poems_are_preserved() {
        let pack = "[SECTION_POEM]\nM'illumino\n\n\n\nd'immenso\n[SECTION_NOTES]\nok";
        assert_eq!(split_refinement(pack, "d").poem, "M'illumino\n\n\n\nd'immenso");

        let raw = "[RECONSTRUCTED_CONTENT]\nzang\n\n\n\ntumb tumb\n[/DATA_SYNTHESIS_END]";
        assert_eq!(extract_draft(raw), "zang\n\n\n\ntumb tumb");
    }

    #[test]
    fn only_lines_emptied_by_removal_are_dropped() {
        let text = "## ✍️ POESIA RIVISTA\nprima\n[SECTION_POEM]\n\n\nseconda\n##\nterza";
        assert_eq!(clean_technical_noise(text), "prima\n\n\nseconda\n##\nterza");
    }

    #[test]
    fn lowercase_brackets_survive_cleanup() {
        assert_eq!(clean_technical_noise("[sic] the tide"), "[sic] the tide");
    }

    #[test]
    fn scores_parsed_by_kind() {
        assert_eq!(parse_score(WELL_FORMED, ScoreKind::Initial), 6.0);
        assert_eq!(parse_score(WELL_FORMED, ScoreKind::Final), 8.0);
    }

    #[test]
    fn score_accepts_decimals_and_case() {
        assert_eq!(parse_score("voto finale: 7.5/10", ScoreKind::Final), 7.5);
    }

    #[test]
    fn score_falls_back_to_generic_then_default() {
        assert_eq!(parse_score("Score: 9/10", ScoreKind::Final), 9.0);
        assert_eq!(parse_score("**Punteggio** 4/10", ScoreKind::Initial), 4.0);
        assert_eq!(parse_score("no grade here", ScoreKind::Initial), DEFAULT_SCORE);
    }
}
