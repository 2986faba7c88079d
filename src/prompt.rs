//! Template-based prompt builder for the personas.
//!
//! Each persona has one plain-text template under `config/prompts/`. A copy
//! of every template is compiled into the binary, so a missing or unreadable
//! file falls back to the built-in text instead of failing the run.
//!
//! Variable substitution uses `{{key}}` syntax and is applied in a single
//! pass at [`build()`](PromptBuilder::build) time: substituted values are
//! never rescanned, so a poem containing braces cannot inject variables.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &str = "\n\n";

pub const RESEARCHER: &str = "researcher.txt";
pub const POET: &str = "poet.txt";
pub const REFINER: &str = "refiner.txt";
pub const INTERPRETER: &str = "interpreter.txt";

/// Compiled-in copy of a persona template.
pub fn builtin_template(filename: &str) -> Option<&'static str> {
    match filename {
        RESEARCHER => Some(include_str!("../config/prompts/researcher.txt")),
        POET => Some(include_str!("../config/prompts/poet.txt")),
        REFINER => Some(include_str!("../config/prompts/refiner.txt")),
        INTERPRETER => Some(include_str!("../config/prompts/interpreter.txt")),
        _ => None,
    }
}

/// Fluent builder that assembles a prompt from template files.
///
/// ```rust
/// use palimpsest::prompt::{PromptBuilder, POET};
///
/// let prompt = PromptBuilder::new("config/prompts")
///     .template(POET)
///     .var("topic", "The silence of the sea")
///     .build();
/// assert!(prompt.contains("The silence of the sea"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append the template `filename`, read from the prompts directory or,
    /// failing that, from the built-in copy. Unknown names with no file are
    /// skipped.
    pub fn template(mut self, filename: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(_) => {
                tracing::debug!("prompt: '{}' not found, using built-in template", path.display());
                builtin_template(filename).map(str::to_string)
            }
        };
        if let Some(text) = text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                self.parts.push(trimmed.to_string());
            }
        }
        self
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register `{{key}}` → `value` substitution pairs applied at build time.
    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    /// Register a single variable.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all parts with blank lines and substitute variables.
    /// Placeholders with no registered value are left as they are.
    pub fn build(self) -> String {
        render(&self.parts.join(SEPARATOR), &self.vars)
    }
}

fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = &after[..close];
                match vars.get(key.trim()) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
