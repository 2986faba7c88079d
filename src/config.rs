//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `-f`), then applies `PALIMPSEST_WORK_DIR` and
//! `PALIMPSEST_LOG_LEVEL` env overrides. The LLM key comes from
//! `FREELLM_API_KEY` and is never read from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// FreeLLM chat endpoint configuration (`[llm.freellm]`).
#[derive(Debug, Clone)]
pub struct FreeLlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Initial wait before the second attempt.
    pub retry_delay_seconds: u64,
    /// Added to the wait after an HTTP 429.
    pub rate_limit_backoff_seconds: u64,
    /// Added to the wait after any other failure.
    pub error_backoff_seconds: u64,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"dummy"`, `"freellm"`, `"openai"`).
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    pub freellm: FreeLlmConfig,
    pub openai: OpenAiConfig,
}

/// Style archive configuration (`[knowledge]`).
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Directory of `*.txt` style documents ingested on first use.
    pub source_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks retrieved per style query.
    pub top_k: usize,
    /// Retrieved context is cut to this many characters.
    pub max_context_chars: usize,
}

/// Persona pipeline tuning (`[pipeline]`).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub draft_attempts: u32,
    pub refine_attempts: u32,
    /// Upper bound on critique/revision rounds.
    pub max_rounds: u32,
    /// A round whose final score reaches this value ends the loop.
    pub score_threshold: f64,
    pub min_draft_chars: usize,
    pub min_critique_chars: usize,
    /// Optional override directory for prompt templates.
    pub prompts_dir: PathBuf,
    /// Ask the LLM for a reading of the final poem.
    pub interpreter: bool,
}

/// Console rendering options (`[render]`).
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub typewriter: bool,
    pub typewriter_delay_ms: u64,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Working directory for the knowledge index (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// `log_level` came from `PALIMPSEST_LOG_LEVEL`; it then outranks `RUST_LOG`.
    pub log_level_from_env: bool,
    pub log_file: Option<PathBuf>,
    pub llm: LlmConfig,
    /// From `FREELLM_API_KEY`; `None` for the dummy provider or keyless servers.
    pub llm_api_key: Option<String>,
    pub knowledge: KnowledgeConfig,
    pub pipeline: PipelineConfig,
    pub render: RenderConfig,
}

impl Config {
    /// Built-in configuration used when no config file exists.
    /// Dummy LLM, no API key.
    pub fn builtin(work_dir: &Path) -> Self {
        let raw = RawConfig::default();
        resolve(raw, work_dir.to_path_buf(), "info".into(), None)
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    knowledge: RawKnowledge,
    #[serde(default)]
    pipeline: RawPipeline,
    #[serde(default)]
    render: RawRender,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    freellm: RawFreeLlm,
    #[serde(default)]
    openai: RawOpenAi,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            freellm: RawFreeLlm::default(),
            openai: RawOpenAi::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawFreeLlm {
    #[serde(default = "default_freellm_endpoint")]
    endpoint: String,
    #[serde(default = "default_freellm_model")]
    model: String,
    #[serde(default = "default_freellm_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_three")]
    max_retries: u32,
    #[serde(default = "default_retry_delay")]
    retry_delay_seconds: u64,
    #[serde(default = "default_rate_limit_backoff")]
    rate_limit_backoff_seconds: u64,
    #[serde(default = "default_error_backoff")]
    error_backoff_seconds: u64,
}

impl Default for RawFreeLlm {
    fn default() -> Self {
        Self {
            endpoint: default_freellm_endpoint(),
            model: default_freellm_model(),
            timeout_seconds: default_freellm_timeout(),
            max_retries: default_three(),
            retry_delay_seconds: default_retry_delay(),
            rate_limit_backoff_seconds: default_rate_limit_backoff(),
            error_backoff_seconds: default_error_backoff(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_freellm_timeout")]
    timeout_seconds: u64,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_freellm_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct RawKnowledge {
    #[serde(default = "default_source_dir")]
    source_dir: String,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_max_context_chars")]
    max_context_chars: usize,
}

impl Default for RawKnowledge {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default = "default_three")]
    draft_attempts: u32,
    #[serde(default = "default_three")]
    refine_attempts: u32,
    #[serde(default = "default_three")]
    max_rounds: u32,
    #[serde(default = "default_score_threshold")]
    score_threshold: f64,
    #[serde(default = "default_min_draft_chars")]
    min_draft_chars: usize,
    #[serde(default = "default_min_critique_chars")]
    min_critique_chars: usize,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    #[serde(default)]
    interpreter: bool,
}

impl Default for RawPipeline {
    fn default() -> Self {
        Self {
            draft_attempts: default_three(),
            refine_attempts: default_three(),
            max_rounds: default_three(),
            score_threshold: default_score_threshold(),
            min_draft_chars: default_min_draft_chars(),
            min_critique_chars: default_min_critique_chars(),
            prompts_dir: default_prompts_dir(),
            interpreter: false,
        }
    }
}

#[derive(Deserialize)]
struct RawRender {
    #[serde(default = "default_true")]
    typewriter: bool,
    #[serde(default = "default_typewriter_delay")]
    typewriter_delay_ms: u64,
}

impl Default for RawRender {
    fn default() -> Self {
        Self { typewriter: true, typewriter_delay_ms: default_typewriter_delay() }
    }
}

fn default_app_name() -> String { "palimpsest".to_string() }
fn default_work_dir() -> String { "~/.palimpsest".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_freellm_endpoint() -> String { "https://apifreellm.com/api/v1/chat".to_string() }
fn default_freellm_model() -> String { "apifreellm".to_string() }
fn default_freellm_timeout() -> u64 { 60 }
fn default_retry_delay() -> u64 { 10 }
fn default_rate_limit_backoff() -> u64 { 10 }
fn default_error_backoff() -> u64 { 5 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.9 }
fn default_source_dir() -> String { "knowledge_base".to_string() }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 100 }
fn default_top_k() -> usize { 2 }
fn default_max_context_chars() -> usize { 8000 }
fn default_score_threshold() -> f64 { 8.0 }
fn default_min_draft_chars() -> usize { 20 }
fn default_min_critique_chars() -> usize { 50 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_typewriter_delay() -> u64 { 20 }
fn default_three() -> u32 { 3 }
fn default_true() -> bool { true }

// ── loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path` or `config/default.toml`, then apply env overrides.
/// When no path is given and the default file is missing, built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("PALIMPSEST_WORK_DIR").ok();
    let log_level_override = env::var("PALIMPSEST_LOG_LEVEL").ok();

    let mut config = match config_path {
        Some(path) => load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_from(
            Path::new(DEFAULT_CONFIG_PATH),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )?,
        None => {
            let raw = RawConfig::default();
            let work_dir = expand_home(work_dir_override.as_deref().unwrap_or(&raw.app.work_dir));
            let level = log_level_override.clone().unwrap_or_else(|| raw.app.log_level.clone());
            let mut config = resolve(raw, work_dir, level, None);
            config.log_level_from_env = log_level_override.is_some();
            config
        }
    };

    config.llm_api_key = env::var("FREELLM_API_KEY").ok().filter(|k| !k.trim().is_empty());
    Ok(config)
}

/// Internal loader; accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&text)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let work_dir = expand_home(work_dir_override.unwrap_or(&parsed.app.work_dir));
    let log_level = log_level_override.unwrap_or(&parsed.app.log_level).to_string();
    let log_file = parsed.app.log_file.as_deref().map(expand_home);

    let mut config = resolve(parsed, work_dir, log_level, log_file);
    config.log_level_from_env = log_level_override.is_some();
    validate(&config)?;
    Ok(config)
}

fn resolve(raw: RawConfig, work_dir: PathBuf, log_level: String, log_file: Option<PathBuf>) -> Config {
    Config {
        app_name: raw.app.name,
        work_dir,
        log_level,
        log_level_from_env: false,
        log_file,
        llm: LlmConfig {
            provider: raw.llm.provider,
            freellm: FreeLlmConfig {
                endpoint: raw.llm.freellm.endpoint,
                model: raw.llm.freellm.model,
                timeout_seconds: raw.llm.freellm.timeout_seconds,
                max_retries: raw.llm.freellm.max_retries,
                retry_delay_seconds: raw.llm.freellm.retry_delay_seconds,
                rate_limit_backoff_seconds: raw.llm.freellm.rate_limit_backoff_seconds,
                error_backoff_seconds: raw.llm.freellm.error_backoff_seconds,
            },
            openai: OpenAiConfig {
                api_base_url: raw.llm.openai.api_base_url,
                model: raw.llm.openai.model,
                temperature: raw.llm.openai.temperature,
                timeout_seconds: raw.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
        knowledge: KnowledgeConfig {
            source_dir: expand_home(&raw.knowledge.source_dir),
            chunk_size: raw.knowledge.chunk_size,
            chunk_overlap: raw.knowledge.chunk_overlap,
            top_k: raw.knowledge.top_k,
            max_context_chars: raw.knowledge.max_context_chars,
        },
        pipeline: PipelineConfig {
            draft_attempts: raw.pipeline.draft_attempts,
            refine_attempts: raw.pipeline.refine_attempts,
            max_rounds: raw.pipeline.max_rounds,
            score_threshold: raw.pipeline.score_threshold,
            min_draft_chars: raw.pipeline.min_draft_chars,
            min_critique_chars: raw.pipeline.min_critique_chars,
            prompts_dir: expand_home(&raw.pipeline.prompts_dir),
            interpreter: raw.pipeline.interpreter,
        },
        render: RenderConfig {
            typewriter: raw.render.typewriter,
            typewriter_delay_ms: raw.render.typewriter_delay_ms,
        },
    }
}

fn validate(config: &Config) -> Result<(), AppError> {
    crate::logger::parse_level(&config.log_level)
        .map_err(|e| AppError::Config(format!("app.log_level: {e}")))?;
    let k = &config.knowledge;
    if k.chunk_size == 0 {
        return Err(AppError::Config("knowledge.chunk_size must be > 0".into()));
    }
    if k.chunk_overlap >= k.chunk_size {
        return Err(AppError::Config(format!(
            "knowledge.chunk_overlap ({}) must be smaller than chunk_size ({})",
            k.chunk_overlap, k.chunk_size
        )));
    }
    let p = &config.pipeline;
    if p.draft_attempts == 0 || p.refine_attempts == 0 || p.max_rounds == 0 {
        return Err(AppError::Config(
            "pipeline attempts and max_rounds must be at least 1".into(),
        ));
    }
    if !(0.0..=10.0).contains(&p.score_threshold) {
        return Err(AppError::Config(format!(
            "pipeline.score_threshold must be within 0..=10, got {}",
            p.score_threshold
        )));
    }
    if config.llm.freellm.max_retries == 0 {
        return Err(AppError::Config("llm.freellm.max_retries must be at least 1".into()));
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
work_dir = "~/.palimpsest-test"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.app_name, "palimpsest");
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.llm.freellm.endpoint, "https://apifreellm.com/api/v1/chat");
        assert_eq!(cfg.llm.freellm.max_retries, 3);
        assert_eq!(cfg.knowledge.chunk_size, 1000);
        assert_eq!(cfg.knowledge.chunk_overlap, 100);
        assert_eq!(cfg.knowledge.top_k, 2);
        assert_eq!(cfg.pipeline.max_rounds, 3);
        assert_eq!(cfg.pipeline.score_threshold, 8.0);
        assert!(!cfg.pipeline.interpreter);
    }

    #[test]
    fn parse_provider_sections() {
        let f = write_toml(
            r#"
[llm]
default = "freellm"

[llm.freellm]
endpoint = "http://127.0.0.1:9999/chat"
retry_delay_seconds = 0

[pipeline]
max_rounds = 1
score_threshold = 7.5
interpreter = true
"#,
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.llm.provider, "freellm");
        assert_eq!(cfg.llm.freellm.endpoint, "http://127.0.0.1:9999/chat");
        assert_eq!(cfg.llm.freellm.retry_delay_seconds, 0);
        assert_eq!(cfg.llm.freellm.model, "apifreellm");
        assert_eq!(cfg.pipeline.max_rounds, 1);
        assert_eq!(cfg.pipeline.score_threshold, 7.5);
        assert!(cfg.pipeline.interpreter);
    }

    #[test]
    fn overlap_not_smaller_than_chunk_rejected() {
        let f = write_toml("[knowledge]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_rounds_rejected() {
        let f = write_toml("[pipeline]\nmax_rounds = 0\n");
        assert!(load_from(f.path(), None, None).is_err());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let f = write_toml("[pipeline]\nscore_threshold = 11.0\n");
        assert!(load_from(f.path(), None, None).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.palimpsest");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".palimpsest"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_applied() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/palimpsest-override"), Some("debug")).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/palimpsest-override"));
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.log_level_from_env);

        let plain = load_from(f.path(), None, None).unwrap();
        assert!(!plain.log_level_from_env);
    }

    #[test]
    fn shipped_default_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let cfg = load_from(&path, Some("/tmp/palimpsest"), None).unwrap();
        assert_eq!(cfg.llm.provider, "freellm");
        assert_eq!(cfg.pipeline.prompts_dir, PathBuf::from("config/prompts"));
        assert!(cfg.render.typewriter);
    }

    #[test]
    fn bad_log_level_rejected() {
        let f = write_toml("[app]\nlog_level = \"loud\"\n");
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn builtin_has_no_key_and_dummy_provider() {
        let cfg = Config::builtin(Path::new("/tmp/x"));
        assert_eq!(cfg.llm.provider, "dummy");
        assert!(cfg.llm_api_key.is_none());
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/x"));
    }
}
