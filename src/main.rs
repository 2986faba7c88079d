//! Palimpsest: command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > `PALIMPSEST_LOG_LEVEL` > `RUST_LOG` > config)
//!   5. Init logger once
//!   6. Open the style archive (ingesting `knowledge.source_dir` on first run);
//!      a broken archive is logged and the run continues without context
//!   7. Build the LLM provider and the persona pipeline
//!   8. Compose once, or loop over topics with `-i`

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use palimpsest::config::{self, Config};
use palimpsest::error::AppError;
use palimpsest::llm::providers;
use palimpsest::logger;
use palimpsest::pipeline::{CompositionRequest, Pipeline, Session};
use palimpsest::render::{self, Renderer};
use palimpsest::styles::{self, CreativeControls, Language};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }

    let language = match &args.language {
        Some(l) => l.parse::<Language>()?,
        None => Language::default(),
    };
    if args.list_styles {
        print_styles(language);
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let (effective_log_level, prefer_level) = log_level_choice(args.log_level, &config);
    logger::init(effective_log_level, prefer_level, config.log_file.as_deref())?;

    info!(
        app = %config.app_name,
        work_dir = %config.work_dir.display(),
        provider = %config.llm.provider,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = args.interactive,
        "config loaded"
    );

    let pipeline = build_pipeline(&config, &args)?;
    let Some(pipeline) = pipeline else {
        return Ok(());
    };

    let default = CreativeControls::default();
    let controls = CreativeControls::new(
        args.adherence.unwrap_or(default.adherence),
        args.originality.unwrap_or(default.originality),
        args.complexity.unwrap_or(default.complexity),
    )?;
    let style = resolve_style(args.style.as_deref(), language);
    let renderer = Renderer::new(&config.render);

    if args.interactive {
        return interactive(&pipeline, &renderer, &args, style, language, controls).await;
    }

    let request = CompositionRequest {
        topic: args.topic.clone().unwrap_or_else(|| language.default_topic().to_string()),
        style,
        language,
        controls,
    };
    let composition = pipeline.compose(&request).await?;

    if args.json {
        println!("{}", render::to_json(&composition)?);
    } else {
        renderer.print(&render::report(&composition, args.insights)).await?;
    }
    if let Some(path) = &args.output {
        save_final_poem(path, &composition.final_poem, &mut std::io::stderr())?;
    }
    Ok(())
}

/// Level to initialise logging with, and whether it outranks `RUST_LOG`.
fn log_level_choice<'a>(cli: Option<&'static str>, config: &'a Config) -> (&'a str, bool) {
    match cli {
        Some(level) => (level, true),
        None => (config.log_level.as_str(), config.log_level_from_env),
    }
}

/// Save the poem and report where it went on `status` (stderr in both modes,
/// so stdout carries only the poem or the JSON).
fn save_final_poem(path: &Path, poem: &str, status: &mut impl Write) -> Result<(), AppError> {
    let written = render::save_poem(path, poem)?;
    writeln!(status, "💾 saved {}", written.display())?;
    Ok(())
}

/// Build the pipeline, attaching the style archive when it opens. Returns
/// `None` when the run was an `--ingest` only.
#[cfg(feature = "knowledge")]
fn build_pipeline(config: &Config, args: &CliArgs) -> Result<Option<Pipeline>, AppError> {
    use palimpsest::knowledge::KnowledgeBase;

    if let Some(dir) = &args.ingest {
        let archive = KnowledgeBase::open(&config.work_dir, &config.knowledge)?;
        let report = archive.ingest_dir(dir)?;
        println!(
            "✓ ingested {}: {} files, {} new documents, {} chunks",
            dir.display(),
            report.files,
            report.new_documents,
            report.chunks
        );
        return Ok(None);
    }

    let llm = providers::build(&config.llm, config.llm_api_key.clone())?;
    info!(provider = llm.name(), "llm provider ready");
    let pipeline = Pipeline::new(llm, config);
    Ok(Some(match open_archive(config) {
        Some(archive) => pipeline.with_archive(archive),
        None => pipeline,
    }))
}

/// The style archive, loaded from `knowledge.source_dir` on first use.
/// `None` when the index cannot be opened.
#[cfg(feature = "knowledge")]
fn open_archive(config: &Config) -> Option<palimpsest::knowledge::KnowledgeBase> {
    let archive = match palimpsest::knowledge::KnowledgeBase::open(&config.work_dir, &config.knowledge) {
        Ok(archive) => archive,
        Err(e) => {
            warn!(error = %e, "style archive unavailable, continuing without context");
            return None;
        }
    };
    match archive.ensure_loaded(&config.knowledge.source_dir) {
        Ok(Some(report)) => info!(documents = report.new_documents, chunks = report.chunks, "style archive built"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "style archive not loaded, continuing without context"),
    }
    Some(archive)
}

#[cfg(not(feature = "knowledge"))]
fn build_pipeline(config: &Config, args: &CliArgs) -> Result<Option<Pipeline>, AppError> {
    if args.ingest.is_some() {
        return Err(AppError::Usage("--ingest needs the `knowledge` feature".into()));
    }
    let llm = providers::build(&config.llm, config.llm_api_key.clone())?;
    info!(provider = llm.name(), "llm provider ready");
    Ok(Some(Pipeline::new(llm, config)))
}

/// Canonical catalog name for `name`; unknown names pass through with a
/// warning and get the generic rules.
fn resolve_style(name: Option<&str>, language: Language) -> String {
    match name {
        Some(name) => match styles::canonical_style(name) {
            Some(canonical) => canonical.to_string(),
            None => {
                warn!(style = name, "style not in catalog, using generic rules");
                name.trim().to_string()
            }
        },
        None => styles::styles_for(language)[0].to_string(),
    }
}

async fn interactive(
    pipeline: &Pipeline,
    renderer: &Renderer,
    args: &CliArgs,
    mut style: String,
    language: Language,
    controls: CreativeControls,
) -> Result<(), AppError> {
    let mut session = Session::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("💡 Enter a topic (empty for \"{}\"). Commands: history, styles, style <name>, quit", language.default_topic());
    loop {
        stdout.write_all(format!("[{style}] topic> ").as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "quit" | "exit" | "/quit" => break,
            "history" => {
                if session.history().is_empty() {
                    println!("(no poems yet)");
                }
                for entry in render::history_lines(session.history()) {
                    println!("{entry}");
                }
                continue;
            }
            "styles" => {
                print_styles(language);
                continue;
            }
            _ => {}
        }
        if let Some(name) = input.strip_prefix("style ") {
            style = resolve_style(Some(name), language);
            println!("style → {style}");
            continue;
        }

        let topic = if input.is_empty() { language.default_topic() } else { input };
        let request = CompositionRequest { topic: topic.to_string(), style: style.clone(), language, controls };
        match pipeline.compose(&request).await {
            Ok(composition) => {
                renderer.print(&render::report(&composition, args.insights)).await?;
                if let Some(path) = &args.output {
                    save_final_poem(path, &composition.final_poem, &mut std::io::stderr())?;
                }
                session.record(&composition);
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn print_styles(language: Language) {
    println!("Styles ({language}):");
    for style in styles::styles_for(language) {
        println!("  {style}");
    }
}

fn print_help() {
    println!("Usage: palimpsest [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
    println!("  -s, --style <NAME>         Poetic movement (see --list-styles)");
    println!("  -t, --topic <TEXT>         Theme of the poem");
    println!("  -l, --language <LANG>      English | Italiano (default: English)");
    println!("      --adherence <1-10>     Stylistic rigour (default: 8)");
    println!("      --originality <1-10>   Creativity (default: 6)");
    println!("      --complexity <1-10>    Lexical density (default: 7)");
    println!("      --list-styles          List movements for the language and exit");
    println!("      --ingest <DIR>         Index *.txt style documents from DIR and exit");
    println!("      --json                 Print the full composition as JSON");
    println!("  -o, --output <PATH>        Save the final poem (directory → {})", render::DEFAULT_POEM_FILE);
    println!("      --insights             Show draft vs revision, style context and analysis");
    println!("  -i, --interactive          Prompt for topics in a loop");
}

#[derive(Debug, Default)]
struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    style: Option<String>,
    topic: Option<String>,
    language: Option<String>,
    adherence: Option<u8>,
    originality: Option<u8>,
    complexity: Option<u8>,
    list_styles: bool,
    ingest: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
    insights: bool,
    interactive: bool,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> Result<CliArgs, AppError>
where
    I: IntoIterator<Item = String>,
{
    let mut verbosity = 0u8;
    let mut cli = CliArgs::default();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => cli.help = true,
            "-i" | "--interactive" => cli.interactive = true,
            "-f" | "--config" => cli.config_path = Some(value(&mut iter, &arg)?),
            "-s" | "--style" => cli.style = Some(value(&mut iter, &arg)?),
            "-t" | "--topic" => cli.topic = Some(value(&mut iter, &arg)?),
            "-l" | "--language" => cli.language = Some(value(&mut iter, &arg)?),
            "--adherence" => cli.adherence = Some(level(&mut iter, &arg)?),
            "--originality" => cli.originality = Some(level(&mut iter, &arg)?),
            "--complexity" => cli.complexity = Some(level(&mut iter, &arg)?),
            "--list-styles" => cli.list_styles = true,
            "--ingest" => cli.ingest = Some(PathBuf::from(value(&mut iter, &arg)?)),
            "--json" => cli.json = true,
            "-o" | "--output" => cli.output = Some(PathBuf::from(value(&mut iter, &arg)?)),
            "--insights" => cli.insights = true,
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => return Err(AppError::Usage(format!("unexpected argument '{other}' (see --help)"))),
        }
    }

    cli.log_level = logger::level_for_verbosity(verbosity);
    Ok(cli)
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, AppError> {
    iter.next()
        .ok_or_else(|| AppError::Usage(format!("{flag} requires a value")))
}

fn level(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<u8, AppError> {
    let raw = value(iter, flag)?;
    raw.parse::<u8>()
        .map_err(|_| AppError::Usage(format!("{flag} expects a number from 1 to 10, got '{raw}'")))
}
