//! Console, JSON and file output for a finished [`Composition`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::RenderConfig;
use crate::error::AppError;
use crate::pipeline::{Composition, HistoryEntry};

/// File name used when the poem is saved without an explicit path.
pub const DEFAULT_POEM_FILE: &str = "poesia.txt";

const RULE: &str = "────────────────────────────────────────";

/// A piece of console output; `animate` blocks get the typewriter effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub animate: bool,
}

impl Block {
    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), animate: false }
    }

    fn poem(text: impl Into<String>) -> Self {
        Self { text: text.into(), animate: true }
    }
}

/// Lay out a composition: initial grade and critique, revised poem, final
/// grade and notes, then optionally the insights.
pub fn report(c: &Composition, insights: bool) -> Vec<Block> {
    let mut blocks = vec![Block::plain(format!(
        "{RULE}\n📊 Valutazione Iniziale: {:.1}/10",
        c.initial_score
    ))];
    if !c.corrections.is_empty() {
        blocks.push(Block::plain(c.corrections.clone()));
    }

    blocks.push(Block::plain(format!("\n💎 Poesia Rivista · {} ({})", c.style, c.language)));
    blocks.push(Block::poem(c.final_poem.clone()));

    blocks.push(Block::plain(format!("\n📊 Valutazione Finale: {:.1}/10", c.final_score)));
    if !c.final_notes.is_empty() {
        blocks.push(Block::plain(c.final_notes.clone()));
    }
    if c.rounds.len() > 1 {
        let grades: Vec<String> = c.rounds.iter().map(|r| format!("{:.1}", r.final_score)).collect();
        blocks.push(Block::plain(format!("Rounds: {} (final grades {})", c.rounds.len(), grades.join(" → "))));
    }

    if insights {
        blocks.extend(insight_blocks(c));
    }
    blocks
}

fn insight_blocks(c: &Composition) -> Vec<Block> {
    let analysis = serde_json::to_string_pretty(&c.interpretation)
        .unwrap_or_else(|e| format!("<unavailable: {e}>"));
    vec![
        Block::plain(format!("\n{RULE}\n🔍 Approfondimenti")),
        Block::plain(format!("\n🔄 BOZZA ORIGINALE (V1)\n{}", c.draft)),
        Block::plain(format!("\n🔄 POESIA RIVISTA (V2)\n{}", c.final_poem)),
        Block::plain(format!("\n📜 Contesto di Stile\n{}", c.style_context)),
        Block::plain(format!("\n📊 Metadata Generazione\n{analysis}")),
    ]
}

/// Writes report blocks, animating poem text one character at a time.
#[derive(Debug, Clone)]
pub struct Renderer {
    typewriter: bool,
    delay: Duration,
}

impl Renderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self { typewriter: config.typewriter, delay: Duration::from_millis(config.typewriter_delay_ms) }
    }

    pub async fn write<W>(&self, out: &mut W, blocks: &[Block]) -> Result<(), AppError>
    where
        W: AsyncWrite + Unpin,
    {
        for block in blocks {
            if block.animate && self.typewriter && !self.delay.is_zero() {
                let mut buf = [0u8; 4];
                for ch in block.text.chars() {
                    out.write_all(ch.encode_utf8(&mut buf).as_bytes()).await?;
                    out.flush().await?;
                    tokio::time::sleep(self.delay).await;
                }
                out.write_all(b"\n").await?;
            } else {
                out.write_all(block.text.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
        }
        out.flush().await?;
        Ok(())
    }

    pub async fn print(&self, blocks: &[Block]) -> Result<(), AppError> {
        let mut stdout = tokio::io::stdout();
        self.write(&mut stdout, blocks).await
    }
}

pub fn to_json(c: &Composition) -> Result<String, AppError> {
    serde_json::to_string_pretty(c).map_err(|e| AppError::Io(std::io::Error::other(e)))
}

/// Write `text` to `path`, or to [`DEFAULT_POEM_FILE`] when `path` is a
/// directory. Returns the file written.
pub fn save_poem(path: &Path, text: &str) -> Result<PathBuf, AppError> {
    let target = if path.is_dir() { path.join(DEFAULT_POEM_FILE) } else { path.to_path_buf() };
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut body = text.trim_end().to_string();
    body.push('\n');
    fs::write(&target, body)?;
    Ok(target)
}

/// One line per history entry, newest last.
pub fn history_lines(entries: &[HistoryEntry]) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let first = e.text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
            format!("{:>2}. [{}] {} · {}", i + 1, e.timestamp, e.style, first)
        })
        .collect()
}
