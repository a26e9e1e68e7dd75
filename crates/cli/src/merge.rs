//! `notemerge merge`: three-way merge of plain files.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{debug, info};

use notemerge_core::merge::Merger;
use notemerge_core::pull_request::{compose, HunkChoice};

use crate::style;

/// Side to keep for every conflict hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Take {
    Source,
    Base,
    Target,
}

impl From<Take> for HunkChoice {
    fn from(take: Take) -> Self {
        match take {
            Take::Source => HunkChoice::Source,
            Take::Base => HunkChoice::Base,
            Take::Target => HunkChoice::Target,
        }
    }
}

/// Arguments for a file merge.
#[derive(Debug)]
pub struct MergeFiles {
    pub base: PathBuf,
    pub target: PathBuf,
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub take: Option<Take>,
}

/// Merge the files and write the result. Returns `true` when conflict
/// markers were left in the output.
pub fn run(merger: &Merger, args: &MergeFiles) -> Result<bool> {
    run_to(merger, args, &mut std::io::stdout().lock())
}

/// Like [`run`], with `stdout` standing in for standard output. The merged
/// text is written byte for byte, with no trailing newline added.
fn run_to(merger: &Merger, args: &MergeFiles, stdout: &mut impl Write) -> Result<bool> {
    let base = read(&args.base)?;
    let target = read(&args.target)?;
    let source = read(&args.source)?;

    let (text, conflicted) = merge_texts(merger, &base, &target, &source, args.take)?;
    info!(
        base = %args.base.display(),
        conflicted,
        take = ?args.take,
        "files merged"
    );

    match &args.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if conflicted {
                eprintln!(
                    "{}",
                    style::warn(&format!("conflicts written to {}", path.display()))
                );
            } else {
                eprintln!("{}", style::success(&format!("merged into {}", path.display())));
            }
        }
        None => {
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .context("failed to write merged text to stdout")?;
        }
    }

    Ok(conflicted)
}

/// Merge text, resolving every conflict with `take` when given.
fn merge_texts(
    merger: &Merger,
    base: &str,
    target: &str,
    source: &str,
    take: Option<Take>,
) -> Result<(String, bool)> {
    let result = merger.merge_text(base, target, source);
    if !result.has_conflicts() {
        return Ok((result.merged_text(), false));
    }

    match take {
        Some(take) => {
            let choices = vec![HunkChoice::from(take); result.conflicts.len()];
            let text = compose(merger, &result, &choices)
                .context("failed to apply conflict choices")?;
            Ok((text, false))
        }
        None => Ok((result.merged_text(), true)),
    }
}

fn read(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "reading merge input");
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
