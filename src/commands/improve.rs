//! Sandboxed self-improvement: read, analyze and propose a diff.
//!
//! Proposals are never written by the handler. [`apply_proposal`] is the
//! separate, explicit step, and it refuses to touch a file whose contents
//! changed after the proposal was made.

use super::{CommandHandler, collect_files, is_rust_source, run_blocking};
use crate::error::CommandExecutionError;
use crate::intent::CommandId;
use async_trait::async_trait;
use similar::TextDiff;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Spaces substituted for each leading tab.
const TAB_WIDTH: usize = 4;

/// A mechanical fix found in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fix {
    TrailingWhitespace { lines: usize },
    LeadingTabs { lines: usize },
    MissingFinalNewline,
}

impl std::fmt::Display for Fix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrailingWhitespace { lines } => write!(f, "espaços no fim de {lines} linhas"),
            Self::LeadingTabs { lines } => write!(f, "tabulações em {lines} linhas"),
            Self::MissingFinalNewline => f.write_str("quebra de linha final ausente"),
        }
    }
}

/// A reviewable change to one source file.
#[derive(Debug, Clone)]
pub struct ImprovementProposal {
    pub path: PathBuf,
    /// Hash of the contents the proposal was computed from.
    pub original_hash: blake3::Hash,
    pub proposed: String,
    /// Unified diff from the current contents to `proposed`.
    pub diff: String,
    pub fixes: Vec<Fix>,
}

fn improve_text(original: &str) -> (String, Vec<Fix>) {
    let mut trailing = 0;
    let mut tabs = 0;
    let mut lines = Vec::new();
    for line in original.lines() {
        let trimmed = line.trim_end();
        if trimmed.len() != line.len() {
            trailing += 1;
        }
        let indent_tabs = trimmed.chars().take_while(|&c| c == '\t').count();
        if indent_tabs > 0 {
            tabs += 1;
            lines.push(format!("{}{}", " ".repeat(indent_tabs * TAB_WIDTH), &trimmed[indent_tabs..]));
        } else {
            lines.push(trimmed.to_owned());
        }
    }

    let mut fixes = Vec::new();
    if trailing > 0 {
        fixes.push(Fix::TrailingWhitespace { lines: trailing });
    }
    if tabs > 0 {
        fixes.push(Fix::LeadingTabs { lines: tabs });
    }
    if !original.is_empty() && !original.ends_with('\n') {
        fixes.push(Fix::MissingFinalNewline);
    }
    let mut proposed = lines.join("\n");
    if !proposed.is_empty() {
        proposed.push('\n');
    }
    (proposed, fixes)
}

/// Propose fixes for `path`, or `None` if it is already clean.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn propose_file(path: &Path) -> Result<Option<ImprovementProposal>, CommandExecutionError> {
    let original = std::fs::read_to_string(path)?;
    let (proposed, fixes) = improve_text(&original);
    if fixes.is_empty() || proposed == original {
        return Ok(None);
    }
    let name = path.display().to_string();
    let diff = TextDiff::from_lines(&original, &proposed)
        .unified_diff()
        .context_radius(2)
        .header(&name, &name)
        .to_string();
    Ok(Some(ImprovementProposal {
        path: path.to_path_buf(),
        original_hash: blake3::hash(original.as_bytes()),
        proposed,
        diff,
        fixes,
    }))
}

/// Propose fixes for every `.rs` file under `root`.
///
/// # Errors
///
/// Returns an error if `root` is missing or a file cannot be read.
pub fn propose_tree(root: &Path) -> Result<Vec<ImprovementProposal>, CommandExecutionError> {
    let mut proposals = Vec::new();
    for path in collect_files(root, &is_rust_source)? {
        if let Some(proposal) = propose_file(&path)? {
            proposals.push(proposal);
        }
    }
    Ok(proposals)
}

/// Write a reviewed proposal to disk.
///
/// # Errors
///
/// Returns [`CommandExecutionError::Failed`] if the file changed since the
/// proposal was computed, or an I/O error if it cannot be rewritten.
pub fn apply_proposal(proposal: &ImprovementProposal) -> Result<(), CommandExecutionError> {
    let current = std::fs::read(&proposal.path)?;
    if blake3::hash(&current) != proposal.original_hash {
        return Err(CommandExecutionError::Failed(format!(
            "{} mudou depois da proposta; gere uma nova",
            proposal.path.display()
        )));
    }

    let dir = proposal.path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(proposal.proposed.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&proposal.path).map_err(|e| e.error)?;
    info!(path = %proposal.path.display(), "improvement applied");
    Ok(())
}

/// Handler for `self_improve`. Keeps the latest proposals for review.
pub struct SelfImproveHandler {
    root: PathBuf,
    latest: Arc<Mutex<Vec<ImprovementProposal>>>,
}

impl SelfImproveHandler {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            latest: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Proposals from the most recent run.
    pub fn latest_proposals(&self) -> Vec<ImprovementProposal> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommandHandler for SelfImproveHandler {
    fn command(&self) -> CommandId {
        CommandId::SelfImprove
    }

    fn announcement(&self) -> Option<&str> {
        Some("Procurando melhorias no meu código.")
    }

    async fn execute(&self, _utterance: &str) -> Result<String, CommandExecutionError> {
        let root = self.root.clone();
        let proposals = run_blocking(move || propose_tree(&root)).await?;
        let text = if proposals.is_empty() {
            "✨ Nenhuma melhoria mecânica encontrada; o código já está limpo.".to_owned()
        } else {
            let changed_lines: usize = proposals
                .iter()
                .map(|p| p.diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count())
                .sum();
            format!(
                "🔧 {} propostas de melhoria ({changed_lines} linhas). Nada foi alterado; revise antes de aplicar.",
                proposals.len()
            )
        };
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = proposals;
        Ok(text)
    }
}
