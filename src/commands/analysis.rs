//! Read-only analysis of the program's own source tree.

use super::{CommandHandler, collect_files, is_rust_source, run_blocking};
use crate::error::CommandExecutionError;
use crate::intent::CommandId;
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Lines longer than this many characters are reported.
const LONG_LINE_CHARS: usize = 100;

/// Aggregate metrics over a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeReport {
    pub files: usize,
    pub lines: usize,
    pub functions: usize,
    pub todos: usize,
    pub long_lines: usize,
    /// Path (relative to the analyzed root) and line count of the biggest file.
    pub largest: Option<(PathBuf, usize)>,
}

impl CodeReport {
    /// Spoken summary.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "🔍 Análise concluída: {} arquivos, {} linhas, {} funções.",
            self.files, self.lines, self.functions
        );
        if let Some((path, lines)) = &self.largest {
            text.push_str(&format!(
                " Maior arquivo: {} ({lines} linhas).",
                path.display()
            ));
        }
        match (self.todos, self.long_lines) {
            (0, 0) => text.push_str(" Nenhum ponto de atenção encontrado."),
            (todos, long) => text.push_str(&format!(
                " Pontos de atenção: {todos} marcadores TODO, {long} linhas longas."
            )),
        }
        text
    }
}

/// Per-file line classifier.
#[derive(Debug, Clone)]
pub struct SourceAnalyzer {
    function: Regex,
    todo: Regex,
}

impl SourceAnalyzer {
    /// # Errors
    ///
    /// Returns [`CommandExecutionError::Failed`] if a pattern fails to compile.
    pub fn new() -> Result<Self, CommandExecutionError> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| CommandExecutionError::Failed(format!("padrão inválido: {e}")))
        };
        Ok(Self {
            function: compile(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+\w+",
            )?,
            todo: compile(r"\b(?:TODO|FIXME|XXX)\b")?,
        })
    }

    fn add_file(&self, report: &mut CodeReport, relative: PathBuf, content: &str) {
        let mut lines = 0;
        for line in content.lines() {
            lines += 1;
            if self.function.is_match(line) {
                report.functions += 1;
            }
            if self.todo.is_match(line) {
                report.todos += 1;
            }
            if line.chars().count() > LONG_LINE_CHARS {
                report.long_lines += 1;
            }
        }
        report.files += 1;
        report.lines += lines;
        if report.largest.as_ref().is_none_or(|(_, most)| lines > *most) {
            report.largest = Some((relative, lines));
        }
    }

    /// Analyze every `.rs` file under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandExecutionError::MissingPath`] if `root` is not a
    /// directory, or an I/O error if a file cannot be read.
    pub fn analyze_tree(&self, root: &Path) -> Result<CodeReport, CommandExecutionError> {
        let mut report = CodeReport::default();
        for path in collect_files(root, &is_rust_source)? {
            let content = std::fs::read_to_string(&path)?;
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            self.add_file(&mut report, relative, &content);
        }
        Ok(report)
    }
}

/// Identity of a tree's contents: paths, sizes and modification times.
fn fingerprint(root: &Path) -> Result<blake3::Hash, CommandExecutionError> {
    let mut hasher = blake3::Hasher::new();
    for path in collect_files(root, &is_rust_source)? {
        let meta = std::fs::metadata(&path)?;
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(&meta.len().to_le_bytes());
        if let Ok(modified) = meta.modified()
            && let Ok(since) = modified.duration_since(std::time::UNIX_EPOCH)
        {
            hasher.update(&since.as_nanos().to_le_bytes());
        }
    }
    Ok(hasher.finalize())
}

/// Handler for `analyze_code`, memoizing reports of unchanged trees.
pub struct AnalysisHandler {
    root: PathBuf,
    analyzer: Arc<SourceAnalyzer>,
    cache: Arc<Mutex<VecDeque<(blake3::Hash, CodeReport)>>>,
    cache_size: usize,
}

impl AnalysisHandler {
    pub fn new(root: &Path, analyzer: SourceAnalyzer, cache_size: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            analyzer: Arc::new(analyzer),
            cache: Arc::new(Mutex::new(VecDeque::new())),
            cache_size,
        }
    }

    /// Analyze the configured root, reusing a cached report when unchanged.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`SourceAnalyzer::analyze_tree`].
    pub async fn report(&self) -> Result<CodeReport, CommandExecutionError> {
        let root = self.root.clone();
        let analyzer = Arc::clone(&self.analyzer);
        let cache = Arc::clone(&self.cache);
        let cache_size = self.cache_size;
        run_blocking(move || {
            let key = fingerprint(&root)?;
            let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, report)) = cache.iter().find(|(k, _)| *k == key) {
                debug!(root = %root.display(), "analysis cache hit");
                return Ok(report.clone());
            }
            let report = analyzer.analyze_tree(&root)?;
            if cache_size > 0 {
                if cache.len() >= cache_size {
                    cache.pop_front();
                }
                cache.push_back((key, report.clone()));
            }
            Ok(report)
        })
        .await
    }

    pub fn cached_reports(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl CommandHandler for AnalysisHandler {
    fn command(&self) -> CommandId {
        CommandId::AnalyzeCode
    }

    fn announcement(&self) -> Option<&str> {
        Some("Analisando meu código, um momento.")
    }

    async fn execute(&self, _utterance: &str) -> Result<String, CommandExecutionError> {
        Ok(self.report().await?.summary())
    }
}
