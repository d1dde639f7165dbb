//! Internal command handlers and the router that dispatches to them.
//!
//! Each [`CommandId`] maps to exactly one [`CommandHandler`]. Handler
//! failures never escape the router: they are rendered as user-visible
//! result text so the session carries on normally.

mod analysis;
mod backup;
mod improve;
mod status;

pub use analysis::{AnalysisHandler, CodeReport, SourceAnalyzer};
pub use backup::{BackupHandler, BackupSummary, create_backup, rotate_backups};
pub use improve::{Fix, ImprovementProposal, SelfImproveHandler, apply_proposal, propose_file};
pub use status::StatusHandler;
pub use voice_test::VoiceTestHandler;

use crate::config::FalaConfig;
use crate::error::{CommandExecutionError, FalaError, Result};
use crate::intent::CommandId;
use crate::session::SpeechController;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Handler behind one internal command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn command(&self) -> CommandId;

    /// Short acknowledgement spoken before the action starts.
    fn announcement(&self) -> Option<&str> {
        None
    }

    /// Perform the action and return the user-facing result text.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandExecutionError`] when the underlying action fails.
    async fn execute(&self, utterance: &str) -> std::result::Result<String, CommandExecutionError>;
}

/// Maps detected commands to their handlers.
#[derive(Default)]
pub struct CommandRouter {
    handlers: HashMap<CommandId, Arc<dyn CommandHandler>>,
    speech: Option<Arc<SpeechController>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speak handler announcements through `speech`.
    pub fn with_speech(mut self, speech: Arc<SpeechController>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Router with every built-in handler registered.
    ///
    /// # Errors
    ///
    /// Returns [`FalaError::Command`] if a handler cannot be constructed.
    pub fn standard(
        config: &FalaConfig,
        speech: Arc<SpeechController>,
        started: Instant,
    ) -> Result<Self> {
        let commands = &config.commands;
        let analyzer = SourceAnalyzer::new().map_err(|e| FalaError::Command(e.to_string()))?;
        let mut router = Self::new().with_speech(Arc::clone(&speech));
        router.register(Arc::new(AnalysisHandler::new(
            &commands.source_root,
            analyzer,
            config.processing.cache_size,
        )));
        router.register(Arc::new(VoiceTestHandler::new(
            Arc::clone(&speech),
            Duration::from_millis(config.processing.playback_wait_ms),
        )));
        router.register(Arc::new(BackupHandler::new(
            &commands.source_root,
            &commands.backup_dir,
            commands.backup_keep,
        )));
        router.register(Arc::new(SelfImproveHandler::new(&commands.source_root)));
        router.register(Arc::new(StatusHandler::new(speech, started)));
        Ok(router)
    }

    /// Register `handler`, returning the one it replaces.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.insert(handler.command(), handler)
    }

    pub fn handles(&self, command: CommandId) -> bool {
        self.handlers.contains_key(&command)
    }

    /// Run the handler for `command` and return its result text.
    pub async fn dispatch(&self, command: CommandId, utterance: &str) -> String {
        let Some(handler) = self.handlers.get(&command) else {
            warn!(%command, "no handler registered");
            return CommandExecutionError::Unsupported(command.to_string()).to_user_text();
        };

        if let (Some(speech), Some(announcement)) = (&self.speech, handler.announcement()) {
            speech.speak_default(announcement);
        }

        match handler.execute(utterance).await {
            Ok(text) => {
                info!(%command, "command completed");
                text
            }
            Err(e) => {
                error!(%command, error = %e, "command failed");
                e.to_user_text()
            }
        }
    }
}

/// Directories never descended into while walking a source tree.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Recursively list files under `root` accepted by `keep`, sorted by path.
///
/// Hidden entries and build output directories are skipped.
pub(crate) fn collect_files(
    root: &Path,
    keep: &dyn Fn(&Path) -> bool,
) -> std::result::Result<Vec<PathBuf>, CommandExecutionError> {
    if !root.is_dir() {
        return Err(CommandExecutionError::MissingPath(root.to_path_buf()));
    }
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if !SKIPPED_DIRS.contains(&name.as_ref()) {
                    stack.push(path);
                }
            } else if file_type.is_file() && keep(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn is_rust_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rs")
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> std::result::Result<T, CommandExecutionError>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, CommandExecutionError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CommandExecutionError::Failed(format!("tarefa interrompida: {e}")))?
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedHandler {
        command: CommandId,
        result: std::result::Result<&'static str, &'static str>,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for FixedHandler {
        fn command(&self) -> CommandId {
            self.command
        }

        async fn execute(&self, _utterance: &str) -> std::result::Result<String, CommandExecutionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_owned)
                .map_err(|e| CommandExecutionError::Failed(e.to_owned()))
        }
    }

    fn handler(
        command: CommandId,
        result: std::result::Result<&'static str, &'static str>,
    ) -> Arc<FixedHandler> {
        Arc::new(FixedHandler {
            command,
            result,
            runs: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn dispatch_runs_matching_handler() {
        let status = handler(CommandId::StatusReport, Ok("tudo bem"));
        let mut router = CommandRouter::new();
        router.register(status.clone());
        assert_eq!(router.dispatch(CommandId::StatusReport, "status").await, "tudo bem");
        assert_eq!(status.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_becomes_user_text() {
        let mut router = CommandRouter::new();
        router.register(handler(CommandId::CreateBackup, Err("disco cheio")));
        assert_eq!(
            router.dispatch(CommandId::CreateBackup, "faça um backup").await,
            "❌ Erro: disco cheio"
        );
    }

    #[tokio::test]
    async fn missing_handler_is_reported_not_raised() {
        let router = CommandRouter::new();
        let text = router.dispatch(CommandId::SelfImprove, "se melhore").await;
        assert!(text.starts_with("❌ Erro:"));
        assert!(text.contains("self_improve"));
    }

    #[test]
    fn register_replaces_previous_handler() {
        let mut router = CommandRouter::new();
        assert!(router.register(handler(CommandId::TestVoice, Ok("a"))).is_none());
        assert!(router.register(handler(CommandId::TestVoice, Ok("b"))).is_some());
        assert!(router.handles(CommandId::TestVoice));
        assert!(!router.handles(CommandId::AnalyzeCode));
    }

    #[test]
    fn collect_files_skips_hidden_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "").unwrap();
        std::fs::write(root.join("src/nested/mod.rs"), "").unwrap();
        std::fs::write(root.join("src/notes.txt"), "").unwrap();
        std::fs::write(root.join("target/debug/build.rs"), "").unwrap();
        std::fs::write(root.join(".git/config.rs"), "").unwrap();

        let files = collect_files(root, &is_rust_source).unwrap();
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![PathBuf::from("src/lib.rs"), PathBuf::from("src/nested/mod.rs")]
        );
    }

    #[test]
    fn collect_files_requires_existing_root() {
        let err = collect_files(Path::new("/definitely/not/here"), &|_| true).unwrap_err();
        assert!(matches!(err, CommandExecutionError::MissingPath(_)));
    }
}
