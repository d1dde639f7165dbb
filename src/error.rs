//! Error types for the fala assistant.

use crate::tts::EngineKind;
use std::path::PathBuf;

/// Top-level error type for the assistant front-end.
#[derive(Debug, thiserror::Error)]
pub enum FalaError {
    /// Configuration error (including an engine chain without a text fallback).
    #[error("config error: {0}")]
    Config(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Intent catalog construction error.
    #[error("intent error: {0}")]
    Intent(String),

    /// Internal command error.
    #[error("command error: {0}")]
    Command(String),

    /// Conversational backend error.
    #[error("conversation error: {0}")]
    Conversation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, FalaError>;

/// Engine-agnostic classification of a synthesis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisErrorKind {
    /// Backend not usable at all (missing dependency, model not loaded, unreachable).
    Unavailable,
    /// Backend call exceeded its time bound.
    Timeout,
    /// Backend ran but refused or failed on this specific input.
    BackendRejected,
}

impl std::fmt::Display for SynthesisErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::BackendRejected => "backend rejected",
        };
        f.write_str(s)
    }
}

/// A synthesis failure reported by an engine adapter.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{engine} synthesis failed ({kind}): {message}")]
pub struct SynthesisError {
    /// Failure class driving the fallback decision.
    pub kind: SynthesisErrorKind,
    /// Engine that produced the failure.
    pub engine: EngineKind,
    /// Backend-specific detail.
    pub message: String,
}

impl SynthesisError {
    pub fn unavailable(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Unavailable,
            engine,
            message: message.into(),
        }
    }

    pub fn timeout(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Timeout,
            engine,
            message: message.into(),
        }
    }

    pub fn rejected(engine: EngineKind, message: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::BackendRejected,
            engine,
            message: message.into(),
        }
    }
}

/// Failure of a matched internal command's handler.
///
/// Never propagated as a process fault: the router renders it as
/// user-visible result text.
#[derive(Debug, thiserror::Error)]
pub enum CommandExecutionError {
    /// No handler is registered for the detected command.
    #[error("comando não suportado: {0}")]
    Unsupported(String),

    /// A filesystem path required by the handler does not exist.
    #[error("caminho não encontrado: {}", .0.display())]
    MissingPath(PathBuf),

    /// The handler's underlying action failed.
    #[error("{0}")]
    Failed(String),

    /// I/O failure while performing the action.
    #[error("falha de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandExecutionError {
    /// User-facing rendering of the failure.
    pub fn to_user_text(&self) -> String {
        format!("❌ Erro: {self}")
    }
}

/// Failure to load a persisted configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// The file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read config file '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or holds values of the wrong type.
    #[error("malformed config file '{}': {message}", .path.display())]
    Malformed { path: PathBuf, message: String },
}
