//! Fala: spoken-language assistant front-end.
//!
//! Turns short utterances into either an internal command result or a
//! conversational reply, and speaks the reply with emotion-specific prosody
//! on whichever synthesis engine the host actually has:
//! Utterance → Intent → Command / Conversation → Humanizer → Session → Engine
//!
//! # Architecture
//!
//! - **Intent detection**: ordered regex catalog of internal commands
//! - **Commands**: code analysis, backup, voice test, status, self-improvement
//! - **Emotion**: prosody profile table and text humanizer
//! - **TTS**: neural model → cloud HTTP → offline driver → text-only fallback
//! - **Session**: single in-flight utterance with cancellation and cleanup
//! - **Audio playback**: plays synthesized audio via `cpal`

pub mod assistant;
pub mod audio;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod intent;
pub mod runtime;
pub mod session;
pub mod tts;

#[cfg(test)]
pub(crate) mod test_utils;

pub use assistant::{Assistant, AssistantReply};
pub use config::FalaConfig;
pub use error::{FalaError, Result};
pub use runtime::SpeechEvent;
pub use session::{SessionDeps, SessionState, SpeechController};
