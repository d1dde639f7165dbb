//! Runtime events emitted by the speech session controller for UI and
//! observability.
//!
//! Events carry no audio payloads so the controller can emit them without
//! blocking the playback path.

use crate::error::SynthesisErrorKind;
use crate::session::SessionState;
use crate::tts::{EngineKind, PlaybackOutcome};

/// Events that describe what the speech session is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// The session moved to a new state.
    StateChanged {
        /// Request being realized, `None` when idle.
        request_id: Option<u64>,
        state: SessionState,
    },
    /// Synthesis on `from` failed and the request moved down the chain.
    EngineFallback {
        request_id: u64,
        from: EngineKind,
        to: EngineKind,
        error: SynthesisErrorKind,
    },
    /// A rendered resource was handed to playback.
    Played {
        request_id: u64,
        engine: EngineKind,
        outcome: PlaybackOutcome,
        /// Humanized text that was spoken.
        text: String,
    },
    /// The request was superseded or cancelled before it could play.
    Discarded { request_id: u64 },
    /// The reply degraded to text output instead of audio.
    TextEmitted { request_id: u64, text: String },
}
