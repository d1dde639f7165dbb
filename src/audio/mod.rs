//! Output channels: audio sinks for synthesized samples and text sinks for
//! the text-only fallback.

pub mod playback;

pub use playback::CpalSink;

use crate::error::Result;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use tokio::sync::mpsc;

/// Destination for synthesized audio.
///
/// `play` blocks the calling thread until playback finishes or `stop` is
/// raised; callers run it on a blocking thread.
pub trait AudioSink: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the output device cannot play the samples.
    fn play(&self, samples: &[f32], sample_rate: u32, stop: &AtomicBool) -> Result<()>;
}

/// Discards audio immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, _samples: &[f32], _sample_rate: u32, _stop: &AtomicBool) -> Result<()> {
        Ok(())
    }
}

/// User-visible text output used when speech degrades to text.
pub trait TextSink: Send + Sync {
    fn emit(&self, text: &str);
}

/// Writes each text reply as one line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutTextSink;

impl TextSink for StdoutTextSink {
    fn emit(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}

/// Forwards text replies over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTextSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTextSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TextSink for ChannelTextSink {
    fn emit(&self, text: &str) {
        let _ = self.tx.send(text.to_owned());
    }
}
