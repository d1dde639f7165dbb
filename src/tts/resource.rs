//! Playable audio resources produced by engine adapters.
//!
//! A resource is played at most once and then disposed. Temp files backing a
//! resource are removed on `dispose` and, failing that, when the resource is
//! dropped.

use crate::audio::{AudioSink, TextSink};
use crate::error::{FalaError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

/// A rendered utterance ready for playback.
#[async_trait]
pub trait AudioResource: Send {
    /// Short label for logs ("samples", "wav_file", "text").
    fn describe(&self) -> &'static str;

    /// Play the resource, returning once playback completes or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio cannot be decoded or the sink fails.
    async fn play(
        &mut self,
        sink: Arc<dyn AudioSink>,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome>;

    /// Release backing storage. Safe to call more than once.
    fn dispose(&mut self);
}

/// In-memory mono samples.
#[derive(Debug)]
pub struct SampleAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    volume: f32,
}

impl SampleAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, volume: f32) -> Self {
        Self {
            samples,
            sample_rate,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[async_trait]
impl AudioResource for SampleAudio {
    fn describe(&self) -> &'static str {
        "samples"
    }

    async fn play(
        &mut self,
        sink: Arc<dyn AudioSink>,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let scaled = scale(&self.samples, self.volume);
        play_on_sink(sink, scaled, self.sample_rate, cancel).await
    }

    fn dispose(&mut self) {
        self.samples = Vec::new();
    }
}

/// A WAV rendered to a temp file by an external synthesizer.
#[derive(Debug)]
pub struct WavFileAudio {
    path: Option<TempPath>,
    volume: f32,
}

impl WavFileAudio {
    pub fn new(path: TempPath, volume: f32) -> Self {
        Self {
            path: Some(path),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Backing file, or `None` once disposed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl AudioResource for WavFileAudio {
    fn describe(&self) -> &'static str {
        "wav_file"
    }

    async fn play(
        &mut self,
        sink: Arc<dyn AudioSink>,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let Some(path) = self.path.as_deref() else {
            return Err(FalaError::Audio("audio resource already disposed".into()));
        };
        let path = path.to_path_buf();
        let (samples, sample_rate) = tokio::task::spawn_blocking(move || {
            let reader = hound::WavReader::open(&path)
                .map_err(|e| FalaError::Audio(format!("cannot open '{}': {e}", path.display())))?;
            decode_wav(reader)
        })
        .await
        .map_err(|e| FalaError::Audio(format!("wav decode task failed: {e}")))??;

        let scaled = scale(&samples, self.volume);
        play_on_sink(sink, scaled, sample_rate, cancel).await
    }

    fn dispose(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!(path = %shown, "removed temp audio file"),
                Err(e) => warn!(path = %shown, error = %e, "failed to remove temp audio file"),
            }
        }
    }
}

/// Decorated text shown instead of audio.
pub struct TextAudio {
    text: String,
    sink: Arc<dyn TextSink>,
}

impl TextAudio {
    pub fn new(text: impl Into<String>, sink: Arc<dyn TextSink>) -> Self {
        Self {
            text: text.into(),
            sink,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl AudioResource for TextAudio {
    fn describe(&self) -> &'static str {
        "text"
    }

    async fn play(
        &mut self,
        _sink: Arc<dyn AudioSink>,
        _cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        self.sink.emit(&self.text);
        Ok(PlaybackOutcome::Completed)
    }

    fn dispose(&mut self) {}
}

fn scale(samples: &[f32], volume: f32) -> Vec<f32> {
    samples.iter().map(|s| s * volume).collect()
}

/// Run a blocking sink on a worker thread, raising its stop flag on cancel.
async fn play_on_sink(
    sink: Arc<dyn AudioSink>,
    samples: Vec<f32>,
    sample_rate: u32,
    cancel: &CancellationToken,
) -> Result<PlaybackOutcome> {
    if cancel.is_cancelled() {
        return Ok(PlaybackOutcome::Cancelled);
    }
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let mut handle =
        tokio::task::spawn_blocking(move || sink.play(&samples, sample_rate, &stop_flag));

    tokio::select! {
        joined = &mut handle => {
            let played = joined.map_err(|e| FalaError::Audio(format!("playback task failed: {e}")))?;
            played?;
            Ok(PlaybackOutcome::Completed)
        }
        () = cancel.cancelled() => {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.await;
            Ok(PlaybackOutcome::Cancelled)
        }
    }
}

/// Decode a WAV stream to mono f32 samples, averaging multi-channel frames.
pub(crate) fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32)> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| FalaError::Audio(format!("invalid wav data: {e}")))?,
        hound::SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| FalaError::Audio(format!("invalid wav data: {e}")))?
        }
    };
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}
