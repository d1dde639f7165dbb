//! Audio playback to system speakers via cpal.

use super::AudioSink;
use crate::error::{FalaError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

/// Polling interval while waiting for the output buffer to drain.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Plays samples on a cpal output device.
///
/// The device is opened per call so the sink itself holds no stream and can
/// be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    /// Output device name (None = system default).
    output_device: Option<String>,
}

impl CpalSink {
    pub fn new(output_device: Option<String>) -> Self {
        Self { output_device }
    }

    fn open_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.output_device {
            host.output_devices()
                .map_err(|e| FalaError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| FalaError::Audio(format!("output device '{name}' not found")))
        } else {
            host.default_output_device()
                .ok_or_else(|| FalaError::Audio("no default output device".into()))
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| FalaError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

impl AudioSink for CpalSink {
    fn play(&self, samples: &[f32], sample_rate: u32, stop: &AtomicBool) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let device = self.open_device()?;
        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: samples.to_vec(),
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match buffer_clone.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| FalaError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| FalaError::Audio(format!("failed to start output stream: {e}")))?;

        loop {
            std::thread::sleep(POLL_INTERVAL);
            if stop.load(Ordering::Relaxed) {
                debug!("playback stopped before completion");
                break;
            }
            let buf = buffer
                .lock()
                .map_err(|e| FalaError::Audio(format!("playback buffer lock poisoned: {e}")))?;
            if buf.finished {
                break;
            }
        }

        drop(stream);
        Ok(())
    }
}
