//! Audio sinks: where synthesized speech is played.

use async_trait::async_trait;
use bytes::Bytes;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{CoachError, Result};

/// Plays encoded audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` to completion, or until `cancel` fires.
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> Result<()>;
}

/// Discards audio. Used when playback is disabled or no device exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, audio: Bytes, _cancel: CancellationToken) -> Result<()> {
        debug!(bytes = audio.len(), "audio discarded");
        Ok(())
    }
}

/// PCM samples decoded from a WAV file, interleaved, normalized to `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * f32::from(self.channels))
    }
}

/// Decode a WAV byte buffer.
///
/// # Errors
///
/// Returns [`CoachError::Audio`] for anything `hound` cannot read.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| CoachError::Audio(format!("not a WAV stream: {e}")))?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| CoachError::Audio(format!("corrupt WAV data: {e}")))?;

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Speaker output through cpal.
///
/// Each `play` opens a stream at the clip's own rate and channel count on a
/// blocking thread, since cpal streams are not `Send`.
pub struct CpalSink {
    device_name: Option<String>,
}

impl CpalSink {
    /// Check that the requested (or default) output device exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Audio`] if the device cannot be found.
    pub fn new(device_name: Option<String>) -> Result<Self> {
        let device = find_output_device(device_name.as_deref())?;
        let name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {name}");
        Ok(Self { device_name })
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
            .map_err(|e| CoachError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
            .collect())
    }
}

fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| CoachError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| CoachError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| CoachError::Audio("no default output device".into())),
    }
}

/// Playback progress shared with the cpal callback.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

fn play_blocking(device_name: Option<&str>, audio: DecodedAudio, stop: &AtomicBool) -> Result<()> {
    let device = find_output_device(device_name)?;
    let stream_config = StreamConfig {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples: audio.samples,
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
        .map_err(|e| CoachError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CoachError::Audio(format!("failed to start output stream: {e}")))?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
        if stop.load(Ordering::SeqCst) {
            debug!("playback interrupted");
            break;
        }
        let buf = buffer
            .lock()
            .map_err(|e| CoachError::Audio(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            break;
        }
    }

    drop(stream);
    Ok(())
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> Result<()> {
        let decoded = decode_wav(&audio)?;
        debug!(
            secs = decoded.duration_secs(),
            rate = decoded.sample_rate,
            channels = decoded.channels,
            "playing speech"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let device_name = self.device_name.clone();
        let mut player = tokio::task::spawn_blocking(move || {
            play_blocking(device_name.as_deref(), decoded, &stop_flag)
        });

        let joined = tokio::select! {
            joined = &mut player => joined,
            _ = cancel.cancelled() => {
                stop.store(true, Ordering::SeqCst);
                player.await
            }
        };
        joined.map_err(|e| CoachError::Audio(format!("playback thread failed: {e}")))?
    }
}
