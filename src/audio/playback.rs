//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::{Error, Result};

/// Plays audio to the default output device
///
/// Playback is abortable: [`AudioPlayback::stop`] makes any in-flight
/// [`AudioPlayback::play`] return early and tear down its stream. Each run
/// gets its own abort token, so a stop aimed at one run cannot be lost to a
/// run started right after it. The cpal stream is built inside the blocking
/// task, so it never crosses threads.
pub struct AudioPlayback {
    current: Mutex<Arc<AtomicBool>>,
}

impl AudioPlayback {
    /// Create a new playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            current: Mutex::new(Arc::new(AtomicBool::new(false))),
        })
    }

    /// Play audio from WAV bytes, resolving when playback finishes or aborts
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play_wav(&self, wav: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_wav(wav)?;
        self.play(samples, sample_rate).await
    }

    /// Play raw f32 samples
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let abort = self.begin_run();
        tokio::task::spawn_blocking(move || play_samples_blocking(samples, sample_rate, &abort))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    /// Abort the playback run in flight, if any
    pub fn stop(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.store(true, Ordering::Relaxed);
    }

    /// Mint a fresh abort token and install it as the current run's
    fn begin_run(&self) -> Arc<AtomicBool> {
        let abort = Arc::new(AtomicBool::new(false));
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::clone(&abort);
        abort
    }
}

/// Play samples on the default output device, blocking until done or aborted
fn play_samples_blocking(samples: Vec<f32>, sample_rate: u32, abort: &AtomicBool) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = config.channels as usize;

    let sample_count = samples.len();
    let finished = Arc::new(AtomicBool::new(false));
    let finished_clone = Arc::clone(&finished);
    let mut pos = 0_usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = if pos < samples.len() {
                        let s = samples[pos];
                        pos += 1;
                        s
                    } else {
                        finished_clone.store(true, Ordering::Relaxed);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Poll for completion with timeout
    let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) && !abort.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    if abort.load(Ordering::Relaxed) {
        drop(stream);
        tracing::debug!(samples = sample_count, "playback aborted");
        return Ok(());
    }

    // Small delay to let the tail drain
    std::thread::sleep(std::time::Duration::from_millis(100));
    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode WAV bytes to mono f32 samples and their sample rate
fn decode_wav(wav: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        #[allow(clippy::cast_precision_loss)]
                        let v = v as f32;
                        v / scale
                    })
                    .map_err(|e| Error::Audio(e.to_string()))
                })
                .collect::<Result<_>>()?
        }
    };

    // Downmix stereo to mono
    let samples = if spec.channels == 2 {
        samples
            .chunks(2)
            .map(|chunk| f32::midpoint(chunk[0], chunk.get(1).copied().unwrap_or(chunk[0])))
            .collect()
    } else {
        samples
    };

    Ok((samples, spec.sample_rate))
}
