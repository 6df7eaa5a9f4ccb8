//! Audio capture from microphone

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::Mutex;

use crate::speech::{AudioRef, CaptureFormat, RecordingHandle, SpeechCapture};
use crate::{Error, Result};

/// One in-flight recording
///
/// The cpal stream is not `Send`, so it lives on a dedicated worker thread for
/// the duration of the recording; this struct holds the shared state the async
/// side uses to drain and stop it.
struct CaptureSession {
    handle: RecordingHandle,
    format: CaptureFormat,
    buffer: Arc<StdMutex<Vec<f32>>>,
    stop: Arc<AtomicBool>,
    worker: std::thread::JoinHandle<()>,
}

/// Speech capture collaborator backed by the default input device
pub struct DeviceCapture {
    session: Mutex<Option<CaptureSession>>,
}

impl DeviceCapture {
    /// Create a new capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio capture initialized"
        );

        Ok(Self {
            session: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SpeechCapture for DeviceCapture {
    async fn start(&self, format: CaptureFormat) -> Result<RecordingHandle> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(Error::Audio("a recording is already in progress".to_string()));
        }

        let handle = RecordingHandle::new();
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<std::result::Result<(), String>>();
        let worker_buffer = Arc::clone(&buffer);
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::spawn(move || {
            match build_input_stream(format, worker_buffer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    while !worker_stop.load(Ordering::Relaxed) {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                tracing::debug!(%handle, sample_rate = format.sample_rate, "audio capture started");
                *session = Some(CaptureSession {
                    handle,
                    format,
                    buffer,
                    stop,
                    worker,
                });
                Ok(handle)
            }
            Ok(Err(msg)) => Err(Error::Audio(msg)),
            Err(_) => Err(Error::Audio("capture worker exited before starting".to_string())),
        }
    }

    async fn stop(&self, handle: RecordingHandle) -> Result<AudioRef> {
        let session = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.take() else {
                return Err(Error::Audio("no recording in progress".to_string()));
            };
            if session.handle != handle {
                let unknown = handle;
                *guard = Some(session);
                return Err(Error::Audio(format!("unknown recording handle {unknown}")));
            }
            session
        };

        session.stop.store(true, Ordering::Relaxed);
        let worker = session.worker;
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|e| Error::Audio(format!("capture join task failed: {e}")))?
            .map_err(|_| Error::Audio("capture worker panicked".to_string()))?;

        let samples = session
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        tracing::debug!(%handle, samples = samples.len(), "audio capture stopped");

        let wav = samples_to_wav(&samples, session.format.sample_rate)?;
        let file = tempfile::Builder::new()
            .prefix("finsee-rec-")
            .suffix(".wav")
            .tempfile()?;
        let (mut file, path) = file.keep().map_err(|e| Error::Audio(e.to_string()))?;
        file.write_all(&wav)?;

        Ok(AudioRef(path))
    }

    fn name(&self) -> &'static str {
        "device"
    }
}

/// Open the default input device and start streaming into `buffer`
fn build_input_stream(
    format: CaptureFormat,
    buffer: Arc<StdMutex<Vec<f32>>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == format.channels
                && c.min_sample_rate() <= SampleRate(format.sample_rate)
                && c.max_sample_rate() >= SampleRate(format.sample_rate)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(format.sample_rate))
        .config();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_encoding_produces_valid_header() {
        let samples = vec![0.0_f32; 1600];
        let wav = samples_to_wav(&samples, 16_000).unwrap();

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn wav_encoding_clamps_out_of_range_samples() {
        let samples = vec![2.0_f32, -2.0];
        let wav = samples_to_wav(&samples, 16_000).unwrap();

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, i16::MIN]);
    }
}
