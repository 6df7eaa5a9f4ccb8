//! Local audio device access (microphone capture and speaker playback)

mod capture;
mod playback;

pub use capture::{samples_to_wav, DeviceCapture};
pub use playback::AudioPlayback;
