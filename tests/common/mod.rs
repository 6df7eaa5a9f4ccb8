//! Shared mocks for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Notify;

use finsee_voice::flow::{
    registration_flow, ConversationFlowEngine, IntentResolution, IntentResolver, SlotStore,
};
use finsee_voice::speech::{
    AudioRef, CaptureFormat, RecordingHandle, SpeechCapture, SpeechSynthesis, Transcriber,
    VoiceParams,
};
use finsee_voice::{AudioTurnArbiter, Error, Result};

/// Synthesis mock that records utterances and enforces exclusive playback
///
/// `stop` tears an in-flight `play` down the way a real sink drops its
/// stream: the cancelled utterance never reaches the spoken log.
pub struct MockSynthesis {
    spoken: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail: bool,
    active: Arc<AtomicUsize>,
    cancel: Notify,
}

impl MockSynthesis {
    pub fn new() -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            fail: false,
            active: Arc::new(AtomicUsize::new(0)),
            cancel: Notify::new(),
        }
    }

    /// Playback takes `delay` of (tokio) time, so tests can observe overlap
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// Every `play` call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn spoken_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.spoken)
    }
}

#[async_trait]
impl SpeechSynthesis for MockSynthesis {
    async fn play(&self, text: &str, _params: &VoiceParams) -> Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst);
        assert_eq!(active, 0, "two playbacks were live at once");

        if !self.delay.is_zero() {
            let cancelled = tokio::select! {
                () = tokio::time::sleep(self.delay) => false,
                () = self.cancel.notified() => true,
            };
            if cancelled {
                // stop() already released the playback slot
                return Ok(());
            }
        }
        let _ = self
            .active
            .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst);

        if self.fail {
            return Err(Error::SpeechDevice("mock synthesis failure".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn stop(&self) {
        self.active.store(0, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Capture mock that tracks one recording at a time
pub struct MockCapture {
    active: Arc<Mutex<Option<RecordingHandle>>>,
    fail_start: bool,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            fail_start: false,
        }
    }

    /// Every `start` call fails
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SpeechCapture for MockCapture {
    async fn start(&self, _format: CaptureFormat) -> Result<RecordingHandle> {
        if self.fail_start {
            return Err(Error::Audio("mock capture failure".to_string()));
        }
        let mut active = self.active.lock().unwrap();
        assert!(active.is_none(), "two recordings were live at once");
        let handle = RecordingHandle::new();
        *active = Some(handle);
        Ok(handle)
    }

    async fn stop(&self, handle: RecordingHandle) -> Result<AudioRef> {
        let mut active = self.active.lock().unwrap();
        match active.take() {
            Some(current) if current == handle => {
                Ok(AudioRef(PathBuf::from(format!("/tmp/mock-{handle}.wav"))))
            }
            other => {
                *active = other;
                Err(Error::Audio(format!("unknown recording handle {handle}")))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Transcriber mock fed from a response queue (last response repeats)
pub struct MockTranscriber {
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockTranscriber {
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::with_responses(vec![Ok(text.to_string())])
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &AudioRef, _language_hint: &str) -> Result<String> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            match responses.front() {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(Error::Stt(e.to_string())),
                None => Ok(String::new()),
            }
        }
    }
}

/// Resolver mock replaying a scripted sequence of resolutions
pub struct ScriptedResolver {
    script: Mutex<VecDeque<Result<IntentResolution>>>,
}

impl ScriptedResolver {
    pub fn new(script: Vec<Result<IntentResolution>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl IntentResolver for ScriptedResolver {
    async fn resolve(
        &self,
        _transcript: &str,
        _current_step: &str,
        _slots: &IndexMap<String, String>,
    ) -> Result<IntentResolution> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Intent("script exhausted".to_string())))
    }
}

/// Slot store mock capturing the saved snapshot
pub struct MemoryStore {
    saved: Arc<Mutex<Option<IndexMap<String, String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            saved: Arc::new(Mutex::new(None)),
        }
    }

    pub fn saved(&self) -> Arc<Mutex<Option<IndexMap<String, String>>>> {
        Arc::clone(&self.saved)
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn save(&self, slots: &IndexMap<String, String>) -> Result<()> {
        *self.saved.lock().unwrap() = Some(slots.clone());
        Ok(())
    }
}

/// Shorthand for a scripted resolution
pub fn resolution(
    step: &str,
    value: Option<&str>,
    message: &str,
    needs_confirmation: bool,
) -> Result<IntentResolution> {
    Ok(serde_json::from_value(serde_json::json!({
        "step": step,
        "value": value,
        "message": message,
        "needs_confirmation": needs_confirmation,
    }))
    .unwrap())
}

/// Arbiter over the given mocks
pub fn arbiter_with(synthesis: MockSynthesis, capture: MockCapture) -> Arc<AudioTurnArbiter> {
    Arc::new(AudioTurnArbiter::new(
        Box::new(synthesis),
        Box::new(capture),
        VoiceParams::default(),
        CaptureFormat::default(),
    ))
}

/// A flow engine over mocks, plus the observable ends of each mock
pub struct FlowFixture {
    pub engine: ConversationFlowEngine,
    pub arbiter: Arc<AudioTurnArbiter>,
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub saved: Arc<Mutex<Option<IndexMap<String, String>>>>,
}

pub fn flow_fixture(script: Vec<Result<IntentResolution>>) -> FlowFixture {
    let synthesis = MockSynthesis::new();
    let spoken = synthesis.spoken_log();
    let arbiter = arbiter_with(synthesis, MockCapture::new());
    let store = MemoryStore::new();
    let saved = store.saved();
    let engine = ConversationFlowEngine::new(
        registration_flow(),
        Arc::clone(&arbiter),
        Box::new(ScriptedResolver::new(script)),
        Box::new(store),
    )
    .unwrap();

    FlowFixture {
        engine,
        arbiter,
        spoken,
        saved,
    }
}
