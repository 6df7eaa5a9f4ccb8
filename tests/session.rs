//! Voice session integration tests (gestures driving the flow)

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{
    arbiter_with, resolution, MemoryStore, MockCapture, MockSynthesis, MockTranscriber,
    ScriptedResolver,
};
use finsee_voice::config::GestureConfig;
use finsee_voice::flow::{registration_flow, ConversationFlowEngine, FlowPhase, RETRY_PROMPT};
use finsee_voice::session::{MODE_DISABLED_ANNOUNCEMENT, MODE_ENABLED_ANNOUNCEMENT};
use finsee_voice::{AudioTurnArbiter, Gesture, Result, VoiceSession};

struct SessionFixture {
    session: VoiceSession,
    arbiter: Arc<AudioTurnArbiter>,
    spoken: Arc<Mutex<Vec<String>>>,
}

fn session_fixture(
    script: Vec<Result<finsee_voice::flow::IntentResolution>>,
    transcripts: Vec<Result<String>>,
) -> SessionFixture {
    let synthesis = MockSynthesis::new();
    let spoken = synthesis.spoken_log();
    let arbiter = arbiter_with(synthesis, MockCapture::new());

    let engine = ConversationFlowEngine::new(
        registration_flow(),
        Arc::clone(&arbiter),
        Box::new(ScriptedResolver::new(script)),
        Box::new(MemoryStore::new()),
    )
    .unwrap();

    let session = VoiceSession::new(
        Arc::clone(&arbiter),
        engine,
        Box::new(MockTranscriber::with_responses(transcripts)),
        "en-IN".to_string(),
        &GestureConfig::default(),
    );

    SessionFixture {
        session,
        arbiter,
        spoken,
    }
}

/// Feed taps at the given millisecond offsets, returning the last gesture
async fn taps(
    fixture: &mut SessionFixture,
    base: Instant,
    offsets_ms: &[u64],
) -> Option<Gesture> {
    let mut last = None;
    for &ms in offsets_ms {
        last = fixture
            .session
            .on_tap(base + Duration::from_millis(ms))
            .await
            .unwrap();
    }
    last
}

#[tokio::test]
async fn triple_tap_enables_mode_and_starts_flow() {
    let mut fixture = session_fixture(vec![], vec![]);
    let base = Instant::now();

    let gesture = taps(&mut fixture, base, &[0, 100, 200]).await;

    assert_eq!(gesture, Some(Gesture::TripleTap));
    assert!(fixture.session.accessibility_enabled());
    assert_eq!(
        fixture.spoken.lock().unwrap().as_slice(),
        [
            MODE_ENABLED_ANNOUNCEMENT,
            "Please say your ten digit phone number."
        ]
    );
    assert!(fixture.session.engine().is_listening());
}

#[tokio::test]
async fn double_tap_closes_listen_and_advances_flow() {
    let mut fixture = session_fixture(
        vec![resolution(
            "otp",
            Some("9876543210"),
            "Got your number.",
            false,
        )],
        vec![Ok("my number is 9876543210".to_string())],
    );
    let base = Instant::now();

    taps(&mut fixture, base, &[0, 100, 200]).await;
    let gesture = taps(&mut fixture, base, &[2000, 2100]).await;

    assert_eq!(gesture, Some(Gesture::DoubleTap));
    assert_eq!(fixture.session.engine().slots()["phone"], "9876543210");
    assert_eq!(
        fixture.session.engine().phase(),
        &FlowPhase::AwaitingInput("otp".to_string())
    );
    assert!(fixture.session.engine().is_listening());
}

#[tokio::test]
async fn triple_tap_mid_conversation_cancels_everything() {
    let mut fixture = session_fixture(vec![], vec![]);
    let base = Instant::now();

    taps(&mut fixture, base, &[0, 100, 200]).await;
    assert!(fixture.session.engine().is_listening());

    // Gaps longer than the double-tap window so only the triple pattern forms
    let gesture = taps(&mut fixture, base, &[4000, 4400, 4800]).await;

    assert_eq!(gesture, Some(Gesture::TripleTap));
    assert!(!fixture.session.accessibility_enabled());
    assert_eq!(fixture.session.engine().phase(), &FlowPhase::Cancelled);
    assert!(fixture.arbiter.turn().await.is_idle());
    assert_eq!(
        fixture.spoken.lock().unwrap().last().unwrap(),
        MODE_DISABLED_ANNOUNCEMENT
    );
}

#[tokio::test]
async fn empty_transcript_reprompts_same_step() {
    let mut fixture = session_fixture(vec![], vec![Ok(String::new())]);
    let base = Instant::now();

    taps(&mut fixture, base, &[0, 100, 200]).await;
    taps(&mut fixture, base, &[2000, 2100]).await;

    assert_eq!(
        fixture.session.engine().phase(),
        &FlowPhase::AwaitingInput("phone".to_string())
    );
    assert!(fixture.session.engine().slots().is_empty());
    let spoken = fixture.spoken.lock().unwrap();
    assert!(spoken.last().unwrap().starts_with(RETRY_PROMPT));
    drop(spoken);
    assert!(fixture.session.engine().is_listening());
}

#[tokio::test]
async fn failed_transcription_reprompts_same_step() {
    let mut fixture = session_fixture(
        vec![],
        vec![Err(finsee_voice::Error::Stt("service down".to_string()))],
    );
    let base = Instant::now();

    taps(&mut fixture, base, &[0, 100, 200]).await;
    taps(&mut fixture, base, &[2000, 2100]).await;

    assert_eq!(
        fixture.session.engine().phase(),
        &FlowPhase::AwaitingInput("phone".to_string())
    );
    assert!(fixture
        .spoken
        .lock()
        .unwrap()
        .last()
        .unwrap()
        .starts_with(RETRY_PROMPT));
}

#[tokio::test]
async fn taps_do_nothing_while_mode_is_off() {
    let mut fixture = session_fixture(vec![], vec![]);
    let base = Instant::now();

    assert_eq!(taps(&mut fixture, base, &[0, 100]).await, None);

    assert!(!fixture.session.accessibility_enabled());
    assert_eq!(fixture.session.engine().phase(), &FlowPhase::NotStarted);
    assert!(fixture.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn completed_triple_resets_pending_double_taps() {
    let mut fixture = session_fixture(vec![], vec![]);
    let base = Instant::now();

    taps(&mut fixture, base, &[0, 100, 200]).await;
    // A slow triple: each tap seeds the double-tap window with one pending
    // tap, and the completed triple must discard it
    taps(&mut fixture, base, &[4000, 4400, 4800]).await;
    assert!(!fixture.session.accessibility_enabled());

    assert_eq!(
        fixture.spoken.lock().unwrap().as_slice(),
        [
            MODE_ENABLED_ANNOUNCEMENT,
            "Please say your ten digit phone number.",
            MODE_DISABLED_ANNOUNCEMENT
        ]
    );

    // Mode back on; one tap right after the announcement must not pair with
    // anything left over from the triple
    taps(&mut fixture, base, &[6000, 6400, 6800]).await;
    assert!(fixture.session.accessibility_enabled());
    assert_eq!(taps(&mut fixture, base, &[6900]).await, None);
}
