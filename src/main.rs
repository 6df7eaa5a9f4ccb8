use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use finsee_voice::audio::{AudioPlayback, DeviceCapture};
use finsee_voice::flow::{registration_flow, ConversationFlowEngine};
use finsee_voice::speech::intent::HttpIntentResolver;
use finsee_voice::speech::sarvam::{SarvamClient, SarvamSynthesis};
use finsee_voice::speech::SpeechCapture;
use finsee_voice::{AudioTurnArbiter, Config, ProfileStore, VoiceSession};

/// Finsee - voice-first accessibility layer for the Finsee banking app
#[derive(Parser)]
#[command(name = "finsee", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "FINSEE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Show the stored registration profile
    ShowProfile,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,finsee_voice=info",
        1 => "info,finsee_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::ShowProfile => show_profile(&config),
        };
    }

    run_session(config).await
}

/// Build the full voice stack and drive it from a stdin tap harness
///
/// Each empty line is one tap. On a phone the taps come from the touch
/// screen; here they come from the Enter key so the whole flow can run on a
/// development machine.
async fn run_session(config: Config) -> anyhow::Result<()> {
    let mut session = build_session(&config)?;

    println!("Tap harness: press Enter for a tap, q + Enter to quit.");
    println!("Triple tap (three Enters within 1s) toggles accessibility mode.");
    println!("Double tap (two Enters within 300ms) starts/stops recording.\n");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == "q" {
            break;
        }
        match session.on_tap(Instant::now()).await {
            Ok(Some(gesture)) => {
                println!(
                    "-> {gesture:?} | mode: {} | flow: {:?}",
                    if session.accessibility_enabled() { "on" } else { "off" },
                    session.engine().phase()
                );
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "tap handling failed"),
        }
    }

    tracing::info!("session ended");
    Ok(())
}

/// Wire the device, speech, and flow layers together
fn build_session(config: &Config) -> anyhow::Result<VoiceSession> {
    let client = Arc::new(SarvamClient::new(
        config.backend.api_key.clone().unwrap_or_default(),
        config.backend.base_url.clone(),
        config.voice.stt_model.clone(),
        config.voice.tts_model.clone(),
    )?);

    let playback = AudioPlayback::new()?;
    let synthesis = SarvamSynthesis::new(Arc::clone(&client), playback);
    let capture = DeviceCapture::new()?;

    let arbiter = Arc::new(AudioTurnArbiter::new(
        Box::new(synthesis),
        Box::new(capture),
        config.voice.voice_params(),
        config.voice.capture_format(),
    ));

    let resolver = HttpIntentResolver::new(config.backend.intent_url.clone());
    let store = ProfileStore::new(&config.data_dir());

    let engine = ConversationFlowEngine::new(
        registration_flow(),
        Arc::clone(&arbiter),
        Box::new(resolver),
        Box::new(store),
    )?;

    Ok(VoiceSession::new(
        arbiter,
        engine,
        Box::new(client),
        config.voice.language.clone(),
        &config.gesture,
    ))
}

/// Test microphone input
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Recording from microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = DeviceCapture::new()?;
    let format = config.voice.capture_format();
    let handle = capture.start(format).await?;

    tokio::time::sleep(Duration::from_secs(duration)).await;
    let audio = capture.stop(handle).await?;

    let mut reader = hound::WavReader::open(audio.path())?;
    let samples: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / 32768.0))
        .collect::<Result<_, _>>()?;

    let energy = calculate_rms(&samples);
    let peak = samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);

    println!("Recorded {} samples at {} Hz", samples.len(), format.sample_rate);
    println!("RMS: {energy:.4} | Peak: {peak:.4}");
    println!("Saved to: {}", audio.path().display());
    println!("\n---");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // 2 seconds of 440Hz sine at 22.05kHz
    let sample_rate = 22_050_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.play(samples, sample_rate).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output via Sarvam
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let client = SarvamClient::new(
        config.backend.api_key.clone().unwrap_or_default(),
        config.backend.base_url.clone(),
        config.voice.stt_model.clone(),
        config.voice.tts_model.clone(),
    )?;

    println!("Synthesizing speech...");
    let wav = client.synthesize(text, &config.voice.voice_params()).await?;
    println!("Got {} bytes of audio data", wav.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    playback.play_wav(&wav).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Show the stored registration profile
fn show_profile(config: &Config) -> anyhow::Result<()> {
    let store = ProfileStore::new(&config.data_dir());

    match store.load()? {
        Some(profile) => {
            println!("Profile at {}", store.path().display());
            println!("Saved: {}", profile.saved_at);
            for (slot, value) in &profile.slots {
                println!("  {slot}: {value}");
            }
        }
        None => println!("No profile stored yet."),
    }

    Ok(())
}
