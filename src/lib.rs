//! Finsee voice layer - voice-first accessibility for the Finsee banking app
//!
//! Lets a user drive the registration flow entirely by ear and touch:
//! tap gestures toggle modes and recording, prompts are spoken aloud, and
//! answers are captured, transcribed, and fed through an intent backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Voice Session                      │
//! │   taps → gestures → mode / record toggles            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Conversation Flow Engine                │
//! │   prompt → listen → resolve intent → commit slot     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Audio Turn Arbiter                     │
//! │   exclusive speak / listen over one audio device     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Sarvam STT/TTS  │  cpal capture/playback           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod flow;
pub mod gesture;
pub mod profile;
pub mod session;
pub mod speech;
pub mod turn;

pub use config::Config;
pub use error::{Error, Result};
pub use flow::{ConversationFlowEngine, FlowPhase, TurnOutcome};
pub use gesture::{Gesture, GestureRecognizer};
pub use profile::ProfileStore;
pub use session::VoiceSession;
pub use turn::{AudioTurn, AudioTurnArbiter};
