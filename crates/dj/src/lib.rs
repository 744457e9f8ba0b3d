//! duodeck DJ crate
//!
//! Two-deck mixing and a live voice unit on top of the duodeck audio-graph
//! contract.
//!
//! # Features
//!
//! - Offline tempo estimation from decoded audio
//! - Deck transport with tempo sync to a shared master tempo
//! - Crossfader and master section with equal-power or linear law
//! - Voice record/playback with a fixed effect chain and seven presets
//! - Async modules for the duodeck module manager

pub mod deck;
pub mod effects;
pub mod mixer;
pub mod module;
pub mod tempo;
pub mod track;
pub mod voice;

// Re-export main types
pub use deck::{
    DeckController, DeckError, DeckEvent, DeckId, DeckSnapshot, DeckState, EqBand, LoadReport,
    MasterLink, TransportState,
};
pub use effects::{
    ChainStage, EffectChain, EffectPreset, ParameterState, PresetBank, PresetError, NEUTRAL,
    PRESETS,
};
pub use mixer::{MasterState, MixerBus, MixerEvent};
pub use module::{DjCommand, DjModule, VoiceCommand, VoiceModule};
pub use tempo::{EstimatorConfig, TempoAnalysis, TempoEstimator};
pub use track::{decode_file, LoadError, Track, TrackId};
pub use voice::{RecordedTake, VoiceError, VoiceEvent, VoiceMode, VoiceSnapshot, VoiceState, VoiceUnit};
