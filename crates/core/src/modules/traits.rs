use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ConsoleCommand;

/// Unique identifier for each module type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Dj,
    Voice,
}

/// Events that can be sent between modules
#[derive(Debug, Clone)]
pub enum ModuleEvent {
    /// Command from a front end
    Command(ConsoleCommand),
    /// Deck finished loading a track, with its transport after the load
    DeckLoaded {
        deck: u8,
        bpm: f64,
        duration_seconds: f64,
        is_playing: bool,
        playback_rate: f64,
        is_synced: bool,
    },
    /// A deck load failed; the previous track is still loaded
    DeckLoadFailed {
        deck: u8,
        message: String,
    },
    /// Deck transport/tempo state changed
    DeckStateChanged {
        deck: u8,
        is_playing: bool,
        playback_rate: f64,
        is_synced: bool,
        bpm: f64,
    },
    /// Master tempo changed
    MasterTempoChanged {
        bpm: f64,
    },
    /// Crossfader moved
    CrossfadeChanged {
        position: f64,
        gain_a: f64,
        gain_b: f64,
    },
    /// Master output level changed
    MasterVolumeChanged {
        db: f64,
    },
    /// Voice unit state changed
    VoiceStateChanged {
        recording: bool,
        playing: bool,
        has_buffer: bool,
        preset: u8,
        looping: bool,
        gain: f64,
    },
    /// System events
    Shutdown,
}

/// Messages passed between modules and the module manager
#[derive(Debug)]
pub enum ModuleMessage {
    Event(ModuleEvent),
    Status(String),
    Error(String),
}

/// Trait that all async modules must implement
#[async_trait]
pub trait AsyncModule: Send + Sync {
    /// Get the unique identifier for this module
    fn id(&self) -> ModuleId;

    /// Initialize the module (called once at startup)
    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Start the module's main loop
    async fn run(
        &mut self,
        rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Shutdown the module gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Get the module's status
    fn status(&self) -> HashMap<String, String>;
}
