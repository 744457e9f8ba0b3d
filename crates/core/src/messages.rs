use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Commands sent from a front end (CLI, UI, controller) to the console modules.
///
/// Decks are addressed by index (0 = A, 1 = B); the DJ module translates these
/// into its own typed commands.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    // Deck commands
    DjLoadFile {
        deck: u8,
        path: PathBuf,
    },
    DjEject {
        deck: u8,
    },
    DjPlayPause {
        deck: u8,
    },
    DjToggleSync {
        deck: u8,
    },
    DjSetRate {
        deck: u8,
        rate: f64,
    },
    DjSetVolume {
        deck: u8,
        db: f64,
    },
    DjSetFilter {
        deck: u8,
        cutoff_hz: f64,
    },
    /// Band 0 = low, 1 = mid, 2 = high.
    DjSetEq {
        deck: u8,
        band: u8,
        db: f64,
    },
    DjSetPan {
        deck: u8,
        pan: f64,
    },

    // Mixer commands
    DjSetCrossfade {
        position: f64,
    },
    DjSetMasterVolume {
        db: f64,
    },
    DjSetMasterTempo {
        bpm: f64,
    },

    // Voice commands
    VoiceStartRecording,
    VoiceStopRecording,
    VoicePlay,
    VoiceStop,
    VoiceLoadFile {
        path: PathBuf,
    },
    VoiceSelectPreset {
        id: u8,
    },
    VoiceSetLoop {
        enabled: bool,
    },
    VoiceSetGain {
        gain: f64,
    },

    // Query commands (request state)
    QueryStatus,
}

/// Gain law used by the crossfader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeLaw {
    /// Constant power: cos/sin quarter-wave curves.
    #[default]
    EqualPower,
    /// Straight line: `1 - position` / `position`.
    Linear,
}

impl CrossfadeLaw {
    /// Gains for deck A and deck B at a crossfader position in [0, 1].
    pub fn gains(&self, position: f64) -> (f64, f64) {
        let p = position.clamp(0.0, 1.0);
        match self {
            Self::EqualPower => {
                let angle = p * std::f64::consts::FRAC_PI_2;
                // cos(pi/2) is not exactly zero in floating point
                let snap = |g: f64| if g.abs() < 1e-12 { 0.0 } else { g };
                (snap(angle.cos()), snap(angle.sin()))
            }
            Self::Linear => (1.0 - p, p),
        }
    }
}

/// Settings configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Mixer settings
    /// Duration of ramped parameter writes in milliseconds.
    pub ramp_ms: u32,
    /// Master tempo before any track has been loaded.
    pub default_master_bpm: f64,
    pub crossfade_law: CrossfadeLaw,
    pub master_volume_db: f64,

    // Voice settings
    pub voice_default_preset: u8,
    pub voice_gain: f64,
    pub voice_loop: bool,

    // Metering
    pub analyser_bins: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Mixer defaults
            ramp_ms: 30,
            default_master_bpm: 120.0,
            crossfade_law: CrossfadeLaw::EqualPower,
            master_volume_db: 0.0,

            // Voice defaults
            voice_default_preset: 0,
            voice_gain: 0.8,
            voice_loop: false,

            // Metering defaults
            analyser_bins: 64,
        }
    }
}

impl Settings {
    /// Ramp duration for continuous parameter writes.
    pub fn ramp(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ramp_ms as u64)
    }
}
