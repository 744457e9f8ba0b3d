//! Node handles, node kinds and the continuous parameters they expose.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Opaque handle to a node owned by the audio-graph runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node types supplied by the DSP runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Player,
    Filter,
    Eq3,
    Panner,
    Gain,
    Meter,
    Analyser,
    PitchShift,
    BitCrusher,
    Distortion,
    Vibrato,
    FeedbackDelay,
    Reverb,
    Microphone,
    Recorder,
    /// Final hardware destination.
    Output,
}

impl NodeKind {
    /// Parameters this node exposes.
    pub fn params(&self) -> &'static [Param] {
        match self {
            Self::Player => &[Param::PlaybackRate],
            Self::Filter => &[Param::Frequency, Param::Q],
            Self::Eq3 => &[Param::Low, Param::Mid, Param::High],
            Self::Panner => &[Param::Pan],
            Self::Gain => &[Param::Gain, Param::VolumeDb],
            Self::PitchShift => &[Param::Pitch, Param::Wet],
            Self::BitCrusher => &[Param::Bits, Param::Wet],
            Self::Distortion => &[Param::Distortion, Param::Wet],
            Self::Vibrato => &[Param::Frequency, Param::Depth, Param::Wet],
            Self::FeedbackDelay => &[Param::DelayTime, Param::Feedback, Param::Wet],
            Self::Reverb => &[Param::Decay, Param::Wet],
            Self::Meter
            | Self::Analyser
            | Self::Microphone
            | Self::Recorder
            | Self::Output => &[],
        }
    }

    /// Returns true if the node exposes the given parameter.
    pub fn accepts(&self, param: Param) -> bool {
        self.params().contains(&param)
    }
}

/// Named continuous parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Param {
    /// Player speed multiplier (1.0 = original speed).
    PlaybackRate,
    /// Cutoff or modulation frequency in Hz.
    Frequency,
    Q,
    /// EQ band gains in dB.
    Low,
    Mid,
    High,
    /// Stereo position, -1.0 (left) to 1.0 (right).
    Pan,
    /// Output level in dB.
    VolumeDb,
    /// Linear gain factor.
    Gain,
    /// Pitch shift in semitones.
    Pitch,
    /// Bit depth for the bit-crusher.
    Bits,
    /// Distortion amount (0.0-1.0).
    Distortion,
    /// Modulation depth (0.0-1.0).
    Depth,
    /// Delay time in seconds.
    DelayTime,
    /// Delay feedback (0.0-1.0).
    Feedback,
    /// Reverb decay in seconds.
    Decay,
    /// Dry/wet mix (0.0 = dry).
    Wet,
}

impl Param {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaybackRate => "playbackRate",
            Self::Frequency => "frequency",
            Self::Q => "Q",
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Pan => "pan",
            Self::VolumeDb => "volume",
            Self::Gain => "gain",
            Self::Pitch => "pitch",
            Self::Bits => "bits",
            Self::Distortion => "distortion",
            Self::Depth => "depth",
            Self::DelayTime => "delayTime",
            Self::Feedback => "feedback",
            Self::Decay => "decay",
            Self::Wet => "wet",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a parameter write is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamWrite {
    /// Jump to the value on the next processing block.
    Immediate,
    /// Glide to the value over the given duration. A new ramp to the same
    /// parameter replaces the one in flight.
    Ramped(Duration),
}

impl ParamWrite {
    /// Ramped write, or immediate when the duration is zero.
    pub fn ramp(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Immediate
        } else {
            Self::Ramped(duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_accepts() {
        assert!(NodeKind::Player.accepts(Param::PlaybackRate));
        assert!(NodeKind::Eq3.accepts(Param::Mid));
        assert!(!NodeKind::Eq3.accepts(Param::Pan));
        assert!(NodeKind::Vibrato.accepts(Param::Frequency));
        assert!(NodeKind::Meter.params().is_empty());
    }

    #[test]
    fn test_zero_ramp_is_immediate() {
        assert_eq!(ParamWrite::ramp(Duration::ZERO), ParamWrite::Immediate);
        assert_eq!(
            ParamWrite::ramp(Duration::from_millis(30)),
            ParamWrite::Ramped(Duration::from_millis(30))
        );
    }
}
