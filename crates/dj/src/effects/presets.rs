//! Preset table.

use duodeck_core::Param;

use super::ChainStage;

/// A fixed overlay of parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPreset {
    pub id: u8,
    pub name: &'static str,
    /// Values applied on top of [`NEUTRAL`].
    pub overlay: &'static [(ChainStage, Param, f64)],
}

/// Every tunable parameter and its neutral value.
pub const NEUTRAL: &[(ChainStage, Param, f64)] = &[
    (ChainStage::PitchShift, Param::Pitch, 0.0),
    (ChainStage::PitchShift, Param::Wet, 0.0),
    (ChainStage::BitCrusher, Param::Bits, 16.0),
    (ChainStage::BitCrusher, Param::Wet, 0.0),
    (ChainStage::Distortion, Param::Distortion, 0.0),
    (ChainStage::Distortion, Param::Wet, 0.0),
    (ChainStage::Vibrato, Param::Frequency, 5.0),
    (ChainStage::Vibrato, Param::Depth, 0.0),
    (ChainStage::Vibrato, Param::Wet, 0.0),
    (ChainStage::Delay, Param::DelayTime, 0.25),
    (ChainStage::Delay, Param::Feedback, 0.0),
    (ChainStage::Delay, Param::Wet, 0.0),
    (ChainStage::Reverb, Param::Decay, 1.5),
    (ChainStage::Reverb, Param::Wet, 0.0),
    (ChainStage::Eq, Param::Low, 0.0),
    (ChainStage::Eq, Param::Mid, 0.0),
    (ChainStage::Eq, Param::High, 0.0),
];

pub static PRESETS: [EffectPreset; 7] = [
    EffectPreset {
        id: 0,
        name: "Natural",
        overlay: &[],
    },
    EffectPreset {
        id: 1,
        name: "Demon",
        overlay: &[
            (ChainStage::PitchShift, Param::Pitch, -5.0),
            (ChainStage::PitchShift, Param::Wet, 1.0),
            (ChainStage::Distortion, Param::Distortion, 0.5),
            (ChainStage::Distortion, Param::Wet, 1.0),
        ],
    },
    EffectPreset {
        id: 2,
        name: "Chipmunk",
        overlay: &[
            (ChainStage::PitchShift, Param::Pitch, 7.0),
            (ChainStage::PitchShift, Param::Wet, 1.0),
        ],
    },
    EffectPreset {
        id: 3,
        name: "Robot",
        overlay: &[
            (ChainStage::BitCrusher, Param::Bits, 4.0),
            (ChainStage::BitCrusher, Param::Wet, 0.8),
            (ChainStage::Vibrato, Param::Frequency, 30.0),
            (ChainStage::Vibrato, Param::Depth, 0.2),
            (ChainStage::Vibrato, Param::Wet, 1.0),
        ],
    },
    EffectPreset {
        id: 4,
        name: "Radio",
        overlay: &[
            (ChainStage::Distortion, Param::Distortion, 0.15),
            (ChainStage::Distortion, Param::Wet, 0.5),
            (ChainStage::Eq, Param::Low, -30.0),
            (ChainStage::Eq, Param::Mid, 6.0),
            (ChainStage::Eq, Param::High, -20.0),
        ],
    },
    EffectPreset {
        id: 5,
        name: "Cavern",
        overlay: &[
            (ChainStage::Delay, Param::DelayTime, 0.35),
            (ChainStage::Delay, Param::Feedback, 0.45),
            (ChainStage::Delay, Param::Wet, 0.4),
            (ChainStage::Reverb, Param::Decay, 6.0),
            (ChainStage::Reverb, Param::Wet, 0.6),
        ],
    },
    EffectPreset {
        id: 6,
        name: "Alien",
        overlay: &[
            (ChainStage::PitchShift, Param::Pitch, 3.0),
            (ChainStage::PitchShift, Param::Wet, 1.0),
            (ChainStage::Vibrato, Param::Frequency, 8.0),
            (ChainStage::Vibrato, Param::Depth, 0.6),
            (ChainStage::Vibrato, Param::Wet, 1.0),
            (ChainStage::Reverb, Param::Decay, 3.0),
            (ChainStage::Reverb, Param::Wet, 0.35),
        ],
    },
];

/// Look up a preset by id.
pub fn preset(id: u8) -> Option<&'static EffectPreset> {
    PRESETS.get(id as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_positions() {
        for (index, preset) in PRESETS.iter().enumerate() {
            assert_eq!(preset.id as usize, index);
        }
        assert!(preset(7).is_none());
    }

    #[test]
    fn test_overlays_only_touch_tunables() {
        for preset in PRESETS.iter() {
            for &(stage, param, _) in preset.overlay {
                assert!(
                    NEUTRAL.iter().any(|&(s, p, _)| s == stage && p == param),
                    "{}: {:?}.{:?} is not tunable",
                    preset.name,
                    stage,
                    param
                );
                assert!(stage.node_kind().accepts(param));
            }
        }
    }
}
