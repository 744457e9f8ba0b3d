//! Voice effect chain and the preset bank that drives it.
//!
//! The chain order is fixed. Presets only change per-stage parameter values,
//! and selecting one always starts from the neutral state.

mod presets;

use std::collections::BTreeMap;
use std::sync::Arc;

use duodeck_core::{AudioGraph, GraphError, NodeId, NodeKind, Param, ParamWrite};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use presets::{preset, EffectPreset, NEUTRAL, PRESETS};

/// Stages of the voice chain, in signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainStage {
    PitchShift,
    BitCrusher,
    Distortion,
    Vibrato,
    Delay,
    Reverb,
    Eq,
    Gain,
    Meter,
    Analyser,
    Output,
}

impl ChainStage {
    pub const ALL: [ChainStage; 11] = [
        Self::PitchShift,
        Self::BitCrusher,
        Self::Distortion,
        Self::Vibrato,
        Self::Delay,
        Self::Reverb,
        Self::Eq,
        Self::Gain,
        Self::Meter,
        Self::Analyser,
        Self::Output,
    ];

    pub fn node_kind(&self) -> NodeKind {
        match self {
            Self::PitchShift => NodeKind::PitchShift,
            Self::BitCrusher => NodeKind::BitCrusher,
            Self::Distortion => NodeKind::Distortion,
            Self::Vibrato => NodeKind::Vibrato,
            Self::Delay => NodeKind::FeedbackDelay,
            Self::Reverb => NodeKind::Reverb,
            Self::Eq => NodeKind::Eq3,
            Self::Gain => NodeKind::Gain,
            Self::Meter => NodeKind::Meter,
            Self::Analyser => NodeKind::Analyser,
            Self::Output => NodeKind::Output,
        }
    }
}

/// One node per [`ChainStage`], connected in order.
#[derive(Debug, Clone)]
pub struct EffectChain {
    nodes: [NodeId; ChainStage::ALL.len()],
}

impl EffectChain {
    /// Create the chain's nodes and connect them.
    pub fn build(graph: &dyn AudioGraph) -> Result<Self, GraphError> {
        let kinds = ChainStage::ALL.map(|stage| stage.node_kind());
        let ids = duodeck_core::build_chain(graph, &kinds)?;
        let mut nodes = [NodeId(0); ChainStage::ALL.len()];
        nodes.copy_from_slice(&ids);
        Ok(Self { nodes })
    }

    pub fn node(&self, stage: ChainStage) -> NodeId {
        self.nodes[stage as usize]
    }

    /// First node of the chain.
    pub fn input(&self) -> NodeId {
        self.node(ChainStage::PitchShift)
    }
}

/// Value of every tunable parameter in the chain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterState {
    values: BTreeMap<(ChainStage, Param), f64>,
}

impl ParameterState {
    /// Every tunable at its neutral value.
    pub fn neutral() -> Self {
        Self {
            values: NEUTRAL
                .iter()
                .map(|&(stage, param, value)| ((stage, param), value))
                .collect(),
        }
    }

    /// Neutral state overlaid with a preset.
    pub fn for_preset(preset: &EffectPreset) -> Self {
        let mut state = Self::neutral();
        for &(stage, param, value) in preset.overlay {
            state.values.insert((stage, param), value);
        }
        state
    }

    pub fn get(&self, stage: ChainStage, param: Param) -> Option<f64> {
        self.values.get(&(stage, param)).copied()
    }

    /// Tunables that differ from neutral.
    pub fn changed(&self) -> Vec<(ChainStage, Param, f64)> {
        let neutral = Self::neutral();
        self.values
            .iter()
            .filter(|(key, value)| neutral.values.get(*key) != Some(*value))
            .map(|(&(stage, param), &value)| (stage, param, value))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChainStage, Param, f64)> + '_ {
        self.values
            .iter()
            .map(|(&(stage, param), &value)| (stage, param, value))
    }
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("unknown preset {0}")]
    UnknownPreset(u8),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Applies presets to an [`EffectChain`].
pub struct PresetBank {
    graph: Arc<dyn AudioGraph>,
    chain: EffectChain,
    current: u8,
    parameters: ParameterState,
}

impl PresetBank {
    /// Wrap a chain and put it in the neutral state.
    pub fn new(graph: Arc<dyn AudioGraph>, chain: EffectChain) -> Result<Self, PresetError> {
        let mut bank = Self {
            graph,
            chain,
            current: 0,
            parameters: ParameterState::default(),
        };
        bank.select_preset(0)?;
        Ok(bank)
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn current(&self) -> &'static EffectPreset {
        // The current id always came through select_preset.
        preset(self.current).unwrap_or(&PRESETS[0])
    }

    pub fn current_id(&self) -> u8 {
        self.current
    }

    pub fn parameters(&self) -> &ParameterState {
        &self.parameters
    }

    /// Reset every tunable to neutral, then apply the preset's overlay.
    pub fn select_preset(&mut self, id: u8) -> Result<&'static EffectPreset, PresetError> {
        let preset = preset(id).ok_or(PresetError::UnknownPreset(id))?;
        let target = ParameterState::for_preset(preset);

        for (stage, param, value) in target.iter() {
            self.graph
                .set_param(self.chain.node(stage), param, value, ParamWrite::Immediate)?;
        }

        self.parameters = target;
        self.current = id;
        log::info!("Voice preset {} ({})", id, preset.name);
        Ok(preset)
    }
}

impl std::fmt::Debug for PresetBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetBank")
            .field("current", &self.current)
            .field("chain", &self.chain)
            .finish()
    }
}
