//! Two-deck mixer bus: crossfader, master gain and master tempo.

use std::sync::Arc;
use std::time::Duration;

use duodeck_core::{
    build_chain, normalize_level, AudioBuffer, AudioGraph, CrossfadeLaw, GraphError, NodeId,
    NodeKind, Param, ParamWrite, Settings, SubscriptionId, Subscribers,
};
use parking_lot::RwLock;

use crate::deck::{DeckController, DeckError, DeckId, LoadReport, MasterLink, VOLUME_RANGE_DB};
use crate::tempo::TempoEstimator;
use crate::track::{LoadError, Track};

/// Session-wide mixer state shared with the decks.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterState {
    pub bpm: f64,
    /// Tempo the session started with.
    pub default_bpm: f64,
    /// Cleared once the tempo is set or adopted.
    tempo_is_default: bool,
    /// 0 = full deck A, 1 = full deck B.
    pub crossfade_position: f64,
    pub master_volume_db: f64,
}

impl MasterState {
    pub fn new(default_bpm: f64) -> Self {
        Self {
            bpm: default_bpm,
            default_bpm,
            tempo_is_default: true,
            crossfade_position: 0.5,
            master_volume_db: 0.0,
        }
    }

    pub fn is_default_tempo(&self) -> bool {
        self.tempo_is_default
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
        self.tempo_is_default = false;
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new(120.0)
    }
}

/// Notifications published by the mixer.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerEvent {
    MasterTempoChanged { bpm: f64 },
    CrossfadeChanged { position: f64, gain_a: f64, gain_b: f64 },
    MasterVolumeChanged { db: f64 },
}

/// Owns both decks and the master section.
pub struct MixerBus {
    graph: Arc<dyn AudioGraph>,
    master: Arc<RwLock<MasterState>>,
    decks: [DeckController; 2],
    crossfade_gains: [NodeId; 2],
    master_gain: NodeId,
    master_meter: NodeId,
    law: CrossfadeLaw,
    ramp: Duration,
    estimator: TempoEstimator,
    subscribers: Subscribers<MixerEvent>,
}

impl MixerBus {
    /// Build both deck strips and the master section.
    pub fn new(graph: Arc<dyn AudioGraph>, settings: &Settings) -> Result<Self, GraphError> {
        let ramp = settings.ramp();
        let master = Arc::new(RwLock::new(MasterState::new(settings.default_master_bpm)));

        let master_chain = build_chain(
            graph.as_ref(),
            &[NodeKind::Gain, NodeKind::Meter, NodeKind::Output],
        )?;
        let (master_gain, master_meter) = (master_chain[0], master_chain[1]);

        let deck_a = DeckController::new(DeckId::A, graph.clone(), MasterLink::new(&master), ramp)?;
        let deck_b = DeckController::new(DeckId::B, graph.clone(), MasterLink::new(&master), ramp)?;

        let mut crossfade_gains = [NodeId(0); 2];
        for (slot, deck) in crossfade_gains.iter_mut().zip([&deck_a, &deck_b]) {
            let node = graph.create_node(NodeKind::Gain);
            graph.connect(deck.output_node(), node)?;
            graph.connect(node, master_gain)?;
            *slot = node;
        }

        let mut mixer = Self {
            graph,
            master,
            decks: [deck_a, deck_b],
            crossfade_gains,
            master_gain,
            master_meter,
            law: settings.crossfade_law,
            ramp,
            estimator: TempoEstimator::default(),
            subscribers: Subscribers::new(),
        };

        let (gain_a, gain_b) = mixer.law.gains(0.5);
        mixer.write_crossfade(gain_a, gain_b, ParamWrite::Immediate)?;
        let volume = settings.master_volume_db.clamp(VOLUME_RANGE_DB.0, VOLUME_RANGE_DB.1);
        mixer.graph.set_param(
            master_gain,
            Param::VolumeDb,
            volume,
            ParamWrite::Immediate,
        )?;
        mixer.master.write().master_volume_db = volume;

        log::info!(
            "Mixer ready: master {} BPM, {:?} crossfade",
            settings.default_master_bpm,
            mixer.law
        );
        Ok(mixer)
    }

    pub fn with_estimator(mut self, estimator: TempoEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimator(&self) -> &TempoEstimator {
        &self.estimator
    }

    pub fn deck(&self, id: DeckId) -> &DeckController {
        &self.decks[id.index()]
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut DeckController {
        &mut self.decks[id.index()]
    }

    pub fn master_state(&self) -> MasterState {
        self.master.read().clone()
    }

    pub fn master_bpm(&self) -> f64 {
        self.master.read().bpm
    }

    pub fn crossfade_law(&self) -> CrossfadeLaw {
        self.law
    }

    /// Current (deck A, deck B) crossfade gains.
    pub fn crossfade_gains(&self) -> (f64, f64) {
        self.law.gains(self.master.read().crossfade_position)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&MixerEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Move the crossfader. Out-of-range positions are clamped, NaN ignored.
    pub fn set_crossfade(&mut self, position: f64) -> Result<(), GraphError> {
        if position.is_nan() {
            log::warn!("Ignoring NaN crossfade position");
            return Ok(());
        }
        let position = position.clamp(0.0, 1.0);
        let (gain_a, gain_b) = self.law.gains(position);
        self.write_crossfade(gain_a, gain_b, ParamWrite::ramp(self.ramp))?;
        self.master.write().crossfade_position = position;

        log::debug!("Crossfade {:.3} -> A {:.3} / B {:.3}", position, gain_a, gain_b);
        self.subscribers.notify(&MixerEvent::CrossfadeChanged {
            position,
            gain_a,
            gain_b,
        });
        Ok(())
    }

    pub fn set_master_volume(&mut self, db: f64) -> Result<(), GraphError> {
        if db.is_nan() {
            log::warn!("Ignoring NaN master volume");
            return Ok(());
        }
        let db = db.clamp(VOLUME_RANGE_DB.0, VOLUME_RANGE_DB.1);
        self.graph.set_param(
            self.master_gain,
            Param::VolumeDb,
            db,
            ParamWrite::ramp(self.ramp),
        )?;
        self.master.write().master_volume_db = db;
        self.subscribers
            .notify(&MixerEvent::MasterVolumeChanged { db });
        Ok(())
    }

    /// Set the master tempo and re-lock every synced deck.
    ///
    /// Non-positive or non-finite tempos are ignored.
    pub fn set_master_tempo(&mut self, bpm: f64) -> Result<(), DeckError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::warn!("Ignoring invalid master tempo {}", bpm);
            return Ok(());
        }
        self.master.write().set_bpm(bpm);
        log::info!("Master tempo {:.2} BPM", bpm);

        let mut first_error = None;
        for deck in &mut self.decks {
            if let Err(e) = deck.on_master_tempo_changed(bpm) {
                log::error!("Deck {} failed to follow master tempo: {}", deck.id(), e);
                first_error.get_or_insert(e);
            }
        }

        self.subscribers
            .notify(&MixerEvent::MasterTempoChanged { bpm });
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Complete an outstanding deck load, adopting its tempo when proposed.
    pub fn finish_load(
        &mut self,
        deck: DeckId,
        result: Result<Track, LoadError>,
    ) -> Result<LoadReport, DeckError> {
        let report = self.deck_mut(deck).finish_load(result)?;
        self.adopt(deck, report)?;
        Ok(report)
    }

    /// Load decoded audio onto a deck and adopt its tempo when proposed.
    pub async fn load_track(
        &mut self,
        deck: DeckId,
        audio: AudioBuffer,
    ) -> Result<LoadReport, DeckError> {
        let estimator = self.estimator.clone();
        let report = self.deck_mut(deck).load_track(audio, &estimator).await?;
        self.adopt(deck, report)?;
        Ok(report)
    }

    /// Normalized 0..1 master output level.
    pub fn master_level(&self) -> f64 {
        self.graph
            .read_level_db(self.master_meter)
            .map(normalize_level)
            .unwrap_or(0.0)
    }

    fn adopt(&mut self, deck: DeckId, report: LoadReport) -> Result<(), DeckError> {
        if report.propose_master && self.master.read().is_default_tempo() {
            log::info!("Adopting deck {} tempo {} as master", deck, report.bpm);
            self.set_master_tempo(report.bpm)?;
        }
        Ok(())
    }

    fn write_crossfade(&self, gain_a: f64, gain_b: f64, write: ParamWrite) -> Result<(), GraphError> {
        let [a, b] = self.crossfade_gains;
        self.graph.set_param(a, Param::Gain, gain_a, write)?;
        self.graph.set_param(b, Param::Gain, gain_b, write)?;
        Ok(())
    }
}

impl std::fmt::Debug for MixerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerBus")
            .field("master", &*self.master.read())
            .field("decks", &self.decks)
            .field("law", &self.law)
            .finish()
    }
}
