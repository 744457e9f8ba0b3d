//! Deck module for transport state, playback rate and tempo sync.

use std::sync::{Arc, Weak};
use std::time::Duration;

use duodeck_core::{
    build_chain, normalize_level, AudioBuffer, AudioGraph, GraphError, NodeId, NodeKind, Param,
    ParamWrite, SubscriptionId, Subscribers,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mixer::MasterState;
use crate::tempo::TempoEstimator;
use crate::track::{LoadError, Track};

/// Lowest playback rate a deck accepts.
pub const MIN_RATE: f64 = 0.01;
/// Filter cutoff range in Hz.
pub const FILTER_RANGE_HZ: (f64, f64) = (20.0, 20_000.0);
/// EQ band gain range in dB.
pub const EQ_RANGE_DB: (f64, f64) = (-40.0, 12.0);
/// Channel volume range in dB.
pub const VOLUME_RANGE_DB: (f64, f64) = (-60.0, 6.0);

/// Deck identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    /// Get the deck as a numeric index (0 for A, 1 for B).
    pub fn index(&self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Get the deck as a u8 (0 for A, 1 for B).
    pub fn as_u8(&self) -> u8 {
        self.index() as u8
    }

    /// Get the deck from a numeric index.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }

    /// Get the other deck.
    pub fn other(&self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl std::fmt::Display for DeckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Deck transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// Mutable deck state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeckState {
    pub transport: TransportState,
    /// Always positive.
    pub playback_rate: f64,
    pub is_synced: bool,
    /// Estimated tempo of the loaded track, 0 when unknown.
    pub bpm: f64,
}

impl Default for DeckState {
    fn default() -> Self {
        Self {
            transport: TransportState::Stopped,
            playback_rate: 1.0,
            is_synced: false,
            bpm: 0.0,
        }
    }
}

/// Point-in-time view of a deck for observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeckSnapshot {
    pub deck: DeckId,
    pub transport: TransportState,
    pub playback_rate: f64,
    pub is_synced: bool,
    pub bpm: f64,
    pub has_track: bool,
    pub loading: bool,
}

/// Notifications published by a deck.
#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    /// A track finished loading. The snapshot shows the transport the load left behind.
    Loaded {
        snapshot: DeckSnapshot,
        duration_seconds: f64,
    },
    /// Transport, rate or sync changed.
    StateChanged(DeckSnapshot),
}

/// EQ band selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Mid),
            2 => Some(Self::High),
            _ => None,
        }
    }

    fn param(&self) -> Param {
        match self {
            Self::Low => Param::Low,
            Self::Mid => Param::Mid,
            Self::High => Param::High,
        }
    }
}

/// Deck operation errors.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("deck {0} has no track loaded")]
    NoTrack(DeckId),
    #[error("deck {0} is already loading a track")]
    LoadInFlight(DeckId),
    #[error("deck {0} has no load outstanding")]
    NoLoadPending(DeckId),
    #[error("deck load failed: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Non-owning read access to the mixer's master state.
#[derive(Debug, Clone, Default)]
pub struct MasterLink(Weak<RwLock<MasterState>>);

impl MasterLink {
    pub fn new(master: &Arc<RwLock<MasterState>>) -> Self {
        Self(Arc::downgrade(master))
    }

    /// A link that never resolves.
    pub fn detached() -> Self {
        Self(Weak::new())
    }

    /// Current master tempo, if the mixer is still alive.
    pub fn bpm(&self) -> Option<f64> {
        self.0.upgrade().map(|m| m.read().bpm)
    }

    /// True while the master tempo has never been set or adopted.
    pub fn is_default_tempo(&self) -> bool {
        self.0
            .upgrade()
            .map(|m| m.read().is_default_tempo())
            .unwrap_or(false)
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadReport {
    pub bpm: f64,
    /// The mixer should adopt `bpm` as the master tempo.
    pub propose_master: bool,
}

/// Node handles for one deck channel strip.
#[derive(Debug, Clone, Copy)]
struct DeckNodes {
    player: NodeId,
    filter: NodeId,
    eq: NodeId,
    panner: NodeId,
    gain: NodeId,
    meter: NodeId,
    analyser: NodeId,
}

const DECK_CHAIN: [NodeKind; 7] = [
    NodeKind::Player,
    NodeKind::Filter,
    NodeKind::Eq3,
    NodeKind::Panner,
    NodeKind::Gain,
    NodeKind::Meter,
    NodeKind::Analyser,
];

/// Transport and tempo controller for one deck.
pub struct DeckController {
    id: DeckId,
    graph: Arc<dyn AudioGraph>,
    nodes: DeckNodes,
    master: MasterLink,
    state: DeckState,
    track: Option<Track>,
    loading: bool,
    ramp: Duration,
    subscribers: Subscribers<DeckEvent>,
}

impl DeckController {
    /// Build the deck's channel strip and reset every parameter.
    pub fn new(
        id: DeckId,
        graph: Arc<dyn AudioGraph>,
        master: MasterLink,
        ramp: Duration,
    ) -> Result<Self, GraphError> {
        let nodes = build_chain(graph.as_ref(), &DECK_CHAIN)?;
        let nodes = DeckNodes {
            player: nodes[0],
            filter: nodes[1],
            eq: nodes[2],
            panner: nodes[3],
            gain: nodes[4],
            meter: nodes[5],
            analyser: nodes[6],
        };

        let now = ParamWrite::Immediate;
        graph.set_param(nodes.player, Param::PlaybackRate, 1.0, now)?;
        graph.set_param(nodes.filter, Param::Frequency, FILTER_RANGE_HZ.1, now)?;
        for band in [Param::Low, Param::Mid, Param::High] {
            graph.set_param(nodes.eq, band, 0.0, now)?;
        }
        graph.set_param(nodes.panner, Param::Pan, 0.0, now)?;
        graph.set_param(nodes.gain, Param::VolumeDb, 0.0, now)?;

        log::debug!("Deck {} chain built from player {}", id, nodes.player);

        Ok(Self {
            id,
            graph,
            nodes,
            master,
            state: DeckState::default(),
            track: None,
            loading: false,
            ramp,
            subscribers: Subscribers::new(),
        })
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn state(&self) -> &DeckState {
        &self.state
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Player node that receives decoded buffers.
    pub fn player_node(&self) -> NodeId {
        self.nodes.player
    }

    /// Last node of the strip, feeding the crossfader.
    pub fn output_node(&self) -> NodeId {
        self.nodes.analyser
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            deck: self.id,
            transport: self.state.transport,
            playback_rate: self.state.playback_rate,
            is_synced: self.state.is_synced,
            bpm: self.state.bpm,
            has_track: self.track.is_some(),
            loading: self.loading,
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&DeckEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Mark a load as outstanding. Fails if one already is.
    pub fn begin_load(&mut self) -> Result<(), DeckError> {
        if self.loading {
            log::warn!("Deck {}: load rejected, another load is in flight", self.id);
            return Err(DeckError::LoadInFlight(self.id));
        }
        self.loading = true;
        Ok(())
    }

    /// Complete an outstanding load.
    ///
    /// The track's buffer must already be in the player node. On failure the
    /// previous track stays loaded.
    pub fn finish_load(&mut self, result: Result<Track, LoadError>) -> Result<LoadReport, DeckError> {
        if !self.loading {
            log::warn!("Deck {}: discarding load result with none pending", self.id);
            return Err(DeckError::NoLoadPending(self.id));
        }
        self.loading = false;

        let track = match result {
            Ok(track) => track,
            Err(e) => {
                log::warn!("Deck {}: load failed, keeping previous track: {}", self.id, e);
                return Err(e.into());
            }
        };

        self.graph.stop(self.nodes.player)?;
        self.state.transport = TransportState::Stopped;
        self.state.bpm = track.estimated_bpm;
        let duration_seconds = track.duration_seconds();
        log::info!(
            "Deck {}: loaded {} ({:.1}s, {} BPM)",
            self.id,
            track.name(),
            duration_seconds,
            track.estimated_bpm
        );
        self.track = Some(track);

        if self.state.is_synced {
            self.apply_sync_rate()?;
        }

        let bpm = self.state.bpm;
        let report = LoadReport {
            bpm,
            propose_master: bpm > 0.0 && self.master.is_default_tempo(),
        };

        self.subscribers.notify(&DeckEvent::Loaded {
            snapshot: self.snapshot(),
            duration_seconds,
        });
        Ok(report)
    }

    /// Analyze decoded audio, hand it to the player and complete the load.
    pub async fn load_track(
        &mut self,
        audio: AudioBuffer,
        estimator: &TempoEstimator,
    ) -> Result<LoadReport, DeckError> {
        self.begin_load()?;
        let track = Track::analyze(audio, estimator);
        let result = match self
            .graph
            .load_buffer(self.nodes.player, track.audio.clone())
            .await
        {
            Ok(()) => Ok(track),
            Err(e) => Err(LoadError::Graph(e)),
        };
        self.finish_load(result)
    }

    /// Toggle between stopped and playing.
    pub fn play_pause(&mut self) -> Result<TransportState, DeckError> {
        if self.track.is_none() {
            return Err(DeckError::NoTrack(self.id));
        }

        match self.state.transport {
            TransportState::Stopped => {
                if self.state.is_synced {
                    self.apply_sync_rate()?;
                }
                self.graph.start(self.nodes.player)?;
                self.state.transport = TransportState::Playing;
            }
            TransportState::Playing => {
                self.graph.stop(self.nodes.player)?;
                self.state.transport = TransportState::Stopped;
            }
        }

        log::info!("Deck {}: {:?}", self.id, self.state.transport);
        self.notify_state();
        Ok(self.state.transport)
    }

    /// Flip sync. Returns the new sync flag.
    pub fn toggle_sync(&mut self) -> Result<bool, DeckError> {
        if self.state.is_synced {
            self.write_rate(1.0)?;
            self.state.is_synced = false;
        } else {
            self.state.is_synced = true;
            self.apply_sync_rate()?;
        }

        log::info!(
            "Deck {}: sync {} (rate {:.4})",
            self.id,
            if self.state.is_synced { "on" } else { "off" },
            self.state.playback_rate
        );
        self.notify_state();
        Ok(self.state.is_synced)
    }

    /// Set the playback rate directly.
    ///
    /// A synced deck will have this overwritten on the next master tempo change.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), DeckError> {
        if !rate.is_finite() {
            log::warn!("Deck {}: ignoring non-finite rate {}", self.id, rate);
            return Ok(());
        }
        self.write_rate(rate.max(MIN_RATE))?;
        self.notify_state();
        Ok(())
    }

    /// Recompute the synced rate for a new master tempo.
    pub fn on_master_tempo_changed(&mut self, master_bpm: f64) -> Result<(), DeckError> {
        if !self.state.is_synced {
            return Ok(());
        }
        if self.sync_to(master_bpm)? {
            self.notify_state();
        }
        Ok(())
    }

    /// Drop the loaded track.
    pub fn eject(&mut self) -> Result<(), DeckError> {
        if self.track.is_none() {
            return Ok(());
        }
        self.graph.stop(self.nodes.player)?;
        self.track = None;
        self.state.transport = TransportState::Stopped;
        self.state.bpm = 0.0;
        log::info!("Deck {}: ejected", self.id);
        self.notify_state();
        Ok(())
    }

    pub fn set_volume_db(&mut self, db: f64) -> Result<(), DeckError> {
        self.write_clamped(self.nodes.gain, Param::VolumeDb, db, VOLUME_RANGE_DB)
    }

    pub fn set_filter_cutoff(&mut self, hz: f64) -> Result<(), DeckError> {
        self.write_clamped(self.nodes.filter, Param::Frequency, hz, FILTER_RANGE_HZ)
    }

    pub fn set_eq(&mut self, band: EqBand, db: f64) -> Result<(), DeckError> {
        self.write_clamped(self.nodes.eq, band.param(), db, EQ_RANGE_DB)
    }

    pub fn set_pan(&mut self, pan: f64) -> Result<(), DeckError> {
        self.write_clamped(self.nodes.panner, Param::Pan, pan, (-1.0, 1.0))
    }

    /// Normalized 0..1 output level.
    pub fn level(&self) -> f64 {
        match self.graph.read_level_db(self.nodes.meter) {
            Ok(db) => normalize_level(db),
            Err(e) => {
                log::debug!("Deck {}: meter read failed: {}", self.id, e);
                0.0
            }
        }
    }

    /// Magnitude spectrum of the deck output.
    pub fn spectrum(&self) -> Vec<f32> {
        self.graph
            .read_spectrum(self.nodes.analyser)
            .unwrap_or_default()
    }

    fn apply_sync_rate(&mut self) -> Result<bool, DeckError> {
        match self.master.bpm() {
            Some(master_bpm) => self.sync_to(master_bpm),
            None => Ok(false),
        }
    }

    /// Lock the rate to `master_bpm`. Returns false when the tempo is unknown.
    fn sync_to(&mut self, master_bpm: f64) -> Result<bool, DeckError> {
        if self.state.bpm <= 0.0 || master_bpm <= 0.0 || !master_bpm.is_finite() {
            return Ok(false);
        }
        self.write_rate(master_bpm / self.state.bpm)?;
        Ok(true)
    }

    fn write_rate(&mut self, rate: f64) -> Result<(), DeckError> {
        self.graph.set_param(
            self.nodes.player,
            Param::PlaybackRate,
            rate,
            ParamWrite::ramp(self.ramp),
        )?;
        self.state.playback_rate = rate;
        Ok(())
    }

    fn write_clamped(
        &mut self,
        node: NodeId,
        param: Param,
        value: f64,
        (min, max): (f64, f64),
    ) -> Result<(), DeckError> {
        if value.is_nan() {
            log::warn!("Deck {}: ignoring NaN for {}", self.id, param.name());
            return Ok(());
        }
        let value = value.clamp(min, max);
        self.graph
            .set_param(node, param, value, ParamWrite::ramp(self.ramp))?;
        log::debug!("Deck {}: {} = {:.2}", self.id, param.name(), value);
        Ok(())
    }

    fn notify_state(&self) {
        self.subscribers
            .notify(&DeckEvent::StateChanged(self.snapshot()));
    }
}

impl std::fmt::Debug for DeckController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_track", &self.track.is_some())
            .field("loading", &self.loading)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use duodeck_core::OfflineGraph;
    use parking_lot::Mutex;

    use super::*;

    const RAMP: Duration = Duration::from_millis(30);

    fn setup(master_bpm: f64) -> (Arc<OfflineGraph>, Arc<RwLock<MasterState>>, DeckController) {
        let graph = Arc::new(OfflineGraph::new());
        let master = Arc::new(RwLock::new(MasterState::new(master_bpm)));
        let deck = DeckController::new(
            DeckId::A,
            graph.clone(),
            MasterLink::new(&master),
            RAMP,
        )
        .unwrap();
        (graph, master, deck)
    }

    fn track_with_bpm(bpm: f64) -> Track {
        let mut track = Track::analyze(
            AudioBuffer::mono(vec![0.0; 441], 44100),
            &TempoEstimator::default(),
        );
        track.estimated_bpm = bpm;
        track
    }

    async fn load(graph: &OfflineGraph, deck: &mut DeckController, bpm: f64) -> LoadReport {
        let track = track_with_bpm(bpm);
        deck.begin_load().unwrap();
        graph
            .load_buffer(deck.player_node(), track.audio.clone())
            .await
            .unwrap();
        deck.finish_load(Ok(track)).unwrap()
    }

    fn rate_of(graph: &OfflineGraph, deck: &DeckController) -> f64 {
        graph
            .param_value(deck.player_node(), Param::PlaybackRate)
            .unwrap()
    }

    #[test]
    fn test_deck_id_index_roundtrip() {
        assert_eq!(DeckId::from_index(DeckId::B.index()), Some(DeckId::B));
        assert_eq!(DeckId::A.other(), DeckId::B);
        assert_eq!(DeckId::from_index(2), None);
        assert_eq!(DeckId::B.to_string(), "B");
    }

    #[test]
    fn test_chain_topology() {
        let (graph, _master, deck) = setup(120.0);
        assert_eq!(graph.chain_from(deck.player_node()), DECK_CHAIN.to_vec());
    }

    #[test]
    fn test_play_without_track_is_error() {
        let (_graph, _master, mut deck) = setup(120.0);
        let events = Arc::new(Mutex::new(0));
        let counter = events.clone();
        deck.subscribe(move |_| *counter.lock() += 1);

        assert!(matches!(deck.play_pause(), Err(DeckError::NoTrack(DeckId::A))));
        assert_eq!(deck.state().transport, TransportState::Stopped);
        assert_eq!(*events.lock(), 0);
    }

    #[tokio::test]
    async fn test_load_resets_transport_and_reports() {
        let (graph, _master, mut deck) = setup(120.0);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        deck.subscribe(move |e| sink.lock().push(e.clone()));

        load(&graph, &mut deck, 128.0).await;
        deck.play_pause().unwrap();
        assert!(graph.is_playing(deck.player_node()));

        let report = load(&graph, &mut deck, 100.0).await;
        assert_eq!(report.bpm, 100.0);
        assert!(report.propose_master);
        assert_eq!(deck.state().transport, TransportState::Stopped);
        assert!(!graph.is_playing(deck.player_node()));

        let events = events.lock();
        match events.last() {
            Some(DeckEvent::Loaded { snapshot, .. }) => {
                assert_eq!(snapshot.bpm, 100.0);
                assert_eq!(snapshot.transport, TransportState::Stopped);
                assert!(snapshot.has_track);
                assert!(!snapshot.loading);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tempo_does_not_propose() {
        let (graph, _master, mut deck) = setup(120.0);
        let report = load(&graph, &mut deck, 0.0).await;
        assert!(!report.propose_master);
    }

    #[tokio::test]
    async fn test_non_default_master_does_not_propose() {
        let (graph, master, mut deck) = setup(120.0);
        master.write().set_bpm(125.0);
        let report = load(&graph, &mut deck, 128.0).await;
        assert!(!report.propose_master);
    }

    #[tokio::test]
    async fn test_single_flight_load() {
        let (_graph, _master, mut deck) = setup(120.0);
        deck.begin_load().unwrap();
        assert!(deck.snapshot().loading);
        assert!(matches!(deck.begin_load(), Err(DeckError::LoadInFlight(_))));

        deck.finish_load(Ok(track_with_bpm(90.0))).unwrap();
        assert!(matches!(
            deck.finish_load(Ok(track_with_bpm(91.0))),
            Err(DeckError::NoLoadPending(_))
        ));
        assert_eq!(deck.state().bpm, 90.0);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_track() {
        let (graph, _master, mut deck) = setup(120.0);
        load(&graph, &mut deck, 124.0).await;
        let previous = deck.track().unwrap().id;

        graph.fail_next_load("corrupt");
        let err = deck
            .load_track(AudioBuffer::mono(vec![0.0; 64], 44100), &TempoEstimator::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Load(LoadError::Graph(_))));
        assert_eq!(deck.track().unwrap().id, previous);
        assert_eq!(deck.state().bpm, 124.0);
        assert!(!deck.is_loading());
    }

    #[tokio::test]
    async fn test_sync_on_and_off() {
        let (graph, _master, mut deck) = setup(120.0);
        load(&graph, &mut deck, 100.0).await;

        assert!(deck.toggle_sync().unwrap());
        assert!((deck.state().playback_rate - 1.2).abs() < 1e-12);
        assert_eq!(
            graph.param(deck.player_node(), Param::PlaybackRate).unwrap().write,
            ParamWrite::Ramped(RAMP)
        );

        assert!(!deck.toggle_sync().unwrap());
        assert_eq!(deck.state().playback_rate, 1.0);
        assert_eq!(rate_of(&graph, &deck), 1.0);
    }

    #[test]
    fn test_sync_with_unknown_bpm_keeps_rate() {
        let (_graph, _master, mut deck) = setup(120.0);
        deck.set_rate(0.9).unwrap();
        assert!(deck.toggle_sync().unwrap());
        assert_eq!(deck.state().playback_rate, 0.9);
    }

    #[tokio::test]
    async fn test_play_applies_sync_first() {
        let (graph, master, mut deck) = setup(120.0);
        load(&graph, &mut deck, 120.0).await;
        deck.toggle_sync().unwrap();
        deck.set_rate(0.5).unwrap();

        master.write().set_bpm(132.0);
        deck.play_pause().unwrap();
        assert!((deck.state().playback_rate - 1.1).abs() < 1e-12);
        assert!((rate_of(&graph, &deck) - 1.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_master_change_only_affects_synced() {
        let (graph, _master, mut deck) = setup(120.0);
        load(&graph, &mut deck, 120.0).await;

        deck.on_master_tempo_changed(140.0).unwrap();
        assert_eq!(deck.state().playback_rate, 1.0);

        deck.toggle_sync().unwrap();
        deck.on_master_tempo_changed(90.0).unwrap();
        assert!((deck.state().playback_rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_set_rate_clamps_and_ignores_nan() {
        let (_graph, _master, mut deck) = setup(120.0);
        deck.set_rate(-3.0).unwrap();
        assert_eq!(deck.state().playback_rate, MIN_RATE);
        deck.set_rate(f64::NAN).unwrap();
        assert_eq!(deck.state().playback_rate, MIN_RATE);
    }

    #[test]
    fn test_parameter_setters_clamp_and_ramp() {
        let (graph, _master, mut deck) = setup(120.0);
        deck.set_filter_cutoff(5.0).unwrap();
        deck.set_eq(EqBand::High, 30.0).unwrap();
        deck.set_pan(-4.0).unwrap();
        deck.set_volume_db(-6.0).unwrap();

        let nodes = deck.nodes;
        assert_eq!(graph.param_value(nodes.filter, Param::Frequency), Some(20.0));
        assert_eq!(graph.param_value(nodes.eq, Param::High), Some(12.0));
        assert_eq!(graph.param_value(nodes.panner, Param::Pan), Some(-1.0));
        let volume = graph.param(nodes.gain, Param::VolumeDb).unwrap();
        assert_eq!(volume.value, -6.0);
        assert_eq!(volume.write, ParamWrite::Ramped(RAMP));
    }

    #[test]
    fn test_level_mapping() {
        let (graph, _master, deck) = setup(120.0);
        assert_eq!(deck.level(), 0.0);
        graph.set_level_db(deck.nodes.meter, -15.0);
        assert!((deck.level() - 0.75).abs() < 1e-12);
        graph.set_level_db(deck.nodes.meter, 3.0);
        assert_eq!(deck.level(), 1.0);
        assert_eq!(deck.spectrum().len(), 64);
        graph.set_spectrum(deck.nodes.analyser, vec![0.25; 64]);
        assert_eq!(deck.spectrum(), vec![0.25; 64]);
    }

    #[tokio::test]
    async fn test_detached_master_never_syncs_or_proposes() {
        let graph = Arc::new(OfflineGraph::new());
        let mut deck =
            DeckController::new(DeckId::B, graph.clone(), MasterLink::detached(), RAMP).unwrap();
        let report = load(&graph, &mut deck, 128.0).await;
        assert!(!report.propose_master);

        deck.toggle_sync().unwrap();
        assert!(deck.state().is_synced);
        assert_eq!(deck.state().playback_rate, 1.0);
    }

    #[tokio::test]
    async fn test_eject() {
        let (graph, _master, mut deck) = setup(120.0);
        load(&graph, &mut deck, 126.0).await;
        deck.play_pause().unwrap();
        deck.eject().unwrap();
        let snap = deck.snapshot();
        assert!(!snap.has_track);
        assert_eq!(snap.bpm, 0.0);
        assert_eq!(snap.transport, TransportState::Stopped);
        assert!(matches!(deck.play_pause(), Err(DeckError::NoTrack(_))));
    }
}
