//! In-process audio-graph runtime with no audio device.
//!
//! Tracks everything the core asks of the runtime (nodes, chain topology,
//! parameter values, transport) so sessions can run headless and tests can
//! inspect the resulting graph state.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AudioBuffer, AudioGraph, GraphError, NodeId, NodeKind, Param, ParamWrite};

/// Default number of analyser bins.
const DEFAULT_SPECTRUM_BINS: usize = 64;

/// Last value written to a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamValue {
    pub value: f64,
    pub write: ParamWrite,
}

#[derive(Debug, Default)]
struct PlayerSlot {
    buffer: Option<AudioBuffer>,
    playing: bool,
    looping: bool,
}

#[derive(Debug)]
struct Inner {
    next_id: u32,
    nodes: HashMap<NodeId, NodeKind>,
    connections: Vec<(NodeId, NodeId)>,
    params: HashMap<(NodeId, Param), ParamValue>,
    param_writes: usize,
    players: HashMap<NodeId, PlayerSlot>,
    levels: HashMap<NodeId, f64>,
    spectra: HashMap<NodeId, Vec<f32>>,
    spectrum_bins: usize,
    microphone_available: bool,
    open_microphones: HashSet<NodeId>,
    recording: HashSet<NodeId>,
    capture: AudioBuffer,
    fail_next_load: Option<String>,
}

/// Headless [`AudioGraph`] implementation.
#[derive(Debug)]
pub struct OfflineGraph {
    inner: Mutex<Inner>,
}

impl OfflineGraph {
    pub fn new() -> Self {
        Self::with_spectrum_bins(DEFAULT_SPECTRUM_BINS)
    }

    /// Create a graph whose analysers report `bins` magnitudes.
    pub fn with_spectrum_bins(bins: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                nodes: HashMap::new(),
                connections: Vec::new(),
                params: HashMap::new(),
                param_writes: 0,
                players: HashMap::new(),
                levels: HashMap::new(),
                spectra: HashMap::new(),
                spectrum_bins: bins,
                microphone_available: true,
                open_microphones: HashSet::new(),
                recording: HashSet::new(),
                capture: AudioBuffer::empty(44100),
                fail_next_load: None,
            }),
        }
    }

    // Inspection

    pub fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.lock().nodes.get(&node).copied()
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// All connections in the order they were made.
    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        self.inner.lock().connections.clone()
    }

    /// Follow connections downstream from `start`, returning the kinds visited.
    pub fn chain_from(&self, start: NodeId) -> Vec<NodeKind> {
        let inner = self.inner.lock();
        let mut kinds = Vec::new();
        let mut current = Some(start);
        let mut visited = HashSet::new();
        while let Some(node) = current {
            if !visited.insert(node) {
                break;
            }
            if let Some(kind) = inner.nodes.get(&node) {
                kinds.push(*kind);
            }
            current = inner
                .connections
                .iter()
                .find(|(from, _)| *from == node)
                .map(|(_, to)| *to);
        }
        kinds
    }

    pub fn param(&self, node: NodeId, param: Param) -> Option<ParamValue> {
        self.inner.lock().params.get(&(node, param)).copied()
    }

    /// Current value of a parameter, if it was ever written.
    pub fn param_value(&self, node: NodeId, param: Param) -> Option<f64> {
        self.param(node, param).map(|p| p.value)
    }

    /// Total number of parameter writes accepted.
    pub fn param_write_count(&self) -> usize {
        self.inner.lock().param_writes
    }

    pub fn is_playing(&self, player: NodeId) -> bool {
        self.inner
            .lock()
            .players
            .get(&player)
            .map(|slot| slot.playing)
            .unwrap_or(false)
    }

    pub fn is_looping(&self, player: NodeId) -> bool {
        self.inner
            .lock()
            .players
            .get(&player)
            .map(|slot| slot.looping)
            .unwrap_or(false)
    }

    pub fn loaded_buffer(&self, player: NodeId) -> Option<AudioBuffer> {
        self.inner
            .lock()
            .players
            .get(&player)
            .and_then(|slot| slot.buffer.clone())
    }

    pub fn is_recording(&self, recorder: NodeId) -> bool {
        self.inner.lock().recording.contains(&recorder)
    }

    // Simulation controls

    /// Set the level a meter reports.
    pub fn set_level_db(&self, meter: NodeId, db: f64) {
        self.inner.lock().levels.insert(meter, db);
    }

    /// Set the magnitudes an analyser reports. Resized to the bin count on read.
    pub fn set_spectrum(&self, analyser: NodeId, magnitudes: Vec<f32>) {
        self.inner.lock().spectra.insert(analyser, magnitudes);
    }

    /// Simulate a missing or denied capture device.
    pub fn set_microphone_available(&self, available: bool) {
        self.inner.lock().microphone_available = available;
    }

    /// Audio the next `stop_recording` will return.
    pub fn set_capture(&self, buffer: AudioBuffer) {
        self.inner.lock().capture = buffer;
    }

    /// Make the next `load_buffer` fail with the given reason.
    pub fn fail_next_load(&self, reason: impl Into<String>) {
        self.inner.lock().fail_next_load = Some(reason.into());
    }
}

impl Default for OfflineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn kind_of(&self, node: NodeId) -> Result<NodeKind, GraphError> {
        self.nodes
            .get(&node)
            .copied()
            .ok_or(GraphError::UnknownNode(node))
    }

    fn expect_kind(&self, node: NodeId, expected: NodeKind) -> Result<(), GraphError> {
        let actual = self.kind_of(node)?;
        if actual != expected {
            return Err(GraphError::WrongNodeKind {
                node,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn player(&mut self, node: NodeId) -> Result<&mut PlayerSlot, GraphError> {
        self.expect_kind(node, NodeKind::Player)?;
        Ok(self.players.entry(node).or_default())
    }
}

#[async_trait]
impl AudioGraph for OfflineGraph {
    fn create_node(&self, kind: NodeKind) -> NodeId {
        let mut inner = self.inner.lock();
        let id = NodeId(inner.next_id);
        inner.next_id += 1;
        inner.nodes.insert(id, kind);
        id
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        inner.kind_of(from)?;
        inner.kind_of(to)?;
        inner.connections.push((from, to));
        Ok(())
    }

    fn set_param(
        &self,
        node: NodeId,
        param: Param,
        value: f64,
        write: ParamWrite,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        let kind = inner.kind_of(node)?;
        if !kind.accepts(param) {
            return Err(GraphError::UnsupportedParam { node, kind, param });
        }
        inner.params.insert((node, param), ParamValue { value, write });
        inner.param_writes += 1;
        Ok(())
    }

    fn set_loop(&self, player: NodeId, enabled: bool) -> Result<(), GraphError> {
        self.inner.lock().player(player)?.looping = enabled;
        Ok(())
    }

    fn start(&self, player: NodeId) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        let slot = inner.player(player)?;
        if slot.buffer.is_none() {
            return Err(GraphError::LoadFailed(format!(
                "player {} has no buffer",
                player
            )));
        }
        slot.playing = true;
        Ok(())
    }

    fn stop(&self, player: NodeId) -> Result<(), GraphError> {
        self.inner.lock().player(player)?.playing = false;
        Ok(())
    }

    async fn load_buffer(&self, player: NodeId, buffer: AudioBuffer) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        inner.expect_kind(player, NodeKind::Player)?;
        if let Some(reason) = inner.fail_next_load.take() {
            return Err(GraphError::LoadFailed(reason));
        }
        let slot = inner.player(player)?;
        slot.playing = false;
        slot.buffer = Some(buffer);
        Ok(())
    }

    async fn open_microphone(&self, mic: NodeId) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        inner.expect_kind(mic, NodeKind::Microphone)?;
        if !inner.microphone_available {
            return Err(GraphError::CaptureUnavailable(
                "no input device".to_string(),
            ));
        }
        inner.open_microphones.insert(mic);
        Ok(())
    }

    fn start_recording(&self, recorder: NodeId) -> Result<(), GraphError> {
        let mut inner = self.inner.lock();
        inner.expect_kind(recorder, NodeKind::Recorder)?;
        inner.recording.insert(recorder);
        Ok(())
    }

    async fn stop_recording(&self, recorder: NodeId) -> Result<AudioBuffer, GraphError> {
        let mut inner = self.inner.lock();
        inner.expect_kind(recorder, NodeKind::Recorder)?;
        if !inner.recording.remove(&recorder) {
            return Err(GraphError::NotRecording(recorder));
        }
        Ok(inner.capture.clone())
    }

    fn read_level_db(&self, meter: NodeId) -> Result<f64, GraphError> {
        let inner = self.inner.lock();
        inner.expect_kind(meter, NodeKind::Meter)?;
        Ok(inner
            .levels
            .get(&meter)
            .copied()
            .unwrap_or(f64::NEG_INFINITY))
    }

    fn read_spectrum(&self, analyser: NodeId) -> Result<Vec<f32>, GraphError> {
        let inner = self.inner.lock();
        inner.expect_kind(analyser, NodeKind::Analyser)?;
        let mut magnitudes = inner.spectra.get(&analyser).cloned().unwrap_or_default();
        magnitudes.resize(inner.spectrum_bins, f32::NEG_INFINITY);
        Ok(magnitudes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_param_validation() {
        let graph = OfflineGraph::new();
        let eq = graph.create_node(NodeKind::Eq3);
        assert!(graph
            .set_param(eq, Param::Low, -6.0, ParamWrite::Immediate)
            .is_ok());
        assert_eq!(graph.param_value(eq, Param::Low), Some(-6.0));

        let err = graph
            .set_param(eq, Param::Pan, 0.5, ParamWrite::Immediate)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedParam { .. }));
        assert_eq!(graph.param_write_count(), 1);
    }

    #[test]
    fn test_ramped_write_is_recorded() {
        let graph = OfflineGraph::new();
        let gain = graph.create_node(NodeKind::Gain);
        let ramp = ParamWrite::Ramped(Duration::from_millis(30));
        graph.set_param(gain, Param::VolumeDb, -3.0, ramp).unwrap();
        assert_eq!(
            graph.param(gain, Param::VolumeDb),
            Some(ParamValue {
                value: -3.0,
                write: ramp
            })
        );
    }

    #[test]
    fn test_start_requires_buffer() {
        let graph = OfflineGraph::new();
        let player = graph.create_node(NodeKind::Player);
        assert!(graph.start(player).is_err());
        assert!(!graph.is_playing(player));
    }

    #[tokio::test]
    async fn test_load_and_play() {
        let graph = OfflineGraph::new();
        let player = graph.create_node(NodeKind::Player);
        graph
            .load_buffer(player, AudioBuffer::mono(vec![0.0; 16], 44100))
            .await
            .unwrap();
        graph.start(player).unwrap();
        assert!(graph.is_playing(player));
        graph.stop(player).unwrap();
        assert!(!graph.is_playing(player));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_buffer() {
        let graph = OfflineGraph::new();
        let player = graph.create_node(NodeKind::Player);
        let first = AudioBuffer::mono(vec![0.5; 4], 44100);
        graph.load_buffer(player, first.clone()).await.unwrap();

        graph.fail_next_load("corrupt");
        let err = graph
            .load_buffer(player, AudioBuffer::mono(vec![0.1; 4], 44100))
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::LoadFailed("corrupt".to_string()));
        assert_eq!(graph.loaded_buffer(player), Some(first));
    }

    #[tokio::test]
    async fn test_microphone_unavailable() {
        let graph = OfflineGraph::new();
        let mic = graph.create_node(NodeKind::Microphone);
        graph.set_microphone_available(false);
        assert!(matches!(
            graph.open_microphone(mic).await,
            Err(GraphError::CaptureUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_recording_roundtrip() {
        let graph = OfflineGraph::new();
        let recorder = graph.create_node(NodeKind::Recorder);
        assert!(matches!(
            graph.stop_recording(recorder).await,
            Err(GraphError::NotRecording(_))
        ));

        graph.set_capture(AudioBuffer::mono(vec![0.25; 100], 48000));
        graph.start_recording(recorder).unwrap();
        assert!(graph.is_recording(recorder));
        let take = graph.stop_recording(recorder).await.unwrap();
        assert_eq!(take.frames(), 100);
        assert!(!graph.is_recording(recorder));
    }

    #[test]
    fn test_meter_and_spectrum_reads() {
        let graph = OfflineGraph::with_spectrum_bins(8);
        let meter = graph.create_node(NodeKind::Meter);
        let analyser = graph.create_node(NodeKind::Analyser);
        assert_eq!(graph.read_level_db(meter).unwrap(), f64::NEG_INFINITY);
        graph.set_level_db(meter, -12.0);
        assert_eq!(graph.read_level_db(meter).unwrap(), -12.0);
        assert_eq!(graph.read_spectrum(analyser).unwrap().len(), 8);
        graph.set_spectrum(analyser, vec![0.5; 8]);
        assert_eq!(graph.read_spectrum(analyser).unwrap(), vec![0.5; 8]);
        assert!(graph.read_level_db(analyser).is_err());
        assert_eq!(graph.node_count(), 2);
    }
}
