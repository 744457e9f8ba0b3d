//! Contract between the console core and the audio-graph runtime.
//!
//! The runtime owns the realtime callback and every DSP kernel. The core only
//! creates nodes, wires them into fixed linear chains, writes parameters and
//! sequences player/capture operations.

mod buffer;
mod node;
mod offline;

use async_trait::async_trait;
use thiserror::Error;

pub use buffer::AudioBuffer;
pub use node::{NodeId, NodeKind, Param, ParamWrite};
pub use offline::{OfflineGraph, ParamValue};

/// Errors reported by the audio-graph runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} ({kind:?}) has no parameter '{param}'")]
    UnsupportedParam {
        node: NodeId,
        kind: NodeKind,
        param: Param,
    },
    #[error("node {node} is a {actual:?}, expected {expected:?}")]
    WrongNodeKind {
        node: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },
    #[error("microphone capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("failed to load buffer: {0}")]
    LoadFailed(String),
    #[error("recorder {0} is not recording")]
    NotRecording(NodeId),
}

/// Operations the core consumes from the audio-graph runtime.
///
/// Synchronous methods issue a command and return immediately. Async methods
/// resolve once the runtime has completed (or failed) the operation; none are
/// retried and none can be cancelled.
#[async_trait]
pub trait AudioGraph: Send + Sync {
    /// Create a node of the given kind.
    fn create_node(&self, kind: NodeKind) -> NodeId;

    /// Connect the output of `from` to the input of `to`.
    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    /// Write a continuous parameter.
    fn set_param(
        &self,
        node: NodeId,
        param: Param,
        value: f64,
        write: ParamWrite,
    ) -> Result<(), GraphError>;

    /// Enable or disable looping on a player.
    fn set_loop(&self, player: NodeId, enabled: bool) -> Result<(), GraphError>;

    /// Start a player from the beginning of its buffer.
    fn start(&self, player: NodeId) -> Result<(), GraphError>;

    /// Stop a player.
    fn stop(&self, player: NodeId) -> Result<(), GraphError>;

    /// Hand a decoded buffer to a player.
    async fn load_buffer(&self, player: NodeId, buffer: AudioBuffer) -> Result<(), GraphError>;

    /// Open the capture device behind a microphone node.
    async fn open_microphone(&self, mic: NodeId) -> Result<(), GraphError>;

    /// Begin capturing into a recorder.
    fn start_recording(&self, recorder: NodeId) -> Result<(), GraphError>;

    /// Finish capturing and return what was recorded.
    async fn stop_recording(&self, recorder: NodeId) -> Result<AudioBuffer, GraphError>;

    /// Current level of a meter in dB (negative infinity for silence).
    fn read_level_db(&self, meter: NodeId) -> Result<f64, GraphError>;

    /// Current magnitude spectrum of an analyser (fixed length).
    fn read_spectrum(&self, analyser: NodeId) -> Result<Vec<f32>, GraphError>;
}

/// Create `kinds` in order and connect each node to the next.
///
/// Returns the node ids in the same order.
pub fn build_chain(graph: &dyn AudioGraph, kinds: &[NodeKind]) -> Result<Vec<NodeId>, GraphError> {
    let nodes: Vec<NodeId> = kinds.iter().map(|kind| graph.create_node(*kind)).collect();
    for pair in nodes.windows(2) {
        graph.connect(pair[0], pair[1])?;
    }
    Ok(nodes)
}

/// Map a meter reading in dB to a normalized 0..1 display level.
pub fn normalize_level(db: f64) -> f64 {
    if db.is_nan() {
        return 0.0;
    }
    ((db + 60.0) / 60.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level(f64::NEG_INFINITY), 0.0);
        assert_eq!(normalize_level(-90.0), 0.0);
        assert!((normalize_level(-30.0) - 0.5).abs() < 1e-12);
        assert_eq!(normalize_level(0.0), 1.0);
        assert_eq!(normalize_level(6.0), 1.0);
        assert_eq!(normalize_level(f64::NAN), 0.0);
    }

    #[test]
    fn test_build_chain_connects_in_order() {
        let graph = OfflineGraph::new();
        let nodes = build_chain(&graph, &[NodeKind::Player, NodeKind::Gain, NodeKind::Output])
            .unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            graph.connections(),
            vec![(nodes[0], nodes[1]), (nodes[1], nodes[2])]
        );
    }
}
