//! Live voice unit: record from the microphone, play back through the
//! effect chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duodeck_core::{
    normalize_level, AudioBuffer, AudioGraph, GraphError, NodeId, NodeKind, Param, ParamWrite,
    Settings, SubscriptionId, Subscribers,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::effects::{ChainStage, EffectChain, PresetBank, PresetError};
use crate::track::{decode_file, LoadError};

/// Voice unit mode. Recording and playing never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceMode {
    #[default]
    Idle,
    Recording,
    Playing,
}

/// Mutable voice state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceState {
    pub mode: VoiceMode,
    pub has_buffer: bool,
    pub current_preset: u8,
    pub looping: bool,
    /// Output gain in [0, 1].
    pub gain: f64,
}

/// Snapshot carried by every voice notification.
pub type VoiceSnapshot = VoiceState;

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    StateChanged(VoiceSnapshot),
}

/// A captured take handed to the caller for persistence.
#[derive(Debug, Clone)]
pub struct RecordedTake {
    pub audio: AudioBuffer,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("microphone capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("voice load failed: {0}")]
    Load(#[from] LoadError),
    #[error("voice unit is busy recording")]
    Busy,
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Graph(GraphError),
}

impl From<GraphError> for VoiceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CaptureUnavailable(reason) => Self::CaptureUnavailable(reason),
            other => Self::Graph(other),
        }
    }
}

/// Record/playback state machine around the voice effect chain.
pub struct VoiceUnit {
    graph: Arc<dyn AudioGraph>,
    microphone: NodeId,
    recorder: NodeId,
    player: NodeId,
    presets: PresetBank,
    state: VoiceState,
    last_take: Option<RecordedTake>,
    ramp: Duration,
    subscribers: Subscribers<VoiceEvent>,
}

impl VoiceUnit {
    /// Build the capture and playback chains and apply the configured defaults.
    pub fn new(graph: Arc<dyn AudioGraph>, settings: &Settings) -> Result<Self, VoiceError> {
        let microphone = graph.create_node(NodeKind::Microphone);
        let recorder = graph.create_node(NodeKind::Recorder);
        graph.connect(microphone, recorder)?;

        let player = graph.create_node(NodeKind::Player);
        let chain = EffectChain::build(graph.as_ref())?;
        graph.connect(player, chain.input())?;

        let mut presets = PresetBank::new(graph.clone(), chain)?;
        if settings.voice_default_preset != 0 {
            presets.select_preset(settings.voice_default_preset)?;
        }

        let gain = settings.voice_gain.clamp(0.0, 1.0);
        graph.set_param(
            presets.chain().node(ChainStage::Gain),
            Param::Gain,
            gain,
            ParamWrite::Immediate,
        )?;
        graph.set_loop(player, settings.voice_loop)?;

        Ok(Self {
            graph,
            microphone,
            recorder,
            player,
            state: VoiceState {
                mode: VoiceMode::Idle,
                has_buffer: false,
                current_preset: presets.current_id(),
                looping: settings.voice_loop,
                gain,
            },
            presets,
            last_take: None,
            ramp: settings.ramp(),
            subscribers: Subscribers::new(),
        })
    }

    pub fn state(&self) -> &VoiceState {
        &self.state
    }

    pub fn snapshot(&self) -> VoiceSnapshot {
        self.state
    }

    pub fn presets(&self) -> &PresetBank {
        &self.presets
    }

    pub fn player_node(&self) -> NodeId {
        self.player
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&VoiceEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// The most recent captured buffer, for the caller to persist.
    pub fn recording(&self) -> Option<AudioBuffer> {
        self.last_take.as_ref().map(|take| take.audio.clone())
    }

    pub fn last_take(&self) -> Option<&RecordedTake> {
        self.last_take.as_ref()
    }

    /// Open the microphone and start capturing.
    ///
    /// If capture cannot be opened nothing changes. Playback is stopped first
    /// so the unit passes through Idle.
    pub async fn start_recording(&mut self) -> Result<(), VoiceError> {
        if self.state.mode == VoiceMode::Recording {
            return Err(VoiceError::Busy);
        }

        if let Err(e) = self.graph.open_microphone(self.microphone).await {
            log::warn!("Voice: cannot open microphone: {}", e);
            return Err(e.into());
        }

        if self.state.mode == VoiceMode::Playing {
            self.stop()?;
        }

        self.graph.start_recording(self.recorder)?;
        self.state.mode = VoiceMode::Recording;
        log::info!("Voice: recording");
        self.notify();
        Ok(())
    }

    /// Finish capturing and load the take for playback.
    ///
    /// No-op unless recording. The unit always ends Idle; a failed load keeps
    /// whatever buffer was loaded before.
    pub async fn stop_recording(&mut self) -> Result<(), VoiceError> {
        if self.state.mode != VoiceMode::Recording {
            return Ok(());
        }

        let captured = self.graph.stop_recording(self.recorder).await;
        self.state.mode = VoiceMode::Idle;

        let result = match captured {
            Ok(audio) if audio.is_empty() => {
                log::info!("Voice: recording stopped, nothing captured");
                Ok(())
            }
            Ok(audio) => {
                self.last_take = Some(RecordedTake {
                    audio: audio.clone(),
                    recorded_at: Utc::now(),
                });
                match self.graph.load_buffer(self.player, audio).await {
                    Ok(()) => {
                        self.state.has_buffer = true;
                        log::info!("Voice: take loaded for playback");
                        Ok(())
                    }
                    Err(e) => {
                        log::warn!("Voice: failed to load take: {}", e);
                        Err(VoiceError::Load(LoadError::Graph(e)))
                    }
                }
            }
            Err(e) => {
                log::warn!("Voice: capture failed: {}", e);
                Err(e.into())
            }
        };

        self.notify();
        result
    }

    /// Start playback. No-op without a buffer or while already playing.
    pub fn play(&mut self) -> Result<(), VoiceError> {
        match self.state.mode {
            VoiceMode::Recording => return Err(VoiceError::Busy),
            VoiceMode::Playing => return Ok(()),
            VoiceMode::Idle => {}
        }
        if !self.state.has_buffer {
            log::debug!("Voice: play ignored, no buffer");
            return Ok(());
        }

        self.graph.start(self.player)?;
        self.state.mode = VoiceMode::Playing;
        log::info!("Voice: playing");
        self.notify();
        Ok(())
    }

    /// Stop playback. No-op unless playing.
    pub fn stop(&mut self) -> Result<(), VoiceError> {
        if self.state.mode != VoiceMode::Playing {
            return Ok(());
        }
        self.graph.stop(self.player)?;
        self.state.mode = VoiceMode::Idle;
        log::info!("Voice: stopped");
        self.notify();
        Ok(())
    }

    /// Decode a file and load it for playback, stopping current playback.
    pub async fn load_file(&mut self, path: &Path) -> Result<(), VoiceError> {
        if self.state.mode == VoiceMode::Recording {
            return Err(VoiceError::Busy);
        }
        let owned: PathBuf = path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || decode_file(&owned))
            .await
            .map_err(|e| LoadError::Decode(format!("decode task failed: {}", e)))??;
        self.load_buffer(audio).await
    }

    /// Load decoded audio for playback, stopping current playback.
    pub async fn load_buffer(&mut self, audio: AudioBuffer) -> Result<(), VoiceError> {
        if self.state.mode == VoiceMode::Recording {
            return Err(VoiceError::Busy);
        }
        if audio.is_empty() {
            return Err(LoadError::Empty.into());
        }

        // A failed load leaves the previous buffer and transport in place.
        if let Err(e) = self.graph.load_buffer(self.player, audio).await {
            log::warn!("Voice: failed to load file: {}", e);
            return Err(VoiceError::Load(LoadError::Graph(e)));
        }
        if self.state.mode == VoiceMode::Playing {
            self.graph.stop(self.player)?;
            self.state.mode = VoiceMode::Idle;
        }
        self.state.has_buffer = true;
        log::info!("Voice: file loaded");
        self.notify();
        Ok(())
    }

    /// Apply a preset from the bank.
    pub fn select_preset(&mut self, id: u8) -> Result<(), VoiceError> {
        self.presets.select_preset(id)?;
        self.state.current_preset = id;
        self.notify();
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool) -> Result<(), VoiceError> {
        self.graph.set_loop(self.player, enabled)?;
        self.state.looping = enabled;
        self.notify();
        Ok(())
    }

    /// Set output gain, clamped to [0, 1]. NaN is ignored.
    pub fn set_gain(&mut self, gain: f64) -> Result<(), VoiceError> {
        if gain.is_nan() {
            log::warn!("Voice: ignoring NaN gain");
            return Ok(());
        }
        let gain = gain.clamp(0.0, 1.0);
        self.graph.set_param(
            self.presets.chain().node(ChainStage::Gain),
            Param::Gain,
            gain,
            ParamWrite::ramp(self.ramp),
        )?;
        self.state.gain = gain;
        self.notify();
        Ok(())
    }

    /// Normalized 0..1 output level.
    pub fn level(&self) -> f64 {
        self.graph
            .read_level_db(self.presets.chain().node(ChainStage::Meter))
            .map(normalize_level)
            .unwrap_or(0.0)
    }

    pub fn spectrum(&self) -> Vec<f32> {
        self.graph
            .read_spectrum(self.presets.chain().node(ChainStage::Analyser))
            .unwrap_or_default()
    }

    fn notify(&self) {
        self.subscribers
            .notify(&VoiceEvent::StateChanged(self.state));
    }
}

impl std::fmt::Debug for VoiceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceUnit")
            .field("state", &self.state)
            .field("presets", &self.presets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use duodeck_core::OfflineGraph;
    use parking_lot::Mutex;

    use super::*;

    struct Harness {
        graph: Arc<OfflineGraph>,
        voice: VoiceUnit,
        events: Arc<Mutex<Vec<VoiceSnapshot>>>,
    }

    fn setup() -> Harness {
        let graph = Arc::new(OfflineGraph::new());
        let voice = VoiceUnit::new(graph.clone(), &Settings::default()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        voice.subscribe(move |VoiceEvent::StateChanged(snap)| sink.lock().push(*snap));
        Harness {
            graph,
            voice,
            events,
        }
    }

    fn take() -> AudioBuffer {
        AudioBuffer::mono(vec![0.1; 4410], 44100)
    }

    #[test]
    fn test_defaults_from_settings() {
        let graph = Arc::new(OfflineGraph::new());
        let settings = Settings {
            voice_default_preset: 3,
            voice_gain: 1.7,
            voice_loop: true,
            ..Settings::default()
        };
        let voice = VoiceUnit::new(graph.clone(), &settings).unwrap();
        assert_eq!(voice.state().current_preset, 3);
        assert_eq!(voice.state().gain, 1.0);
        assert!(graph.is_looping(voice.player_node()));
    }

    #[tokio::test]
    async fn test_stop_recording_when_idle_is_noop() {
        let mut h = setup();
        h.voice.stop_recording().await.unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(h.events.lock().is_empty());
    }

    #[test]
    fn test_play_without_buffer_is_noop() {
        let mut h = setup();
        h.voice.play().unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(h.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_capture_unavailable_keeps_state() {
        let mut h = setup();
        h.graph.set_microphone_available(false);
        let err = h.voice.start_recording().await.unwrap_err();
        assert!(matches!(err, VoiceError::CaptureUnavailable(_)));
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(h.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_record_then_play() {
        let mut h = setup();
        h.graph.set_capture(take());

        h.voice.start_recording().await.unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Recording);
        assert!(matches!(h.voice.play(), Err(VoiceError::Busy)));

        h.voice.stop_recording().await.unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(h.voice.state().has_buffer);
        assert_eq!(h.voice.recording().unwrap().frames(), 4410);
        assert!(h.voice.last_take().unwrap().recorded_at <= Utc::now());

        h.voice.play().unwrap();
        assert!(h.graph.is_playing(h.voice.player_node()));
        h.voice.stop().unwrap();

        let modes: Vec<VoiceMode> = h.events.lock().iter().map(|s| s.mode).collect();
        assert_eq!(
            modes,
            vec![
                VoiceMode::Recording,
                VoiceMode::Idle,
                VoiceMode::Playing,
                VoiceMode::Idle
            ]
        );
        // The Idle notification after recording already carries the buffer.
        assert!(h.events.lock()[1].has_buffer);
    }

    #[tokio::test]
    async fn test_empty_capture_leaves_no_buffer() {
        let mut h = setup();
        h.voice.start_recording().await.unwrap();
        h.voice.stop_recording().await.unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(!h.voice.state().has_buffer);
        assert!(h.voice.recording().is_none());
    }

    #[tokio::test]
    async fn test_failed_take_load_still_returns_to_idle() {
        let mut h = setup();
        h.graph.set_capture(take());
        h.voice.start_recording().await.unwrap();
        h.graph.fail_next_load("runtime busy");

        let err = h.voice.stop_recording().await.unwrap_err();
        assert!(matches!(err, VoiceError::Load(_)));
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(!h.voice.state().has_buffer);
        assert_eq!(h.events.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_from_playing_passes_through_idle() {
        let mut h = setup();
        h.voice.load_buffer(take()).await.unwrap();
        h.voice.play().unwrap();
        h.voice.start_recording().await.unwrap();

        let modes: Vec<VoiceMode> = h.events.lock().iter().map(|s| s.mode).collect();
        assert_eq!(
            modes,
            vec![
                VoiceMode::Idle,
                VoiceMode::Playing,
                VoiceMode::Idle,
                VoiceMode::Recording
            ]
        );
        assert!(!h.graph.is_playing(h.voice.player_node()));
    }

    #[tokio::test]
    async fn test_load_file_stops_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.wav");
        let mut h = setup();
        assert!(matches!(
            h.voice.load_file(&path).await,
            Err(VoiceError::Load(LoadError::Io { .. }))
        ));
        assert!(h.events.lock().is_empty());

        h.voice.load_buffer(take()).await.unwrap();
        h.voice.play().unwrap();
        h.voice.load_buffer(take()).await.unwrap();
        assert_eq!(h.voice.state().mode, VoiceMode::Idle);
        assert!(!h.graph.is_playing(h.voice.player_node()));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_playback() {
        let mut h = setup();
        h.voice.load_buffer(take()).await.unwrap();
        h.voice.play().unwrap();
        let before = h.events.lock().len();

        h.graph.fail_next_load("corrupt");
        let err = h.voice.load_buffer(take()).await.unwrap_err();
        assert!(matches!(err, VoiceError::Load(LoadError::Graph(_))));
        assert_eq!(h.voice.state().mode, VoiceMode::Playing);
        assert!(h.voice.state().has_buffer);
        assert!(h.graph.is_playing(h.voice.player_node()));
        assert_eq!(h.events.lock().len(), before);
    }

    #[test]
    fn test_preset_gain_and_loop_notify_once_each() {
        let mut h = setup();
        h.voice.select_preset(2).unwrap();
        h.voice.set_gain(0.5).unwrap();
        h.voice.set_loop(true).unwrap();
        assert!(matches!(
            h.voice.select_preset(9),
            Err(VoiceError::Preset(PresetError::UnknownPreset(9)))
        ));

        let events = h.events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].current_preset, 2);
        assert_eq!(events[1].gain, 0.5);
        assert!(events[2].looping);
        assert_eq!(h.voice.presets().current().name, "Chipmunk");
    }
}
