//! DJ and voice module implementations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use duodeck_core::{
    AsyncModule, AudioGraph, ConsoleCommand, ModuleEvent, ModuleId, ModuleMessage, Settings,
};
use tokio::sync::mpsc;

use crate::deck::{DeckError, DeckEvent, DeckId, EqBand};
use crate::mixer::{MixerBus, MixerEvent};
use crate::track::{LoadError, Track};
use crate::voice::{VoiceError, VoiceEvent, VoiceMode, VoiceUnit};

type ModuleResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Commands for the DJ module.
#[derive(Debug, Clone, PartialEq)]
pub enum DjCommand {
    // Deck loading commands
    /// Decode a file and load it onto a deck.
    LoadFile { deck: DeckId, path: PathBuf },
    /// Eject the track from a deck.
    Eject { deck: DeckId },

    // Transport commands
    PlayPause { deck: DeckId },
    ToggleSync { deck: DeckId },
    SetRate { deck: DeckId, rate: f64 },

    // Channel strip commands
    SetVolume { deck: DeckId, db: f64 },
    SetFilter { deck: DeckId, cutoff_hz: f64 },
    SetEq { deck: DeckId, band: EqBand, db: f64 },
    SetPan { deck: DeckId, pan: f64 },

    // Mixer commands
    SetCrossfade { position: f64 },
    SetMasterVolume { db: f64 },
    SetMasterTempo { bpm: f64 },

    /// Report deck and master state.
    QueryStatus,
}

impl DjCommand {
    /// Translate a console command. Returns `None` for commands addressed to
    /// other modules or naming an unknown deck.
    pub fn from_console(cmd: ConsoleCommand) -> Option<Self> {
        let deck = |index: u8| {
            let id = DeckId::from_index(index as usize);
            if id.is_none() {
                log::warn!("Ignoring command for unknown deck {}", index);
            }
            id
        };
        match cmd {
            ConsoleCommand::DjLoadFile { deck: d, path } => Some(Self::LoadFile {
                deck: deck(d)?,
                path,
            }),
            ConsoleCommand::DjEject { deck: d } => Some(Self::Eject { deck: deck(d)? }),
            ConsoleCommand::DjPlayPause { deck: d } => Some(Self::PlayPause { deck: deck(d)? }),
            ConsoleCommand::DjToggleSync { deck: d } => Some(Self::ToggleSync { deck: deck(d)? }),
            ConsoleCommand::DjSetRate { deck: d, rate } => Some(Self::SetRate {
                deck: deck(d)?,
                rate,
            }),
            ConsoleCommand::DjSetVolume { deck: d, db } => Some(Self::SetVolume {
                deck: deck(d)?,
                db,
            }),
            ConsoleCommand::DjSetFilter { deck: d, cutoff_hz } => Some(Self::SetFilter {
                deck: deck(d)?,
                cutoff_hz,
            }),
            ConsoleCommand::DjSetEq { deck: d, band, db } => {
                let band = EqBand::from_index(band).or_else(|| {
                    log::warn!("Ignoring EQ command for unknown band {}", band);
                    None
                })?;
                Some(Self::SetEq {
                    deck: deck(d)?,
                    band,
                    db,
                })
            }
            ConsoleCommand::DjSetPan { deck: d, pan } => Some(Self::SetPan {
                deck: deck(d)?,
                pan,
            }),
            ConsoleCommand::DjSetCrossfade { position } => Some(Self::SetCrossfade { position }),
            ConsoleCommand::DjSetMasterVolume { db } => Some(Self::SetMasterVolume { db }),
            ConsoleCommand::DjSetMasterTempo { bpm } => Some(Self::SetMasterTempo { bpm }),
            ConsoleCommand::QueryStatus => Some(Self::QueryStatus),
            _ => None,
        }
    }
}

/// A finished background load.
type LoadCompletion = (DeckId, Result<Track, LoadError>);

/// DJ module: owns the mixer and both decks.
pub struct DjModule {
    graph: Arc<dyn AudioGraph>,
    settings: Settings,
    mixer: Option<MixerBus>,
}

impl DjModule {
    pub fn new(graph: Arc<dyn AudioGraph>, settings: Settings) -> Self {
        Self {
            graph,
            settings,
            mixer: None,
        }
    }

    pub fn mixer(&self) -> Option<&MixerBus> {
        self.mixer.as_ref()
    }

    /// Forward deck and mixer notifications to the module manager.
    fn forward_events(mixer: &MixerBus, tx: &mpsc::Sender<ModuleMessage>) {
        for id in [DeckId::A, DeckId::B] {
            let tx = tx.clone();
            mixer.deck(id).subscribe(move |event| {
                let event = match event {
                    DeckEvent::Loaded {
                        snapshot,
                        duration_seconds,
                    } => ModuleEvent::DeckLoaded {
                        deck: snapshot.deck.as_u8(),
                        bpm: snapshot.bpm,
                        duration_seconds: *duration_seconds,
                        is_playing: snapshot.transport.is_playing(),
                        playback_rate: snapshot.playback_rate,
                        is_synced: snapshot.is_synced,
                    },
                    DeckEvent::StateChanged(snap) => ModuleEvent::DeckStateChanged {
                        deck: snap.deck.as_u8(),
                        is_playing: snap.transport.is_playing(),
                        playback_rate: snap.playback_rate,
                        is_synced: snap.is_synced,
                        bpm: snap.bpm,
                    },
                };
                forward(&tx, event);
            });
        }

        let tx = tx.clone();
        mixer.subscribe(move |event| {
            let event = match event {
                MixerEvent::MasterTempoChanged { bpm } => {
                    ModuleEvent::MasterTempoChanged { bpm: *bpm }
                }
                MixerEvent::CrossfadeChanged {
                    position,
                    gain_a,
                    gain_b,
                } => ModuleEvent::CrossfadeChanged {
                    position: *position,
                    gain_a: *gain_a,
                    gain_b: *gain_b,
                },
                MixerEvent::MasterVolumeChanged { db } => {
                    ModuleEvent::MasterVolumeChanged { db: *db }
                }
            };
            forward(&tx, event);
        });
    }

    /// Execute a command. Loads are started here and finished on completion.
    async fn handle_command(
        &mut self,
        cmd: DjCommand,
        loads: &mpsc::Sender<LoadCompletion>,
        tx: &mpsc::Sender<ModuleMessage>,
    ) -> Result<(), DeckError> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("DJ module not initialized, ignoring {:?}", cmd);
            return Ok(());
        };
        match cmd {
            DjCommand::LoadFile { deck, path } => {
                if let Err(e) = mixer.deck_mut(deck).begin_load() {
                    let _ = tx
                        .send(ModuleMessage::Event(ModuleEvent::DeckLoadFailed {
                            deck: deck.as_u8(),
                            message: e.to_string(),
                        }))
                        .await;
                    return Ok(());
                }
                log::info!("Deck {}: loading {:?}", deck, path);
                let estimator = mixer.estimator().clone();
                let done = loads.clone();
                // Only decoding runs off the loop. The player is loaded on completion.
                tokio::spawn(async move {
                    let decoded =
                        tokio::task::spawn_blocking(move || Track::from_file(&path, &estimator))
                            .await;
                    let result = match decoded {
                        Ok(result) => result,
                        Err(e) => Err(LoadError::Decode(format!("decode task failed: {}", e))),
                    };
                    let _ = done.send((deck, result)).await;
                });
            }
            DjCommand::Eject { deck } => mixer.deck_mut(deck).eject()?,
            DjCommand::PlayPause { deck } => {
                mixer.deck_mut(deck).play_pause()?;
            }
            DjCommand::ToggleSync { deck } => {
                mixer.deck_mut(deck).toggle_sync()?;
            }
            DjCommand::SetRate { deck, rate } => mixer.deck_mut(deck).set_rate(rate)?,
            DjCommand::SetVolume { deck, db } => mixer.deck_mut(deck).set_volume_db(db)?,
            DjCommand::SetFilter { deck, cutoff_hz } => {
                mixer.deck_mut(deck).set_filter_cutoff(cutoff_hz)?
            }
            DjCommand::SetEq { deck, band, db } => mixer.deck_mut(deck).set_eq(band, db)?,
            DjCommand::SetPan { deck, pan } => mixer.deck_mut(deck).set_pan(pan)?,
            DjCommand::SetCrossfade { position } => mixer.set_crossfade(position)?,
            DjCommand::SetMasterVolume { db } => mixer.set_master_volume(db)?,
            DjCommand::SetMasterTempo { bpm } => mixer.set_master_tempo(bpm)?,
            DjCommand::QueryStatus => {
                let master = mixer.master_state();
                let mut summary = format!(
                    "master {:.2} BPM, crossfade {:.2}, volume {:.1} dB",
                    master.bpm, master.crossfade_position, master.master_volume_db
                );
                for id in [DeckId::A, DeckId::B] {
                    let snap = mixer.deck(id).snapshot();
                    summary.push_str(&format!(
                        "; deck {}: {:?} rate {:.4} sync {} bpm {}",
                        id, snap.transport, snap.playback_rate, snap.is_synced, snap.bpm
                    ));
                }
                let _ = tx.send(ModuleMessage::Status(summary)).await;
            }
        }
        Ok(())
    }

    async fn handle_load_complete(
        &mut self,
        (deck, result): LoadCompletion,
        tx: &mpsc::Sender<ModuleMessage>,
    ) {
        let Some(mixer) = self.mixer.as_mut() else {
            return;
        };
        let result = match result {
            Ok(track) => {
                let player = mixer.deck(deck).player_node();
                match self.graph.load_buffer(player, track.audio.clone()).await {
                    Ok(()) => Ok(track),
                    Err(e) => Err(LoadError::from(e)),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = mixer.finish_load(deck, result) {
            let _ = tx
                .send(ModuleMessage::Event(ModuleEvent::DeckLoadFailed {
                    deck: deck.as_u8(),
                    message: e.to_string(),
                }))
                .await;
        }
    }
}

#[async_trait]
impl AsyncModule for DjModule {
    fn id(&self) -> ModuleId {
        ModuleId::Dj
    }

    async fn initialize(&mut self) -> ModuleResult<()> {
        log::info!("Initializing DJ module");
        let mixer = MixerBus::new(self.graph.clone(), &self.settings)?;
        self.mixer = Some(mixer);
        log::info!("DJ module initialized");
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> ModuleResult<()> {
        log::info!("DJ module running");

        let Some(mixer) = self.mixer.as_ref() else {
            return Err("DJ module not initialized".into());
        };
        Self::forward_events(mixer, &tx);

        let (load_tx, mut load_rx) = mpsc::channel::<LoadCompletion>(8);

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        None => {
                            log::info!("DJ module inbox closed");
                            break;
                        }
                        Some(ModuleEvent::Shutdown) => {
                            log::info!("DJ module received shutdown");
                            break;
                        }
                        Some(ModuleEvent::Command(console_cmd)) => {
                            log::debug!("DJ module received command: {:?}", console_cmd);
                            if let Some(cmd) = DjCommand::from_console(console_cmd) {
                                if let Err(e) = self.handle_command(cmd, &load_tx, &tx).await {
                                    log::warn!("DJ command failed: {}", e);
                                    let _ = tx.send(ModuleMessage::Error(e.to_string())).await;
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Some(done) = load_rx.recv() => {
                    self.handle_load_complete(done, &tx).await;
                }
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self) -> ModuleResult<()> {
        log::info!("Shutting down DJ module");
        if let Some(mixer) = self.mixer.as_mut() {
            for id in [DeckId::A, DeckId::B] {
                let deck = mixer.deck_mut(id);
                if deck.state().transport.is_playing() {
                    deck.play_pause()?;
                }
            }
        }
        log::info!("DJ module shutdown complete");
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        let mut status = HashMap::new();
        let Some(mixer) = self.mixer.as_ref() else {
            status.insert("state".to_string(), "uninitialized".to_string());
            return status;
        };
        for id in [DeckId::A, DeckId::B] {
            let snap = mixer.deck(id).snapshot();
            let key = id.to_string().to_lowercase();
            status.insert(format!("deck_{}_state", key), format!("{:?}", snap.transport));
            status.insert(format!("deck_{}_bpm", key), format!("{:.2}", snap.bpm));
            status.insert(
                format!("deck_{}_rate", key),
                format!("{:.4}", snap.playback_rate),
            );
        }
        status.insert(
            "master_bpm".to_string(),
            format!("{:.2}", mixer.master_bpm()),
        );
        status
    }
}

/// Commands for the voice module.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCommand {
    StartRecording,
    StopRecording,
    Play,
    Stop,
    LoadFile { path: PathBuf },
    SelectPreset { id: u8 },
    SetLoop { enabled: bool },
    SetGain { gain: f64 },
}

impl VoiceCommand {
    pub fn from_console(cmd: ConsoleCommand) -> Option<Self> {
        match cmd {
            ConsoleCommand::VoiceStartRecording => Some(Self::StartRecording),
            ConsoleCommand::VoiceStopRecording => Some(Self::StopRecording),
            ConsoleCommand::VoicePlay => Some(Self::Play),
            ConsoleCommand::VoiceStop => Some(Self::Stop),
            ConsoleCommand::VoiceLoadFile { path } => Some(Self::LoadFile { path }),
            ConsoleCommand::VoiceSelectPreset { id } => Some(Self::SelectPreset { id }),
            ConsoleCommand::VoiceSetLoop { enabled } => Some(Self::SetLoop { enabled }),
            ConsoleCommand::VoiceSetGain { gain } => Some(Self::SetGain { gain }),
            _ => None,
        }
    }
}

/// Voice module: owns the voice unit.
pub struct VoiceModule {
    graph: Arc<dyn AudioGraph>,
    settings: Settings,
    voice: Option<VoiceUnit>,
}

impl VoiceModule {
    pub fn new(graph: Arc<dyn AudioGraph>, settings: Settings) -> Self {
        Self {
            graph,
            settings,
            voice: None,
        }
    }

    async fn handle_command(&mut self, cmd: VoiceCommand) -> Result<(), VoiceError> {
        let Some(voice) = self.voice.as_mut() else {
            log::warn!("Voice module not initialized, ignoring {:?}", cmd);
            return Ok(());
        };
        match cmd {
            VoiceCommand::StartRecording => voice.start_recording().await,
            VoiceCommand::StopRecording => voice.stop_recording().await,
            VoiceCommand::Play => voice.play(),
            VoiceCommand::Stop => voice.stop(),
            VoiceCommand::LoadFile { path } => voice.load_file(&path).await,
            VoiceCommand::SelectPreset { id } => voice.select_preset(id),
            VoiceCommand::SetLoop { enabled } => voice.set_loop(enabled),
            VoiceCommand::SetGain { gain } => voice.set_gain(gain),
        }
    }
}

#[async_trait]
impl AsyncModule for VoiceModule {
    fn id(&self) -> ModuleId {
        ModuleId::Voice
    }

    async fn initialize(&mut self) -> ModuleResult<()> {
        log::info!("Initializing voice module");
        self.voice = Some(VoiceUnit::new(self.graph.clone(), &self.settings)?);
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> ModuleResult<()> {
        log::info!("Voice module running");

        let Some(voice) = self.voice.as_ref() else {
            return Err("voice module not initialized".into());
        };
        let events = tx.clone();
        voice.subscribe(move |VoiceEvent::StateChanged(snap)| {
            forward(
                &events,
                ModuleEvent::VoiceStateChanged {
                    recording: snap.mode == VoiceMode::Recording,
                    playing: snap.mode == VoiceMode::Playing,
                    has_buffer: snap.has_buffer,
                    preset: snap.current_preset,
                    looping: snap.looping,
                    gain: snap.gain,
                },
            );
        });

        while let Some(event) = rx.recv().await {
            match event {
                ModuleEvent::Shutdown => {
                    log::info!("Voice module received shutdown");
                    break;
                }
                ModuleEvent::Command(console_cmd) => {
                    if let Some(cmd) = VoiceCommand::from_console(console_cmd) {
                        if let Err(e) = self.handle_command(cmd).await {
                            log::warn!("Voice command failed: {}", e);
                            let _ = tx.send(ModuleMessage::Error(e.to_string())).await;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> ModuleResult<()> {
        log::info!("Shutting down voice module");
        if let Some(voice) = self.voice.as_mut() {
            voice.stop_recording().await.ok();
            voice.stop()?;
        }
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        let mut status = HashMap::new();
        if let Some(voice) = &self.voice {
            let state = voice.state();
            status.insert("mode".to_string(), format!("{:?}", state.mode));
            status.insert("has_buffer".to_string(), state.has_buffer.to_string());
            status.insert(
                "preset".to_string(),
                voice.presets().current().name.to_string(),
            );
        }
        status
    }
}

/// Push an event from a synchronous observer without blocking.
fn forward(tx: &mpsc::Sender<ModuleMessage>, event: ModuleEvent) {
    if let Err(e) = tx.try_send(ModuleMessage::Event(event)) {
        log::warn!("Dropping module event: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use duodeck_core::OfflineGraph;

    use super::*;

    #[test]
    fn test_translate_dj_commands() {
        assert_eq!(
            DjCommand::from_console(ConsoleCommand::DjToggleSync { deck: 1 }),
            Some(DjCommand::ToggleSync { deck: DeckId::B })
        );
        assert_eq!(
            DjCommand::from_console(ConsoleCommand::DjSetEq {
                deck: 0,
                band: 2,
                db: -3.0
            }),
            Some(DjCommand::SetEq {
                deck: DeckId::A,
                band: EqBand::High,
                db: -3.0
            })
        );
        assert_eq!(
            DjCommand::from_console(ConsoleCommand::DjPlayPause { deck: 5 }),
            None
        );
        assert_eq!(DjCommand::from_console(ConsoleCommand::VoicePlay), None);
    }

    #[test]
    fn test_translate_voice_commands() {
        assert_eq!(
            VoiceCommand::from_console(ConsoleCommand::VoiceSelectPreset { id: 4 }),
            Some(VoiceCommand::SelectPreset { id: 4 })
        );
        assert_eq!(
            VoiceCommand::from_console(ConsoleCommand::DjEject { deck: 0 }),
            None
        );
    }

    #[tokio::test]
    async fn test_dj_module_reports_failed_load() {
        let graph = Arc::new(OfflineGraph::new());
        let mut module = DjModule::new(graph, Settings::default());
        module.initialize().await.unwrap();

        let (event_tx, event_rx) = mpsc::channel(16);
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            module.run(event_rx, msg_tx).await.unwrap();
            module
        });

        event_tx
            .send(ModuleEvent::Command(ConsoleCommand::DjLoadFile {
                deck: 0,
                path: PathBuf::from("/nonexistent/track.wav"),
            }))
            .await
            .unwrap();

        match msg_rx.recv().await {
            Some(ModuleMessage::Event(ModuleEvent::DeckLoadFailed { deck, .. })) => {
                assert_eq!(deck, 0)
            }
            other => panic!("unexpected message: {:?}", other),
        }

        event_tx.send(ModuleEvent::Shutdown).await.unwrap();
        let module = handle.await.unwrap();
        let deck = module.mixer().unwrap().deck(DeckId::A);
        assert!(!deck.is_loading());
        assert!(deck.track().is_none());
    }

    fn write_silent_wav(path: &std::path::Path, frames: usize) {
        use std::io::Write;
        let data_len = (frames * 2) as u32;
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVEfmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        file.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        file.write_all(&44100u32.to_le_bytes()).unwrap();
        file.write_all(&(44100u32 * 2).to_le_bytes()).unwrap();
        file.write_all(&2u16.to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        file.write_all(&vec![0u8; frames * 2]).unwrap();
    }

    #[tokio::test]
    async fn test_dj_module_loads_player_with_deck_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_silent_wav(&path, 4410);

        let graph = Arc::new(OfflineGraph::new());
        let mut module = DjModule::new(graph.clone(), Settings::default());
        module.initialize().await.unwrap();
        let player = module.mixer().unwrap().deck(DeckId::B).player_node();

        let (event_tx, event_rx) = mpsc::channel(16);
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            module.run(event_rx, msg_tx).await.unwrap();
            module
        });

        event_tx
            .send(ModuleEvent::Command(ConsoleCommand::DjLoadFile { deck: 1, path }))
            .await
            .unwrap();
        match msg_rx.recv().await {
            Some(ModuleMessage::Event(ModuleEvent::DeckLoaded {
                deck,
                bpm,
                is_playing,
                ..
            })) => {
                assert_eq!(deck, 1);
                assert_eq!(bpm, 0.0);
                assert!(!is_playing);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(graph.loaded_buffer(player).unwrap().frames(), 4410);

        event_tx.send(ModuleEvent::Shutdown).await.unwrap();
        let module = handle.await.unwrap();
        let deck = module.mixer().unwrap().deck(DeckId::B);
        assert!(deck.track().is_some());
        assert!(!deck.is_loading());
    }

    #[tokio::test]
    async fn test_dj_module_stops_when_inbox_closes() {
        let graph = Arc::new(OfflineGraph::new());
        let mut module = DjModule::new(graph, Settings::default());
        module.initialize().await.unwrap();

        let (event_tx, event_rx) = mpsc::channel(16);
        let (msg_tx, _msg_rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { module.run(event_rx, msg_tx).await.is_ok() });

        drop(event_tx);
        let finished = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
        assert!(matches!(finished, Ok(Ok(true))));
    }

    #[tokio::test]
    async fn test_dj_module_forwards_crossfade() {
        let graph = Arc::new(OfflineGraph::new());
        let mut module = DjModule::new(graph, Settings::default());
        module.initialize().await.unwrap();

        let (event_tx, event_rx) = mpsc::channel(16);
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { module.run(event_rx, msg_tx).await.unwrap() });

        event_tx
            .send(ModuleEvent::Command(ConsoleCommand::DjSetCrossfade {
                position: 0.0,
            }))
            .await
            .unwrap();
        match msg_rx.recv().await {
            Some(ModuleMessage::Event(ModuleEvent::CrossfadeChanged {
                gain_a, gain_b, ..
            })) => {
                assert_eq!((gain_a, gain_b), (1.0, 0.0));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        event_tx
            .send(ModuleEvent::Command(ConsoleCommand::DjPlayPause { deck: 0 }))
            .await
            .unwrap();
        assert!(matches!(
            msg_rx.recv().await,
            Some(ModuleMessage::Error(_))
        ));

        event_tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_voice_module_forwards_state() {
        let graph = Arc::new(OfflineGraph::new());
        let mut module = VoiceModule::new(graph, Settings::default());
        module.initialize().await.unwrap();
        assert_eq!(module.status().get("preset").unwrap(), "Natural");

        let (event_tx, event_rx) = mpsc::channel(16);
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { module.run(event_rx, msg_tx).await.unwrap() });

        event_tx
            .send(ModuleEvent::Command(ConsoleCommand::VoiceSelectPreset {
                id: 6,
            }))
            .await
            .unwrap();
        match msg_rx.recv().await {
            Some(ModuleMessage::Event(ModuleEvent::VoiceStateChanged { preset, .. })) => {
                assert_eq!(preset, 6)
            }
            other => panic!("unexpected message: {:?}", other),
        }

        event_tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();
    }
}
