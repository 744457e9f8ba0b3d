use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use duodeck_core::{
    ConfigManager, ConsoleCommand, ModuleEvent, ModuleManager, ModuleMessage, OfflineGraph,
    Settings,
};
use duodeck_dj::{DjModule, TempoEstimator, VoiceModule, NEUTRAL, PRESETS};
use tokio::sync::mpsc;

/// How long a session waits for deck loads before giving up.
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Two-deck DJ console with tempo sync and a live voice effects unit.
#[derive(Parser, Debug)]
#[command(name = "duodeck")]
#[command(about = "duodeck DJ console")]
struct Args {
    /// Config file (default: ~/.duodeck/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the tempo of audio files
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run a headless mixing session and print the event stream
    Session {
        /// Track for deck A
        #[arg(long)]
        deck_a: PathBuf,

        /// Track for deck B
        #[arg(long)]
        deck_b: Option<PathBuf>,

        /// Sync deck B to the master tempo
        #[arg(long, default_value = "false")]
        sync: bool,

        /// Crossfader position (0 = deck A, 1 = deck B)
        #[arg(long, default_value = "0.5")]
        crossfade: f64,

        /// Voice preset to select
        #[arg(long)]
        preset: Option<u8>,
    },
    /// List the voice presets
    Presets,
    /// Print and validate the settings
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Analyze { files } => analyze(&files),
        Command::Presets => {
            print_presets();
            Ok(())
        }
        Command::Config { path } => show_config(args.config, path),
        Command::Session {
            deck_a,
            deck_b,
            sync,
            crossfade,
            preset,
        } => {
            let settings = load_settings(args.config)?;
            session(settings, deck_a, deck_b, sync, crossfade, preset).await
        }
    }
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings, anyhow::Error> {
    let mut config = ConfigManager::new(path);
    let settings = config
        .load()
        .with_context(|| format!("loading {}", config.config_path().display()))?;
    Ok(settings)
}

fn analyze(files: &[PathBuf]) -> Result<(), anyhow::Error> {
    let estimator = TempoEstimator::default();
    let mut failures = 0;
    for file in files {
        match duodeck_dj::decode_file(file) {
            Ok(audio) => {
                let analysis = estimator.analyze_buffer(&audio);
                if analysis.is_known() {
                    println!(
                        "{}: {} BPM ({} peaks, {:.0}% confidence, {:.1}s)",
                        file.display(),
                        analysis.bpm,
                        analysis.peaks,
                        analysis.confidence * 100.0,
                        audio.duration_seconds()
                    );
                } else {
                    println!(
                        "{}: tempo unknown ({} peaks)",
                        file.display(),
                        analysis.peaks
                    );
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", file.display(), e);
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{} of {} files failed", failures, files.len()));
    }
    Ok(())
}

fn print_presets() {
    for preset in PRESETS.iter() {
        println!("{} {}", preset.id, preset.name);
        for (stage, param, value) in preset.overlay {
            let neutral = NEUTRAL
                .iter()
                .find(|(s, p, _)| s == stage && p == param)
                .map(|(_, _, v)| *v)
                .unwrap_or_default();
            println!(
                "    {:?}.{} = {} (neutral {})",
                stage,
                param.name(),
                value,
                neutral
            );
        }
    }
}

fn show_config(path: Option<PathBuf>, path_only: bool) -> Result<(), anyhow::Error> {
    let mut config = ConfigManager::new(path);
    if path_only {
        println!("{}", config.config_path().display());
        return Ok(());
    }
    // load() rejects out-of-range values.
    let settings = config.load()?;
    println!("# {} (valid)", config.config_path().display());
    println!("{:#?}", settings);
    Ok(())
}

async fn session(
    settings: Settings,
    deck_a: PathBuf,
    deck_b: Option<PathBuf>,
    sync: bool,
    crossfade: f64,
    preset: Option<u8>,
) -> Result<(), anyhow::Error> {
    let graph = Arc::new(OfflineGraph::with_spectrum_bins(
        settings.analyser_bins as usize,
    ));

    let mut manager = ModuleManager::new();
    manager.register_module(Box::new(DjModule::new(graph.clone(), settings.clone())));
    manager.register_module(Box::new(VoiceModule::new(graph, settings)));

    let mut messages = manager
        .take_message_receiver()
        .ok_or_else(|| anyhow!("message receiver already taken"))?;

    manager.initialize().await.map_err(|e| anyhow!(e))?;
    manager.start().await.map_err(|e| anyhow!(e))?;

    let mut pending = 0;
    for (deck, path) in [(0u8, Some(deck_a)), (1u8, deck_b)] {
        if let Some(path) = path {
            send(&manager, ConsoleCommand::DjLoadFile { deck, path }).await?;
            pending += 1;
        }
    }

    // Wait for every load to land before touching transport.
    let wait = async {
        while pending > 0 {
            match messages.recv().await {
                Some(message) => {
                    if matches!(
                        message,
                        ModuleMessage::Event(
                            ModuleEvent::DeckLoaded { .. } | ModuleEvent::DeckLoadFailed { .. }
                        )
                    ) {
                        pending -= 1;
                    }
                    print_message(&message);
                }
                None => break,
            }
        }
    };
    if tokio::time::timeout(LOAD_TIMEOUT, wait).await.is_err() {
        log::warn!("Timed out waiting for deck loads");
    }

    if sync {
        send(&manager, ConsoleCommand::DjToggleSync { deck: 1 }).await?;
    }
    send(&manager, ConsoleCommand::DjSetCrossfade { position: crossfade }).await?;
    send(&manager, ConsoleCommand::DjPlayPause { deck: 0 }).await?;
    if let Some(id) = preset {
        send(&manager, ConsoleCommand::VoiceSelectPreset { id }).await?;
    }
    send(&manager, ConsoleCommand::QueryStatus).await?;

    drain_until_status(&mut messages).await;

    manager.shutdown().await.map_err(|e| anyhow!(e))?;
    while let Ok(message) = messages.try_recv() {
        print_message(&message);
    }
    Ok(())
}

async fn send(manager: &ModuleManager, command: ConsoleCommand) -> Result<(), anyhow::Error> {
    manager.send_command(command).await.map_err(|e| anyhow!(e))
}

async fn drain_until_status(messages: &mut mpsc::Receiver<ModuleMessage>) {
    let drain = async {
        while let Some(message) = messages.recv().await {
            print_message(&message);
            if matches!(message, ModuleMessage::Status(_)) {
                break;
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        log::warn!("No status reply from the DJ module");
    }
}

fn print_message(message: &ModuleMessage) {
    match message {
        ModuleMessage::Event(event) => println!("event  {:?}", event),
        ModuleMessage::Status(status) => println!("status {}", status),
        ModuleMessage::Error(error) => println!("error  {}", error),
    }
}
