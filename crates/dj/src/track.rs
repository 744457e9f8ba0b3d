//! Loaded tracks and file decoding.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use duodeck_core::{AudioBuffer, GraphError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::tempo::TempoEstimator;

/// Unique track identifier, assigned per load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl TrackId {
    /// Allocate the next process-wide id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from decoding or loading audio.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported audio: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("decoded audio is empty")]
    Empty,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// An immutable decoded track with its estimated tempo.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    /// File the audio came from, if any.
    pub source: Option<PathBuf>,
    pub audio: AudioBuffer,
    /// Estimated BPM, 0 when unknown.
    pub estimated_bpm: f64,
}

impl Track {
    /// Wrap decoded audio and estimate its tempo.
    pub fn analyze(audio: AudioBuffer, estimator: &TempoEstimator) -> Self {
        let estimated_bpm = estimator.estimate_buffer(&audio);
        Self {
            id: TrackId::next(),
            source: None,
            audio,
            estimated_bpm,
        }
    }

    /// Decode a file and estimate its tempo.
    pub fn from_file(path: &Path, estimator: &TempoEstimator) -> Result<Self, LoadError> {
        let audio = decode_file(path)?;
        let mut track = Self::analyze(audio, estimator);
        track.source = Some(path.to_path_buf());
        log::info!(
            "Track {} decoded from {:?}: {:.1}s, {} BPM",
            track.id,
            path,
            track.audio.duration_seconds(),
            track.estimated_bpm
        );
        Ok(track)
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.audio.channels()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.audio.duration_seconds()
    }

    /// Display name derived from the source file.
    pub fn name(&self) -> String {
        self.source
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("track {}", self.id))
    }
}

/// Decode an audio file to interleaved f32 samples.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(map_symphonia_error)?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::Unsupported("no audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(map_symphonia_error)?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(map_symphonia_error(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let buf = sample_buf
                    .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
                if buf.capacity() < decoded.capacity() * spec.channels.count() {
                    *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
                }
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {:?}: {}", path, e);
            }
            Err(e) => return Err(map_symphonia_error(e)),
        }
    }

    if samples.is_empty() {
        return Err(LoadError::Empty);
    }

    log::debug!(
        "Decoded {:?}: {} samples, {} Hz, {} ch",
        path,
        samples.len(),
        sample_rate,
        channels
    );
    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

fn map_symphonia_error(err: SymphoniaError) -> LoadError {
    match err {
        SymphoniaError::Unsupported(what) => LoadError::Unsupported(what.to_string()),
        other => LoadError::Decode(other.to_string()),
    }
}
