use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CrossfadeLaw, Settings};

/// Configuration manager for duodeck settings
/// Provides a layered configuration system that separates schema, available options, and persisted
/// values. Configuration is stored in ~/.duodeck/config.json by default
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub mixer: MixerConfigSchema,
    pub voice: VoiceConfigSchema,
    pub metering: MeteringConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfigSchema {
    pub ramp_ms: ConfigOption<u32>,
    pub default_master_bpm: ConfigOption<f64>,
    pub crossfade_law: ConfigOption<CrossfadeLaw>,
    pub master_volume_db: ConfigOption<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfigSchema {
    pub voice_default_preset: ConfigOption<u8>,
    pub voice_gain: ConfigOption<f64>,
    pub voice_loop: ConfigOption<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfigSchema {
    pub analyser_bins: ConfigOption<u32>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
    pub requires_restart: bool,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    /// If no path is provided, defaults to ~/.duodeck/config.json
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(Self::default_path);

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Default configuration location.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".duodeck")
            .join("config.json")
    }

    /// Load settings from configuration file
    /// Writes and returns default settings if the file doesn't exist
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            // Create default config file
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Validate version compatibility
        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        Self::validate_settings(&config_file.settings).map_err(ConfigError::ValidationError)?;

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        // Ensure config directory exists (if config is in a subdirectory)
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: now.clone(),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        log::debug!("Saved settings to {}", self.config_path.display());
        Ok(())
    }

    /// Validate, update settings and save to file
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    /// Get current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        ConfigSchema {
            mixer: MixerConfigSchema {
                ramp_ms: ConfigOption {
                    default: 30,
                    valid_range: Some((5, 500)),
                    valid_choices: None,
                    description: "Smoothing time for volume, filter, EQ and crossfade changes"
                        .to_string(),
                    requires_restart: false,
                },
                default_master_bpm: ConfigOption {
                    default: 120.0,
                    valid_range: Some((40.0, 300.0)),
                    valid_choices: None,
                    description: "Master tempo before the first track is analysed".to_string(),
                    requires_restart: true,
                },
                crossfade_law: ConfigOption {
                    default: CrossfadeLaw::EqualPower,
                    valid_range: None,
                    valid_choices: Some(vec![CrossfadeLaw::EqualPower, CrossfadeLaw::Linear]),
                    description: "Crossfader gain curve".to_string(),
                    requires_restart: false,
                },
                master_volume_db: ConfigOption {
                    default: 0.0,
                    valid_range: Some((-60.0, 6.0)),
                    valid_choices: None,
                    description: "Initial master output level in dB".to_string(),
                    requires_restart: false,
                },
            },
            voice: VoiceConfigSchema {
                voice_default_preset: ConfigOption {
                    default: 0,
                    valid_range: Some((0, 6)),
                    valid_choices: None,
                    description: "Voice effect preset selected at startup".to_string(),
                    requires_restart: true,
                },
                voice_gain: ConfigOption {
                    default: 0.8,
                    valid_range: Some((0.0, 1.0)),
                    valid_choices: None,
                    description: "Voice playback gain".to_string(),
                    requires_restart: false,
                },
                voice_loop: ConfigOption {
                    default: false,
                    valid_range: None,
                    valid_choices: None,
                    description: "Loop voice playback".to_string(),
                    requires_restart: false,
                },
            },
            metering: MeteringConfigSchema {
                analyser_bins: ConfigOption {
                    default: 64,
                    valid_range: None,
                    valid_choices: Some(vec![32, 64, 128, 256, 512, 1024]),
                    description: "Number of spectrum analyser bins".to_string(),
                    requires_restart: true,
                },
            },
        }
    }

    /// Validate settings against schema
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        // Validate mixer settings
        if let Some((min, max)) = schema.mixer.ramp_ms.valid_range {
            if settings.ramp_ms < min || settings.ramp_ms > max {
                errors.push(format!("ramp_ms must be between {} and {}", min, max));
            }
        }

        if let Some((min, max)) = schema.mixer.default_master_bpm.valid_range {
            if !(min..=max).contains(&settings.default_master_bpm) {
                errors.push(format!(
                    "default_master_bpm must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.mixer.master_volume_db.valid_range {
            if !(min..=max).contains(&settings.master_volume_db) {
                errors.push(format!("master_volume_db must be between {} and {}", min, max));
            }
        }

        // Validate voice settings
        if let Some((min, max)) = schema.voice.voice_default_preset.valid_range {
            if settings.voice_default_preset < min || settings.voice_default_preset > max {
                errors.push(format!(
                    "voice_default_preset must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.voice.voice_gain.valid_range {
            if !(min..=max).contains(&settings.voice_gain) {
                errors.push(format!("voice_gain must be between {} and {}", min, max));
            }
        }

        // Validate metering settings
        if let Some(choices) = &schema.metering.analyser_bins.valid_choices {
            if !choices.contains(&settings.analyser_bins) {
                errors.push(format!("analyser_bins must be one of: {:?}", choices));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}
