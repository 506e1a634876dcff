use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::{
    AudioMetric, DeadAirConfig, MfccComparator, SceneConfig, SilenceConfig, SimilarityWeights,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no source url configured")]
    NoSource,
    #[error("silence activation threshold must be below the deactivation threshold")]
    InvalidHysteresis,
    #[error("definite scene-change threshold must be below the pending threshold")]
    InvalidSceneThresholds,
    #[error("dead-air minimum gap must not exceed the maximum gap")]
    InvalidGapBounds,
}

fn default_sample_fps() -> u32 {
    5
}

fn default_sample_rate() -> u32 {
    44_100
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    /// Frame rate the video stream is analyzed at.
    #[serde(default = "default_sample_fps")]
    pub sample_fps: u32,
    /// Sample rate the audio stream is decoded to.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Stop the session once this much stream time has been processed.
    #[serde(default)]
    pub duration_limit_secs: Option<f64>,
}

fn default_black_threshold() -> f64 {
    0.02
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlackConfig {
    #[serde(default = "default_black_threshold")]
    pub threshold: f64,
}

impl Default for BlackConfig {
    fn default() -> Self {
        Self {
            threshold: default_black_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SilenceSection {
    pub activation_db: f64,
    pub deactivation_db: f64,
    pub window_secs: f64,
}

impl Default for SilenceSection {
    fn default() -> Self {
        let defaults = SilenceConfig::default();
        Self {
            activation_db: defaults.activation_db,
            deactivation_db: defaults.deactivation_db,
            window_secs: defaults.window_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadAirSection {
    pub min_gap_secs: f64,
    pub max_gap_secs: f64,
}

impl Default for DeadAirSection {
    fn default() -> Self {
        let defaults = DeadAirConfig::default();
        Self {
            min_gap_secs: defaults.min_gap_secs,
            max_gap_secs: defaults.max_gap_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    pub definite_threshold: f64,
    pub change_threshold: f64,
    pub min_scene_duration_secs: f64,
    pub audio_window_secs: f64,
    pub weights: SimilarityWeights,
}

impl Default for SceneSection {
    fn default() -> Self {
        let defaults = SceneConfig::default();
        Self {
            definite_threshold: defaults.definite_threshold,
            change_threshold: defaults.change_threshold,
            min_scene_duration_secs: defaults.min_scene_duration_secs,
            audio_window_secs: defaults.audio_window_secs,
            weights: SimilarityWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub metric: AudioMetric,
    /// Empirical similarity threshold; each metric has its own default.
    pub threshold: Option<f64>,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            metric: AudioMetric::Euclidean,
            threshold: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSONL journal of boundary/cut events.
    pub journal_path: Option<PathBuf>,
    /// Cut standalone segment files here after the session.
    pub segments_dir: Option<PathBuf>,
    /// Write per-segment transport-stream units here during the session.
    pub units_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub black: BlackConfig,
    #[serde(default)]
    pub silence: SilenceSection,
    #[serde(default)]
    pub dead_air: DeadAirSection,
    #[serde(default)]
    pub scene: SceneSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        if config.source.url.is_empty() {
            return Err(ConfigError::NoSource);
        }
        if config.silence.activation_db >= config.silence.deactivation_db {
            return Err(ConfigError::InvalidHysteresis);
        }
        if config.scene.definite_threshold >= config.scene.change_threshold {
            return Err(ConfigError::InvalidSceneThresholds);
        }
        if config.dead_air.min_gap_secs > config.dead_air.max_gap_secs {
            return Err(ConfigError::InvalidGapBounds);
        }

        Ok(config)
    }

    pub fn silence_config(&self) -> SilenceConfig {
        SilenceConfig {
            activation_db: self.silence.activation_db,
            deactivation_db: self.silence.deactivation_db,
            window_secs: self.silence.window_secs,
            sample_rate: self.source.sample_rate,
        }
    }

    pub fn dead_air_config(&self) -> DeadAirConfig {
        DeadAirConfig {
            min_gap_secs: self.dead_air.min_gap_secs,
            max_gap_secs: self.dead_air.max_gap_secs,
        }
    }

    pub fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            definite_threshold: self.scene.definite_threshold,
            change_threshold: self.scene.change_threshold,
            min_scene_duration_secs: self.scene.min_scene_duration_secs,
            audio_window_secs: self.scene.audio_window_secs,
        }
    }

    pub fn comparator(&self) -> MfccComparator {
        MfccComparator::new(
            self.source.sample_rate,
            self.audio.metric,
            self.audio.threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_applies_defaults() {
        let config = Config::from_str("[source]\nurl = \"stream.ts\"").unwrap();
        assert_eq!(config.source.sample_fps, 5);
        assert_eq!(config.source.sample_rate, 44_100);
        assert_eq!(config.black.threshold, 0.02);
        assert_eq!(config.silence.activation_db, -50.0);
        assert_eq!(config.silence.deactivation_db, -45.0);
        assert_eq!(config.dead_air.min_gap_secs, 1.0);
        assert_eq!(config.dead_air.max_gap_secs, 120.0);
        assert_eq!(config.scene.definite_threshold, 0.1);
        assert_eq!(config.scene.change_threshold, 0.8);
        assert_eq!(config.audio.metric, AudioMetric::Euclidean);
        assert!(config.output.journal_path.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_str(
            r#"
            [source]
            url = "http://example/stream"
            sample_fps = 10
            duration_limit_secs = 30.0

            [silence]
            activation_db = -55.0
            deactivation_db = -48.0
            window_secs = 0.1

            [scene]
            change_threshold = 0.7

            [scene.weights]
            gray_correlation = 0.4
            color_correlation = 0.0

            [audio]
            metric = "cosine"
            threshold = 0.3
            "#,
        )
        .unwrap();

        assert_eq!(config.source.duration_limit_secs, Some(30.0));
        assert_eq!(config.silence_config().window_secs, 0.1);
        assert_eq!(config.scene.change_threshold, 0.7);
        assert_eq!(config.scene.weights.gray_correlation, 0.4);
        assert_eq!(config.scene.weights.color_correlation, 0.0);
        // Untouched weight keeps its default
        assert_eq!(config.scene.weights.pixel_difference, 0.2);
        assert_eq!(config.audio.metric, AudioMetric::Cosine);
        assert_eq!(config.audio.threshold, Some(0.3));
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = Config::from_str("[source]\nurl = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::NoSource));
    }

    #[test]
    fn inverted_hysteresis_is_rejected() {
        let err = Config::from_str(
            "[source]\nurl = \"x\"\n[silence]\nactivation_db = -40.0\ndeactivation_db = -45.0",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHysteresis));
    }

    #[test]
    fn inverted_scene_thresholds_are_rejected() {
        let err = Config::from_str(
            "[source]\nurl = \"x\"\n[scene]\ndefinite_threshold = 0.9\nchange_threshold = 0.8",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSceneThresholds));
    }

    #[test]
    fn inverted_gap_bounds_are_rejected() {
        let err = Config::from_str(
            "[source]\nurl = \"x\"\n[dead_air]\nmin_gap_secs = 10.0\nmax_gap_secs = 5.0",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGapBounds));
    }
}
