use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_ENV_VAR: &str = "POSE_GESTURE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "pose-gesture.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub stream: StreamSettings,
    pub detection: DetectionSettings,
    pub models: ModelSettings,
}

/// Named capture resolutions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureProfile {
    #[default]
    Standard,
    Hd,
}

impl CaptureProfile {
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            CaptureProfile::Standard => (640, 480),
            CaptureProfile::Hd => (1280, 720),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub profile: CaptureProfile,
    pub fps_limit: u32,
    pub draw_landmarks: bool,
    pub quit_key: String,
}

impl CaptureSettings {
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps_limit.max(1)))
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            profile: CaptureProfile::Standard,
            fps_limit: 30,
            draw_landmarks: true,
            quit_key: "q".to_string(),
        }
    }
}

/// How the short "last two octets" form expands into a stream URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub network_prefix: String,
    pub port: u16,
    pub path: String,
    pub connect_timeout_secs: u64,
    /// Longest wait for response headers or the next body bytes.
    pub read_timeout_secs: u64,
}

impl StreamSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            network_prefix: "192.168".to_string(),
            port: 8080,
            path: "/video".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub min_pose_confidence: f32,
    pub min_hand_confidence: f32,
    pub max_hands: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_pose_confidence: 0.5,
            min_hand_confidence: 0.5,
            max_hands: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub dir: PathBuf,
    pub palm_detector: String,
    pub hand_landmarks: String,
    pub pose_landmarks: String,
}

impl ModelSettings {
    pub fn palm_detector_path(&self) -> PathBuf {
        self.dir.join(&self.palm_detector)
    }

    pub fn hand_landmarks_path(&self) -> PathBuf {
        self.dir.join(&self.hand_landmarks)
    }

    pub fn pose_landmarks_path(&self) -> PathBuf {
        self.dir.join(&self.pose_landmarks)
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            palm_detector: "palm_detection_mediapipe_2023feb.onnx".to_string(),
            hand_landmarks: "handpose_estimation_mediapipe_2023feb.onnx".to_string(),
            pose_landmarks: "pose_estimation_mediapipe_2023mar.onnx".to_string(),
        }
    }
}

impl Config {
    /// Loads the config from `$POSE_GESTURE_CONFIG`, falling back to
    /// `pose-gesture.toml` in the working directory. A missing file yields the
    /// defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let path = env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.capture.profile.resolution(), (640, 480));
        assert_eq!(config.capture.fps_limit, 30);
        assert_eq!(config.stream.port, 8080);
        assert_eq!(config.stream.read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_stream_timeouts_are_raised_to_one_second() {
        let config =
            Config::parse("[stream]\nconnect_timeout_secs = 0\nread_timeout_secs = 0").unwrap();
        assert_eq!(config.stream.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.stream.read_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [capture]
            profile = "hd"

            [stream]
            port = 4747
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.profile, CaptureProfile::Hd);
        assert_eq!(config.capture.profile.resolution(), (1280, 720));
        assert!(config.capture.draw_landmarks);
        assert_eq!(config.stream.port, 4747);
        assert_eq!(config.stream.network_prefix, "192.168");
        assert_eq!(config.detection.max_hands, 2);
    }

    #[test]
    fn unknown_profile_is_rejected() {
        assert!(Config::parse("[capture]\nprofile = \"4k\"").is_err());
    }

    #[test]
    fn frame_interval_follows_fps_limit() {
        let mut capture = CaptureSettings::default();
        assert_eq!(capture.min_frame_interval(), Duration::from_secs_f64(1.0 / 30.0));

        capture.fps_limit = 0;
        assert_eq!(capture.min_frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn model_paths_live_in_the_model_dir() {
        let models = ModelSettings {
            dir: PathBuf::from("/opt/models"),
            ..ModelSettings::default()
        };
        assert_eq!(
            models.pose_landmarks_path(),
            PathBuf::from("/opt/models/pose_estimation_mediapipe_2023mar.onnx")
        );
    }
}
