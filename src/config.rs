//! Scene configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "foliage": { "count": 5000 }, "camera": { "smoothing": { "mode": "exponential", "rate": 3.0 } } }
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::camera::RigParams;
use crate::capture::FrameEncoding;
use crate::error::ConfigError;
use crate::gesture::IngestParams;
use crate::ornaments::BodyMotion;
use crate::palette;
use crate::panels::PanelMotion;
use crate::spawn::{ChaosShape, Cone, ShapeParams, TargetShape, ValueRange};
use crate::transition::TreeState;

/// Classifier endpoint.
pub const ENV_CLASSIFIER_URL: &str = "EVERGREEN_CLASSIFIER_URL";
/// Classifier timeout in milliseconds.
pub const ENV_CLASSIFIER_TIMEOUT_MS: &str = "EVERGREEN_CLASSIFIER_TIMEOUT_MS";
/// Path of a JSON config file.
pub const ENV_CONFIG: &str = "EVERGREEN_CONFIG";
/// Optional bearer token for the classifier. Never stored in config files.
pub const ENV_CLASSIFIER_KEY: &str = "EVERGREEN_CLASSIFIER_KEY";
/// Image file or directory standing in for the camera.
pub const ENV_FRAMES: &str = "EVERGREEN_FRAMES";

/// Tree geometry shared by every layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeShape {
    /// Cone every layer's formed positions are placed in or on.
    pub cone: Cone,
    /// Translation of the whole tree group in world space.
    pub group_offset: Vec3,
}

impl Default for TreeShape {
    fn default() -> Self {
        Self {
            cone: Cone::default(),
            group_offset: Vec3::new(0.0, -5.0, 0.0),
        }
    }
}

/// Point-cloud foliage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoliageConfig {
    /// Number of points. Must be positive.
    pub count: usize,
    /// Radius of the chaos sphere.
    pub chaos_radius: f32,
    /// Per-point size multiplier.
    pub size: ValueRange,
    /// Pixel size of a unit-size point at depth 1.
    pub point_scale: f32,
    /// Chaos-state sway amplitude.
    pub wind: f32,
}

impl Default for FoliageConfig {
    fn default() -> Self {
        Self {
            count: 15_000,
            chaos_radius: 20.0,
            size: ValueRange::new(0.5, 1.0),
            point_scale: 300.0,
            wind: 0.1,
        }
    }
}

/// Instanced ornaments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrnamentConfig {
    /// Number of instances. Must be positive.
    pub count: usize,
    /// Radius of the chaos sphere.
    pub chaos_radius: f32,
    /// Uniform scale of each sphere.
    pub scale: ValueRange,
    /// Per-instance speed multiplier.
    pub speed: ValueRange,
    /// `0xRRGGBB` sRGB colours.
    pub palette: Vec<u32>,
    /// Lerp rate, scaled by each instance's speed.
    pub follow_rate: f32,
    /// Y spin in radians per second at speed 1.
    pub spin_rate: f32,
}

impl Default for OrnamentConfig {
    fn default() -> Self {
        Self {
            count: 300,
            chaos_radius: 25.0,
            scale: ValueRange::new(0.1, 0.4),
            speed: ValueRange::new(1.0, 2.5),
            palette: palette::ORNAMENT_PALETTE.to_vec(),
            follow_rate: 2.0,
            spin_rate: 0.5,
        }
    }
}

/// Floating photo panels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Number of panels. Must be positive.
    pub count: usize,
    /// Full extents of the chaos box.
    pub chaos_extents: Vec3,
    /// Outward push from the cone surface.
    pub outset: f32,
    /// Largest random roll about the facing axis, radians.
    pub tilt_jitter: f32,
    /// Uniform scale of the panel quads.
    pub scale: f32,
    /// Lerp rate shared by every panel.
    pub follow_rate: f32,
    /// Height of the vertical float.
    pub float_amplitude: f32,
    /// Photo tints, `0xRRGGBB` sRGB.
    pub palette: Vec<u32>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            count: 20,
            chaos_extents: Vec3::new(30.0, 30.0, 10.0),
            outset: 0.5,
            tilt_jitter: 0.25,
            scale: 1.5,
            follow_rate: 1.5,
            float_amplitude: 0.12,
            palette: palette::PANEL_PALETTE.to_vec(),
        }
    }
}

/// Progress ramp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Progress units per second.
    pub ramp_rate: f32,
    /// Distance from a bound at which progress snaps onto it.
    pub epsilon: f32,
    /// State requested at start-up.
    pub initial_state: TreeState,
    /// Progress every layer starts from.
    pub initial_progress: f32,
    /// Longest frame delta fed to the animators, seconds.
    pub max_delta: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            ramp_rate: 2.0,
            epsilon: 1e-3,
            initial_state: TreeState::Formed,
            initial_progress: 0.0,
            max_delta: 0.1,
        }
    }
}

/// Camera rig.
pub type CameraConfig = RigParams;

/// Gesture ingest and the remote classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Floor between classifier calls.
    pub min_interval_ms: u64,
    /// An unanswered call is abandoned after this long.
    pub timeout_ms: u64,
    /// Ceiling for the backed-off interval.
    pub max_backoff_ms: u64,
    /// Frames are resized to this before encoding.
    pub frame_width: u32,
    pub frame_height: u32,
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
    /// Classifier endpoint; gesture input is off when unset.
    pub classifier_url: Option<String>,
    /// Image file or directory of frames standing in for a camera.
    pub frame_source: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 800,
            timeout_ms: 10_000,
            max_backoff_ms: 30_000,
            frame_width: 320,
            frame_height: 240,
            jpeg_quality: 60,
            classifier_url: None,
            frame_source: None,
        }
    }
}

impl IngestConfig {
    pub fn params(&self) -> IngestParams {
        IngestParams {
            min_interval: Duration::from_millis(self.min_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            encoding: FrameEncoding {
                width: self.frame_width,
                height: self.frame_height,
                quality: self.jpeg_quality,
            },
        }
    }
}

/// Complete scene configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub tree: TreeShape,
    pub foliage: FoliageConfig,
    pub ornaments: OrnamentConfig,
    pub panels: PanelConfig,
    pub transition: TransitionConfig,
    pub camera: CameraConfig,
    pub ingest: IngestConfig,
    /// Seed for layer generation; random when unset.
    pub seed: Option<u64>,
    /// Initial window size in physical pixels.
    pub window_size: [u32; 2],
    /// Linear clear colour.
    pub background: Vec3,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            tree: TreeShape::default(),
            foliage: FoliageConfig::default(),
            ornaments: OrnamentConfig::default(),
            panels: PanelConfig::default(),
            transition: TransitionConfig::default(),
            camera: CameraConfig::default(),
            ingest: IngestConfig::default(),
            seed: None,
            window_size: [1280, 720],
            background: Vec3::new(0.0, 0.01, 0.005),
        }
    }
}

impl SceneConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: SceneConfig = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Apply `EVERGREEN_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_CLASSIFIER_URL) {
            let url = url.trim();
            self.ingest.classifier_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(frames) = lookup(ENV_FRAMES) {
            let frames = frames.trim();
            self.ingest.frame_source = (!frames.is_empty()).then(|| frames.to_string());
        }
        if let Some(ms) = lookup(ENV_CLASSIFIER_TIMEOUT_MS) {
            self.ingest.timeout_ms = ms.trim().parse().map_err(|_| ConfigError::InvalidParameter {
                what: "classifier timeout",
                reason: format!("{ENV_CLASSIFIER_TIMEOUT_MS}={ms:?} is not a whole number of milliseconds"),
            })?;
        }
        Ok(())
    }

    /// Shape parameters for the foliage layer.
    pub fn foliage_shape(&self) -> ShapeParams {
        ShapeParams {
            chaos: ChaosShape::Sphere {
                radius: self.foliage.chaos_radius,
            },
            target: TargetShape::ConeVolume { cone: self.tree.cone },
            size: Some(self.foliage.size),
            speed: None,
            palette: None,
        }
    }

    /// Shape parameters for the ornament layer.
    pub fn ornament_shape(&self) -> ShapeParams {
        ShapeParams {
            chaos: ChaosShape::Sphere {
                radius: self.ornaments.chaos_radius,
            },
            target: TargetShape::ConeSurface {
                cone: self.tree.cone,
                outset: 0.0,
            },
            size: Some(self.ornaments.scale),
            speed: Some(self.ornaments.speed),
            palette: Some(palette::resolve(&self.ornaments.palette)),
        }
    }

    /// Shape parameters for the panel layer.
    pub fn panel_shape(&self) -> ShapeParams {
        ShapeParams {
            chaos: ChaosShape::Box {
                extents: self.panels.chaos_extents,
            },
            target: TargetShape::ConeSurface {
                cone: self.tree.cone,
                outset: self.panels.outset,
            },
            size: None,
            speed: None,
            palette: Some(palette::resolve(&self.panels.palette)),
        }
    }

    pub fn body_motion(&self) -> BodyMotion {
        BodyMotion {
            follow_rate: self.ornaments.follow_rate,
            spin_rate: self.ornaments.spin_rate,
            ..BodyMotion::default()
        }
    }

    pub fn panel_motion(&self) -> PanelMotion {
        PanelMotion {
            follow_rate: self.panels.follow_rate,
            float_amplitude: self.panels.float_amplitude,
            scale: self.panels.scale,
            tilt_jitter: self.panels.tilt_jitter,
        }
    }

    /// Reject configurations that cannot build a scene.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, count) in [
            ("foliage", self.foliage.count),
            ("ornament", self.ornaments.count),
            ("panel", self.panels.count),
        ] {
            if count == 0 {
                return Err(ConfigError::EmptyCount { what });
            }
        }
        self.foliage_shape().validate()?;
        self.ornament_shape().validate()?;
        self.panel_shape().validate()?;

        positive("ramp rate", self.transition.ramp_rate)?;
        positive("epsilon", self.transition.epsilon)?;
        positive("max delta", self.transition.max_delta)?;
        if !(0.0..=1.0).contains(&self.transition.initial_progress) {
            return Err(ConfigError::InvalidParameter {
                what: "initial progress",
                reason: format!("must be in [0, 1], got {}", self.transition.initial_progress),
            });
        }
        positive("point scale", self.foliage.point_scale)?;
        positive("panel scale", self.panels.scale)?;
        non_negative("ornament follow rate", self.ornaments.follow_rate)?;
        non_negative("panel follow rate", self.panels.follow_rate)?;
        positive("camera fov", self.camera.fov_y)?;
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(ConfigError::InvalidParameter {
                what: "camera clip planes",
                reason: format!("need 0 < near < far, got {} / {}", self.camera.near, self.camera.far),
            });
        }

        if self.ingest.min_interval_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "ingest interval",
                reason: "must be positive".into(),
            });
        }
        if self.ingest.timeout_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "classifier timeout",
                reason: "must be positive".into(),
            });
        }
        if self.ingest.frame_width == 0 || self.ingest.frame_height == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "frame size",
                reason: format!("{}x{}", self.ingest.frame_width, self.ingest.frame_height),
            });
        }
        if !(1..=100).contains(&self.ingest.jpeg_quality) {
            return Err(ConfigError::InvalidParameter {
                what: "jpeg quality",
                reason: format!("must be in 1..=100, got {}", self.ingest.jpeg_quality),
            });
        }
        Ok(())
    }
}

fn positive(what: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            what,
            reason: format!("must be positive, got {value}"),
        })
    }
}

fn non_negative(what: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            what,
            reason: format!("must be non-negative, got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSmoothing;

    #[test]
    fn test_defaults_validate() {
        SceneConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SceneConfig = serde_json::from_str(
            r#"{"foliage":{"count":5000},"camera":{"smoothing":{"mode":"exponential","rate":3.0}}}"#,
        )
        .unwrap();
        assert_eq!(config.foliage.count, 5000);
        assert_eq!(config.foliage.chaos_radius, 20.0);
        assert_eq!(config.ornaments.count, 300);
        assert_eq!(config.camera.smoothing, CameraSmoothing::Exponential { rate: 3.0 });
        assert_eq!(config.camera.scale_x, 10.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let mut config = SceneConfig::default();
        config.seed = Some(42);
        config.panels.count = 7;
        config.transition.initial_state = TreeState::Chaos;
        config.save(&path).unwrap();

        let loaded = SceneConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"ornaments":{"count":0}}"#).unwrap();
        assert!(matches!(
            SceneConfig::load(&path),
            Err(ConfigError::EmptyCount { what: "ornament" })
        ));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SceneConfig::load(&path), Err(ConfigError::Parse(_))));

        assert!(matches!(
            SceneConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_validate_catches_bad_values() {
        let mut config = SceneConfig::default();
        config.ornaments.speed = ValueRange::new(2.0, 1.0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRange { what: "speed", .. })));

        let mut config = SceneConfig::default();
        config.transition.ramp_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = SceneConfig::default();
        config.ornaments.palette.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCount { what: "palette" })));

        let mut config = SceneConfig::default();
        config.ingest.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = SceneConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_CLASSIFIER_URL => Some("http://localhost:9000/classify".into()),
                ENV_CLASSIFIER_TIMEOUT_MS => Some(" 2500 ".into()),
                ENV_FRAMES => Some("frames/".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.ingest.classifier_url.as_deref(), Some("http://localhost:9000/classify"));
        assert_eq!(config.ingest.timeout_ms, 2500);
        assert_eq!(config.ingest.frame_source.as_deref(), Some("frames/"));
        assert_eq!(config.ingest.params().timeout, Duration::from_millis(2500));

        let err = config.apply_overrides(|key| (key == ENV_CLASSIFIER_TIMEOUT_MS).then(|| "soon".into()));
        assert!(err.is_err());
    }

    #[test]
    fn test_ingest_params_defaults() {
        let params = SceneConfig::default().ingest.params();
        assert_eq!(params, IngestParams::default());
    }
}
