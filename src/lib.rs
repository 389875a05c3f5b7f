//! # Evergreen - gesture-driven particle Christmas tree
//!
//! Thousands of glowing points, a few hundred ornaments and a handful of
//! floating photo panels morph between a scattered **chaos** cloud and a
//! **formed** cone. An open hand scatters the tree, a closed fist gathers
//! it, and the hand position steers the camera.
//!
//! ## Quick Start
//!
//! ```ignore
//! use evergreen::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     Evergreen::new(SceneConfig::default()).run()
//! }
//! ```
//!
//! With no classifier the tree is driven from the keyboard: `Space` toggles
//! the state, `R` regenerates every layer and `Escape` quits.
//!
//! ## Core Concepts
//!
//! ### Layers
//!
//! Every visual element is a [`ParticleLayer`]: index-aligned chaos and
//! target positions plus optional sizes, colors and speeds, built by the
//! [`SpatialFieldGenerator`] from a [`ShapeParams`].
//!
//! ### Transitions
//!
//! The [`TransitionScheduler`] holds the shared [`TreeState`] and ramps each
//! registered layer's progress toward it at that layer's own rate:
//!
//! | Layer | Animator | Motion |
//! |-------|----------|--------|
//! | Foliage | [`ParticleFieldAnimator`] | eased progress, interpolated on the GPU |
//! | Ornaments | [`InstancedBodyAnimator`] | per-instance lerp at its own speed |
//! | Panels | [`PanelGroupAnimator`] | shared lerp plus a vertical float |
//!
//! ### Gestures
//!
//! The [`GestureIngestController`] samples frames from a [`FrameSource`] at a
//! bounded rate, hands them to a [`Classifier`] on a worker thread, and turns
//! each answer into an [`IngestOutcome`] the [`Scene`] applies.
//!
//! Enable the `http-classifier` feature (on by default) for
//! `classifier::HttpClassifier`, which posts frames to a remote service.

pub mod app;
pub mod camera;
pub mod capture;
#[cfg(feature = "http-classifier")]
pub mod classifier;
pub mod config;
pub mod error;
pub mod foliage;
pub mod gesture;
mod gpu;
pub mod layer;
pub mod ornaments;
pub mod palette;
pub mod panels;
pub mod scene;
pub mod spawn;
pub mod time;
pub mod transition;

pub use app::Evergreen;
pub use camera::{CameraRig, CameraSmoothing, RigParams};
pub use capture::{encode_frame, DirectoryFrames, FrameEncoding, FrameSource, StillFrame};
pub use config::SceneConfig;
pub use error::{CaptureError, ClassifierError, ConfigError, EncodeError, GpuError, SimulationError};
pub use foliage::{FoliageUniforms, ParticleFieldAnimator};
pub use gesture::{
    parse_response, Classifier, Gesture, GestureIngestController, GestureSample, IngestOutcome, IngestParams,
};
pub use glam::{Vec2, Vec3};
pub use layer::ParticleLayer;
pub use ornaments::{BodyMotion, InstancedBodyAnimator};
pub use panels::{PanelGroupAnimator, PanelMotion};
pub use scene::Scene;
pub use spawn::{ChaosShape, Cone, ShapeParams, SpatialFieldGenerator, TargetShape, ValueRange};
pub use time::FrameClock;
pub use transition::{LayerId, TransitionScheduler, TreeState};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use evergreen::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::Evergreen;
    pub use crate::capture::{DirectoryFrames, FrameSource, StillFrame};
    pub use crate::config::SceneConfig;
    pub use crate::error::SimulationError;
    pub use crate::gesture::{Classifier, Gesture, GestureSample};
    pub use crate::scene::Scene;
    pub use crate::transition::TreeState;
    pub use crate::{Vec2, Vec3};
    #[cfg(feature = "http-classifier")]
    pub use crate::classifier::HttpClassifier;
}
