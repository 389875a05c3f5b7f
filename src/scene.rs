//! The tick driver.
//!
//! [`Scene`] owns the transition scheduler, the three animated layers and the
//! camera rig, and advances them in dependency order once per frame:
//! scheduler, foliage, ornaments, panels, camera. Gesture outcomes are
//! applied between frames, so a result only affects ticks that follow it.

use glam::{Mat4, Vec2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera::CameraRig;
use crate::config::SceneConfig;
use crate::error::ConfigError;
use crate::foliage::{FoliageUniforms, ParticleFieldAnimator};
use crate::gesture::{GestureSample, IngestOutcome};
use crate::ornaments::InstancedBodyAnimator;
use crate::panels::PanelGroupAnimator;
use crate::spawn::SpatialFieldGenerator;
use crate::transition::{TransitionScheduler, TreeState};

/// Layers, scheduler and camera for one session.
pub struct Scene {
    config: SceneConfig,
    rng: StdRng,
    scheduler: TransitionScheduler,
    foliage: ParticleFieldAnimator,
    ornaments: InstancedBodyAnimator,
    panels: PanelGroupAnimator,
    camera: CameraRig,
    camera_target: Vec2,
    generation: u64,
}

impl Scene {
    /// Build a scene, seeding from `config.seed` or from entropy.
    pub fn new(config: SceneConfig) -> Result<Self, ConfigError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Build a scene drawing every layer from `rng`.
    pub fn with_rng(config: SceneConfig, mut rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        let (scheduler, foliage, ornaments, panels) = build(&config, &mut rng)?;
        let camera = CameraRig::new(config.camera);

        Ok(Self {
            config,
            rng,
            scheduler,
            foliage,
            ornaments,
            panels,
            camera,
            camera_target: Vec2::ZERO,
            generation: 0,
        })
    }

    /// Draw fresh layers and restart the assembly from the initial state.
    pub fn regenerate(&mut self) -> Result<(), ConfigError> {
        let (scheduler, foliage, ornaments, panels) = build(&self.config, &mut self.rng)?;
        self.scheduler = scheduler;
        self.foliage = foliage;
        self.ornaments = ornaments;
        self.panels = panels;
        self.generation += 1;
        Ok(())
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Bumped by every [`regenerate`](Self::regenerate); static vertex data
    /// must be re-uploaded when it changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn state(&self) -> TreeState {
        self.scheduler.state()
    }

    /// Raw foliage progress.
    pub fn progress(&self) -> f32 {
        self.scheduler.progress(self.foliage.layer_id())
    }

    pub fn scheduler(&self) -> &TransitionScheduler {
        &self.scheduler
    }

    pub fn request_state(&mut self, state: TreeState) -> bool {
        self.scheduler.request(state)
    }

    /// Flip between chaos and formed; returns the new state.
    pub fn toggle_state(&mut self) -> TreeState {
        let next = self.state().toggled();
        self.scheduler.request(next);
        next
    }

    /// Latest camera target, last writer wins.
    pub fn camera_target(&self) -> Vec2 {
        self.camera_target
    }

    pub fn set_camera_target(&mut self, target: Vec2) {
        self.camera_target = target.clamp(Vec2::splat(-1.0), Vec2::ONE);
    }

    /// Apply one classification outcome.
    pub fn apply(&mut self, outcome: &IngestOutcome) {
        if let Some(state) = outcome.tree_state {
            if self.scheduler.request(state) {
                tracing::info!(gesture = %outcome.sample.gesture, "tree {}", state.label());
            }
        }
        if let Some(target) = outcome.camera_target {
            self.set_camera_target(target);
        }
    }

    /// Advance everything by one frame.
    pub fn tick(&mut self, delta_time: f32, elapsed: f32) {
        let dt = delta_time.max(0.0);
        self.scheduler.tick(dt);
        self.foliage.tick(&self.scheduler, elapsed);

        let state = self.scheduler.state();
        self.ornaments.tick(state, dt);
        self.panels.tick(state, dt, elapsed);

        self.camera.tick(self.camera_target, dt);
    }

    pub fn foliage(&self) -> &ParticleFieldAnimator {
        &self.foliage
    }

    pub fn foliage_uniforms(&self) -> &FoliageUniforms {
        self.foliage.uniforms()
    }

    pub fn ornaments(&self) -> &InstancedBodyAnimator {
        &self.ornaments
    }

    pub fn ornaments_mut(&mut self) -> &mut InstancedBodyAnimator {
        &mut self.ornaments
    }

    pub fn panels(&self) -> &PanelGroupAnimator {
        &self.panels
    }

    pub fn panels_mut(&mut self) -> &mut PanelGroupAnimator {
        &mut self.panels
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    /// Model matrix of the tree group.
    pub fn group_transform(&self) -> Mat4 {
        Mat4::from_translation(self.config.tree.group_offset)
    }
}

fn build(
    config: &SceneConfig,
    rng: &mut StdRng,
) -> Result<(TransitionScheduler, ParticleFieldAnimator, InstancedBodyAnimator, PanelGroupAnimator), ConfigError> {
    let mut generator = SpatialFieldGenerator::new(&mut *rng);
    let foliage_layer = generator.generate(config.foliage.count, &config.foliage_shape())?;
    let ornament_layer = generator.generate(config.ornaments.count, &config.ornament_shape())?;
    let panel_layer = generator.generate(config.panels.count, &config.panel_shape())?;

    let transition = &config.transition;
    let mut scheduler = TransitionScheduler::new(transition.initial_state, transition.epsilon);
    let foliage_id = scheduler.add_layer(transition.initial_progress, transition.ramp_rate);

    let uniforms = FoliageUniforms::new(&config.tree.cone, config.foliage.point_scale, config.foliage.wind);
    let foliage = ParticleFieldAnimator::new(foliage_layer, foliage_id, uniforms);
    let ornaments = InstancedBodyAnimator::new(ornament_layer, config.body_motion());
    let panels = PanelGroupAnimator::new(panel_layer, config.panel_motion(), rng);

    tracing::info!(
        foliage = foliage.count(),
        ornaments = ornaments.count(),
        panels = panels.count(),
        "layers generated"
    );
    Ok((scheduler, foliage, ornaments, panels))
}

/// Status line: capture status, last gesture, tree state.
pub fn status_line(capture: &str, last: Option<GestureSample>, state: TreeState) -> String {
    let gesture = match last {
        Some(sample) => sample.to_string(),
        None => "-".to_string(),
    };
    format!("{capture} | Gesture: {gesture} | {}", state.label())
}
