//! End-to-end behaviour through the public API: layers, scheduler, ingest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use evergreen::{
    BodyMotion, CaptureError, Classifier, ClassifierError, Gesture, GestureIngestController, GestureSample,
    IngestOutcome, IngestParams, InstancedBodyAnimator, ParticleLayer, Scene, SceneConfig, TreeState, Vec2, Vec3,
};
use image::RgbImage;

type Answer = Result<GestureSample, ClassifierError>;

fn small_config() -> SceneConfig {
    let mut config = SceneConfig::default();
    config.seed = Some(7);
    config.foliage.count = 500;
    config.ornaments.count = 40;
    config.panels.count = 5;
    config
}

/// The ingest gate first opens one interval into the session.
const FIRST_CALL: Duration = Duration::from_millis(801);

fn blank_frame() -> Result<RgbImage, CaptureError> {
    Ok(RgbImage::new(64, 48))
}

fn drain_until(ingest: &mut GestureIngestController, now: Duration) -> Vec<IngestOutcome> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let out = ingest.drain(now);
        if !out.is_empty() || Instant::now() > deadline {
            return out;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn formed_request_settles_after_half_a_second() {
    let mut config = small_config();
    config.transition.initial_state = TreeState::Chaos;
    config.transition.initial_progress = 0.0;
    config.transition.ramp_rate = 2.0;
    let mut scene = Scene::new(config).unwrap();

    assert!(scene.request_state(TreeState::Formed));
    for _ in 0..5 {
        scene.tick(0.1, 0.0);
    }
    assert!((scene.progress() - 1.0).abs() < 1e-6);
    assert!(scene.scheduler().is_settled());
}

#[test]
fn chaos_request_returns_to_zero() {
    let mut config = small_config();
    config.transition.initial_state = TreeState::Formed;
    config.transition.initial_progress = 1.0;
    let mut scene = Scene::new(config).unwrap();

    scene.request_state(TreeState::Chaos);
    for _ in 0..20 {
        scene.tick(0.05, 0.0);
    }
    assert_eq!(scene.progress(), 0.0);
}

#[test]
fn faster_ornament_arrives_first() {
    let chaos = Vec3::new(10.0, 0.0, 0.0);
    let target = Vec3::new(0.0, 2.0, 0.0);
    let layer = ParticleLayer::new(vec![chaos, chaos], vec![target, target])
        .unwrap()
        .with_speeds(vec![1.0, 2.0])
        .unwrap();
    let mut ornaments = InstancedBodyAnimator::new(layer, BodyMotion::default());

    for _ in 0..10 {
        ornaments.tick(TreeState::Formed, 1.0 / 60.0);
    }
    let slow = (ornaments.positions()[0] - target).length();
    let fast = (ornaments.positions()[1] - target).length();
    assert!(fast < slow, "fast {fast} should be closer than slow {slow}");
}

#[test]
fn open_hand_scatters_and_steers_camera() {
    let classifier: Arc<dyn Classifier> =
        Arc::new(|_: &[u8]| -> Answer { Ok(GestureSample::new(Gesture::Open, Vec2::new(0.5, -0.3))) });
    let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
    let mut source = blank_frame;

    let mut config = small_config();
    config.transition.initial_state = TreeState::Formed;
    let mut scene = Scene::new(config).unwrap();

    assert!(ingest.poll(FIRST_CALL, &mut source));
    let outcomes = drain_until(&mut ingest, FIRST_CALL);
    assert_eq!(outcomes.len(), 1);
    for outcome in &outcomes {
        scene.apply(outcome);
    }

    assert_eq!(scene.state(), TreeState::Chaos);
    assert!((scene.camera_target() - Vec2::new(-0.5, -0.3)).length() < 1e-6);
}

#[test]
fn failed_classification_leaves_state_alone() {
    let classifier: Arc<dyn Classifier> = Arc::new(|_: &[u8]| -> Answer { Err(ClassifierError::EmptyBody) });
    let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
    let mut source = blank_frame;

    let mut config = small_config();
    config.transition.initial_state = TreeState::Formed;
    let mut scene = Scene::new(config).unwrap();
    scene.set_camera_target(Vec2::new(0.25, 0.25));

    assert!(ingest.poll(FIRST_CALL, &mut source));
    for outcome in drain_until(&mut ingest, FIRST_CALL) {
        assert_eq!(outcome.sample, GestureSample::NONE);
        scene.apply(&outcome);
    }

    assert_eq!(scene.state(), TreeState::Formed);
    assert_eq!(scene.camera_target(), Vec2::new(0.25, 0.25));
    assert_eq!(ingest.last_sample(), Some(GestureSample::NONE));
}

#[test]
fn ingest_never_overlaps_and_respects_interval() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));

    let classifier: Arc<dyn Classifier> = {
        let (active, peak, total) = (active.clone(), peak.clone(), total.clone());
        Arc::new(move |_: &[u8]| -> Answer {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            total.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(GestureSample::new(Gesture::Closed, Vec2::ZERO))
        })
    };

    let params = IngestParams {
        timeout: Duration::from_secs(60),
        ..IngestParams::default()
    };
    let mut ingest = GestureIngestController::new(classifier, params);
    let mut source = blank_frame;

    // 100 ms frames over four seconds of session time.
    for frame in 0..=40u64 {
        let now = Duration::from_millis(frame * 100);
        if ingest.in_flight() {
            drain_until(&mut ingest, now);
        }
        ingest.poll(now, &mut source);
    }
    if ingest.in_flight() {
        drain_until(&mut ingest, Duration::from_millis(4000));
    }

    let calls = total.load(Ordering::SeqCst);
    assert!((1..=5).contains(&calls), "{calls} calls");
    assert_eq!(ingest.calls() as usize, calls);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn regenerate_restarts_assembly() {
    let mut config = small_config();
    config.transition.initial_state = TreeState::Formed;
    config.transition.initial_progress = 0.0;
    let mut scene = Scene::new(config).unwrap();

    for _ in 0..100 {
        scene.tick(0.05, 0.0);
    }
    assert_eq!(scene.progress(), 1.0);
    let before = scene.foliage().layer().target_positions().to_vec();

    scene.regenerate().unwrap();
    assert_eq!(scene.generation(), 1);
    assert_eq!(scene.progress(), 0.0);
    assert_eq!(scene.state(), TreeState::Formed);
    assert_ne!(scene.foliage().layer().target_positions(), &before[..]);
}
