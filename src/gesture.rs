//! Gesture samples and the rate-limited classifier ingest.
//!
//! [`GestureIngestController`] is polled once per frame. It lets at most one
//! classification run at a time, keeps a floor between calls, and turns
//! completions into [`IngestOutcome`]s the scene applies on the next tick.
//!
//! ```ignore
//! let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
//! // every frame:
//! ingest.poll(now, &mut frames);
//! for outcome in ingest.drain(now) {
//!     scene.apply(&outcome);
//! }
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{encode_frame, FrameEncoding, FrameSource};
use crate::error::ClassifierError;
use crate::transition::TreeState;

/// Hand pose reported by the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gesture {
    /// Fingers spread, palm visible.
    Open,
    /// Fist.
    Closed,
    /// No hand clearly visible.
    #[default]
    None,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gesture::Open => "OPEN",
            Gesture::Closed => "CLOSED",
            Gesture::None => "NONE",
        })
    }
}

/// One classification result. `position` is in `[-1, 1]^2`, +x right, +y up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GestureSample {
    pub gesture: Gesture,
    pub position: Vec2,
}

impl GestureSample {
    /// The neutral sample every failure degrades to.
    pub const NONE: GestureSample = GestureSample {
        gesture: Gesture::None,
        position: Vec2::ZERO,
    };

    pub fn new(gesture: Gesture, position: Vec2) -> Self {
        Self { gesture, position }
    }
}

impl fmt::Display for GestureSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}, {:.2})", self.gesture, self.position.x, self.position.y)
    }
}

#[derive(Deserialize)]
struct WireResponse {
    gesture: Gesture,
    #[serde(rename = "handPosition")]
    hand_position: WirePosition,
}

#[derive(Deserialize)]
struct WirePosition {
    x: f64,
    y: f64,
}

/// Parse a classifier response body.
///
/// Both fields are required and `gesture` must be one of `OPEN`, `CLOSED`,
/// `NONE`. Finite coordinates are clamped into `[-1, 1]`.
pub fn parse_response(body: &str) -> Result<GestureSample, ClassifierError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ClassifierError::EmptyBody);
    }
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| ClassifierError::Schema(e.to_string()))?;
    let WirePosition { x, y } = wire.hand_position;
    if !x.is_finite() || !y.is_finite() {
        return Err(ClassifierError::Schema(format!(
            "non-finite hand position ({x}, {y})"
        )));
    }
    Ok(GestureSample {
        gesture: wire.gesture,
        position: Vec2::new(x.clamp(-1.0, 1.0) as f32, y.clamp(-1.0, 1.0) as f32),
    })
}

/// The remote vision model.
///
/// `classify` blocks; the controller runs it on a worker thread. A call that
/// outlives [`IngestParams::timeout`] is abandoned, but no new call starts
/// until its thread has returned, so implementations should bound their own
/// blocking.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, jpeg: &[u8]) -> Result<GestureSample, ClassifierError>;
}

impl<F> Classifier for F
where
    F: Fn(&[u8]) -> Result<GestureSample, ClassifierError> + Send + Sync + 'static,
{
    fn classify(&self, jpeg: &[u8]) -> Result<GestureSample, ClassifierError> {
        self(jpeg)
    }
}

/// What a completed classification asks of the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IngestOutcome {
    pub sample: GestureSample,
    /// State to request, if the gesture maps to one.
    pub tree_state: Option<TreeState>,
    /// New camera target, horizontally mirrored.
    pub camera_target: Option<Vec2>,
}

impl IngestOutcome {
    /// `OPEN` scatters, `CLOSED` forms; any visible hand steers the camera.
    pub fn from_sample(sample: GestureSample) -> Self {
        let tree_state = match sample.gesture {
            Gesture::Open => Some(TreeState::Chaos),
            Gesture::Closed => Some(TreeState::Formed),
            Gesture::None => None,
        };
        let camera_target = match sample.gesture {
            Gesture::None => None,
            _ => Some(Vec2::new(-sample.position.x, sample.position.y)),
        };
        Self {
            sample,
            tree_state,
            camera_target,
        }
    }
}

/// Ingest timing and encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IngestParams {
    /// Calls start only when strictly more than this has passed since the last one.
    pub min_interval: Duration,
    /// An unanswered call is abandoned after this long.
    pub timeout: Duration,
    /// Upper bound for the backed-off interval.
    pub max_backoff: Duration,
    /// Size and quality of the JPEG sent to the classifier.
    pub encoding: FrameEncoding,
}

impl Default for IngestParams {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(800),
            timeout: Duration::from_secs(10),
            max_backoff: Duration::from_secs(30),
            encoding: FrameEncoding::default(),
        }
    }
}

const ACTIVE_STATUS: &str = "Active - Analyzing Hands...";
const FAILING_STATUS: &str = "Classifier Unavailable - Retrying...";

struct Completion {
    id: u64,
    result: Result<GestureSample, ClassifierError>,
}

#[derive(Clone, Debug)]
struct InFlight {
    id: u64,
    started: Duration,
    /// Set by the worker once `classify` has returned.
    done: Arc<AtomicBool>,
}

/// Rate-limited, single-flight gesture classification.
///
/// All timestamps are durations since an arbitrary session origin and must
/// not go backwards.
pub struct GestureIngestController {
    classifier: Arc<dyn Classifier>,
    params: IngestParams,
    /// Start of the last call attempt; the session origin before the first.
    last_call: Duration,
    in_flight: Option<InFlight>,
    /// Worker of a timed-out call that has not returned yet.
    abandoned: Option<Arc<AtomicBool>>,
    next_id: u64,
    failures: u32,
    calls: u64,
    status: String,
    last_sample: Option<GestureSample>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl GestureIngestController {
    pub fn new(classifier: Arc<dyn Classifier>, params: IngestParams) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            classifier,
            params,
            last_call: Duration::ZERO,
            in_flight: None,
            abandoned: None,
            next_id: 0,
            failures: 0,
            calls: 0,
            status: "Initializing...".to_string(),
            last_sample: None,
            tx,
            rx,
        }
    }

    pub fn params(&self) -> &IngestParams {
        &self.params
    }

    /// Whether a classification is outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of classifier calls dispatched so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Whether a timed-out call's worker is still blocked in the classifier.
    pub fn stalled(&self) -> bool {
        self.abandoned
            .as_ref()
            .is_some_and(|done| !done.load(Ordering::Acquire))
    }

    /// Consecutive failed calls.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// User-facing capture status.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Most recent completed sample, failures included.
    pub fn last_sample(&self) -> Option<GestureSample> {
        self.last_sample
    }

    /// Minimum spacing currently enforced between calls.
    pub fn current_interval(&self) -> Duration {
        let base = self.params.min_interval;
        if self.failures == 0 {
            return base;
        }
        let factor = 1u32 << self.failures.min(16);
        base.saturating_mul(factor).min(self.params.max_backoff.max(base))
    }

    /// Whether a new call may start at `now`.
    ///
    /// The first call waits one interval from the session origin.
    pub fn ready(&self, now: Duration) -> bool {
        if self.in_flight.is_some() || self.stalled() {
            return false;
        }
        now.saturating_sub(self.last_call) > self.current_interval()
    }

    /// Offer the current frame. Returns `true` if a classification started.
    pub fn poll(&mut self, now: Duration, source: &mut dyn FrameSource) -> bool {
        self.expire(now);
        if !self.ready(now) {
            return false;
        }

        // A broken camera is retried at the normal cadence, not every frame.
        self.last_call = now;

        let frame = match source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("frame capture failed: {e}");
                self.status = format!("Camera Error: {e}");
                return false;
            }
        };
        let jpeg = match encode_frame(&frame, &self.params.encoding) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!("{e}");
                self.status = format!("Camera Error: {e}");
                return false;
            }
        };

        self.dispatch(now, jpeg)
    }

    fn dispatch(&mut self, now: Duration, jpeg: Vec<u8>) -> bool {
        let id = self.next_id;
        self.next_id += 1;

        let classifier = Arc::clone(&self.classifier);
        let tx = self.tx.clone();
        let done = Arc::new(AtomicBool::new(false));
        let worker_done = Arc::clone(&done);
        let spawned = std::thread::Builder::new()
            .name(format!("classify-{id}"))
            .spawn(move || {
                let result = classifier.classify(&jpeg);
                // Receiver gone means the controller was dropped.
                let _ = tx.send(Completion { id, result });
                worker_done.store(true, Ordering::Release);
            });

        match spawned {
            Ok(_) => {
                tracing::debug!(id, at = ?now, "classification dispatched");
                self.in_flight = Some(InFlight {
                    id,
                    started: now,
                    done,
                });
                self.calls += 1;
                true
            }
            Err(e) => {
                tracing::warn!("could not start classifier thread: {e}");
                self.failures = self.failures.saturating_add(1);
                false
            }
        }
    }

    /// Abandon the outstanding call once it has run longer than the timeout,
    /// and forget an abandoned worker once it has returned.
    fn expire(&mut self, now: Duration) {
        if self.abandoned.is_some() && !self.stalled() {
            tracing::debug!("abandoned classifier thread finished");
            self.abandoned = None;
        }

        let Some(flight) = &self.in_flight else {
            return;
        };
        if now.saturating_sub(flight.started) <= self.params.timeout {
            return;
        }
        let err = ClassifierError::Timeout {
            timeout_ms: self.params.timeout.as_millis() as u64,
        };
        tracing::warn!(id = flight.id, "{err}");
        if let Some(flight) = self.in_flight.take() {
            self.abandoned = Some(flight.done);
        }
        self.failures = self.failures.saturating_add(1);
        self.status = FAILING_STATUS.to_string();
        self.last_sample = Some(GestureSample::NONE);
    }

    /// Collect completions that arrived since the last call.
    ///
    /// Failed calls yield the neutral sample. Completions of abandoned calls
    /// are dropped.
    pub fn drain(&mut self, now: Duration) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::new();

        while let Ok(completion) = self.rx.try_recv() {
            if self.in_flight.as_ref().map(|flight| flight.id) != Some(completion.id) {
                tracing::debug!(id = completion.id, "discarding late classification");
                continue;
            }
            self.in_flight = None;

            let sample = match completion.result {
                Ok(sample) => {
                    self.failures = 0;
                    self.status = ACTIVE_STATUS.to_string();
                    sample
                }
                Err(e) => {
                    tracing::warn!(id = completion.id, "classification failed: {e}");
                    self.failures = self.failures.saturating_add(1);
                    self.status = FAILING_STATUS.to_string();
                    GestureSample::NONE
                }
            };
            tracing::debug!(id = completion.id, %sample, "classification complete");

            self.last_sample = Some(sample);
            outcomes.push(IngestOutcome::from_sample(sample));
        }

        self.expire(now);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    type Answer = Result<GestureSample, ClassifierError>;

    /// Earliest instant the gate opens in a fresh session.
    const FIRST: Duration = Duration::from_millis(801);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// A classifier that blocks until released, one release per call.
    fn gated(answer: GestureSample) -> (Arc<dyn Classifier>, Sender<()>) {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let classifier: Arc<dyn Classifier> = Arc::new(move |_: &[u8]| -> Answer {
            let _ = release_rx.lock().map(|rx| rx.recv());
            Ok(answer)
        });
        (classifier, release_tx)
    }

    fn frames() -> impl FnMut() -> Result<RgbImage, CaptureError> {
        || -> Result<RgbImage, CaptureError> { Ok(RgbImage::new(32, 24)) }
    }

    fn fixed(sample: GestureSample) -> Arc<dyn Classifier> {
        Arc::new(move |_: &[u8]| -> Answer { Ok(sample) })
    }

    fn wait_for(ingest: &mut GestureIngestController, now: Duration) -> Vec<IngestOutcome> {
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
    fn test_parse_valid_response() {
        let s = parse_response(r#"{"gesture":"OPEN","handPosition":{"x":0.5,"y":-0.3}}"#).unwrap();
        assert_eq!(s.gesture, Gesture::Open);
        assert!((s.position.x - 0.5).abs() < 1e-6);
        assert!((s.position.y + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_clamps_position() {
        let s = parse_response(r#"{"gesture":"CLOSED","handPosition":{"x":3.0,"y":-7}}"#).unwrap();
        assert_eq!(s.position, Vec2::new(1.0, -1.0));
    }

    #[test]
    fn test_parse_rejects_bad_bodies() {
        assert!(matches!(parse_response("  "), Err(ClassifierError::EmptyBody)));
        for body in [
            r#"{"gesture":"WAVE","handPosition":{"x":0,"y":0}}"#,
            r#"{"gesture":"OPEN"}"#,
            r#"{"gesture":"OPEN","handPosition":{"x":"left","y":0}}"#,
            "not json",
        ] {
            assert!(matches!(parse_response(body), Err(ClassifierError::Schema(_))), "{body}");
        }
    }

    #[test]
    fn test_outcome_mapping() {
        let open = IngestOutcome::from_sample(GestureSample::new(Gesture::Open, Vec2::new(0.5, -0.3)));
        assert_eq!(open.tree_state, Some(TreeState::Chaos));
        assert_eq!(open.camera_target, Some(Vec2::new(-0.5, -0.3)));

        let closed = IngestOutcome::from_sample(GestureSample::new(Gesture::Closed, Vec2::new(-0.2, 0.1)));
        assert_eq!(closed.tree_state, Some(TreeState::Formed));
        assert_eq!(closed.camera_target, Some(Vec2::new(0.2, 0.1)));

        let none = IngestOutcome::from_sample(GestureSample::new(Gesture::None, Vec2::new(0.9, 0.9)));
        assert_eq!(none.tree_state, None);
        assert_eq!(none.camera_target, None);
    }

    #[test]
    fn test_gate_is_strict() {
        let mut ingest = GestureIngestController::new(fixed(GestureSample::NONE), IngestParams::default());
        let mut source = frames();
        assert!(!ingest.poll(Duration::ZERO, &mut source));
        assert!(!ingest.poll(ms(800), &mut source));
        assert!(ingest.poll(FIRST, &mut source));
        wait_for(&mut ingest, FIRST);
        assert!(!ingest.poll(ms(1601), &mut source));
        assert!(ingest.poll(ms(1602), &mut source));
    }

    #[test]
    fn test_single_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let classifier: Arc<dyn Classifier> = Arc::new(move |_: &[u8]| -> Answer {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.lock().map(|rx| rx.recv());
            Ok(GestureSample::NONE)
        });

        let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
        let mut source = frames();
        assert!(ingest.poll(Duration::from_secs(1), &mut source));
        assert!(!ingest.poll(Duration::from_secs(2), &mut source));
        assert!(!ingest.poll(Duration::from_secs(4), &mut source));
        assert!(ingest.in_flight());

        release_tx.send(()).unwrap();
        let out = wait_for(&mut ingest, Duration::from_secs(4));
        assert_eq!(out.len(), 1);
        assert!(!ingest.in_flight());
        assert!(ingest.poll(Duration::from_secs(5), &mut source));
        release_tx.send(()).unwrap();
        wait_for(&mut ingest, Duration::from_secs(5));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_degrades_to_none() {
        let classifier: Arc<dyn Classifier> =
            Arc::new(|_: &[u8]| -> Answer { Err(ClassifierError::Status { status: 503 }) });
        let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
        ingest.poll(FIRST, &mut frames());
        let out = wait_for(&mut ingest, FIRST);
        assert_eq!(out[0].sample, GestureSample::NONE);
        assert_eq!(out[0].tree_state, None);
        assert_eq!(ingest.failures(), 1);
    }

    #[test]
    fn test_failure_replaces_active_status() {
        let healthy = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let answer = Arc::clone(&healthy);
        let classifier: Arc<dyn Classifier> = Arc::new(move |_: &[u8]| -> Answer {
            if answer.load(Ordering::SeqCst) {
                Ok(GestureSample::new(Gesture::Closed, Vec2::ZERO))
            } else {
                Err(ClassifierError::EmptyBody)
            }
        });
        let mut ingest = GestureIngestController::new(classifier, IngestParams::default());
        let mut source = frames();

        assert!(ingest.poll(FIRST, &mut source));
        wait_for(&mut ingest, FIRST);
        assert_eq!(ingest.status(), "Active - Analyzing Hands...");

        healthy.store(false, Ordering::SeqCst);
        assert!(ingest.poll(ms(2000), &mut source));
        wait_for(&mut ingest, ms(2000));
        assert_eq!(ingest.last_sample(), Some(GestureSample::NONE));
        assert_ne!(ingest.status(), "Active - Analyzing Hands...");
        assert!(ingest.status().starts_with("Classifier Unavailable"));

        // Recovers once answers come back.
        healthy.store(true, Ordering::SeqCst);
        assert!(ingest.poll(ms(4000), &mut source));
        wait_for(&mut ingest, ms(4000));
        assert_eq!(ingest.status(), "Active - Analyzing Hands...");
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let params = IngestParams {
            max_backoff: Duration::from_secs(3),
            ..Default::default()
        };
        let mut ingest = GestureIngestController::new(fixed(GestureSample::NONE), params);
        ingest.failures = 1;
        assert_eq!(ingest.current_interval(), Duration::from_millis(1600));
        ingest.failures = 2;
        assert_eq!(ingest.current_interval(), Duration::from_millis(3000));
        ingest.failures = 40;
        assert_eq!(ingest.current_interval(), Duration::from_millis(3000));

        assert!(ingest.poll(Duration::from_secs(4), &mut frames()));
        wait_for(&mut ingest, Duration::from_secs(4));
        assert_eq!(ingest.failures(), 0);
        assert_eq!(ingest.current_interval(), Duration::from_millis(800));
    }

    #[test]
    fn test_timeout_reopens_gate_and_drops_late_result() {
        let (classifier, release_tx) = gated(GestureSample::new(Gesture::Open, Vec2::ZERO));
        let params = IngestParams {
            timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let mut ingest = GestureIngestController::new(classifier, params);
        let mut source = frames();

        assert!(ingest.poll(ms(1000), &mut source));
        assert!(ingest.drain(ms(2500)).is_empty());
        assert!(!ingest.in_flight());
        assert_eq!(ingest.failures(), 1);
        assert_eq!(ingest.last_sample(), Some(GestureSample::NONE));

        // Let the abandoned call finish; its answer must not surface.
        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ingest.stalled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(ingest.drain(ms(2550)).is_empty());

        // Backed-off interval is 1600 ms.
        assert!(!ingest.poll(ms(2600), &mut source));
        assert!(ingest.poll(ms(2601), &mut source));
        release_tx.send(()).unwrap();
        let out = wait_for(&mut ingest, ms(2601));
        assert_eq!(out[0].tree_state, Some(TreeState::Chaos));
    }

    #[test]
    fn test_hung_classifier_holds_at_most_one_thread() {
        let (classifier, release_tx) = gated(GestureSample::NONE);
        let params = IngestParams {
            timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let mut ingest = GestureIngestController::new(classifier, params);
        let mut source = frames();

        assert!(ingest.poll(ms(1000), &mut source));
        // Poll every 50 ms for ten minutes of session time.
        for step in 21..12_000u64 {
            let now = ms(step * 50);
            ingest.drain(now);
            ingest.poll(now, &mut source);
        }
        assert_eq!(ingest.calls(), 1);
        assert!(ingest.stalled());
        assert!(!ingest.in_flight());

        release_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ingest.stalled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!ingest.stalled());
        assert!(ingest.poll(ms(600_100), &mut source));
        assert_eq!(ingest.calls(), 2);
        release_tx.send(()).unwrap();
        wait_for(&mut ingest, ms(600_100));
    }

    #[test]
    fn test_capture_failure_sets_status() {
        let mut ingest = GestureIngestController::new(fixed(GestureSample::NONE), IngestParams::default());
        let mut broken = || -> Result<RgbImage, CaptureError> {
            Err(CaptureError::Unavailable("no device".into()))
        };
        assert!(!ingest.poll(FIRST, &mut broken));
        assert!(ingest.status().starts_with("Camera Error"));
        assert_eq!(ingest.calls(), 0);
        // Retried at the normal cadence.
        assert!(!ingest.ready(ms(1300)));
        assert!(ingest.ready(ms(1602)));
    }

    #[test]
    fn test_sample_display() {
        let s = GestureSample::new(Gesture::Closed, Vec2::new(0.123, -0.5));
        assert_eq!(s.to_string(), "CLOSED (0.12, -0.50)");
    }
}
