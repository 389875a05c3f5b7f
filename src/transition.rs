//! Chaos/formed state machine and progress ramps.
//!
//! The scheduler owns the discrete [`TreeState`] and one continuous progress
//! value per registered layer. Progress moves toward `1.0` (formed) or `0.0`
//! (chaos) at a bounded rate, so flipping the state mid-flight simply turns
//! the ramp around. Easing is applied by consumers, never stored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested arrangement of the tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TreeState {
    /// Scattered, sphere-distributed.
    Chaos,
    /// Cone-shaped tree.
    #[default]
    Formed,
}

impl TreeState {
    /// Progress value this state ramps toward.
    #[inline]
    pub fn target_value(self) -> f32 {
        match self {
            TreeState::Chaos => 0.0,
            TreeState::Formed => 1.0,
        }
    }

    #[inline]
    pub fn is_formed(self) -> bool {
        self == TreeState::Formed
    }

    /// The other state.
    pub fn toggled(self) -> Self {
        match self {
            TreeState::Chaos => TreeState::Formed,
            TreeState::Formed => TreeState::Chaos,
        }
    }

    /// Status label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            TreeState::Chaos => "UNLEASHED",
            TreeState::Formed => "FORMED",
        }
    }
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TreeState::Chaos => "CHAOS",
            TreeState::Formed => "FORMED",
        })
    }
}

/// Cubic ease-in-out.
///
/// `4t^3` below one half, `1 - (-2t + 2)^3 / 2` above. Input is clamped to
/// `[0, 1]`. The WGSL foliage program uses the identical expression.
#[inline]
pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// One layer's progress ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    progress: f32,
    ramp_rate: f32,
    epsilon: f32,
}

impl Transition {
    /// A ramp starting at `progress` moving at most `ramp_rate` per second.
    pub fn new(progress: f32, ramp_rate: f32, epsilon: f32) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            ramp_rate: ramp_rate.max(0.0),
            epsilon: epsilon.max(0.0),
        }
    }

    /// Raw (linear) progress in `[0, 1]`.
    #[inline]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Whether progress has settled on `target`.
    #[inline]
    pub fn is_settled(&self, target: f32) -> bool {
        self.progress == target
    }

    /// Move toward `target` by at most `ramp_rate * delta_time`.
    ///
    /// Never overshoots. Once within `epsilon` of the target the value lands
    /// exactly on it and stays there.
    pub fn advance(&mut self, target: f32, delta_time: f32) {
        let diff = target - self.progress;
        if diff.abs() <= self.epsilon {
            self.progress = target;
            return;
        }
        let step = (self.ramp_rate * delta_time.max(0.0)).min(diff.abs());
        self.progress += diff.signum() * step;
        if (target - self.progress).abs() <= self.epsilon {
            self.progress = target;
        }
    }
}

/// Handle for a layer registered with a [`TransitionScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

/// Discrete state plus one progress ramp per layer.
#[derive(Clone, Debug)]
pub struct TransitionScheduler {
    state: TreeState,
    epsilon: f32,
    layers: Vec<Transition>,
}

impl TransitionScheduler {
    /// Scheduler that starts out requesting `state`.
    pub fn new(state: TreeState, epsilon: f32) -> Self {
        Self {
            state,
            epsilon,
            layers: Vec::new(),
        }
    }

    /// Register a layer whose progress starts at `initial` (0 = chaos).
    pub fn add_layer(&mut self, initial: f32, ramp_rate: f32) -> LayerId {
        self.layers.push(Transition::new(initial, ramp_rate, self.epsilon));
        LayerId(self.layers.len() - 1)
    }

    /// Last requested state.
    #[inline]
    pub fn state(&self) -> TreeState {
        self.state
    }

    /// Request a state. Returns `true` if it differs from the previous request.
    pub fn request(&mut self, state: TreeState) -> bool {
        let changed = self.state != state;
        if changed {
            tracing::debug!(from = %self.state, to = %state, "tree state requested");
        }
        self.state = state;
        changed
    }

    /// Advance every layer's ramp by one tick.
    pub fn tick(&mut self, delta_time: f32) {
        let target = self.state.target_value();
        for layer in &mut self.layers {
            layer.advance(target, delta_time);
        }
    }

    /// Raw progress of a layer.
    #[inline]
    pub fn progress(&self, id: LayerId) -> f32 {
        self.layers[id.0].progress()
    }

    /// Whether every layer has reached the current target.
    pub fn is_settled(&self) -> bool {
        let target = self.state.target_value();
        self.layers.iter().all(|l| l.is_settled(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    #[test]
    fn test_ease_fixed_points() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-6);
        assert!((ease_in_out_cubic(0.25) - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn test_ease_monotonic() {
        let mut prev = ease_in_out_cubic(0.0);
        for i in 1..=1000 {
            let v = ease_in_out_cubic(i as f32 / 1000.0);
            assert!(v >= prev, "ease decreased at {i}");
            prev = v;
        }
    }

    #[test]
    fn test_ease_clamps_input() {
        assert_eq!(ease_in_out_cubic(-1.0), 0.0);
        assert_eq!(ease_in_out_cubic(2.0), 1.0);
    }

    #[test]
    fn test_linear_ramp_then_exact_bound() {
        let rate = 2.0;
        let mut sched = TransitionScheduler::new(TreeState::Formed, 1e-3);
        let id = sched.add_layer(0.0, rate);

        // t = 0.3 < 1/r
        for _ in 0..30 {
            sched.tick(DT);
        }
        assert!((sched.progress(id) - rate * 0.3).abs() < 1e-3);

        // t >= 1/r
        for _ in 0..30 {
            sched.tick(DT);
        }
        assert_eq!(sched.progress(id), 1.0);
        assert!(sched.is_settled());

        for _ in 0..100 {
            sched.tick(DT);
            assert_eq!(sched.progress(id), 1.0);
        }
    }

    #[test]
    fn test_never_overshoots_on_long_tick() {
        let mut sched = TransitionScheduler::new(TreeState::Formed, 1e-3);
        let id = sched.add_layer(0.9, 2.0);
        sched.tick(10.0);
        assert_eq!(sched.progress(id), 1.0);
    }

    #[test]
    fn test_reversal_is_continuous() {
        let rate = 2.0;
        let max_step = rate * DT;
        let mut sched = TransitionScheduler::new(TreeState::Formed, 1e-3);
        let id = sched.add_layer(0.0, rate);
        for _ in 0..20 {
            sched.tick(DT);
        }
        let before = sched.progress(id);
        assert!(sched.request(TreeState::Chaos));
        sched.tick(DT);
        let after = sched.progress(id);
        assert!(after < before, "direction did not reverse");
        assert!((before - after) <= max_step + 1e-6);
    }

    #[test]
    fn test_repeat_request_is_not_a_change() {
        let mut sched = TransitionScheduler::new(TreeState::Formed, 1e-3);
        assert!(!sched.request(TreeState::Formed));
        assert!(sched.request(TreeState::Chaos));
        assert_eq!(sched.state(), TreeState::Chaos);
    }

    #[test]
    fn test_layers_ramp_independently() {
        let mut sched = TransitionScheduler::new(TreeState::Formed, 1e-3);
        let slow = sched.add_layer(0.0, 1.0);
        let fast = sched.add_layer(0.0, 4.0);
        for _ in 0..10 {
            sched.tick(DT);
        }
        assert!((sched.progress(slow) - 0.1).abs() < 1e-3);
        assert!((sched.progress(fast) - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(TreeState::Chaos.to_string(), "CHAOS");
        assert_eq!(TreeState::Formed.label(), "FORMED");
        assert_eq!(TreeState::Chaos.toggled(), TreeState::Formed);
    }
}
