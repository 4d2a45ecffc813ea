//! Gesture classification from hand landmark frames.
//!
//! Maps one `LandmarkFrame` to a derived `GestureObservation`: finger
//! count, pose label, pointing angle, and lateral-motion flag.  Stateless
//! except for a bounded palm-center motion history.  Never errors on a
//! missing hand: an empty frame yields the empty observation and clears
//! motion context.

use std::collections::VecDeque;

use tracing::debug;

use crate::landmark::{HandLandmarks, Landmark, LandmarkFrame, PoseLabel};

// ── Observation ────────────────────────────────────────────

/// Derived, per-tick view of one frame. Recomputed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureObservation {
    /// Raised non-thumb fingers, 0-4. The thumb is never counted.
    pub finger_count: u8,
    /// Pose label: the frame's external label when present, otherwise
    /// derived geometrically; `None` when neither applies.
    pub pose: Option<PoseLabel>,
    /// Index-finger pointing angle in degrees. Only computed while the
    /// pose is `PointingUp`.
    pub pointing_angle_deg: Option<f32>,
    /// Whether sustained lateral palm motion was detected this tick.
    pub lateral_motion: bool,
}

impl GestureObservation {
    /// The neutral observation: what an empty frame classifies to.
    pub fn empty() -> Self {
        Self {
            finger_count: 0,
            pose: None,
            pointing_angle_deg: None,
            lateral_motion: false,
        }
    }
}

// ── Motion config ──────────────────────────────────────────

/// Horizontal direction a swipe must travel to count as lateral motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDirection {
    Left,
    Right,
}

impl MotionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Sign of x displacement in this direction (x grows rightward).
    fn sign(&self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// Tunables for lateral-motion detection. Replaceable at runtime via
/// `GestureClassifier::set_motion_config`.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Minimum net horizontal displacement (normalized coords) across the
    /// detection window.
    pub movement_threshold: f32,
    /// Number of samples in the detection window.
    pub consecutive_samples: usize,
    /// Minimum interval between history samples (seconds). Decouples
    /// detection sensitivity from the tick rate.
    pub sample_interval_s: f64,
    /// Direction the motion must travel.
    pub direction: MotionDirection,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.1,
            consecutive_samples: 5,
            sample_interval_s: 0.1,
            direction: MotionDirection::Right,
        }
    }
}

/// Fraction of window steps that must agree with the configured direction.
const DIRECTION_AGREEMENT_MIN: f32 = 0.7;

/// Ring buffer capacity for palm-center samples.
const HISTORY_CAPACITY: usize = 32;

// ── Motion history ─────────────────────────────────────────

/// One palm-center sample.
#[derive(Debug, Clone, Copy)]
struct MotionSample {
    x: f32,
    #[allow(dead_code)]
    y: f32,
    timestamp_s: f64,
}

/// Bounded history of palm-center positions, sampled at a minimum
/// interval.  Owned exclusively by the classifier.
#[derive(Debug, Default)]
pub struct MotionHistory {
    samples: VecDeque<MotionSample>,
}

impl MotionHistory {
    /// Record a sample unless the minimum interval since the previous one
    /// has not yet elapsed. Returns whether the sample was kept.
    fn observe(&mut self, x: f32, y: f32, timestamp_s: f64, min_interval_s: f64) -> bool {
        if let Some(last) = self.samples.back() {
            if timestamp_s - last.timestamp_s < min_interval_s {
                return false;
            }
        }
        if self.samples.len() >= HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(MotionSample { x, y, timestamp_s });
        true
    }

    /// Drop all samples. Motion context cannot span a detection gap.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Whether the last `consecutive_samples` samples describe sustained
    /// motion in the configured direction: net displacement at or above
    /// the threshold, and at least 70% of steps agreeing in sign.
    fn detect(&self, config: &MotionConfig) -> bool {
        let k = config.consecutive_samples;
        if k < 2 || self.samples.len() < k {
            return false;
        }
        let window: Vec<&MotionSample> = self.samples.iter().skip(self.samples.len() - k).collect();
        let sign = config.direction.sign();

        let net = (window[k - 1].x - window[0].x) * sign;
        if net < config.movement_threshold {
            return false;
        }

        let agreeing = window
            .windows(2)
            .filter(|pair| (pair[1].x - pair[0].x) * sign > 0.0)
            .count();
        agreeing as f32 / (k - 1) as f32 >= DIRECTION_AGREEMENT_MIN
    }
}

// ── Classifier ─────────────────────────────────────────────

/// Pure per-frame geometry plus the motion-history buffer.
#[derive(Debug, Default)]
pub struct GestureClassifier {
    config: MotionConfig,
    history: MotionHistory,
}

impl GestureClassifier {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            history: MotionHistory::default(),
        }
    }

    /// Swap motion tunables without restarting. Existing history is kept;
    /// the new window applies from the next tick.
    pub fn set_motion_config(&mut self, config: MotionConfig) {
        debug!(
            threshold = config.movement_threshold,
            samples = config.consecutive_samples,
            direction = config.direction.as_str(),
            "motion config updated"
        );
        self.config = config;
    }

    /// Classify one frame. An empty frame yields the empty observation
    /// and clears motion history.  Hands must already be shape-checked;
    /// the first hand wins when several are present.
    pub fn classify(&mut self, frame: &LandmarkFrame, now_s: f64) -> GestureObservation {
        let Some(hand) = frame.hands.first() else {
            self.history.clear();
            return GestureObservation::empty();
        };

        let finger_count = count_fingers(hand);
        let pose = frame.label.or_else(|| derive_pose(hand, finger_count));
        let pointing_angle_deg = match pose {
            Some(PoseLabel::PointingUp) => Some(pointing_angle(hand)),
            _ => None,
        };

        let (cx, cy) = palm_center(hand);
        self.history
            .observe(cx, cy, now_s, self.config.sample_interval_s);
        let lateral_motion = self.history.detect(&self.config);

        GestureObservation {
            finger_count,
            pose,
            pointing_angle_deg,
            lateral_motion,
        }
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.samples.len()
    }
}

// ── Geometry ───────────────────────────────────────────────

/// Count raised non-thumb fingers: a finger is up iff its tip sits above
/// (numerically below) its PIP joint. The thumb is excluded.
fn count_fingers(hand: &HandLandmarks) -> u8 {
    Landmark::finger_tip_pip_pairs()
        .iter()
        .filter(|(tip, pip)| hand.point(*tip).y < hand.point(*pip).y)
        .count() as u8
}

/// Thumb extended upward: tip above IP above MCP, strictly ordered.
fn thumb_extended(hand: &HandLandmarks) -> bool {
    let tip = hand.point(Landmark::ThumbTip).y;
    let ip = hand.point(Landmark::ThumbIp).y;
    let mcp = hand.point(Landmark::ThumbMcp).y;
    tip < ip && ip < mcp
}

/// Thumb extended downward: the mirror ordering.
fn thumb_inverted(hand: &HandLandmarks) -> bool {
    let tip = hand.point(Landmark::ThumbTip).y;
    let ip = hand.point(Landmark::ThumbIp).y;
    let mcp = hand.point(Landmark::ThumbMcp).y;
    tip > ip && ip > mcp
}

/// All four non-thumb fingers folded: each tip below its PIP joint.
fn fingers_folded(hand: &HandLandmarks) -> bool {
    Landmark::finger_tip_pip_pairs()
        .iter()
        .all(|(tip, pip)| hand.point(*tip).y > hand.point(*pip).y)
}

/// Geometric pose derivation, used when the frame carries no external
/// label. Checked most-specific first.
fn derive_pose(hand: &HandLandmarks, finger_count: u8) -> Option<PoseLabel> {
    let folded = fingers_folded(hand);

    if thumb_extended(hand) && folded {
        return Some(PoseLabel::ThumbUp);
    }
    if thumb_inverted(hand) && folded {
        return Some(PoseLabel::ThumbDown);
    }

    let index_up = hand.point(Landmark::IndexTip).y < hand.point(Landmark::IndexPip).y;
    let rest_folded = [
        (Landmark::MiddleTip, Landmark::MiddlePip),
        (Landmark::RingTip, Landmark::RingPip),
        (Landmark::PinkyTip, Landmark::PinkyPip),
    ]
    .iter()
    .all(|(tip, pip)| hand.point(*tip).y > hand.point(*pip).y);
    if index_up && rest_folded && !thumb_extended(hand) {
        return Some(PoseLabel::PointingUp);
    }

    if finger_count == 4 && thumb_extended(hand) {
        return Some(PoseLabel::OpenPalm);
    }
    if folded && !thumb_extended(hand) {
        return Some(PoseLabel::ClosedFist);
    }
    None
}

/// Pointing direction: angle of the index base → index tip vector,
/// `atan2(dy, dx)` in degrees. Straight up is roughly −90°.
fn pointing_angle(hand: &HandLandmarks) -> f32 {
    let tip = hand.point(Landmark::IndexTip);
    let base = hand.point(Landmark::IndexMcp);
    let dx = tip.x - base.x;
    let dy = tip.y - base.y;
    dy.atan2(dx).to_degrees()
}

/// Palm center: midpoint of the wrist and the middle-finger base.
fn palm_center(hand: &HandLandmarks) -> (f32, f32) {
    let wrist = hand.point(Landmark::Wrist);
    let middle = hand.point(Landmark::MiddleMcp);
    ((wrist.x + middle.x) / 2.0, (wrist.y + middle.y) / 2.0)
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
pub(crate) fn make_hand() -> HandLandmarks {
    use crate::landmark::{Point, LANDMARK_COUNT};
    HandLandmarks::new(vec![Point::new(0.5, 0.5, 0.0); LANDMARK_COUNT])
}

#[cfg(test)]
pub(crate) fn set_point(hand: &mut HandLandmarks, landmark: Landmark, x: f32, y: f32) {
    hand.points[landmark.index()] = crate::landmark::Point::new(x, y, 0.0);
}

/// A hand with `n` fingers raised (index first) and the rest folded;
/// thumb neutral (not strictly ordered either way).
#[cfg(test)]
pub(crate) fn hand_with_fingers(n: u8) -> HandLandmarks {
    let mut hand = make_hand();
    for (i, (tip, pip)) in Landmark::finger_tip_pip_pairs().iter().enumerate() {
        set_point(&mut hand, *pip, 0.5, 0.5);
        if (i as u8) < n {
            set_point(&mut hand, *tip, 0.5, 0.3); // above PIP: raised
        } else {
            set_point(&mut hand, *tip, 0.5, 0.7); // below PIP: folded
        }
    }
    hand
}

/// A geometric thumbs-up: thumb strictly ascending, all fingers folded.
#[cfg(test)]
pub(crate) fn thumbs_up_hand() -> HandLandmarks {
    let mut hand = hand_with_fingers(0);
    set_point(&mut hand, Landmark::ThumbMcp, 0.4, 0.6);
    set_point(&mut hand, Landmark::ThumbIp, 0.4, 0.5);
    set_point(&mut hand, Landmark::ThumbTip, 0.4, 0.4);
    hand
}

/// The volume-up "L": index raised with the thumb stuck out, which
/// keeps the derived pose away from `PointingUp`.
#[cfg(test)]
pub(crate) fn one_finger_hand() -> HandLandmarks {
    let mut hand = hand_with_fingers(1);
    set_point(&mut hand, Landmark::ThumbMcp, 0.38, 0.6);
    set_point(&mut hand, Landmark::ThumbIp, 0.36, 0.5);
    set_point(&mut hand, Landmark::ThumbTip, 0.34, 0.4);
    hand
}

/// A pointing hand whose index base→tip vector sits at `angle_deg`.
#[cfg(test)]
pub(crate) fn pointing_hand(angle_deg: f32) -> HandLandmarks {
    let mut hand = hand_with_fingers(0);
    let rad = angle_deg.to_radians();
    let (bx, by) = (0.5, 0.5);
    set_point(&mut hand, Landmark::IndexMcp, bx, by);
    set_point(&mut hand, Landmark::IndexPip, bx + 0.07 * rad.cos(), by + 0.07 * rad.sin());
    set_point(
        &mut hand,
        Landmark::IndexTip,
        bx + 0.2 * rad.cos(),
        by + 0.2 * rad.sin(),
    );
    // Keep the thumb out of the strict vertical orderings.
    set_point(&mut hand, Landmark::ThumbMcp, 0.4, 0.5);
    set_point(&mut hand, Landmark::ThumbIp, 0.4, 0.5);
    set_point(&mut hand, Landmark::ThumbTip, 0.4, 0.5);
    hand
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Point;

    fn frame_with(hand: HandLandmarks, t: f64) -> LandmarkFrame {
        LandmarkFrame {
            timestamp_s: t,
            hands: vec![hand],
            label: None,
        }
    }

    #[test]
    fn test_empty_frame_is_neutral() {
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&LandmarkFrame::empty(0.0), 0.0);
        assert_eq!(obs, GestureObservation::empty());
    }

    #[test]
    fn test_finger_count_extremes() {
        let mut classifier = GestureClassifier::default();

        let obs = classifier.classify(&frame_with(hand_with_fingers(4), 0.0), 0.0);
        assert_eq!(obs.finger_count, 4);

        let obs = classifier.classify(&frame_with(hand_with_fingers(0), 0.1), 0.1);
        assert_eq!(obs.finger_count, 0);
    }

    #[test]
    fn test_finger_count_partial() {
        let mut classifier = GestureClassifier::default();
        for n in 1..=3u8 {
            let obs = classifier.classify(&frame_with(hand_with_fingers(n), n as f64), n as f64);
            assert_eq!(obs.finger_count, n, "expected {} raised fingers", n);
        }
    }

    #[test]
    fn test_thumbs_up_derivation() {
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame_with(thumbs_up_hand(), 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::ThumbUp));
        assert_eq!(obs.finger_count, 0);
    }

    #[test]
    fn test_thumbs_up_translation_invariance() {
        // The same relative geometry classifies identically anywhere in
        // the frame.
        let mut hand = thumbs_up_hand();
        for p in &mut hand.points {
            *p = Point::new(p.x + 0.3, p.y - 0.25, p.z);
        }
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame_with(hand, 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::ThumbUp));
    }

    #[test]
    fn test_thumb_down_derivation() {
        let mut hand = hand_with_fingers(0);
        set_point(&mut hand, Landmark::ThumbMcp, 0.4, 0.4);
        set_point(&mut hand, Landmark::ThumbIp, 0.4, 0.5);
        set_point(&mut hand, Landmark::ThumbTip, 0.4, 0.6);
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame_with(hand, 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::ThumbDown));
    }

    #[test]
    fn test_external_label_wins() {
        let mut frame = frame_with(thumbs_up_hand(), 0.0);
        frame.label = Some(PoseLabel::OpenPalm);
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame, 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::OpenPalm));
    }

    #[test]
    fn test_pointing_angle_only_while_pointing() {
        let mut classifier = GestureClassifier::default();

        let obs = classifier.classify(&frame_with(pointing_hand(-95.0), 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::PointingUp));
        let angle = obs.pointing_angle_deg.expect("pointing angle");
        assert!((angle - (-95.0)).abs() < 0.5, "angle {} != -95", angle);

        let obs = classifier.classify(&frame_with(thumbs_up_hand(), 0.1), 0.1);
        assert_eq!(obs.pointing_angle_deg, None);
    }

    #[test]
    fn test_lateral_motion_rightward() {
        // 5 samples stepping +0.03 each: net 0.12 >= 0.1, 100% rightward.
        let mut classifier = GestureClassifier::default();
        let mut detected = false;
        for i in 0..5 {
            let mut hand = hand_with_fingers(0);
            let x = 0.3 + 0.03 * i as f32;
            set_point(&mut hand, Landmark::Wrist, x, 0.6);
            set_point(&mut hand, Landmark::MiddleMcp, x, 0.4);
            let t = i as f64 * 0.15;
            detected = classifier.classify(&frame_with(hand, t), t).lateral_motion;
        }
        assert!(detected, "monotone rightward sweep must detect");
    }

    #[test]
    fn test_lateral_motion_oscillation_rejected() {
        // Oscillating x with small net displacement: below threshold and
        // below the direction-agreement floor.
        let mut classifier = GestureClassifier::default();
        let xs = [0.30, 0.36, 0.31, 0.36, 0.35];
        let mut detected = false;
        for (i, x) in xs.iter().enumerate() {
            let mut hand = hand_with_fingers(0);
            set_point(&mut hand, Landmark::Wrist, *x, 0.6);
            set_point(&mut hand, Landmark::MiddleMcp, *x, 0.4);
            let t = i as f64 * 0.15;
            detected = classifier.classify(&frame_with(hand, t), t).lateral_motion;
        }
        assert!(!detected, "oscillation must not detect");
    }

    #[test]
    fn test_motion_sampling_respects_interval() {
        // Ticks every 20ms against a 100ms sample interval: only the
        // first tick of each interval lands in history.
        let mut classifier = GestureClassifier::default();
        for i in 0..5 {
            let t = i as f64 * 0.02;
            classifier.classify(&frame_with(hand_with_fingers(0), t), t);
        }
        assert_eq!(classifier.history_len(), 1);
    }

    #[test]
    fn test_empty_frame_clears_history() {
        let mut classifier = GestureClassifier::default();
        classifier.classify(&frame_with(hand_with_fingers(0), 0.0), 0.0);
        assert_eq!(classifier.history_len(), 1);

        classifier.classify(&LandmarkFrame::empty(0.2), 0.2);
        assert_eq!(classifier.history_len(), 0);
    }

    #[test]
    fn test_runtime_reconfiguration() {
        let mut classifier = GestureClassifier::default();
        let drive = |classifier: &mut GestureClassifier, base: f64| {
            let mut last = false;
            for i in 0..5 {
                let mut hand = hand_with_fingers(0);
                let x = 0.3 + 0.03 * i as f32;
                set_point(&mut hand, Landmark::Wrist, x, 0.6);
                set_point(&mut hand, Landmark::MiddleMcp, x, 0.4);
                let t = base + i as f64 * 0.15;
                last = classifier.classify(&frame_with(hand, t), t).lateral_motion;
            }
            last
        };

        assert!(drive(&mut classifier, 0.0));

        // Raise the threshold past the sweep's net displacement: the same
        // gesture no longer triggers.
        classifier.set_motion_config(MotionConfig {
            movement_threshold: 0.5,
            ..MotionConfig::default()
        });
        classifier.history.clear();
        assert!(!drive(&mut classifier, 10.0));
    }

    #[test]
    fn test_leftward_direction_config() {
        let mut classifier = GestureClassifier::new(MotionConfig {
            direction: MotionDirection::Left,
            ..MotionConfig::default()
        });
        let mut detected = false;
        for i in 0..5 {
            let mut hand = hand_with_fingers(0);
            let x = 0.7 - 0.03 * i as f32;
            set_point(&mut hand, Landmark::Wrist, x, 0.6);
            set_point(&mut hand, Landmark::MiddleMcp, x, 0.4);
            let t = i as f64 * 0.15;
            detected = classifier.classify(&frame_with(hand, t), t).lateral_motion;
        }
        assert!(detected, "leftward sweep must detect with Left direction");
    }

    #[test]
    fn test_single_upright_finger_reads_as_pointing() {
        // A lone raised index with the thumb tucked derives PointingUp;
        // adding an extended thumb breaks the pointing shape and leaves
        // the pose empty (the one-finger volume gesture).
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame_with(hand_with_fingers(1), 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::PointingUp));
        assert_eq!(obs.finger_count, 1);

        let obs = classifier.classify(&frame_with(one_finger_hand(), 0.1), 0.1);
        assert_eq!(obs.pose, None);
        assert_eq!(obs.finger_count, 1);
    }

    #[test]
    fn test_open_palm_and_fist_derivation() {
        let mut palm = hand_with_fingers(4);
        set_point(&mut palm, Landmark::ThumbMcp, 0.4, 0.6);
        set_point(&mut palm, Landmark::ThumbIp, 0.4, 0.5);
        set_point(&mut palm, Landmark::ThumbTip, 0.4, 0.4);
        let mut classifier = GestureClassifier::default();
        let obs = classifier.classify(&frame_with(palm, 0.0), 0.0);
        assert_eq!(obs.pose, Some(PoseLabel::OpenPalm));

        let mut fist = hand_with_fingers(0);
        set_point(&mut fist, Landmark::ThumbMcp, 0.4, 0.5);
        set_point(&mut fist, Landmark::ThumbIp, 0.4, 0.55);
        set_point(&mut fist, Landmark::ThumbTip, 0.4, 0.5);
        let obs = classifier.classify(&frame_with(fist, 0.1), 0.1);
        assert_eq!(obs.pose, Some(PoseLabel::ClosedFist));
    }
}
