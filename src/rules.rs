//! Command rules: an ordered, named table pairing gesture predicates
//! with dispatch policy.
//!
//! Evaluation is first-match-wins, so ordering is part of the contract:
//! specific pose rules sit above the broader finger-count rules.

use crate::classifier::GestureObservation;
use crate::landmark::PoseLabel;

// ── Rule ───────────────────────────────────────────────────

/// One named rule. Priority is implicit: position in the table.
#[derive(Debug, Clone)]
pub struct CommandRule {
    pub name: &'static str,
    /// Predicate over the current observation.
    pub predicate: fn(&GestureObservation) -> bool,
    /// Minimum time since the engine's last emission (any rule) before
    /// this rule may fire.
    pub cooldown_s: Option<f64>,
    /// Whether this rule may fire again while it is still the last
    /// emitted command.
    pub allow_repeat: bool,
    /// Whether this rule stays eligible while a pointing zone is active.
    pub active_during_pointing: bool,
}

// ── Table ──────────────────────────────────────────────────

/// Ordered rule list. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CommandRuleTable {
    rules: Vec<CommandRule>,
}

/// Cooldown for one-shot transport commands.
const TRANSPORT_COOLDOWN_S: f64 = 1.0;
/// Cooldown for held volume commands; sets the repeat rate.
const VOLUME_COOLDOWN_S: f64 = 0.4;

impl CommandRuleTable {
    pub fn new(rules: Vec<CommandRule>) -> Self {
        Self { rules }
    }

    /// The standard playback-control binding. Pose rules first, then the
    /// swipe, then the finger-count ladder.
    pub fn standard() -> Self {
        Self::new(vec![
            CommandRule {
                name: "play",
                predicate: is_thumb_up,
                cooldown_s: Some(TRANSPORT_COOLDOWN_S),
                allow_repeat: false,
                active_during_pointing: false,
            },
            CommandRule {
                name: "pause",
                predicate: is_thumb_down,
                cooldown_s: Some(TRANSPORT_COOLDOWN_S),
                allow_repeat: false,
                active_during_pointing: false,
            },
            CommandRule {
                name: "next-track",
                predicate: is_lateral_swipe,
                cooldown_s: Some(TRANSPORT_COOLDOWN_S),
                allow_repeat: true,
                active_during_pointing: false,
            },
            CommandRule {
                name: "stop",
                predicate: is_four_fingers,
                cooldown_s: Some(TRANSPORT_COOLDOWN_S),
                allow_repeat: false,
                active_during_pointing: false,
            },
            CommandRule {
                name: "resume",
                predicate: is_three_fingers,
                cooldown_s: Some(TRANSPORT_COOLDOWN_S),
                allow_repeat: false,
                active_during_pointing: false,
            },
            CommandRule {
                name: "volume-down",
                predicate: is_two_fingers,
                cooldown_s: Some(VOLUME_COOLDOWN_S),
                allow_repeat: true,
                active_during_pointing: false,
            },
            CommandRule {
                name: "volume-up",
                predicate: is_one_finger,
                cooldown_s: Some(VOLUME_COOLDOWN_S),
                allow_repeat: true,
                active_during_pointing: false,
            },
        ])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

// ── Predicates ─────────────────────────────────────────────

fn is_thumb_up(obs: &GestureObservation) -> bool {
    obs.pose == Some(PoseLabel::ThumbUp)
}

fn is_thumb_down(obs: &GestureObservation) -> bool {
    obs.pose == Some(PoseLabel::ThumbDown)
}

fn is_lateral_swipe(obs: &GestureObservation) -> bool {
    obs.lateral_motion
}

fn is_four_fingers(obs: &GestureObservation) -> bool {
    obs.finger_count == 4
}

fn is_three_fingers(obs: &GestureObservation) -> bool {
    obs.finger_count == 3
}

fn is_two_fingers(obs: &GestureObservation) -> bool {
    obs.finger_count == 2
}

/// One raised finger reads as volume-up only when it is not a pointing
/// gesture; a point angled outside every zone band must not pulse the
/// volume.
fn is_one_finger(obs: &GestureObservation) -> bool {
    obs.finger_count == 1 && obs.pose != Some(PoseLabel::PointingUp)
}

// ── Tests ──────────────────────────────────────────────────
