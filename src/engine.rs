//! Dispatch engine: the stateful per-tick evaluator.
//!
//! Each tick classifies the current frame, runs the always-on
//! edge-triggered pointing channel, then walks the rule table
//! first-match-wins under cooldown, repeat, and pointing-exclusivity
//! policy.  At most one rule event and one pointing transition are
//! emitted per tick, pointing transition first.

use tracing::{debug, warn};

use crate::classifier::{GestureClassifier, MotionConfig};
use crate::landmark::{LandmarkFrame, PoseLabel};
use crate::rules::CommandRuleTable;
use crate::zones::PointingZoneTable;

// ── Events ─────────────────────────────────────────────────

/// The unit emitted to notification sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    /// Rule name, or the entered zone name (`"none"` when a pointing
    /// gesture ends) for transitions.
    pub name: String,
    pub timestamp_s: f64,
    pub pointing_transition: bool,
}

impl CommandEvent {
    /// Serialize the event as a wire s-expression.
    pub fn to_sexp(&self) -> String {
        format!(
            "(:type :event :event :command :name \"{}\" :timestamp {:.3} :pointing-transition {})",
            escape_string(&self.name),
            self.timestamp_s,
            if self.pointing_transition { "t" } else { "nil" },
        )
    }
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── State ──────────────────────────────────────────────────

/// Dispatch bookkeeping. One owner (the engine); no external writers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchState {
    /// Name of the most recently emitted rule command.
    pub last_command: Option<&'static str>,
    /// Timestamp of the most recent rule emission; the single global
    /// cooldown clock shared by every rule.
    pub last_emitted_s: Option<f64>,
    /// Currently active pointing zone, if any.
    pub pointing_zone: Option<String>,
}

// ── Engine ─────────────────────────────────────────────────

/// Stateful rule evaluator. Owns the classifier (and through it the
/// motion history), the rule table, the zone table, and dispatch state.
pub struct DispatchEngine {
    classifier: GestureClassifier,
    rules: CommandRuleTable,
    zones: PointingZoneTable,
    state: DispatchState,
}

impl DispatchEngine {
    pub fn new(
        classifier: GestureClassifier,
        rules: CommandRuleTable,
        zones: PointingZoneTable,
    ) -> Self {
        Self {
            classifier,
            rules,
            zones,
            state: DispatchState::default(),
        }
    }

    /// Current dispatch state (read-only).
    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Swap motion tunables at runtime.
    pub fn set_motion_config(&mut self, config: MotionConfig) {
        self.classifier.set_motion_config(config);
    }

    /// Process one frame. Returns 0-2 events: an optional pointing
    /// transition followed by an optional rule command.
    ///
    /// A malformed frame (a present hand without exactly 21 points) skips
    /// the tick entirely: no classification, no state mutation.
    pub fn tick(&mut self, frame: &LandmarkFrame, now_s: f64) -> Vec<CommandEvent> {
        if !frame.is_well_formed() {
            warn!(
                hands = frame.hands.len(),
                timestamp = frame.timestamp_s,
                "malformed landmark frame, skipping tick"
            );
            return Vec::new();
        }

        let obs = self.classifier.classify(frame, now_s);
        let mut events = Vec::new();

        // ── Pointing channel: always evaluated, edge-triggered ──
        let zone = match obs.pose {
            Some(PoseLabel::PointingUp) => obs
                .pointing_angle_deg
                .and_then(|a| self.zones.classify(a))
                .map(str::to_string),
            _ => None,
        };
        if zone != self.state.pointing_zone {
            let name = zone.clone().unwrap_or_else(|| "none".to_string());
            debug!(
                zone = %name,
                pose = obs.pose.map(|p| p.as_str()).unwrap_or("none"),
                "pointing zone transition"
            );
            events.push(CommandEvent {
                name,
                timestamp_s: now_s,
                pointing_transition: true,
            });
            self.state.pointing_zone = zone;
        }

        // ── Rule channel: first match wins ──
        let pointing_active = self.state.pointing_zone.is_some();
        for rule in self.rules.iter() {
            if pointing_active && !rule.active_during_pointing {
                continue;
            }
            // Repeat suppression: while this rule is still the last
            // emitted command and its own cooldown has not drained, it
            // may not fire again. A repeat-suppressed rule without a
            // cooldown stays quiet until another command intervenes.
            if !rule.allow_repeat && self.state.last_command == Some(rule.name) {
                let cooled = match (rule.cooldown_s, self.state.last_emitted_s) {
                    (Some(cooldown), Some(last)) => now_s - last >= cooldown,
                    _ => false,
                };
                if !cooled {
                    continue;
                }
            }
            if let (Some(cooldown), Some(last)) = (rule.cooldown_s, self.state.last_emitted_s) {
                if now_s - last < cooldown {
                    continue;
                }
            }
            if (rule.predicate)(&obs) {
                debug!(command = rule.name, timestamp = now_s, "command emitted");
                events.push(CommandEvent {
                    name: rule.name.to_string(),
                    timestamp_s: now_s,
                    pointing_transition: false,
                });
                self.state.last_command = Some(rule.name);
                self.state.last_emitted_s = Some(now_s);
                break;
            }
        }

        events
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{
        hand_with_fingers, make_hand, one_finger_hand, pointing_hand, set_point, thumbs_up_hand,
    };
    use crate::landmark::{HandLandmarks, Landmark, Point};
    use crate::rules::CommandRule;

    fn engine() -> DispatchEngine {
        DispatchEngine::new(
            GestureClassifier::default(),
            CommandRuleTable::standard(),
            PointingZoneTable::standard(),
        )
    }

    fn frame(hand: HandLandmarks, t: f64) -> LandmarkFrame {
        LandmarkFrame {
            timestamp_s: t,
            hands: vec![hand],
            label: None,
        }
    }

    fn command_names(events: &[CommandEvent]) -> Vec<String> {
        events
            .iter()
            .filter(|e| !e.pointing_transition)
            .map(|e| e.name.clone())
            .collect()
    }

    fn transition_names(events: &[CommandEvent]) -> Vec<String> {
        events
            .iter()
            .filter(|e| e.pointing_transition)
            .map(|e| e.name.clone())
            .collect()
    }

    #[test]
    fn test_thumbs_up_rate_limited_while_held() {
        let mut eng = engine();
        let events = eng.tick(&frame(thumbs_up_hand(), 0.0), 0.0);
        assert_eq!(command_names(&events), vec!["play"]);

        // Held pose: quiet for the full cooldown window, then one more.
        for i in 1..5 {
            let t = i as f64 * 0.2;
            let events = eng.tick(&frame(thumbs_up_hand(), t), t);
            assert!(command_names(&events).is_empty(), "tick at {} re-fired", t);
        }
        let events = eng.tick(&frame(thumbs_up_hand(), 1.1), 1.1);
        assert_eq!(command_names(&events), vec!["play"]);
    }

    #[test]
    fn test_cooldown_window() {
        // A repeat-allowed rule is still bound by the cooldown clock:
        // fire at t=0, blocked at t=0.2, fires again at t=0.5.
        let mut eng = engine();
        let two = || frame(hand_with_fingers(2), 0.0);

        let events = eng.tick(&two(), 0.0);
        assert_eq!(command_names(&events), vec!["volume-down"]);

        let events = eng.tick(&two(), 0.2);
        assert!(command_names(&events).is_empty(), "inside cooldown");

        let events = eng.tick(&two(), 0.5);
        assert_eq!(command_names(&events), vec!["volume-down"], "cooldown expired");
    }

    #[test]
    fn test_cooldown_clock_is_global() {
        // Firing rule B inside rule A's quiet period still resets the
        // shared clock: the next emission waits on B's timestamp.
        let mut eng = engine();
        let events = eng.tick(&frame(hand_with_fingers(2), 0.0), 0.0);
        assert_eq!(command_names(&events), vec!["volume-down"]);

        let events = eng.tick(&frame(one_finger_hand(), 0.5), 0.5);
        assert_eq!(command_names(&events), vec!["volume-up"]);

        // 0.3s after volume-up: blocked even though volume-down last
        // fired 0.8s ago.
        let events = eng.tick(&frame(hand_with_fingers(2), 0.8), 0.8);
        assert!(command_names(&events).is_empty());
    }

    #[test]
    fn test_non_repeat_rule_refires_after_cooldown() {
        // allow_repeat=false with cooldown 1.0: t=0 fires, the same
        // input at t=0.5 is silent, at t=1.1 it fires again.
        let mut eng = engine();
        assert_eq!(
            command_names(&eng.tick(&frame(hand_with_fingers(4), 0.0), 0.0)),
            vec!["stop"]
        );
        assert!(command_names(&eng.tick(&frame(hand_with_fingers(4), 0.5), 0.5)).is_empty());
        assert_eq!(
            command_names(&eng.tick(&frame(hand_with_fingers(4), 1.1), 1.1)),
            vec!["stop"]
        );

        // An intervening command clears the repeat memory outright.
        assert_eq!(
            command_names(&eng.tick(&frame(hand_with_fingers(3), 2.2), 2.2)),
            vec!["resume"]
        );
        assert_eq!(
            command_names(&eng.tick(&frame(hand_with_fingers(4), 3.5), 3.5)),
            vec!["stop"]
        );
    }

    #[test]
    fn test_pointing_transitions_are_edge_triggered() {
        let mut eng = engine();

        // Hold zone select-track-3 for 10 ticks: exactly one transition.
        let mut transitions = Vec::new();
        for i in 0..10 {
            let t = i as f64 * 0.05;
            let events = eng.tick(&frame(pointing_hand(-95.0), t), t);
            transitions.extend(transition_names(&events));
        }
        assert_eq!(transitions, vec!["select-track-3"]);

        // Move to the next band: one transition.
        let events = eng.tick(&frame(pointing_hand(-105.0), 1.0), 1.0);
        assert_eq!(transition_names(&events), vec!["select-track-4"]);

        // Drop the pointing pose: one transition to "none".
        let events = eng.tick(&frame(thumbs_up_hand(), 1.1), 1.1);
        assert_eq!(transition_names(&events), vec!["none"]);
        assert_eq!(eng.state().pointing_zone, None);
    }

    #[test]
    fn test_pointing_suppresses_rules() {
        let mut eng = engine();
        eng.tick(&frame(pointing_hand(-95.0), 0.0), 0.0);
        assert_eq!(eng.state().pointing_zone.as_deref(), Some("select-track-3"));

        // A pointing hand has one raised finger, but volume-up must not
        // fire while a zone is active (nor would its predicate allow it).
        for i in 1..10 {
            let t = i as f64 * 0.5;
            let events = eng.tick(&frame(pointing_hand(-95.0), t), t);
            assert!(command_names(&events).is_empty());
        }
    }

    #[test]
    fn test_active_during_pointing_rule_still_fires() {
        fn always(_: &crate::classifier::GestureObservation) -> bool {
            true
        }
        fn never_repeat(_: &crate::classifier::GestureObservation) -> bool {
            true
        }
        let rules = CommandRuleTable::new(vec![
            CommandRule {
                name: "suppressed",
                predicate: never_repeat,
                cooldown_s: None,
                allow_repeat: true,
                active_during_pointing: false,
            },
            CommandRule {
                name: "alert",
                predicate: always,
                cooldown_s: None,
                allow_repeat: true,
                active_during_pointing: true,
            },
        ]);
        let mut eng = DispatchEngine::new(
            GestureClassifier::default(),
            rules,
            PointingZoneTable::standard(),
        );

        // Enter a zone; the pointing-suppressed rule ahead of "alert"
        // must be skipped, so "alert" wins despite its table position.
        let events = eng.tick(&frame(pointing_hand(-95.0), 0.0), 0.0);
        assert_eq!(command_names(&events), vec!["alert"]);

        // With no zone active the earlier rule wins again.
        let events = eng.tick(&frame(thumbs_up_hand(), 1.0), 1.0);
        assert_eq!(command_names(&events), vec!["suppressed"]);
    }

    #[test]
    fn test_transition_ordered_before_command() {
        fn always(_: &crate::classifier::GestureObservation) -> bool {
            true
        }
        let rules = CommandRuleTable::new(vec![CommandRule {
            name: "alert",
            predicate: always,
            cooldown_s: None,
            allow_repeat: true,
            active_during_pointing: true,
        }]);
        let mut eng = DispatchEngine::new(
            GestureClassifier::default(),
            rules,
            PointingZoneTable::standard(),
        );

        let events = eng.tick(&frame(pointing_hand(-95.0), 0.0), 0.0);
        assert_eq!(events.len(), 2);
        assert!(events[0].pointing_transition);
        assert_eq!(events[0].name, "select-track-3");
        assert!(!events[1].pointing_transition);
        assert_eq!(events[1].name, "alert");
    }

    #[test]
    fn test_pointing_outside_fan_is_no_zone() {
        let mut eng = engine();
        // Pointing sideways: pose is PointingUp but the angle misses
        // every band; no transition, and volume-up's pose guard keeps
        // the finger ladder quiet.
        let events = eng.tick(&frame(pointing_hand(-30.0), 0.0), 0.0);
        assert!(events.is_empty());
        assert_eq!(eng.state().pointing_zone, None);
    }

    #[test]
    fn test_malformed_hand_preserves_state() {
        let mut eng = engine();
        eng.tick(&frame(thumbs_up_hand(), 0.0), 0.0);
        let before = eng.state().clone();

        let malformed = LandmarkFrame {
            timestamp_s: 0.5,
            hands: vec![HandLandmarks::new(vec![Point::default(); 10])],
            label: None,
        };
        let events = eng.tick(&malformed, 0.5);
        assert!(events.is_empty());
        assert_eq!(*eng.state(), before);
    }

    #[test]
    fn test_no_hand_emits_nothing() {
        let mut eng = engine();
        for i in 0..5 {
            let t = i as f64 * 0.1;
            assert!(eng.tick(&LandmarkFrame::empty(t), t).is_empty());
        }
        assert_eq!(*eng.state(), DispatchState::default());
    }

    #[test]
    fn test_losing_hand_mid_pointing_transitions_to_none() {
        let mut eng = engine();
        eng.tick(&frame(pointing_hand(-95.0), 0.0), 0.0);
        let events = eng.tick(&LandmarkFrame::empty(0.1), 0.1);
        assert_eq!(transition_names(&events), vec!["none"]);
    }

    #[test]
    fn test_external_label_drives_pointing_channel() {
        // An external Pointing_Up label with pointing geometry behaves
        // like the derived pose.
        let mut eng = engine();
        let mut f = frame(pointing_hand(-85.0), 0.0);
        f.label = Some(PoseLabel::PointingUp);
        let events = eng.tick(&f, 0.0);
        assert_eq!(transition_names(&events), vec!["select-track-2"]);
    }

    #[test]
    fn test_event_sexp() {
        let evt = CommandEvent {
            name: "play".to_string(),
            timestamp_s: 1.25,
            pointing_transition: false,
        };
        let sexp = evt.to_sexp();
        assert!(sexp.contains(":event :command"));
        assert!(sexp.contains(":name \"play\""));
        assert!(sexp.contains(":timestamp 1.250"));
        assert!(sexp.contains(":pointing-transition nil"));

        let evt = CommandEvent {
            name: "select-track-3".to_string(),
            timestamp_s: 2.0,
            pointing_transition: true,
        };
        assert!(evt.to_sexp().contains(":pointing-transition t"));
    }

    fn swipe_tick_hand(x: f32) -> HandLandmarks {
        let mut hand = make_hand();
        // Folded fingers so the finger ladder stays quiet.
        for (tip, pip) in Landmark::finger_tip_pip_pairs() {
            set_point(&mut hand, pip, x, 0.5);
            set_point(&mut hand, tip, x, 0.7);
        }
        set_point(&mut hand, Landmark::Wrist, x, 0.6);
        set_point(&mut hand, Landmark::MiddleMcp, x, 0.4);
        hand
    }

    #[test]
    fn test_swipe_sequence_emits_next_track() {
        let mut eng = engine();
        let mut emitted = Vec::new();
        for i in 0..5 {
            let x = 0.3 + 0.03 * i as f32;
            let t = i as f64 * 0.15;
            emitted.extend(command_names(&eng.tick(&frame(swipe_tick_hand(x), t), t)));
        }
        assert_eq!(emitted, vec!["next-track"]);
    }

    #[test]
    fn test_engine_motion_reconfig_without_restart() {
        use crate::classifier::MotionConfig;

        let mut eng = engine();
        eng.set_motion_config(MotionConfig {
            movement_threshold: 0.5,
            ..MotionConfig::default()
        });

        // The same sweep that normally emits next-track stays quiet
        // under the raised threshold.
        for i in 0..5 {
            let x = 0.3 + 0.03 * i as f32;
            let t = i as f64 * 0.15;
            let events = eng.tick(&frame(swipe_tick_hand(x), t), t);
            assert!(command_names(&events).is_empty());
        }
    }
}
