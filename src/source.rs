//! Landmark frame sources.
//!
//! The engine consumes frames through the `LandmarkSource` trait:
//! `Ok(None)` means the stream ended cleanly, `Err` is the fatal
//! "unable to read" condition.  Two implementations ship here:
//! `ReplaySource` reads one s-expression frame per line from a log, and
//! `SyntheticSource` plays a scripted gesture tour for demos and soak
//! runs with no camera or model attached.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use lexpr::Value;
use tracing::{info, warn};

use crate::landmark::{HandLandmarks, LandmarkFrame, Point, PoseLabel, LANDMARK_COUNT};

// ── Trait ──────────────────────────────────────────────────

/// Sequential frame producer. Implementations may block while waiting
/// for the next frame.
pub trait LandmarkSource {
    /// Produce the next frame, `Ok(None)` at end of stream, or `Err`
    /// when acquisition fails (fatal to the dispatch loop).
    fn next_frame(&mut self) -> Result<Option<LandmarkFrame>>;
}

// ── Replay ─────────────────────────────────────────────────

/// Reads frames from an s-expression log, one frame per line:
///
/// ```text
/// (:t 0.10 :label Thumb_Up :hands (((0.41 0.62 0.0) ... 21 points ...)))
/// ```
///
/// Blank lines and `;` comments are skipped. An unparsable line is a
/// decoder glitch: logged and skipped, not fatal. A hand with the wrong
/// point count parses fine and is left for the engine to reject.
pub struct ReplaySource<R: BufRead> {
    reader: R,
    path: PathBuf,
    line_no: u64,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("opening replay {}", path.display()))?;
        info!(path = %path.display(), "replay source opened");
        let mut source = Self::from_reader(BufReader::new(file));
        source.path = path.to_path_buf();
        Ok(source)
    }
}

impl<R: BufRead> ReplaySource<R> {
    /// Wrap an arbitrary reader.
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            path: PathBuf::from("<reader>"),
            line_no: 0,
        }
    }
}

impl<R: BufRead> LandmarkSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("reading replay {}", self.path.display()))?;
            if n == 0 {
                info!(lines = self.line_no, "replay source exhausted");
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            match parse_frame(trimmed) {
                Some(frame) => return Ok(Some(frame)),
                None => warn!(line = self.line_no, "skipping unparsable frame"),
            }
        }
    }
}

// ── Frame parsing ──────────────────────────────────────────

/// Parse one frame line. Returns `None` on any shape the decoder does
/// not understand.
pub fn parse_frame(raw: &str) -> Option<LandmarkFrame> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return None;
        }
    };

    let timestamp_s = plist_get(&value, "t").and_then(Value::as_f64)?;
    let label = plist_get(&value, "label")
        .and_then(atom_string)
        .and_then(|s| PoseLabel::parse_category(&s));

    let mut hands = Vec::new();
    if let Some(hands_value) = plist_get(&value, "hands") {
        for hand_value in list_elements(hands_value) {
            let mut points = Vec::new();
            for point_value in list_elements(hand_value) {
                let coords: Vec<f64> = list_elements(point_value)
                    .into_iter()
                    .filter_map(Value::as_f64)
                    .collect();
                if coords.len() < 2 {
                    return None;
                }
                points.push(Point::new(
                    coords[0] as f32,
                    coords[1] as f32,
                    coords.get(2).copied().unwrap_or(0.0) as f32,
                ));
            }
            hands.push(HandLandmarks::new(points));
        }
    }

    Some(LandmarkFrame {
        timestamp_s,
        hands,
        label,
    })
}

/// Walk a plist for `:key` and return the following value.
/// Handles both `Value::Keyword("key")` and `Value::Symbol(":key")`
/// parser forms.
fn plist_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            if let Value::Cons(next) = pair.cdr() {
                return Some(next.car());
            }
            return None;
        }
        current = pair.cdr();
    }
    None
}

/// Collect the top-level elements of a proper list.
fn list_elements(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        out.push(pair.car());
        current = pair.cdr();
    }
    out
}

/// Render a symbol/keyword/string atom as plain text.
fn atom_string(value: &Value) -> Option<String> {
    match value {
        Value::Keyword(k) => Some(k.to_string()),
        Value::Symbol(s) => {
            let s = s.to_string();
            Some(s.strip_prefix(':').unwrap_or(&s).to_string())
        }
        Value::String(s) => Some(s.to_string()),
        _ => None,
    }
}

// ── Synthetic ──────────────────────────────────────────────

/// One scripted gesture phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePhase {
    /// No hand in frame.
    Idle,
    ThumbsUp,
    OpenPalm,
    /// `n` raised fingers (index first), the rest folded.
    Fingers(u8),
    /// Hand travels rightward across the frame over the segment.
    SwipeRight,
    /// Pointing pose at a fixed angle (degrees).
    Pointing(f32),
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    phase: GesturePhase,
    ticks: u32,
}

/// Scripted gesture tour. Emits frames at a fixed interval (optionally
/// paced in real time) and ends after the script completes.
pub struct SyntheticSource {
    segments: Vec<Segment>,
    segment_idx: usize,
    tick_in_segment: u32,
    clock_s: f64,
    tick_interval_s: f64,
    pace: bool,
}

impl SyntheticSource {
    /// The default tour: palm, thumbs-up, finger counts, a swipe, and a
    /// pointing sweep across three zones.
    pub fn standard(tick_interval_s: f64, pace: bool) -> Self {
        Self::scripted(
            vec![
                (GesturePhase::Idle, 5),
                (GesturePhase::OpenPalm, 8),
                (GesturePhase::Idle, 3),
                (GesturePhase::ThumbsUp, 8),
                (GesturePhase::Idle, 3),
                (GesturePhase::Fingers(2), 8),
                (GesturePhase::Idle, 3),
                (GesturePhase::SwipeRight, 12),
                (GesturePhase::Idle, 3),
                (GesturePhase::Pointing(-75.0), 6),
                (GesturePhase::Pointing(-95.0), 6),
                (GesturePhase::Pointing(-115.0), 6),
                (GesturePhase::Idle, 5),
            ],
            tick_interval_s,
            pace,
        )
    }

    /// Build a source from explicit (phase, ticks) pairs.
    pub fn scripted(script: Vec<(GesturePhase, u32)>, tick_interval_s: f64, pace: bool) -> Self {
        let segments = script
            .into_iter()
            .map(|(phase, ticks)| Segment { phase, ticks })
            .collect();
        Self {
            segments,
            segment_idx: 0,
            tick_in_segment: 0,
            clock_s: 0.0,
            tick_interval_s,
            pace,
        }
    }
}

impl LandmarkSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
        let segment = loop {
            match self.segments.get(self.segment_idx) {
                None => {
                    info!("synthetic script complete");
                    return Ok(None);
                }
                Some(s) if self.tick_in_segment >= s.ticks => {
                    self.segment_idx += 1;
                    self.tick_in_segment = 0;
                }
                Some(s) => break *s,
            }
        };

        if self.pace {
            thread::sleep(Duration::from_secs_f64(self.tick_interval_s));
        }

        let progress = if segment.ticks > 1 {
            self.tick_in_segment as f32 / (segment.ticks - 1) as f32
        } else {
            0.0
        };
        let frame = LandmarkFrame {
            timestamp_s: self.clock_s,
            hands: synth_hand(segment.phase, progress).into_iter().collect(),
            label: None,
        };

        self.tick_in_segment += 1;
        self.clock_s += self.tick_interval_s;
        Ok(Some(frame))
    }
}

// ── Synthetic geometry ─────────────────────────────────────

fn neutral_hand() -> HandLandmarks {
    HandLandmarks::new(vec![Point::new(0.5, 0.5, 0.0); LANDMARK_COUNT])
}

fn set(hand: &mut HandLandmarks, landmark: crate::landmark::Landmark, x: f32, y: f32) {
    hand.points[landmark.index()] = Point::new(x, y, 0.0);
}

fn hand_with_fingers(n: u8) -> HandLandmarks {
    use crate::landmark::Landmark;
    let mut hand = neutral_hand();
    for (i, (tip, pip)) in Landmark::finger_tip_pip_pairs().iter().enumerate() {
        set(&mut hand, *pip, 0.5, 0.5);
        if (i as u8) < n {
            set(&mut hand, *tip, 0.5, 0.3);
        } else {
            set(&mut hand, *tip, 0.5, 0.65);
        }
    }
    hand
}

fn synth_hand(phase: GesturePhase, progress: f32) -> Option<HandLandmarks> {
    use crate::landmark::Landmark;
    match phase {
        GesturePhase::Idle => None,
        GesturePhase::ThumbsUp => {
            let mut hand = hand_with_fingers(0);
            set(&mut hand, Landmark::ThumbMcp, 0.4, 0.6);
            set(&mut hand, Landmark::ThumbIp, 0.4, 0.5);
            set(&mut hand, Landmark::ThumbTip, 0.4, 0.4);
            Some(hand)
        }
        GesturePhase::OpenPalm => {
            let mut hand = hand_with_fingers(4);
            set(&mut hand, Landmark::ThumbMcp, 0.38, 0.58);
            set(&mut hand, Landmark::ThumbIp, 0.36, 0.5);
            set(&mut hand, Landmark::ThumbTip, 0.34, 0.42);
            Some(hand)
        }
        GesturePhase::Fingers(n) => Some(hand_with_fingers(n)),
        GesturePhase::SwipeRight => {
            let mut hand = hand_with_fingers(0);
            let x = 0.2 + 0.5 * progress;
            set(&mut hand, Landmark::Wrist, x, 0.7);
            set(&mut hand, Landmark::MiddleMcp, x, 0.5);
            Some(hand)
        }
        GesturePhase::Pointing(angle_deg) => {
            let mut hand = hand_with_fingers(0);
            let rad = angle_deg.to_radians();
            let (bx, by) = (0.5, 0.55);
            set(&mut hand, Landmark::IndexMcp, bx, by);
            set(
                &mut hand,
                Landmark::IndexPip,
                bx + 0.07 * rad.cos(),
                by + 0.07 * rad.sin(),
            );
            set(
                &mut hand,
                Landmark::IndexTip,
                bx + 0.2 * rad.cos(),
                by + 0.2 * rad.sin(),
            );
            Some(hand)
        }
    }
}

// ── Tests ──────────────────────────────────────────────────
