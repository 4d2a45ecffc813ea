//! Hand landmark data structures.
//!
//! Models the 21-point hand skeleton produced by an external landmark
//! model, plus the optional top-1 pose label that may accompany a frame.
//! Absence of any hand is a valid state; shape validation (exactly 21
//! points per present hand) happens per tick in the dispatch engine.

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl Landmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The four non-thumb fingertips, paired with their PIP joints.
    /// The tip/PIP relation drives both finger counting and fold checks.
    pub fn finger_tip_pip_pairs() -> [(Landmark, Landmark); 4] {
        [
            (Self::IndexTip, Self::IndexPip),
            (Self::MiddleTip, Self::MiddlePip),
            (Self::RingTip, Self::RingPip),
            (Self::PinkyTip, Self::PinkyPip),
        ]
    }
}

// ── Points and hands ───────────────────────────────────────

/// A single landmark position in normalized image coordinates.
/// x/y are roughly in [0,1]; y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Landmark set for one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    /// Points indexed by `Landmark`. A well-formed hand has exactly 21.
    pub points: Vec<Point>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Whether this hand carries the expected 21 points.
    pub fn is_well_formed(&self) -> bool {
        self.points.len() == LANDMARK_COUNT
    }

    /// Position of a landmark. Callers must have checked `is_well_formed`.
    pub fn point(&self, landmark: Landmark) -> Point {
        self.points[landmark.index()]
    }
}

// ── Pose labels ────────────────────────────────────────────

/// Top-1 categorical pose classification. Produced by an external
/// pose-recognition model or derived geometrically; confidence is
/// ignored, only category identity matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseLabel {
    OpenPalm,
    ClosedFist,
    ThumbUp,
    ThumbDown,
    PointingUp,
}

impl PoseLabel {
    /// String representation for logging and the event wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenPalm => "open-palm",
            Self::ClosedFist => "closed-fist",
            Self::ThumbUp => "thumb-up",
            Self::ThumbDown => "thumb-down",
            Self::PointingUp => "pointing-up",
        }
    }

    /// Parse an external model's category name. Unknown categories
    /// (including the model's explicit "None") yield `None`, the
    /// "no confident gesture" case.
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "Open_Palm" | "open-palm" => Some(Self::OpenPalm),
            "Closed_Fist" | "closed-fist" => Some(Self::ClosedFist),
            "Thumb_Up" | "thumb-up" => Some(Self::ThumbUp),
            "Thumb_Down" | "thumb-down" => Some(Self::ThumbDown),
            "Pointing_Up" | "pointing-up" => Some(Self::PointingUp),
            _ => None,
        }
    }
}

// ── Frames ─────────────────────────────────────────────────

/// One observation from the landmark source: zero or more hands plus an
/// optional external pose label.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    /// Acquisition timestamp in seconds.
    pub timestamp_s: f64,
    /// Detected hands. Empty is the valid "no hand observed" state.
    pub hands: Vec<HandLandmarks>,
    /// Optional top-1 label from an external pose model.
    pub label: Option<PoseLabel>,
}

impl LandmarkFrame {
    /// A frame with no hands and no label.
    pub fn empty(timestamp_s: f64) -> Self {
        Self {
            timestamp_s,
            hands: Vec::new(),
            label: None,
        }
    }

    /// Whether every present hand carries exactly 21 points.
    pub fn is_well_formed(&self) -> bool {
        self.hands.iter().all(HandLandmarks::is_well_formed)
    }
}

// ── Tests ──────────────────────────────────────────────────
