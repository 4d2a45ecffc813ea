//! Pointing-zone bucketing: maps a pointing angle to a named "virtual
//! command" zone via a table of descending angle boundaries.
//!
//! The table is configuration, not logic: bands can be retuned without
//! touching the classifier or the engine.

use anyhow::{bail, Result};

// ── Bands ──────────────────────────────────────────────────

/// One zone band. `upper_deg` is the exclusive upper boundary; the
/// inclusive lower boundary is the next band's upper (or the table floor
/// for the last band).
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBand {
    pub upper_deg: f32,
    pub name: String,
}

impl ZoneBand {
    pub fn new(upper_deg: f32, name: impl Into<String>) -> Self {
        Self {
            upper_deg,
            name: name.into(),
        }
    }
}

// ── Table ──────────────────────────────────────────────────

/// Ordered set of zone bands with an inclusive floor. Band `i` owns
/// `[lower_i, upper_i)`; angles at or above the first boundary, or below
/// the floor, map to no zone.
#[derive(Debug, Clone)]
pub struct PointingZoneTable {
    bands: Vec<ZoneBand>,
    floor_deg: f32,
}

impl PointingZoneTable {
    /// Build a table, validating strictly descending boundaries ending
    /// above the floor.
    pub fn new(bands: Vec<ZoneBand>, floor_deg: f32) -> Result<Self> {
        for pair in bands.windows(2) {
            if pair[1].upper_deg >= pair[0].upper_deg {
                bail!(
                    "zone boundaries must descend: {} followed by {}",
                    pair[0].upper_deg,
                    pair[1].upper_deg
                );
            }
        }
        if let Some(last) = bands.last() {
            if floor_deg >= last.upper_deg {
                bail!(
                    "zone floor {} must lie below the last boundary {}",
                    floor_deg,
                    last.upper_deg
                );
            }
        }
        Ok(Self { bands, floor_deg })
    }

    /// The default fan: five 10° bands centered around straight-up
    /// (−90°), each selecting one track slot.
    pub fn standard() -> Self {
        Self {
            bands: vec![
                ZoneBand::new(-70.0, "select-track-1"),
                ZoneBand::new(-80.0, "select-track-2"),
                ZoneBand::new(-90.0, "select-track-3"),
                ZoneBand::new(-100.0, "select-track-4"),
                ZoneBand::new(-110.0, "select-track-5"),
            ],
            floor_deg: -120.0,
        }
    }

    /// Bucket an angle. Boundary values resolve to the band above them
    /// (upper exclusive, lower inclusive).
    pub fn classify(&self, angle_deg: f32) -> Option<&str> {
        for (i, band) in self.bands.iter().enumerate() {
            let lower = self
                .bands
                .get(i + 1)
                .map(|b| b.upper_deg)
                .unwrap_or(self.floor_deg);
            if angle_deg < band.upper_deg && angle_deg >= lower {
                return Some(band.name.as_str());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }
}

// ── Tests ──────────────────────────────────────────────────
