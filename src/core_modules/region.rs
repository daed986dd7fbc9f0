// THEORY:
// A `Region` is one parking space: a fixed-size rectangle in frame coordinates.
// The `RegionLayout` is the static map of the car park. It is built once at
// startup from an ordered list of top-left corners and never changes afterwards.
//
// Order is meaningful. A region's index decides both of its pre-computed
// identities:
// - the **assigned label**, taken by cycling a label alphabet over the regions;
// - the **expected occupant id**, which is simply `index + 1`.
// Both tables are stored alongside the regions so the per-frame engine can read
// them without any lookups by coordinate.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Fixed width of every parking space, in pixels.
pub const REGION_WIDTH: u32 = 107;
/// Fixed height of every parking space, in pixels.
pub const REGION_HEIGHT: u32 = 48;

/// Labels handed out to spaces in order, wrapping around when there are more spaces.
pub const DEFAULT_LABELS: [&str; 32] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z", "T1", "T2", "V1", "V2", "S1", "S2",
];

/// A single monitored parking space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The part of this region that lies inside a `frame_width` x `frame_height`
    /// image, as `(x0, y0, x1, y1)` with exclusive upper bounds.
    /// Regions hanging off the edge are cut, regions fully outside are empty.
    pub fn clipped_bounds(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x0 = self.x.min(frame_width);
        let y0 = self.y.min(frame_height);
        let x1 = self.x.saturating_add(self.width).min(frame_width);
        let y1 = self.y.saturating_add(self.height).min(frame_height);
        (x0, y0, x1, y1)
    }

    /// Centre point in drawing coordinates, saturating at `i32::MAX` for
    /// regions placed far outside any frame.
    pub fn center(&self) -> (i32, i32) {
        let mid = |start: u32, extent: u32| {
            i32::try_from(start.saturating_add(extent / 2)).unwrap_or(i32::MAX)
        };
        (mid(self.x, self.width), mid(self.y, self.height))
    }
}

/// The static layout of the car park plus the identities assigned to each space.
#[derive(Debug, Clone)]
pub struct RegionLayout {
    regions: Vec<Region>,
    assigned_labels: Vec<String>,
    expected_ids: Vec<u32>,
}

impl RegionLayout {
    /// Builds the layout from ordered top-left corners.
    /// `labels` must not be empty; it is cycled when shorter than `positions`.
    pub fn new(positions: &[(u32, u32)], size: (u32, u32), labels: &[&str]) -> Result<Self> {
        if labels.is_empty() {
            bail!("label alphabet is empty");
        }
        let (width, height) = size;
        let regions: Vec<Region> = positions
            .iter()
            .map(|&(x, y)| Region::new(x, y, width, height))
            .collect();
        let assigned_labels = (0..regions.len())
            .map(|i| labels[i % labels.len()].to_string())
            .collect();
        let expected_ids = (0..regions.len()).map(|i| i as u32 + 1).collect();
        Ok(Self {
            regions,
            assigned_labels,
            expected_ids,
        })
    }

    /// Layout using the default region size and label alphabet.
    pub fn with_defaults(positions: &[(u32, u32)]) -> Result<Self> {
        Self::new(positions, (REGION_WIDTH, REGION_HEIGHT), &DEFAULT_LABELS)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn assigned_label(&self, index: usize) -> &str {
        &self.assigned_labels[index]
    }

    pub fn expected_id(&self, index: usize) -> u32 {
        self.expected_ids[index]
    }
}

/// One stored corner, `[x, y]` on disk.
#[derive(Debug, Deserialize)]
struct StoredPosition(u32, u32);

/// Loads the persisted list of region corners: a JSON array of `[x, y]` pairs.
/// A missing, unreadable, malformed, or empty list is an error; there is nothing
/// to monitor without it.
pub fn load_positions(path: &Path) -> Result<Vec<(u32, u32)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read region list {}", path.display()))?;
    let stored: Vec<StoredPosition> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse region list {}", path.display()))?;
    let positions: Vec<(u32, u32)> = stored.into_iter().map(|StoredPosition(x, y)| (x, y)).collect();
    if positions.is_empty() {
        bail!("region list {} is empty; no regions to monitor", path.display());
    }
    log::info!("Loaded {} regions from {}", positions.len(), path.display());
    Ok(positions)
}
