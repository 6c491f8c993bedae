// THEORY:
// The `region` module holds the stateless data containers of the pipeline:
// a `Region` is one segmented area in one frame (produced by the external
// segmentation step, immutable once built), and the `FrameRegionTable` is the
// tracker's output — one row per frame where the column position IS the track
// index. A cell is `Option<Region>`: an absent detection is an explicit gap,
// never a zero-valued placeholder.

use serde::{Deserialize, Serialize};

use crate::core_modules::geometry::Centroid;

/// A labeled 2D area detected in a single frame.
///
/// `frame` follows the stack convention of the source data: frames are
/// numbered from 1 and index 0 is reserved (the first frame is never matched
/// against a predecessor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub frame: usize,
    pub centroid: Centroid,
    /// Every pixel coordinate contained in the region.
    pub pixels: Vec<(u32, u32)>,
}

impl Region {
    pub fn new(frame: usize, centroid: Centroid, pixels: Vec<(u32, u32)>) -> Self {
        Self {
            frame,
            centroid,
            pixels,
        }
    }

    /// Region area in pixels.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// Buckets a flat list of segmented regions into per-frame lists, indexed by
/// frame number. Row 0 stays reserved; regions keep their detection order
/// within a frame.
pub fn group_by_frame(regions: Vec<Region>) -> Vec<Vec<Region>> {
    let max_frame = regions.iter().map(|r| r.frame).max().unwrap_or(0);
    let mut frames: Vec<Vec<Region>> = vec![Vec::new(); max_frame + 1];
    for region in regions {
        let frame = region.frame;
        frames[frame].push(region);
    }
    frames
}

/// The tracker's output grid: `rows[frame][track]` is the region carrying
/// that track identity in that frame, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRegionTable {
    rows: Vec<Vec<Option<Region>>>,
    /// Per-track count of frame-pairs in which the track was matched.
    counts: Vec<u32>,
}

impl FrameRegionTable {
    pub(crate) fn new(rows: Vec<Vec<Option<Region>>>, counts: Vec<u32>) -> Self {
        Self { rows, counts }
    }

    /// Builds a table without cross-frame identity: every detection keeps its
    /// per-frame position and no match counters exist.
    pub fn untracked(frames: Vec<Vec<Region>>) -> Self {
        let rows = frames
            .into_iter()
            .map(|frame| frame.into_iter().map(Some).collect())
            .collect();
        Self {
            rows,
            counts: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Vec<Option<Region>>] {
        &self.rows
    }

    /// Number of frame rows, including the reserved row 0.
    pub fn frame_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of track columns: the widest row seen across all frames.
    pub fn track_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn get(&self, frame: usize, track: usize) -> Option<&Region> {
        self.rows.get(frame)?.get(track)?.as_ref()
    }

    /// Consecutive-appearance count for a track; tracks never matched report 0.
    pub fn count(&self, track: usize) -> u32 {
        self.counts.get(track).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(frame: usize, x: f64, y: f64) -> Region {
        Region::new(frame, Centroid::new(x, y), vec![(x as u32, y as u32)])
    }

    #[test]
    fn grouping_preserves_frame_order_and_reserves_row_zero() {
        let frames = group_by_frame(vec![
            region(2, 1.0, 1.0),
            region(1, 5.0, 5.0),
            region(2, 9.0, 9.0),
        ]);
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_empty());
        assert_eq!(frames[1].len(), 1);
        assert_eq!(frames[2].len(), 2);
        assert_eq!(frames[2][0].centroid.x, 1.0);
        assert_eq!(frames[2][1].centroid.x, 9.0);
    }

    #[test]
    fn untracked_table_has_no_counters_and_no_gaps() {
        let table = FrameRegionTable::untracked(group_by_frame(vec![
            region(1, 1.0, 1.0),
            region(1, 2.0, 2.0),
        ]));
        assert_eq!(table.track_count(), 2);
        assert_eq!(table.count(0), 0);
        assert!(table.get(1, 0).is_some());
        assert!(table.get(1, 1).is_some());
        assert!(table.get(0, 0).is_none());
    }
}
