// THEORY:
// The `tracker` module gives the stateless per-frame detections a persistent
// identity. It solves the data association problem with the same greedy
// heuristic as the reference workflow: build the full centroid-distance
// matrix between the previous frame's track slots and the current frame's
// detections, sort every pairwise distance ascending, and walk the sorted
// list accepting the first available (slot, detection) pair for each
// distance below the tracking threshold.
//
// Key contracts:
// 1.  **Track index = column position.** A track is not an owned object but a
//     stable column in the `FrameRegionTable`. A matched detection moves into
//     the column of the previous-frame slot it paired with; columns are never
//     recycled within a run.
// 2.  **Greedy, not optimal.** The sort-and-walk order decides conflicts:
//     once a detection is claimed or a slot resolved, later (larger-distance)
//     pairs touching them are consumed without effect. Ties in distance break
//     by row-major (slot, detection) order, which makes the assignment fully
//     deterministic.
// 3.  **Births at the end.** Detections left unclaimed after the walk —
//     including detections displaced out of their original column by an
//     accepted match — are appended as new columns at the end of the row,
//     never inserted into an existing matched column.
// 4.  **First frame is never matched against.** Frame numbering is 1-based
//     with row 0 reserved, so matching runs over the pairs (1,2), (2,3), ...

use tracing::debug;

use crate::core_modules::geometry::distance;
use crate::core_modules::region::{FrameRegionTable, Region};

/// Matches candidate regions across consecutive frames into persistent
/// track columns.
pub struct RegionTracker {
    threshold: f64,
}

impl RegionTracker {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Consumes the per-frame detections and produces the tracked table.
    ///
    /// Rows are resolved strictly in frame order because each pair's matching
    /// depends on the previous frame's resolved row.
    pub fn track(&self, frames: Vec<Vec<Region>>) -> FrameRegionTable {
        let mut rows: Vec<Vec<Option<Region>>> = frames
            .into_iter()
            .map(|frame| frame.into_iter().map(Some).collect())
            .collect();
        let mut counts: Vec<u32> = Vec::new();

        for frame in 2..rows.len() {
            let prev = rows[frame - 1].clone();
            if prev.is_empty() {
                // Nothing to match against: the detections keep their
                // positions and start fresh tracks.
                continue;
            }
            let curr: Vec<Region> = rows[frame].iter().flatten().cloned().collect();
            if curr.is_empty() {
                continue;
            }
            rows[frame] = self.match_pair(&prev, &curr, &mut counts);
        }

        debug!(
            tracks = rows.iter().map(Vec::len).max().unwrap_or(0),
            frames = rows.len().saturating_sub(1),
            "tracking complete"
        );
        FrameRegionTable::new(rows, counts)
    }

    /// Resolves one (prev, curr) frame pair into the current frame's row.
    fn match_pair(
        &self,
        prev: &[Option<Region>],
        curr: &[Region],
        counts: &mut Vec<u32>,
    ) -> Vec<Option<Region>> {
        let prev_len = prev.len();
        let curr_len = curr.len();

        // Full distance matrix. Pairs with an absent previous slot get a
        // synthetic distance past the threshold so the walk below can never
        // accept them, with a deterministic value per matrix position.
        let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(prev_len * curr_len);
        for (k, (slot, det)) in (0..prev_len)
            .flat_map(|a| (0..curr_len).map(move |b| (a, b)))
            .enumerate()
        {
            let d = match &prev[slot] {
                Some(region) => distance(region.centroid, curr[det].centroid),
                None => self.threshold + (1 + k) as f64,
            };
            pairs.push((d, slot, det));
        }

        // Ascending by distance; ties resolved in row-major scan order.
        pairs.sort_by(|x, y| {
            x.0.total_cmp(&y.0)
                .then(x.1.cmp(&y.1))
                .then(x.2.cmp(&y.2))
        });

        let mut resolved: Vec<Option<usize>> = vec![None; prev_len];
        let mut claimed = vec![false; curr_len];
        for &(d, slot, det) in &pairs {
            if d >= self.threshold {
                break;
            }
            if claimed[det] || resolved[slot].is_some() {
                continue;
            }
            resolved[slot] = Some(det);
            claimed[det] = true;
            if slot >= counts.len() {
                counts.resize(slot + 1, 0);
            }
            counts[slot] += 1;
        }

        // Assemble the row: matched detections occupy their track columns,
        // unmatched previous slots stay gaps.
        let mut row: Vec<Option<Region>> = vec![None; prev_len.max(curr_len)];
        for (slot, det) in resolved.iter().enumerate() {
            if let Some(det) = det {
                row[slot] = Some(curr[*det].clone());
            }
        }

        // Births: unclaimed detections whose column stayed free first, then
        // the ones displaced by an accepted match, each in detection order.
        let mut displaced = Vec::new();
        for det in 0..curr_len {
            if claimed[det] {
                continue;
            }
            if det < prev_len && resolved[det].is_some() {
                displaced.push(det);
            } else {
                row.push(Some(curr[det].clone()));
            }
        }
        for det in displaced {
            row.push(Some(curr[det].clone()));
        }

        row
    }
}
