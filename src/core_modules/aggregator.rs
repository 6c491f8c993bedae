// THEORY:
// The `aggregator` module reduces the (frame x track) intensity grid to one
// statistics record per track. It is strictly two-pass: first accumulate
// area and ratio sums plus the raw ratio samples for every track that was
// matched often enough, then finalize averages and the sample standard
// deviation. Nothing is filtered until the whole grid exists, so running the
// aggregator twice over the same table is guaranteed to produce identical
// results.
//
// The standard deviation reproduces a quirk of the reference workflow:
// samples equal to exactly zero are excluded from the deviation sum (while
// the mean is taken over all samples). The original kept ratios in a
// zero-initialized buffer, so "no value" and "ratio of zero" were
// indistinguishable there. The exclusion is kept as the default contract and
// exposed as a configuration switch.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::core_modules::intensity::IntensityGrid;
use crate::core_modules::region::FrameRegionTable;

/// Sample standard deviation of a track's ratio values, or the explicit
/// condition that fewer than two usable samples exist. Never silently zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatioStdDev {
    Value(f64),
    InsufficientSamples,
}

impl fmt::Display for RatioStdDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatioStdDev::Value(v) => write!(f, "{v}"),
            RatioStdDev::InsufficientSamples => write!(f, "NA"),
        }
    }
}

/// Final per-track statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStatistics {
    pub track: usize,
    /// Number of frame-pairs in which the track was matched.
    pub consecutive_count: u32,
    pub avg_area: f64,
    pub avg_ratio: f64,
    pub std_dev: RatioStdDev,
    /// Raw ratio samples the statistics were computed from.
    pub samples: Vec<f64>,
    /// Whether the track passes the area gate and is reported.
    pub included: bool,
}

/// Statistics for every track that met the consecutive-appearance threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    /// Keyed by track index; iteration order is ascending.
    pub stats: BTreeMap<usize, TrackStatistics>,
    /// Count of tracks meeting the consecutive-appearance threshold
    /// (before the area gate), reported in the CSV.
    pub filament_count: usize,
}

impl TrackSummary {
    pub fn is_included(&self, track: usize) -> bool {
        self.stats.get(&track).is_some_and(|s| s.included)
    }

    /// Ascending track indices that pass both inclusion conditions.
    pub fn included_tracks(&self) -> impl Iterator<Item = usize> + '_ {
        self.stats
            .values()
            .filter(|s| s.included)
            .map(|s| s.track)
    }
}

/// Filters tracks and computes their statistics from the full grid.
pub struct TrackAggregator {
    min_consecutive: u32,
    max_area: f64,
    sd_excludes_zero: bool,
}

impl TrackAggregator {
    pub fn new(min_consecutive: u32, max_area: f64, sd_excludes_zero: bool) -> Self {
        Self {
            min_consecutive,
            max_area,
            sd_excludes_zero,
        }
    }

    pub fn aggregate(&self, table: &FrameRegionTable, grid: &IntensityGrid) -> TrackSummary {
        let mut stats = BTreeMap::new();
        let mut filament_count = 0;

        for track in 0..table.track_count() {
            let count = table.count(track);
            if count < self.min_consecutive {
                continue;
            }
            filament_count += 1;

            // Pass 1: accumulate over every frame where the track is present.
            let mut area_sum = 0.0;
            let mut ratio_sum = 0.0;
            let mut samples = Vec::new();
            for frame in 1..grid.frame_count() {
                if let Some(record) = grid.get(frame, track) {
                    area_sum += record.fg_area as f64;
                    ratio_sum += record.ratio;
                    samples.push(record.ratio);
                }
            }
            if samples.is_empty() {
                continue;
            }

            // Pass 2: finalize.
            let n = samples.len() as f64;
            let avg_area = area_sum / n;
            let avg_ratio = ratio_sum / n;
            let std_dev = ratio_std_dev(avg_ratio, &samples, self.sd_excludes_zero);

            stats.insert(
                track,
                TrackStatistics {
                    track,
                    consecutive_count: count,
                    avg_area,
                    avg_ratio,
                    std_dev,
                    samples,
                    included: avg_area < self.max_area,
                },
            );
        }

        debug!(filament_count, "aggregation complete");
        TrackSummary {
            stats,
            filament_count,
        }
    }
}

/// Sample standard deviation with Bessel's correction. Deviations are summed
/// over the usable samples (optionally excluding exact zeros) against the
/// all-samples mean, matching the reference computation.
fn ratio_std_dev(mean: f64, samples: &[f64], exclude_zeros: bool) -> RatioStdDev {
    let usable = samples.iter().filter(|&&s| !exclude_zeros || s != 0.0);
    let mut sum_sq = 0.0;
    let mut k = 0usize;
    for &s in usable {
        sum_sq += (s - mean) * (s - mean);
        k += 1;
    }
    if k < 2 {
        return RatioStdDev::InsufficientSamples;
    }
    RatioStdDev::Value((sum_sq / (k - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Centroid;
    use crate::core_modules::intensity::IntensitySampler;
    use crate::core_modules::region::Region;
    use crate::core_modules::stack::test_support::uniform_frame;
    use crate::core_modules::stack::ChannelStack;
    use crate::core_modules::tracker::RegionTracker;
    use image::Luma;

    #[test]
    fn bessel_divisor_uses_nonzero_sample_count() {
        // Mean over all samples is 2.0; the zero is excluded from the
        // deviation sum, leaving k = 2 and divisor k - 1 = 1.
        let sd = ratio_std_dev(2.0, &[2.0, 0.0, 4.0], true);
        assert_eq!(sd, RatioStdDev::Value(2.0));
    }

    #[test]
    fn zero_samples_count_when_exclusion_is_disabled() {
        let sd = ratio_std_dev(2.0, &[2.0, 0.0, 4.0], false);
        // Deviations 0, 4, 4 over divisor 2.
        assert_eq!(sd, RatioStdDev::Value(2.0_f64.sqrt() * 2.0));
    }

    #[test]
    fn fewer_than_two_usable_samples_is_insufficient() {
        assert_eq!(
            ratio_std_dev(1.0, &[1.0], true),
            RatioStdDev::InsufficientSamples
        );
        assert_eq!(
            ratio_std_dev(0.5, &[1.0, 0.0], true),
            RatioStdDev::InsufficientSamples
        );
        assert_eq!(
            ratio_std_dev(0.0, &[], true),
            RatioStdDev::InsufficientSamples
        );
    }

    #[test]
    fn insufficient_samples_renders_as_na() {
        assert_eq!(RatioStdDev::InsufficientSamples.to_string(), "NA");
        assert_eq!(RatioStdDev::Value(1.5).to_string(), "1.5");
    }

    /// Builds a small tracked scenario: one filament drifting slowly across
    /// four frames plus one single-frame speck.
    fn tracked_scenario() -> (FrameRegionTable, IntensityGrid) {
        let region = |frame: usize, cx: u32| {
            let pixels = vec![(cx, 50), (cx + 1, 50)];
            Region::new(frame, Centroid::new(cx as f64, 50.0), pixels)
        };

        let mut frames = vec![Vec::new()];
        for f in 1..=4 {
            let mut in_frame = vec![region(f, 48 + f as u32)];
            if f == 2 {
                in_frame.push(region(f, 20));
            }
            frames.push(in_frame);
        }

        let table = RegionTracker::new(5.0).track(frames);

        let mut act_frames = Vec::new();
        let mut abp_frames = Vec::new();
        let mut label_frames = Vec::new();
        for f in 1..=4usize {
            let mut act = uniform_frame(100, 100, 10);
            let mut abp = uniform_frame(100, 100, 5);
            let mut labels = uniform_frame(100, 100, 0);
            for cell in table.rows()[f].iter().flatten() {
                for &(x, y) in &cell.pixels {
                    act.put_pixel(x, y, Luma([30]));
                    abp.put_pixel(x, y, Luma([45]));
                    labels.put_pixel(x, y, Luma([1]));
                }
            }
            act_frames.push(act);
            abp_frames.push(abp);
            label_frames.push(labels);
        }

        let sampler = IntensitySampler::new(10, false);
        let (grid, _) = sampler
            .sample_stack(
                &table,
                &ChannelStack::new("actin", act_frames),
                &ChannelStack::new("abp", abp_frames),
                &ChannelStack::new("labels", label_frames),
            )
            .unwrap();
        (table, grid)
    }

    #[test]
    fn tracks_below_the_consecutive_threshold_are_dropped() {
        let (table, grid) = tracked_scenario();
        let summary = TrackAggregator::new(3, 1000.0, true).aggregate(&table, &grid);
        // The drifting filament was matched 3 times; the speck never.
        assert_eq!(summary.filament_count, 1);
        assert!(summary.is_included(0));
        assert!(!summary.is_included(1));
    }

    #[test]
    fn area_gate_excludes_but_still_counts_the_track() {
        let (table, grid) = tracked_scenario();
        // Average area is 2 pixels; an area cap of 2 excludes it (< is strict)
        // while the filament count still reports it.
        let summary = TrackAggregator::new(3, 2.0, true).aggregate(&table, &grid);
        assert_eq!(summary.filament_count, 1);
        assert!(!summary.is_included(0));
        assert_eq!(summary.included_tracks().count(), 0);
    }

    #[test]
    fn statistics_match_the_sampled_records() {
        let (table, grid) = tracked_scenario();
        let summary = TrackAggregator::new(3, 1000.0, true).aggregate(&table, &grid);
        let stats = &summary.stats[&0];

        assert_eq!(stats.consecutive_count, 3);
        assert_eq!(stats.samples.len(), 4);
        assert_eq!(stats.avg_area, 2.0);
        // Identical records in every frame: mean equals each sample and the
        // deviation collapses to zero.
        let expected_ratio = grid.get(1, 0).unwrap().ratio;
        assert_eq!(stats.avg_ratio, expected_ratio);
        assert_eq!(stats.std_dev, RatioStdDev::Value(0.0));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let (table, grid) = tracked_scenario();
        let aggregator = TrackAggregator::new(3, 1000.0, true);
        let first = aggregator.aggregate(&table, &grid);
        let second = aggregator.aggregate(&table, &grid);
        assert_eq!(first, second);
    }
}
