// THEORY:
// The `pipeline` module is the top-level API for the whole quantification
// engine. It wires the architectural layers together in their contractual
// order: border prefilter, region tracking, intensity sampling, track
// aggregation and report building. The run is a strictly sequential batch —
// every frame's tracking depends on the previous frame's resolved row — and
// it is atomic: either the run completes and artifacts are written from
// complete buffers, or it fails and nothing of this run is left on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core_modules::aggregator::TrackAggregator;
use crate::core_modules::geometry::window_in_bounds;
use crate::core_modules::intensity::IntensitySampler;
use crate::core_modules::report::{
    build_region_set, build_tracked_rows, build_untracked_rows, render_tracked_csv,
    render_untracked_csv, sort_by_filament,
};
use crate::core_modules::tracker::RegionTracker;

// Re-export key data structures for the public API.
pub use crate::core_modules::aggregator::{RatioStdDev, TrackStatistics, TrackSummary};
pub use crate::core_modules::config::EnrichmentConfig;
pub use crate::core_modules::error::EnrichmentError;
pub use crate::core_modules::geometry::Centroid;
pub use crate::core_modules::intensity::{IntensityGrid, IntensityRecord};
pub use crate::core_modules::region::{group_by_frame, FrameRegionTable, Region};
pub use crate::core_modules::report::{RegionSetEntry, TrackedRow, UntrackedRow};
pub use crate::core_modules::stack::{ChannelStack, Gray16Frame};

/// The complete result of one enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichmentOutput {
    pub table: FrameRegionTable,
    pub grid: IntensityGrid,
    /// Per-frame photobleaching totals, indexed by frame number.
    pub photobleach: Vec<f64>,
    /// Per-track statistics; `None` when tracking is disabled.
    pub summary: Option<TrackSummary>,
    pub tracked_rows: Vec<TrackedRow>,
    pub untracked_rows: Vec<UntrackedRow>,
    pub region_set: Vec<RegionSetEntry>,
    /// Regions dropped by the border prefilter before tracking.
    pub excluded_border_regions: usize,
}

/// The main, top-level struct for the quantification engine.
pub struct EnrichmentPipeline {
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    /// Validates the configuration up front; a bad parameter never reaches
    /// the processing stages.
    pub fn new(config: EnrichmentConfig) -> Result<Self, EnrichmentError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Runs the full pipeline over a segmented region list and the three
    /// co-registered stacks.
    pub fn run(
        &self,
        regions: Vec<Region>,
        actin: &ChannelStack,
        abp: &ChannelStack,
        labels: &ChannelStack,
    ) -> Result<EnrichmentOutput, EnrichmentError> {
        let (width, height) = actin.dimensions().ok_or_else(|| EnrichmentError::MissingFrame {
            channel: actin.name().to_string(),
            frame: 1,
        })?;

        // Regions whose background window would leave the image are dropped
        // before tracking; sampling them would bias the background estimate.
        let dim = self.config.background_box_dim;
        let total = regions.len();
        let kept: Vec<Region> = regions
            .into_iter()
            .filter(|r| window_in_bounds(r.centroid, dim, width, height))
            .collect();
        let excluded_border_regions = total - kept.len();
        if excluded_border_regions > 0 {
            debug!(
                excluded = excluded_border_regions,
                "dropped regions with out-of-bounds background windows"
            );
        }

        let frames = group_by_frame(kept);
        let table = if self.config.tracking {
            RegionTracker::new(self.config.tracking_threshold).track(frames)
        } else {
            FrameRegionTable::untracked(frames)
        };

        let sampler = IntensitySampler::new(dim, self.config.ratio_background);
        let (grid, photobleach) = sampler.sample_stack(&table, actin, abp, labels)?;

        let mut output = EnrichmentOutput {
            table,
            grid,
            photobleach,
            summary: None,
            tracked_rows: Vec::new(),
            untracked_rows: Vec::new(),
            region_set: Vec::new(),
            excluded_border_regions,
        };

        if self.config.tracking {
            let aggregator = TrackAggregator::new(
                self.config.min_consecutive_appearances,
                self.config.max_filament_area,
                self.config.sd_excludes_zero_ratios,
            );
            let summary = aggregator.aggregate(&output.table, &output.grid);
            info!(
                filaments = summary.filament_count,
                included = summary.included_tracks().count(),
                "tracking summary"
            );
            output.tracked_rows = build_tracked_rows(&output.grid, &summary, &output.photobleach);
            output.region_set = build_region_set(&output.table, &summary);
            output.summary = Some(summary);
        } else {
            output.untracked_rows = build_untracked_rows(&output.grid);
        }

        Ok(output)
    }
}

impl EnrichmentOutput {
    /// Writes every artifact of this run into `dir`, named after `stem`.
    /// Each file is rendered into one complete buffer first, then written in
    /// a single call, so no artifact is ever left half-written by this run.
    pub fn write_artifacts(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, EnrichmentError> {
        let mut written = Vec::new();

        if self.summary.is_some() {
            let tracked = dir.join(format!("{stem}_TrackingDataOutput.csv"));
            write_complete(&tracked, &render_tracked_csv(&self.tracked_rows))?;
            written.push(tracked);

            let sorted = dir.join(format!("{stem}_sorted_output.csv"));
            write_complete(&sorted, &render_tracked_csv(&sort_by_filament(&self.tracked_rows)))?;
            written.push(sorted);

            let region_set = dir.join(format!("{stem}_RoiSet.json"));
            let json = serde_json::to_string_pretty(&self.region_set).map_err(|e| {
                EnrichmentError::Io {
                    path: region_set.clone(),
                    source: e.into(),
                }
            })?;
            write_complete(&region_set, &json)?;
            written.push(region_set);
        } else {
            let untracked = dir.join(format!("{stem}_DataOutput.csv"));
            write_complete(&untracked, &render_untracked_csv(&self.untracked_rows))?;
            written.push(untracked);
        }

        for path in &written {
            info!(path = %path.display(), "artifact written");
        }
        Ok(written)
    }
}

fn write_complete(path: &Path, contents: &str) -> Result<(), EnrichmentError> {
    fs::write(path, contents).map_err(|source| EnrichmentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::stack::test_support::uniform_frame;
    use image::Luma;

    fn square_region(frame: usize, cx: u32, cy: u32) -> Region {
        let mut pixels = Vec::new();
        for y in cy - 1..=cy {
            for x in cx - 1..=cx {
                pixels.push((x, y));
            }
        }
        Region::new(frame, Centroid::new(cx as f64, cy as f64), pixels)
    }

    /// Three channel stacks where every region is 30/45 on a 10/5 background.
    fn stacks_for(frames: &[Vec<Region>]) -> (ChannelStack, ChannelStack, ChannelStack) {
        let n = frames.len().saturating_sub(1);
        let mut act_frames = Vec::new();
        let mut abp_frames = Vec::new();
        let mut label_frames = Vec::new();
        for f in 1..=n {
            let mut act = uniform_frame(100, 100, 10);
            let mut abp = uniform_frame(100, 100, 5);
            let mut labels = uniform_frame(100, 100, 0);
            for region in &frames[f] {
                for &(x, y) in &region.pixels {
                    act.put_pixel(x, y, Luma([30]));
                    abp.put_pixel(x, y, Luma([45]));
                    labels.put_pixel(x, y, Luma([1]));
                }
            }
            act_frames.push(act);
            abp_frames.push(abp);
            label_frames.push(labels);
        }
        (
            ChannelStack::new("actin", act_frames),
            ChannelStack::new("abp", abp_frames),
            ChannelStack::new("labels", label_frames),
        )
    }

    fn config() -> EnrichmentConfig {
        EnrichmentConfig {
            background_box_dim: 10,
            tracking_threshold: 5.0,
            min_consecutive_appearances: 2,
            max_filament_area: 1000.0,
            ..EnrichmentConfig::default()
        }
    }

    #[test]
    fn tracked_run_produces_a_dense_grid_over_included_tracks() {
        // One filament drifting for three frames, one speck in frame 2 only.
        let mut regions = vec![
            square_region(1, 50, 50),
            square_region(2, 51, 50),
            square_region(3, 52, 50),
            square_region(2, 20, 20),
        ];
        regions.sort_by_key(|r| r.frame);
        let frames = group_by_frame(regions.clone());
        let (actin, abp, labels) = stacks_for(&frames);

        let pipeline = EnrichmentPipeline::new(config()).unwrap();
        let output = pipeline.run(regions, &actin, &abp, &labels).unwrap();

        let summary = output.summary.as_ref().unwrap();
        assert_eq!(summary.filament_count, 1);
        assert!(summary.is_included(0));

        // Dense grid: 3 frames x 1 included track.
        assert_eq!(output.tracked_rows.len(), 3);
        assert!(output.tracked_rows.iter().all(|r| r.filament == 0));
        // norm_act = 30 - 10, norm_abp = 45 - 5, ratio = 2.
        assert_eq!(output.tracked_rows[0].norm_act, 20.0);
        assert_eq!(output.tracked_rows[0].ratio, 2.0);
        // The region set carries the three appearances of the filament.
        assert_eq!(output.region_set.len(), 3);
    }

    #[test]
    fn border_regions_are_excluded_before_tracking() {
        let regions = vec![
            square_region(1, 50, 50),
            square_region(1, 3, 3), // window would leave the image
            square_region(2, 50, 50),
        ];
        let frames = group_by_frame(regions.clone());
        let (actin, abp, labels) = stacks_for(&frames);

        let pipeline = EnrichmentPipeline::new(config()).unwrap();
        let output = pipeline.run(regions, &actin, &abp, &labels).unwrap();

        assert_eq!(output.excluded_border_regions, 1);
        assert_eq!(output.table.track_count(), 1);
    }

    #[test]
    fn untracked_run_flattens_per_frame_without_filtering() {
        let regions = vec![
            square_region(1, 50, 50),
            square_region(1, 20, 20),
            square_region(2, 80, 80),
        ];
        let frames = group_by_frame(regions.clone());
        let (actin, abp, labels) = stacks_for(&frames);

        let pipeline = EnrichmentPipeline::new(EnrichmentConfig {
            tracking: false,
            ..config()
        })
        .unwrap();
        let output = pipeline.run(regions, &actin, &abp, &labels).unwrap();

        assert!(output.summary.is_none());
        assert!(output.tracked_rows.is_empty());
        assert_eq!(output.untracked_rows.len(), 3);
        assert_eq!(output.untracked_rows[0].ratio, 2.0);
    }

    #[test]
    fn invalid_config_never_reaches_processing() {
        let bad = EnrichmentConfig {
            background_box_dim: 9,
            ..EnrichmentConfig::default()
        };
        assert!(EnrichmentPipeline::new(bad).is_err());
    }
}
