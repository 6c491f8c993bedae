// THEORY:
// The `intensity` module turns one tracked region into numbers. For every
// (frame, track) cell with a present region it samples a square background
// window around the region's centroid, excluding every pixel the label frame
// assigns to *any* region, and sums both channels inside the region itself.
// From the four sums it derives background-corrected averages, the two
// normalized channel values and the enrichment ratio.
//
// Key contracts:
// 1.  **Records are computed once and immutable.** The sampler never touches
//     the source images; both channel stacks and the label stack are shared
//     read-only across all regions of a frame, so sampling within one frame
//     parallelizes freely.
// 2.  **Numeric failures are loud.** An empty background window, an empty
//     region or a zero normalized actin value is a distinct error for that
//     record — a NaN that slipped through here would silently poison every
//     downstream statistic.
// 3.  **Photobleaching trend.** As a per-frame side effect the sampler
//     accumulates `(fg_abp + back_abp) / (fg_area + back_area)` over the
//     frame's regions. That scalar is serialized per frame even when region
//     sampling runs in parallel.

use rayon::prelude::*;
use tracing::debug;

use crate::core_modules::error::EnrichmentError;
use crate::core_modules::geometry::BackgroundBox;
use crate::core_modules::region::{FrameRegionTable, Region};
use crate::core_modules::stack::{ChannelStack, Gray16Frame};

/// Derived quantities for one (frame, track) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityRecord {
    /// Background sums over window pixels with label 0.
    pub back_sum_act: f64,
    pub back_sum_abp: f64,
    /// Foreground sums over the region's own pixels.
    pub fg_sum_act: f64,
    pub fg_sum_abp: f64,
    /// Background pixel count.
    pub back_area: usize,
    /// Region pixel count.
    pub fg_area: usize,
    pub avg_back_act: f64,
    pub avg_back_abp: f64,
    pub avg_act: f64,
    pub avg_abp: f64,
    /// Background-corrected actin value (always additive).
    pub norm_act: f64,
    /// Background-corrected ABP value (additive or ratio-of-background).
    pub norm_abp: f64,
    /// Enrichment ratio: `norm_abp / norm_act`.
    pub ratio: f64,
}

/// The full (frame x track) grid of intensity records. Row 0 is reserved and
/// always empty, mirroring the region table.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    rows: Vec<Vec<Option<IntensityRecord>>>,
}

impl IntensityGrid {
    #[cfg(test)]
    pub(crate) fn from_rows(rows: Vec<Vec<Option<IntensityRecord>>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Option<IntensityRecord>>] {
        &self.rows
    }

    pub fn frame_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, frame: usize, track: usize) -> Option<&IntensityRecord> {
        self.rows.get(frame)?.get(track)?.as_ref()
    }
}

/// Computes intensity records for every present cell of a region table.
pub struct IntensitySampler {
    box_dim: u32,
    ratio_background: bool,
}

impl IntensitySampler {
    pub fn new(box_dim: u32, ratio_background: bool) -> Self {
        Self {
            box_dim,
            ratio_background,
        }
    }

    /// Samples the whole table. Returns the record grid and the per-frame
    /// photobleaching totals (indexed by frame, entry 0 unused).
    pub fn sample_stack(
        &self,
        table: &FrameRegionTable,
        actin: &ChannelStack,
        abp: &ChannelStack,
        labels: &ChannelStack,
    ) -> Result<(IntensityGrid, Vec<f64>), EnrichmentError> {
        let frame_count = table.frame_count();
        let mut rows: Vec<Vec<Option<IntensityRecord>>> = Vec::with_capacity(frame_count);
        let mut photobleach = vec![0.0; frame_count];

        for frame in 0..frame_count {
            let cells = &table.rows()[frame];
            if frame == 0 || cells.is_empty() {
                rows.push(Vec::new());
                continue;
            }

            let act_frame = actin.slice(frame)?;
            let dims = act_frame.dimensions();
            let abp_frame = abp.checked_slice(frame, dims)?;
            let label_frame = labels.checked_slice(frame, dims)?;

            // Sampling is independent per region; the accumulator below runs
            // over the collected records in order.
            let records: Vec<Option<IntensityRecord>> = cells
                .par_iter()
                .enumerate()
                .map(|(track, cell)| {
                    cell.as_ref()
                        .map(|region| {
                            self.sample_region(region, frame, track, act_frame, abp_frame, label_frame)
                        })
                        .transpose()
                })
                .collect::<Result<_, EnrichmentError>>()?;

            for record in records.iter().flatten() {
                photobleach[frame] += (record.fg_sum_abp + record.back_sum_abp)
                    / (record.fg_area + record.back_area) as f64;
            }
            rows.push(records);
        }

        debug!(frames = frame_count.saturating_sub(1), "intensity sampling complete");
        Ok((IntensityGrid { rows }, photobleach))
    }

    /// Samples a single region against one frame of each stack.
    pub fn sample_region(
        &self,
        region: &Region,
        frame: usize,
        track: usize,
        act_frame: &Gray16Frame,
        abp_frame: &Gray16Frame,
        label_frame: &Gray16Frame,
    ) -> Result<IntensityRecord, EnrichmentError> {
        let (width, height) = act_frame.dimensions();
        let window = BackgroundBox::centered_on(region.centroid, self.box_dim);
        if !window.fits_within(width, height) {
            return Err(EnrichmentError::BoxOutOfBounds {
                frame,
                x: region.centroid.x,
                y: region.centroid.y,
            });
        }

        let mut back_sum_act = 0.0;
        let mut back_sum_abp = 0.0;
        let mut back_area = 0usize;
        for (x, y) in window.pixels() {
            if label_frame.get_pixel(x, y)[0] == 0 {
                back_sum_act += f64::from(act_frame.get_pixel(x, y)[0]);
                back_sum_abp += f64::from(abp_frame.get_pixel(x, y)[0]);
                back_area += 1;
            }
        }

        if region.pixels.is_empty() {
            return Err(EnrichmentError::EmptyRegion { frame, track });
        }
        let mut fg_sum_act = 0.0;
        let mut fg_sum_abp = 0.0;
        for &(x, y) in &region.pixels {
            let act = act_frame
                .get_pixel_checked(x, y)
                .ok_or(EnrichmentError::PixelOutOfBounds { frame, track, x, y })?;
            fg_sum_act += f64::from(act[0]);
            fg_sum_abp += f64::from(abp_frame.get_pixel(x, y)[0]);
        }
        let fg_area = region.pixels.len();

        if back_area == 0 {
            return Err(EnrichmentError::EmptyBackground { frame, track });
        }

        let avg_back_act = back_sum_act / back_area as f64;
        let avg_back_abp = back_sum_abp / back_area as f64;
        let avg_act = fg_sum_act / fg_area as f64;
        let avg_abp = fg_sum_abp / fg_area as f64;

        let norm_act = avg_act - avg_back_act;
        let norm_abp = if self.ratio_background {
            avg_abp / avg_back_abp
        } else {
            avg_abp - avg_back_abp
        };
        let ratio = norm_abp / norm_act;
        if !ratio.is_finite() {
            return Err(EnrichmentError::NonFiniteRatio { frame, track });
        }

        Ok(IntensityRecord {
            back_sum_act,
            back_sum_abp,
            fg_sum_act,
            fg_sum_abp,
            back_area,
            fg_area,
            avg_back_act,
            avg_back_abp,
            avg_act,
            avg_abp,
            norm_act,
            norm_abp,
            ratio,
        })
    }
}
