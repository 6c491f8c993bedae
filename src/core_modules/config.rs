// THEORY:
// All tunable behavior of the pipeline lives in one explicit, validated
// configuration structure. The original workflow collected these values
// through a dialog box at run time; here they are a plain struct so a run is
// fully described by its inputs and can be recorded alongside the output.

use serde::{Deserialize, Serialize};

use crate::core_modules::error::EnrichmentError;

/// Parameters for one enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Match regions into persistent tracks across frames. When disabled the
    /// per-frame intensities are reported without any cross-frame identity.
    pub tracking: bool,
    /// Side length in pixels of the square background sampling window.
    /// Must be a positive even number.
    pub background_box_dim: u32,
    /// Maximum centroid distance in pixels for two regions in consecutive
    /// frames to be considered the same filament.
    pub tracking_threshold: f64,
    /// Minimum number of frame-pairs a track must be matched in before it is
    /// eligible for the final report.
    pub min_consecutive_appearances: u32,
    /// Tracks whose average area reaches this value are excluded from the
    /// final report.
    pub max_filament_area: f64,
    /// Minimum region size in pixels. Consumed by the upstream segmentation
    /// step; carried here so a run records the complete parameter set.
    pub min_particle_size: f64,
    /// Normalize the ABP channel as foreground/background instead of
    /// foreground minus background.
    pub ratio_background: bool,
    /// Exclude ratio samples equal to exactly zero from the standard
    /// deviation. Reproduces the reference behavior; disable to include
    /// genuine zero-valued samples.
    pub sd_excludes_zero_ratios: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tracking: true,
            background_box_dim: 60,
            tracking_threshold: 25.0,
            min_consecutive_appearances: 10,
            max_filament_area: 1000.0,
            min_particle_size: 100.0,
            ratio_background: false,
            sd_excludes_zero_ratios: true,
        }
    }
}

impl EnrichmentConfig {
    /// Checks every parameter before any frame is processed. A bad value is
    /// fatal for the whole run.
    pub fn validate(&self) -> Result<(), EnrichmentError> {
        if self.background_box_dim == 0 || self.background_box_dim % 2 != 0 {
            return Err(EnrichmentError::OddBackgroundBox {
                dim: self.background_box_dim,
            });
        }
        if !(self.tracking_threshold > 0.0) {
            return Err(EnrichmentError::InvalidParameter {
                name: "tracking_threshold",
                reason: format!("must be positive, got {}", self.tracking_threshold),
            });
        }
        if self.min_consecutive_appearances == 0 {
            return Err(EnrichmentError::InvalidParameter {
                name: "min_consecutive_appearances",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.max_filament_area > 0.0) {
            return Err(EnrichmentError::InvalidParameter {
                name: "max_filament_area",
                reason: format!("must be positive, got {}", self.max_filament_area),
            });
        }
        Ok(())
    }
}
