// THEORY:
// The `report` module assembles the final output records. In tracked mode it
// emits a dense grid: one row for every (frame, included-track) pair, with
// absent records rendered as zeroed intensity fields carrying their real
// frame and track indices — downstream tooling relies on the grid shape, not
// on row presence. A second artifact regroups the same rows by ascending
// track index with a stable sort (original row order is the secondary key).
// In untracked mode rows are flattened per frame with only the directly
// computed intensities: no identity, no aggregation, no filtering.
//
// Rendering is deliberately separated from writing: every artifact is built
// as one complete in-memory buffer so a failed write never leaves a
// truncated file behind.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core_modules::aggregator::{RatioStdDev, TrackSummary};
use crate::core_modules::intensity::IntensityGrid;
use crate::core_modules::region::{FrameRegionTable, Region};

pub const TRACKED_HEADER: &str = "FrameNo,Filament,Area,NormalizedAvgActin,NormalizedAvgABP,ABP/Act,AvgRatio,StandardDev,FrameNo,TotABPInten,,NumberOfFilaments";
pub const UNTRACKED_HEADER: &str = "FrameNo,Area,NormalizedAvgActin,NormalizedAvgABP,ABP/Act";

/// One output row of the tracked report.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRow {
    pub frame: usize,
    pub filament: usize,
    pub area: f64,
    pub norm_act: f64,
    pub norm_abp: f64,
    pub ratio: f64,
    pub avg_ratio: f64,
    pub std_dev: RatioStdDev,
    /// Photobleaching total of this row's frame.
    pub tot_abp: f64,
    /// Number of tracks that met the consecutive-appearance threshold.
    pub filament_count: usize,
}

/// One output row of the untracked report.
#[derive(Debug, Clone, PartialEq)]
pub struct UntrackedRow {
    pub frame: usize,
    pub area: f64,
    pub norm_act: f64,
    pub norm_abp: f64,
    pub ratio: f64,
}

/// A (frame, track, region) triple of the serialized region-set artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSetEntry {
    pub frame: usize,
    pub filament: usize,
    pub region: Region,
}

/// Builds the dense tracked grid in frame-major order.
pub fn build_tracked_rows(
    grid: &IntensityGrid,
    summary: &TrackSummary,
    photobleach: &[f64],
) -> Vec<TrackedRow> {
    let mut rows = Vec::new();
    for frame in 1..grid.frame_count() {
        let tot_abp = photobleach.get(frame).copied().unwrap_or(0.0);
        for track in summary.included_tracks() {
            let stats = &summary.stats[&track];
            let mut row = TrackedRow {
                frame,
                filament: track,
                area: 0.0,
                norm_act: 0.0,
                norm_abp: 0.0,
                ratio: 0.0,
                avg_ratio: stats.avg_ratio,
                std_dev: stats.std_dev,
                tot_abp,
                filament_count: summary.filament_count,
            };
            if let Some(record) = grid.get(frame, track) {
                row.area = record.fg_area as f64;
                row.norm_act = record.norm_act;
                row.norm_abp = record.norm_abp;
                row.ratio = record.ratio;
            }
            rows.push(row);
        }
    }
    rows
}

/// Stable regroup by ascending track index; rows keep their original order
/// within a track. Sorting an already track-sorted input is a no-op.
pub fn sort_by_filament(rows: &[TrackedRow]) -> Vec<TrackedRow> {
    let mut by_track: BTreeMap<usize, Vec<TrackedRow>> = BTreeMap::new();
    for row in rows {
        by_track.entry(row.filament).or_default().push(row.clone());
    }
    by_track.into_values().flatten().collect()
}

pub fn render_tracked_csv(rows: &[TrackedRow]) -> String {
    let mut out = String::from(TRACKED_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},,{}\n",
            row.frame,
            row.filament,
            row.area,
            row.norm_act,
            row.norm_abp,
            row.ratio,
            row.avg_ratio,
            row.std_dev,
            row.frame,
            row.tot_abp,
            row.filament_count,
        ));
    }
    out
}

/// Flattens the grid per frame without cross-frame identity. Both normalized
/// values are additive here regardless of the background-ratio mode, matching
/// the reference untracked output.
pub fn build_untracked_rows(grid: &IntensityGrid) -> Vec<UntrackedRow> {
    let mut rows = Vec::new();
    for frame in 1..grid.frame_count() {
        for record in grid.rows()[frame].iter().flatten() {
            let norm_act = record.avg_act - record.avg_back_act;
            let norm_abp = record.avg_abp - record.avg_back_abp;
            rows.push(UntrackedRow {
                frame,
                area: record.fg_area as f64,
                norm_act,
                norm_abp,
                ratio: norm_abp / norm_act,
            });
        }
    }
    rows
}

pub fn render_untracked_csv(rows: &[UntrackedRow]) -> String {
    let mut out = String::from(UNTRACKED_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            row.frame, row.area, row.norm_act, row.norm_abp, row.ratio,
        ));
    }
    out
}

/// Collects every present region of every included track, in frame-major
/// order, for the serialized region-set artifact.
pub fn build_region_set(table: &FrameRegionTable, summary: &TrackSummary) -> Vec<RegionSetEntry> {
    let mut entries = Vec::new();
    for frame in 1..table.frame_count() {
        for track in summary.included_tracks() {
            if let Some(region) = table.get(frame, track) {
                entries.push(RegionSetEntry {
                    frame,
                    filament: track,
                    region: region.clone(),
                });
            }
        }
    }
    entries
}
