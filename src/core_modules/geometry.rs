// THEORY:
// Small, pure geometry helpers shared by the tracker and the intensity
// sampler: the centroid of a region, the Euclidean distance between two
// centroids, and the square background window placed around a centroid.
// Nothing in here touches pixel data or pipeline state.

use serde::{Deserialize, Serialize};

/// Center of a region in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

impl Centroid {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two centroids. Symmetric and non-negative.
pub fn distance(a: Centroid, b: Centroid) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Square window used to sample local background intensity around a region.
///
/// The origin follows the reference placement: the centroid is truncated to
/// whole pixels before the half-side offset is applied, so `dim` must be
/// even for the window to stay centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundBox {
    pub x0: i64,
    pub y0: i64,
    pub dim: u32,
}

impl BackgroundBox {
    pub fn centered_on(centroid: Centroid, dim: u32) -> Self {
        let half = (dim / 2) as i64;
        Self {
            x0: centroid.x.trunc() as i64 - half,
            y0: centroid.y.trunc() as i64 - half,
            dim,
        }
    }

    /// True when every pixel of the window lies inside a `width` x `height`
    /// image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x0 >= 0
            && self.y0 >= 0
            && self.x0 + self.dim as i64 <= width as i64
            && self.y0 + self.dim as i64 <= height as i64
    }

    /// Iterates the window's pixel coordinates in row-major order.
    /// Callers must have checked `fits_within` first.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (x0, y0, dim) = (self.x0, self.y0, self.dim as i64);
        (0..dim).flat_map(move |dy| {
            (0..dim).map(move |dx| ((x0 + dx) as u32, (y0 + dy) as u32))
        })
    }
}

/// Pre-tracking border check: a region whose background window would leave
/// the image must be dropped before tracking begins, otherwise its background
/// sample would be truncated and the ratio biased.
///
/// Uses the untruncated centroid, matching the reference exclusion rule.
pub fn window_in_bounds(centroid: Centroid, dim: u32, width: u32, height: u32) -> bool {
    let half = f64::from(dim) / 2.0;
    centroid.x - half >= 0.0
        && centroid.y - half >= 0.0
        && centroid.x + half <= f64::from(width)
        && centroid.y + half <= f64::from(height)
}
