// THEORY:
// A `ChannelStack` is the pipeline's read-only view of one image stack: the
// actin channel, the ABP channel, or the label stack produced by the
// segmentation step. Slices are 16-bit grayscale (microscopy depth) and are
// addressed with the same 1-based frame numbers the regions carry. The stack
// is shared immutably across all sampling calls within a frame; nothing in
// the pipeline ever writes to it.

use image::{ImageBuffer, Luma};

use crate::core_modules::error::EnrichmentError;

/// One 16-bit grayscale frame.
pub type Gray16Frame = ImageBuffer<Luma<u16>, Vec<u16>>;

/// An ordered stack of frames for one channel.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    name: String,
    slices: Vec<Gray16Frame>,
}

impl ChannelStack {
    pub fn new(name: impl Into<String>, slices: Vec<Gray16Frame>) -> Self {
        Self {
            name: name.into(),
            slices,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slices in the stack.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Dimensions of the first slice, if any. All slices of a valid stack
    /// share them; `slice` re-checks per frame against an expected size.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.slices.first().map(|s| s.dimensions())
    }

    /// Fetches the slice for a 1-based frame number.
    pub fn slice(&self, frame: usize) -> Result<&Gray16Frame, EnrichmentError> {
        if frame == 0 {
            return Err(EnrichmentError::MissingFrame {
                channel: self.name.clone(),
                frame,
            });
        }
        self.slices
            .get(frame - 1)
            .ok_or_else(|| EnrichmentError::MissingFrame {
                channel: self.name.clone(),
                frame,
            })
    }

    /// Verifies the slice for `frame` exists and has the expected size.
    pub fn checked_slice(
        &self,
        frame: usize,
        want: (u32, u32),
    ) -> Result<&Gray16Frame, EnrichmentError> {
        let slice = self.slice(frame)?;
        let got = slice.dimensions();
        if got != want {
            return Err(EnrichmentError::DimensionMismatch {
                channel: self.name.clone(),
                frame,
                got_w: got.0,
                got_h: got.1,
                want_w: want.0,
                want_h: want.1,
            });
        }
        Ok(slice)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a uniform frame; handy across the sampler and pipeline tests.
    pub fn uniform_frame(width: u32, height: u32, value: u16) -> Gray16Frame {
        ImageBuffer::from_pixel(width, height, Luma([value]))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::uniform_frame;
    use super::*;

    #[test]
    fn frames_are_one_based() {
        let stack = ChannelStack::new("actin", vec![uniform_frame(4, 4, 7)]);
        assert!(stack.slice(0).is_err());
        assert_eq!(stack.slice(1).unwrap().get_pixel(0, 0)[0], 7);
        assert!(matches!(
            stack.slice(2),
            Err(EnrichmentError::MissingFrame { frame: 2, .. })
        ));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let stack = ChannelStack::new("labels", vec![uniform_frame(4, 4, 0)]);
        assert!(stack.checked_slice(1, (4, 4)).is_ok());
        assert!(matches!(
            stack.checked_slice(1, (8, 8)),
            Err(EnrichmentError::DimensionMismatch { .. })
        ));
    }
}
