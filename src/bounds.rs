//! Cubic plot bounds shared by both comparison panels.
//!
//! Matching cubic limits on every axis keep the geometry of a cloud
//! undistorted and make the two panels directly comparable.

use std::ops::Range;

use ndarray::{ArrayView2, Axis};
use thiserror::Error;

/// Half-width used when every axis of a cloud has zero extent.
const DEGENERATE_HALF_WIDTH: f32 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundsError {
    #[error("cannot compute bounds of an empty point set")]
    Empty,
    #[error("points must have 3 columns but found {0}")]
    Dimensions(usize),
}

/// Axis-aligned cube centred on the midpoint of a cloud's extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBounds {
    /// Midpoint of each axis' extent.
    pub centre: [f32; 3],
    /// Half of the largest axis span.
    pub max_range: f32,
}

impl CubicBounds {
    /// Compute the cube for an `[N, 3]` coordinate array.
    ///
    /// # Examples
    ///
    /// ```
    /// use attention_viz::CubicBounds;
    /// use ndarray::array;
    ///
    /// let points = array![[0.0, 0.0, 0.0], [2.0, 4.0, 1.0]];
    /// let bounds = CubicBounds::from_points(points.view()).unwrap();
    /// assert_eq!(bounds.max_range, 2.0);
    /// assert_eq!(bounds.centre, [1.0, 2.0, 0.5]);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`BoundsError`] when the array is empty or not three columns
    /// wide.
    #[expect(clippy::float_arithmetic, reason = "extent arithmetic")]
    pub fn from_points(points: ArrayView2<'_, f32>) -> Result<Self, BoundsError> {
        let (rows, cols) = points.dim();
        if cols != 3 {
            return Err(BoundsError::Dimensions(cols));
        }
        if rows == 0 {
            return Err(BoundsError::Empty);
        }
        let mut centre = [0.0_f32; 3];
        let mut largest_span = 0.0_f32;
        for (axis, column) in points.axis_iter(Axis(1)).enumerate() {
            let (min, max) = column
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if let Some(slot) = centre.get_mut(axis) {
                *slot = (max + min) * 0.5;
            }
            largest_span = largest_span.max(max - min);
        }
        let max_range = largest_span / 2.0;
        Ok(Self {
            centre,
            max_range: if max_range > 0.0 {
                max_range
            } else {
                DEGENERATE_HALF_WIDTH
            },
        })
    }

    /// Plot limits `centre ± max_range` for the given axis (0 = x, 1 = y,
    /// 2 = z).
    #[must_use]
    #[expect(clippy::float_arithmetic, reason = "limit arithmetic")]
    pub fn limits(&self, axis: usize) -> Range<f32> {
        let mid = self.centre.get(axis).copied().unwrap_or_default();
        (mid - self.max_range)..(mid + self.max_range)
    }
}
