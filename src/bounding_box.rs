use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned index-space box enclosing a labelled region.
///
/// Stored as a lower index and an extent per axis `(x, y, z)`; the inclusive
/// upper index is `lower + extent - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    lower: [usize; 3],
    extent: [usize; 3],
}

impl BoundingBox {
    /// Returns `None` when any extent is zero.
    pub fn new(lower: [usize; 3], extent: [usize; 3]) -> Option<Self> {
        if extent.contains(&0) {
            return None;
        }
        Some(Self { lower, extent })
    }

    /// Build from inclusive `(lower, upper)` index pairs.
    pub fn from_bounds(lower: [usize; 3], upper: [usize; 3]) -> Option<Self> {
        if (0..3).any(|axis| upper[axis] < lower[axis]) {
            return None;
        }
        Some(Self {
            lower,
            extent: [0, 1, 2].map(|axis| upper[axis] - lower[axis] + 1),
        })
    }

    pub fn lower(&self) -> [usize; 3] {
        self.lower
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    /// Inclusive upper index.
    pub fn upper(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| self.lower[axis] + self.extent[axis] - 1)
    }

    /// Bounds interleaved per axis: `(L_x, U_x, L_y, U_y, L_z, U_z)`.
    pub fn to_bounds(&self) -> [usize; 6] {
        let upper = self.upper();
        [
            self.lower[0],
            upper[0],
            self.lower[1],
            upper[1],
            self.lower[2],
            upper[2],
        ]
    }

    /// Number of axes along which the box is more than one voxel thick.
    pub fn dimensionality(&self) -> usize {
        self.extent.iter().filter(|&&e| e > 1).count()
    }

    pub fn voxel_count(&self) -> usize {
        self.extent.iter().product()
    }

    /// Whether the box lies within a grid of the given size.
    pub fn fits_within(&self, size: [usize; 3]) -> bool {
        (0..3).all(|axis| self.lower[axis] + self.extent[axis] <= size[axis])
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let lower = [0, 1, 2].map(|axis| self.lower[axis].min(other.lower[axis]));
        let upper_a = self.upper();
        let upper_b = other.upper();
        let upper = [0, 1, 2].map(|axis| upper_a[axis].max(upper_b[axis]));
        BoundingBox {
            lower,
            extent: [0, 1, 2].map(|axis| upper[axis] - lower[axis] + 1),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [lx, ly, lz] = self.lower;
        let [ex, ey, ez] = self.extent;
        write!(f, "({lx}, {ly}, {lz}, {ex}, {ey}, {ez})")
    }
}
