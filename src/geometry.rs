//! Voxel grid geometry shared by images and masks.
//!
//! A [`VolumetricGrid`] maps the continuous index space of a volume onto
//! physical space:
//!
//! `physical = origin + direction * (spacing ⊙ index)`
//!
//! Index vectors are ordered `(x, y, z)`. Voxel arrays are stored
//! `(depth, height, width)`, i.e. `[z, y, x]`, see [`VolumetricGrid::shape`].

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Grid size must be at least 1 along every axis, got {0:?}")]
    EmptySize([usize; 3]),

    #[error("Spacing must be finite and positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("Origin must be finite, got {0:?}")]
    InvalidOrigin([f64; 3]),

    #[error("Direction matrix is not invertible")]
    SingularDirection,

    #[error("Voxel array has shape {actual:?}, grid expects {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumetricGrid {
    size: [usize; 3],
    spacing: Vector3<f64>,
    origin: Vector3<f64>,
    direction: Matrix3<f64>,
    inverse_direction: Matrix3<f64>,
}

impl VolumetricGrid {
    pub fn new(
        size: [usize; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: Matrix3<f64>,
    ) -> Result<Self, GeometryError> {
        if size.contains(&0) {
            return Err(GeometryError::EmptySize(size));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GeometryError::InvalidSpacing(spacing));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(GeometryError::InvalidOrigin(origin));
        }
        let inverse_direction = direction
            .try_inverse()
            .ok_or(GeometryError::SingularDirection)?;

        Ok(Self {
            size,
            spacing: Vector3::from(spacing),
            origin: Vector3::from(origin),
            direction,
            inverse_direction,
        })
    }

    /// Axis-aligned grid with unit spacing at the physical origin.
    pub fn with_size(size: [usize; 3]) -> Result<Self, GeometryError> {
        Self::new(size, [1.0; 3], [0.0; 3], Matrix3::identity())
    }

    /// Voxel counts per axis `(x, y, z)`.
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.into()
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.into()
    }

    /// Column `i` is the physical direction of index axis `i`.
    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Array shape `(depth, height, width)` of the voxel data.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size[2], self.size[1], self.size[0])
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    pub fn transform_continuous_index_to_physical_point(&self, index: [f64; 3]) -> [f64; 3] {
        let scaled = self.spacing.component_mul(&Vector3::from(index));
        (self.origin + self.direction * scaled).into()
    }

    pub fn transform_physical_point_to_continuous_index(&self, point: [f64; 3]) -> [f64; 3] {
        let rotated = self.inverse_direction * (Vector3::from(point) - self.origin);
        rotated.component_div(&self.spacing).into()
    }

    /// Affine map `(matrix, offset)` taking a continuous index of `self`
    /// to the continuous index of `other` at the same physical point.
    pub(crate) fn index_map_to(&self, other: &VolumetricGrid) -> (Matrix3<f64>, Vector3<f64>) {
        let to_other = Matrix3::from_diagonal(&other.spacing.map(|s| 1.0 / s))
            * other.inverse_direction;
        let matrix = to_other * self.direction * Matrix3::from_diagonal(&self.spacing);
        let offset = to_other * (self.origin - other.origin);
        (matrix, offset)
    }

    /// Whether both grids occupy the same physical space.
    ///
    /// Origin and spacing are compared with a coordinate tolerance of
    /// `tolerance * spacing[0]`, direction elements with `tolerance`.
    pub fn is_same_physical_space(&self, other: &VolumetricGrid, tolerance: f64) -> bool {
        self.mismatch(other, tolerance).is_none()
    }

    /// Describes the first difference between two grids, if any.
    pub fn mismatch(&self, other: &VolumetricGrid, tolerance: f64) -> Option<String> {
        let coordinate_tolerance = tolerance * self.spacing[0].abs();

        if self.size != other.size {
            return Some(format!("size {:?} vs {:?}", self.size, other.size));
        }
        if (self.origin - other.origin).amax() > coordinate_tolerance {
            return Some(format!(
                "origin {:?} vs {:?} (tolerance {coordinate_tolerance})",
                self.origin(),
                other.origin()
            ));
        }
        if (self.spacing - other.spacing).amax() > coordinate_tolerance {
            return Some(format!(
                "spacing {:?} vs {:?} (tolerance {coordinate_tolerance})",
                self.spacing(),
                other.spacing()
            ));
        }
        if (self.direction - other.direction).amax() > tolerance {
            return Some(format!(
                "direction {:?} vs {:?} (tolerance {tolerance})",
                self.direction.as_slice(),
                other.direction.as_slice()
            ));
        }
        None
    }

    /// Grid of the sub-volume starting at `lower` with `size` voxels.
    pub(crate) fn cropped(&self, lower: [usize; 3], size: [usize; 3]) -> Self {
        let corner = lower.map(|l| l as f64);
        Self {
            size,
            origin: Vector3::from(self.transform_continuous_index_to_physical_point(corner)),
            ..self.clone()
        }
    }
}
