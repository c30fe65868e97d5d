use crate::bounding_box::BoundingBox;
use crate::enums::PixelType;
use crate::geometry::{GeometryError, VolumetricGrid};

use nalgebra::Matrix3;
use ndarray::{Array3, Axis};
use rayon::prelude::*;

/// Scalar intensity volume.
///
/// Voxels are stored as `f64` in a `(depth, height, width)` array; the pixel
/// type records the type the values came from and are cast back to.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    grid: VolumetricGrid,
    data: Array3<f64>,
    pixel_type: PixelType,
}

/// Label volume. Zero is background, every other value a candidate ROI label.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    grid: VolumetricGrid,
    data: Array3<i64>,
    pixel_type: PixelType,
}

fn check_shape(grid: &VolumetricGrid, actual: (usize, usize, usize)) -> Result<(), GeometryError> {
    let expected = grid.shape();
    if expected != actual {
        return Err(GeometryError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

impl Image {
    pub fn new(
        grid: VolumetricGrid,
        data: Array3<f64>,
        pixel_type: PixelType,
    ) -> Result<Self, GeometryError> {
        check_shape(&grid, data.dim())?;
        Ok(Self::from_parts(grid, data, pixel_type))
    }

    /// Builds the volume by evaluating `f` at every `(x, y, z)` index.
    pub fn from_fn(
        grid: VolumetricGrid,
        pixel_type: PixelType,
        f: impl Fn([usize; 3]) -> f64,
    ) -> Self {
        let data = Array3::from_shape_fn(grid.shape(), |(z, y, x)| f([x, y, z]));
        Self::from_parts(grid, data, pixel_type)
    }

    pub(crate) fn from_parts(grid: VolumetricGrid, data: Array3<f64>, pixel_type: PixelType) -> Self {
        Self {
            grid,
            data,
            pixel_type,
        }
    }

    pub fn grid(&self) -> &VolumetricGrid {
        &self.grid
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn size(&self) -> [usize; 3] {
        self.grid.size()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.grid.spacing()
    }

    pub fn origin(&self) -> [f64; 3] {
        self.grid.origin()
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        self.grid.direction()
    }

    /// Voxel value at index `(x, y, z)`.
    pub fn value(&self, index: [usize; 3]) -> Option<f64> {
        let [x, y, z] = index;
        self.data.get((z, y, x)).copied()
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }
}

impl Mask {
    pub fn new(
        grid: VolumetricGrid,
        data: Array3<i64>,
        pixel_type: PixelType,
    ) -> Result<Self, GeometryError> {
        check_shape(&grid, data.dim())?;
        Ok(Self::from_parts(grid, data, pixel_type))
    }

    /// Builds the mask by evaluating `f` at every `(x, y, z)` index.
    pub fn from_fn(
        grid: VolumetricGrid,
        pixel_type: PixelType,
        f: impl Fn([usize; 3]) -> i64,
    ) -> Self {
        let data = Array3::from_shape_fn(grid.shape(), |(z, y, x)| f([x, y, z]));
        Self::from_parts(grid, data, pixel_type)
    }

    /// Reinterprets an intensity volume as labels, rounding each value.
    ///
    /// The pixel type is kept, so a floating-point volume yields a mask that
    /// label statistics will refuse.
    pub fn from_image(image: &Image) -> Self {
        let data = image.data.mapv(|v| v.round() as i64);
        Self::from_parts(image.grid.clone(), data, image.pixel_type)
    }

    pub(crate) fn from_parts(grid: VolumetricGrid, data: Array3<i64>, pixel_type: PixelType) -> Self {
        Self {
            grid,
            data,
            pixel_type,
        }
    }

    pub fn grid(&self) -> &VolumetricGrid {
        &self.grid
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<i64> {
        &self.data
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn size(&self) -> [usize; 3] {
        self.grid.size()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.grid.spacing()
    }

    pub fn origin(&self) -> [f64; 3] {
        self.grid.origin()
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        self.grid.direction()
    }

    /// Label at index `(x, y, z)`.
    pub fn value(&self, index: [usize; 3]) -> Option<i64> {
        let [x, y, z] = index;
        self.data.get((z, y, x)).copied()
    }

    pub fn into_data(self) -> Array3<i64> {
        self.data
    }

    /// Bounding box of all voxels equal to `label`, in this mask's own
    /// index space. `None` when the label does not occur.
    pub fn bounding_box(&self, label: i64) -> Option<BoundingBox> {
        let depth = self.data.len_of(Axis(0));
        (0..depth)
            .into_par_iter()
            .filter_map(|z| {
                let slice = self.data.index_axis(Axis(0), z);
                let mut bounds: Option<([usize; 3], [usize; 3])> = None;
                for ((y, x), &value) in slice.indexed_iter() {
                    if value != label {
                        continue;
                    }
                    let index = [x, y, z];
                    bounds = Some(match bounds {
                        None => (index, index),
                        Some((lower, upper)) => (
                            [0, 1, 2].map(|axis| lower[axis].min(index[axis])),
                            [0, 1, 2].map(|axis| upper[axis].max(index[axis])),
                        ),
                    });
                }
                bounds.and_then(|(lower, upper)| BoundingBox::from_bounds(lower, upper))
            })
            .reduce_with(|a, b| a.union(&b))
    }
}
