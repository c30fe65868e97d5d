//! Grid-to-grid resampling and resampling of image/mask pairs around the ROI.

use std::borrow::Cow;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::enums::Interpolator;
use crate::error::RoiError;
use crate::geometry::VolumetricGrid;
use crate::interpolator::{Sampler, is_inside, nearest_index};
use crate::report::{Event, Reporter, reject};
use crate::roi::{DEFAULT_ROI_TOLERANCE, check_roi};
use crate::volume::{Image, Mask};

/// Settings of [`resample_image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResampleOptions {
    pub resampled_pixel_spacing: [f64; 3],
    /// Interpolator name for the image, see [`Interpolator::from_name`].
    pub interpolator: String,
    pub label: i64,
    /// Margin around the ROI, in voxels of the new grid.
    pub pad_distance: usize,
    pub roi_tolerance: f64,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            resampled_pixel_spacing: [1.0; 3],
            interpolator: Interpolator::default().name().to_string(),
            label: 1,
            pad_distance: 5,
            roi_tolerance: DEFAULT_ROI_TOLERANCE,
        }
    }
}

impl ResampleOptions {
    pub fn new(resampled_pixel_spacing: [f64; 3]) -> Self {
        Self {
            resampled_pixel_spacing,
            ..Self::default()
        }
    }

    pub fn with_interpolator(mut self, interpolator: Interpolator) -> Self {
        self.interpolator = interpolator.name().to_string();
        self
    }

    pub fn with_label(mut self, label: i64) -> Self {
        self.label = label;
        self
    }

    pub fn with_pad_distance(mut self, pad_distance: usize) -> Self {
        self.pad_distance = pad_distance;
        self
    }
}

/// Output grid of a resample around an ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplingGrid {
    /// Spacing actually used, after flat axes kept their original spacing.
    pub spacing: [f64; 3],
    pub size: [usize; 3],
    pub origin: [f64; 3],
    pub direction: Matrix3<f64>,
    /// Inclusive bounds of the new grid, in the index space of a grid with
    /// the new spacing aligned to the mask's first voxel.
    pub lower: [i64; 3],
    pub upper: [i64; 3],
}

impl ResamplingGrid {
    /// Grid with `target_spacing` covering `bounding_box` (in `mask` index
    /// space) plus `pad_distance` new voxels on every side, limited to the
    /// extent of the mask grid.
    ///
    /// Axes along which the ROI is a single voxel thick keep the mask
    /// spacing and are never interpolated.
    pub fn around_roi(
        mask: &VolumetricGrid,
        bounding_box: &BoundingBox,
        target_spacing: [f64; 3],
        pad_distance: usize,
    ) -> Self {
        let mask_spacing = mask.spacing();
        let mask_size = mask.size();
        let lower = bounding_box.lower();
        let extent = bounding_box.extent();
        let pad = pad_distance as f64;

        let spacing = [0, 1, 2].map(|axis| {
            if extent[axis] == 1 {
                mask_spacing[axis]
            } else {
                target_spacing[axis]
            }
        });
        let ratio = [0, 1, 2].map(|axis| mask_spacing[axis] / spacing[axis]);

        let mut new_lower = [0i64; 3];
        let mut new_upper = [0i64; 3];
        for axis in 0..3 {
            let low = ((lower[axis] as f64 - 0.5) * ratio[axis] - pad).floor();
            let high = ((lower[axis] as f64 + extent[axis] as f64 - 0.5) * ratio[axis] + pad).ceil();
            let max_upper = (mask_size[axis] as f64 * ratio[axis]).ceil() - 1.0;
            assert!(
                low.is_finite() && high.is_finite() && max_upper.is_finite(),
                "non-finite resampling bounds on axis {axis}"
            );
            new_lower[axis] = low.max(0.0) as i64;
            new_upper[axis] = high.min(max_upper) as i64;
        }

        let size = [0, 1, 2].map(|axis| (new_upper[axis] - new_lower[axis] + 1).max(1) as usize);

        // Continuous index (old grid) of the first new voxel centre.
        let origin_index = [0, 1, 2].map(|axis| {
            new_lower[axis] as f64 / ratio[axis]
                + 0.5 * (spacing[axis] - mask_spacing[axis]) / mask_spacing[axis]
        });
        let origin = mask.transform_continuous_index_to_physical_point(origin_index);

        Self {
            spacing,
            size,
            origin,
            direction: *mask.direction(),
            lower: new_lower,
            upper: new_upper,
        }
    }

    pub fn to_grid(&self) -> Result<VolumetricGrid, RoiError> {
        Ok(VolumetricGrid::new(
            self.size,
            self.spacing,
            self.origin,
            self.direction,
        )?)
    }
}

/// Resamples `image` onto `grid` with the given interpolator. Voxels mapping
/// outside the input buffer are 0. The pixel type is preserved.
pub fn resample_to_grid(image: &Image, grid: &VolumetricGrid, interpolator: Interpolator) -> Image {
    let sampler = Sampler::new(interpolator, image.data().view(), image.spacing());
    let size = sampler.size();
    let pixel_type = image.pixel_type();
    let (matrix, offset) = grid.index_map_to(image.grid());

    let mut data = Array3::<f64>::zeros(grid.shape());
    Zip::indexed(&mut data).par_for_each(|(z, y, x), value| {
        let mapped = matrix * Vector3::new(x as f64, y as f64, z as f64) + offset;
        let index: [f64; 3] = mapped.into();
        if is_inside(index, size) {
            *value = pixel_type.cast(sampler.sample(index));
        }
    });

    Image::from_parts(grid.clone(), data, pixel_type)
}

/// Resamples `mask` onto `grid` with nearest-neighbour lookup, so labels are
/// copied and never blended. Voxels mapping outside the input are background.
pub fn resample_mask_to_grid(mask: &Mask, grid: &VolumetricGrid) -> Mask {
    let size = mask.size();
    let source = mask.data();
    let (matrix, offset) = grid.index_map_to(mask.grid());

    let mut data = Array3::<i64>::zeros(grid.shape());
    Zip::indexed(&mut data).par_for_each(|(z, y, x), label| {
        let mapped = matrix * Vector3::new(x as f64, y as f64, z as f64) + offset;
        let index: [f64; 3] = mapped.into();
        if is_inside(index, size) {
            let [ix, iy, iz] = nearest_index(index, size);
            *label = source[[iz, iy, ix]];
        }
    });

    Mask::from_parts(grid.clone(), data, mask.pixel_type())
}

/// Resamples `image` and `mask` to `options.resampled_pixel_spacing`,
/// cropped to the ROI plus padding.
///
/// When both inputs already have the requested spacing they are handed back
/// borrowed and untouched. Otherwise the ROI is validated against the image
/// and the new grid is derived from the mask; both outputs share the mask's
/// direction. The image uses the named interpolator (unknown names fall back
/// to B-spline with a warning) and the mask nearest neighbour.
pub fn resample_image<'a>(
    image: &'a Image,
    mask: &'a Mask,
    options: &ResampleOptions,
    reporter: &dyn Reporter,
) -> Result<(Cow<'a, Image>, Cow<'a, Mask>), RoiError> {
    let target = options.resampled_pixel_spacing;
    if target.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(reject(reporter, RoiError::InvalidSpacing(target)));
    }

    if mask.spacing() == target && image.spacing() == target {
        reporter.report(&Event::ResamplingSkipped { spacing: target });
        return Ok((Cow::Borrowed(image), Cow::Borrowed(mask)));
    }

    let bounding_box = check_roi(image, mask, options.label, options.roi_tolerance, reporter)?;

    let resampling = ResamplingGrid::around_roi(mask.grid(), &bounding_box, target, options.pad_distance);
    let grid = resampling.to_grid().map_err(|err| reject(reporter, err))?;

    reporter.report(&Event::Resampling {
        from_spacing: mask.spacing(),
        from_size: mask.size(),
        to_spacing: resampling.spacing,
        to_size: resampling.size,
    });

    let interpolator = Interpolator::resolve(&options.interpolator, reporter);
    let resampled_image = resample_to_grid(image, &grid, interpolator);
    let resampled_mask = resample_mask_to_grid(mask, &grid);

    Ok((Cow::Owned(resampled_image), Cow::Owned(resampled_mask)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PixelType;
    use crate::report::RecordingReporter;
    use approx::assert_relative_eq;

    fn cube_mask(size: usize, lower: usize, extent: usize) -> Mask {
        let grid = VolumetricGrid::with_size([size; 3]).unwrap();
        Mask::from_fn(grid, PixelType::UInt8, |index| {
            i64::from(index.iter().all(|&i| i >= lower && i < lower + extent))
        })
    }

    #[test]
    fn downsampling_grid_matches_closed_form() {
        let mask = cube_mask(10, 2, 4);
        let bb = BoundingBox::new([2; 3], [4; 3]).unwrap();
        let grid = ResamplingGrid::around_roi(mask.grid(), &bb, [2.0; 3], 0);

        let expected = ((2.0f64 + 4.0 - 0.5) * 0.5).ceil() - ((2.0f64 - 0.5) * 0.5).floor() + 1.0;
        assert_eq!(grid.size, [expected as usize; 3]);
        assert_eq!(grid.lower, [0; 3]);
        assert_eq!(grid.upper, [3; 3]);
        for axis in 0..3 {
            assert_relative_eq!(grid.origin[axis], 0.5);
        }
    }

    #[test]
    fn padding_is_clamped_to_mask_extent() {
        let mask = cube_mask(10, 2, 4);
        let bb = BoundingBox::new([2; 3], [4; 3]).unwrap();
        let grid = ResamplingGrid::around_roi(mask.grid(), &bb, [0.5; 3], 5);
        // lower: floor(1.5 * 2 - 5) = -2 -> 0, upper: ceil(5.5 * 2 + 5) = 16
        assert_eq!(grid.lower, [0; 3]);
        assert_eq!(grid.upper, [16; 3]);
        assert_eq!(grid.size, [17; 3]);
        for axis in 0..3 {
            assert_relative_eq!(grid.origin[axis], -0.25);
        }
    }

    #[test]
    fn flat_axes_keep_mask_spacing() {
        let grid = VolumetricGrid::new(
            [10, 10, 5],
            [1.0, 1.0, 3.0],
            [0.0; 3],
            Matrix3::identity(),
        )
        .unwrap();
        let bb = BoundingBox::new([2, 2, 3], [4, 4, 1]).unwrap();
        let resampling = ResamplingGrid::around_roi(&grid, &bb, [0.5, 0.5, 0.5], 1);
        assert_eq!(resampling.spacing, [0.5, 0.5, 3.0]);
        // ratio 1 on z: floor(2.5 - 1) = 1, ceil(3.5 + 1) = 5 -> min(5, 4)
        assert_eq!(resampling.lower[2], 1);
        assert_eq!(resampling.upper[2], 4);
        assert_relative_eq!(resampling.origin[2], 3.0);
    }

    #[test]
    fn mask_resampling_onto_own_grid_is_identity() {
        let mask = cube_mask(8, 1, 3);
        let resampled = resample_mask_to_grid(&mask, mask.grid());
        assert_eq!(resampled, mask);
    }

    #[test]
    fn image_resampling_preserves_pixel_type() {
        let grid = VolumetricGrid::with_size([6, 6, 6]).unwrap();
        let image = Image::from_fn(grid, PixelType::UInt8, |[x, _, _]| (x * 10) as f64);
        let half = VolumetricGrid::new([11, 1, 1], [0.5, 1.0, 1.0], [0.0; 3], Matrix3::identity())
            .unwrap();
        let resampled = resample_to_grid(&image, &half, Interpolator::Linear);
        assert_eq!(resampled.pixel_type(), PixelType::UInt8);
        assert_eq!(resampled.value([1, 0, 0]), Some(5.0));
        assert_eq!(resampled.value([10, 0, 0]), Some(50.0));
    }

    #[test]
    fn equal_spacing_returns_inputs_borrowed() {
        let mask = cube_mask(10, 2, 4);
        let image = Image::from_fn(mask.grid().clone(), PixelType::Int16, |_| 1.0);
        let reporter = RecordingReporter::default();
        let (out_image, out_mask) =
            resample_image(&image, &mask, &ResampleOptions::new([1.0; 3]), &reporter).unwrap();
        assert!(matches!(out_image, Cow::Borrowed(i) if std::ptr::eq(i, &image)));
        assert!(matches!(out_mask, Cow::Borrowed(m) if std::ptr::eq(m, &mask)));
        assert!(matches!(
            reporter.events().as_slice(),
            [Event::ResamplingSkipped { .. }]
        ));
    }

    #[test]
    fn invalid_target_spacing_is_rejected() {
        let mask = cube_mask(4, 1, 2);
        let image = Image::from_fn(mask.grid().clone(), PixelType::Int16, |_| 1.0);
        let reporter = RecordingReporter::default();
        let result = resample_image(&image, &mask, &ResampleOptions::new([1.0, 0.0, 1.0]), &reporter);
        assert_eq!(result.err(), Some(RoiError::InvalidSpacing([1.0, 0.0, 1.0])));
    }
}
