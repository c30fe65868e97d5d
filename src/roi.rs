//! ROI validation against the physical extent of the image, and correction
//! of masks whose grid differs from the image grid.

use crate::bounding_box::BoundingBox;
use crate::error::RoiError;
use crate::report::{Event, Reporter, reject};
use crate::resample::resample_mask_to_grid;
use crate::volume::{Image, Mask};

/// Slack, in image voxels, allowed when comparing ROI corners to the image
/// extent.
pub const DEFAULT_ROI_TOLERANCE: f64 = 1e-3;

/// Checks that the voxels labelled `label` lie within the physical space of
/// `image`.
///
/// The bounding box is found in the mask's own index space. Its outer corners
/// (voxel centres shifted by half a voxel) are mapped to physical space
/// through the mask geometry and back into continuous image indices, where
/// they must fall within `[-0.5 - tolerance, size - 0.5 + tolerance]`.
///
/// Returns the bounding box in mask index space.
pub fn check_roi(
    image: &Image,
    mask: &Mask,
    label: i64,
    tolerance: f64,
    reporter: &dyn Reporter,
) -> Result<BoundingBox, RoiError> {
    let Some(bounding_box) = mask.bounding_box(label) else {
        return Err(reject(reporter, RoiError::LabelAbsent { label }));
    };

    let lower = bounding_box.lower();
    let extent = bounding_box.extent();
    let corners = [
        [0, 1, 2].map(|axis| lower[axis] as f64 - 0.5),
        [0, 1, 2].map(|axis| (lower[axis] + extent[axis]) as f64 - 0.5),
    ]
    .map(|corner| {
        let point = mask.grid().transform_continuous_index_to_physical_point(corner);
        image.grid().transform_physical_point_to_continuous_index(point)
    });

    let roi_lower = [0, 1, 2].map(|axis| corners[0][axis].min(corners[1][axis]));
    let roi_upper = [0, 1, 2].map(|axis| corners[0][axis].max(corners[1][axis]));
    reporter.report(&Event::RoiBounds {
        lower: roi_lower,
        upper: roi_upper,
    });

    let size = image.size();
    let outside = (0..3).any(|axis| {
        roi_lower[axis] < -0.5 - tolerance || roi_upper[axis] > size[axis] as f64 - 0.5 + tolerance
    });
    if outside {
        return Err(reject(
            reporter,
            RoiError::RoiOutOfBounds {
                lower: roi_lower,
                upper: roi_upper,
                size,
            },
        ));
    }

    reporter.report(&Event::RoiValid { bounding_box });
    Ok(bounding_box)
}

/// Resamples `mask` onto the grid of `image` with nearest-neighbour lookup,
/// provided the ROI passes [`check_roi`]. An ROI outside the image is never
/// resampled, since that could only produce labels from nothing.
pub fn correct_mask(
    image: &Image,
    mask: &Mask,
    label: i64,
    tolerance: f64,
    reporter: &dyn Reporter,
) -> Result<Mask, RoiError> {
    check_roi(image, mask, label, tolerance, reporter)?;
    Ok(resample_mask_to_grid(mask, image.grid()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PixelType;
    use crate::geometry::VolumetricGrid;
    use crate::report::RecordingReporter;
    use nalgebra::Matrix3;

    fn image(size: usize) -> Image {
        Image::from_fn(VolumetricGrid::with_size([size; 3]).unwrap(), PixelType::Int16, |_| 0.0)
    }

    fn mask_on(grid: VolumetricGrid, lower: [usize; 3], upper: [usize; 3]) -> Mask {
        Mask::from_fn(grid, PixelType::UInt8, |index| {
            i64::from((0..3).all(|a| index[a] >= lower[a] && index[a] <= upper[a]))
        })
    }

    #[test]
    fn roi_touching_the_image_edge_is_valid() {
        let image = image(10);
        let mask = mask_on(image.grid().clone(), [0, 0, 0], [9, 9, 9]);
        let reporter = RecordingReporter::default();
        let bb = check_roi(&image, &mask, 1, DEFAULT_ROI_TOLERANCE, &reporter).unwrap();
        assert_eq!(bb.extent(), [10, 10, 10]);
        assert!(reporter.rejections().is_empty());
    }

    #[test]
    fn roi_half_a_voxel_past_the_edge_is_rejected() {
        let image = image(10);
        let grid =
            VolumetricGrid::new([10, 10, 10], [1.0; 3], [0.6, 0.0, 0.0], Matrix3::identity())
                .unwrap();
        let mask = mask_on(grid, [5, 2, 2], [9, 4, 4]);
        let reporter = RecordingReporter::default();
        let err = check_roi(&image, &mask, 1, DEFAULT_ROI_TOLERANCE, &reporter).unwrap_err();
        match err {
            RoiError::RoiOutOfBounds { upper, size, .. } => {
                assert!((upper[0] - 10.1).abs() < 1e-9);
                assert_eq!(size, [10, 10, 10]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(reporter.rejections().len(), 1);
    }

    #[test]
    fn small_offsets_are_absorbed_by_the_tolerance() {
        let image = image(10);
        let grid =
            VolumetricGrid::new([10, 10, 10], [1.0; 3], [0.0005, 0.0, 0.0], Matrix3::identity())
                .unwrap();
        let mask = mask_on(grid, [0, 0, 0], [9, 9, 9]);
        let reporter = RecordingReporter::default();
        assert!(check_roi(&image, &mask, 1, DEFAULT_ROI_TOLERANCE, &reporter).is_ok());
        assert!(check_roi(&image, &mask, 1, 1e-4, &reporter).is_err());
    }

    #[test]
    fn missing_label_is_reported() {
        let image = image(4);
        let mask = mask_on(image.grid().clone(), [1, 1, 1], [2, 2, 2]);
        let reporter = RecordingReporter::default();
        assert_eq!(
            check_roi(&image, &mask, 3, DEFAULT_ROI_TOLERANCE, &reporter),
            Err(RoiError::LabelAbsent { label: 3 })
        );
        assert_eq!(
            correct_mask(&image, &mask, 3, DEFAULT_ROI_TOLERANCE, &reporter),
            Err(RoiError::LabelAbsent { label: 3 })
        );
    }

    #[test]
    fn correction_moves_labels_onto_the_image_grid() {
        let image = image(10);
        // Half resolution mask covering the same physical volume.
        let grid = VolumetricGrid::new([5, 5, 5], [2.0; 3], [0.5; 3], Matrix3::identity()).unwrap();
        let mask = mask_on(grid, [1, 1, 1], [2, 2, 2]);
        let reporter = RecordingReporter::default();
        let corrected = correct_mask(&image, &mask, 1, DEFAULT_ROI_TOLERANCE, &reporter).unwrap();
        assert_eq!(corrected.grid(), image.grid());
        assert_eq!(corrected.pixel_type(), PixelType::UInt8);
        let bb = corrected.bounding_box(1).unwrap();
        assert_eq!(bb.lower(), [2, 2, 2]);
        assert_eq!(bb.upper(), [5, 5, 5]);
    }
}
