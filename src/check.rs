//! Mask checking: geometry, label presence, dimensionality and size of the ROI.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::error::RoiError;
use crate::report::{Event, Reporter, reject};
use crate::roi::{DEFAULT_ROI_TOLERANCE, correct_mask};
use crate::statistics::LabelStatistics;
use crate::volume::{Image, Mask};

/// Default tolerance for deciding that two grids occupy the same space.
pub const DEFAULT_GEOMETRY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckMaskOptions {
    pub label: i64,
    /// The ROI must extend over more than this many axes.
    #[serde(rename = "minimumROIDimensions")]
    pub minimum_roi_dimensions: usize,
    /// The ROI must contain more than this many voxels, when set.
    #[serde(rename = "minimumROISize")]
    pub minimum_roi_size: Option<usize>,
    /// Resample the mask onto the image grid when their geometry differs.
    pub correct_mask: bool,
    pub geometry_tolerance: f64,
    pub roi_tolerance: f64,
}

impl Default for CheckMaskOptions {
    fn default() -> Self {
        Self {
            label: 1,
            minimum_roi_dimensions: 1,
            minimum_roi_size: None,
            correct_mask: false,
            geometry_tolerance: DEFAULT_GEOMETRY_TOLERANCE,
            roi_tolerance: DEFAULT_ROI_TOLERANCE,
        }
    }
}

/// Outcome of a passed [`check_mask`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaskCheck {
    /// Bounding box of the label, in the index space of the image.
    pub bounding_box: BoundingBox,
    pub voxel_count: usize,
    /// The mask resampled onto the image grid, when correction was needed.
    pub corrected_mask: Option<Mask>,
}

/// Checks whether the ROI labelled `options.label` in `mask` is usable for
/// feature extraction on `image`.
///
/// 1. Label statistics are computed assuming `image` and `mask` share their
///    geometry. Incompatible data always fails; a geometry mismatch fails
///    unless `options.correct_mask` is set, in which case the mask is
///    resampled onto the image grid and the statistics are recomputed.
/// 2. The label must be present.
/// 3. The bounding box must be more than one voxel thick along more than
///    `minimum_roi_dimensions` axes.
/// 4. When `minimum_roi_size` is set, the ROI must hold more voxels than that.
///
/// Any failure is reported and returned as an error; no bounding box is
/// produced for a rejected pair.
pub fn check_mask(
    image: &Image,
    mask: &Mask,
    options: &CheckMaskOptions,
    reporter: &dyn Reporter,
) -> Result<MaskCheck, RoiError> {
    let label = options.label;
    reporter.report(&Event::CheckingMask { label });

    let (statistics, corrected_mask) =
        match LabelStatistics::compute(image, mask, options.geometry_tolerance) {
            Ok(statistics) => (statistics, None),
            Err(RoiError::GeometryMismatch { reason }) if options.correct_mask => {
                reporter.report(&Event::GeometryMismatch {
                    reason,
                    correcting: true,
                });
                let corrected =
                    correct_mask(image, mask, label, options.roi_tolerance, reporter)?;
                let statistics =
                    LabelStatistics::compute(image, &corrected, options.geometry_tolerance)
                        .map_err(|err| reject(reporter, err))?;
                (statistics, Some(corrected))
            }
            Err(RoiError::GeometryMismatch { reason }) => {
                reporter.report(&Event::GeometryMismatch {
                    reason: reason.clone(),
                    correcting: false,
                });
                return Err(reject(reporter, RoiError::GeometryMismatch { reason }));
            }
            Err(err) => return Err(reject(reporter, err)),
        };

    let Some(label_statistics) = statistics.get(label) else {
        return Err(reject(reporter, RoiError::LabelAbsent { label }));
    };
    let bounding_box = label_statistics.bounding_box;
    let voxel_count = label_statistics.count;

    let dimensions = bounding_box.dimensionality();
    if dimensions <= options.minimum_roi_dimensions {
        return Err(reject(
            reporter,
            RoiError::InsufficientDimensionality {
                dimensions,
                minimum: options.minimum_roi_dimensions,
            },
        ));
    }

    if let Some(minimum) = options.minimum_roi_size {
        if voxel_count <= minimum {
            return Err(reject(
                reporter,
                RoiError::InsufficientSize {
                    voxels: voxel_count,
                    minimum,
                },
            ));
        }
    }

    Ok(MaskCheck {
        bounding_box,
        voxel_count,
        corrected_mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PixelType;
    use crate::geometry::VolumetricGrid;
    use crate::report::RecordingReporter;

    fn pair(extent: [usize; 3]) -> (Image, Mask) {
        let grid = VolumetricGrid::with_size([10, 10, 10]).unwrap();
        let image = Image::from_fn(grid.clone(), PixelType::Int16, |[x, y, z]| (x + y + z) as f64);
        let mask = Mask::from_fn(grid, PixelType::UInt8, |index| {
            i64::from((0..3).all(|a| index[a] >= 2 && index[a] < 2 + extent[a]))
        });
        (image, mask)
    }

    #[test]
    fn line_roi_fails_default_dimensionality() {
        let (image, mask) = pair([5, 1, 1]);
        let reporter = RecordingReporter::default();
        let err = check_mask(&image, &mask, &CheckMaskOptions::default(), &reporter).unwrap_err();
        assert_eq!(
            err,
            RoiError::InsufficientDimensionality {
                dimensions: 1,
                minimum: 1
            }
        );
        assert_eq!(reporter.rejections(), vec![err]);
    }

    #[test]
    fn plane_roi_passes_default_dimensionality() {
        let (image, mask) = pair([5, 3, 1]);
        let reporter = RecordingReporter::default();
        let check = check_mask(&image, &mask, &CheckMaskOptions::default(), &reporter).unwrap();
        assert_eq!(check.bounding_box.extent(), [5, 3, 1]);
        assert_eq!(check.voxel_count, 15);
        assert!(check.corrected_mask.is_none());
    }

    #[test]
    fn size_threshold_is_strict() {
        let (image, mask) = pair([4, 4, 4]);
        let reporter = RecordingReporter::default();
        let at_limit = CheckMaskOptions {
            minimum_roi_size: Some(64),
            ..CheckMaskOptions::default()
        };
        assert_eq!(
            check_mask(&image, &mask, &at_limit, &reporter),
            Err(RoiError::InsufficientSize {
                voxels: 64,
                minimum: 64
            })
        );
        let below = CheckMaskOptions {
            minimum_roi_size: Some(63),
            ..CheckMaskOptions::default()
        };
        assert!(check_mask(&image, &mask, &below, &reporter).is_ok());
    }

    #[test]
    fn float_mask_is_fatal_even_with_correction() {
        let (image, mask) = pair([4, 4, 4]);
        let mask = Mask::from_parts(mask.grid().clone(), mask.into_data(), PixelType::Float64);
        let reporter = RecordingReporter::default();
        let options = CheckMaskOptions {
            correct_mask: true,
            ..CheckMaskOptions::default()
        };
        assert!(matches!(
            check_mask(&image, &mask, &options, &reporter),
            Err(RoiError::DataIncompatible { .. })
        ));
    }

    #[test]
    fn options_deserialize_from_setting_names() {
        let options: CheckMaskOptions = serde_json::from_str(
            r#"{"label": 2, "minimumROIDimensions": 2, "minimumROISize": 50, "correctMask": true, "geometryTolerance": 1e-4}"#,
        )
        .unwrap();
        assert_eq!(options.label, 2);
        assert_eq!(options.minimum_roi_dimensions, 2);
        assert_eq!(options.minimum_roi_size, Some(50));
        assert!(options.correct_mask);
        assert_eq!(options.geometry_tolerance, 1e-4);
        assert_eq!(options.roi_tolerance, DEFAULT_ROI_TOLERANCE);
    }
}
