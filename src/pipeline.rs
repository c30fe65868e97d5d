//! End-to-end preparation of an image/mask pair for feature extraction.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::check::{CheckMaskOptions, DEFAULT_GEOMETRY_TOLERANCE, check_mask};
use crate::crop::crop_to_tumor_mask;
use crate::enums::Interpolator;
use crate::error::RoiError;
use crate::normalize::normalize_image;
use crate::report::Reporter;
use crate::resample::{ResampleOptions, resample_image};
use crate::roi::DEFAULT_ROI_TOLERANCE;
use crate::volume::{Image, Mask};

/// Settings for [`prepare_roi`], named like the extraction settings they
/// mirror when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoiSettings {
    pub label: i64,
    #[serde(rename = "minimumROIDimensions")]
    pub minimum_roi_dimensions: usize,
    #[serde(rename = "minimumROISize")]
    pub minimum_roi_size: Option<usize>,
    pub correct_mask: bool,
    pub geometry_tolerance: f64,
    pub roi_tolerance: f64,
    /// Resampling is skipped when unset.
    pub resampled_pixel_spacing: Option<[f64; 3]>,
    pub interpolator: String,
    pub pad_distance: usize,
    pub normalize: bool,
    pub normalize_scale: f64,
    pub remove_outliers: Option<f64>,
}

impl Default for RoiSettings {
    fn default() -> Self {
        Self {
            label: 1,
            minimum_roi_dimensions: 1,
            minimum_roi_size: None,
            correct_mask: false,
            geometry_tolerance: DEFAULT_GEOMETRY_TOLERANCE,
            roi_tolerance: DEFAULT_ROI_TOLERANCE,
            resampled_pixel_spacing: None,
            interpolator: Interpolator::default().name().to_string(),
            pad_distance: 5,
            normalize: false,
            normalize_scale: 1.0,
            remove_outliers: None,
        }
    }
}

impl RoiSettings {
    pub fn check_options(&self) -> CheckMaskOptions {
        CheckMaskOptions {
            label: self.label,
            minimum_roi_dimensions: self.minimum_roi_dimensions,
            minimum_roi_size: self.minimum_roi_size,
            correct_mask: self.correct_mask,
            geometry_tolerance: self.geometry_tolerance,
            roi_tolerance: self.roi_tolerance,
        }
    }

    pub fn resample_options(&self) -> Option<ResampleOptions> {
        self.resampled_pixel_spacing.map(|spacing| ResampleOptions {
            resampled_pixel_spacing: spacing,
            interpolator: self.interpolator.clone(),
            label: self.label,
            pad_distance: self.pad_distance,
            roi_tolerance: self.roi_tolerance,
        })
    }
}

/// Checked image/mask pair, sharing one grid, with the ROI bounding box.
///
/// The volumes still carry the resampling padding around the ROI, which
/// neighbourhood filters need; [`PreparedRoi::cropped`] yields the minimal
/// pair for feature computation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRoi {
    pub image: Image,
    pub mask: Mask,
    pub bounding_box: BoundingBox,
    pub voxel_count: usize,
    pub resampled: bool,
    pub corrected: bool,
}

impl PreparedRoi {
    pub fn cropped(&self, reporter: &dyn Reporter) -> Result<(Image, Mask), RoiError> {
        crop_to_tumor_mask(&self.image, &self.mask, &self.bounding_box, reporter)
    }
}

/// Normalizes (optionally), resamples (when a spacing is configured) and
/// checks `image` and `mask`. A corrected mask replaces the input mask.
pub fn prepare_roi(
    image: &Image,
    mask: &Mask,
    settings: &RoiSettings,
    reporter: &dyn Reporter,
) -> Result<PreparedRoi, RoiError> {
    let image = if settings.normalize {
        Cow::Owned(normalize_image(
            image,
            settings.normalize_scale,
            settings.remove_outliers,
            reporter,
        ))
    } else {
        Cow::Borrowed(image)
    };

    let (image, mask, resampled) = match settings.resample_options() {
        Some(options) => {
            let (image, mask) = resample_image(&image, mask, &options, reporter)?;
            let resampled = matches!(mask, Cow::Owned(_));
            (image.into_owned(), mask.into_owned(), resampled)
        }
        None => (image.into_owned(), mask.clone(), false),
    };

    let check = check_mask(&image, &mask, &settings.check_options(), reporter)?;
    let corrected = check.corrected_mask.is_some();
    let mask = check.corrected_mask.unwrap_or(mask);

    Ok(PreparedRoi {
        image,
        mask,
        bounding_box: check.bounding_box,
        voxel_count: check.voxel_count,
        resampled,
        corrected,
    })
}
