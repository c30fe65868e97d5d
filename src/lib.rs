//! # ROI-volume library
//!
//! This crate prepares an image and a segmentation mask for radiomic
//! feature extraction. Both are 3D volumes placed in physical space by an
//! origin, a spacing and a direction matrix, and the mask labels the region
//! of interest (ROI) with an integer.
//!
//! Before features can be computed on an image/mask pair the library
//!  - checks that the ROI lies inside the physical extent of the image,
//!  - optionally resamples a mask with a different geometry onto the image
//!    grid (mask correction),
//!  - validates that the ROI is present, has enough dimensions and enough
//!    voxels,
//!  - resamples both volumes to a target spacing on a grid restricted to a
//!    padded box around the ROI,
//!  - crops both volumes to the bounding box of the ROI.
//!
//! Volumes can be built in memory or loaded from a directory of DICOM files
//! with [`VolumeLoader`]. Label statistics, bounding box scans and
//! resampling run in parallel using rayon. Every warning and rejection is
//! passed to a [`Reporter`]; [`TracingReporter`] forwards them to `tracing`.
//!
//! # Examples
//!
//! ## Checking a mask against an image
//!
//! ```
//! # use roi_volume::{CheckMaskOptions, Image, Mask, PixelType, TracingReporter, VolumetricGrid, check_mask};
//! let grid = VolumetricGrid::with_size([10, 10, 10]).unwrap();
//! let image = Image::from_fn(grid.clone(), PixelType::Int16, |[x, y, z]| (x + y + z) as f64);
//! let mask = Mask::from_fn(grid, PixelType::UInt8, |index| {
//!     i64::from(index.iter().all(|&i| (2..6).contains(&i)))
//! });
//!
//! let check = check_mask(&image, &mask, &CheckMaskOptions::default(), &TracingReporter)
//!     .expect("should have accepted the ROI");
//! assert_eq!(check.bounding_box.lower(), [2, 2, 2]);
//! assert_eq!(check.bounding_box.extent(), [4, 4, 4]);
//! ```
//!
//! ## Resampling and cropping a DICOM series
//!
//! ```no_run
//! # use roi_volume::{RoiSettings, SortBy, TracingReporter, VolumeLoader, prepare_roi};
//! let image = VolumeLoader::load_from_directory("image", SortBy::ImagePositionPatient)
//!     .expect("should have loaded image from directory");
//! let mask = VolumeLoader::load_mask_from_directory("mask", SortBy::ImagePositionPatient)
//!     .expect("should have loaded mask from directory");
//! let settings = RoiSettings {
//!     resampled_pixel_spacing: Some([1.0, 1.0, 1.0]),
//!     correct_mask: true,
//!     ..RoiSettings::default()
//! };
//! let prepared = prepare_roi(&image, &mask, &settings, &TracingReporter)
//!     .expect("should have prepared the ROI");
//! let (image, mask) = prepared
//!     .cropped(&TracingReporter)
//!     .expect("should have cropped to the ROI");
//! ```

pub mod bounding_box;
pub mod check;
pub mod crop;
pub mod enums;
pub mod error;
pub mod geometry;
mod interpolator;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod resample;
pub mod roi;
pub mod statistics;
pub mod volume;
pub mod volume_loader;

pub use bounding_box::BoundingBox;
pub use check::{CheckMaskOptions, DEFAULT_GEOMETRY_TOLERANCE, MaskCheck, check_mask};
pub use crop::{crop_margins, crop_to_tumor_mask};
pub use enums::{Interpolator, PixelType, SortBy};
pub use error::RoiError;
pub use geometry::{GeometryError, VolumetricGrid};
pub use normalize::{binary_threshold, normalize_image, threshold_image};
pub use pipeline::{PreparedRoi, RoiSettings, prepare_roi};
pub use report::{Event, RecordingReporter, Reporter, Severity, TracingReporter};
pub use resample::{
    ResampleOptions, ResamplingGrid, resample_image, resample_mask_to_grid, resample_to_grid,
};
pub use roi::{DEFAULT_ROI_TOLERANCE, check_roi, correct_mask};
pub use statistics::{LabelStatistic, LabelStatistics};
pub use volume::{Image, Mask};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
