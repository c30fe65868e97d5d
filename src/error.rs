use thiserror::Error;

use crate::geometry::GeometryError;

/// Reasons an image/mask pair is rejected for feature extraction.
///
/// Every variant is terminal for the pair: callers skip the case instead of
/// retrying. Only a geometry mismatch has a recovery path, through mask
/// correction, and that path fails into one of the other variants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoiError {
    #[error("Label ({label}) not present in mask")]
    LabelAbsent { label: i64 },

    #[error("Image/Mask geometry mismatch: {reason}")]
    GeometryMismatch { reason: String },

    #[error(
        "Bounding box of ROI is larger than image space: ROI bounds (image coordinate space) {lower:?} - {upper:?}, image size {size:?}"
    )]
    RoiOutOfBounds {
        lower: [f64; 3],
        upper: [f64; 3],
        size: [usize; 3],
    },

    #[error("Mask has too few dimensions (number of dimensions {dimensions}, minimum required {minimum})")]
    InsufficientDimensionality { dimensions: usize, minimum: usize },

    #[error("Size of the ROI is too small (minimum size: {minimum}, ROI size: {voxels})")]
    InsufficientSize { voxels: usize, minimum: usize },

    #[error("Image/Mask data incompatible: {reason}")]
    DataIncompatible { reason: String },

    #[error("Bounding box {bounds:?} exceeds grid of size {size:?}")]
    BoundingBoxOutOfRange { bounds: [usize; 6], size: [usize; 3] },

    #[error("Resampled spacing must be finite and positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
}

impl RoiError {
    pub fn geometry_mismatch(reason: impl Into<String>) -> Self {
        Self::GeometryMismatch {
            reason: reason.into(),
        }
    }

    pub fn data_incompatible(reason: impl Into<String>) -> Self {
        Self::DataIncompatible {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = RoiError::InsufficientSize {
            voxels: 8,
            minimum: 10,
        };
        assert!(err.to_string().contains("ROI size: 8"));

        let err = RoiError::InsufficientDimensionality {
            dimensions: 1,
            minimum: 1,
        };
        assert!(err.to_string().contains("number of dimensions 1"));

        let err = RoiError::geometry_mismatch("origin differs");
        assert!(err.to_string().ends_with("origin differs"));

        let err: RoiError = GeometryError::SingularDirection.into();
        assert!(matches!(err, RoiError::Geometry(_)));
    }
}
