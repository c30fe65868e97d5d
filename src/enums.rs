use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::{Event, Reporter};

/// Storage type of the voxels as they were loaded.
///
/// Voxel values are held widened (`f64` for images, `i64` for masks) while
/// the tag records the type to cast back to after crop or resample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelType {
    UInt8,
    Int8,
    UInt16,
    #[default]
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

/// Relative distance to an integer below which an interpolated value counts
/// as that integer.
const INTEGER_SNAP: f64 = 1e-9;

impl PixelType {
    pub fn is_float(self) -> bool {
        matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Representable range of the type, as `f64`.
    pub fn range(self) -> (f64, f64) {
        match self {
            PixelType::UInt8 => (u8::MIN as f64, u8::MAX as f64),
            PixelType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            PixelType::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            PixelType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            PixelType::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            PixelType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            PixelType::UInt64 => (u64::MIN as f64, u64::MAX as f64),
            PixelType::Int64 => (i64::MIN as f64, i64::MAX as f64),
            PixelType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            PixelType::Float64 => (f64::MIN, f64::MAX),
        }
    }

    /// Cast an interpolated value to this type: clamp to the range, then
    /// truncate toward zero for integral types. Values within rounding noise
    /// of an integer are taken as that integer before truncating.
    #[inline]
    pub fn cast(self, value: f64) -> f64 {
        match self {
            PixelType::Float64 => value,
            PixelType::Float32 => value as f32 as f64,
            _ => {
                if value.is_nan() {
                    return 0.0;
                }
                let (min, max) = self.range();
                let nearest = value.round();
                let snapped = if (value - nearest).abs() <= INTEGER_SNAP * nearest.abs().max(1.0) {
                    nearest
                } else {
                    value
                };
                snapped.clamp(min, max).trunc()
            }
        }
    }
}

/// Interpolation kinds supported by the resampler.
///
/// Name lookup is closed: [`Interpolator::from_name`] maps the known names
/// and [`Interpolator::resolve`] falls back to the default for anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interpolator {
    NearestNeighbor,
    Linear,
    #[default]
    BSpline,
    Gaussian,
    HammingWindowedSinc,
    CosineWindowedSinc,
    WelchWindowedSinc,
    LanczosWindowedSinc,
    BlackmanWindowedSinc,
}

impl Interpolator {
    pub const ALL: [Interpolator; 9] = [
        Interpolator::NearestNeighbor,
        Interpolator::Linear,
        Interpolator::BSpline,
        Interpolator::Gaussian,
        Interpolator::HammingWindowedSinc,
        Interpolator::CosineWindowedSinc,
        Interpolator::WelchWindowedSinc,
        Interpolator::LanczosWindowedSinc,
        Interpolator::BlackmanWindowedSinc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Interpolator::NearestNeighbor => "sitkNearestNeighbor",
            Interpolator::Linear => "sitkLinear",
            Interpolator::BSpline => "sitkBSpline",
            Interpolator::Gaussian => "sitkGaussian",
            Interpolator::HammingWindowedSinc => "sitkHammingWindowedSinc",
            Interpolator::CosineWindowedSinc => "sitkCosineWindowedSinc",
            Interpolator::WelchWindowedSinc => "sitkWelchWindowedSinc",
            Interpolator::LanczosWindowedSinc => "sitkLanczosWindowedSinc",
            Interpolator::BlackmanWindowedSinc => "sitkBlackmanWindowedSinc",
        }
    }

    /// Look up an interpolator by name, with or without the `sitk` prefix,
    /// ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let bare = match name.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("sitk") => &name[4..],
            _ => name,
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.name()[4..].eq_ignore_ascii_case(bare))
    }

    /// Like [`Interpolator::from_name`], but an unknown name resolves to the
    /// default (B-spline) and is reported as a warning.
    pub fn resolve(name: &str, reporter: &dyn Reporter) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            let fallback = Self::default();
            reporter.report(&Event::UnknownInterpolator {
                name: name.to_string(),
                fallback,
            });
            fallback
        })
    }
}

impl fmt::Display for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown interpolator \"{0}\"")]
pub struct UnknownInterpolator(pub String);

impl FromStr for Interpolator {
    type Err = UnknownInterpolator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownInterpolator(s.to_string()))
    }
}

/// Slice ordering used when stacking a DICOM series into a volume.
#[derive(Debug, Clone, Copy, Default)]
pub enum SortBy {
    /// Position along the slice normal.
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;

    #[test]
    fn interpolator_names_resolve_with_and_without_prefix() {
        assert_eq!(Interpolator::from_name("sitkLinear"), Some(Interpolator::Linear));
        assert_eq!(Interpolator::from_name("linear"), Some(Interpolator::Linear));
        assert_eq!(
            Interpolator::from_name("SITKNearestNeighbor"),
            Some(Interpolator::NearestNeighbor)
        );
        assert_eq!(
            "LanczosWindowedSinc".parse::<Interpolator>(),
            Ok(Interpolator::LanczosWindowedSinc)
        );
        for kind in Interpolator::ALL {
            assert_eq!(Interpolator::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn unknown_interpolator_falls_back_to_bspline_with_warning() {
        let reporter = RecordingReporter::default();
        let kind = Interpolator::resolve("sitkCubicMagic", &reporter);
        assert_eq!(kind, Interpolator::BSpline);
        assert!(reporter.events().iter().any(|event| matches!(
            event,
            Event::UnknownInterpolator { name, .. } if name == "sitkCubicMagic"
        )));
        assert!("sitk".parse::<Interpolator>().is_err());
    }

    #[test]
    fn cast_clamps_then_truncates_integral_types() {
        assert_eq!(PixelType::UInt8.cast(300.7), 255.0);
        assert_eq!(PixelType::UInt8.cast(-4.0), 0.0);
        assert_eq!(PixelType::Int16.cast(-12.9), -12.0);
        assert_eq!(PixelType::Int32.cast(f64::NAN), 0.0);
        assert_eq!(PixelType::Float64.cast(0.1), 0.1);
        assert_eq!(PixelType::Float32.cast(0.1), 0.1f32 as f64);
    }

    #[test]
    fn cast_absorbs_interpolation_noise_near_integers() {
        assert_eq!(PixelType::Int16.cast(99.999999999999858), 100.0);
        assert_eq!(PixelType::Int16.cast(100.000000000000043), 100.0);
        assert_eq!(PixelType::Int16.cast(-7.9999999999999), -8.0);
        assert_eq!(PixelType::Int16.cast(99.9999), 99.0);
        assert_eq!(PixelType::UInt8.cast(255.0000000001), 255.0);
    }

    #[test]
    fn unknown_interpolator_error_names_the_input() {
        let err = "cubic".parse::<Interpolator>().unwrap_err();
        assert_eq!(err, UnknownInterpolator("cubic".to_string()));
        assert_eq!(err.to_string(), "unknown interpolator \"cubic\"");
    }
}
