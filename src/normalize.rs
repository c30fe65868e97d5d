//! Whole-image intensity preparation applied before ROI resampling.

use rayon::prelude::*;

use crate::enums::PixelType;
use crate::report::{Event, Reporter};
use crate::volume::{Image, Mask};

/// Centres the image at its mean and scales it by its standard deviation,
/// over all voxels of the image, not only those in the ROI.
///
/// When `outliers` is given, normalized values beyond `±outliers` standard
/// deviations are clamped to that limit. `scale` is applied last. The result
/// is `Float64`. A constant image normalizes to zero.
pub fn normalize_image(
    image: &Image,
    scale: f64,
    outliers: Option<f64>,
    reporter: &dyn Reporter,
) -> Image {
    reporter.report(&Event::Normalizing { scale, outliers });

    let values = image.data();
    let count = values.len() as f64;
    let mean = values.par_iter().sum::<f64>() / count;
    let variance = if values.len() > 1 {
        values.par_iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (count - 1.0)
    } else {
        0.0
    };
    let sigma = variance.sqrt();

    let pixel_type = PixelType::Float64;
    let data = image.data().mapv(|value| {
        let mut normalized = if sigma > 0.0 { (value - mean) / sigma } else { 0.0 };
        if let Some(limit) = outliers {
            normalized = normalized.clamp(-limit, limit);
        }
        pixel_type.cast(normalized * scale)
    });

    Image::from_parts(image.grid().clone(), data, pixel_type)
}

/// Replaces every value outside `[lower, upper]` with `outside`.
pub fn threshold_image(image: &Image, lower: f64, upper: f64, outside: f64) -> Image {
    let pixel_type = image.pixel_type();
    let outside = pixel_type.cast(outside);
    let data = image
        .data()
        .mapv(|value| if (lower..=upper).contains(&value) { value } else { outside });
    Image::from_parts(image.grid().clone(), data, pixel_type)
}

/// Labels voxels within `[lower, upper]` with `inside`, all others with
/// `outside`.
pub fn binary_threshold(image: &Image, lower: f64, upper: f64, inside: i64, outside: i64) -> Mask {
    let data = image
        .data()
        .mapv(|value| if (lower..=upper).contains(&value) { inside } else { outside });
    Mask::from_parts(image.grid().clone(), data, PixelType::UInt8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VolumetricGrid;
    use crate::report::RecordingReporter;
    use approx::assert_relative_eq;

    fn ramp() -> Image {
        let grid = VolumetricGrid::with_size([5, 1, 1]).unwrap();
        Image::from_fn(grid, PixelType::Int16, |[x, _, _]| x as f64 * 10.0)
    }

    #[test]
    fn normalized_image_has_zero_mean_unit_deviation() {
        let reporter = RecordingReporter::default();
        let normalized = normalize_image(&ramp(), 1.0, None, &reporter);
        assert_eq!(normalized.pixel_type(), PixelType::Float64);
        let values: Vec<f64> = normalized.data().iter().copied().collect();
        let mean = values.iter().sum::<f64>() / 5.0;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-6);
        assert_relative_eq!(variance, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn outliers_are_clamped_before_scaling() {
        let reporter = RecordingReporter::default();
        let normalized = normalize_image(&ramp(), 100.0, Some(1.0), &reporter);
        // std of 0..40 step 10 is ~15.81, so the extremes sit at ~±1.26
        assert_relative_eq!(normalized.value([0, 0, 0]).unwrap(), -100.0);
        assert_relative_eq!(normalized.value([4, 0, 0]).unwrap(), 100.0);
        assert_relative_eq!(normalized.value([2, 0, 0]).unwrap(), 0.0);
    }

    #[test]
    fn constant_image_normalizes_to_zero() {
        let grid = VolumetricGrid::with_size([3, 3, 3]).unwrap();
        let image = Image::from_fn(grid, PixelType::UInt8, |_| 42.0);
        let reporter = RecordingReporter::default();
        let normalized = normalize_image(&image, 1.0, None, &reporter);
        assert!(normalized.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn thresholds_select_closed_interval() {
        let image = ramp();
        let thresholded = threshold_image(&image, 10.0, 30.0, -1.0);
        assert_eq!(
            thresholded.data().iter().copied().collect::<Vec<_>>(),
            vec![-1.0, 10.0, 20.0, 30.0, -1.0]
        );
        let mask = binary_threshold(&image, 15.0, 40.0, 2, 0);
        assert_eq!(mask.data().iter().copied().collect::<Vec<_>>(), vec![0, 0, 2, 2, 2]);
        assert_eq!(mask.bounding_box(2).unwrap().lower(), [2, 0, 0]);
    }
}
