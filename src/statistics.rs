//! Per-label statistics over an image/mask pair.

use std::collections::BTreeMap;

use ndarray::Axis;
use rayon::prelude::*;

use crate::bounding_box::BoundingBox;
use crate::error::RoiError;
use crate::volume::{Image, Mask};

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStatistic {
    pub count: usize,
    pub bounding_box: BoundingBox,
    /// Intensity summaries; zero when computed from the mask alone.
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelStatistics {
    labels: BTreeMap<i64, LabelStatistic>,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: usize,
    lower: [usize; 3],
    upper: [usize; 3],
    minimum: f64,
    maximum: f64,
    sum: f64,
}

impl Accumulator {
    fn new(index: [usize; 3], value: f64) -> Self {
        Self {
            count: 1,
            lower: index,
            upper: index,
            minimum: value,
            maximum: value,
            sum: value,
        }
    }

    fn add(&mut self, index: [usize; 3], value: f64) {
        self.count += 1;
        for axis in 0..3 {
            self.lower[axis] = self.lower[axis].min(index[axis]);
            self.upper[axis] = self.upper[axis].max(index[axis]);
        }
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
        self.sum += value;
    }

    fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        for axis in 0..3 {
            self.lower[axis] = self.lower[axis].min(other.lower[axis]);
            self.upper[axis] = self.upper[axis].max(other.upper[axis]);
        }
        self.minimum = self.minimum.min(other.minimum);
        self.maximum = self.maximum.max(other.maximum);
        self.sum += other.sum;
    }
}

type Accumulators = BTreeMap<i64, Accumulator>;

fn merge_maps(mut a: Accumulators, b: Accumulators) -> Accumulators {
    for (label, acc) in b {
        a.entry(label)
            .and_modify(|existing| existing.merge(&acc))
            .or_insert(acc);
    }
    a
}

impl LabelStatistics {
    /// Statistics of `image` intensities under every label of `mask`.
    ///
    /// Fails with [`RoiError::DataIncompatible`] when the mask does not hold
    /// integral labels, and with [`RoiError::GeometryMismatch`] when the two
    /// grids do not occupy the same physical space within `geometry_tolerance`.
    pub fn compute(image: &Image, mask: &Mask, geometry_tolerance: f64) -> Result<Self, RoiError> {
        if mask.pixel_type().is_float() {
            return Err(RoiError::data_incompatible(format!(
                "mask pixel type {:?} is not an integral label type",
                mask.pixel_type()
            )));
        }
        if let Some(reason) = image.grid().mismatch(mask.grid(), geometry_tolerance) {
            return Err(RoiError::geometry_mismatch(format!(
                "inputs do not occupy the same physical space: {reason}"
            )));
        }
        Ok(Self::accumulate(mask, Some(image)))
    }

    /// Count and bounding box of every label in `mask`.
    pub fn of_mask(mask: &Mask) -> Self {
        Self::accumulate(mask, None)
    }

    fn accumulate(mask: &Mask, image: Option<&Image>) -> Self {
        let depth = mask.data().len_of(Axis(0));
        let accumulators = (0..depth)
            .into_par_iter()
            .map(|z| {
                let labels = mask.data().index_axis(Axis(0), z);
                let values = image.map(|image| image.data().index_axis(Axis(0), z));
                let mut slice = Accumulators::new();
                for ((y, x), &label) in labels.indexed_iter() {
                    let index = [x, y, z];
                    let value = values.as_ref().map_or(0.0, |values| values[[y, x]]);
                    slice
                        .entry(label)
                        .and_modify(|acc| acc.add(index, value))
                        .or_insert_with(|| Accumulator::new(index, value));
                }
                slice
            })
            .reduce(Accumulators::new, merge_maps);

        let labels = accumulators
            .into_iter()
            .filter_map(|(label, acc)| {
                let bounding_box = BoundingBox::from_bounds(acc.lower, acc.upper)?;
                Some((
                    label,
                    LabelStatistic {
                        count: acc.count,
                        bounding_box,
                        minimum: acc.minimum,
                        maximum: acc.maximum,
                        mean: acc.sum / acc.count as f64,
                    },
                ))
            })
            .collect();

        Self { labels }
    }

    /// Labels present, background included, in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = i64> + '_ {
        self.labels.keys().copied()
    }

    pub fn contains(&self, label: i64) -> bool {
        self.labels.contains_key(&label)
    }

    pub fn get(&self, label: i64) -> Option<&LabelStatistic> {
        self.labels.get(&label)
    }

    pub fn bounding_box(&self, label: i64) -> Option<BoundingBox> {
        self.labels.get(&label).map(|stat| stat.bounding_box)
    }

    pub fn count(&self, label: i64) -> usize {
        self.labels.get(&label).map_or(0, |stat| stat.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PixelType;
    use crate::geometry::VolumetricGrid;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn pair() -> (Image, Mask) {
        let grid = VolumetricGrid::with_size([6, 5, 4]).unwrap();
        let image = Image::from_fn(grid.clone(), PixelType::Int16, |[x, _, _]| x as f64);
        let mask = Mask::from_fn(grid, PixelType::UInt8, |[x, y, z]| {
            if (1..=3).contains(&x) && y == 2 && (1..=2).contains(&z) {
                1
            } else if x == 5 && y == 4 && z == 3 {
                7
            } else {
                0
            }
        });
        (image, mask)
    }

    #[test]
    fn counts_bounds_and_intensities_per_label() {
        let (image, mask) = pair();
        let stats = LabelStatistics::compute(&image, &mask, 1e-6).unwrap();
        assert_eq!(stats.labels().collect::<Vec<_>>(), vec![0, 1, 7]);

        let roi = stats.get(1).unwrap();
        assert_eq!(roi.count, 6);
        assert_eq!(roi.bounding_box.lower(), [1, 2, 1]);
        assert_eq!(roi.bounding_box.extent(), [3, 1, 2]);
        assert_relative_eq!(roi.minimum, 1.0);
        assert_relative_eq!(roi.maximum, 3.0);
        assert_relative_eq!(roi.mean, 2.0);

        assert_eq!(stats.count(7), 1);
        assert_eq!(stats.count(0), 6 * 5 * 4 - 7);
        assert!(!stats.contains(2));
    }

    #[test]
    fn float_masks_are_incompatible() {
        let (image, mask) = pair();
        let mask = Mask::from_parts(mask.grid().clone(), mask.into_data(), PixelType::Float32);
        assert!(matches!(
            LabelStatistics::compute(&image, &mask, 1e-6),
            Err(RoiError::DataIncompatible { .. })
        ));
    }

    #[test]
    fn shifted_grids_do_not_share_physical_space() {
        let (image, mask) = pair();
        let shifted =
            VolumetricGrid::new([6, 5, 4], [1.0; 3], [0.5, 0.0, 0.0], Matrix3::identity()).unwrap();
        let mask = Mask::from_parts(shifted, mask.into_data(), PixelType::UInt8);
        assert!(matches!(
            LabelStatistics::compute(&image, &mask, 1e-6),
            Err(RoiError::GeometryMismatch { .. })
        ));
        assert_eq!(LabelStatistics::of_mask(&mask).count(1), 6);
    }
}
