//! Sampling of voxel data at continuous indices.
//!
//! All kernels except nearest neighbour are separable: each axis contributes
//! a short list of `(voxel index, weight)` taps and the sample is the weighted
//! sum over their outer product.

use std::f64::consts::PI;

use ndarray::{Array3, ArrayView3, Axis, CowArray, Ix3, Zip};

use crate::enums::Interpolator;

const SINC_RADIUS: isize = 3;
const GAUSSIAN_SIGMA: f64 = 1.0;
const GAUSSIAN_CUTOFF: f64 = 3.0;
/// Capacity of [`Taps`]; Gaussian kernels wider than this are truncated.
const MAX_TAPS: usize = 32;

/// `(voxel index, weight)` pairs of one axis, held inline.
#[derive(Clone, Copy)]
struct Taps {
    entries: [(usize, f64); MAX_TAPS],
    len: usize,
}

impl Taps {
    fn as_slice(&self) -> &[(usize, f64)] {
        &self.entries[..self.len]
    }

    fn normalize(&mut self) {
        let total: f64 = self.as_slice().iter().map(|(_, w)| w).sum();
        self.entries[..self.len].iter_mut().for_each(|(_, w)| *w /= total);
    }
}

impl FromIterator<(usize, f64)> for Taps {
    fn from_iter<I: IntoIterator<Item = (usize, f64)>>(iter: I) -> Self {
        let mut taps = Taps {
            entries: [(0, 0.0); MAX_TAPS],
            len: 0,
        };
        for (slot, tap) in taps.entries.iter_mut().zip(iter) {
            *slot = tap;
            taps.len += 1;
        }
        taps
    }
}

/// Whether a continuous index lies in the sampled extent of the buffer,
/// `[-0.5, size - 0.5)` on every axis.
#[inline]
pub(crate) fn is_inside(index: [f64; 3], size: [usize; 3]) -> bool {
    (0..3).all(|axis| index[axis] >= -0.5 && index[axis] < size[axis] as f64 - 0.5)
}

/// Nearest voxel `(x, y, z)` to an index inside the buffer, rounding half up.
#[inline]
pub(crate) fn nearest_index(index: [f64; 3], size: [usize; 3]) -> [usize; 3] {
    [0, 1, 2].map(|axis| clamp(round_half_up(index[axis]), size[axis]))
}

#[inline]
fn round_half_up(value: f64) -> isize {
    (value + 0.5).floor() as isize
}

#[inline]
fn clamp(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}

#[inline]
fn mirror(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let folded = index.rem_euclid(period);
    if folded >= len as isize {
        (period - folded) as usize
    } else {
        folded as usize
    }
}

/// Cubic B-spline basis.
#[inline]
fn bspline3(x: f64) -> f64 {
    let abs_x = x.abs();
    if abs_x < 1.0 {
        (2.0 / 3.0) - abs_x * abs_x + 0.5 * abs_x * abs_x * abs_x
    } else if abs_x < 2.0 {
        let two_minus_x = 2.0 - abs_x;
        two_minus_x * two_minus_x * two_minus_x / 6.0
    } else {
        0.0
    }
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

fn window(kind: Interpolator, x: f64) -> f64 {
    let m = SINC_RADIUS as f64;
    match kind {
        Interpolator::HammingWindowedSinc => 0.54 + 0.46 * (PI * x / m).cos(),
        Interpolator::CosineWindowedSinc => (PI * x / (2.0 * m)).cos(),
        Interpolator::WelchWindowedSinc => 1.0 - x * x / (m * m),
        Interpolator::LanczosWindowedSinc => sinc(x / m),
        Interpolator::BlackmanWindowedSinc => {
            0.42 + 0.5 * (PI * x / m).cos() + 0.08 * (2.0 * PI * x / m).cos()
        }
        _ => 1.0,
    }
}

/// Computes the causal initial coefficient for mirror boundaries.
fn initial_causal_coefficient(line: &[f64], pole: f64) -> f64 {
    const TOLERANCE: f64 = 1e-10;
    let len = line.len();
    let horizon = (TOLERANCE.ln() / pole.abs().ln()).ceil() as usize;

    if horizon < len {
        let mut zn = pole;
        let mut sum = line[0];
        for &value in &line[1..horizon] {
            sum += zn * value;
            zn *= pole;
        }
        sum
    } else {
        let inverse = 1.0 / pole;
        let mut zn = pole;
        let mut z2n = pole.powi(len as i32 - 1);
        let mut sum = line[0] + z2n * line[len - 1];
        z2n *= z2n * inverse;
        for &value in &line[1..len - 1] {
            sum += (zn + z2n) * value;
            zn *= pole;
            z2n *= inverse;
        }
        sum / (1.0 - zn * zn)
    }
}

/// In-place conversion of samples to cubic B-spline coefficients.
fn bspline_prefilter(line: &mut [f64]) {
    let len = line.len();
    if len < 2 {
        return;
    }
    let pole = 3f64.sqrt() - 2.0;
    let gain = (1.0 - pole) * (1.0 - 1.0 / pole);
    line.iter_mut().for_each(|c| *c *= gain);

    line[0] = initial_causal_coefficient(line, pole);
    for k in 1..len {
        line[k] += pole * line[k - 1];
    }

    line[len - 1] = (pole / (pole * pole - 1.0)) * (pole * line[len - 2] + line[len - 1]);
    for k in (0..len - 1).rev() {
        line[k] = pole * (line[k + 1] - line[k]);
    }
}

/// B-spline coefficients of a whole volume, filtered along every axis.
pub(crate) fn bspline_coefficients(data: ArrayView3<'_, f64>) -> Array3<f64> {
    let mut coefficients = data.to_owned();
    for axis in 0..3 {
        Zip::from(coefficients.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
            let mut line: Vec<f64> = lane.to_vec();
            bspline_prefilter(&mut line);
            lane.iter_mut().zip(line).for_each(|(c, v)| *c = v);
        });
    }
    coefficients
}

/// Samples one volume with a fixed interpolation kind.
pub(crate) struct Sampler<'a> {
    kind: Interpolator,
    data: CowArray<'a, f64, Ix3>,
    /// Voxel counts `(x, y, z)`.
    size: [usize; 3],
    spacing: [f64; 3],
}

impl<'a> Sampler<'a> {
    pub(crate) fn new(kind: Interpolator, data: ArrayView3<'a, f64>, spacing: [f64; 3]) -> Self {
        let (depth, height, width) = data.dim();
        let data = match kind {
            Interpolator::BSpline => CowArray::from(bspline_coefficients(data)),
            _ => CowArray::from(data),
        };
        Self {
            kind,
            data,
            size: [width, height, depth],
            spacing,
        }
    }

    pub(crate) fn size(&self) -> [usize; 3] {
        self.size
    }

    fn taps(&self, axis: usize, coordinate: f64) -> Taps {
        let len = self.size[axis];
        let base = coordinate.floor() as isize;
        match self.kind {
            Interpolator::NearestNeighbor => {
                std::iter::once((clamp(round_half_up(coordinate), len), 1.0)).collect()
            }
            Interpolator::Linear => {
                let fraction = coordinate - base as f64;
                [
                    (clamp(base, len), 1.0 - fraction),
                    (clamp(base + 1, len), fraction),
                ]
                .into_iter()
                .collect()
            }
            Interpolator::BSpline => (base - 1..=base + 2)
                .map(|i| (mirror(i, len), bspline3(coordinate - i as f64)))
                .collect(),
            Interpolator::Gaussian => {
                let sigma = GAUSSIAN_SIGMA / self.spacing[axis];
                let radius =
                    ((GAUSSIAN_CUTOFF * sigma).ceil() as isize).clamp(1, MAX_TAPS as isize / 2);
                let mut taps: Taps = (base - radius + 1..=base + radius)
                    .map(|i| {
                        let d = coordinate - i as f64;
                        (clamp(i, len), (-d * d / (2.0 * sigma * sigma)).exp())
                    })
                    .collect();
                taps.normalize();
                taps
            }
            kind => (base - SINC_RADIUS + 1..=base + SINC_RADIUS)
                .map(|i| {
                    let d = coordinate - i as f64;
                    (clamp(i, len), window(kind, d) * sinc(d))
                })
                .collect(),
        }
    }

    /// Value at a continuous index `(x, y, z)` inside the buffer.
    pub(crate) fn sample(&self, index: [f64; 3]) -> f64 {
        let tx = self.taps(0, index[0]);
        let ty = self.taps(1, index[1]);
        let tz = self.taps(2, index[2]);

        let mut value = 0.0;
        for &(z, wz) in tz.as_slice() {
            for &(y, wy) in ty.as_slice() {
                let wzy = wz * wy;
                for &(x, wx) in tx.as_slice() {
                    value += self.data[[z, y, x]] * wzy * wx;
                }
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Array3<f64> {
        Array3::from_shape_fn((5, 6, 7), |(z, y, x)| {
            (x as f64) * 0.5 + (y as f64) * 2.0 - (z as f64) + ((x * y) % 3) as f64
        })
    }

    #[test]
    fn every_kind_reproduces_grid_nodes() {
        let data = ramp();
        for kind in Interpolator::ALL {
            if kind == Interpolator::Gaussian {
                continue;
            }
            let sampler = Sampler::new(kind, data.view(), [1.0; 3]);
            for (z, y, x) in [(0, 0, 0), (2, 3, 4), (4, 5, 6), (1, 0, 6)] {
                let value = sampler.sample([x as f64, y as f64, z as f64]);
                assert_relative_eq!(value, data[[z, y, x]], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn linear_interpolates_between_nodes_and_clamps_edges() {
        let data = Array3::from_shape_fn((1, 1, 4), |(_, _, x)| x as f64 * 10.0);
        let sampler = Sampler::new(Interpolator::Linear, data.view(), [1.0; 3]);
        assert_relative_eq!(sampler.sample([1.25, 0.0, 0.0]), 12.5);
        assert_relative_eq!(sampler.sample([-0.4, 0.0, 0.0]), 0.0);
        assert_relative_eq!(sampler.sample([3.4, 0.0, 0.0]), 30.0);
    }

    #[test]
    fn gaussian_smooths_a_constant_to_itself() {
        let data = Array3::from_elem((4, 4, 4), 7.0);
        let sampler = Sampler::new(Interpolator::Gaussian, data.view(), [0.8, 1.0, 2.0]);
        assert_relative_eq!(sampler.sample([1.3, 2.7, 0.2]), 7.0, epsilon = 1e-12);
    }

    #[test]
    fn wide_gaussian_is_truncated_to_tap_capacity() {
        let data = Array3::from_elem((3, 3, 40), 7.0);
        let sampler = Sampler::new(Interpolator::Gaussian, data.view(), [0.05, 1.0, 1.0]);
        let taps = sampler.taps(0, 20.0);
        assert_eq!(taps.as_slice().len(), MAX_TAPS);
        let total: f64 = taps.as_slice().iter().map(|(_, w)| w).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sampler.sample([20.0, 1.0, 1.0]), 7.0, epsilon = 1e-9);
    }

    #[test]
    fn nearest_rounds_half_up() {
        assert_eq!(nearest_index([0.5, 1.49, -0.5], [3, 3, 3]), [1, 1, 0]);
        assert!(is_inside([-0.5, 0.0, 2.49], [3, 3, 3]));
        assert!(!is_inside([0.0, 2.5, 0.0], [3, 3, 3]));
        assert!(!is_inside([-0.51, 0.0, 0.0], [3, 3, 3]));
    }

    #[test]
    fn mirror_folds_out_of_range_indices() {
        assert_eq!(mirror(-1, 4), 1);
        assert_eq!(mirror(4, 4), 2);
        assert_eq!(mirror(7, 4), 1);
        assert_eq!(mirror(-3, 1), 0);
    }
}
