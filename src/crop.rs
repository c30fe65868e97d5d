use ndarray::s;

use crate::bounding_box::BoundingBox;
use crate::error::RoiError;
use crate::report::{Event, Reporter, reject};
use crate::volume::{Image, Mask};

/// Crop margins `(lower, upper)` per axis that reduce a grid of `size` to
/// `bounding_box`, or `None` when the box does not fit the grid.
pub fn crop_margins(
    bounding_box: &BoundingBox,
    size: [usize; 3],
) -> Option<([usize; 3], [usize; 3])> {
    if !bounding_box.fits_within(size) {
        return None;
    }
    let upper = bounding_box.upper();
    Some((
        bounding_box.lower(),
        [0, 1, 2].map(|axis| size[axis] - upper[axis] - 1),
    ))
}

/// Crops `image` and `mask` to `bounding_box`.
///
/// Both volumes lose the same margins, so they must have the same size.
/// Cropping is an index-space slice: spacing and direction are kept, the
/// origin moves to the first kept voxel, and pixel types are unchanged.
pub fn crop_to_tumor_mask(
    image: &Image,
    mask: &Mask,
    bounding_box: &BoundingBox,
    reporter: &dyn Reporter,
) -> Result<(Image, Mask), RoiError> {
    let size = mask.size();
    if image.size() != size {
        return Err(reject(
            reporter,
            RoiError::data_incompatible(format!(
                "image size {:?} differs from mask size {size:?}",
                image.size()
            )),
        ));
    }
    let Some((lower_margin, upper_margin)) = crop_margins(bounding_box, size) else {
        return Err(reject(
            reporter,
            RoiError::BoundingBoxOutOfRange {
                bounds: bounding_box.to_bounds(),
                size,
            },
        ));
    };
    let extent = [0, 1, 2].map(|axis| size[axis] - lower_margin[axis] - upper_margin[axis]);
    reporter.report(&Event::Cropping { size: extent });

    let [x0, y0, z0] = lower_margin;
    let [x1, y1, z1] = [0, 1, 2].map(|axis| size[axis] - upper_margin[axis]);
    let image_grid = image.grid().cropped(lower_margin, extent);
    let mask_grid = mask.grid().cropped(lower_margin, extent);

    let cropped_image = Image::from_parts(
        image_grid,
        image.data().slice(s![z0..z1, y0..y1, x0..x1]).to_owned(),
        image.pixel_type(),
    );
    let cropped_mask = Mask::from_parts(
        mask_grid,
        mask.data().slice(s![z0..z1, y0..y1, x0..x1]).to_owned(),
        mask.pixel_type(),
    );

    Ok((cropped_image, cropped_mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PixelType;
    use crate::geometry::VolumetricGrid;
    use crate::report::RecordingReporter;
    use nalgebra::Matrix3;

    fn pair() -> (Image, Mask) {
        let grid =
            VolumetricGrid::new([8, 7, 6], [0.5, 1.0, 2.0], [10.0, 20.0, 30.0], Matrix3::identity())
                .unwrap();
        let image = Image::from_fn(grid.clone(), PixelType::Int16, |[x, y, z]| {
            (x + 10 * y + 100 * z) as f64
        });
        let mask = Mask::from_fn(grid, PixelType::UInt16, |[x, y, z]| {
            i64::from((2..5).contains(&x) && (1..3).contains(&y) && z == 4)
        });
        (image, mask)
    }

    #[test]
    fn margins_follow_bounds() {
        let bb = BoundingBox::new([2, 1, 4], [3, 2, 1]).unwrap();
        assert_eq!(crop_margins(&bb, [8, 7, 6]), Some(([2, 1, 4], [3, 4, 1])));
    }

    #[test]
    fn margins_of_box_beyond_grid_are_none() {
        let bb = BoundingBox::new([6, 0, 0], [3, 1, 1]).unwrap();
        assert_eq!(crop_margins(&bb, [8, 7, 6]), None);
        let flush = BoundingBox::new([5, 0, 0], [3, 7, 6]).unwrap();
        assert_eq!(crop_margins(&flush, [8, 7, 6]), Some(([5, 0, 0], [0; 3])));
    }

    #[test]
    fn crop_keeps_values_types_and_moves_origin() {
        let (image, mask) = pair();
        let bb = mask.bounding_box(1).unwrap();
        let reporter = RecordingReporter::default();
        let (image, mask) = crop_to_tumor_mask(&image, &mask, &bb, &reporter).unwrap();

        assert_eq!(image.size(), [3, 2, 1]);
        assert_eq!(mask.size(), [3, 2, 1]);
        assert_eq!(image.pixel_type(), PixelType::Int16);
        assert_eq!(mask.pixel_type(), PixelType::UInt16);
        assert_eq!(image.origin(), [11.0, 21.0, 38.0]);
        assert_eq!(image.value([0, 0, 0]), Some(412.0));
        assert_eq!(image.value([2, 1, 0]), Some(424.0));
        assert!(mask.data().iter().all(|&label| label == 1));
    }

    #[test]
    fn box_outside_grid_is_rejected() {
        let (image, mask) = pair();
        let bb = BoundingBox::new([6, 0, 0], [3, 1, 1]).unwrap();
        let reporter = RecordingReporter::default();
        assert!(matches!(
            crop_to_tumor_mask(&image, &mask, &bb, &reporter),
            Err(RoiError::BoundingBoxOutOfRange { .. })
        ));
    }
}
