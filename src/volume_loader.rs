use crate::enums::{PixelType, SortBy};
use crate::geometry::{GeometryError, VolumetricGrid};
use crate::volume::{Image, Mask};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Missing image orientation or position")]
    MissingOrientation,

    #[error("Invalid volume geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// A decoded slice with the key it is sorted by.
struct Slice {
    order: Option<f64>,
    position: Option<Vector3<f64>>,
    pixels: Array2<f32>,
}

/// Which conversion to apply to the stored pixel values.
#[derive(Clone, Copy)]
enum Values {
    /// Modality LUT applied, e.g. Hounsfield units.
    Intensities,
    /// Stored values untouched, as labels.
    Labels,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load an intensity image from DICOM objects of one series
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or the geometry attributes are missing
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Image, VolumeLoaderError> {
        Self::load(dicom_objects, sort_by, Values::Intensities)
    }

    /// Load a label volume (segmentation stored as an image series) from
    /// DICOM objects
    pub fn load_mask_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Mask, VolumeLoaderError> {
        Self::load(dicom_objects, sort_by, Values::Labels).map(|image| Mask::from_image(&image))
    }

    /// Load an image from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Image, VolumeLoaderError> {
        Self::load_from_dicom_objects(&Self::open_all(paths)?, sort_by)
    }

    /// Load an image from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Image, VolumeLoaderError> {
        Self::load_from_file_paths(&Self::dicom_paths(path.as_ref())?, sort_by)
    }

    /// Load a mask from a directory containing .dcm files
    pub fn load_mask_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Mask, VolumeLoaderError> {
        let objects = Self::open_all(&Self::dicom_paths(path.as_ref())?)?;
        Self::load_mask_from_dicom_objects(&objects, sort_by)
    }

    fn open_all(
        paths: &[impl AsRef<Path>],
    ) -> Result<Vec<FileDicomObject<InMemDicomObject>>, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();
        Ok(objects?)
    }

    fn dicom_paths(path: &Path) -> Result<Vec<std::path::PathBuf>, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        debug!(count = paths.len(), directory = %path.display(), "Found DICOM files");
        Ok(paths)
    }

    fn load(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
        values: Values,
    ) -> Result<Image, VolumeLoaderError> {
        let first = dicom_objects.first().ok_or(VolumeLoaderError::NoValidImages)?;
        let (row_direction, column_direction) =
            Self::get_orientation(first).ok_or(VolumeLoaderError::MissingOrientation)?;
        let normal = row_direction.cross(&column_direction);

        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| {
                Self::extract_slice(dicom_object, &sort_by, &normal, values)
            })
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let (height, width) = slices[0].pixels.dim();
        let depth = slices.len();
        let pixel_spacing = Self::get_pixel_spacing(dicom_objects)
            .ok_or(VolumeLoaderError::MissingSpacing)?;
        let origin = slices[0]
            .position
            .ok_or(VolumeLoaderError::MissingOrientation)?;

        // Slice axis follows the stacking order, which may run against the normal.
        let (slice_direction, slice_spacing) = match (slices.first(), slices.last()) {
            (Some(Slice { position: Some(a), .. }), Some(Slice { position: Some(b), .. }))
                if depth > 1 =>
            {
                let step = (b - a) / (depth - 1) as f64;
                let along_normal = step.dot(&normal);
                if along_normal.abs() > f64::EPSILON {
                    (normal * along_normal.signum(), along_normal.abs())
                } else {
                    (normal, Self::get_slice_thickness(dicom_objects).unwrap_or(1.0))
                }
            }
            _ => (normal, Self::get_slice_thickness(dicom_objects).unwrap_or(1.0)),
        };

        let direction = Matrix3::from_columns(&[row_direction, column_direction, slice_direction]);
        let grid = VolumetricGrid::new(
            [width, height, depth],
            [pixel_spacing.1, pixel_spacing.0, slice_spacing],
            origin.into(),
            direction,
        )?;

        let pixel_type = match values {
            Values::Intensities => Self::get_pixel_type(first),
            Values::Labels => Self::get_stored_pixel_type(first),
        };
        debug!(
            size = ?grid.size(),
            spacing = ?grid.spacing(),
            ?pixel_type,
            "Loaded DICOM volume"
        );

        let volume = Self::build_volume_array(&slices);
        Ok(Image::new(grid, volume, pixel_type)?)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        normal: &Vector3<f64>,
        values: Values,
    ) -> Option<Slice> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position.as_ref(), normal)?;
        let pixels = Self::decode_image(dicom_object, values)?;
        Some(Slice {
            order,
            position,
            pixels,
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        position: Option<&Vector3<f64>>,
        normal: &Vector3<f64>,
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => Some(Some(position?.dot(normal))),
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float64()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        values: Values,
    ) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = match values {
            Values::Intensities => ConvertOptions::new().with_voi_lut(VoiLutOption::Identity),
            Values::Labels => ConvertOptions::new()
                .with_modality_lut(ModalityLutOption::None)
                .with_voi_lut(VoiLutOption::Identity),
        };
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [Slice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
        }
    }

    fn validate_dimensions(slices: &[Slice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].pixels.dim();
        if slices.iter().any(|slice| slice.pixels.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[Slice]) -> Array3<f64> {
        let (height, width) = slices[0].pixels.dim();
        let depth = slices.len();
        let mut volume = Array3::<f64>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume
                .slice_mut(s![i, .., ..])
                .assign(&slice.pixels.mapv(f64::from));
        }

        volume
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Vector3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() >= 3).then(|| Vector3::new(pos[0], pos[1], pos[2]))
    }

    /// Row and column direction cosines.
    fn get_orientation(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let cosines = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        if cosines.len() < 6 {
            return None;
        }
        let row = Vector3::new(cosines[0], cosines[1], cosines[2]);
        let column = Vector3::new(cosines[3], cosines[4], cosines[5]);
        Some((row.try_normalize(f64::EPSILON)?, column.try_normalize(f64::EPSILON)?))
    }

    /// (row spacing, column spacing): the distance between rows, then between columns.
    fn get_pixel_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            (pixel_spacing.len() >= 2).then(|| (pixel_spacing[0], pixel_spacing[1]))
        })
    }

    fn get_slice_thickness(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<f64> {
        dicom_objects.iter().find_map(|dicom_object| {
            dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()
                .filter(|thickness| *thickness > 0.0)
        })
    }

    /// Type of the stored values.
    fn get_stored_pixel_type(dicom_object: &FileDicomObject<InMemDicomObject>) -> PixelType {
        let bits = dicom_object
            .element(tags::BITS_ALLOCATED)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .unwrap_or(16);
        let signed = dicom_object
            .element(tags::PIXEL_REPRESENTATION)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .is_some_and(|representation| representation == 1);

        match (bits, signed) {
            (8, false) => PixelType::UInt8,
            (8, true) => PixelType::Int8,
            (16, false) => PixelType::UInt16,
            (16, true) => PixelType::Int16,
            (32, false) => PixelType::UInt32,
            (32, true) => PixelType::Int32,
            _ => PixelType::Float32,
        }
    }

    /// Type of the values after the modality rescale.
    fn get_pixel_type(dicom_object: &FileDicomObject<InMemDicomObject>) -> PixelType {
        let read = |tag| {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|e| e.to_float64().ok())
        };
        let slope = read(tags::RESCALE_SLOPE).unwrap_or(1.0);
        let intercept = read(tags::RESCALE_INTERCEPT).unwrap_or(0.0);
        let stored = Self::get_stored_pixel_type(dicom_object);

        if slope == 1.0 && intercept == 0.0 {
            stored
        } else if slope.fract() == 0.0 && intercept.fract() == 0.0 {
            // CT style rescale, e.g. unsigned storage shifted to Hounsfield units
            match stored {
                PixelType::UInt8 | PixelType::Int8 | PixelType::UInt16 | PixelType::Int16 => {
                    PixelType::Int32
                }
                _ => PixelType::Float64,
            }
        } else {
            PixelType::Float32
        }
    }
}
