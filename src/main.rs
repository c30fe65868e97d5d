use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use roi_volume::{
    Interpolator, RoiSettings, SortBy, TracingReporter, VolumeLoader, binary_threshold,
    prepare_roi,
};

#[derive(Parser)]
#[command(name = "roi-volume")]
#[command(about = "Check, resample and crop the ROI of an image/mask pair")]
struct Cli {
    /// Directory with the DICOM series of the image
    #[arg(short, long)]
    image: PathBuf,

    /// Directory with the DICOM series of the mask
    #[arg(short, long, conflicts_with = "threshold")]
    mask: Option<PathBuf>,

    /// Build the mask from image values within LOWER,UPPER instead
    #[arg(short, long, value_delimiter = ',', num_args = 2, value_names = ["LOWER", "UPPER"])]
    threshold: Option<Vec<f64>>,

    /// Label of the ROI in the mask
    #[arg(short, long)]
    label: Option<i64>,

    /// Resample the mask onto the image grid when the geometry differs
    #[arg(long)]
    correct_mask: bool,

    /// Target spacing X,Y,Z in physical units
    #[arg(short, long, value_delimiter = ',', num_args = 3)]
    resample: Option<Vec<f64>>,

    /// Interpolator for the image, e.g. sitkLinear
    #[arg(long)]
    interpolator: Option<Interpolator>,

    /// Voxels of padding around the ROI when resampling
    #[arg(long)]
    pad_distance: Option<usize>,

    /// The ROI must extend over more than this many axes
    #[arg(long)]
    min_dims: Option<usize>,

    /// The ROI must contain more than this many voxels
    #[arg(long)]
    min_size: Option<usize>,

    /// Normalize image intensities before resampling
    #[arg(long)]
    normalize: bool,
}

impl Cli {
    fn settings(&self) -> RoiSettings {
        let mut settings = RoiSettings {
            correct_mask: self.correct_mask,
            normalize: self.normalize,
            resampled_pixel_spacing: self
                .resample
                .as_ref()
                .map(|spacing| [spacing[0], spacing[1], spacing[2]]),
            minimum_roi_size: self.min_size,
            ..RoiSettings::default()
        };

        if let Some(label) = self.label {
            settings.label = label;
        }
        if let Some(interpolator) = self.interpolator {
            settings.interpolator = interpolator.name().to_string();
        }
        if let Some(pad_distance) = self.pad_distance {
            settings.pad_distance = pad_distance;
        }
        if let Some(min_dims) = self.min_dims {
            settings.minimum_roi_dimensions = min_dims;
        }
        settings
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();

    let image = VolumeLoader::load_from_directory(&cli.image, SortBy::ImagePositionPatient)
        .with_context(|| format!("loading image from {}", cli.image.display()))?;
    let mask = match (&cli.mask, &cli.threshold) {
        (Some(path), _) => VolumeLoader::load_mask_from_directory(path, SortBy::ImagePositionPatient)
            .with_context(|| format!("loading mask from {}", path.display()))?,
        (None, Some(bounds)) => binary_threshold(&image, bounds[0], bounds[1], settings.label, 0),
        (None, None) => bail!("either --mask or --threshold is required"),
    };
    info!(size = ?image.size(), spacing = ?image.spacing(), "Loaded image");

    let prepared = prepare_roi(&image, &mask, &settings, &TracingReporter)?;
    let (image, mask) = prepared.cropped(&TracingReporter)?;

    println!("bounding box: {}", prepared.bounding_box);
    println!("voxels:       {}", prepared.voxel_count);
    println!("resampled:    {}", prepared.resampled);
    println!("corrected:    {}", prepared.corrected);
    println!("cropped size: {:?}", image.size());
    println!("spacing:      {:?}", mask.spacing());
    println!("origin:       {:?}", mask.origin());

    Ok(())
}
