//! Reporting of checks and transformations.
//!
//! The geometric operations never log through global state. They describe
//! what they do as [`Event`]s handed to a caller-supplied [`Reporter`].

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use crate::bounding_box::BoundingBox;
use crate::enums::Interpolator;
use crate::error::RoiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CheckingMask { label: i64 },
    /// Image and mask grids differ; `correcting` tells whether a resample
    /// of the mask onto the image grid follows.
    GeometryMismatch { reason: String, correcting: bool },
    RoiBounds {
        lower: [f64; 3],
        upper: [f64; 3],
    },
    RoiValid { bounding_box: BoundingBox },
    Rejected(RoiError),
    ResamplingSkipped { spacing: [f64; 3] },
    Resampling {
        from_spacing: [f64; 3],
        from_size: [usize; 3],
        to_spacing: [f64; 3],
        to_size: [usize; 3],
    },
    UnknownInterpolator { name: String, fallback: Interpolator },
    Cropping { size: [usize; 3] },
    Normalizing {
        scale: f64,
        outliers: Option<f64>,
    },
}

impl Event {
    pub fn severity(&self) -> Severity {
        match self {
            Event::CheckingMask { .. }
            | Event::RoiBounds { .. }
            | Event::RoiValid { .. }
            | Event::Cropping { .. }
            | Event::Normalizing { .. } => Severity::Debug,
            Event::ResamplingSkipped { .. } | Event::Resampling { .. } => Severity::Info,
            Event::GeometryMismatch { correcting: true, .. }
            | Event::UnknownInterpolator { .. } => Severity::Warning,
            Event::GeometryMismatch {
                correcting: false, ..
            }
            | Event::Rejected(_) => Severity::Error,
        }
    }

    /// The rejection carried by this event, if it is one.
    pub fn rejection(&self) -> Option<&RoiError> {
        match self {
            Event::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Sink for [`Event`]s. Implementations must tolerate being shared across
/// threads, since independent image/mask pairs may be processed in parallel.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CheckingMask { label } => write!(f, "Checking mask with label {label}"),
            Event::GeometryMismatch {
                reason,
                correcting: true,
            } => write!(f, "Image/Mask geometry mismatch ({reason}), attempting to correct Mask"),
            Event::GeometryMismatch {
                reason,
                correcting: false,
            } => write!(
                f,
                "Image/Mask geometry mismatch ({reason}). Potential solution: increase tolerance using geometryTolerance or enable correctMask"
            ),
            Event::RoiBounds { lower, upper } => {
                write!(f, "ROI bounds (image coordinate space): {lower:?} - {upper:?}")
            }
            Event::RoiValid { bounding_box } => write!(f, "ROI valid, bounding box {bounding_box}"),
            Event::Rejected(err) => write!(f, "{err}"),
            Event::ResamplingSkipped { spacing } => {
                write!(f, "New spacing {spacing:?} equal to old, no resampling required")
            }
            Event::Resampling {
                from_spacing,
                from_size,
                to_spacing,
                to_size,
            } => write!(
                f,
                "Applying resampling from spacing {from_spacing:?} and size {from_size:?} to spacing {to_spacing:?} and size {to_size:?}"
            ),
            Event::UnknownInterpolator { name, fallback } => {
                write!(f, "Interpolator \"{name}\" not recognized, using {fallback}")
            }
            Event::Cropping { size } => write!(f, "Cropping to size {size:?}"),
            Event::Normalizing { scale, outliers } => match outliers {
                Some(outliers) => write!(
                    f,
                    "Normalizing image with scale {scale}, removing outliers > {outliers} standard deviations"
                ),
                None => write!(f, "Normalizing image with scale {scale}"),
            },
        }
    }
}

/// Forwards events to `tracing` at the level of [`Event::severity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        match event.severity() {
            Severity::Debug => debug!("{event}"),
            Severity::Info => info!("{event}"),
            Severity::Warning => warn!("{event}"),
            Severity::Error => error!("{event}"),
        }
    }
}

/// Keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn rejections(&self) -> Vec<RoiError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Rejected(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Reports `err` as a rejection and hands it back for propagation.
pub(crate) fn reject(reporter: &dyn Reporter, err: RoiError) -> RoiError {
    reporter.report(&Event::Rejected(err.clone()));
    err
}
