pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod history;
pub mod intake;
pub mod marker;
pub mod pipeline;
pub mod scale;

pub use error::{AcquisitionError, AppError, CalibrationError, ConfigError, DetectionError};

pub use common::Frame;
pub use config::SamplingConfig;
pub use controller::{SamplingController, SamplingControllerBuilder, SamplingHandle};
pub use intake::{ChannelFrameSource, FrameSource};
pub use marker::{MarkerAdapter, MarkerDetector, TagDetection};
pub use scale::{DigitReader, DigitReading};
