use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Acquisition Error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("Calibration Error: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Session Error: {0}")]
    Session(String),
}

// Frame source failures, the only kind that is fatal to starting a
// session. Everything further down is absorbed per tick.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Access to the frame source was denied: {0}")]
    AccessDenied(String),
    #[error("The frame source is closed.")]
    Closed,
}

// Marker or digit-recognition backend failures. Caught where the backend
// is called and downgraded to "no detection" / "no reading".
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector backend failure: {0}")]
    Backend(String),
    #[error("Malformed detector output: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Not enough scale readings to fit a calibration: have {have}, need at least 2")]
    InsufficientData { have: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
