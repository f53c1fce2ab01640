use serde::Deserialize;

use crate::error::ConfigError;

/// Crop rectangle over the frame where the scale's digit display sits.
/// Without one, digit recognition is skipped entirely.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScaleRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Process-wide sampling constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Target tick cadence in Hz.
    pub fps: f64,
    /// Trailing-average length for the motion proxy.
    pub proxy_smooth_window: usize,
    /// Per-pixel noise floor for motion detection, on an 8-bit scale.
    pub diff_threshold: u8,
    /// Signed spout-to-marker offset, in units of marker edge length.
    /// Hand-tuned, never auto-derived.
    pub offset_factor: f64,
    pub scale_region: Option<ScaleRegion>,
    /// Depth of the channel feeding frames into the sampler.
    pub frame_buffer_size: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fps: 15.0,
            proxy_smooth_window: 5,
            diff_threshold: 25,
            offset_factor: -2.0,
            scale_region: None,
            frame_buffer_size: 60,
        }
    }
}

impl SamplingConfig {
    /// Layered load: optional config file, then `POURMETER_*` environment
    /// overrides, then defaults for anything left unset.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("POURMETER").try_parsing(true))
            .build()?;
        let loaded: SamplingConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::Invalid(
                "fps must be a positive finite number".to_string(),
            ));
        }
        if self.proxy_smooth_window == 0 {
            return Err(ConfigError::Invalid(
                "proxy smooth window must be greater than 0".to_string(),
            ));
        }
        if !self.offset_factor.is_finite() {
            return Err(ConfigError::Invalid(
                "offset factor must be finite".to_string(),
            ));
        }
        if self.frame_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "frame buffer size must be greater than 0".to_string(),
            ));
        }
        if let Some(region) = &self.scale_region {
            if region.width == 0 || region.height == 0 {
                return Err(ConfigError::Invalid(
                    "scale region must have a non-zero size".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SamplingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fps, 15.0);
        assert_eq!(config.proxy_smooth_window, 5);
        assert_eq!(config.diff_threshold, 25);
        assert_eq!(config.offset_factor, -2.0);
    }

    #[test]
    fn rejects_zero_smoothing_window() {
        let config = SamplingConfig {
            proxy_smooth_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_fps() {
        let config = SamplingConfig {
            fps: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_scale_region() {
        let config = SamplingConfig {
            scale_region: Some(ScaleRegion {
                x: 0,
                y: 0,
                width: 0,
                height: 10,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
