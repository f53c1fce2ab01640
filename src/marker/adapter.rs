use image::GrayImage;
use tracing::{debug, warn};

use crate::error::DetectionError;
use crate::marker::detection::{RawDetection, TagDetection};

/// A marker-detection backend. Implementations are selected once when the
/// adapter is built; the sampler never inspects backend output shapes.
pub trait MarkerDetector: Send {
    fn detect(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, DetectionError>;
}

/// Wraps one backend and turns its output into at most one normalized
/// detection per frame. Backend failures are logged and absorbed; no
/// detection is a normal, frequent outcome.
pub struct MarkerAdapter {
    backend: Box<dyn MarkerDetector>,
}

impl MarkerAdapter {
    pub fn new(backend: Box<dyn MarkerDetector>) -> Self {
        Self { backend }
    }

    pub fn detect(&mut self, frame: &GrayImage) -> Option<TagDetection> {
        let detections = match self
            .backend
            .detect(frame.as_raw(), frame.width(), frame.height())
        {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Marker backend failure: {}", e);
                return None;
            }
        };
        let raw = detections.into_iter().next()?;
        match raw.normalize() {
            Some(tag) => Some(tag),
            None => {
                debug!("Discarding malformed detection for marker {}", raw.id);
                None
            }
        }
    }
}

/// Bridge for backends that hand over loosely shaped JSON payloads.
pub struct JsonMarkerDetector<F> {
    produce: F,
}

impl<F> JsonMarkerDetector<F>
where
    F: FnMut(&[u8], u32, u32) -> Result<serde_json::Value, DetectionError> + Send,
{
    pub fn new(produce: F) -> Self {
        Self { produce }
    }
}

impl<F> MarkerDetector for JsonMarkerDetector<F>
where
    F: FnMut(&[u8], u32, u32) -> Result<serde_json::Value, DetectionError> + Send,
{
    fn detect(
        &mut self,
        luma: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let payload = (self.produce)(luma, width, height)?;
        serde_json::from_value(payload).map_err(|e| DetectionError::Malformed(e.to_string()))
    }
}
