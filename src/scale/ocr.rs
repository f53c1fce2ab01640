use async_trait::async_trait;

use crate::error::DetectionError;

/// One digit-recognition pass over the scale display crop. A NaN value
/// signals "no reading".
#[derive(Debug, Clone, Copy)]
pub struct DigitReading {
    pub value: f64,
    pub confidence: f64,
}

/// External digit-recognition collaborator. The sampler hands it the
/// scale-region crop and never looks inside.
#[async_trait]
pub trait DigitReader: Send {
    async fn recognize(
        &mut self,
        region: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DigitReading, DetectionError>;
}
