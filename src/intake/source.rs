use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::common::Frame;
use crate::error::AcquisitionError;

/// Upstream frame acquisition. Camera, file playback, and test feeds all
/// hide behind this seam; the sampler only ever awaits one frame at a
/// time, and may drop a pending `next_frame` when a stop request arrives.
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self) -> Result<(), AcquisitionError>;
    async fn next_frame(&mut self) -> Result<Frame, AcquisitionError>;
    async fn close(&mut self);
}

/// Frame source fed by an upstream capture task over a bounded channel.
pub struct ChannelFrameSource {
    rx: Option<Receiver<Frame>>,
}

impl ChannelFrameSource {
    pub fn new(rx: Receiver<Frame>) -> Self {
        Self { rx: Some(rx) }
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn open(&mut self) -> Result<(), AcquisitionError> {
        if self.rx.is_some() {
            Ok(())
        } else {
            Err(AcquisitionError::Closed)
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, AcquisitionError> {
        let rx = self.rx.as_mut().ok_or(AcquisitionError::Closed)?;
        rx.recv().await.ok_or(AcquisitionError::Closed)
    }

    async fn close(&mut self) {
        self.rx = None;
    }
}
