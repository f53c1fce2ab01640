use chrono::{DateTime, Utc};
use image::GrayImage;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::Frame;
use crate::config::{SamplingConfig, ScaleRegion};
use crate::error::{AcquisitionError, AppError, CalibrationError};
use crate::export::{self, ExportRow};
use crate::history::{FlowSample, IntegratedSample, SessionHistory};
use crate::intake::FrameSource;
use crate::marker::{MarkerAdapter, TagDetection};
use crate::pipeline::{CalibrationModel, FlowProxyEstimator, RoiPlanner};
use crate::scale::{fusion, DigitReader, DigitReading};

/// Verbs the external UI layer issues against a running session.
enum Command {
    SetManualEntry(String),
    Calibrate {
        reply: oneshot::Sender<Result<(f64, f64), CalibrationError>>,
    },
    Export {
        reply: oneshot::Sender<Vec<ExportRow>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Point-in-time view of a running session, for display layers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub ticks: usize,
    pub integrated_raw: f64,
    pub estimated_mass_g: f64,
    pub slope: f64,
    pub offset: f64,
    pub readings: usize,
}

pub struct SamplingControllerBuilder {
    config: SamplingConfig,
    source: Option<Box<dyn FrameSource>>,
    marker: Option<MarkerAdapter>,
    digit_reader: Option<Box<dyn DigitReader>>,
}

impl SamplingControllerBuilder {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            source: None,
            marker: None,
            digit_reader: None,
        }
    }

    pub fn frame_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn marker_adapter(mut self, marker: MarkerAdapter) -> Self {
        self.marker = Some(marker);
        self
    }

    // Optional; without one, scale truth comes from manual entry only.
    pub fn digit_reader(mut self, reader: Box<dyn DigitReader>) -> Self {
        self.digit_reader = Some(reader);
        self
    }

    pub fn build(self) -> Result<SamplingController, AppError> {
        self.config.validate()?;
        let source = self
            .source
            .ok_or_else(|| AppError::Session("Frame source not set".to_string()))?;
        let marker = self
            .marker
            .ok_or_else(|| AppError::Session("Marker adapter not set".to_string()))?;
        Ok(SamplingController {
            config: self.config,
            source,
            marker,
            digit_reader: self.digit_reader,
        })
    }
}

/// A configured but not yet running sampler. `start` opens the frame
/// source and moves everything onto a dedicated task.
pub struct SamplingController {
    config: SamplingConfig,
    source: Box<dyn FrameSource>,
    marker: MarkerAdapter,
    digit_reader: Option<Box<dyn DigitReader>>,
}

impl SamplingController {
    pub async fn start(mut self) -> Result<SamplingHandle, AcquisitionError> {
        self.source.open().await?;
        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        info!("Starting sampling session {}", session_id);
        let worker = SessionWorker {
            session_id,
            state: SessionState::new(&self.config),
            config: self.config,
            source: self.source,
            marker: self.marker,
            digit_reader: self.digit_reader,
            cancel: cancel.clone(),
            commands: cmd_rx,
            commands_open: true,
        };
        let task = tokio::spawn(worker.run());
        Ok(SamplingHandle {
            session_id,
            cancel,
            cmd_tx,
            task: Some(task),
        })
    }
}

/// Owner-side handle to a running session. Dropping it cancels the
/// session; `stop` additionally waits for the task to wind down.
pub struct SamplingHandle {
    session_id: Uuid,
    cancel: CancellationToken,
    cmd_tx: mpsc::Sender<Command>,
    task: Option<JoinHandle<()>>,
}

impl SamplingHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Replace the manual scale entry. It persists across ticks until
    /// replaced; an empty string clears it.
    pub async fn set_manual_entry(&self, entry: impl Into<String>) -> Result<(), AppError> {
        self.send(Command::SetManualEntry(entry.into())).await
    }

    /// Fit the calibration model against every scale reading so far.
    pub async fn calibrate(&self) -> Result<(f64, f64), AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Calibrate { reply: tx }).await?;
        let fitted = rx
            .await
            .map_err(|_| AppError::Session("Session ended before replying".to_string()))?;
        fitted.map_err(AppError::Calibration)
    }

    pub async fn export(&self) -> Result<Vec<ExportRow>, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Export { reply: tx }).await?;
        rx.await
            .map_err(|_| AppError::Session("Session ended before replying".to_string()))
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply: tx }).await?;
        rx.await
            .map_err(|_| AppError::Session("Session ended before replying".to_string()))
    }

    /// Best-effort stop: the in-flight tick may finish its pending
    /// collaborator calls, but their results are discarded.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Sampling task ended abnormally: {}", e);
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), AppError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| AppError::Session("Session is no longer running".to_string()))
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionWorker {
    session_id: Uuid,
    config: SamplingConfig,
    source: Box<dyn FrameSource>,
    marker: MarkerAdapter,
    digit_reader: Option<Box<dyn DigitReader>>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    state: SessionState,
}

impl SessionWorker {
    async fn run(mut self) {
        self.state.reset();
        let period = Duration::from_secs_f64(1.0 / self.config.fps);
        let started = Instant::now();
        info!(
            "Sampling session {} running at {:.1} Hz",
            self.session_id, self.config.fps
        );
        while !self.cancel.is_cancelled() {
            let tick_start = Instant::now();
            let t = tick_start.duration_since(started).as_secs_f64();
            self.tick(t).await;
            // sleep out the rest of the period; an overrunning tick rolls
            // straight into the next one, with no catch-up burst
            self.idle_until(tick_start + period).await;
        }
        self.source.close().await;
        info!(
            "Sampling session {} stopped after {} ticks",
            self.session_id,
            self.state.history.flow().len()
        );
    }

    /// One sampling tick. Nothing raised in here escapes: failures are
    /// logged and the loop moves on to the next scheduled tick.
    async fn tick(&mut self, t: f64) {
        let frame = match self.acquire_frame().await {
            Some(frame) => frame,
            None => return,
        };
        let captured_at = frame.captured_at();
        let gray = frame.image().to_luma8();
        let tag = self.marker.detect(&gray);
        let ocr = self.read_scale_digits(&gray).await;
        if self.cancel.is_cancelled() {
            // stop requested while awaiting a collaborator: discard
            return;
        }
        let sample = self.state.record_tick(t, captured_at, gray, tag, ocr);
        debug!(
            "Tick t={:.3}s integrated {:.6} mass {:.2} g",
            t, sample.integrated_raw, sample.mass_g
        );
    }

    /// Await the next frame while staying responsive to commands and
    /// cancellation. Returns None when the tick should be abandoned.
    async fn acquire_frame(&mut self) -> Option<Frame> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(command) => self.state.handle_command(command),
                        None => self.commands_open = false,
                    }
                }
                frame = self.source.next_frame() => {
                    match frame {
                        Ok(frame) => return Some(frame),
                        Err(e) => {
                            error!("Frame acquisition failed: {}", e);
                            return None;
                        }
                    }
                }
            }
        }
    }

    async fn read_scale_digits(&mut self, gray: &GrayImage) -> Option<DigitReading> {
        let reader = self.digit_reader.as_mut()?;
        let region = self.config.scale_region.as_ref()?;
        let (crop, width, height) = crop_scale_region(gray, region)?;
        match reader.recognize(&crop, width, height).await {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!("Digit recognition failed: {}", e);
                None
            }
        }
    }

    async fn idle_until(&mut self, deadline: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            self.state.handle_command(command);
        }
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = &mut sleep => return,
                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(command) => self.state.handle_command(command),
                        None => self.commands_open = false,
                    }
                }
            }
        }
    }
}

/// All per-session mutable state. Exclusively owned by the sampling
/// task; correctness rests on ticks never overlapping, not on locks.
struct SessionState {
    planner: RoiPlanner,
    estimator: FlowProxyEstimator,
    calibration: CalibrationModel,
    history: SessionHistory,
    prev_gray: Option<GrayImage>,
    manual_entry: String,
}

impl SessionState {
    fn new(config: &SamplingConfig) -> Self {
        Self {
            planner: RoiPlanner::new(config.offset_factor),
            estimator: FlowProxyEstimator::new(config.proxy_smooth_window, config.diff_threshold),
            calibration: CalibrationModel::default(),
            history: SessionHistory::new(),
            prev_gray: None,
            manual_entry: String::new(),
        }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.estimator.reset();
        self.prev_gray = None;
        self.manual_entry.clear();
    }

    /// The synchronous body of one tick, over an already-acquired
    /// grayscale frame and already-gathered truth inputs.
    fn record_tick(
        &mut self,
        t: f64,
        captured_at: DateTime<Utc>,
        gray: GrayImage,
        tag: Option<TagDetection>,
        ocr: Option<DigitReading>,
    ) -> IntegratedSample {
        let (frame_w, frame_h) = gray.dimensions();
        let roi = self.planner.plan(tag.as_ref(), frame_w, frame_h);
        let measurement = self.estimator.estimate(&gray, self.prev_gray.as_ref(), &roi);
        self.history.push_flow(FlowSample {
            t,
            raw: measurement.raw,
            smoothed: measurement.smoothed,
            captured_at,
        });

        let integrated_raw = self.history.integrate_flow();
        let mass_g = self.calibration.apply(integrated_raw);
        let sample = IntegratedSample {
            t,
            integrated_raw,
            mass_g,
        };
        self.history.push_integrated(sample);

        let manual = if self.manual_entry.is_empty() {
            None
        } else {
            Some(self.manual_entry.as_str())
        };
        if let Some(reading) = fusion::fuse(t, manual, ocr) {
            self.history.push_reading(reading);
        }

        self.prev_gray = Some(gray);
        sample
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetManualEntry(entry) => {
                self.manual_entry = entry;
            }
            Command::Calibrate { reply } => {
                let _ = reply.send(self.calibrate());
            }
            Command::Export { reply } => {
                let _ = reply.send(export::build_rows(&self.history));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn calibrate(&mut self) -> Result<(f64, f64), CalibrationError> {
        let points = self.history.calibration_points();
        let fitted = self.calibration.fit(&points)?;
        info!(
            "Calibration updated over {} readings: slope {:.6}, offset {:.6}",
            points.len(),
            fitted.0,
            fitted.1
        );
        Ok(fitted)
    }

    fn snapshot(&self) -> SessionSnapshot {
        let last = self.history.integrated().last();
        SessionSnapshot {
            ticks: self.history.flow().len(),
            integrated_raw: last.map_or(0.0, |s| s.integrated_raw),
            estimated_mass_g: last.map_or_else(|| self.calibration.apply(0.0), |s| s.mass_g),
            slope: self.calibration.slope(),
            offset: self.calibration.offset(),
            readings: self.history.readings().len(),
        }
    }
}

fn crop_scale_region(gray: &GrayImage, region: &ScaleRegion) -> Option<(Vec<u8>, u32, u32)> {
    let (frame_w, frame_h) = gray.dimensions();
    if region.x >= frame_w || region.y >= frame_h {
        return None;
    }
    let width = region.width.min(frame_w - region.x);
    let height = region.height.min(frame_h - region.y);
    if width == 0 || height == 0 {
        return None;
    }
    let crop = image::imageops::crop_imm(gray, region.x, region.y, width, height).to_image();
    Some((crop.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::intake::ChannelFrameSource;
    use crate::marker::{MarkerDetector, RawDetection};
    use crate::scale::ReadingSource;
    use async_trait::async_trait;
    use image::DynamicImage;
    use tokio::sync::mpsc;

    struct NoMarkerBackend;

    impl MarkerDetector for NoMarkerBackend {
        fn detect(
            &mut self,
            _luma: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<RawDetection>, DetectionError> {
            Ok(Vec::new())
        }
    }

    struct FixedDigitReader {
        reading: DigitReading,
    }

    #[async_trait]
    impl DigitReader for FixedDigitReader {
        async fn recognize(
            &mut self,
            _region: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<DigitReading, DetectionError> {
            Ok(self.reading)
        }
    }

    struct UnavailableSource;

    #[async_trait]
    impl crate::intake::FrameSource for UnavailableSource {
        async fn open(&mut self) -> Result<(), AcquisitionError> {
            Err(AcquisitionError::SourceUnavailable(
                "no camera attached".to_string(),
            ))
        }

        async fn next_frame(&mut self) -> Result<Frame, AcquisitionError> {
            Err(AcquisitionError::Closed)
        }

        async fn close(&mut self) {}
    }

    fn test_frame() -> Frame {
        Frame::new(DynamicImage::new_luma8(64, 64), Utc::now())
    }

    fn builder(config: SamplingConfig) -> SamplingControllerBuilder {
        SamplingControllerBuilder::new(config).marker_adapter(MarkerAdapter::new(Box::new(
            NoMarkerBackend,
        )))
    }

    #[test]
    fn ten_ticks_of_constant_flow_calibrate_end_to_end() {
        let mut state = SessionState::new(&SamplingConfig::default());
        for i in 0..10 {
            state.history.push_flow(FlowSample {
                t: i as f64,
                raw: 0.1,
                smoothed: 0.1,
                captured_at: Utc::now(),
            });
        }
        assert!((state.history.integrate_flow() - 0.9).abs() < 1e-12);

        // truth from mass = 100 * integral + 5, straddling the range
        for (t, mass_g) in [(4.0, 45.0), (9.0, 95.0)] {
            state.history.push_reading(crate::scale::ScaleReading {
                t,
                mass_g,
                source: ReadingSource::Manual,
                confidence: None,
            });
        }
        let (slope, offset) = state.calibrate().expect("two readings should fit");
        assert!((slope - 100.0).abs() < 1e-6);
        assert!((offset - 5.0).abs() < 1e-6);
        assert!((state.calibration.apply(0.9) - 95.0).abs() < 1e-6);
    }

    #[test]
    fn record_tick_appends_all_sequences_in_order() {
        let mut state = SessionState::new(&SamplingConfig::default());
        state.manual_entry = "12.5".to_string();
        let gray = GrayImage::from_pixel(64, 64, image::Luma([0]));
        for i in 0..3 {
            state.record_tick(i as f64, Utc::now(), gray.clone(), None, None);
        }
        assert_eq!(state.history.flow().len(), 3);
        assert_eq!(state.history.integrated().len(), 3);
        assert_eq!(state.history.readings().len(), 3);
        assert_eq!(state.history.readings()[0].source, ReadingSource::Manual);
        assert!(state.prev_gray.is_some());
    }

    #[test]
    fn ocr_truth_is_recorded_when_manual_is_absent() {
        let mut state = SessionState::new(&SamplingConfig::default());
        let gray = GrayImage::from_pixel(32, 32, image::Luma([0]));
        state.record_tick(
            0.0,
            Utc::now(),
            gray,
            None,
            Some(DigitReading {
                value: 33.0,
                confidence: 0.9,
            }),
        );
        assert_eq!(state.history.readings().len(), 1);
        assert_eq!(state.history.readings()[0].source, ReadingSource::Ocr);
    }

    #[test]
    fn resolution_change_records_a_zero_proxy_tick() {
        let mut state = SessionState::new(&SamplingConfig::default());
        state.record_tick(
            0.0,
            Utc::now(),
            GrayImage::from_pixel(64, 64, image::Luma([200])),
            None,
            None,
        );
        state.record_tick(
            1.0,
            Utc::now(),
            GrayImage::from_pixel(32, 32, image::Luma([0])),
            None,
            None,
        );
        assert_eq!(state.history.flow().len(), 2);
        assert_eq!(state.history.flow()[1].raw, 0.0);
    }

    #[tokio::test]
    async fn start_fails_when_the_source_is_unavailable() {
        let controller = builder(SamplingConfig::default())
            .frame_source(Box::new(UnavailableSource))
            .build()
            .expect("builder should succeed");
        assert!(matches!(
            controller.start().await,
            Err(AcquisitionError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn build_requires_a_frame_source() {
        assert!(builder(SamplingConfig::default()).build().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn session_ticks_commands_and_stops() {
        let config = SamplingConfig {
            fps: 100.0,
            scale_region: Some(ScaleRegion {
                x: 0,
                y: 0,
                width: 16,
                height: 8,
            }),
            ..Default::default()
        };
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let controller = builder(config)
            .frame_source(Box::new(ChannelFrameSource::new(frame_rx)))
            .digit_reader(Box::new(FixedDigitReader {
                reading: DigitReading {
                    value: f64::NAN,
                    confidence: 0.0,
                },
            }))
            .build()
            .expect("builder should succeed");
        let handle = controller.start().await.expect("start should succeed");

        for _ in 0..3 {
            frame_tx.send(test_frame()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = handle.snapshot().await.expect("snapshot should reply");
        assert_eq!(snapshot.ticks, 3);
        assert_eq!(snapshot.readings, 0);

        handle
            .set_manual_entry("42.0")
            .await
            .expect("manual entry should be accepted");
        // let the idle loop drain the command before more frames arrive
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..2 {
            frame_tx.send(test_frame()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.ticks, 5);
        assert_eq!(snapshot.readings, 2);

        // both readings integrate over a flat history, so the fit is
        // degenerate but still finite
        let fitted = handle.calibrate().await;
        assert!(fitted.is_ok());

        let rows = handle.export().await.expect("export should reply");
        assert_eq!(rows.len(), 5);

        handle.stop().await;
        assert!(frame_tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn calibrate_with_no_readings_is_insufficient() {
        let (_frame_tx, frame_rx) = mpsc::channel(4);
        let controller = builder(SamplingConfig::default())
            .frame_source(Box::new(ChannelFrameSource::new(frame_rx)))
            .build()
            .unwrap();
        let handle = controller.start().await.unwrap();
        let result = handle.calibrate().await;
        assert!(matches!(
            result,
            Err(AppError::Calibration(CalibrationError::InsufficientData {
                have: 0
            }))
        ));
        handle.stop().await;
    }
}
