use image::GrayImage;
use std::collections::VecDeque;

use crate::pipeline::roi::RoiRect;

/// One motion-proxy measurement: the raw per-frame density and its
/// causal trailing average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowMeasurement {
    pub raw: f64,
    pub smoothed: f64,
}

/// Computes a scalar motion density from consecutive grayscale frames
/// inside the ROI and smooths it over a trailing window. The window is
/// owned here and cleared at session start.
pub struct FlowProxyEstimator {
    window: VecDeque<f64>,
    window_size: usize,
    diff_threshold: u8,
}

impl FlowProxyEstimator {
    pub fn new(window_size: usize, diff_threshold: u8) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            diff_threshold,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn estimate(
        &mut self,
        current: &GrayImage,
        previous: Option<&GrayImage>,
        roi: &RoiRect,
    ) -> FlowMeasurement {
        let raw = motion_density(current, previous, roi, self.diff_threshold);
        let smoothed = self.record(raw);
        FlowMeasurement { raw, smoothed }
    }

    /// Push one raw value into the trailing window and return the new
    /// window mean. Causal: only past and current samples contribute.
    fn record(&mut self, raw: f64) -> f64 {
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }
}

/// Fraction of ROI pixels whose frame-to-frame change exceeds the noise
/// floor. A missing previous frame or a resolution change yields 0.0:
/// no motion information, not an error.
fn motion_density(
    current: &GrayImage,
    previous: Option<&GrayImage>,
    roi: &RoiRect,
    threshold: u8,
) -> f64 {
    let previous = match previous {
        Some(previous) => previous,
        None => return 0.0,
    };
    if previous.dimensions() != current.dimensions() {
        return 0.0;
    }
    let area = roi.area();
    if area == 0 {
        return 0.0;
    }
    let mut moving = 0u64;
    for y in roi.y..roi.y + roi.height {
        for x in roi.x..roi.x + roi.width {
            let a = current.get_pixel(x, y).0[0];
            let b = previous.get_pixel(x, y).0[0];
            if a.abs_diff(b) > threshold {
                moving += 1;
            }
        }
    }
    moving as f64 / area as f64
}
