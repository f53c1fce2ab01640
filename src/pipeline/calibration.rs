use tracing::warn;

use crate::error::CalibrationError;

// Substituted for a zero least-squares denominator so a zero-variance
// fit stays finite. The resulting model is unstable; the warning below
// is the only signal.
const DENOMINATOR_FLOOR: f64 = 1e-12;

/// Affine map from raw integrated units to grams. Identity until the
/// first successful fit; overwritten atomically on refit, never reverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationModel {
    slope: f64,
    offset: f64,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            slope: 1.0,
            offset: 0.0,
        }
    }
}

impl CalibrationModel {
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn apply(&self, x: f64) -> f64 {
        self.slope * x + self.offset
    }

    /// Ordinary least squares over (integrated, mass) points via the
    /// closed-form normal equations. Fewer than two points leave the
    /// current model untouched.
    pub fn fit(&mut self, points: &[(f64, f64)]) -> Result<(f64, f64), CalibrationError> {
        let n = points.len();
        if n < 2 {
            return Err(CalibrationError::InsufficientData { have: n });
        }
        let nf = n as f64;
        let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
        for &(x, y) in points {
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }
        let mut denominator = nf * sum_xx - sum_x * sum_x;
        if denominator.abs() < DENOMINATOR_FLOOR {
            warn!(
                "Degenerate calibration fit over {} points with zero signal variance, flooring denominator {:.3e}",
                n, denominator
            );
            denominator = if denominator.is_sign_negative() {
                -DENOMINATOR_FLOOR
            } else {
                DENOMINATOR_FLOOR
            };
        }
        let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
        let offset = (sum_y - slope * sum_x) / nf;
        self.slope = slope;
        self.offset = offset;
        Ok((slope, offset))
    }
}
