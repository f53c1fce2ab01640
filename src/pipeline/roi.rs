use crate::marker::TagDetection;

/// Frame-bounded analysis rectangle. `x + width <= frame_w` and
/// `y + height <= frame_h` hold for every rect the planner returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RoiRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// ROI extent in units of the marker edge length.
const ROI_WIDTH_FACTOR: f64 = 0.8;
const ROI_HEIGHT_FACTOR: f64 = 1.6;

// Fixed-fraction fallback box used when no marker is visible.
const FALLBACK_WIDTH_FRAC: f64 = 0.12;
const FALLBACK_HEIGHT_FRAC: f64 = 0.2;
const FALLBACK_TOP_FRAC: f64 = 0.4;

/// Derives the analysis rectangle from marker geometry, or from a fixed
/// fallback heuristic when no marker is visible.
pub struct RoiPlanner {
    offset_factor: f64,
}

impl RoiPlanner {
    pub fn new(offset_factor: f64) -> Self {
        Self { offset_factor }
    }

    pub fn plan(&self, tag: Option<&TagDetection>, frame_w: u32, frame_h: u32) -> RoiRect {
        if let Some(tag) = tag {
            if let Some(rect) = self.plan_from_tag(tag, frame_w, frame_h) {
                return rect;
            }
        }
        Self::fallback(frame_w, frame_h)
    }

    /// Marker-relative placement: walk from the marker center along the
    /// perpendicular of the first edge by `offset_factor` edge lengths,
    /// then size the rect from the edge length.
    fn plan_from_tag(&self, tag: &TagDetection, frame_w: u32, frame_h: u32) -> Option<RoiRect> {
        let c = &tag.corners;
        let center_x = (c[0].x + c[1].x + c[2].x + c[3].x) / 4.0;
        let center_y = (c[0].y + c[1].y + c[2].y + c[3].y) / 4.0;

        let edge_x = c[1].x - c[0].x;
        let edge_y = c[1].y - c[0].y;
        let scale = (edge_x * edge_x + edge_y * edge_y).sqrt();
        if !scale.is_finite() || scale < f64::EPSILON {
            return None;
        }
        let (perp_x, perp_y) = (-edge_y / scale, edge_x / scale);

        let roi_cx = center_x + perp_x * self.offset_factor * scale;
        let roi_cy = center_y + perp_y * self.offset_factor * scale;
        let width = ROI_WIDTH_FACTOR * scale;
        let height = ROI_HEIGHT_FACTOR * scale;
        if !roi_cx.is_finite() || !roi_cy.is_finite() {
            return None;
        }

        let x0 = (roi_cx - width / 2.0).round() as i64;
        let y0 = (roi_cy - height / 2.0).round() as i64;
        Some(Self::clamp(
            x0,
            y0,
            width.round() as i64,
            height.round() as i64,
            frame_w,
            frame_h,
        ))
    }

    fn fallback(frame_w: u32, frame_h: u32) -> RoiRect {
        let width = (FALLBACK_WIDTH_FRAC * frame_w as f64).round() as i64;
        let height = (FALLBACK_HEIGHT_FRAC * frame_h as f64).round() as i64;
        let x0 = (frame_w as i64 - width) / 2;
        let y0 = (FALLBACK_TOP_FRAC * frame_h as f64).round() as i64;
        Self::clamp(x0, y0, width, height, frame_w, frame_h)
    }

    /// Pin the origin inside the frame, then clip the extent to what is
    /// left. Extents never drop below one pixel.
    fn clamp(x0: i64, y0: i64, width: i64, height: i64, frame_w: u32, frame_h: u32) -> RoiRect {
        let frame_w = (frame_w as i64).max(1);
        let frame_h = (frame_h as i64).max(1);
        let x = x0.clamp(0, frame_w - 1);
        let y = y0.clamp(0, frame_h - 1);
        let width = width.max(1).min(frame_w - x);
        let height = height.max(1).min(frame_h - y);
        RoiRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        }
    }
}
