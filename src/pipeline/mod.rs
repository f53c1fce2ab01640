pub mod calibration;
pub mod flow;
pub mod integrator;
pub mod roi;

pub use calibration::CalibrationModel;
pub use flow::{FlowMeasurement, FlowProxyEstimator};
pub use roi::{RoiPlanner, RoiRect};
