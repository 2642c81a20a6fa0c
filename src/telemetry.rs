// Structured telemetry reported by the drive controller each tick.
//
// Control code pushes one record per drive() call into an injected sink;
// what happens to it (tracing, zenoh, a test buffer) is the sink's concern.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::swerve::kinematics::{MODULE_COUNT, ModuleState};

/// Snapshot of one complete actuation of the drivetrain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveTelemetry {
    /// Chassis-frame command after any field-relative rotation.
    pub vx_mps: f64,
    pub vy_mps: f64,
    pub omega_radps: f64,
    /// Heading used for the field-relative rotation, degrees. None when the
    /// command was already chassis-relative.
    pub heading_deg: Option<f64>,
    /// States actually commanded to the modules (post flip optimization and
    /// desaturation), FL, FR, BL, BR order.
    pub commanded: [ModuleState; MODULE_COUNT],
    /// Measured drive rotor positions in rotations, same order.
    pub drive_positions_rot: [f64; MODULE_COUNT],
    /// Whether desaturation rescaled the speeds this tick.
    pub desaturated: bool,
}

/// Destination for telemetry records. Implementations must not block; the
/// control loop calls this synchronously every tick.
pub trait TelemetrySink {
    fn record(&mut self, telemetry: &DriveTelemetry);
}

// Lets the runtime hand the drive a shared handle and keep one for itself.
impl<T: TelemetrySink> TelemetrySink for Rc<RefCell<T>> {
    fn record(&mut self, telemetry: &DriveTelemetry) {
        self.borrow_mut().record(telemetry);
    }
}

/// Sink that forwards records to the tracing subscriber at debug level.
#[derive(Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&mut self, telemetry: &DriveTelemetry) {
        debug!(
            "drive: cmd=({:.2}, {:.2}, {:.2}) desaturated={} commanded={:?}",
            telemetry.vx_mps,
            telemetry.vy_mps,
            telemetry.omega_radps,
            telemetry.desaturated,
            telemetry.commanded
        );
    }
}

/// Sink that keeps the most recent record for someone else to publish.
/// The runtime drains it once per tick onto the zenoh telemetry topic.
#[derive(Default)]
pub struct LatestSink {
    latest: Option<DriveTelemetry>,
}

impl LatestSink {
    pub fn take(&mut self) -> Option<DriveTelemetry> {
        self.latest.take()
    }
}

impl TelemetrySink for LatestSink {
    fn record(&mut self, telemetry: &DriveTelemetry) {
        self.latest = Some(telemetry.clone());
    }
}
