// Hardware abstraction for the swerve base.
//
// Provides:
// - Device traits the control code drives (drive motor, steer motor,
//   absolute encoder, heading source)
// - Serial smart-controller bus protocol + per-device handles

pub mod bus;

use thiserror::Error;

pub use bus::{BusDriveMotor, BusEncoder, BusGyro, BusSteerMotor, ServoBus};

/// Idle behavior of a motor controller when commanded output is zero.
/// Configured once at startup, not per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeutralMode {
    Coast,
    Brake,
}

/// Error type for device communication.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from device {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for device {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Device {id} reported fault status: 0x{status:02X}")]
    DeviceFault { id: u8, status: u8 },

    #[error("Timeout waiting for response from device {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Closed-loop velocity controller spinning a wheel.
pub trait DriveMotor {
    /// Command a rotor velocity in rotations per second (signed).
    fn set_velocity_rps(&mut self, rps: f64) -> Result<()>;

    /// Configure the idle behavior. Called once during initialization.
    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()>;

    /// Measured rotor position in rotations, for telemetry.
    fn position_rotations(&mut self) -> Result<f64>;
}

/// Closed-loop position controller steering a wheel.
pub trait SteerMotor {
    /// Command a rotor position in rotations (signed, multi-turn).
    fn set_position_rotations(&mut self, rotations: f64) -> Result<()>;

    /// Overwrite the controller's internal position register without moving
    /// the rotor. This redefines where "zero" is; used only by absolute sync.
    fn overwrite_position_rotations(&mut self, rotations: f64) -> Result<()>;

    /// Configure the idle behavior. Called once during initialization.
    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()>;
}

/// Absolute angle sensor on a steering axis. Stable across power cycles.
pub trait AbsoluteEncoder {
    /// Fractional rotation in [0, 1), monotonically mapped to the physical
    /// angle.
    fn fraction_of_rotation(&mut self) -> Result<f64>;
}

/// Field-relative heading reference (gyroscope yaw).
pub trait HeadingSource {
    /// Current heading in degrees, counter-clockwise positive.
    fn heading_degrees(&mut self) -> Result<f64>;
}
