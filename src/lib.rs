// Swerve drivetrain runtime: zenoh command transport around a four-corner
// swerve base on a serial smart-controller bus.

pub mod config;
pub mod hardware;
pub mod messages;
pub mod runtime;
pub mod swerve;
pub mod telemetry;
