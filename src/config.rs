// Timeouts, topics, device ids and drivetrain geometry
use std::time::Duration;

use crate::swerve::ModuleTranslation;
use crate::swerve::kinematics::MODULE_COUNT;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // commands
pub const TOPIC_TELEMETRY: &str = "swerve/rt/telemetry"; // actuation telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Serial port for the controller bus
pub const BUS_PORT: &str = "/dev/ttyACM0";

// Device ids on the bus, FL, FR, BL, BR order
pub const DRIVE_MOTOR_IDS: [u8; MODULE_COUNT] = [1, 3, 5, 7];
pub const STEER_MOTOR_IDS: [u8; MODULE_COUNT] = [2, 4, 6, 8];
pub const ENCODER_IDS: [u8; MODULE_COUNT] = [11, 12, 13, 14];
pub const GYRO_ID: u8 = 20;

// Mechanical mounting corrections for the absolute encoders, degrees,
// FL, FR, BL, BR order
pub const ANGLE_OFFSETS_DEG: [f64; MODULE_COUNT] = [135.0, 45.0, 225.0, 315.0];

// Wheel and gearing (SDS-style L2 module, 4 inch wheel)
pub const WHEEL_DIAMETER_M: f64 = 0.1016;
pub const DRIVE_GEAR_RATIO: f64 = 6.75;
pub const STEER_GEAR_RATIO: f64 = 12.8;

// Module positions relative to the rotation center, meters, +x forward,
// +y left. Wheelbase and track are both 0.5 m.
pub const MODULE_TRANSLATIONS: [ModuleTranslation; MODULE_COUNT] = [
    ModuleTranslation::new(0.25, 0.25),   // FL
    ModuleTranslation::new(0.25, -0.25),  // FR
    ModuleTranslation::new(-0.25, 0.25),  // BL
    ModuleTranslation::new(-0.25, -0.25), // BR
];

// Physical wheel speed limit fed to desaturation
pub const MAX_MODULE_SPEED_MPS: f64 = 4.5;
