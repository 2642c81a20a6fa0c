// Swerve drivetrain control for the four-corner base.
//
// Provides:
// - Angle helpers (wrap, shortest delta, unit conversions)
// - Inverse kinematics (chassis velocity -> module states) and desaturation
// - Per-corner module control with shortest-path steering optimization
// - The drive controller tying the four corners together

pub mod angle;
pub mod drive;
pub mod kinematics;
pub mod module;

use thiserror::Error;

pub use drive::SwerveDrive;
pub use kinematics::{
    ChassisSpeeds, MODULE_COUNT, ModuleState, ModuleTranslation, SwerveKinematics, desaturate,
};
pub use module::{ModuleConfig, SwerveModule};

/// Construction-time configuration error. The drivetrain must not start
/// with invalid geometry or gearing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Wheel diameter must be positive and finite, got {0}")]
    InvalidWheelDiameter(f64),

    #[error("{which} gear ratio must be positive and finite, got {value}")]
    InvalidGearRatio { which: &'static str, value: f64 },

    #[error("Angle offset must be finite, got {0}")]
    NonFiniteAngleOffset(f64),

    #[error("Module {module} translation is not finite")]
    NonFiniteTranslation { module: &'static str },

    #[error("Modules {first} and {second} share the same translation")]
    DuplicateTranslation {
        first: &'static str,
        second: &'static str,
    },

    #[error("Max module speed must be positive and finite, got {0}")]
    InvalidMaxSpeed(f64),
}
