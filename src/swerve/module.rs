// Control logic for one swerve corner.
//
// A module owns its drive motor, steering motor and absolute encoder, and
// turns a (speed, angle) target into actuator commands. The two pieces of
// real logic live here: the shortest-path direction-flip optimization, and
// the absolute-to-relative steering sync that cancels relative-encoder
// drift across power cycles.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use tracing::{debug, info};

use super::ConfigError;
use super::angle::{radians_to_rotations, shortest_delta, wrap_to_pi};
use super::kinematics::ModuleState;
use crate::hardware::{AbsoluteEncoder, DriveMotor, NeutralMode, Result, SteerMotor};

/// Fixed mechanical parameters of one corner. Checked once at construction;
/// drive-time code assumes they are valid.
#[derive(Debug, Clone, Copy)]
pub struct ModuleConfig {
    /// Name used in logs and telemetry ("FL", "FR", ...).
    pub name: &'static str,
    /// Wheel diameter in meters.
    pub wheel_diameter_m: f64,
    /// Drive motor rotations per wheel rotation.
    pub drive_gear_ratio: f64,
    /// Steering motor rotations per steering-axis rotation.
    pub steer_gear_ratio: f64,
    /// Mechanical mounting correction subtracted from the absolute reading,
    /// in radians.
    pub angle_offset_rad: f64,
}

impl ModuleConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.wheel_diameter_m.is_finite() && self.wheel_diameter_m > 0.0) {
            return Err(ConfigError::InvalidWheelDiameter(self.wheel_diameter_m));
        }
        if !(self.drive_gear_ratio.is_finite() && self.drive_gear_ratio > 0.0) {
            return Err(ConfigError::InvalidGearRatio {
                which: "Drive",
                value: self.drive_gear_ratio,
            });
        }
        if !(self.steer_gear_ratio.is_finite() && self.steer_gear_ratio > 0.0) {
            return Err(ConfigError::InvalidGearRatio {
                which: "Steer",
                value: self.steer_gear_ratio,
            });
        }
        if !self.angle_offset_rad.is_finite() {
            return Err(ConfigError::NonFiniteAngleOffset(self.angle_offset_rad));
        }
        Ok(())
    }
}

/// One independently driven and steered wheel corner.
pub struct SwerveModule<D, S, E> {
    drive: D,
    steer: S,
    encoder: E,
    config: ModuleConfig,
}

impl<D, S, E> SwerveModule<D, S, E>
where
    D: DriveMotor,
    S: SteerMotor,
    E: AbsoluteEncoder,
{
    /// Take ownership of the corner's devices. Fails fast on bad gearing or
    /// geometry; no actuator is touched yet.
    pub fn new(
        drive: D,
        steer: S,
        encoder: E,
        config: ModuleConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            drive,
            steer,
            encoder,
            config,
        })
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    /// Configure both motors for closed-loop control with brake idle, then
    /// seed the steering position from the absolute encoder. Must run once
    /// before the first `set_state`.
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing module {}", self.config.name);
        self.drive.set_neutral_mode(NeutralMode::Brake)?;
        self.steer.set_neutral_mode(NeutralMode::Brake)?;
        self.sync_to_absolute()
    }

    /// Current wheel angle from the absolute encoder, in radians.
    ///
    /// Deliberately NOT wrapped: the raw value is the mounting-corrected
    /// sensor reading and may lie outside (-PI, PI]. Callers that need the
    /// canonical form wrap it themselves.
    pub fn read_absolute_angle(&mut self) -> Result<f64> {
        let fraction = self.encoder.fraction_of_rotation()?;
        Ok(fraction * TAU - self.config.angle_offset_rad)
    }

    /// Overwrite the steering motor's relative position register with the
    /// absolute angle, scaled through the steering gear ratio. After this
    /// the relative position maps 1:1 to the true wheel angle. Safe to
    /// repeat whenever drift correction is needed.
    pub fn sync_to_absolute(&mut self) -> Result<()> {
        let angle = self.read_absolute_angle()?;
        let rotations = radians_to_rotations(angle) * self.config.steer_gear_ratio;
        debug!(
            "Module {}: syncing steer position to {:.4} rot ({:.3} rad)",
            self.config.name, rotations, angle
        );
        self.steer.overwrite_position_rotations(rotations)
    }

    /// Command this corner to the given wheel speed and direction.
    ///
    /// If reaching `target_angle_rad` the direct way would steer more than
    /// 90 degrees, the module instead steers to the opposite direction and
    /// reverses the wheel; the two are physically equivalent and the flip
    /// bounds steering travel per command to PI/2. A zero speed still
    /// commands the angle; steering is never skipped.
    ///
    /// Returns the state actually commanded (post-optimization).
    pub fn set_state(&mut self, speed_mps: f64, target_angle_rad: f64) -> Result<ModuleState> {
        let current = self.read_absolute_angle()?;

        let mut speed = speed_mps;
        let mut target = wrap_to_pi(target_angle_rad);

        let delta = shortest_delta(target, current);
        if delta.abs() > FRAC_PI_2 {
            speed = -speed;
            target = wrap_to_pi(target + PI);
        }

        let steer_rotations = radians_to_rotations(target) * self.config.steer_gear_ratio;
        self.steer.set_position_rotations(steer_rotations)?;

        let wheel_circumference = PI * self.config.wheel_diameter_m;
        let rps = speed / wheel_circumference * self.config.drive_gear_ratio;
        self.drive.set_velocity_rps(rps)?;

        Ok(ModuleState::new(speed, target))
    }

    /// Measured drive rotor position in rotations, for telemetry.
    pub fn drive_position_rotations(&mut self) -> Result<f64> {
        self.drive.position_rotations()
    }
}
