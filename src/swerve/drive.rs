// The drive controller: four corners, one velocity command.
//
// drive() is the single per-tick entry point. One call reads the heading
// once, runs the inverse kinematics, desaturates speeds against the
// physical limit and actuates all four modules in fixed FL, FR, BL, BR
// order. Fully synchronous, no queuing; the caller owns the cadence.

use tracing::{debug, info, warn};

use super::ConfigError;
use super::kinematics::{ChassisSpeeds, MODULE_COUNT, ModuleState, SwerveKinematics, desaturate};
use super::module::SwerveModule;
use crate::hardware::{AbsoluteEncoder, DriveMotor, HeadingSource, Result, SteerMotor};
use crate::telemetry::{DriveTelemetry, TelemetrySink};

pub struct SwerveDrive<D, S, E, H>
where
    D: DriveMotor,
    S: SteerMotor,
    E: AbsoluteEncoder,
    H: HeadingSource,
{
    modules: [SwerveModule<D, S, E>; MODULE_COUNT],
    kinematics: SwerveKinematics,
    heading: H,
    max_speed_mps: f64,
    sink: Box<dyn TelemetrySink>,
}

impl<D, S, E, H> SwerveDrive<D, S, E, H>
where
    D: DriveMotor,
    S: SteerMotor,
    E: AbsoluteEncoder,
    H: HeadingSource,
{
    /// Assemble the drivetrain. Modules are FL, FR, BL, BR, matching the
    /// kinematics geometry order. `max_speed_mps` is the physical wheel
    /// speed limit fed to desaturation.
    pub fn new(
        modules: [SwerveModule<D, S, E>; MODULE_COUNT],
        kinematics: SwerveKinematics,
        heading: H,
        max_speed_mps: f64,
        sink: Box<dyn TelemetrySink>,
    ) -> std::result::Result<Self, ConfigError> {
        if !(max_speed_mps.is_finite() && max_speed_mps > 0.0) {
            return Err(ConfigError::InvalidMaxSpeed(max_speed_mps));
        }
        Ok(Self {
            modules,
            kinematics,
            heading,
            max_speed_mps,
            sink,
        })
    }

    /// Brake-mode every motor and sync all steering axes to their absolute
    /// encoders. Must run once before the first drive() call.
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing swerve drive");
        for module in &mut self.modules {
            module.initialize()?;
        }
        Ok(())
    }

    /// Re-sync every steering axis to its absolute encoder. Useful after a
    /// controller reports a power cycle or fault.
    pub fn resync_steering(&mut self) -> Result<()> {
        for module in &mut self.modules {
            module.sync_to_absolute()?;
        }
        Ok(())
    }

    /// Drive the chassis at the requested velocity. With `field_relative`
    /// the (vx, vy) command is given in the field frame and is rotated by
    /// the negative of the current heading into the chassis frame; heading
    /// is read exactly once, at the start of the call.
    ///
    /// Sign convention: heading and omega are CCW-positive. At heading
    /// 90 degrees a field-frame (1, 0) command becomes chassis (0, -1).
    pub fn drive(
        &mut self,
        vx_mps: f64,
        vy_mps: f64,
        omega_radps: f64,
        field_relative: bool,
    ) -> Result<()> {
        let mut heading_deg = None;
        let (vx, vy) = if field_relative {
            let deg = self.heading.heading_degrees()?;
            heading_deg = Some(deg);
            rotate_by_negative_heading(vx_mps, vy_mps, deg.to_radians())
        } else {
            (vx_mps, vy_mps)
        };

        let chassis = ChassisSpeeds::new(vx, vy, omega_radps);
        let mut states = self.kinematics.to_module_states(&chassis);

        let fastest = states
            .iter()
            .map(|s| s.speed_mps.abs())
            .fold(0.0f64, f64::max);
        let desaturated = fastest > self.max_speed_mps;
        desaturate(&mut states, self.max_speed_mps);

        let mut commanded = [ModuleState::new(0.0, 0.0); MODULE_COUNT];
        for (i, (module, state)) in self.modules.iter_mut().zip(states.iter()).enumerate() {
            commanded[i] = module.set_state(state.speed_mps, state.angle_rad)?;
        }

        debug!(
            "drive: ({:.2}, {:.2}, {:.2}) field_relative={} desaturated={}",
            vx, vy, omega_radps, field_relative, desaturated
        );
        let drive_positions_rot = self.drive_positions_rotations()?;
        self.sink.record(&DriveTelemetry {
            vx_mps: vx,
            vy_mps: vy,
            omega_radps,
            heading_deg,
            commanded,
            drive_positions_rot,
            desaturated,
        });
        Ok(())
    }

    /// Zero every wheel speed. The steering command path still runs and
    /// commands the zero-vector angle (possibly flipped per module), the
    /// same as any other drive() call.
    pub fn stop(&mut self) -> Result<()> {
        self.drive(0.0, 0.0, 0.0, false)
    }

    /// Measured drive rotor positions (rotations), FL, FR, BL, BR order.
    pub fn drive_positions_rotations(&mut self) -> Result<[f64; MODULE_COUNT]> {
        let mut positions = [0.0; MODULE_COUNT];
        for (i, module) in self.modules.iter_mut().enumerate() {
            positions[i] = module.drive_position_rotations()?;
        }
        Ok(positions)
    }
}

impl<D, S, E, H> Drop for SwerveDrive<D, S, E, H>
where
    D: DriveMotor,
    S: SteerMotor,
    E: AbsoluteEncoder,
    H: HeadingSource,
{
    fn drop(&mut self) {
        // Try to stop the base when the controller goes away (safety measure)
        if let Err(e) = self.stop() {
            warn!("Failed to stop drivetrain on drop: {}", e);
        }
    }
}

/// Rotate a field-frame vector by the negative of the heading, converting
/// it to the chassis frame.
fn rotate_by_negative_heading(vx: f64, vy: f64, heading_rad: f64) -> (f64, f64) {
    let (sin, cos) = heading_rad.sin_cos();
    (vx * cos + vy * sin, -vx * sin + vy * cos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::kinematics::ModuleTranslation;
    use crate::swerve::module::ModuleConfig;
    use crate::swerve::module::mock::{MockDrive, MockEncoder, MockGyro, MockSteer};
    use crate::telemetry::{LatestSink, LogSink};
    use std::cell::{Cell, RefCell};
    use std::f64::consts::{FRAC_PI_2, SQRT_2, TAU};
    use std::rc::Rc;

    const WHEEL_DIAMETER: f64 = 0.1016;
    const DRIVE_RATIO: f64 = 6.75;
    const STEER_RATIO: f64 = 12.8;
    const MAX_SPEED: f64 = 2.0;

    struct Harness {
        drive: SwerveDrive<MockDrive, MockSteer, MockEncoder, MockGyro>,
        drive_rps: [Rc<Cell<Option<f64>>>; MODULE_COUNT],
        steer_rot: [Rc<Cell<Option<f64>>>; MODULE_COUNT],
        gyro: MockGyro,
        sink: Rc<RefCell<LatestSink>>,
    }

    /// Unit-square geometry, all encoders at zero, heading at zero.
    fn harness() -> Harness {
        let names = ["FL", "FR", "BL", "BR"];
        let mut drive_rps: Vec<Rc<Cell<Option<f64>>>> = Vec::new();
        let mut steer_rot: Vec<Rc<Cell<Option<f64>>>> = Vec::new();

        let modules = names.map(|name| {
            let drive = MockDrive::default();
            let steer = MockSteer::default();
            drive_rps.push(drive.last_velocity_rps.clone());
            steer_rot.push(steer.last_position_rot.clone());
            SwerveModule::new(
                drive,
                steer,
                MockEncoder::default(),
                ModuleConfig {
                    name,
                    wheel_diameter_m: WHEEL_DIAMETER,
                    drive_gear_ratio: DRIVE_RATIO,
                    steer_gear_ratio: STEER_RATIO,
                    angle_offset_rad: 0.0,
                },
            )
            .unwrap()
        });

        let kinematics = SwerveKinematics::new([
            ModuleTranslation::new(0.25, 0.25),
            ModuleTranslation::new(0.25, -0.25),
            ModuleTranslation::new(-0.25, 0.25),
            ModuleTranslation::new(-0.25, -0.25),
        ])
        .unwrap();

        let gyro = MockGyro::default();
        let sink = Rc::new(RefCell::new(LatestSink::default()));

        Harness {
            drive: SwerveDrive::new(
                modules,
                kinematics,
                gyro.clone(),
                MAX_SPEED,
                Box::new(sink.clone()),
            )
            .unwrap(),
            drive_rps: [
                drive_rps[0].clone(),
                drive_rps[1].clone(),
                drive_rps[2].clone(),
                drive_rps[3].clone(),
            ],
            steer_rot: [
                steer_rot[0].clone(),
                steer_rot[1].clone(),
                steer_rot[2].clone(),
                steer_rot[3].clone(),
            ],
            gyro,
            sink,
        }
    }

    fn commanded_speed_mps(rps: f64) -> f64 {
        rps * (std::f64::consts::PI * WHEEL_DIAMETER) / DRIVE_RATIO
    }

    fn commanded_angle_rad(rot: f64) -> f64 {
        rot / STEER_RATIO * TAU
    }

    #[test]
    fn invalid_max_speed_is_rejected() {
        let h = harness();
        // Rebuilding with a bad limit must fail fast.
        let kinematics = SwerveKinematics::new([
            ModuleTranslation::new(0.25, 0.25),
            ModuleTranslation::new(0.25, -0.25),
            ModuleTranslation::new(-0.25, 0.25),
            ModuleTranslation::new(-0.25, -0.25),
        ])
        .unwrap();
        drop(h);
        let names = ["FL", "FR", "BL", "BR"];
        let modules = names.map(|name| {
            SwerveModule::new(
                MockDrive::default(),
                MockSteer::default(),
                MockEncoder::default(),
                ModuleConfig {
                    name,
                    wheel_diameter_m: WHEEL_DIAMETER,
                    drive_gear_ratio: DRIVE_RATIO,
                    steer_gear_ratio: STEER_RATIO,
                    angle_offset_rad: 0.0,
                },
            )
            .unwrap()
        });
        let result = SwerveDrive::new(
            modules,
            kinematics,
            MockGyro::default(),
            0.0,
            Box::new(LogSink),
        );
        assert!(matches!(result, Err(ConfigError::InvalidMaxSpeed(_))));
    }

    #[test]
    fn straight_translation_drives_all_modules_forward() {
        let mut h = harness();
        h.drive.drive(1.0, 0.0, 0.0, false).unwrap();

        for i in 0..MODULE_COUNT {
            let speed = commanded_speed_mps(h.drive_rps[i].get().unwrap());
            let angle = commanded_angle_rad(h.steer_rot[i].get().unwrap());
            assert!((speed - 1.0).abs() < 1e-9, "module {i} speed {speed}");
            assert!(angle.abs() < 1e-9, "module {i} angle {angle}");
        }

        let telemetry = h.sink.borrow_mut().take().unwrap();
        assert!(!telemetry.desaturated);
        assert_eq!(telemetry.heading_deg, None);
    }

    #[test]
    fn pure_rotation_is_symmetric() {
        let mut h = harness();
        let omega = 2.0;
        h.drive.drive(0.0, 0.0, omega, false).unwrap();

        // All offsets equidistant from center: equal speed magnitudes.
        let expected_speed = SQRT_2 * 0.25 * omega;
        for i in 0..MODULE_COUNT {
            let speed = commanded_speed_mps(h.drive_rps[i].get().unwrap());
            assert!(
                (speed.abs() - expected_speed).abs() < 1e-9,
                "module {i} speed {speed}"
            );
        }

        // FL and BR roll opposite ways around the center. Modules start at
        // angle 0, so corners whose tangent exceeds 90 degrees flip instead;
        // compare the physical wheel travel directions, which must differ by
        // PI across the diagonal.
        let telemetry = h.sink.borrow_mut().take().unwrap();
        let fl = telemetry.commanded[0];
        let br = telemetry.commanded[3];
        let physical = |s: ModuleState| {
            if s.speed_mps >= 0.0 {
                s.angle_rad
            } else {
                crate::swerve::angle::wrap_to_pi(s.angle_rad + std::f64::consts::PI)
            }
        };
        let diff = crate::swerve::angle::wrap_to_pi(physical(fl) - physical(br));
        assert!(
            (diff.abs() - std::f64::consts::PI).abs() < 1e-9,
            "FL {:?} vs BR {:?}",
            fl,
            br
        );
    }

    #[test]
    fn desaturation_applies_at_the_limit() {
        let mut h = harness();
        // 10 m/s forward far exceeds the 2 m/s limit.
        h.drive.drive(10.0, 0.0, 0.0, false).unwrap();

        for i in 0..MODULE_COUNT {
            let speed = commanded_speed_mps(h.drive_rps[i].get().unwrap());
            assert!((speed - MAX_SPEED).abs() < 1e-9, "module {i} speed {speed}");
        }
        assert!(h.sink.borrow_mut().take().unwrap().desaturated);
    }

    #[test]
    fn field_relative_rotates_by_negative_heading() {
        let mut h = harness();
        h.gyro.heading_deg.set(90.0);
        h.drive.drive(1.0, 0.0, 0.0, true).unwrap();

        // Field-forward at heading 90 is chassis-right: (0, -1).
        let telemetry = h.sink.borrow_mut().take().unwrap();
        assert_eq!(telemetry.heading_deg, Some(90.0));
        assert!(telemetry.vx_mps.abs() < 1e-9);
        assert!((telemetry.vy_mps + 1.0).abs() < 1e-9);

        // Modules steer to about -90 degrees (or the flipped equivalent).
        for i in 0..MODULE_COUNT {
            let angle = commanded_angle_rad(h.steer_rot[i].get().unwrap());
            let speed = commanded_speed_mps(h.drive_rps[i].get().unwrap());
            assert!(
                (angle.abs() - FRAC_PI_2).abs() < 1e-9,
                "module {i} angle {angle}"
            );
            assert!((speed.abs() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn stop_zeroes_speed_but_still_steers() {
        let mut h = harness();
        h.drive.stop().unwrap();

        for i in 0..MODULE_COUNT {
            assert_eq!(h.drive_rps[i].get().unwrap(), 0.0);
            // The steering actuation was issued, not skipped.
            assert!(h.steer_rot[i].get().is_some(), "module {i} skipped steering");
        }
    }

    #[test]
    fn rotate_by_negative_heading_convention() {
        let (vx, vy) = rotate_by_negative_heading(1.0, 0.0, FRAC_PI_2);
        assert!(vx.abs() < 1e-12);
        assert!((vy + 1.0).abs() < 1e-12);

        // Heading zero is the identity.
        let (vx, vy) = rotate_by_negative_heading(0.3, -0.7, 0.0);
        assert_eq!((vx, vy), (0.3, -0.7));
    }
}
