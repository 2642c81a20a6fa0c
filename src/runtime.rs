// 50 Hz control loop with watchdog.
//
// Pulls the latest DriveCommand from zenoh, actuates the drivetrain once
// per tick and publishes health plus actuation telemetry. The watchdog
// stops the base when commands go stale: idleness alone does not halt the
// actuators, so the stop must be commanded explicitly every stale tick.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    ANGLE_OFFSETS_DEG, CMD_TIMEOUT, DRIVE_GEAR_RATIO, DRIVE_MOTOR_IDS, ENCODER_IDS, GYRO_ID,
    LOOP_HZ, MAX_MODULE_SPEED_MPS, MODULE_TRANSLATIONS, STEER_GEAR_RATIO, STEER_MOTOR_IDS,
    TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_TELEMETRY, WHEEL_DIAMETER_M,
};
use crate::hardware::HardwareError;
use crate::hardware::bus::{self, BusDriveMotor, BusEncoder, BusGyro, BusSteerMotor, ServoBus};
use crate::messages::{DriveCommand, RuntimeHealth};
use crate::swerve::kinematics::MODULE_NAMES;
use crate::swerve::{ModuleConfig, SwerveDrive, SwerveKinematics, SwerveModule};
use crate::telemetry::LatestSink;

pub struct Runtime {
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Command to actuate this tick, after the watchdog has had its say.
    pub fn compute_actuation(&mut self) -> DriveCommand {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the base
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping base", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            DriveCommand::stop()
        } else if let Some(ref cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd.clone()
        } else {
            // No command ever received
            self.health = RuntimeHealth::CmdStale;
            DriveCommand::stop()
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

type HwDrive = SwerveDrive<BusDriveMotor, BusSteerMotor, BusEncoder, BusGyro>;

/// Open the controller bus and assemble the four corners plus gyro into a
/// ready-to-initialize drivetrain.
fn build_drive(
    port: &str,
    sink: Rc<RefCell<LatestSink>>,
) -> Result<HwDrive, Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening controller bus on {}", port);
    let shared = bus::share(ServoBus::open(port)?);

    let mut built = Vec::with_capacity(MODULE_NAMES.len());
    for (i, &name) in MODULE_NAMES.iter().enumerate() {
        built.push(SwerveModule::new(
            BusDriveMotor::new(shared.clone(), DRIVE_MOTOR_IDS[i]),
            BusSteerMotor::new(shared.clone(), STEER_MOTOR_IDS[i]),
            BusEncoder::new(shared.clone(), ENCODER_IDS[i]),
            ModuleConfig {
                name,
                wheel_diameter_m: WHEEL_DIAMETER_M,
                drive_gear_ratio: DRIVE_GEAR_RATIO,
                steer_gear_ratio: STEER_GEAR_RATIO,
                angle_offset_rad: ANGLE_OFFSETS_DEG[i].to_radians(),
            },
        )?);
    }
    let modules: [_; 4] = built
        .try_into()
        .map_err(|_| "module construction produced wrong arity")?;

    let kinematics = SwerveKinematics::new(MODULE_TRANSLATIONS)?;
    let gyro = BusGyro::new(shared, GYRO_ID);

    Ok(SwerveDrive::new(
        modules,
        kinematics,
        gyro,
        MAX_MODULE_SPEED_MPS,
        Box::new(sink),
    )?)
}

pub async fn run(port: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sink = Rc::new(RefCell::new(LatestSink::default()));
    let mut drive = build_drive(port, sink.clone())?;
    drive.initialize()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Actuate (includes watchdog logic). The stale path still drives
        // an explicit stop every tick; idleness alone does not halt anything.
        let cmd = runtime.compute_actuation();
        match drive.drive(cmd.vx_mps, cmd.vy_mps, cmd.omega_radps, cmd.field_relative) {
            Ok(()) => {}
            Err(HardwareError::DeviceFault { id, status }) => {
                // A faulted controller may have lost its position register;
                // skip the tick and re-seed steering from the absolute
                // encoders before the next one.
                warn!("Device {} fault 0x{:02X}, resyncing steering", id, status);
                drive.resync_steering()?;
            }
            Err(e) => return Err(e.into()),
        }

        // 3. Publish actuation telemetry
        if let Some(telemetry) = sink.borrow_mut().take() {
            let telemetry_json = serde_json::to_string(&telemetry)?;
            pub_telemetry.put(telemetry_json).await?;
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}
