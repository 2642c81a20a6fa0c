// Bus diagnostic: READ-ONLY check of every device on the controller bus
//
// Pings the eight motor controllers, four encoders and the gyro, then
// dumps their feedback registers. Nothing is written, nothing moves.
//
// Usage: cargo run --example bus_diagnostic -- --port /dev/ttyACM0

use clap::Parser;

use swerve_zenoh_runtime::config::{
    BUS_PORT, DRIVE_MOTOR_IDS, ENCODER_IDS, GYRO_ID, STEER_MOTOR_IDS,
};
use swerve_zenoh_runtime::hardware::ServoBus;
use swerve_zenoh_runtime::hardware::bus::Register;

const CORNERS: [&str; 4] = ["FL", "FR", "BL", "BR"];

#[derive(Parser)]
struct Args {
    /// Serial port of the controller bus
    #[arg(long, default_value = BUS_PORT)]
    port: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    println!("Swerve bus diagnostic (read-only) on {}", args.port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match ServoBus::open(&args.port) {
        Ok(bus) => {
            println!("  ok");
            bus
        }
        Err(e) => {
            println!("  FAILED: {}", e);
            println!("  Check the port path, cabling and permissions.");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging devices...");
    let mut all_found = true;
    for (i, corner) in CORNERS.iter().enumerate() {
        for (label, id) in [
            ("drive", DRIVE_MOTOR_IDS[i]),
            ("steer", STEER_MOTOR_IDS[i]),
            ("encoder", ENCODER_IDS[i]),
        ] {
            match bus.ping(id) {
                Ok(true) => println!("  {corner} {label} (id {id}): responding"),
                Ok(false) => {
                    println!("  {corner} {label} (id {id}): NO RESPONSE");
                    all_found = false;
                }
                Err(e) => {
                    println!("  {corner} {label} (id {id}): ERROR {e}");
                    all_found = false;
                }
            }
        }
    }
    match bus.ping(GYRO_ID) {
        Ok(true) => println!("  gyro (id {GYRO_ID}): responding"),
        other => {
            println!("  gyro (id {GYRO_ID}): {:?}", other);
            all_found = false;
        }
    }
    println!();

    if !all_found {
        println!("WARNING: not all devices responded; readings below may fail.");
        println!();
    }

    println!("Step 3: Reading feedback registers...");
    for (i, corner) in CORNERS.iter().enumerate() {
        println!("  === Corner {corner} ===");
        for (label, id) in [("drive", DRIVE_MOTOR_IDS[i]), ("steer", STEER_MOTOR_IDS[i])] {
            match bus.read_u8(id, Register::ControlMode) {
                Ok(mode) => {
                    let mode_str = match mode {
                        0 => "Position",
                        1 => "Velocity",
                        _ => "Unknown",
                    };
                    println!("    {label} control mode: {mode} ({mode_str})");
                }
                Err(e) => println!("    {label} control mode: ERROR - {e}"),
            }
            match bus.present_position_rot(id) {
                Ok(rot) => println!("    {label} position: {rot:.3} rot"),
                Err(e) => println!("    {label} position: ERROR - {e}"),
            }
        }
        match bus.absolute_fraction(ENCODER_IDS[i]) {
            Ok(fraction) => println!(
                "    encoder: {:.4} rot ({:.1} deg)",
                fraction,
                fraction * 360.0
            ),
            Err(e) => println!("    encoder: ERROR - {e}"),
        }
    }
    match bus.yaw_degrees(GYRO_ID) {
        Ok(deg) => println!("  gyro yaw: {deg:.2} deg"),
        Err(e) => println!("  gyro yaw: ERROR - {e}"),
    }

    println!();
    println!("Done.");
    Ok(())
}
