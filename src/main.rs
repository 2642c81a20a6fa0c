use clap::Parser;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::BUS_PORT;

/// Swerve drivetrain runtime
#[derive(Parser)]
struct Args {
    /// Serial port of the controller bus
    #[arg(long, default_value = BUS_PORT)]
    port: String,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    if let Err(e) = swerve_zenoh_runtime::runtime::run(&args.port).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
