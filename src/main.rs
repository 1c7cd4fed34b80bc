use std::path::PathBuf;
use std::sync::Arc;

use brick_pilot::config::RobotConfig;
use brick_pilot::device::Brick;
use brick_pilot::hub::HubBrick;
use brick_pilot::messages::RobotStatus;
use brick_pilot::robot::{Robot, StatusCell};
use brick_pilot::runtime;
use brick_pilot::sim::SimBrick;
use brick_pilot::CancelToken;
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bring up the brick, build the pilot and bridge it to Zenoh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port of the brick hub (overrides the config file)
    #[arg(long)]
    serial: Option<String>,

    /// Run against a simulated brick with every sensor attached
    #[arg(long)]
    sim: bool,

    /// JSON robot config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable the touch sensor on S1
    #[arg(long)]
    touch: bool,

    /// Enable the gyro sensor on S2
    #[arg(long)]
    gyro: bool,

    /// Enable the color sensor on S3
    #[arg(long)]
    color: bool,

    /// Enable the ultrasonic sensor on S4
    #[arg(long)]
    distance: bool,

    /// Stop after initialization instead of starting the runtime
    #[arg(long)]
    no_runtime: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    let mut config = match &args.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let caps = &mut config.capabilities;
    caps.touch |= args.touch;
    caps.gyro |= args.gyro;
    caps.color |= args.color;
    caps.distance |= args.distance;
    if let Some(port) = args.serial {
        config.hub.port = port;
    }

    let brick: Arc<dyn Brick> = if args.sim {
        info!("Using simulated brick");
        Arc::new(SimBrick::fully_equipped())
    } else {
        Arc::new(HubBrick::open(&config.hub.port, config.hub.baudrate)?)
    };

    let status = Arc::new(StatusCell::default());
    let robot = Robot::new(brick, config).with_indicator(status.clone());

    let cancel = CancelToken::new();
    tokio::select! {
        result = robot.init_devices(&cancel) => {
            let devices = result?;
            info!("Bound capabilities: {:?}", devices.bound());
            for (capability, e) in devices.failed() {
                warn!("Continuing without {} sensor: {}", capability, e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted during initialization");
            cancel.cancel();
            return Ok(());
        }
    }

    let drive = robot.init_pilot()?;

    wait_for_key().await?;

    if args.no_runtime {
        return Ok(());
    }
    runtime::run(drive, status.get().unwrap_or(RobotStatus::Ready)).await
}

/// Hold the robot still until the operator presses a key
async fn wait_for_key() -> Result<(), BoxError> {
    info!("Loaded! Press any key to continue");
    tokio::task::spawn_blocking(|| -> std::io::Result<()> {
        enable_raw_mode()?;
        let result = loop {
            match event::read() {
                Ok(Event::Key(_)) => break Ok(()),
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        disable_raw_mode()?;
        result
    })
    .await??;
    Ok(())
}
