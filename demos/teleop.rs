// Keyboard teleop: W/S drive, A/D rotate 90 deg, T travel 0.5 m, space stop, Q quit
use brick_pilot::config::TOPIC_CMD_MOTION;
use brick_pilot::messages::MotionCommand;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

const TURN_DEGREES: f64 = 90.0;
const TRAVEL_METERS: f64 = 0.5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;

    info!("Controls: W/S=forward/backward, A/D=rotate, T=travel, SPACE=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        // Commands are edge-triggered; the pilot keeps running until told otherwise
        let cmd = match code {
            KeyCode::Char('w') => MotionCommand::Forward,
            KeyCode::Char('s') => MotionCommand::Backward,
            KeyCode::Char('a') => MotionCommand::Rotate {
                degrees: TURN_DEGREES,
            },
            KeyCode::Char('d') => MotionCommand::Rotate {
                degrees: -TURN_DEGREES,
            },
            KeyCode::Char('t') => MotionCommand::Travel {
                meters: TRAVEL_METERS,
            },
            KeyCode::Char(' ') => MotionCommand::Stop,
            KeyCode::Char('q') | KeyCode::Esc => {
                publisher.put(serde_json::to_string(&MotionCommand::Stop)?).await?;
                break;
            }
            _ => continue,
        };
        info!("Sending {:?}", cmd);
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}
