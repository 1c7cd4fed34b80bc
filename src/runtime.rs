// Zenoh bridge: motion commands in, pose and readiness out
// Blocking pilot moves run on the blocking pool so the loop keeps publishing.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{LOOP_HZ, TOPIC_CMD_MOTION, TOPIC_STATE_POSE, TOPIC_STATE_STATUS};
use crate::error::PilotError;
use crate::messages::{MotionCommand, PoseReport, RobotStatus};
use crate::pilot::Pilot;
use crate::robot::Drive;

/// Dispatches motion commands to the pilot, one blocking move at a time
pub struct Runtime {
    pilot: Arc<Pilot>,
    pending: Option<(MotionCommand, JoinHandle<Result<(), PilotError>>)>,
}

impl Runtime {
    pub fn new(pilot: Arc<Pilot>) -> Self {
        Self {
            pilot,
            pending: None,
        }
    }

    /// Whether a blocking move is still running
    pub fn busy(&self) -> bool {
        self.pending.as_ref().is_some_and(|(_, h)| !h.is_finished())
    }

    /// Process incoming command
    pub async fn on_command(&mut self, cmd: MotionCommand) {
        info!("Received command: {:?}", &cmd);
        self.reap().await;

        // Stop always goes through; it also ends a move in progress
        if self.busy() && cmd != MotionCommand::Stop {
            warn!("Pilot busy, dropping {:?}", cmd);
            return;
        }

        let pilot = self.pilot.clone();
        let handle = tokio::task::spawn_blocking({
            let cmd = cmd.clone();
            move || match cmd {
                MotionCommand::Forward => pilot.forward(),
                MotionCommand::Backward => pilot.backward(),
                MotionCommand::Rotate { degrees } => pilot.rotate(degrees),
                MotionCommand::Travel { meters } => pilot.travel(meters),
                MotionCommand::Stop => pilot.stop(),
            }
        });

        if cmd == MotionCommand::Stop {
            if let Ok(Err(e)) = handle.await {
                warn!("Stop failed: {}", e);
            }
        } else {
            self.pending = Some((cmd, handle));
        }
    }

    /// Collect the result of a finished move
    async fn reap(&mut self) {
        if self.busy() {
            return;
        }
        if let Some((cmd, handle)) = self.pending.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{:?} failed: {}", cmd, e),
                Err(e) => warn!("{:?} task failed: {}", cmd, e),
            }
        }
    }
}

pub async fn run(drive: &Drive, status: RobotStatus) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_pose = session.declare_publisher(TOPIC_STATE_POSE).await?;
    let pub_status = session.declare_publisher(TOPIC_STATE_STATUS).await?;

    let mut runtime = Runtime::new(drive.pilot().clone());
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}, {}", TOPIC_STATE_POSE, TOPIC_STATE_STATUS);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd).await,
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        runtime.reap().await;

        // 2. Publish pose
        let estimator = drive.pose().clone();
        let pose = tokio::task::spawn_blocking(move || estimator.pose()).await??;
        let report = PoseReport::new(pose, drive.pilot().motion());
        pub_pose.put(serde_json::to_string(&report)?).await?;

        // 3. Publish readiness
        pub_status.put(serde_json::to_string(&status)?).await?;
    }
}
