// Concurrent device initialization
//
// The actuators are opened first and unconditionally. Then one acquisition
// task per enabled sensor capability runs in parallel, retrying transient
// "no/wrong device" failures with backoff, and the initializer joins them in
// capability order. Mode negotiation failures are not retried.
//
// Dropping the join (e.g. the caller gave up waiting) aborts every
// acquisition still in flight.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::config::{
    CLAW_MOTOR_PORT, LEFT_MOTOR_PORT, RETRY_INITIAL_BACKOFF, RETRY_MAX_ATTEMPTS, RETRY_MAX_BACKOFF,
    RIGHT_MOTOR_PORT, SENSOR_PORTS,
};
use crate::device::{Brick, MotorKind, RegulatedMotor};
use crate::error::{DeviceError, InitError};
use crate::port::Port;
use crate::sensor::{ColorSensor, GyroSensor, TouchSensor, UltrasonicSensor};

/// Optional sensor functions, in selection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Touch,
    Gyro,
    Color,
    Distance,
}

impl Capability {
    pub const ALL: [Capability; 4] = [Self::Touch, Self::Gyro, Self::Color, Self::Distance];

    fn index(self) -> usize {
        self as usize
    }

    /// Conventional sensor port for this capability
    pub fn port_name(self) -> &'static str {
        SENSOR_PORTS[self.index()]
    }

    /// Open and negotiate the sensor backing this capability
    pub fn open(self, brick: &dyn Brick, port: &Port) -> Result<Sensor, DeviceError> {
        Ok(match self {
            Self::Touch => Sensor::Touch(TouchSensor::open(brick, port)?),
            Self::Gyro => Sensor::Gyro(GyroSensor::open(brick, port)?),
            Self::Color => Sensor::Color(ColorSensor::open(brick, port)?),
            Self::Distance => Sensor::Distance(UltrasonicSensor::open(brick, port)?),
        })
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Touch => write!(f, "touch"),
            Self::Gyro => write!(f, "gyro"),
            Self::Color => write!(f, "color"),
            Self::Distance => write!(f, "distance"),
        }
    }
}

/// Which optional sensors a deployment uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySelection {
    pub touch: bool,
    pub gyro: bool,
    pub color: bool,
    pub distance: bool,
}

impl CapabilitySelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::from_array([true; 4])
    }

    /// From `[touch, gyro, color, distance]`
    pub fn from_array(flags: [bool; 4]) -> Self {
        let [touch, gyro, color, distance] = flags;
        Self {
            touch,
            gyro,
            color,
            distance,
        }
    }

    pub fn as_array(&self) -> [bool; 4] {
        [self.touch, self.gyro, self.color, self.distance]
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.as_array()[capability.index()]
    }

    /// Enabled capabilities in selection order
    pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.is_enabled(*c))
    }
}

/// How hard to try acquiring a sensor that is absent or mismatched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// `None` retries until cancelled
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(RETRY_MAX_ATTEMPTS),
            initial_backoff_ms: RETRY_INITIAL_BACKOFF.as_millis() as u64,
            max_backoff_ms: RETRY_MAX_BACKOFF.as_millis() as u64,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Keep trying forever (until cancelled), with the default backoff
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// At most `attempts` tries with no delay between them
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: Some(attempts),
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay after the `attempt`-th failure (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Cloneable cancellation signal threaded through every retry loop
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this can only return on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// A sensor handle produced by one acquisition task
pub enum Sensor {
    Touch(TouchSensor),
    Gyro(GyroSensor),
    Color(ColorSensor),
    Distance(UltrasonicSensor),
}

/// Fork-join group of acquisition tasks, joined in spawn order.
/// Tasks still running when the group is dropped are aborted.
struct TaskGroup<T> {
    tasks: Vec<(Capability, JoinHandle<T>)>,
}

impl<T: Send + 'static> TaskGroup<T> {
    fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    fn spawn<F>(&mut self, capability: Capability, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.push((capability, tokio::spawn(task)));
    }

    async fn join(&mut self) -> Vec<(Capability, Result<T, JoinError>)> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for (capability, handle) in self.tasks.iter_mut() {
            results.push((*capability, handle.await));
        }
        self.tasks.clear();
        results
    }
}

impl<T> Drop for TaskGroup<T> {
    fn drop(&mut self) {
        for (capability, handle) in &self.tasks {
            if !handle.is_finished() {
                warn!("Abandoning {} sensor acquisition", capability);
            }
            handle.abort();
        }
    }
}

/// Acquire one capability's sensor, retrying transient failures
pub async fn acquire(
    brick: Arc<dyn Brick>,
    capability: Capability,
    policy: RetryPolicy,
    cancel: CancelToken,
) -> Result<Sensor, InitError> {
    let port = brick.port(capability.port_name()).map_err(InitError::Port)?;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(InitError::Cancelled);
        }
        attempt += 1;

        let (b, p) = (brick.clone(), port.clone());
        let result = tokio::task::spawn_blocking(move || capability.open(b.as_ref(), &p)).await?;

        match result {
            Ok(sensor) => {
                info!("{} sensor ready on {} (attempt {})", capability, port, attempt);
                return Ok(sensor);
            }
            Err(e) if e.is_transient() => {
                if policy.exhausted(attempt) {
                    error!("{} sensor: {} (attempt {}). Giving up", capability, e, attempt);
                    return Err(InitError::RetriesExhausted {
                        capability,
                        attempts: attempt,
                        last: e,
                    });
                }
                warn!("{} sensor: {} (attempt {}). Retrying...", capability, e, attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(InitError::Cancelled),
                    _ = tokio::time::sleep(policy.backoff(attempt)) => {}
                }
            }
            Err(e @ DeviceError::ModeUnavailable { .. }) => {
                return Err(InitError::ModeNegotiation {
                    capability,
                    source: e,
                });
            }
            Err(e) => {
                return Err(InitError::Sensor {
                    capability,
                    source: e,
                });
            }
        }
    }
}

/// Every handle produced by a successful initialization
pub struct Devices {
    claw: Arc<dyn RegulatedMotor>,
    left: Arc<dyn RegulatedMotor>,
    right: Arc<dyn RegulatedMotor>,
    touch: Option<TouchSensor>,
    gyro: Option<GyroSensor>,
    color: Option<ColorSensor>,
    distance: Option<UltrasonicSensor>,
    failed: Vec<(Capability, InitError)>,
}

impl Devices {
    fn install(&mut self, sensor: Sensor) {
        match sensor {
            Sensor::Touch(s) => self.touch = Some(s),
            Sensor::Gyro(s) => self.gyro = Some(s),
            Sensor::Color(s) => self.color = Some(s),
            Sensor::Distance(s) => self.distance = Some(s),
        }
    }

    pub fn claw_motor(&self) -> &Arc<dyn RegulatedMotor> {
        &self.claw
    }

    pub fn left_motor(&self) -> &Arc<dyn RegulatedMotor> {
        &self.left
    }

    pub fn right_motor(&self) -> &Arc<dyn RegulatedMotor> {
        &self.right
    }

    pub fn touch(&self) -> Option<&TouchSensor> {
        self.touch.as_ref()
    }

    pub fn gyro(&self) -> Option<&GyroSensor> {
        self.gyro.as_ref()
    }

    pub fn color(&self) -> Option<&ColorSensor> {
        self.color.as_ref()
    }

    pub fn distance(&self) -> Option<&UltrasonicSensor> {
        self.distance.as_ref()
    }

    /// Enabled capabilities whose acquisition failed, in capability order
    pub fn failed(&self) -> &[(Capability, InitError)] {
        &self.failed
    }

    /// Capabilities that hold a live handle
    pub fn bound(&self) -> CapabilitySelection {
        CapabilitySelection::from_array([
            self.touch.is_some(),
            self.gyro.is_some(),
            self.color.is_some(),
            self.distance.is_some(),
        ])
    }
}

fn open_actuator(brick: &dyn Brick, name: &str, kind: MotorKind) -> Result<Arc<dyn RegulatedMotor>, InitError> {
    let motor = brick
        .port(name)
        .and_then(|port| brick.open_motor(&port, kind))
        .map_err(|source| InitError::Actuator {
            port: name.to_string(),
            source,
        })?;
    info!("Opened {} on {}", kind, name);
    Ok(Arc::from(motor))
}

/// Open the actuators, then acquire every enabled sensor concurrently.
///
/// Only actuator failures and cancellation fail the whole call. A sensor that
/// cannot be acquired is left unbound and listed in `Devices::failed`.
pub async fn initialize(
    brick: Arc<dyn Brick>,
    selection: CapabilitySelection,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<Devices, InitError> {
    let b = brick.clone();
    let (claw, left, right) = tokio::task::spawn_blocking(move || {
        Ok::<_, InitError>((
            open_actuator(b.as_ref(), CLAW_MOTOR_PORT, MotorKind::Medium)?,
            open_actuator(b.as_ref(), LEFT_MOTOR_PORT, MotorKind::Large)?,
            open_actuator(b.as_ref(), RIGHT_MOTOR_PORT, MotorKind::Large)?,
        ))
    })
    .await??;

    let mut group = TaskGroup::new();
    for capability in selection.enabled() {
        group.spawn(
            capability,
            acquire(brick.clone(), capability, policy.clone(), cancel.clone()),
        );
    }
    info!("Waiting for {} sensor(s)...", group.tasks.len());

    let mut devices = Devices {
        claw,
        left,
        right,
        touch: None,
        gyro: None,
        color: None,
        distance: None,
        failed: Vec::new(),
    };
    let mut cancelled = false;

    for (capability, joined) in group.join().await {
        match joined.map_err(InitError::from).and_then(|r| r) {
            Ok(sensor) => devices.install(sensor),
            Err(InitError::Cancelled) => cancelled = true,
            Err(e) => {
                error!("{} sensor failed: {}", capability, e);
                devices.failed.push((capability, e));
            }
        }
    }

    if cancelled {
        return Err(InitError::Cancelled);
    }
    Ok(devices)
}
