// End-to-end bring-up against the simulated brick

use std::sync::Arc;

use brick_pilot::config::RobotConfig;
use brick_pilot::port::Port;
use brick_pilot::robot::Robot;
use brick_pilot::sensor::ColorId;
use brick_pilot::device::SensorKind;
use brick_pilot::sim::{SimBrick, SimSensor};
use brick_pilot::{CancelToken, Capability, CapabilitySelection, InitError, RetryPolicy};

fn config(capabilities: CapabilitySelection) -> RobotConfig {
    RobotConfig {
        capabilities,
        retry: RetryPolicy::immediate(3),
        ..RobotConfig::default()
    }
}

#[tokio::test]
async fn test_full_bring_up() {
    let brick = SimBrick::fully_equipped();
    let robot = Robot::new(Arc::new(brick.clone()), config(CapabilitySelection::all()));

    let devices = robot.init_devices(&CancelToken::new()).await.unwrap();
    assert_eq!(devices.bound(), CapabilitySelection::all());
    assert!(devices.failed().is_empty());

    assert!(!devices.touch().unwrap().is_pressed().unwrap());
    assert_eq!(devices.gyro().unwrap().angle().unwrap(), 0.0);
    let color = devices.color().unwrap();
    assert!((color.reflected_red().unwrap() - 0.42).abs() < 1e-6);
    assert_eq!(color.color().unwrap(), ColorId::White);
    assert!((devices.distance().unwrap().distance().unwrap() - 1.5).abs() < 1e-6);

    let drive = robot.init_pilot().unwrap();
    drive.pilot().travel(0.25).unwrap();
    drive.pilot().rotate(90.0).unwrap();
    let pose = drive.pose().pose().unwrap();
    assert!((pose.x - 0.25).abs() < 1e-6, "x = {}", pose.x);
    assert!(pose.y.abs() < 1e-6, "y = {}", pose.y);
    assert!((pose.heading - 90.0).abs() < 1e-6, "heading = {}", pose.heading);
}

#[tokio::test]
async fn test_disabled_sensors_stay_untouched() {
    let brick = SimBrick::fully_equipped();
    let selection = CapabilitySelection {
        gyro: true,
        ..CapabilitySelection::none()
    };
    let robot = Robot::new(Arc::new(brick.clone()), config(selection));

    let devices = robot.init_devices(&CancelToken::new()).await.unwrap();
    assert!(devices.touch().is_none());
    assert!(devices.gyro().is_some());
    assert_eq!(brick.touched_ports(), vec!["A", "B", "C", "S2"]);
    assert!(!brick.is_bound(&Port::resolve("S1").unwrap()));
}

#[tokio::test]
async fn test_missing_sensor_is_left_out() {
    let brick = SimBrick::new();
    let s4 = Port::resolve("S4").unwrap();
    brick.attach_sensor(&s4, SimSensor::new(SensorKind::Ultrasonic).absent_for(u32::MAX));
    let selection = CapabilitySelection {
        distance: true,
        ..CapabilitySelection::none()
    };
    let robot = Robot::new(Arc::new(brick.clone()), config(selection));

    let devices = robot.init_devices(&CancelToken::new()).await.unwrap();
    assert!(devices.distance().is_none());
    assert!(matches!(
        devices.failed(),
        [(Capability::Distance, InitError::RetriesExhausted { attempts: 3, .. })]
    ));
    assert_eq!(brick.attempts(&s4), 3);

    // The robot still drives
    let drive = robot.init_pilot().unwrap();
    drive.pilot().travel(0.1).unwrap();
    assert!((drive.pose().pose().unwrap().x - 0.1).abs() < 1e-6);
}
