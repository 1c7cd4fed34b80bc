// Sensor diagnostic: READ-ONLY probe of every brick port
//
// Pings each slot and reports what the hub sees there. Nothing is opened,
// so no motor moves and no sensor changes mode.
//
// Usage: cargo run --example sensor_diagnostic -- [port]
// Example: cargo run --example sensor_diagnostic -- /dev/ttyACM0

use brick_pilot::config::{HUB_BAUDRATE, HUB_PORT, SENSOR_PORTS};
use brick_pilot::device::type_name;
use brick_pilot::hub::HubBus;
use brick_pilot::port::{Port, PortKind};
use std::io::{self, Write};

const EXPECTED: [&str; 4] = ["touch", "gyro", "color", "ultrasonic"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args().nth(1).unwrap_or_else(|| HUB_PORT.to_string());

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Brick Port Diagnostic (READ-ONLY)               ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match HubBus::open_with_baudrate(&port, HUB_BAUDRATE) {
        Ok(bus) => {
            println!("  ✓ Serial port opened successfully");
            bus
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the brick is powered and the USB cable connected");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Motor ports...");
    for p in Port::all(PortKind::Motor) {
        print!("  Port {}: ", p);
        io::stdout().flush()?;
        match bus.ping(p.slot()) {
            Ok(id) => println!("{}", type_name(id)),
            Err(e) => println!("✗ ERROR: {}", e),
        }
    }
    println!();

    println!("Step 3: Sensor ports...");
    let mut all_found = true;
    for (name, expected) in SENSOR_PORTS.iter().zip(EXPECTED) {
        let p = Port::resolve(name)?;
        print!("  Port {} (expects {}): ", p, expected);
        io::stdout().flush()?;
        match bus.ping(p.slot()) {
            Ok(id) => {
                let found = type_name(id);
                if found == expected {
                    println!("✓ {}", found);
                } else {
                    println!("✗ {}", found);
                    all_found = false;
                }
            }
            Err(e) => {
                println!("✗ ERROR: {}", e);
                all_found = false;
            }
        }
    }
    println!();

    if !all_found {
        println!("⚠ Some sensors are missing or on the wrong port.");
        println!("  Disabled capabilities may stay unplugged; enabled ones are");
        println!("  retried during initialization until they appear.");
    } else {
        println!("All sensors in place.");
    }

    Ok(())
}
