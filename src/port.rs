// Port registry: named brick connectors -> hub slot addresses

use std::fmt;

use crate::error::DeviceError;

/// Connector family of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Motor,
    Sensor,
}

/// A resolved physical connector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    name: &'static str,
    slot: u8,
    kind: PortKind,
}

/// Every connector on the brick: name, hub slot, family
const PORTS: [(&str, u8, PortKind); 8] = [
    ("A", 0x00, PortKind::Motor),
    ("B", 0x01, PortKind::Motor),
    ("C", 0x02, PortKind::Motor),
    ("D", 0x03, PortKind::Motor),
    ("S1", 0x10, PortKind::Sensor),
    ("S2", 0x11, PortKind::Sensor),
    ("S3", 0x12, PortKind::Sensor),
    ("S4", 0x13, PortKind::Sensor),
];

impl Port {
    /// Resolve a connector name such as "B" or "S3"
    pub fn resolve(name: &str) -> Result<Self, DeviceError> {
        PORTS
            .iter()
            .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
            .map(|&(name, slot, kind)| Self { name, slot, kind })
            .ok_or_else(|| DeviceError::UnknownPort(name.to_string()))
    }

    /// All connectors of one family, in slot order
    pub fn all(kind: PortKind) -> impl Iterator<Item = Port> {
        PORTS
            .iter()
            .filter(move |(_, _, k)| *k == kind)
            .map(|&(name, slot, kind)| Self { name, slot, kind })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hub address of this connector
    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
