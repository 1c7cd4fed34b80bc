// Brick I/O hub serial protocol
//
// Packet format: [0xFF, 0xFF, SLOT, Length, Instruction, Params..., Checksum]
// Response:      [0xFF, 0xFF, SLOT, Length, Status, Params..., Checksum]
// Length counts everything after itself (instruction/status + params + checksum).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the hub
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 200;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    Open = 0x02,
    SelectMode = 0x03,
    Fetch = 0x04,
    Close = 0x05,
    Reset = 0x06,
    MotorSpeed = 0x10,
    MotorAcceleration = 0x11,
    MotorRun = 0x12,
    MotorRotate = 0x13,
    MotorTacho = 0x14,
    MotorMoving = 0x15,
}

/// Status byte returned by the hub
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    Ok = 0,
    NoDevice = 1,
    WrongDevice = 2,
    ModeUnavailable = 3,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Ok),
            1 => Some(Self::NoDevice),
            2 => Some(Self::WrongDevice),
            3 => Some(Self::ModeUnavailable),
            _ => None,
        }
    }
}

/// Motor run direction for `MotorRun`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunDirection {
    Stop = 0,
    Forward = 1,
    Backward = 2,
}

/// Error types for hub communication
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from slot 0x{slot:02X}: {reason}")]
    InvalidResponse { slot: u8, reason: String },

    #[error("Checksum mismatch for slot 0x{slot:02X}")]
    ChecksumMismatch { slot: u8 },

    #[error("Slot 0x{slot:02X} returned unknown status: 0x{status:02X}")]
    UnknownStatus { slot: u8, status: u8 },

    #[error("Timeout waiting for response from slot 0x{slot:02X}")]
    Timeout { slot: u8 },
}

pub type Result<T> = std::result::Result<T, HubError>;

/// Decoded hub reply
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub params: Vec<u8>,
}

/// Hub bus - handles serial communication with the brick's ports
pub struct HubBus {
    port: Box<dyn SerialPort>,
}

impl HubBus {
    /// Open a new connection to the hub
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    pub(crate) fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    pub(crate) fn build_packet(slot: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(slot);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    /// Decode a complete response frame
    pub(crate) fn parse_response(expected_slot: u8, frame: &[u8]) -> Result<Response> {
        if frame.len() < 6 || frame[..2] != HEADER {
            return Err(HubError::InvalidResponse {
                slot: expected_slot,
                reason: format!("Malformed frame: {:02X?}", frame),
            });
        }

        let slot = frame[2];
        let length = frame[3] as usize;
        if slot != expected_slot {
            return Err(HubError::InvalidResponse {
                slot: expected_slot,
                reason: format!("Slot mismatch: expected {}, got {}", expected_slot, slot),
            });
        }
        if frame.len() != 4 + length {
            return Err(HubError::InvalidResponse {
                slot,
                reason: format!("Length mismatch: header says {}, got {}", length, frame.len() - 4),
            });
        }

        let body = &frame[4..];
        let received_checksum = body[body.len() - 1];
        if Self::checksum(&frame[2..frame.len() - 1]) != received_checksum {
            return Err(HubError::ChecksumMismatch { slot });
        }

        let status = Status::from_byte(body[0]).ok_or(HubError::UnknownStatus {
            slot,
            status: body[0],
        })?;

        Ok(Response {
            status,
            params: body[1..body.len() - 1].to_vec(),
        })
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_response(&mut self, expected_slot: u8) -> Result<Response> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HubError::Timeout {
                    slot: expected_slot,
                }
            } else {
                HubError::Io(e)
            }
        })?;

        let length = head[3] as usize;
        let mut frame = Vec::with_capacity(4 + length);
        frame.extend_from_slice(&head);
        frame.resize(4 + length, 0);
        self.port.read_exact(&mut frame[4..])?;

        Self::parse_response(expected_slot, &frame)
    }

    /// Send one instruction and wait for its reply
    pub fn transact(&mut self, slot: u8, instruction: Instruction, params: &[u8]) -> Result<Response> {
        let packet = Self::build_packet(slot, instruction, params);
        debug!(
            "Hub request: slot=0x{:02X}, instruction={:?}, {} param bytes",
            slot,
            instruction,
            params.len()
        );
        self.send_packet(&packet)?;
        self.read_response(slot)
    }

    // === High-level convenience methods ===

    /// Device type id connected to a slot (0 = nothing)
    pub fn ping(&mut self, slot: u8) -> Result<u8> {
        let response = self.transact(slot, Instruction::Ping, &[])?;
        Ok(response.params.first().copied().unwrap_or(0))
    }
}

/// Decode little-endian f32 channels
pub fn decode_f32s(slot: u8, params: &[u8], out: &mut [f32]) -> Result<()> {
    if params.len() != out.len() * 4 {
        return Err(HubError::InvalidResponse {
            slot,
            reason: format!("Expected {} bytes, got {}", out.len() * 4, params.len()),
        });
    }
    for (value, chunk) in out.iter_mut().zip(params.chunks_exact(4)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(())
}

/// Decode a little-endian i32 count (tachometer degrees)
pub fn decode_i32(slot: u8, params: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = params.try_into().map_err(|_| HubError::InvalidResponse {
        slot,
        reason: format!("Expected 4 bytes, got {}", params.len()),
    })?;
    Ok(i32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(slot: u8, status: u8, params: &[u8]) -> Vec<u8> {
        let mut f = vec![0xFF, 0xFF, slot, (params.len() + 2) as u8, status];
        f.extend_from_slice(params);
        let checksum = HubBus::checksum(&f[2..]);
        f.push(checksum);
        f
    }

    #[test]
    fn test_checksum() {
        let data = [0x10u8, 4, 0x03, 30, 0, 2];
        // ~(16+4+3+30+0+2) = ~55 = 200
        assert_eq!(HubBus::checksum(&data), 200);
    }

    #[test]
    fn test_build_packet() {
        let packet = HubBus::build_packet(0x12, Instruction::Fetch, &[2]);
        assert_eq!(packet.len(), 7);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 0x12); // slot
        assert_eq!(packet[3], 3); // instruction + param + checksum
        assert_eq!(packet[4], Instruction::Fetch as u8);
        assert_eq!(packet[5], 2);
        assert_eq!(packet[6], HubBus::checksum(&packet[2..6]));
    }

    #[test]
    fn test_parse_ok_response() {
        let response = HubBus::parse_response(0x11, &frame(0x11, 0, &[1, 2])).unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.params, vec![1, 2]);
    }

    #[test]
    fn test_parse_status_codes() {
        let response = HubBus::parse_response(0x10, &frame(0x10, 2, &[0x11])).unwrap();
        assert_eq!(response.status, Status::WrongDevice);
        assert_eq!(response.params, vec![0x11]);

        assert!(matches!(
            HubBus::parse_response(0x10, &frame(0x10, 9, &[])),
            Err(HubError::UnknownStatus { status: 9, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut f = frame(0x13, 0, &[5]);
        let last = f.len() - 1;
        f[last] ^= 0x01;
        assert!(matches!(
            HubBus::parse_response(0x13, &f),
            Err(HubError::ChecksumMismatch { slot: 0x13 })
        ));

        assert!(matches!(
            HubBus::parse_response(0x12, &frame(0x13, 0, &[])),
            Err(HubError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_decode_f32s() {
        let mut params = Vec::new();
        params.extend_from_slice(&0.25f32.to_le_bytes());
        params.extend_from_slice(&(-12.5f32).to_le_bytes());
        let mut out = [0.0f32; 2];
        decode_f32s(0x11, &params, &mut out).unwrap();
        assert_eq!(out, [0.25, -12.5]);

        let mut wrong = [0.0f32; 3];
        assert!(decode_f32s(0x11, &params, &mut wrong).is_err());
    }

    #[test]
    fn test_decode_i32_keeps_large_counts_exact() {
        // 2^24 + 1 is not representable as f32
        let count: i32 = (1 << 24) + 1;
        assert_eq!(decode_i32(0x01, &count.to_le_bytes()).unwrap(), count);
        assert_eq!(decode_i32(0x01, &(-count).to_le_bytes()).unwrap(), -count);
        assert!(decode_i32(0x01, &[0, 0]).is_err());
    }
}
