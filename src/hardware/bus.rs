// Serial protocol for the smart motor controllers and sensors on the base.
//
// All devices (8 motor controllers, 4 absolute encoders, 1 gyro) sit on one
// half-duplex serial bus and speak a small register protocol:
// Packet format: [0xA5, 0x5A, ID, Length, Opcode, Params..., Checksum]
//
// Positions and velocities travel as i32 milli-rotations (per second) in
// little-endian; encoder absolute position is a u16 tick count out of 4096.

use serialport::{self, SerialPort};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

use super::{AbsoluteEncoder, DriveMotor, HardwareError, HeadingSource, NeutralMode, Result,
            SteerMotor};

/// Default serial configuration for the controller bus.
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xA5, 0x5A];

/// Encoder resolution: ticks per full rotation.
const ENCODER_TICKS: f64 = 4096.0;

/// Wire scale for positions and velocities (milli-rotations).
const MILLI: f64 = 1000.0;

/// Opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Opcode {
    Ping = 0x01,
    ReadReg = 0x02,
    WriteReg = 0x03,
}

/// Register map shared by the motor controllers, encoders and gyro.
/// Not every device implements every register.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    FirmwareVersion = 0x00, // u16, read-only

    // Motor controller configuration
    ControlMode = 0x10, // u8: 0=position, 1=velocity
    NeutralMode = 0x11, // u8: 0=coast, 1=brake

    // Motor controller setpoints (i32 milli-units)
    GoalVelocity = 0x20,   // milli-rot/s, signed
    GoalPosition = 0x24,   // milli-rot, signed, multi-turn
    RehomePosition = 0x28, // overwrites the internal position register

    // Motor controller feedback (read-only)
    PresentPosition = 0x30, // i32 milli-rot
    PresentVelocity = 0x34, // i32 milli-rot/s

    // Encoder feedback (read-only)
    AbsolutePosition = 0x40, // u16 ticks, 0..4095

    // Gyro feedback (read-only)
    YawAngle = 0x50, // i32 centi-degrees, CCW positive

    FaultFlags = 0x60, // u8 bitfield
}

/// Control modes for the motor controllers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Position = 0,
    Velocity = 1,
}

/// The shared serial bus. One instance per physical port; device handles
/// below borrow it through an `Rc<RefCell<..>>` since the whole drivetrain
/// is serviced by a single control-loop task.
pub struct ServoBus {
    port: Box<dyn SerialPort>,
}

impl ServoBus {
    /// Open a connection to the controller bus.
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

    /// Checksum over everything after the header: complement of the byte sum.
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, opcode: Opcode, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // opcode + params + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(opcode as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // id, length, opcode, params
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet, returning its parameter bytes.
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HardwareError::Timeout { id: expected_id }
            } else {
                HardwareError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(HardwareError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(HardwareError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // status byte + params + checksum = length bytes
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        Self::parse_body(id, &remaining)
    }

    /// Validate a response body (status + params + checksum) and return the
    /// parameter bytes. `body` is everything after the length byte.
    fn parse_body(id: u8, body: &[u8]) -> Result<Vec<u8>> {
        // Shortest legal body is status + checksum. A corrupted length byte
        // must surface as an error, not an out-of-bounds slice.
        if body.len() < 2 {
            return Err(HardwareError::InvalidResponse {
                id,
                reason: format!("Body too short: {} bytes", body.len()),
            });
        }

        let mut checksum_data = vec![id, body.len() as u8];
        checksum_data.extend_from_slice(&body[..body.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = body[body.len() - 1];

        if expected_checksum != received_checksum {
            return Err(HardwareError::ChecksumMismatch { id });
        }

        let status = body[0];
        if status != 0 {
            return Err(HardwareError::DeviceFault { id, status });
        }

        Ok(body[1..body.len() - 1].to_vec())
    }

    /// Ping a device to check it is alive on the bus.
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Opcode::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(HardwareError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte register.
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Opcode::WriteReg, &params);
        debug!("Write u8 to device {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write a four-byte signed register (little-endian).
    pub fn write_i32(&mut self, id: u8, register: Register, value: i32) -> Result<()> {
        let bytes = value.to_le_bytes();
        let params = [register as u8, bytes[0], bytes[1], bytes[2], bytes[3]];
        let packet = Self::build_packet(id, Opcode::WriteReg, &params);
        debug!("Write i32 to device {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read a single byte register.
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let params = [register as u8, 1]; // address, length
        let packet = Self::build_packet(id, Opcode::ReadReg, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.is_empty() {
            return Err(HardwareError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            });
        }
        Ok(response[0])
    }

    /// Read a two-byte unsigned register (little-endian).
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let params = [register as u8, 2];
        let packet = Self::build_packet(id, Opcode::ReadReg, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 2 {
            return Err(HardwareError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Read a four-byte signed register (little-endian).
    pub fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let params = [register as u8, 4];
        let packet = Self::build_packet(id, Opcode::ReadReg, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 4 {
            return Err(HardwareError::InvalidResponse {
                id,
                reason: format!("Expected 4 bytes, got {}", response.len()),
            });
        }
        Ok(i32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ]))
    }

    // === High-level convenience methods ===

    pub fn set_control_mode(&mut self, id: u8, mode: ControlMode) -> Result<()> {
        self.write_u8(id, Register::ControlMode, mode as u8)
    }

    pub fn set_neutral_mode(&mut self, id: u8, mode: NeutralMode) -> Result<()> {
        let value = match mode {
            NeutralMode::Coast => 0,
            NeutralMode::Brake => 1,
        };
        self.write_u8(id, Register::NeutralMode, value)
    }

    pub fn set_goal_velocity_rps(&mut self, id: u8, rps: f64) -> Result<()> {
        self.write_i32(id, Register::GoalVelocity, to_milli(rps))
    }

    pub fn set_goal_position_rot(&mut self, id: u8, rotations: f64) -> Result<()> {
        self.write_i32(id, Register::GoalPosition, to_milli(rotations))
    }

    /// Overwrite the controller's internal position register. The rotor does
    /// not move; subsequent position commands are interpreted against the
    /// new reference.
    pub fn rehome_position_rot(&mut self, id: u8, rotations: f64) -> Result<()> {
        self.write_i32(id, Register::RehomePosition, to_milli(rotations))
    }

    pub fn present_position_rot(&mut self, id: u8) -> Result<f64> {
        Ok(from_milli(self.read_i32(id, Register::PresentPosition)?))
    }

    /// Encoder absolute position as a fraction of one rotation in [0, 1).
    pub fn absolute_fraction(&mut self, id: u8) -> Result<f64> {
        let ticks = self.read_u16(id, Register::AbsolutePosition)?;
        Ok(f64::from(ticks % ENCODER_TICKS as u16) / ENCODER_TICKS)
    }

    /// Gyro yaw in degrees, CCW positive.
    pub fn yaw_degrees(&mut self, id: u8) -> Result<f64> {
        Ok(f64::from(self.read_i32(id, Register::YawAngle)?) / 100.0)
    }
}

/// Convert rotations (or rot/s) to the i32 milli-unit wire format.
fn to_milli(value: f64) -> i32 {
    let scaled = (value * MILLI).round();
    scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Convert the i32 milli-unit wire format back to rotations (or rot/s).
fn from_milli(raw: i32) -> f64 {
    f64::from(raw) / MILLI
}

/// Shared handle to the bus, cloned into each device adapter. The control
/// loop is single-threaded, so RefCell borrows never overlap.
pub type SharedBus = Rc<RefCell<ServoBus>>;

/// Wrap a freshly opened bus for sharing between device handles.
pub fn share(bus: ServoBus) -> SharedBus {
    Rc::new(RefCell::new(bus))
}

/// Drive motor controller on the bus.
pub struct BusDriveMotor {
    bus: SharedBus,
    id: u8,
}

impl BusDriveMotor {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self { bus, id }
    }
}

impl DriveMotor for BusDriveMotor {
    fn set_velocity_rps(&mut self, rps: f64) -> Result<()> {
        self.bus.borrow_mut().set_goal_velocity_rps(self.id, rps)
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        bus.set_control_mode(self.id, ControlMode::Velocity)?;
        bus.set_neutral_mode(self.id, mode)
    }

    fn position_rotations(&mut self) -> Result<f64> {
        self.bus.borrow_mut().present_position_rot(self.id)
    }
}

/// Steering motor controller on the bus.
pub struct BusSteerMotor {
    bus: SharedBus,
    id: u8,
}

impl BusSteerMotor {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self { bus, id }
    }
}

impl SteerMotor for BusSteerMotor {
    fn set_position_rotations(&mut self, rotations: f64) -> Result<()> {
        self.bus.borrow_mut().set_goal_position_rot(self.id, rotations)
    }

    fn overwrite_position_rotations(&mut self, rotations: f64) -> Result<()> {
        self.bus.borrow_mut().rehome_position_rot(self.id, rotations)
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        bus.set_control_mode(self.id, ControlMode::Position)?;
        bus.set_neutral_mode(self.id, mode)
    }
}

/// Absolute steering encoder on the bus.
pub struct BusEncoder {
    bus: SharedBus,
    id: u8,
}

impl BusEncoder {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self { bus, id }
    }
}

impl AbsoluteEncoder for BusEncoder {
    fn fraction_of_rotation(&mut self) -> Result<f64> {
        self.bus.borrow_mut().absolute_fraction(self.id)
    }
}

/// Yaw gyro on the bus.
pub struct BusGyro {
    bus: SharedBus,
    id: u8,
}

impl BusGyro {
    pub fn new(bus: SharedBus, id: u8) -> Self {
        Self { bus, id }
    }
}

impl HeadingSource for BusGyro {
    fn heading_degrees(&mut self) -> Result<f64> {
        self.bus.borrow_mut().yaw_degrees(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=7, WriteReg, reg=GoalVelocity, value bytes
        let data = [1u8, 7, 0x03, 0x20, 0xE8, 0x03, 0x00, 0x00];
        let checksum = ServoBus::checksum(&data);
        // ~(1+7+3+0x20+0xE8+3) & 0xFF
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        assert_eq!(checksum, (!sum & 0xFF) as u8);
    }

    #[test]
    fn test_build_ping_packet() {
        let packet = ServoBus::build_packet(11, Opcode::Ping, &[]);
        // Header (2) + ID (1) + Length (1) + Opcode (1) + Checksum (1)
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[0], 0xA5);
        assert_eq!(packet[1], 0x5A);
        assert_eq!(packet[2], 11); // ID
        assert_eq!(packet[3], 2); // opcode + checksum
        assert_eq!(packet[4], 0x01); // Ping
    }

    #[test]
    fn test_build_write_packet_layout() {
        let value = 1500i32.to_le_bytes();
        let params = [Register::GoalPosition as u8, value[0], value[1], value[2], value[3]];
        let packet = ServoBus::build_packet(3, Opcode::WriteReg, &params);
        assert_eq!(packet[2], 3); // ID
        assert_eq!(packet[3], 7); // opcode + 5 params + checksum
        assert_eq!(packet[4], 0x03); // WriteReg
        assert_eq!(packet[5], 0x24); // GoalPosition register
        assert_eq!(&packet[6..10], &value);
        // Checksum covers id..params
        assert_eq!(packet[10], ServoBus::checksum(&packet[2..10]));
    }

    // Build a response body with a valid checksum for the given status and
    // params, as a device would frame it after the length byte.
    fn frame_body(id: u8, status: u8, params: &[u8]) -> Vec<u8> {
        let mut body = vec![status];
        body.extend_from_slice(params);
        let mut checksum_data = vec![id, (body.len() + 1) as u8];
        checksum_data.extend_from_slice(&body);
        body.push(ServoBus::checksum(&checksum_data));
        body
    }

    #[test]
    fn test_parse_body_unwraps_params() {
        let body = frame_body(3, 0, &[0xAA, 0xBB]);
        let params = ServoBus::parse_body(3, &body).unwrap();
        assert_eq!(params, vec![0xAA, 0xBB]);

        // Ping-style response: status and checksum only, no params.
        let body = frame_body(11, 0, &[]);
        assert!(ServoBus::parse_body(11, &body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_body_rejects_truncated_frames() {
        // Length byte 0 or 1 on the wire means no room for status + checksum.
        assert!(matches!(
            ServoBus::parse_body(5, &[]),
            Err(HardwareError::InvalidResponse { id: 5, .. })
        ));
        assert!(matches!(
            ServoBus::parse_body(5, &[0x00]),
            Err(HardwareError::InvalidResponse { id: 5, .. })
        ));
    }

    #[test]
    fn test_parse_body_rejects_bad_checksum() {
        let mut body = frame_body(3, 0, &[0xAA]);
        *body.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(
            ServoBus::parse_body(3, &body),
            Err(HardwareError::ChecksumMismatch { id: 3 })
        ));
    }

    #[test]
    fn test_parse_body_surfaces_fault_status() {
        let body = frame_body(7, 0x04, &[]);
        assert!(matches!(
            ServoBus::parse_body(7, &body),
            Err(HardwareError::DeviceFault { id: 7, status: 0x04 })
        ));
    }

    #[test]
    fn test_milli_fixed_point() {
        assert_eq!(to_milli(0.0), 0);
        assert_eq!(to_milli(1.0), 1000);
        assert_eq!(to_milli(-2.5), -2500);
        assert_eq!(to_milli(0.0004), 0); // rounds to nearest
        assert_eq!(to_milli(0.0006), 1);
        assert_eq!(from_milli(1000), 1.0);
        assert_eq!(from_milli(-750), -0.75);
        // Extreme values saturate rather than wrap.
        assert_eq!(to_milli(1e12), i32::MAX);
        assert_eq!(to_milli(-1e12), i32::MIN);
    }
}
