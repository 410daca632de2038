//! Over-the-air message formats
//!
//! This module defines the application messages exchanged between the
//! collector and its sensor devices:
//! - Command identifiers and the 16-bit exchange status code
//! - The frame-control bitmask selecting optional telemetry fields
//! - Fixed-layout request/response codecs
//! - The variable-shape sensor data message (see [`sensor`])
//!
//! Every multi-byte field is serialized low byte first, regardless of host
//! endianness. The first byte of every message is the command id. Decoding
//! rejects any message whose length does not exactly match the length
//! implied by its kind (or, for sensor data, by its own frame control).

pub mod sensor;

pub use sensor::SensorMessage;

/// Extended (64-bit) device address carried in sensor messages
pub type ExtAddr = [u8; 8];

/// Configuration request length (over-the-air)
pub const CONFIG_REQUEST_LEN: usize = 11;
/// Configuration response length (over-the-air)
pub const CONFIG_RESPONSE_LEN: usize = 13;
/// Tracking request length (over-the-air)
pub const TRACKING_REQUEST_LEN: usize = 1;
/// Tracking response length (over-the-air)
pub const TRACKING_RESPONSE_LEN: usize = 1;
/// Toggle LED request length (over-the-air)
pub const TOGGLE_REQUEST_LEN: usize = 1;
/// Toggle LED response length (over-the-air)
pub const TOGGLE_RESPONSE_LEN: usize = 2;
/// Buzzer control request length (over-the-air)
pub const BUZZER_REQUEST_LEN: usize = 1;
/// Fan speed / door lock change command length (over-the-air)
pub const ACTUATOR_CHANGE_LEN: usize = 2;

/// Message identifiers, one byte over the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CmdId {
    /// Configuration request, collector to sensor
    ConfigReq = 1,
    /// Configuration response, sensor to collector
    ConfigRsp = 2,
    /// Tracking (liveness probe) request, collector to sensor
    TrackingReq = 3,
    /// Tracking response, sensor to collector
    TrackingRsp = 4,
    /// Sensor data message, sensor to collector
    SensorData = 5,
    /// Toggle LED request, collector to sensor
    ToggleLedReq = 6,
    /// Toggle LED response, sensor to collector
    ToggleLedRsp = 7,
    /// Ramp test data, sensor to collector
    RampData = 8,
    /// Over-the-air download message, either direction
    Oad = 9,
    /// Fan speed change, either direction
    FanSpeedChg = 10,
    /// Door lock change, either direction
    DoorLockChg = 11,
    /// Buzzer control request, collector to sensor
    BuzzerCtrlReq = 12,
    /// Buzzer control response, sensor to collector
    BuzzerCtrlRsp = 13,
}

impl CmdId {
    /// Parse a command id from its wire value
    pub fn from_wire(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            1 => CmdId::ConfigReq,
            2 => CmdId::ConfigRsp,
            3 => CmdId::TrackingReq,
            4 => CmdId::TrackingRsp,
            5 => CmdId::SensorData,
            6 => CmdId::ToggleLedReq,
            7 => CmdId::ToggleLedRsp,
            8 => CmdId::RampData,
            9 => CmdId::Oad,
            10 => CmdId::FanSpeedChg,
            11 => CmdId::DoorLockChg,
            12 => CmdId::BuzzerCtrlReq,
            13 => CmdId::BuzzerCtrlRsp,
            _ => return Err(DecodeError::UnknownCommand),
        })
    }
}

/// Exchange status carried in configuration responses, two bytes over
/// the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum StatusValue {
    /// Request applied in full
    Success = 0,
    /// Request was invalid and ignored
    Invalid = 1,
    /// Only some requested fields are supported, or an interval failed a
    /// range check
    PartialSuccess = 2,
}

impl StatusValue {
    fn from_wire(value: u16) -> Result<Self, DecodeError> {
        Ok(match value {
            0 => StatusValue::Success,
            1 => StatusValue::Invalid,
            2 => StatusValue::PartialSuccess,
            _ => return Err(DecodeError::InvalidValue),
        })
    }
}

/// Codec failure; the offending message is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// First byte is not a known command id
    UnknownCommand,
    /// Received length does not match the length implied by the message
    InvalidLength,
    /// A field carried a value outside its enumeration
    InvalidValue,
}

/// Optional telemetry fields a sensor can report, one bit each.
///
/// The bit value doubles as the serialization order: a field whose bit is
/// lower is serialized before any field with a higher bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum DataField {
    /// Ambience/object temperature pair
    Temp = 0x0001,
    /// Raw light sensor reading
    Light = 0x0002,
    /// Raw humidity sensor readings
    Humidity = 0x0004,
    /// Device-side message statistics block
    MsgStats = 0x0008,
    /// Echo of the device's active reporting configuration
    ConfigSettings = 0x0010,
    /// Barometric pressure and temperature
    Pressure = 0x0020,
    /// Motion detector flag
    Motion = 0x0040,
    /// Battery voltage
    Battery = 0x0080,
    /// Door/window hall effect state
    HallEffect = 0x0100,
    /// Fan speed
    Fan = 0x0200,
    /// Door lock state
    DoorLock = 0x0400,
    /// Water leak detector state
    WaterLeak = 0x0800,
}

impl DataField {
    /// Every field in ascending bit (serialization) order
    pub const ALL: [DataField; 12] = [
        DataField::Temp,
        DataField::Light,
        DataField::Humidity,
        DataField::MsgStats,
        DataField::ConfigSettings,
        DataField::Pressure,
        DataField::Motion,
        DataField::Battery,
        DataField::HallEffect,
        DataField::Fan,
        DataField::DoorLock,
        DataField::WaterLeak,
    ];

    /// The field's frame-control bit
    pub const fn bit(self) -> u16 {
        self as u16
    }

    /// Serialized length of the field in bytes
    pub const fn wire_len(self) -> usize {
        match self {
            DataField::Temp => 4,
            DataField::Light => 2,
            DataField::Humidity => 4,
            DataField::MsgStats => 36,
            DataField::ConfigSettings => 8,
            DataField::Pressure => 8,
            DataField::Motion => 1,
            DataField::Battery => 4,
            DataField::HallEffect => 2,
            DataField::Fan => 1,
            DataField::DoorLock => 1,
            DataField::WaterLeak => 2,
        }
    }
}

/// Bitmask of [`DataField`]s, two bytes over the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameControl(u16);

impl FrameControl {
    /// All twelve fields requested
    pub const ALL_FIELDS: FrameControl = FrameControl(0x0FFF);

    /// No fields requested
    pub const fn empty() -> Self {
        FrameControl(0)
    }

    /// Mask from raw bits; bits outside the defined fields are kept and
    /// rejected later by length validation
    pub const fn from_bits(bits: u16) -> Self {
        FrameControl(bits)
    }

    /// Raw bit value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether the field's bit is set
    pub const fn contains(self, field: DataField) -> bool {
        self.0 & field.bit() != 0
    }

    /// This mask with the field's bit set
    pub const fn with(self, field: DataField) -> Self {
        FrameControl(self.0 | field.bit())
    }

    /// Whether any bit outside the defined fields is set
    pub const fn has_unknown_bits(self) -> bool {
        self.0 & !Self::ALL_FIELDS.0 != 0
    }
}

pub(crate) fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

pub(crate) fn read_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// Configuration request: tells a device what to report and how often
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequest {
    /// Fields the device is asked to report
    pub frame_control: FrameControl,
    /// Reporting interval in milliseconds; 0 turns automated reporting off
    /// but forces one sensor data message
    pub reporting_interval: u32,
    /// Poll interval in milliseconds for sleepy devices; 0 for devices that
    /// do not sleep
    pub polling_interval: u32,
}

impl ConfigRequest {
    /// Serialize to the fixed 11-byte layout.
    ///
    /// The layout is always complete; the frame control alone expresses
    /// which fields are requested.
    pub fn encode(&self) -> [u8; CONFIG_REQUEST_LEN] {
        let mut buf = [0u8; CONFIG_REQUEST_LEN];
        buf[0] = CmdId::ConfigReq as u8;
        buf[1..3].copy_from_slice(&self.frame_control.bits().to_le_bytes());
        buf[3..7].copy_from_slice(&self.reporting_interval.to_le_bytes());
        buf[7..11].copy_from_slice(&self.polling_interval.to_le_bytes());
        buf
    }
}

/// Configuration response reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigResponse {
    /// Outcome of the configuration request
    pub status: StatusValue,
    /// Fields the device will actually report
    pub frame_control: FrameControl,
    /// Reporting interval the device settled on, in milliseconds
    pub reporting_interval: u32,
    /// Poll interval the device settled on, in milliseconds
    pub polling_interval: u32,
}

impl ConfigResponse {
    /// Parse from a received payload (command id included)
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != CONFIG_RESPONSE_LEN {
            return Err(DecodeError::InvalidLength);
        }
        Ok(ConfigResponse {
            status: StatusValue::from_wire(read_u16(payload, 1))?,
            frame_control: FrameControl::from_bits(read_u16(payload, 3)),
            reporting_interval: read_u32(payload, 5),
            polling_interval: read_u32(payload, 9),
        })
    }
}

/// Validate a received tracking response (command id only)
pub fn decode_tracking_response(payload: &[u8]) -> Result<(), DecodeError> {
    if payload.len() != TRACKING_RESPONSE_LEN {
        return Err(DecodeError::InvalidLength);
    }
    Ok(())
}

/// Parse a toggle LED response; returns the reported LED state
pub fn decode_toggle_response(payload: &[u8]) -> Result<bool, DecodeError> {
    if payload.len() != TOGGLE_RESPONSE_LEN {
        return Err(DecodeError::InvalidLength);
    }
    Ok(payload[1] != 0)
}

/// Serialize a tracking request
pub fn encode_tracking_request() -> [u8; TRACKING_REQUEST_LEN] {
    [CmdId::TrackingReq as u8]
}

/// Serialize a toggle LED request
pub fn encode_toggle_request() -> [u8; TOGGLE_REQUEST_LEN] {
    [CmdId::ToggleLedReq as u8]
}

/// Serialize a buzzer control request
pub fn encode_buzzer_request() -> [u8; BUZZER_REQUEST_LEN] {
    [CmdId::BuzzerCtrlReq as u8]
}

/// Serialize a fan speed change command
pub fn encode_fan_speed(speed: i8) -> [u8; ACTUATOR_CHANGE_LEN] {
    [CmdId::FanSpeedChg as u8, speed as u8]
}

/// Serialize a door lock change command
pub fn encode_door_lock(locked: bool) -> [u8; ACTUATOR_CHANGE_LEN] {
    [CmdId::DoorLockChg as u8, locked as u8]
}
