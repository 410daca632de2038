//! Sensor data message
//!
//! The one variable-length message in the protocol: an 11-byte header
//! (command id, extended address, frame control) followed by one sub-field
//! per frame-control bit set, serialized in ascending bit order. Field
//! presence and serialization order both come from the single
//! [`DataField::ALL`] table, so encode and decode cannot disagree about the
//! layout.

use heapless::Vec;

use super::{read_u16, read_u32, CmdId, DataField, DecodeError, ExtAddr, FrameControl};

/// Sensor message header length: command id, extended address, frame control
pub const SENSOR_HEADER_LEN: usize = 1 + 8 + 2;

/// Longest possible sensor message (every field present)
pub const SENSOR_MESSAGE_MAX_LEN: usize = {
    let mut len = SENSOR_HEADER_LEN;
    let mut i = 0;
    while i < DataField::ALL.len() {
        len += DataField::ALL[i].wire_len();
        i += 1;
    }
    len
};

/// Ambience and object temperature, 0.01 degree C per count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TempField {
    /// Ambience chip temperature
    pub ambience_temp: i16,
    /// Object temperature
    pub object_temp: i16,
}

/// Raw light sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightField {
    /// Raw data as read from the light sensor
    pub raw_data: u16,
}

/// Raw humidity sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumidityField {
    /// Raw temperature reading from the humidity sensor
    pub temp: u16,
    /// Raw humidity reading
    pub humidity: u16,
}

/// Device-side message statistics, eighteen counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgStatsField {
    /// Association requests sent
    pub join_attempts: u16,
    /// Association attempts that failed
    pub join_fails: u16,
    /// Sensor data messages attempted
    pub msgs_attempted: u16,
    /// Sensor data messages sent over the air
    pub msgs_sent: u16,
    /// Tracking requests received
    pub tracking_requests: u16,
    /// Tracking responses attempted
    pub tracking_response_attempts: u16,
    /// Tracking responses sent
    pub tracking_response_sent: u16,
    /// Configuration requests received
    pub config_requests: u16,
    /// Configuration responses attempted
    pub config_response_attempts: u16,
    /// Configuration responses sent
    pub config_response_sent: u16,
    /// Channel access failures reported in data confirms
    pub channel_access_failures: u16,
    /// MAC acknowledgment failures reported in data confirms
    pub mac_ack_failures: u16,
    /// Data request failures other than channel access or ack
    pub other_data_request_failures: u16,
    /// Sync loss indications (sleepy devices)
    pub sync_loss_indications: u16,
    /// Receive decrypt failures
    pub rx_decrypt_failures: u16,
    /// Transmit encrypt failures
    pub tx_encrypt_failures: u16,
    /// Device resets
    pub reset_count: u16,
    /// Assert reason for the last reset
    pub last_reset_reason: u16,
}

/// Echo of the device's active reporting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigSettingsField {
    /// Active reporting interval in milliseconds, 0 if reporting is off
    pub reporting_interval: u32,
    /// Active poll interval in milliseconds, 0 if the device does not sleep
    pub polling_interval: u32,
}

/// Barometric pressure sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PressureField {
    /// Pressure reading
    pub pressure_value: u32,
    /// Temperature reading from the pressure sensor
    pub temp_value: i32,
}

/// Motion detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionField {
    /// Motion detected
    pub is_motion: bool,
}

/// Battery voltage reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryField {
    /// Battery voltage
    pub voltage_value: u32,
}

/// Door/window hall effect sensor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HallEffectField {
    /// Contact open
    pub is_open: bool,
    /// Tamper detected
    pub is_tampered: bool,
}

/// Fan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanField {
    /// Current fan speed
    pub fan_speed: i8,
}

/// Door lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoorLockField {
    /// Door locked
    pub is_locked: bool,
}

/// Water leak detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaterLeakField {
    /// 1 if a leak is detected
    pub status: u16,
}

/// Fully decoded sensor data message; absent fields are `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMessage {
    /// Extended address of the reporting device
    pub ext_addr: ExtAddr,
    /// Temperature field
    pub temp: Option<TempField>,
    /// Light field
    pub light: Option<LightField>,
    /// Humidity field
    pub humidity: Option<HumidityField>,
    /// Message statistics field
    pub msg_stats: Option<MsgStatsField>,
    /// Configuration echo field
    pub config_settings: Option<ConfigSettingsField>,
    /// Pressure field
    pub pressure: Option<PressureField>,
    /// Motion field
    pub motion: Option<MotionField>,
    /// Battery field
    pub battery: Option<BatteryField>,
    /// Hall effect field
    pub hall_effect: Option<HallEffectField>,
    /// Fan field
    pub fan: Option<FanField>,
    /// Door lock field
    pub door_lock: Option<DoorLockField>,
    /// Water leak field
    pub water_leak: Option<WaterLeakField>,
}

impl SensorMessage {
    /// An empty message from the given device
    pub fn new(ext_addr: ExtAddr) -> Self {
        SensorMessage {
            ext_addr,
            temp: None,
            light: None,
            humidity: None,
            msg_stats: None,
            config_settings: None,
            pressure: None,
            motion: None,
            battery: None,
            hall_effect: None,
            fan: None,
            door_lock: None,
            water_leak: None,
        }
    }

    /// Frame control derived from which fields are present
    pub fn frame_control(&self) -> FrameControl {
        let mut fc = FrameControl::empty();
        for field in DataField::ALL {
            if self.has_field(field) {
                fc = fc.with(field);
            }
        }
        fc
    }

    fn has_field(&self, field: DataField) -> bool {
        match field {
            DataField::Temp => self.temp.is_some(),
            DataField::Light => self.light.is_some(),
            DataField::Humidity => self.humidity.is_some(),
            DataField::MsgStats => self.msg_stats.is_some(),
            DataField::ConfigSettings => self.config_settings.is_some(),
            DataField::Pressure => self.pressure.is_some(),
            DataField::Motion => self.motion.is_some(),
            DataField::Battery => self.battery.is_some(),
            DataField::HallEffect => self.hall_effect.is_some(),
            DataField::Fan => self.fan.is_some(),
            DataField::DoorLock => self.door_lock.is_some(),
            DataField::WaterLeak => self.water_leak.is_some(),
        }
    }

    /// Total message length implied by a frame control value
    pub fn wire_len(frame_control: FrameControl) -> Result<usize, DecodeError> {
        if frame_control.has_unknown_bits() {
            return Err(DecodeError::InvalidValue);
        }
        let mut len = SENSOR_HEADER_LEN;
        for field in DataField::ALL {
            if frame_control.contains(field) {
                len += field.wire_len();
            }
        }
        Ok(len)
    }

    /// Parse from a received payload (command id included).
    ///
    /// The payload length must equal exactly the length implied by the
    /// embedded frame control; anything shorter or longer is rejected
    /// before a single field is read.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < SENSOR_HEADER_LEN {
            return Err(DecodeError::InvalidLength);
        }

        let mut ext_addr: ExtAddr = [0; 8];
        ext_addr.copy_from_slice(&payload[1..9]);
        let frame_control = FrameControl::from_bits(read_u16(payload, 9));

        if payload.len() != Self::wire_len(frame_control)? {
            return Err(DecodeError::InvalidLength);
        }

        let mut msg = SensorMessage::new(ext_addr);
        let mut pos = SENSOR_HEADER_LEN;
        for field in DataField::ALL {
            if !frame_control.contains(field) {
                continue;
            }
            match field {
                DataField::Temp => {
                    msg.temp = Some(TempField {
                        ambience_temp: read_u16(payload, pos) as i16,
                        object_temp: read_u16(payload, pos + 2) as i16,
                    });
                }
                DataField::Light => {
                    msg.light = Some(LightField {
                        raw_data: read_u16(payload, pos),
                    });
                }
                DataField::Humidity => {
                    msg.humidity = Some(HumidityField {
                        temp: read_u16(payload, pos),
                        humidity: read_u16(payload, pos + 2),
                    });
                }
                DataField::MsgStats => {
                    msg.msg_stats = Some(MsgStatsField {
                        join_attempts: read_u16(payload, pos),
                        join_fails: read_u16(payload, pos + 2),
                        msgs_attempted: read_u16(payload, pos + 4),
                        msgs_sent: read_u16(payload, pos + 6),
                        tracking_requests: read_u16(payload, pos + 8),
                        tracking_response_attempts: read_u16(payload, pos + 10),
                        tracking_response_sent: read_u16(payload, pos + 12),
                        config_requests: read_u16(payload, pos + 14),
                        config_response_attempts: read_u16(payload, pos + 16),
                        config_response_sent: read_u16(payload, pos + 18),
                        channel_access_failures: read_u16(payload, pos + 20),
                        mac_ack_failures: read_u16(payload, pos + 22),
                        other_data_request_failures: read_u16(payload, pos + 24),
                        sync_loss_indications: read_u16(payload, pos + 26),
                        rx_decrypt_failures: read_u16(payload, pos + 28),
                        tx_encrypt_failures: read_u16(payload, pos + 30),
                        reset_count: read_u16(payload, pos + 32),
                        last_reset_reason: read_u16(payload, pos + 34),
                    });
                }
                DataField::ConfigSettings => {
                    msg.config_settings = Some(ConfigSettingsField {
                        reporting_interval: read_u32(payload, pos),
                        polling_interval: read_u32(payload, pos + 4),
                    });
                }
                DataField::Pressure => {
                    msg.pressure = Some(PressureField {
                        pressure_value: read_u32(payload, pos),
                        temp_value: read_u32(payload, pos + 4) as i32,
                    });
                }
                DataField::Motion => {
                    msg.motion = Some(MotionField {
                        is_motion: payload[pos] != 0,
                    });
                }
                DataField::Battery => {
                    msg.battery = Some(BatteryField {
                        voltage_value: read_u32(payload, pos),
                    });
                }
                DataField::HallEffect => {
                    msg.hall_effect = Some(HallEffectField {
                        is_open: payload[pos] != 0,
                        is_tampered: payload[pos + 1] != 0,
                    });
                }
                DataField::Fan => {
                    msg.fan = Some(FanField {
                        fan_speed: payload[pos] as i8,
                    });
                }
                DataField::DoorLock => {
                    msg.door_lock = Some(DoorLockField {
                        is_locked: payload[pos] != 0,
                    });
                }
                DataField::WaterLeak => {
                    msg.water_leak = Some(WaterLeakField {
                        status: read_u16(payload, pos),
                    });
                }
            }
            pos += field.wire_len();
        }

        Ok(msg)
    }

    /// Serialize with the frame control derived from the present fields
    pub fn encode(&self) -> Vec<u8, SENSOR_MESSAGE_MAX_LEN> {
        let mut buf: Vec<u8, SENSOR_MESSAGE_MAX_LEN> = Vec::new();
        buf.push(CmdId::SensorData as u8).unwrap();
        buf.extend_from_slice(&self.ext_addr).unwrap();
        buf.extend_from_slice(&self.frame_control().bits().to_le_bytes())
            .unwrap();

        for field in DataField::ALL {
            match field {
                DataField::Temp => {
                    if let Some(temp) = &self.temp {
                        buf.extend_from_slice(&temp.ambience_temp.to_le_bytes()).unwrap();
                        buf.extend_from_slice(&temp.object_temp.to_le_bytes()).unwrap();
                    }
                }
                DataField::Light => {
                    if let Some(light) = &self.light {
                        buf.extend_from_slice(&light.raw_data.to_le_bytes()).unwrap();
                    }
                }
                DataField::Humidity => {
                    if let Some(humidity) = &self.humidity {
                        buf.extend_from_slice(&humidity.temp.to_le_bytes()).unwrap();
                        buf.extend_from_slice(&humidity.humidity.to_le_bytes()).unwrap();
                    }
                }
                DataField::MsgStats => {
                    if let Some(stats) = &self.msg_stats {
                        for value in [
                            stats.join_attempts,
                            stats.join_fails,
                            stats.msgs_attempted,
                            stats.msgs_sent,
                            stats.tracking_requests,
                            stats.tracking_response_attempts,
                            stats.tracking_response_sent,
                            stats.config_requests,
                            stats.config_response_attempts,
                            stats.config_response_sent,
                            stats.channel_access_failures,
                            stats.mac_ack_failures,
                            stats.other_data_request_failures,
                            stats.sync_loss_indications,
                            stats.rx_decrypt_failures,
                            stats.tx_encrypt_failures,
                            stats.reset_count,
                            stats.last_reset_reason,
                        ] {
                            buf.extend_from_slice(&value.to_le_bytes()).unwrap();
                        }
                    }
                }
                DataField::ConfigSettings => {
                    if let Some(settings) = &self.config_settings {
                        buf.extend_from_slice(&settings.reporting_interval.to_le_bytes())
                            .unwrap();
                        buf.extend_from_slice(&settings.polling_interval.to_le_bytes())
                            .unwrap();
                    }
                }
                DataField::Pressure => {
                    if let Some(pressure) = &self.pressure {
                        buf.extend_from_slice(&pressure.pressure_value.to_le_bytes())
                            .unwrap();
                        buf.extend_from_slice(&pressure.temp_value.to_le_bytes()).unwrap();
                    }
                }
                DataField::Motion => {
                    if let Some(motion) = &self.motion {
                        buf.push(motion.is_motion as u8).unwrap();
                    }
                }
                DataField::Battery => {
                    if let Some(battery) = &self.battery {
                        buf.extend_from_slice(&battery.voltage_value.to_le_bytes())
                            .unwrap();
                    }
                }
                DataField::HallEffect => {
                    if let Some(hall) = &self.hall_effect {
                        buf.push(hall.is_open as u8).unwrap();
                        buf.push(hall.is_tampered as u8).unwrap();
                    }
                }
                DataField::Fan => {
                    if let Some(fan) = &self.fan {
                        buf.push(fan.fan_speed as u8).unwrap();
                    }
                }
                DataField::DoorLock => {
                    if let Some(lock) = &self.door_lock {
                        buf.push(lock.is_locked as u8).unwrap();
                    }
                }
                DataField::WaterLeak => {
                    if let Some(leak) = &self.water_leak {
                        buf.extend_from_slice(&leak.status.to_le_bytes()).unwrap();
                    }
                }
            }
        }

        buf
    }
}
