//! Platform collaborator interface
//!
//! Everything the session core reports outward — user-facing state changes
//! and the persistence hook for the outgoing frame counter — goes through
//! this trait. Implementations must not block; they are called from inside
//! the event pump.

use crate::assoc::DeviceDescriptor;
use crate::mac::ShortAddr;
use crate::messages::{ConfigResponse, SensorMessage};

/// Network parameters reported when the coordinator comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// PAN identifier of the started network
    pub pan_id: u16,
    /// Logical channel in use
    pub channel: u8,
}

/// Host-facing notifications and persistence, provided by the platform
pub trait Platform {
    /// The network is up and the session core is active
    fn network_started(&mut self, info: &NetworkInfo);

    /// A device was enrolled (or re-enrolled) into the association table
    fn device_joined(&mut self, descriptor: &DeviceDescriptor);

    /// A device answered a configuration request
    fn config_response(&mut self, addr: ShortAddr, rssi: i8, response: &ConfigResponse);

    /// A device reported telemetry
    fn sensor_data(&mut self, addr: ShortAddr, rssi: i8, msg: &SensorMessage);

    /// A device failed its tracking probe and its retry; `probe_outstanding`
    /// is true when the device never answered the probe (as opposed to a
    /// probe that could not be delivered at all)
    fn device_not_responding(&mut self, addr: ShortAddr, probe_outstanding: bool);

    /// A device answered a toggle request with its LED state
    fn toggle_response(&mut self, addr: ShortAddr, led_on: bool);

    /// Persist the outgoing security frame counter
    fn frame_counter_updated(&mut self, frame_counter: u32);
}
