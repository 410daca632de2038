//! Collector session controller
//!
//! The orchestrating state machine of the coordinator application. It
//! reacts to network start, device joins, send confirmations, timer
//! expiries and inbound frames, and drives the association table, the
//! message codec and the two exchange schedulers:
//!
//! - The configuration sweep pushes per-device reporting configuration,
//!   keeping at most one configuration request in flight network-wide and
//!   revalidating every settled device once per cycle.
//! - The tracking round probes one device per cycle for liveness with a
//!   retry-once-then-fail policy.
//!
//! All work happens on one logical worker: producers enqueue [`Event`]s and
//! [`Collector::process`] drains them strictly in order, so none of the
//! session state needs locking.

use heapless::Deque;
use log::{debug, info, warn};

use crate::assoc::{
    AssocTable, CapabilityInfo, ConfigState, DeviceDescriptor, DeviceRecord, TrackingState,
};
use crate::handle::{self, HandleAllocator};
use crate::mac::{
    CommStatusIndication, CommStatusReason, DataConfirm, DataIndication, DataRequest, Mac,
    MacStatus, PollIndication, ShortAddr, INVALID_SHORT_ADDR,
};
use crate::messages::{
    self, CmdId, ConfigRequest, ConfigResponse, FrameControl, SensorMessage,
};
use crate::platform::{NetworkInfo, Platform};
use crate::time::{Clock, Instant, Timer};

/// Capacity of the ordered event queue
pub const EVENT_QUEUE_LEN: usize = 32;

/// Delay before retrying a configuration request, in milliseconds
pub const CONFIG_DELAY_MS: u32 = 1_000;
/// Window for a device to answer a confirmed configuration request
pub const CONFIG_RESPONSE_DELAY_MS: u32 = 3 * CONFIG_DELAY_MS;
/// Delay before resending a tracking probe whose confirm failed
pub const TRACKING_CNF_DELAY_MS: u32 = 2_000;
/// Delay between tracking rounds; also the near-term delay armed when a
/// quiet device produces real traffic
pub const TRACKING_DELAY_MS: u32 = 60_000;
/// Re-arm delay while no live device exists to probe
pub const TRACKING_IDLE_DELAY_MS: u32 = 300_000;
/// Default reporting interval pushed to joining devices
pub const DEFAULT_REPORTING_INTERVAL_MS: u32 = 90_000;
/// Default poll interval pushed to sleepy joining devices
pub const DEFAULT_POLLING_INTERVAL_MS: u32 = 6_000;

/// Tunable parameters of the session core
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Fields requested from every device by the configuration sweep
    pub frame_control: FrameControl,
    /// Reporting interval pushed by the sweep, in milliseconds
    pub reporting_interval_ms: u32,
    /// Poll interval pushed by the sweep, in milliseconds
    pub polling_interval_ms: u32,
    /// Short configuration retry delay
    pub config_retry_ms: u32,
    /// Configuration response window
    pub config_response_ms: u32,
    /// Tracking resend delay after a failed confirm
    pub tracking_retry_ms: u32,
    /// Full tracking cycle delay
    pub tracking_cycle_ms: u32,
    /// Long idle delay when no live device exists
    pub tracking_idle_ms: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            frame_control: FrameControl::ALL_FIELDS,
            reporting_interval_ms: DEFAULT_REPORTING_INTERVAL_MS,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            config_retry_ms: CONFIG_DELAY_MS,
            config_response_ms: CONFIG_RESPONSE_DELAY_MS,
            tracking_retry_ms: TRACKING_CNF_DELAY_MS,
            tracking_cycle_ms: TRACKING_DELAY_MS,
            tracking_idle_ms: TRACKING_IDLE_DELAY_MS,
        }
    }
}

impl CollectorConfig {
    /// Window for a device to answer a tracking probe: twice the poll
    /// interval, so even a sleepy device gets two chances to fetch it
    pub fn tracking_timeout_ms(&self) -> u32 {
        self.polling_interval_ms.saturating_mul(2)
    }
}

/// Typed status returned by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The collector is not in a state to perform the request
    InvalidState,
    /// No association record for the addressed device
    DeviceNotFound,
    /// Every association slot is occupied
    TableFull,
    /// The event queue is full
    QueueFull,
}

/// Everything the event pump reacts to, in one closed set
#[derive(Debug, Clone)]
pub enum Event {
    /// Run a configuration sweep. `timed_out` is set on sweeps generated by
    /// the configuration timer; only those clear stale in-flight requests.
    ConfigDue {
        /// Generated by configuration-timer expiry
        timed_out: bool,
    },
    /// Run a tracking round
    TrackingDue,
    /// MAC confirmed (or failed) an earlier data request
    DataConfirm(DataConfirm),
    /// MAC delivered an application frame
    DataIndication(DataIndication),
    /// A sleepy device polled for pending data
    PollIndication(PollIndication),
    /// MAC-reported status for a management frame
    CommStatus(CommStatusIndication),
}

/// Exchange and failure counters, updated only by the event pump
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Tracking requests handed to the MAC
    pub tracking_request_attempts: u32,
    /// Tracking requests confirmed sent
    pub tracking_requests_sent: u32,
    /// Tracking responses received
    pub tracking_responses_received: u32,
    /// Configuration requests handed to the MAC
    pub config_request_attempts: u32,
    /// Configuration requests confirmed sent
    pub config_requests_sent: u32,
    /// Configuration responses received
    pub config_responses_received: u32,
    /// Sensor data messages received
    pub sensor_messages_received: u32,
    /// Confirms reporting channel access failure
    pub channel_access_failures: u32,
    /// Confirms reporting a missing acknowledgment
    pub ack_failures: u32,
    /// Confirms reporting any other failure
    pub other_tx_failures: u32,
    /// Confirms reporting an expired indirect transaction
    pub tx_transaction_expired: u32,
    /// Confirms reporting a transaction queue overflow
    pub tx_transaction_overflow: u32,
    /// Inbound frames dropped on the collaborator's security verdict
    pub rx_security_failures: u32,
}

/// Coordinator session core.
///
/// Owns the association table, handle allocator, both logical timers, the
/// event queue and the statistics; collaborators are reached through the
/// [`Mac`], [`Platform`] and [`Clock`] seams.
pub struct Collector<M: Mac, P: Platform, C: Clock, const MAX_DEVICES: usize> {
    mac: M,
    platform: P,
    clock: C,
    config: CollectorConfig,
    started: bool,
    pan_id: u16,
    devices: AssocTable<MAX_DEVICES>,
    handles: HandleAllocator,
    config_timer: Timer,
    tracking_timer: Timer,
    /// The tracking timer is armed with the long idle delay; real traffic
    /// may replace it with the near-term cycle delay
    tracking_idle_armed: bool,
    /// Slot of the device configured last; revalidation rotates from here
    config_cursor: usize,
    events: Deque<Event, EVENT_QUEUE_LEN>,
    stats: Statistics,
}

impl<M: Mac, P: Platform, C: Clock, const MAX_DEVICES: usize> Collector<M, P, C, MAX_DEVICES> {
    /// Create an inactive session core; nothing is scheduled until
    /// [`Collector::network_started`]
    pub fn new(mac: M, platform: P, clock: C, config: CollectorConfig) -> Self {
        Collector {
            mac,
            platform,
            clock,
            config,
            started: false,
            pan_id: 0xFFFF,
            devices: AssocTable::new(),
            handles: HandleAllocator::new(),
            config_timer: Timer::new(),
            tracking_timer: Timer::new(),
            tracking_idle_armed: false,
            config_cursor: MAX_DEVICES.saturating_sub(1),
            events: Deque::new(),
            stats: Statistics::default(),
        }
    }

    /// The network formation layer brought the coordinator up; activate the
    /// session and start the tracking cycle
    pub fn network_started(&mut self, info: NetworkInfo) {
        self.pan_id = info.pan_id;
        self.started = true;
        self.platform.network_started(&info);
        let now = self.clock.now();
        self.arm_tracking(now, self.config.tracking_cycle_ms, false);
        info!(
            "collector started, pan 0x{:04x} channel {}",
            info.pan_id, info.channel
        );
    }

    /// The admission layer accepted a join: enroll (or refresh) the device
    /// and schedule its configuration
    pub fn device_joined(
        &mut self,
        descriptor: &DeviceDescriptor,
        capability: CapabilityInfo,
    ) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState);
        }

        if let Some(device) = self.devices.find_by_addr_mut(descriptor.short_addr) {
            // Re-join of a known address: refresh identity, keep the slot
            device.ext_addr = descriptor.ext_addr;
            device.capability = capability;
            device.alive = true;
        } else {
            self.devices
                .insert(DeviceRecord::new(descriptor, capability))
                .map_err(|_| Error::TableFull)?;
        }
        info!("device 0x{:04x} joined", descriptor.short_addr);
        self.platform.device_joined(descriptor);

        self.enqueue_config_sweep();
        Ok(())
    }

    /// Build and send a configuration request to one device.
    ///
    /// Refused while another configuration request is in flight anywhere in
    /// the table; the sweep owns retries, so callers can simply try again
    /// on the next cycle.
    pub fn send_config_request(
        &mut self,
        addr: ShortAddr,
        frame_control: FrameControl,
        reporting_interval_ms: u32,
        polling_interval_ms: u32,
    ) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState);
        }
        let index = self
            .devices
            .find_index(|device| device.short_addr == addr)
            .ok_or(Error::DeviceNotFound)?;
        if self.devices.any(|device| device.config == ConfigState::Sent) {
            return Err(Error::InvalidState);
        }
        if self.try_send_config(index, frame_control, reporting_interval_ms, polling_interval_ms)
        {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Send a toggle LED request to one device
    pub fn send_toggle_request(&mut self, addr: ShortAddr) -> Result<(), Error> {
        self.send_actuator(addr, CmdId::ToggleLedReq, &messages::encode_toggle_request())
    }

    /// Send a buzzer control request to one device
    pub fn send_buzzer_request(&mut self, addr: ShortAddr) -> Result<(), Error> {
        self.send_actuator(addr, CmdId::BuzzerCtrlReq, &messages::encode_buzzer_request())
    }

    /// Command a device's fan speed
    pub fn send_fan_speed(&mut self, addr: ShortAddr, speed: i8) -> Result<(), Error> {
        self.send_actuator(addr, CmdId::FanSpeedChg, &messages::encode_fan_speed(speed))
    }

    /// Command a device's door lock
    pub fn send_door_lock(&mut self, addr: ShortAddr, locked: bool) -> Result<(), Error> {
        self.send_actuator(addr, CmdId::DoorLockChg, &messages::encode_door_lock(locked))
    }

    /// Enqueue an event from a producer (MAC glue, control surface)
    pub fn post(&mut self, event: Event) -> Result<(), Error> {
        self.events.push_back(event).map_err(|_| Error::QueueFull)
    }

    /// Drain the event queue, converting expired timer deadlines into
    /// events first. Call whenever an event was posted or a deadline from
    /// [`Collector::next_deadline`] passed.
    pub fn process(&mut self) {
        let now = self.clock.now();
        if self.config_timer.poll(now) {
            if self
                .events
                .push_back(Event::ConfigDue { timed_out: true })
                .is_err()
            {
                // Queue full: keep the deadline instead of losing the fire
                self.config_timer.arm(now, self.config.config_retry_ms);
                warn!("event queue full, config fire deferred");
            }
        }
        if self.tracking_timer.poll(now) {
            self.tracking_idle_armed = false;
            if self.events.push_back(Event::TrackingDue).is_err() {
                self.tracking_timer.arm(now, self.config.tracking_retry_ms);
                warn!("event queue full, tracking fire deferred");
            }
        }

        while let Some(event) = self.events.pop_front() {
            self.dispatch(event);
        }
    }

    /// Earliest pending timer deadline, for the embedding scheduler
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.config_timer.deadline(), self.tracking_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Pending configuration timer deadline
    pub fn config_deadline(&self) -> Option<Instant> {
        self.config_timer.deadline()
    }

    /// Pending tracking timer deadline
    pub fn tracking_deadline(&self) -> Option<Instant> {
        self.tracking_timer.deadline()
    }

    /// Whether the session is active
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Exchange and failure counters
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Association record for a device
    pub fn device(&self, addr: ShortAddr) -> Option<&DeviceRecord> {
        self.devices.find_by_addr(addr)
    }

    /// Enrolled device count
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// The MAC collaborator
    pub fn mac(&self) -> &M {
        &self.mac
    }

    /// The MAC collaborator, mutable
    pub fn mac_mut(&mut self) -> &mut M {
        &mut self.mac
    }

    /// The platform collaborator
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The platform collaborator, mutable
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::ConfigDue { timed_out } => self.config_sweep(timed_out),
            Event::TrackingDue => self.tracking_round(),
            Event::DataConfirm(confirm) => self.handle_data_confirm(confirm),
            Event::DataIndication(indication) => self.handle_data_indication(indication),
            Event::PollIndication(indication) => self.process_data_retry(indication.src_addr),
            Event::CommStatus(indication) => self.handle_comm_status(indication),
        }
    }

    /// Generate a configuration request for the next device that needs one.
    ///
    /// Periodic (timer-driven) sweeps first downgrade every settled device
    /// so its configuration gets revalidated, and return a request still
    /// marked in flight past its retry deadline to the pool. At most one
    /// device may be awaiting a confirm at any time, only one request is
    /// started per sweep, and selection rotates through the table so
    /// revalidation cannot starve later slots.
    fn config_sweep(&mut self, timed_out: bool) {
        if !self.started || MAX_DEVICES == 0 {
            return;
        }

        if timed_out {
            for device in self.devices.iter_mut() {
                if !device.alive {
                    continue;
                }
                if device.config.is_settled() || device.config == ConfigState::Sent {
                    device.config = ConfigState::NeedsConfig;
                }
            }
        }

        if self.devices.any(|device| device.config == ConfigState::Sent) {
            return;
        }

        let start = self.config_cursor;
        for offset in 1..=MAX_DEVICES {
            let index = (start + offset) % MAX_DEVICES;
            let needs_config = self
                .devices
                .get(index)
                .is_some_and(|device| device.alive && device.config == ConfigState::NeedsConfig);
            if !needs_config {
                continue;
            }
            let frame_control = self.config.frame_control;
            let reporting = self.config.reporting_interval_ms;
            let polling = self.config.polling_interval_ms;
            if self.try_send_config(index, frame_control, reporting, polling) {
                self.config_cursor = index;
            }
            break;
        }
    }

    /// Send a configuration request to the device at `index` and mark it in
    /// flight; on MAC rejection schedule a retry instead
    fn try_send_config(
        &mut self,
        index: usize,
        frame_control: FrameControl,
        reporting_interval_ms: u32,
        polling_interval_ms: u32,
    ) -> bool {
        let Some(device) = self.devices.get(index) else {
            return false;
        };
        let addr = device.short_addr;

        let request = ConfigRequest {
            frame_control,
            reporting_interval: reporting_interval_ms,
            polling_interval: polling_interval_ms,
        };
        let payload = request.encode();

        // Configuration requests are always queued indirectly: a joining
        // device may still be sleepy regardless of its capability bits
        if self.send_msg(CmdId::ConfigReq, addr, false, &payload) {
            self.stats.config_request_attempts += 1;
            if let Some(device) = self.devices.get_mut(index) {
                device.config = ConfigState::Sent;
            }
            let now = self.clock.now();
            self.config_timer.arm(now, self.config.config_retry_ms);
            debug!("config request -> 0x{:04x}", addr);
            true
        } else {
            self.process_config_retry();
            false
        }
    }

    /// Probe one device for liveness.
    ///
    /// Priority: a device waiting for its retry is resent first; otherwise
    /// a device with activity from the previous round is resolved (cleared,
    /// and reported not-responding if it never answered) and the next live
    /// device in table order is probed; otherwise the first live device is
    /// probed. With no live devices the timer re-arms at the long idle
    /// delay.
    fn tracking_round(&mut self) {
        if !self.started {
            return;
        }

        for index in 0..MAX_DEVICES {
            let Some(device) = self.devices.get(index) else {
                continue;
            };
            if !device.alive {
                continue;
            }
            let state = device.tracking;

            if state == TrackingState::RetryPending {
                // Immediate resend, same device
                self.send_tracking_request(index);
                return;
            }

            if state.has_activity() {
                let addr = device.short_addr;
                let never_responded = state != TrackingState::Responded;
                if never_responded {
                    let probe_outstanding = state.probe_in_flight();
                    if let Some(device) = self.devices.get_mut(index) {
                        device.alive = false;
                        device.config = ConfigState::NeedsConfig;
                    }
                    warn!("device 0x{:04x} not responding", addr);
                    self.platform.device_not_responding(addr, probe_outstanding);
                }
                if let Some(device) = self.devices.get_mut(index) {
                    device.tracking = TrackingState::Idle;
                }

                let next = self.devices.next_live_after(index).unwrap_or(index);
                self.send_tracking_request(next);
                return;
            }
        }

        // No prior activity anywhere: start the round at the first live
        // device
        if let Some(index) = self.devices.find_index(|device| device.alive) {
            self.send_tracking_request(index);
            return;
        }

        let now = self.clock.now();
        self.arm_tracking(now, self.config.tracking_idle_ms, true);
    }

    fn send_tracking_request(&mut self, index: usize) {
        let Some(device) = self.devices.get(index) else {
            return;
        };
        let addr = device.short_addr;
        let rx_on_idle = device.capability.rx_on_when_idle;
        let retrying = device.tracking == TrackingState::RetryPending;

        let payload = messages::encode_tracking_request();
        if self.send_msg(CmdId::TrackingReq, addr, rx_on_idle, &payload) {
            if let Some(device) = self.devices.get_mut(index) {
                device.tracking = if retrying {
                    TrackingState::SentRetry
                } else {
                    TrackingState::Sent
                };
            }
            let now = self.clock.now();
            let timeout = self.config.tracking_timeout_ms();
            self.arm_tracking(now, timeout, false);
            self.stats.tracking_request_attempts += 1;
            debug!("tracking probe -> 0x{:04x}", addr);
        } else {
            self.process_data_retry(addr);
        }
    }

    fn handle_data_confirm(&mut self, confirm: DataConfirm) {
        match confirm.status {
            MacStatus::ChannelAccessFailure => self.stats.channel_access_failures += 1,
            MacStatus::NoAck => self.stats.ack_failures += 1,
            MacStatus::TransactionExpired => self.stats.tx_transaction_expired += 1,
            MacStatus::TransactionOverflow => self.stats.tx_transaction_overflow += 1,
            MacStatus::OtherError => self.stats.other_tx_failures += 1,
            MacStatus::Success => self.platform.frame_counter_updated(confirm.frame_counter),
        }

        if !handle::is_app_handle(confirm.msdu_handle) {
            return;
        }

        let now = self.clock.now();
        if handle::is_config_handle(confirm.msdu_handle) {
            // The confirm carries no address: it belongs to the one device
            // with a configuration request in flight
            if let Some(index) = self
                .devices
                .find_index(|device| device.config == ConfigState::Sent)
            {
                if let Some(device) = self.devices.get_mut(index) {
                    if confirm.status.is_success() {
                        device.config = ConfigState::Confirmed;
                        device.alive = true;
                        self.config_timer.arm(now, self.config.config_response_ms);
                    } else {
                        device.config = ConfigState::NeedsConfig;
                        self.config_timer.arm(now, self.config.config_retry_ms);
                    }
                }
            }
            if confirm.status.is_success() {
                self.stats.config_requests_sent += 1;
            }
        } else {
            let mut resend_due = false;
            if let Some(index) = self
                .devices
                .find_index(|device| device.tracking.probe_in_flight())
            {
                if let Some(device) = self.devices.get_mut(index) {
                    if confirm.status.is_success() {
                        // Delivered; any earlier retry is resolved
                        device.tracking = TrackingState::Sent;
                    } else {
                        device.tracking = if device.tracking == TrackingState::SentRetry {
                            TrackingState::Error
                        } else {
                            TrackingState::RetryPending
                        };
                        resend_due = true;
                    }
                }
            }
            if resend_due {
                self.arm_tracking(now, self.config.tracking_retry_ms, false);
            }
            if confirm.status.is_success() {
                self.stats.tracking_requests_sent += 1;
            }
        }
    }

    fn handle_data_indication(&mut self, indication: DataIndication) {
        if indication.msdu.is_empty() {
            return;
        }
        if !indication.security_ok {
            self.stats.rx_security_failures += 1;
            return;
        }
        if indication.src_addr == INVALID_SHORT_ADDR {
            return;
        }

        let cmd = match CmdId::from_wire(indication.msdu[0]) {
            Ok(cmd) => cmd,
            Err(_) => {
                debug!("unknown command 0x{:02x}, dropped", indication.msdu[0]);
                return;
            }
        };

        match cmd {
            CmdId::ConfigRsp => self.process_config_response(&indication),
            CmdId::TrackingRsp => self.process_tracking_response(&indication),
            CmdId::ToggleLedRsp => self.process_toggle_response(&indication),
            CmdId::SensorData | CmdId::FanSpeedChg | CmdId::DoorLockChg => {
                self.process_sensor_data(&indication)
            }
            _ => {
                // Not a message the collector consumes
                debug!("unexpected {:?} from 0x{:04x}", cmd, indication.src_addr);
            }
        }
    }

    fn process_config_response(&mut self, indication: &DataIndication) {
        let response = match ConfigResponse::decode(&indication.msdu) {
            Ok(response) => response,
            Err(err) => {
                debug!("config response dropped: {:?}", err);
                return;
            }
        };

        if let Some(device) = self.devices.find_by_addr_mut(indication.src_addr) {
            device.config = ConfigState::Responded;
        }

        self.platform
            .config_response(indication.src_addr, indication.rssi, &response);
        self.enqueue_config_sweep();
        self.stats.config_responses_received += 1;
    }

    fn process_tracking_response(&mut self, indication: &DataIndication) {
        if messages::decode_tracking_response(&indication.msdu).is_err() {
            debug!("tracking response dropped: bad length");
            return;
        }

        let mut answered = false;
        if let Some(device) = self.devices.find_by_addr_mut(indication.src_addr) {
            if device.tracking.probe_in_flight() {
                device.tracking = TrackingState::Responded;
                answered = true;
            }
        }
        if answered {
            let now = self.clock.now();
            self.arm_tracking(now, self.config.tracking_cycle_ms, false);
            self.process_config_retry();
        }

        self.stats.tracking_responses_received += 1;
    }

    fn process_toggle_response(&mut self, indication: &DataIndication) {
        let led_on = match messages::decode_toggle_response(&indication.msdu) {
            Ok(led_on) => led_on,
            Err(err) => {
                debug!("toggle response dropped: {:?}", err);
                return;
            }
        };
        self.platform
            .toggle_response(indication.src_addr, led_on);
    }

    fn process_sensor_data(&mut self, indication: &DataIndication) {
        let msg = match SensorMessage::decode(&indication.msdu) {
            Ok(msg) => msg,
            Err(err) => {
                debug!("sensor data dropped: {:?}", err);
                return;
            }
        };

        self.stats.sensor_messages_received += 1;
        self.platform
            .sensor_data(indication.src_addr, indication.rssi, &msg);
        self.process_data_retry(indication.src_addr);
    }

    fn handle_comm_status(&mut self, indication: CommStatusIndication) {
        if indication.reason == CommStatusReason::AssociateResponse
            && !indication.status.is_success()
        {
            // The association response never reached the device; clear all
            // exchange progress until it joins again
            if let Some(device) = self.devices.find_by_addr_mut(indication.dst_addr) {
                device.reset();
            }
        }
    }

    /// Real traffic from a device: it is alive, and both exchanges may be
    /// due sooner than their timers assumed
    fn process_data_retry(&mut self, addr: ShortAddr) {
        if addr == INVALID_SHORT_ADDR {
            return;
        }
        let Some(device) = self.devices.find_by_addr_mut(addr) else {
            return;
        };
        device.alive = true;
        let needs_config = device.config == ConfigState::NeedsConfig;
        let tracking_quiet = !matches!(
            device.tracking,
            TrackingState::Sent | TrackingState::SentRetry | TrackingState::RetryPending
        );

        if needs_config {
            self.process_config_retry();
        }

        if tracking_quiet {
            let fire_pending = self
                .events
                .iter()
                .any(|event| matches!(event, Event::TrackingDue));
            let probe_in_flight = self
                .devices
                .any(|device| device.tracking.probe_in_flight());
            let timer_blocks = self.tracking_timer.is_armed() && !self.tracking_idle_armed;
            if !fire_pending && !probe_in_flight && !timer_blocks {
                // Near-term re-arm: traffic proves the device is there, so
                // do not wait out a long idle deadline
                let now = self.clock.now();
                self.arm_tracking(now, self.config.tracking_cycle_ms, false);
            }
        }
    }

    /// Make sure a configuration sweep will happen soon
    fn process_config_retry(&mut self) {
        let fire_pending = self
            .events
            .iter()
            .any(|event| matches!(event, Event::ConfigDue { .. }));
        if !fire_pending && !self.config_timer.is_armed() {
            let now = self.clock.now();
            self.config_timer.arm(now, self.config.config_retry_ms);
        }
    }

    /// Queue an immediate configuration sweep, once
    fn enqueue_config_sweep(&mut self) {
        let fire_pending = self
            .events
            .iter()
            .any(|event| matches!(event, Event::ConfigDue { .. }));
        if fire_pending {
            return;
        }
        if self
            .events
            .push_back(Event::ConfigDue { timed_out: false })
            .is_err()
        {
            self.config_timer.arm(self.clock.now(), self.config.config_retry_ms);
        }
    }

    fn arm_tracking(&mut self, now: Instant, delay_ms: u32, idle: bool) {
        self.tracking_timer.arm(now, delay_ms);
        self.tracking_idle_armed = idle;
    }

    fn send_actuator(
        &mut self,
        addr: ShortAddr,
        cmd: CmdId,
        payload: &[u8],
    ) -> Result<(), Error> {
        if !self.started {
            return Err(Error::InvalidState);
        }
        let rx_on_idle = self
            .devices
            .find_by_addr(addr)
            .ok_or(Error::DeviceNotFound)?
            .capability
            .rx_on_when_idle;
        self.send_msg(cmd, addr, rx_on_idle, payload);
        Ok(())
    }

    /// Hand one application frame to the MAC with a freshly classified
    /// handle; returns whether the MAC accepted it
    fn send_msg(&mut self, cmd: CmdId, dst: ShortAddr, rx_on_idle: bool, payload: &[u8]) -> bool {
        let request = DataRequest {
            dst_addr: dst,
            dst_pan_id: self.pan_id,
            msdu_handle: self.handles.next(cmd),
            ack_request: true,
            indirect: !rx_on_idle,
            msdu: payload,
        };
        match self.mac.data_request(&request) {
            Ok(()) => true,
            Err(_) => {
                warn!("mac rejected {:?} for 0x{:04x}", cmd, dst);
                false
            }
        }
    }
}
