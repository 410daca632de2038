//! End-to-end session tests: a mock MAC, platform and clock drive the
//! collector through full configuration and tracking exchanges.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use collector::messages::sensor::TempField;
use collector::{
    CapabilityInfo, Clock, CmdId, Collector, CollectorConfig, CommStatusIndication,
    CommStatusReason, ConfigRequest, ConfigResponse, ConfigState, DataConfirm, DataIndication,
    DataRequest, DeviceDescriptor, Error, Event, FrameControl, Instant, Mac, MacStatus,
    NetworkInfo, Platform, PollIndication, SensorMessage, StatusValue, TrackingState,
};

const PAN_ID: u16 = 0x2345;
const MAX_DEVICES: usize = 8;

#[derive(Debug, Clone)]
struct SentFrame {
    handle: u8,
    dst: u16,
    indirect: bool,
    payload: Vec<u8>,
}

#[derive(Default)]
struct MacLog {
    sent: Vec<SentFrame>,
    reject_next: bool,
}

struct TestMac(Rc<RefCell<MacLog>>);

impl Mac for TestMac {
    type Error = ();

    fn data_request(&mut self, request: &DataRequest<'_>) -> Result<(), ()> {
        let mut log = self.0.borrow_mut();
        if log.reject_next {
            log.reject_next = false;
            return Err(());
        }
        log.sent.push(SentFrame {
            handle: request.msdu_handle,
            dst: request.dst_addr,
            indirect: request.indirect,
            payload: request.msdu.to_vec(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct PlatformLog {
    started: Vec<NetworkInfo>,
    joins: Vec<u16>,
    config_responses: Vec<(u16, StatusValue)>,
    sensor_sources: Vec<u16>,
    not_responding: Vec<(u16, bool)>,
    toggles: Vec<(u16, bool)>,
    frame_counters: Vec<u32>,
}

struct TestPlatform(Rc<RefCell<PlatformLog>>);

impl Platform for TestPlatform {
    fn network_started(&mut self, info: &NetworkInfo) {
        self.0.borrow_mut().started.push(*info);
    }

    fn device_joined(&mut self, descriptor: &DeviceDescriptor) {
        self.0.borrow_mut().joins.push(descriptor.short_addr);
    }

    fn config_response(&mut self, addr: u16, _rssi: i8, response: &ConfigResponse) {
        self.0.borrow_mut().config_responses.push((addr, response.status));
    }

    fn sensor_data(&mut self, addr: u16, _rssi: i8, _msg: &SensorMessage) {
        self.0.borrow_mut().sensor_sources.push(addr);
    }

    fn device_not_responding(&mut self, addr: u16, probe_outstanding: bool) {
        self.0.borrow_mut().not_responding.push((addr, probe_outstanding));
    }

    fn toggle_response(&mut self, addr: u16, led_on: bool) {
        self.0.borrow_mut().toggles.push((addr, led_on));
    }

    fn frame_counter_updated(&mut self, frame_counter: u32) {
        self.0.borrow_mut().frame_counters.push(frame_counter);
    }
}

#[derive(Clone)]
struct TestClock(Rc<Cell<u64>>);

impl Clock for TestClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.0.get())
    }
}

struct Harness {
    collector: Collector<TestMac, TestPlatform, TestClock, MAX_DEVICES>,
    mac: Rc<RefCell<MacLog>>,
    platform: Rc<RefCell<PlatformLog>>,
    clock: Rc<Cell<u64>>,
}

impl Harness {
    fn new(config: CollectorConfig) -> Self {
        let mac = Rc::new(RefCell::new(MacLog::default()));
        let platform = Rc::new(RefCell::new(PlatformLog::default()));
        let clock = Rc::new(Cell::new(0u64));
        let collector = Collector::new(
            TestMac(mac.clone()),
            TestPlatform(platform.clone()),
            TestClock(clock.clone()),
            config,
        );
        Harness {
            collector,
            mac,
            platform,
            clock,
        }
    }

    /// Default configuration, and one with the config timers pushed far out
    /// so tracking behavior can be observed without config traffic
    fn started() -> Self {
        let mut harness = Self::new(CollectorConfig::default());
        harness.collector.network_started(NetworkInfo {
            pan_id: PAN_ID,
            channel: 11,
        });
        harness
    }

    fn started_quiet_config() -> Self {
        let mut harness = Self::new(CollectorConfig {
            config_retry_ms: 1_000_000,
            config_response_ms: 3_000_000,
            ..CollectorConfig::default()
        });
        harness.collector.network_started(NetworkInfo {
            pan_id: PAN_ID,
            channel: 11,
        });
        harness
    }

    fn join(&mut self, addr: u16, rx_on_idle: bool) {
        self.collector
            .device_joined(
                &DeviceDescriptor {
                    pan_id: PAN_ID,
                    short_addr: addr,
                    ext_addr: [addr as u8; 8],
                },
                CapabilityInfo {
                    rx_on_when_idle: rx_on_idle,
                },
            )
            .unwrap();
        self.collector.process();
    }

    fn advance_to(&mut self, millis: u64) {
        assert!(millis >= self.clock.get());
        self.clock.set(millis);
        self.collector.process();
    }

    fn frames(&self) -> Vec<SentFrame> {
        self.mac.borrow().sent.clone()
    }

    fn frames_of(&self, cmd: CmdId) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.payload[0] == cmd as u8)
            .collect()
    }

    fn last_frame(&self) -> SentFrame {
        self.mac.borrow().sent.last().unwrap().clone()
    }

    fn confirm(&mut self, frame: &SentFrame, status: MacStatus) {
        self.collector
            .post(Event::DataConfirm(DataConfirm {
                msdu_handle: frame.handle,
                status,
                frame_counter: 1,
            }))
            .unwrap();
        self.collector.process();
    }

    fn indicate(&mut self, src: u16, payload: &[u8]) {
        self.collector
            .post(Event::DataIndication(DataIndication {
                src_addr: src,
                rssi: -40,
                security_ok: true,
                msdu: heapless::Vec::from_slice(payload).unwrap(),
            }))
            .unwrap();
        self.collector.process();
    }

    fn config_state(&self, addr: u16) -> ConfigState {
        self.collector.device(addr).unwrap().config
    }

    fn tracking_state(&self, addr: u16) -> TrackingState {
        self.collector.device(addr).unwrap().tracking
    }

    fn assert_at_most_one_config_in_flight(&self) {
        let mut in_flight = 0;
        for addr in 0..0xFFFEu16 {
            if let Some(device) = self.collector.device(addr) {
                if device.config == ConfigState::Sent {
                    in_flight += 1;
                }
            }
        }
        assert!(in_flight <= 1, "{in_flight} config requests in flight");
    }
}

fn config_response_payload(status: StatusValue) -> Vec<u8> {
    let mut payload = vec![CmdId::ConfigRsp as u8];
    payload.extend_from_slice(&(status as u16).to_le_bytes());
    payload.extend_from_slice(&0x0FFFu16.to_le_bytes());
    payload.extend_from_slice(&90_000u32.to_le_bytes());
    payload.extend_from_slice(&6_000u32.to_le_bytes());
    payload
}

#[test]
fn join_sends_default_config_request_indirect() {
    let mut h = Harness::started();
    assert_eq!(
        h.platform.borrow().started,
        vec![NetworkInfo {
            pan_id: PAN_ID,
            channel: 11
        }]
    );

    h.join(0x0001, true);
    assert_eq!(h.platform.borrow().joins, vec![0x0001]);

    let frames = h.frames();
    assert_eq!(frames.len(), 1);
    let expected = ConfigRequest {
        frame_control: FrameControl::ALL_FIELDS,
        reporting_interval: 90_000,
        polling_interval: 6_000,
    }
    .encode();
    assert_eq!(frames[0].payload, expected);
    assert_eq!(frames[0].dst, 0x0001);
    // Config requests always go out indirect, even to rx-on devices
    assert!(frames[0].indirect);
    // The handle is classified app + config
    assert_eq!(frames[0].handle & 0xC0, 0xC0);
    assert_eq!(h.config_state(0x0001), ConfigState::Sent);
}

#[test]
fn config_round_trip_settles_then_revalidates() {
    let mut h = Harness::started();
    h.join(0x0001, false);
    let request = h.last_frame();

    // Successful confirm: settled (confirmed), response window armed
    h.confirm(&request, MacStatus::Success);
    assert_eq!(h.config_state(0x0001), ConfigState::Confirmed);
    assert_eq!(h.platform.borrow().frame_counters, vec![1]);
    let response_deadline = h.collector.config_deadline().unwrap();
    assert_eq!(response_deadline, Instant::from_millis(3_000));

    // The device answers: settled (responded), reported to the platform,
    // and no immediate re-request
    h.indicate(0x0001, &config_response_payload(StatusValue::Success));
    assert_eq!(h.config_state(0x0001), ConfigState::Responded);
    assert_eq!(
        h.platform.borrow().config_responses,
        vec![(0x0001, StatusValue::Success)]
    );
    assert_eq!(h.collector.stats().config_responses_received, 1);
    assert_eq!(h.frames_of(CmdId::ConfigReq).len(), 1);

    // The next periodic sweep revalidates: configuration is never sticky
    h.advance_to(response_deadline.as_millis());
    assert_eq!(h.config_state(0x0001), ConfigState::Sent);
    assert_eq!(h.frames_of(CmdId::ConfigReq).len(), 2);
}

#[test]
fn config_requests_serialize_across_devices() {
    let mut h = Harness::started();
    h.join(0x0001, false);
    h.join(0x0002, false);
    h.join(0x0003, false);
    h.assert_at_most_one_config_in_flight();

    // Only the first device got a request; the rest wait their turn
    assert_eq!(h.frames().len(), 1);
    assert_eq!(h.config_state(0x0001), ConfigState::Sent);
    assert_eq!(h.config_state(0x0002), ConfigState::NeedsConfig);

    // Settling the first frees the slot for the second
    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0001, &config_response_payload(StatusValue::Success));
    h.assert_at_most_one_config_in_flight();
    assert_eq!(h.frames().len(), 2);
    assert_eq!(h.last_frame().dst, 0x0002);

    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0002, &config_response_payload(StatusValue::Success));
    h.assert_at_most_one_config_in_flight();
    assert_eq!(h.frames().len(), 3);
    assert_eq!(h.last_frame().dst, 0x0003);
}

#[test]
fn periodic_revalidation_rotates_through_devices() {
    let mut h = Harness::started();
    for addr in [0x0001, 0x0002] {
        h.join(addr, false);
    }
    // Settle both devices
    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0001, &config_response_payload(StatusValue::Success));
    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0002, &config_response_payload(StatusValue::Success));
    assert_eq!(h.frames().len(), 2);

    // The periodic sweep downgrades everyone but starts with the device
    // after the one configured last
    let deadline = h.collector.config_deadline().unwrap();
    h.advance_to(deadline.as_millis());
    assert_eq!(h.last_frame().dst, 0x0001);
    assert_eq!(h.config_state(0x0002), ConfigState::NeedsConfig);
    h.assert_at_most_one_config_in_flight();
}

#[test]
fn failed_config_confirm_schedules_short_retry() {
    let mut h = Harness::started();
    h.join(0x0001, false);
    let request = h.last_frame();

    let before = h.clock.get();
    h.confirm(&request, MacStatus::ChannelAccessFailure);
    assert_eq!(h.config_state(0x0001), ConfigState::NeedsConfig);
    assert_eq!(h.collector.stats().channel_access_failures, 1);
    let retry = h.collector.config_deadline().unwrap();
    assert_eq!(retry, Instant::from_millis(before + 1_000));

    h.advance_to(retry.as_millis());
    assert_eq!(h.frames().len(), 2);
    assert_eq!(h.config_state(0x0001), ConfigState::Sent);
}

#[test]
fn direct_config_request_checks_state_and_serialization() {
    let mut h = Harness::new(CollectorConfig::default());
    // Not started yet
    assert_eq!(
        h.collector
            .send_config_request(0x0001, FrameControl::ALL_FIELDS, 1_000, 0),
        Err(Error::InvalidState)
    );

    h.collector.network_started(NetworkInfo {
        pan_id: PAN_ID,
        channel: 11,
    });
    assert_eq!(
        h.collector
            .send_config_request(0x0001, FrameControl::ALL_FIELDS, 1_000, 0),
        Err(Error::DeviceNotFound)
    );

    h.join(0x0001, false);
    h.join(0x0002, false);
    // 0x0001's request is in flight; a second one anywhere is refused
    assert_eq!(
        h.collector
            .send_config_request(0x0002, FrameControl::ALL_FIELDS, 1_000, 0),
        Err(Error::InvalidState)
    );
    h.assert_at_most_one_config_in_flight();
}

#[test]
fn tracking_probes_one_device_per_fire_and_rotates() {
    let mut h = Harness::started_quiet_config();
    h.join(0x0001, true);
    h.join(0x0002, true);
    // Settle configuration so only tracking traffic remains
    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0001, &config_response_payload(StatusValue::Success));
    h.confirm(&h.last_frame(), MacStatus::Success);
    h.indicate(0x0002, &config_response_payload(StatusValue::Success));

    // First fire probes exactly the first live device
    h.advance_to(60_000);
    let probes = h.frames_of(CmdId::TrackingReq);
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].dst, 0x0001);
    assert!(!probes[0].indirect);
    assert_eq!(h.tracking_state(0x0001), TrackingState::Sent);

    // Delivered and answered: full cycle re-arm, next round moves on
    h.confirm(&probes[0], MacStatus::Success);
    assert_eq!(h.collector.stats().tracking_requests_sent, 1);
    h.indicate(0x0001, &[CmdId::TrackingRsp as u8]);
    assert_eq!(h.tracking_state(0x0001), TrackingState::Responded);
    let next_fire = h.collector.tracking_deadline().unwrap();
    assert_eq!(next_fire, Instant::from_millis(120_000));

    h.advance_to(next_fire.as_millis());
    let probes = h.frames_of(CmdId::TrackingReq);
    assert_eq!(probes.len(), 2);
    assert_eq!(probes[1].dst, 0x0002);
    assert_eq!(h.tracking_state(0x0001), TrackingState::Idle);
    assert_eq!(h.tracking_state(0x0002), TrackingState::Sent);
}

#[test]
fn tracking_retries_once_then_reports_not_responding() {
    let mut h = Harness::started_quiet_config();
    h.join(0x0001, true);

    h.advance_to(60_000);
    let probe = h.last_frame();
    assert_eq!(probe.payload, [CmdId::TrackingReq as u8]);

    // First failure: retry pending, short re-arm
    h.confirm(&probe, MacStatus::NoAck);
    assert_eq!(h.tracking_state(0x0001), TrackingState::RetryPending);
    assert_eq!(
        h.collector.tracking_deadline(),
        Some(Instant::from_millis(62_000))
    );

    // The retry goes to the same device
    h.advance_to(62_000);
    let retry = h.last_frame();
    assert_eq!(retry.payload, [CmdId::TrackingReq as u8]);
    assert_eq!(retry.dst, 0x0001);
    assert_eq!(h.tracking_state(0x0001), TrackingState::SentRetry);

    // Second failure exhausts the retry budget
    h.confirm(&retry, MacStatus::NoAck);
    assert_eq!(h.tracking_state(0x0001), TrackingState::Error);
    assert_eq!(h.collector.stats().ack_failures, 2);

    // The next fire reports the device and clears its progress
    h.advance_to(64_000);
    assert_eq!(h.platform.borrow().not_responding, vec![(0x0001, false)]);
    let device = h.collector.device(0x0001).unwrap();
    assert!(!device.alive);
    assert_eq!(device.config, ConfigState::NeedsConfig);
    assert_eq!(h.frames_of(CmdId::TrackingReq).len(), 3);
}

#[test]
fn tracking_idle_rearm_without_live_devices() {
    let mut h = Harness::started_quiet_config();

    h.advance_to(60_000);
    assert!(h.frames().is_empty());
    assert_eq!(
        h.collector.tracking_deadline(),
        Some(Instant::from_millis(360_000))
    );
}

#[test]
fn poll_indication_rearms_tracking_near_term_not_idle() {
    let mut h = Harness::started_quiet_config();

    // Empty table: the timer parks on the long idle delay
    h.advance_to(60_000);
    assert_eq!(
        h.collector.tracking_deadline(),
        Some(Instant::from_millis(360_000))
    );

    h.join(0x0001, false);

    // Real traffic from a quiet device accelerates the next probe to the
    // near-term cycle delay
    h.collector
        .post(Event::PollIndication(PollIndication { src_addr: 0x0001 }))
        .unwrap();
    h.collector.process();
    assert_eq!(
        h.collector.tracking_deadline(),
        Some(Instant::from_millis(120_000))
    );
}

#[test]
fn sensor_data_reported_and_counts_as_liveness() {
    let mut h = Harness::started_quiet_config();
    h.join(0x0001, false);
    // Knock the device down first so the implicit liveness signal is
    // observable
    h.collector
        .post(Event::CommStatus(CommStatusIndication {
            dst_addr: 0x0001,
            reason: CommStatusReason::AssociateResponse,
            status: MacStatus::NoAck,
        }))
        .unwrap();
    h.collector.process();
    assert!(!h.collector.device(0x0001).unwrap().alive);

    let mut msg = SensorMessage::new([0x11; 8]);
    msg.temp = Some(TempField {
        ambience_temp: 2475,
        object_temp: 100,
    });
    let payload = msg.encode();
    h.indicate(0x0001, &payload);

    assert_eq!(h.platform.borrow().sensor_sources, vec![0x0001]);
    assert_eq!(h.collector.stats().sensor_messages_received, 1);
    // Real traffic revives the device
    assert!(h.collector.device(0x0001).unwrap().alive);
}

#[test]
fn malformed_and_unverified_frames_are_discarded() {
    let mut h = Harness::started_quiet_config();
    h.join(0x0001, false);

    // Truncated sensor message: dropped without a platform report
    let mut msg = SensorMessage::new([0x11; 8]);
    msg.temp = Some(TempField::default());
    let payload = msg.encode();
    h.indicate(0x0001, &payload[..payload.len() - 1]);
    assert!(h.platform.borrow().sensor_sources.is_empty());
    assert_eq!(h.collector.stats().sensor_messages_received, 0);

    // Unknown command id: dropped
    h.indicate(0x0001, &[0xEE, 0x01]);
    assert!(h.platform.borrow().sensor_sources.is_empty());

    // Security verdict failed: dropped before decoding, counted
    h.collector
        .post(Event::DataIndication(DataIndication {
            src_addr: 0x0001,
            rssi: -40,
            security_ok: false,
            msdu: heapless::Vec::from_slice(&payload).unwrap(),
        }))
        .unwrap();
    h.collector.process();
    assert_eq!(h.collector.stats().rx_security_failures, 1);
    assert!(h.platform.borrow().sensor_sources.is_empty());
}

#[test]
fn toggle_request_and_response() {
    let mut h = Harness::started_quiet_config();
    assert_eq!(
        h.collector.send_toggle_request(0x0009),
        Err(Error::DeviceNotFound)
    );

    h.join(0x0001, true);
    h.collector.send_toggle_request(0x0001).unwrap();
    let frame = h.last_frame();
    assert_eq!(frame.payload, [CmdId::ToggleLedReq as u8]);
    // rx-on device: sent direct
    assert!(!frame.indirect);
    // not a config-classified handle
    assert_eq!(frame.handle & 0xC0, 0x80);

    h.indicate(0x0001, &[CmdId::ToggleLedRsp as u8, 1]);
    assert_eq!(h.platform.borrow().toggles, vec![(0x0001, true)]);
}

#[test]
fn association_failure_resets_device_state() {
    let mut h = Harness::started();
    h.join(0x0001, false);
    h.confirm(&h.last_frame(), MacStatus::Success);
    assert_eq!(h.config_state(0x0001), ConfigState::Confirmed);

    h.collector
        .post(Event::CommStatus(CommStatusIndication {
            dst_addr: 0x0001,
            reason: CommStatusReason::AssociateResponse,
            status: MacStatus::TransactionExpired,
        }))
        .unwrap();
    h.collector.process();

    let device = h.collector.device(0x0001).unwrap();
    assert!(!device.alive);
    assert_eq!(device.config, ConfigState::NeedsConfig);
    assert_eq!(device.tracking, TrackingState::Idle);
}

#[test]
fn mac_rejection_of_config_schedules_retry() {
    let mut h = Harness::started();
    h.mac.borrow_mut().reject_next = true;
    h.join(0x0001, false);

    // Nothing went out, but a retry deadline exists
    assert!(h.frames().is_empty());
    assert_eq!(h.config_state(0x0001), ConfigState::NeedsConfig);
    let retry = h.collector.config_deadline().unwrap();

    h.advance_to(retry.as_millis());
    assert_eq!(h.frames().len(), 1);
    assert_eq!(h.config_state(0x0001), ConfigState::Sent);
}

#[test]
fn table_capacity_is_enforced() {
    let mut h = Harness::started_quiet_config();
    for addr in 0..MAX_DEVICES as u16 {
        h.join(addr + 1, false);
    }
    let overflow = h.collector.device_joined(
        &DeviceDescriptor {
            pan_id: PAN_ID,
            short_addr: 0x00FF,
            ext_addr: [0xFF; 8],
        },
        CapabilityInfo {
            rx_on_when_idle: false,
        },
    );
    assert_eq!(overflow, Err(Error::TableFull));

    // A re-join of a known address refreshes in place instead
    h.collector
        .device_joined(
            &DeviceDescriptor {
                pan_id: PAN_ID,
                short_addr: 1,
                ext_addr: [0xAB; 8],
            },
            CapabilityInfo {
                rx_on_when_idle: true,
            },
        )
        .unwrap();
    assert_eq!(h.collector.device_count(), MAX_DEVICES);
    assert_eq!(h.collector.device(1).unwrap().ext_addr, [0xAB; 8]);
}
