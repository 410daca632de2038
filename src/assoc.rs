//! Device association records
//!
//! One record per joined end device, held in a fixed-capacity arena scanned
//! in slot order. Record creation happens when the admission layer reports
//! a join; the session core owns every status mutation afterwards. Records
//! are never compacted — a slot keeps its index for the life of the join.
//!
//! The per-device exchange progress lives in two independent state
//! machines, [`ConfigState`] and [`TrackingState`], plus a liveness flag.

use crate::mac::ShortAddr;
use crate::messages::ExtAddr;

/// Configuration exchange progress for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigState {
    /// No configuration exchange underway; the device needs one
    #[default]
    NeedsConfig,
    /// Request handed to the MAC, confirm pending
    Sent,
    /// Confirm succeeded, response pending
    Confirmed,
    /// Configuration response received
    Responded,
}

impl ConfigState {
    /// Whether the exchange has settled (confirmed or answered). Settled
    /// devices are downgraded to [`ConfigState::NeedsConfig`] by the next
    /// sweep: configuration is revalidated every cycle.
    pub fn is_settled(self) -> bool {
        matches!(self, ConfigState::Confirmed | ConfigState::Responded)
    }
}

/// Tracking (liveness probe) progress for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackingState {
    /// No probe activity this cycle
    #[default]
    Idle,
    /// Probe handed to the MAC, confirm or response pending
    Sent,
    /// Second (and last) probe attempt in flight
    SentRetry,
    /// First attempt failed to send; resend on the next fire
    RetryPending,
    /// Device answered the probe
    Responded,
    /// Both attempts failed; reported on the next fire
    Error,
}

impl TrackingState {
    /// A probe is currently in flight for this device
    pub fn probe_in_flight(self) -> bool {
        matches!(self, TrackingState::Sent | TrackingState::SentRetry)
    }

    /// Any probe activity from the current cycle (everything but idle)
    pub fn has_activity(self) -> bool {
        self != TrackingState::Idle
    }
}

/// Device capabilities relevant to the session core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityInfo {
    /// True for always-listening devices; false for sleepy devices that
    /// poll their parent and need indirect transmissions
    pub rx_on_when_idle: bool,
}

/// Identity of a joining device, as reported by the admission layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// PAN the device joined
    pub pan_id: u16,
    /// Assigned short address
    pub short_addr: ShortAddr,
    /// Extended address
    pub ext_addr: ExtAddr,
}

/// Association table entry
#[derive(Debug, Clone, Copy)]
pub struct DeviceRecord {
    /// Short address, unique while the slot is occupied
    pub short_addr: ShortAddr,
    /// Extended address from the join descriptor
    pub ext_addr: ExtAddr,
    /// Device capabilities
    pub capability: CapabilityInfo,
    /// The device has answered something recently
    pub alive: bool,
    /// Configuration exchange state
    pub config: ConfigState,
    /// Tracking exchange state
    pub tracking: TrackingState,
}

impl DeviceRecord {
    /// Record for a freshly enrolled device. New joins count as live so the
    /// sweeps visit them immediately.
    pub fn new(descriptor: &DeviceDescriptor, capability: CapabilityInfo) -> Self {
        DeviceRecord {
            short_addr: descriptor.short_addr,
            ext_addr: descriptor.ext_addr,
            capability,
            alive: true,
            config: ConfigState::NeedsConfig,
            tracking: TrackingState::Idle,
        }
    }

    /// Return the record to ground state after an association failure
    pub fn reset(&mut self) {
        self.alive = false;
        self.config = ConfigState::NeedsConfig;
        self.tracking = TrackingState::Idle;
    }
}

/// Error returned when every slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableFull;

/// Fixed-capacity association table
#[derive(Debug)]
pub struct AssocTable<const N: usize> {
    slots: [Option<DeviceRecord>; N],
}

impl<const N: usize> AssocTable<N> {
    /// An empty table
    pub const fn new() -> Self {
        AssocTable {
            slots: [None; N],
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Occupied slot count
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no device is enrolled
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// Enroll a record into the first free slot, returning its index
    pub fn insert(&mut self, record: DeviceRecord) -> Result<usize, TableFull> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(record);
                return Ok(index);
            }
        }
        Err(TableFull)
    }

    /// Record at a slot index
    pub fn get(&self, index: usize) -> Option<&DeviceRecord> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Mutable record at a slot index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut DeviceRecord> {
        self.slots.get_mut(index).and_then(|slot| slot.as_mut())
    }

    /// Record with the given short address
    pub fn find_by_addr(&self, addr: ShortAddr) -> Option<&DeviceRecord> {
        self.iter().find(|record| record.short_addr == addr)
    }

    /// Mutable record with the given short address
    pub fn find_by_addr_mut(&mut self, addr: ShortAddr) -> Option<&mut DeviceRecord> {
        self.iter_mut().find(|record| record.short_addr == addr)
    }

    /// Index of the first record (slot order) matching the predicate.
    ///
    /// Confirm attribution depends on this scan order: a confirmation is
    /// charged to the first device found in the matching in-flight state,
    /// which is unambiguous only while the scheduler keeps at most one
    /// exchange of each class outstanding.
    pub fn find_index<F>(&self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&DeviceRecord) -> bool,
    {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut predicate))
    }

    /// Whether any record matches the predicate
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&DeviceRecord) -> bool,
    {
        self.find_index(predicate).is_some()
    }

    /// Index of the next live record after `start`, scanning forward with
    /// wrap-around and excluding `start` itself
    pub fn next_live_after(&self, start: usize) -> Option<usize> {
        if N == 0 {
            return None;
        }
        let mut index = start;
        loop {
            index = if index + 1 >= N { 0 } else { index + 1 };
            if index == start {
                return None;
            }
            if let Some(record) = self.get(index) {
                if record.alive {
                    return Some(index);
                }
            }
        }
    }

    /// Occupied records in slot order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Occupied records in slot order, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceRecord> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }
}

impl<const N: usize> Default for AssocTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
