//! MAC collaborator interface
//!
//! The collector drives the medium-access layer through a narrow contract:
//! a synchronous, fire-and-forget [`Mac::data_request`] that either accepts
//! or rejects a frame immediately, plus asynchronous confirmations and
//! indications that the embedding layer feeds back through the event queue
//! ([`crate::Event`]). Frame transmission, addressing, security and channel
//! access all live behind this seam.

use heapless::Vec;

/// 16-bit network short address
pub type ShortAddr = u16;

/// Short address marking an unassigned/unknown device
pub const INVALID_SHORT_ADDR: ShortAddr = 0xFFFF;

/// Largest MSDU payload carried through the event queue
pub const MAX_MSDU_LEN: usize = 128;

/// Owned MSDU payload buffer
pub type Msdu = Vec<u8, MAX_MSDU_LEN>;

/// Outcome of a transmission, reported in the data confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacStatus {
    /// Frame acknowledged by the destination
    Success,
    /// Channel was busy on every attempt
    ChannelAccessFailure,
    /// No acknowledgment received
    NoAck,
    /// Indirect transaction expired before the device polled
    TransactionExpired,
    /// Transaction queue overflowed
    TransactionOverflow,
    /// Any other stack-reported failure
    OtherError,
}

impl MacStatus {
    /// Whether this status reports a delivered frame
    pub fn is_success(self) -> bool {
        self == MacStatus::Success
    }
}

/// Outgoing data request handed to the MAC
#[derive(Debug)]
pub struct DataRequest<'a> {
    /// Destination short address
    pub dst_addr: ShortAddr,
    /// Destination PAN
    pub dst_pan_id: u16,
    /// Classified handle returned in the later confirm
    pub msdu_handle: u8,
    /// Request an acknowledgment from the destination
    pub ack_request: bool,
    /// Queue indirectly for a sleepy destination to poll
    pub indirect: bool,
    /// Application payload
    pub msdu: &'a [u8],
}

/// Medium-access layer as consumed by the collector.
///
/// `data_request` must not block: the return value only reports whether the
/// MAC accepted the frame for transmission. Delivery is reported later as a
/// [`DataConfirm`] carrying the request's handle.
pub trait Mac {
    /// MAC rejection error
    type Error;

    /// Hand a frame to the MAC; immediate accept/reject
    fn data_request(&mut self, request: &DataRequest<'_>) -> Result<(), Self::Error>;
}

/// Asynchronous confirmation for an accepted data request
#[derive(Debug, Clone, Copy)]
pub struct DataConfirm {
    /// Handle of the confirmed request
    pub msdu_handle: u8,
    /// Delivery outcome
    pub status: MacStatus,
    /// Outgoing security frame counter after this frame
    pub frame_counter: u32,
}

/// Inbound application frame
#[derive(Debug, Clone)]
pub struct DataIndication {
    /// Source short address
    pub src_addr: ShortAddr,
    /// Received signal strength
    pub rssi: i8,
    /// Collaborator's security verdict; failed frames are dropped
    /// before decoding
    pub security_ok: bool,
    /// Frame payload, command id first
    pub msdu: Msdu,
}

/// A sleepy device polled its parent for pending data
#[derive(Debug, Clone, Copy)]
pub struct PollIndication {
    /// Source short address
    pub src_addr: ShortAddr,
}

/// What a comm status indication refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommStatusReason {
    /// Delivery of an association response
    AssociateResponse,
    /// Delivery of an orphan response
    OrphanResponse,
    /// Inbound frame failed a security check
    SecurityFailure,
}

/// MAC-reported delivery status for management frames
#[derive(Debug, Clone, Copy)]
pub struct CommStatusIndication {
    /// Address the management frame was for
    pub dst_addr: ShortAddr,
    /// What the status refers to
    pub reason: CommStatusReason,
    /// Delivery outcome
    pub status: MacStatus,
}
