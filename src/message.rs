//! Wire-level message definitions for the link.
//!
//! Everything that crosses a link is a [`LinkMessage`]: a data packet, a
//! flow-control credit, or a setup-phase negotiation message. The variants
//! form a closed set and receivers dispatch by matching the tag.

use serde::{Deserialize, Serialize};

use crate::types::{EndpointId, FlitCount, SimTime, VnId};
use crate::units::Bandwidth;

/// How much trace output a packet generates as it moves through the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceLevel {
    /// No tracing.
    #[default]
    None,
    /// Trace every send and receive of this packet.
    Full,
}

/// A unit of application data in flight over the link.
///
/// Packets are created by the owning endpoint's upper layer, queued by the
/// link while awaiting transmission, and owned by the far-side endpoint
/// after delivery. The flit count is derived once, when the packet is
/// admitted for send, and fixed thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Packet {
    /// Payload size in bits.
    pub size_bits: u64,
    /// Size in flits, derived at admission time.
    pub size_flits: FlitCount,
    /// Source endpoint.
    pub src: EndpointId,
    /// Destination endpoint.
    pub dest: EndpointId,
    /// Virtual network assignment, stamped at admission time.
    pub vn: VnId,
    /// Time the packet was injected into the link, for latency tracking.
    pub injection_time: SimTime,
    /// Trace verbosity for this packet.
    pub trace: TraceLevel,
}

impl Packet {
    /// Creates a new packet of `size_bits` from `src` to `dest`.
    ///
    /// The VN, flit count and injection time are filled in by the link when
    /// the packet is admitted.
    pub fn new(size_bits: u64, src: EndpointId, dest: EndpointId) -> Self {
        Self {
            size_bits,
            size_flits: 0,
            src,
            dest,
            vn: 0,
            injection_time: 0,
            trace: TraceLevel::None,
        }
    }

    /// Sets the trace level.
    pub fn with_trace(mut self, trace: TraceLevel) -> Self {
        self.trace = trace;
        self
    }

    /// Returns the number of flits needed to carry `size_bits` with the
    /// given flit size: `⌈size_bits / flit_size_bits⌉`.
    pub fn flits_for(size_bits: u64, flit_size_bits: u64) -> FlitCount {
        (size_bits + flit_size_bits - 1) / flit_size_bits
    }
}

/// A flow-control credit grant: permission to send `credits` more flits
/// on virtual network `vn` without overflowing the receiver's buffer.
///
/// Transient; consumed immediately on receipt by the matching VN's
/// outbound-credit counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditMessage {
    /// Virtual network the credits apply to.
    pub vn: VnId,
    /// Number of flits of buffer space freed.
    pub credits: FlitCount,
}

impl CreditMessage {
    /// Creates a new credit grant.
    pub fn new(vn: VnId, credits: FlitCount) -> Self {
        Self { vn, credits }
    }
}

/// A negotiation message exchanged during the link setup phases.
///
/// Each kind is sent exactly once per link; the `Opaque` variant carries
/// endpoint-level setup data that this layer forwards to its owner
/// unexamined.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SetupMessage {
    /// Advertises this side's link bandwidth.
    ReportBandwidth(Bandwidth),
    /// Requests a number of virtual networks.
    RequestVns(usize),
    /// Reports the authoritative flit size, in bits (router side only).
    ReportFlitSize(u64),
    /// Reports the endpoint identity assigned by the router.
    ReportEndpointId(EndpointId),
    /// Owner-interpreted setup data, forwarded via the side channel.
    Opaque(serde_json::Value),
}

impl SetupMessage {
    /// Returns the message kind as a static name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SetupMessage::ReportBandwidth(_) => "report-bandwidth",
            SetupMessage::RequestVns(_) => "request-vns",
            SetupMessage::ReportFlitSize(_) => "report-flit-size",
            SetupMessage::ReportEndpointId(_) => "report-endpoint-id",
            SetupMessage::Opaque(_) => "opaque",
        }
    }
}

/// The closed set of messages that travel over a link.
///
/// Setup messages appear only during the negotiation phases; credits and
/// data packets interleave throughout steady state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LinkMessage {
    /// A data packet.
    Packet(Packet),
    /// A flow-control credit grant.
    Credit(CreditMessage),
    /// A setup-phase negotiation message.
    Setup(SetupMessage),
}

impl LinkMessage {
    /// Returns the message kind as a static name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkMessage::Packet(_) => "packet",
            LinkMessage::Credit(_) => "credit",
            LinkMessage::Setup(setup) => setup.kind(),
        }
    }
}
