//! Link parameter negotiation.
//!
//! Before any data flows, both sides of a link agree on its parameters over
//! a fixed sequence of setup phases:
//!
//! - **Phase 0**: each side advertises its bandwidth and requested VN count.
//! - **Phase 1**: each side takes the minimum of the two bandwidths as the
//!   effective link speed, receives the authoritative flit size and its
//!   assigned endpoint identity from the router side, and derives the
//!   per-VN credit allotments and the output arbiter's wake-up period.
//! - **Later phases**: pending credit grants drain into the ledger and any
//!   other traffic is forwarded to the owning component's side channel
//!   (handled by the endpoint, not here).
//!
//! A message arriving out of sequence is a protocol violation and fails the
//! link establishment; there is no recovery path.

use thiserror::Error;

use crate::message::{LinkMessage, SetupMessage};
use crate::types::{EndpointId, FlitCount, SimTime};
use crate::units::{Bandwidth, BufferSize};

/// Protocol-sequencing violations during link establishment.
///
/// These are fatal to the link: setup runs exactly once and an unexpected
/// message means the two sides disagree about the protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("setup phase {phase}: expected {expected}, link was silent")]
    MissingMessage { phase: u32, expected: &'static str },

    #[error("setup phase {phase}: expected {expected}, received {got}")]
    UnexpectedMessage {
        phase: u32,
        expected: &'static str,
        got: &'static str,
    },

    #[error("setup phase {phase} invoked out of order (state: {state})")]
    PhaseOrder { phase: u32, state: &'static str },

    #[error("setup phase {phase}: peer reported a degenerate {what}")]
    DegenerateParameter { phase: u32, what: &'static str },

    #[error("data packet received before link establishment completed")]
    DataBeforeEstablished,
}

/// The agreed link parameters produced by a successful phase 1.
#[derive(Clone, Copy, Debug)]
pub struct LinkParams {
    /// Effective bandwidth: the minimum of both advertisements.
    pub bandwidth: Bandwidth,
    /// Authoritative flit size, dictated by the router side.
    pub flit_size_bits: u64,
    /// Endpoint identity assigned by the router.
    pub endpoint_id: EndpointId,
    /// Inbound credit allotment per VN, in flits.
    pub credits_in: FlitCount,
    /// Outbound credit allotment per VN, in flits.
    pub credits_out: FlitCount,
    /// Transmission time of one flit at the effective bandwidth; the
    /// period of the output arbiter's wake-up clock.
    pub flit_period: SimTime,
}

/// Progress of the negotiation state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SetupState {
    /// Nothing sent yet.
    Idle,
    /// Phase 0 complete: advertisement sent, awaiting the peer's.
    Advertised,
    /// Phase 1 complete: parameters agreed.
    Established,
}

impl SetupState {
    fn name(&self) -> &'static str {
        match self {
            SetupState::Idle => "idle",
            SetupState::Advertised => "advertised",
            SetupState::Established => "established",
        }
    }
}

/// Sink for outgoing setup-phase messages.
///
/// Implemented by the endpoint's router port; split out so the negotiator
/// can be exercised without a full endpoint. Credit grants travel over the
/// same channel as negotiation messages during setup, so the payload is a
/// full [`LinkMessage`].
pub trait SetupSender {
    /// Queues a message for the peer's setup channel.
    fn send_setup(&mut self, msg: LinkMessage);
}

/// Source of incoming setup-phase messages.
pub trait SetupReceiver {
    /// Takes the next pending message from the peer, if any.
    fn recv_setup(&mut self) -> Option<LinkMessage>;
}

/// Runs the one-time handshake that establishes link parameters.
#[derive(Debug)]
pub struct Negotiator {
    advertised: Bandwidth,
    num_vns: usize,
    in_buf: BufferSize,
    out_buf: BufferSize,
    state: SetupState,
}

impl Negotiator {
    /// Creates a negotiator for one endpoint's side of the handshake.
    pub fn new(advertised: Bandwidth, num_vns: usize, in_buf: BufferSize, out_buf: BufferSize) -> Self {
        Self {
            advertised,
            num_vns,
            in_buf,
            out_buf,
            state: SetupState::Idle,
        }
    }

    /// True once phase 1 has completed successfully.
    pub fn is_established(&self) -> bool {
        self.state == SetupState::Established
    }

    /// Phase 0: advertise bandwidth and requested VN count.
    pub fn phase0<S>(&mut self, sender: &mut S) -> Result<(), ProtocolError>
    where
        S: SetupSender + ?Sized,
    {
        if self.state != SetupState::Idle {
            return Err(ProtocolError::PhaseOrder {
                phase: 0,
                state: self.state.name(),
            });
        }
        sender.send_setup(LinkMessage::Setup(SetupMessage::ReportBandwidth(
            self.advertised,
        )));
        sender.send_setup(LinkMessage::Setup(SetupMessage::RequestVns(self.num_vns)));
        self.state = SetupState::Advertised;
        Ok(())
    }

    /// Phase 1: receive the peer's advertisement and the router's
    /// authoritative parameters, and derive the agreed link parameters.
    pub fn phase1<R>(&mut self, receiver: &mut R) -> Result<LinkParams, ProtocolError>
    where
        R: SetupReceiver + ?Sized,
    {
        if self.state != SetupState::Advertised {
            return Err(ProtocolError::PhaseOrder {
                phase: 1,
                state: self.state.name(),
            });
        }

        // Effective speed is the minimum of the two advertisements.
        let peer_bw = match Self::expect(receiver, 1, "report-bandwidth")? {
            SetupMessage::ReportBandwidth(bw) => bw,
            other => return Err(Self::unexpected(1, "report-bandwidth", &other)),
        };
        let bandwidth = self.advertised.min(peer_bw);
        if bandwidth.bits_per_sec() <= 0.0 {
            return Err(ProtocolError::DegenerateParameter {
                phase: 1,
                what: "bandwidth",
            });
        }

        // The router side dictates the flit size. Every credit allotment
        // and flit count divides by it, so zero is a violation.
        let flit_size_bits = match Self::expect(receiver, 1, "report-flit-size")? {
            SetupMessage::ReportFlitSize(bits) => bits,
            other => return Err(Self::unexpected(1, "report-flit-size", &other)),
        };
        if flit_size_bits == 0 {
            return Err(ProtocolError::DegenerateParameter {
                phase: 1,
                what: "flit size",
            });
        }

        let endpoint_id = match Self::expect(receiver, 1, "report-endpoint-id")? {
            SetupMessage::ReportEndpointId(id) => id,
            other => return Err(Self::unexpected(1, "report-endpoint-id", &other)),
        };

        let credits_in = Self::credits_per_vn(self.in_buf, flit_size_bits);
        let credits_out = Self::credits_per_vn(self.out_buf, flit_size_bits);
        let flit_period = bandwidth.transmission_time(flit_size_bits);

        self.state = SetupState::Established;

        tracing::debug!(
            bandwidth = %bandwidth,
            flit_size_bits,
            endpoint_id,
            credits_in,
            credits_out,
            flit_period,
            "link parameters agreed"
        );

        Ok(LinkParams {
            bandwidth,
            flit_size_bits,
            endpoint_id,
            credits_in,
            credits_out,
            flit_period,
        })
    }

    /// Credits per VN: buffer size over flit size, rounded to nearest.
    fn credits_per_vn(buf: BufferSize, flit_size_bits: u64) -> FlitCount {
        (buf.bits() as f64 / flit_size_bits as f64).round() as FlitCount
    }

    fn expect<R>(
        receiver: &mut R,
        phase: u32,
        expected: &'static str,
    ) -> Result<SetupMessage, ProtocolError>
    where
        R: SetupReceiver + ?Sized,
    {
        match receiver.recv_setup() {
            Some(LinkMessage::Setup(msg)) => Ok(msg),
            Some(other) => Err(ProtocolError::UnexpectedMessage {
                phase,
                expected,
                got: other.kind(),
            }),
            None => Err(ProtocolError::MissingMessage { phase, expected }),
        }
    }

    fn unexpected(phase: u32, expected: &'static str, got: &SetupMessage) -> ProtocolError {
        ProtocolError::UnexpectedMessage {
            phase,
            expected,
            got: got.kind(),
        }
    }
}
