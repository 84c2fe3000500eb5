//! The link endpoint: send/receive paths and the output arbiter.
//!
//! A [`LinkEndpoint`] sits between a simulated component (its owner) and
//! the component's router attachment point. The owner enqueues packets
//! through [`LinkEndpoint::try_send`], subject to credit admission; a
//! self-timed output arbiter drains the per-VN queues round-robin, one
//! packet per wake-up, holding the wire for exactly the packet's
//! transmission time; [`LinkEndpoint::try_receive`] delivers inbound
//! packets and returns flow-control credit upstream.
//!
//! Every operation runs to completion on the link's single logical thread.
//! The only form of waiting is scheduling a future wake-up through the
//! [`OutputTimer`]; a wake-up always fires, and a stale one is a no-op
//! because the arbiter re-checks its queues instead of assuming work
//! exists.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::clock::TimeSource;
use crate::config::{ConfigResult, LinkConfig};
use crate::ledger::CreditLedger;
use crate::message::{CreditMessage, LinkMessage, Packet, TraceLevel};
use crate::negotiate::{Negotiator, ProtocolError, SetupReceiver, SetupSender};
use crate::stats::LinkStats;
use crate::types::{EndpointId, SimTime, VnId};
use crate::units::Bandwidth;

/// Connection to the router side of the link.
///
/// Steady-state traffic goes through [`RouterPort::send`]; the inherited
/// setup channel carries negotiation messages and initial credit grants.
/// Delivery latency is the business of the channel the kernel puts behind
/// this trait, not of the endpoint.
pub trait RouterPort: SetupSender + SetupReceiver {
    /// Hands a message to the transport toward the router.
    fn send(&mut self, msg: LinkMessage);
}

/// The output arbiter's self-timed wake-up line.
///
/// One cycle is the transmission time of one flit at the effective link
/// bandwidth; the period is set once negotiation has fixed both.
pub trait OutputTimer {
    /// Sets the cycle period, in `SimTime` units.
    fn set_period(&mut self, period: SimTime);

    /// Schedules a wake-up `cycles` cycles from now. Wake-ups cannot be
    /// cancelled.
    fn wake_after(&mut self, cycles: u64);
}

/// What a notification callback wants done with its registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subscription {
    /// Stay registered for further notifications.
    Keep,
    /// Remove this registration; one-shot subscribers return this after
    /// their first notification.
    Cancel,
}

/// A per-VN notification callback registered by the owning endpoint.
pub type VnCallback = Box<dyn FnMut(VnId) -> Subscription>;

/// One endpoint's credit-based attachment to a link.
pub struct LinkEndpoint {
    port_name: String,
    num_vns: usize,

    negotiator: Negotiator,
    flit_size_bits: u64,
    bandwidth: Option<Bandwidth>,
    endpoint_id: Option<EndpointId>,

    out_queues: Vec<VecDeque<Packet>>,
    in_queues: Vec<VecDeque<Packet>>,
    ledger: CreditLedger,

    // Output arbiter state.
    current_output_vn: VnId,
    waiting: bool,
    have_packets: bool,
    block_start: SimTime,

    // Non-credit traffic seen during setup, held for the owner.
    setup_inbox: VecDeque<LinkMessage>,

    receive_callback: Option<VnCallback>,
    send_callback: Option<VnCallback>,

    stats: LinkStats,

    clock: Rc<dyn TimeSource>,
    router: Box<dyn RouterPort>,
    timer: Box<dyn OutputTimer>,
}

impl LinkEndpoint {
    /// Configures an endpoint on a link.
    ///
    /// Queues and credit counters are allocated here, once, sized by the
    /// VN count; the credit allotments stay zero until negotiation reveals
    /// the flit size. Fails on an invalid configuration, which aborts the
    /// run.
    pub fn configure(
        config: &LinkConfig,
        clock: Rc<dyn TimeSource>,
        router: Box<dyn RouterPort>,
        timer: Box<dyn OutputTimer>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let num_vns = config.num_vns;

        Ok(Self {
            port_name: config.port_name.clone(),
            num_vns,
            negotiator: Negotiator::new(
                config.bandwidth,
                num_vns,
                config.in_buf_size,
                config.out_buf_size,
            ),
            flit_size_bits: 0,
            bandwidth: None,
            endpoint_id: None,
            out_queues: (0..num_vns).map(|_| VecDeque::new()).collect(),
            in_queues: (0..num_vns).map(|_| VecDeque::new()).collect(),
            ledger: CreditLedger::new(num_vns),
            current_output_vn: 0,
            waiting: true,
            have_packets: false,
            block_start: 0,
            setup_inbox: VecDeque::new(),
            receive_callback: None,
            send_callback: None,
            stats: LinkStats::new(),
            clock,
            router,
            timer,
        })
    }

    /// Runs one negotiation phase. The kernel calls this with increasing
    /// phase numbers before steady-state traffic begins.
    ///
    /// Phases 0 and 1 perform the handshake; every later phase drains
    /// pending credit grants into the ledger and forwards non-credit
    /// messages to the owner's side channel.
    pub fn setup_phase(&mut self, phase: u32) -> Result<(), ProtocolError> {
        match phase {
            0 => self.negotiator.phase0(&mut *self.router),
            1 => {
                let params = self.negotiator.phase1(&mut *self.router)?;

                self.flit_size_bits = params.flit_size_bits;
                self.bandwidth = Some(params.bandwidth);
                self.endpoint_id = Some(params.endpoint_id);
                self.ledger.set_initial(params.credits_out, params.credits_in);
                self.timer.set_period(params.flit_period);

                // Report the inbound allotment to the peer as its initial
                // credit grant and zero the local counter.
                for vn in 0..self.num_vns {
                    let credits = self.ledger.flush_return(vn);
                    self.router
                        .send_setup(LinkMessage::Credit(CreditMessage::new(vn, credits)));
                }
                Ok(())
            }
            _ => {
                while let Some(msg) = self.router.recv_setup() {
                    match msg {
                        LinkMessage::Credit(ce) => self.apply_credit(ce),
                        other => self.setup_inbox.push_back(other),
                    }
                }
                Ok(())
            }
        }
    }

    /// Called once after the last setup phase. Any side-channel messages
    /// the owner never claimed are dropped.
    pub fn finish_setup(&mut self) {
        if !self.setup_inbox.is_empty() {
            tracing::debug!(
                port = %self.port_name,
                dropped = self.setup_inbox.len(),
                "dropping unclaimed setup messages"
            );
            self.setup_inbox.clear();
        }
    }

    /// Takes the next non-credit message received during setup, for the
    /// owner to interpret itself.
    pub fn forwarded_setup_message(&mut self) -> Option<LinkMessage> {
        self.setup_inbox.pop_front()
    }

    /// Attempts to enqueue `packet` on virtual network `vn`.
    ///
    /// Returns `false`, with no state mutated, when the outbound buffer
    /// lacks credit for the packet; the caller retries later or registers a
    /// send callback. On success the packet's flit count, VN and injection
    /// time are stamped and the arbiter is woken if it was idle with
    /// nothing pending.
    pub fn try_send(&mut self, mut packet: Packet, vn: VnId) -> bool {
        if !self.negotiator.is_established() || vn >= self.num_vns {
            return false;
        }

        let flits = Packet::flits_for(packet.size_bits, self.flit_size_bits);
        if !self.ledger.try_admit(vn, flits) {
            return false;
        }

        packet.size_flits = flits;
        packet.vn = vn;
        packet.injection_time = self.clock.now();

        if packet.trace != TraceLevel::None {
            tracing::trace!(
                port = %self.port_name,
                time = self.clock.now(),
                vn,
                dest = packet.dest,
                "packet enqueued for send"
            );
        }

        self.out_queues[vn].push_back(packet);

        if self.waiting && !self.have_packets {
            self.timer.wake_after(1);
            self.waiting = false;
        }
        true
    }

    /// True if a packet of `bits` bits would currently be admitted on
    /// `vn`. Pure query; lets callers avoid futile [`LinkEndpoint::try_send`]
    /// attempts.
    pub fn has_space_for(&self, vn: VnId, bits: u64) -> bool {
        if vn >= self.num_vns {
            return false;
        }
        self.ledger.local_out_credits(vn) * self.flit_size_bits >= bits
    }

    /// Takes the next inbound packet on `vn`, if any.
    ///
    /// The freed buffer space is reported upstream immediately as a credit
    /// message, and the packet's delivery latency is folded into the
    /// latency aggregate. An empty queue is a normal empty result.
    pub fn try_receive(&mut self, vn: VnId) -> Option<Packet> {
        let packet = self.in_queues.get_mut(vn)?.pop_front()?;

        self.ledger.accumulate_return(vn, packet.size_flits);
        let credits = self.ledger.flush_return(vn);
        self.router
            .send(LinkMessage::Credit(CreditMessage::new(vn, credits)));

        let latency = self.clock.now().saturating_sub(packet.injection_time);
        self.stats.latency.record(latency);
        self.stats.packets_received += 1;

        if packet.trace != TraceLevel::None {
            tracing::trace!(
                port = %self.port_name,
                time = self.clock.now(),
                vn,
                latency,
                "packet delivered to owner"
            );
        }

        Some(packet)
    }

    /// Registers a callback invoked after a packet arrives on a VN's
    /// inbound queue. Replaces any previous registration.
    pub fn register_receive_callback<F>(&mut self, callback: F)
    where
        F: FnMut(VnId) -> Subscription + 'static,
    {
        self.receive_callback = Some(Box::new(callback));
    }

    /// Registers a callback invoked after the arbiter frees an outbound
    /// slot on a VN. Replaces any previous registration.
    pub fn register_send_callback<F>(&mut self, callback: F)
    where
        F: FnMut(VnId) -> Subscription + 'static,
    {
        self.send_callback = Some(Box::new(callback));
    }

    /// Handles a message arriving from the router during steady state.
    ///
    /// Credits replenish the peer-belief ledger and wake a blocked
    /// arbiter; data packets join their VN's inbound queue and fire the
    /// receive callback. A data packet before link establishment is a
    /// protocol violation.
    pub fn handle_link_event(&mut self, msg: LinkMessage) -> Result<(), ProtocolError> {
        match msg {
            LinkMessage::Credit(ce) => {
                self.apply_credit(ce);
                if self.waiting {
                    self.timer.wake_after(1);
                    self.waiting = false;
                    // Blocked with packets pending: the elapsed block is
                    // stall time.
                    if self.have_packets {
                        self.stats.output_port_stalls +=
                            self.clock.now().saturating_sub(self.block_start);
                    }
                }
                Ok(())
            }
            LinkMessage::Packet(packet) => {
                if !self.negotiator.is_established() {
                    return Err(ProtocolError::DataBeforeEstablished);
                }
                let vn = packet.vn;
                if vn >= self.num_vns {
                    tracing::warn!(
                        port = %self.port_name,
                        vn,
                        "dropping packet for a VN this endpoint does not carry"
                    );
                    return Ok(());
                }
                if packet.trace == TraceLevel::Full {
                    tracing::trace!(
                        port = %self.port_name,
                        time = self.clock.now(),
                        vn,
                        src = packet.src,
                        "packet received from router"
                    );
                }
                self.in_queues[vn].push_back(packet);
                Self::notify(&mut self.receive_callback, vn);
                Ok(())
            }
            LinkMessage::Setup(_) => {
                // Late setup traffic goes to the side channel like any
                // other non-credit message seen outside steady state.
                self.setup_inbox.push_back(msg);
                Ok(())
            }
        }
    }

    /// Handles a wake-up from the output timer.
    ///
    /// Scans the VNs round-robin from the rotation pointer for the first
    /// head-of-queue packet the peer has room for. Serving a packet holds
    /// the wire for its transmission time by scheduling the next wake-up
    /// `flits` cycles out; finding nothing sends the arbiter idle until an
    /// enqueue or a credit arrival wakes it.
    pub fn handle_output_wakeup(&mut self) {
        self.have_packets = false;
        let mut selected = None;

        let rotation = (self.current_output_vn..self.num_vns).chain(0..self.current_output_vn);
        for vn in rotation {
            let Some(head) = self.out_queues[vn].front() else {
                continue;
            };
            self.have_packets = true;
            if !self.ledger.peer_covers(vn, head.size_flits) {
                continue;
            }
            selected = Some(vn);
            break;
        }

        let Some(vn) = selected else {
            // Nothing eligible: either every queue is empty or the peer is
            // out of buffer space. Go idle; a new enqueue or a credit
            // arrival re-triggers. A stale wake-up while already idle must
            // not restart the block clock.
            if !self.waiting {
                self.block_start = self.clock.now();
                self.waiting = true;
            }
            return;
        };

        if let Some(mut packet) = self.out_queues[vn].pop_front() {
            let flits = packet.size_flits;

            // The packet leaves the local output buffer; that space is
            // usable again by the admission path.
            self.ledger.release_local(vn, flits);
            // Busy for exactly this packet's transmission time.
            self.timer.wake_after(flits);

            self.current_output_vn = (vn + 1) % self.num_vns;

            packet.vn = vn;
            packet.injection_time = self.clock.now();
            // Speculative: corrected later by returning credit messages.
            self.ledger.consume_peer(vn, flits);

            self.stats.send_bit_count += packet.size_bits;
            self.stats.packets_sent += 1;

            if packet.trace == TraceLevel::Full {
                tracing::trace!(
                    port = %self.port_name,
                    time = self.clock.now(),
                    vn,
                    dest = packet.dest,
                    "packet injected into router"
                );
            }

            self.router.send(LinkMessage::Packet(packet));
            Self::notify(&mut self.send_callback, vn);
        }
    }

    fn apply_credit(&mut self, ce: CreditMessage) {
        if ce.vn < self.num_vns {
            self.ledger.grant_peer(ce.vn, ce.credits);
        } else {
            // Ignore credits for VNs this endpoint does not carry.
            tracing::trace!(port = %self.port_name, vn = ce.vn, "ignoring credit for unknown VN");
        }
    }

    fn notify(slot: &mut Option<VnCallback>, vn: VnId) {
        if let Some(callback) = slot.as_mut() {
            if callback(vn) == Subscription::Cancel {
                *slot = None;
            }
        }
    }

    /// Returns the number of virtual networks on this link.
    pub fn num_vns(&self) -> usize {
        self.num_vns
    }

    /// Returns the negotiated flit size in bits (0 before establishment).
    pub fn flit_size_bits(&self) -> u64 {
        self.flit_size_bits
    }

    /// Returns the effective link bandwidth agreed during negotiation.
    pub fn effective_bandwidth(&self) -> Option<Bandwidth> {
        self.bandwidth
    }

    /// Returns the endpoint identity assigned by the router.
    pub fn endpoint_id(&self) -> Option<EndpointId> {
        self.endpoint_id
    }

    /// True once negotiation has completed.
    pub fn is_established(&self) -> bool {
        self.negotiator.is_established()
    }

    /// Returns the number of packets queued for output on `vn`, or 0 for
    /// a VN this endpoint does not carry.
    pub fn pending_output(&self, vn: VnId) -> usize {
        self.out_queues.get(vn).map_or(0, VecDeque::len)
    }

    /// Returns the number of packets awaiting delivery on `vn`, or 0 for
    /// a VN this endpoint does not carry.
    pub fn pending_input(&self, vn: VnId) -> usize {
        self.in_queues.get(vn).map_or(0, VecDeque::len)
    }

    /// Returns the credit ledger.
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Returns the statistics collected so far.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Exports endpoint state and statistics as a JSON value.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "port_name": self.port_name,
            "endpoint_id": self.endpoint_id,
            "num_vns": self.num_vns,
            "flit_size_bits": self.flit_size_bits,
            "stats": self.stats.export(),
        })
    }
}
