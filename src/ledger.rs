//! Per-virtual-network credit accounting.
//!
//! The ledger tracks three counter arrays, one entry per VN, allocated once
//! at configure time and never reallocated:
//!
//! - **local output credits**: space left in this endpoint's own outbound
//!   buffer, checked (and decremented) atomically when a packet is admitted
//!   for send, and returned when the arbiter dequeues the packet.
//! - **peer credits**: this endpoint's belief of free space in the peer's
//!   inbound buffer. Starts at zero; the peer reports its allotment during
//!   negotiation, transmissions decrement it speculatively and credit
//!   messages replenish it.
//! - **return credits**: inbound buffer space freed locally but not yet
//!   reported upstream. Flushed immediately on dequeue in steady state to
//!   bound the peer's credit-starvation latency, and in batch during setup.
//!
//! Counters are unsigned: an operation that would drive one negative is
//! rejected before any mutation.

use crate::types::{FlitCount, VnId};

/// Credit counters for every VN on one link endpoint.
#[derive(Clone, Debug)]
pub struct CreditLedger {
    local_out: Vec<FlitCount>,
    peer: Vec<FlitCount>,
    inbound_return: Vec<FlitCount>,
}

impl CreditLedger {
    /// Creates a ledger with all counters at zero.
    ///
    /// The real allotments are not known until negotiation reveals the flit
    /// size; [`CreditLedger::set_initial`] fills them in.
    pub fn new(num_vns: usize) -> Self {
        Self {
            local_out: vec![0; num_vns],
            peer: vec![0; num_vns],
            inbound_return: vec![0; num_vns],
        }
    }

    /// Returns the number of VNs tracked.
    pub fn num_vns(&self) -> usize {
        self.local_out.len()
    }

    /// Sets the initial per-VN allotments once the flit size is known.
    ///
    /// `local_out` is the outbound buffer allotment; `inbound_return` is the
    /// inbound allotment, staged here so it can be reported to the peer as
    /// its initial credit grant.
    pub fn set_initial(&mut self, local_out: FlitCount, inbound_return: FlitCount) {
        for vn in 0..self.num_vns() {
            self.local_out[vn] = local_out;
            self.inbound_return[vn] = inbound_return;
        }
    }

    /// Admits a packet of `flits` flits on `vn` if the local outbound
    /// buffer has room, decrementing the counter.
    ///
    /// Returns `false` without mutating anything when space is
    /// insufficient; this is backpressure, not an error.
    pub fn try_admit(&mut self, vn: VnId, flits: FlitCount) -> bool {
        if self.local_out[vn] < flits {
            return false;
        }
        self.local_out[vn] -= flits;
        true
    }

    /// Returns `flits` of local outbound buffer space, when the arbiter
    /// dequeues a packet.
    pub fn release_local(&mut self, vn: VnId, flits: FlitCount) {
        self.local_out[vn] += flits;
    }

    /// Returns the local outbound credit count for `vn`.
    pub fn local_out_credits(&self, vn: VnId) -> FlitCount {
        self.local_out[vn]
    }

    /// True if the believed peer buffer space on `vn` covers `flits`.
    pub fn peer_covers(&self, vn: VnId, flits: FlitCount) -> bool {
        self.peer[vn] >= flits
    }

    /// Consumes `flits` of believed peer buffer space.
    ///
    /// Callers must check [`CreditLedger::peer_covers`] first; the
    /// decrement and the check together form the atomic admission step.
    pub fn consume_peer(&mut self, vn: VnId, flits: FlitCount) {
        debug_assert!(self.peer[vn] >= flits);
        self.peer[vn] -= flits;
    }

    /// Applies a credit grant received from the peer.
    pub fn grant_peer(&mut self, vn: VnId, credits: FlitCount) {
        self.peer[vn] += credits;
    }

    /// Returns the believed peer credit count for `vn`.
    pub fn peer_credits(&self, vn: VnId) -> FlitCount {
        self.peer[vn]
    }

    /// Accumulates `flits` of freed inbound buffer space awaiting report.
    pub fn accumulate_return(&mut self, vn: VnId, flits: FlitCount) {
        self.inbound_return[vn] += flits;
    }

    /// Takes the pending return credits for `vn`, zeroing the counter.
    ///
    /// The caller sends the returned count upstream as a credit message.
    pub fn flush_return(&mut self, vn: VnId) -> FlitCount {
        std::mem::take(&mut self.inbound_return[vn])
    }

    /// Returns the unreported inbound-return credit count for `vn`.
    pub fn return_credits(&self, vn: VnId) -> FlitCount {
        self.inbound_return[vn]
    }
}
