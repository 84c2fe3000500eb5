//! Core type definitions for the link flow-control layer.
//!
//! This module defines the fundamental types used throughout the crate.

/// Simulation time unit (picoseconds).
///
/// All timestamps, timer periods and latency measurements use the same
/// `SimTime` representation, so every component on a link shares one timeline.
pub type SimTime = u64;

/// Index of a virtual network (VN) multiplexed over one physical link.
///
/// Each VN has its own queue pair and credit pool.
pub type VnId = usize;

/// Identity of a network endpoint, assigned by the router side during
/// link negotiation.
pub type EndpointId = u64;

/// Number of flits, the fixed-size unit of link-level transfer.
pub type FlitCount = u64;
