//! # Flitlink
//!
//! Credit-based virtual-network flow control for discrete-event network
//! simulation: the link layer between a simulated endpoint (e.g. a node's
//! network interface) and its router attachment point.
//!
//! ## Design Principles
//!
//! - **Credit-Based Backpressure**: each virtual network (VN) carries its
//!   own queue pair and credit pool; a send that would overrun the peer's
//!   buffer is refused, never dropped.
//! - **Flit Segmentation**: packets are segmented into fixed-size flits
//!   once, at admission; all accounting and timing is in flits.
//! - **Self-Timed Arbitration**: a round-robin output arbiter drains the
//!   VN queues one packet per wake-up, holding the wire for exactly each
//!   packet's transmission time.
//! - **Negotiated Parameters**: bandwidth, flit size, credit allotments and
//!   endpoint identity are agreed in a one-time multi-phase handshake
//!   before any data flows.
//! - **Cooperative Execution**: every operation runs to completion on the
//!   link's single logical thread; waiting is always a scheduled future
//!   wake-up, never a blocking call.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flitlink::{LinkConfig, LinkEndpoint, Packet, SimClock};
//!
//! let clock = SimClock::new();
//! let config = LinkConfig::new("nic0", "10Gb/s", 2, "4KB", "4KB")?;
//! let mut link = LinkEndpoint::configure(&config, clock.clone(), router, timer)?;
//!
//! // Kernel drives the setup phases, then steady state begins.
//! link.setup_phase(0)?;
//! link.setup_phase(1)?;
//!
//! if link.try_send(Packet::new(512, 0, 7), 0) {
//!     // Admitted; the arbiter transmits it on its next wake-up.
//! }
//! ```

pub mod clock;
pub mod config;
pub mod ledger;
pub mod link;
pub mod message;
pub mod negotiate;
pub mod stats;
pub mod types;
pub mod units;

// Re-export commonly used types
pub use clock::{SimClock, TimeSource};
pub use config::{ConfigError, ConfigResult, LinkConfig};
pub use ledger::CreditLedger;
pub use link::{LinkEndpoint, OutputTimer, RouterPort, Subscription, VnCallback};
pub use message::{CreditMessage, LinkMessage, Packet, SetupMessage, TraceLevel};
pub use negotiate::{LinkParams, Negotiator, ProtocolError, SetupReceiver, SetupSender};
pub use stats::{LatencyStats, LinkStats};
pub use types::{EndpointId, FlitCount, SimTime, VnId};
pub use units::{Bandwidth, BufferSize, UnitError};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// flitlink::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
