//! Port-scan detection: per-source leaky queues and the ban decision engine.

pub mod engine;
pub mod queue;

pub use engine::{ScanDetector, Verdict};
pub use queue::{BoundedPortQueue, ConnectionAttempt, QueueError};

use std::net::Ipv4Addr;

/// An inbound connection attempt (SYN without ACK) addressed to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptEvent {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Unix epoch seconds at capture.
    pub timestamp: i64,
}
