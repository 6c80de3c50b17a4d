//! Scan decision engine
//!
//! Consumes attempt events one at a time, in capture order. Each source moves
//! through `unseen -> tracking -> banned`; banned is terminal. The engine is
//! the only writer of the per-source table and the deny set, so none of its
//! state is shared or locked.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use super::queue::{BoundedPortQueue, ConnectionAttempt, QueueError};
use super::AttemptEvent;
use crate::enforce::Ban;

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Source is one of our own addresses; nothing recorded.
    Allowed,
    /// First attempt from this source; queue created.
    FirstSeen,
    /// Port already in the source's queue; nothing changed.
    DuplicatePort,
    /// New port recorded, threshold not reached.
    Tracked,
    /// Threshold reached; source added to the deny set and the backend called.
    Banned,
    /// Threshold reached again for a source that is already denied.
    AlreadyBanned,
}

pub struct ScanDetector<B> {
    /// Distinct ports within `scan_seconds` that count as a scan.
    max_ports: usize,
    scan_seconds: i64,
    /// Empty queue cloned for each new source, so capacity is validated once.
    template: BoundedPortQueue,
    sources: HashMap<Ipv4Addr, BoundedPortQueue>,
    allowed: HashSet<Ipv4Addr>,
    denied: HashSet<Ipv4Addr>,
    backend: B,
}

impl<B: Ban> ScanDetector<B> {
    pub fn new(
        max_ports: u16,
        scan_seconds: u32,
        allowed: HashSet<Ipv4Addr>,
        backend: B,
    ) -> Result<Self, QueueError> {
        let template = BoundedPortQueue::new(max_ports as usize)?;
        Ok(Self {
            max_ports: max_ports as usize,
            scan_seconds: i64::from(scan_seconds),
            template,
            sources: HashMap::new(),
            allowed,
            denied: HashSet::new(),
            backend,
        })
    }

    /// Feed one event through the state machine.
    pub fn process(&mut self, event: &AttemptEvent) -> Verdict {
        let ip = event.src;
        if self.allowed.contains(&ip) {
            tracing::debug!("[scan] source ip={} in allow-list, skipping", ip);
            return Verdict::Allowed;
        }

        let attempt = ConnectionAttempt::new(event.timestamp, event.dst_port);
        let Some(queue) = self.sources.get_mut(&ip) else {
            let mut queue = self.template.clone();
            queue.add(attempt);
            self.sources.insert(ip, queue);
            return Verdict::FirstSeen;
        };

        if queue.contains(event.dst_port) {
            return Verdict::DuplicatePort;
        }

        queue.add(attempt);
        let window_start = event.timestamp - self.scan_seconds;
        let scanning = queue.len() == self.max_ports
            && queue.oldest().is_some_and(|c| c.timestamp >= window_start);
        if !scanning {
            return Verdict::Tracked;
        }

        tracing::warn!(
            "[scan] port scan detected: {} -> {} ports={:?}",
            ip,
            event.dst,
            queue.ports()
        );

        // Capture keeps seeing a blocked source's SYNs, so this branch recurs.
        if !self.denied.insert(ip) {
            tracing::info!("[scan] ip={} already in deny list", ip);
            return Verdict::AlreadyBanned;
        }

        if let Err(e) = self.backend.ban(ip) {
            tracing::error!("[ban] ip={} not blocked: {}", ip, e);
        }
        Verdict::Banned
    }

    pub fn is_allowed(&self, ip: &Ipv4Addr) -> bool {
        self.allowed.contains(ip)
    }

    pub fn is_banned(&self, ip: &Ipv4Addr) -> bool {
        self.denied.contains(ip)
    }

    pub fn banned(&self) -> impl Iterator<Item = &Ipv4Addr> {
        self.denied.iter()
    }

    pub fn banned_count(&self) -> usize {
        self.denied.len()
    }

    /// Number of sources with a queue.
    pub fn tracked_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn queue(&self, ip: &Ipv4Addr) -> Option<&BoundedPortQueue> {
        self.sources.get(ip)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
