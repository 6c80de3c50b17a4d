//! scanblocker - port-scan blocking daemon
//!
//! Watches inbound TCP connection attempts and drops sources that touch too
//! many distinct ports within a short window.

// ============================================
// Detection core
// ============================================

/// Leaky port queues and the ban decision engine
pub mod detect;
/// Ban backends (iptables, dry-run)
pub mod enforce;

// ============================================
// Daemon plumbing
// ============================================

/// Command line flags
pub mod cli;
/// Configuration (YAML file + overrides)
pub mod config;
/// Startup and the capture loop
pub mod daemon;
/// Attempt counter and Prometheus endpoint
pub mod metrics;
/// Packet capture and local addresses
pub mod network;
