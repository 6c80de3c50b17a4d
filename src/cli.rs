//! Command line flags
//!
//! Each flag falls back to an `SB_*` environment variable.

use clap::Parser;

/// Drop hosts that port-scan this machine.
///
/// Watches inbound TCP SYNs on one interface and appends an iptables DROP
/// rule for any source that hits too many distinct ports too quickly.
///
/// Every flag can also come from the environment or the YAML config file;
/// flags win over the environment, which wins over the file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "scanblocker", version, about, long_about = None)]
pub struct Cli {
    /// YAML config file.
    #[arg(short = 'c', long = "conf", env = "SB_CONFIG", value_name = "FILE")]
    pub conf: Option<String>,

    /// Interface to listen on.
    #[arg(short = 'i', long = "interface", env = "SB_DEVICE", value_name = "IFACE")]
    pub interface: Option<String>,

    /// Distinct ports within the scan window that trigger a ban.
    #[arg(short = 'p', long = "max-ports", env = "SB_MAX_PORTS", value_name = "N")]
    pub max_ports: Option<u16>,

    /// Length of the scan window in seconds.
    #[arg(short = 's', long = "scan-seconds", env = "SB_SCAN_SECONDS", value_name = "SECS")]
    pub scan_seconds: Option<u32>,

    /// Address for the Prometheus endpoint.
    #[arg(long = "metrics-addr", env = "SB_METRICS_ADDR", value_name = "ADDR")]
    pub metrics_addr: Option<std::net::SocketAddr>,

    /// Path of the iptables binary.
    #[arg(long = "iptables", env = "SB_IPTABLES", value_name = "PATH")]
    pub iptables: Option<String>,

    /// Seconds a single iptables call may take.
    #[arg(long = "ban-timeout", value_name = "SECS")]
    pub ban_timeout: Option<u64>,

    /// Detect and log, but never call iptables.
    #[arg(long = "dry-run", env = "SB_DRY_RUN")]
    pub dry_run: bool,

    /// Replay a pcap file instead of capturing live.
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    pub read: Option<String>,
}
