//! Daemon configuration
//!
//! Settings come from, highest precedence first: command line flags, `SB_*`
//! environment variables (both handled by [`Cli`]), an optional YAML file,
//! and the built-in defaults below.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::enforce::DEFAULT_IPTABLES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Network device to listen on (eth0, en0, ens4, ...).
    #[serde(default = "default_device")]
    pub device: String,

    /// Distinct ports within `scan_seconds` that count as a scan.
    #[serde(default = "default_max_ports")]
    pub max_ports: u16,

    /// Detection window in seconds.
    #[serde(default = "default_scan_seconds")]
    pub scan_seconds: u32,

    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,

    #[serde(default = "default_iptables_path")]
    pub iptables_path: String,

    #[serde(default = "default_ban_timeout_secs")]
    pub ban_timeout_secs: u64,

    /// Log bans without touching the firewall.
    #[serde(default)]
    pub dry_run: bool,

    /// Replay this pcap file instead of capturing live.
    #[serde(default)]
    pub read_file: Option<String>,

    /// Extra sources never tracked, on top of the host's own addresses.
    #[serde(default)]
    pub allow: Vec<Ipv4Addr>,
}

fn default_device() -> String {
    "eth0".to_string()
}

fn default_max_ports() -> u16 {
    3
}

fn default_scan_seconds() -> u32 {
    60
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_iptables_path() -> String {
    DEFAULT_IPTABLES.to_string()
}

fn default_ban_timeout_secs() -> u64 {
    5
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_ports: default_max_ports(),
            scan_seconds: default_scan_seconds(),
            metrics_addr: default_metrics_addr(),
            iptables_path: default_iptables_path(),
            ban_timeout_secs: default_ban_timeout_secs(),
            dry_run: false,
            read_file: None,
            allow: Vec::new(),
        }
    }
}

impl ScanConfig {
    /// Build the effective configuration for `cli`: file (if any), then overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match cli.conf.as_deref() {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ScanConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ScanConfig = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite every field the command line (or environment) set.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(device) = &cli.interface {
            self.device = device.clone();
        }
        if let Some(max_ports) = cli.max_ports {
            self.max_ports = max_ports;
        }
        if let Some(scan_seconds) = cli.scan_seconds {
            self.scan_seconds = scan_seconds;
        }
        if let Some(addr) = cli.metrics_addr {
            self.metrics_addr = addr;
        }
        if let Some(path) = &cli.iptables {
            self.iptables_path = path.clone();
        }
        if let Some(secs) = cli.ban_timeout {
            self.ban_timeout_secs = secs;
        }
        if cli.dry_run {
            self.dry_run = true;
        }
        if let Some(file) = &cli.read {
            self.read_file = Some(file.clone());
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.device.is_empty(), "device cannot be empty");
        anyhow::ensure!(self.max_ports >= 1, "max_ports must be at least 1");
        anyhow::ensure!(self.scan_seconds >= 1, "scan_seconds must be at least 1");
        anyhow::ensure!(self.ban_timeout_secs >= 1, "ban_timeout_secs must be at least 1");
        anyhow::ensure!(!self.iptables_path.is_empty(), "iptables_path cannot be empty");
        Ok(())
    }

    pub fn ban_timeout(&self) -> Duration {
        Duration::from_secs(self.ban_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.device, "eth0");
        assert_eq!(config.max_ports, 3);
        assert_eq!(config.scan_seconds, 60);
        assert_eq!(config.metrics_addr.port(), 8080);
        assert_eq!(config.iptables_path, "/usr/sbin/iptables");
        assert_eq!(config.ban_timeout(), Duration::from_secs(5));
        assert!(!config.dry_run);
        assert!(config.read_file.is_none());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ScanConfig::from_str("{}").unwrap(), ScanConfig::default());
    }

    #[test]
    fn test_yaml_values() {
        let config = ScanConfig::from_str(
            r#"
device: "ens4"
max_ports: 5
scan_seconds: 30
metrics_addr: "127.0.0.1:9100"
dry_run: true
allow:
  - "192.0.2.10"
"#,
        )
        .unwrap();
        assert_eq!(config.device, "ens4");
        assert_eq!(config.max_ports, 5);
        assert_eq!(config.scan_seconds, 30);
        assert_eq!(config.metrics_addr, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert!(config.dry_run);
        assert_eq!(config.allow, vec![Ipv4Addr::new(192, 0, 2, 10)]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ScanConfig::from_str("max_ports: 0").is_err());
        assert!(ScanConfig::from_str("scan_seconds: 0").is_err());
        assert!(ScanConfig::from_str("device: \"\"").is_err());
        assert!(ScanConfig::from_str("max_ports: 70000").is_err());
        assert!(ScanConfig::from_str("allow: [\"not-an-ip\"]").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = ScanConfig::from_str("device: \"ens4\"\nmax_ports: 5").unwrap();
        let cli = Cli::try_parse_from(["scanblocker", "-i", "wlan0", "--scan-seconds", "10"]).unwrap();
        config.apply_cli(&cli);
        assert_eq!(config.device, "wlan0");
        assert_eq!(config.max_ports, 5);
        assert_eq!(config.scan_seconds, 10);
    }

    #[test]
    fn test_load_without_file() {
        let cli = Cli::try_parse_from(["scanblocker", "-p", "4", "--dry-run", "-r", "scan.pcap"]).unwrap();
        let config = ScanConfig::load(&cli).unwrap();
        assert_eq!(config.max_ports, 4);
        assert!(config.dry_run);
        assert_eq!(config.read_file.as_deref(), Some("scan.pcap"));
    }

    #[test]
    fn test_load_rejects_zero_override() {
        let cli = Cli::try_parse_from(["scanblocker", "--max-ports", "0"]).unwrap();
        assert!(ScanConfig::load(&cli).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = ScanConfig::from_file("/nonexistent/scanblocker.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
