//! Enforcement backends
//!
//! The detector hands banned addresses to a [`Ban`] implementation. The real
//! backend appends an iptables DROP rule from an async worker so a slow
//! firewall call never stalls packet processing.

use std::net::Ipv4Addr;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default location of the iptables binary.
pub const DEFAULT_IPTABLES: &str = "/usr/sbin/iptables";

/// How long a single rule insertion may take before it is abandoned.
pub const DEFAULT_BAN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BanError {
    #[error("Ban worker has shut down, cannot ban {0}")]
    WorkerGone(Ipv4Addr),

    #[error("Cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Capability to block all traffic from a source address.
///
/// Callers guarantee at most one call per address; implementations need not
/// be idempotent.
pub trait Ban {
    fn ban(&mut self, ip: Ipv4Addr) -> Result<(), BanError>;
}

impl<B: Ban + ?Sized> Ban for Box<B> {
    fn ban(&mut self, ip: Ipv4Addr) -> Result<(), BanError> {
        (**self).ban(ip)
    }
}

/// Logs what would have been blocked and touches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBan;

impl Ban for DryRunBan {
    fn ban(&mut self, ip: Ipv4Addr) -> Result<(), BanError> {
        tracing::info!("[ban] dry-run, not blocking ip={}", ip);
        Ok(())
    }
}

/// Queues addresses for the iptables worker spawned by [`IptablesBan::spawn`].
#[derive(Debug, Clone)]
pub struct IptablesBan {
    tx: mpsc::UnboundedSender<Ipv4Addr>,
}

impl IptablesBan {
    /// Start the rule-insertion worker on the current tokio runtime.
    ///
    /// The worker exits once every `IptablesBan` handle is dropped and the
    /// queue is drained; await the returned handle to let pending bans finish.
    pub fn spawn(program: String, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(rx, program, timeout));
        (Self { tx }, handle)
    }
}

impl Ban for IptablesBan {
    fn ban(&mut self, ip: Ipv4Addr) -> Result<(), BanError> {
        self.tx.send(ip).map_err(|_| BanError::WorkerGone(ip))
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Ipv4Addr>, program: String, timeout: Duration) {
    while let Some(ip) = rx.recv().await {
        match append_drop_rule(&program, ip, timeout).await {
            Ok(()) => tracing::info!("[ban] ip={} banned", ip),
            // Not retried: the address stays in the deny set either way.
            Err(e) => tracing::error!("[ban] failed to ban ip={}: {}", ip, e),
        }
    }
    tracing::debug!("[ban] worker stopped");
}

/// Arguments appending a DROP rule for `ip` to the INPUT chain.
///
/// `-A` keeps any rules the operator already has ahead of ours.
pub fn drop_rule_args(ip: Ipv4Addr) -> [String; 6] {
    [
        "-A".to_string(),
        "INPUT".to_string(),
        "-s".to_string(),
        ip.to_string(),
        "-j".to_string(),
        "DROP".to_string(),
    ]
}

/// Run `program` with [`drop_rule_args`], bounded by `timeout`.
pub async fn append_drop_rule(program: &str, ip: Ipv4Addr, timeout: Duration) -> Result<(), BanError> {
    let mut command = Command::new(program);
    command.args(drop_rule_args(ip)).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| BanError::Timeout {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| BanError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(BanError::Exit {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

    #[test]
    fn rule_appends_to_input_chain() {
        assert_eq!(
            drop_rule_args(IP),
            ["-A", "INPUT", "-s", "203.0.113.7", "-j", "DROP"].map(String::from)
        );
    }

    #[test]
    fn dry_run_always_succeeds() {
        let mut backend = DryRunBan;
        assert!(backend.ban(IP).is_ok());
        assert!(backend.ban(IP).is_ok());
    }

    #[test]
    fn boxed_backend_forwards() {
        let mut backend: Box<dyn Ban + Send> = Box::new(DryRunBan);
        assert!(backend.ban(IP).is_ok());
    }

    #[tokio::test]
    async fn successful_command_is_ok() {
        assert!(append_drop_rule("true", IP, DEFAULT_BAN_TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_exit() {
        let err = append_drop_rule("false", IP, DEFAULT_BAN_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, BanError::Exit { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_binary_reports_spawn() {
        let err = append_drop_rule("/nonexistent/iptables", IP, DEFAULT_BAN_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, BanError::Spawn { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn worker_drains_then_stops() {
        let (mut backend, handle) = IptablesBan::spawn("true".to_string(), DEFAULT_BAN_TIMEOUT);
        backend.ban(IP).unwrap();
        drop(backend);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn ban_after_worker_gone_fails() {
        let (mut backend, handle) = IptablesBan::spawn("true".to_string(), DEFAULT_BAN_TIMEOUT);
        handle.abort();
        let _ = handle.await;
        assert!(matches!(backend.ban(IP), Err(BanError::WorkerGone(ip)) if ip == IP));
    }
}
