//! Daemon lifecycle
//!
//! Startup resolves addresses, opens capture and the metrics endpoint, then
//! hands the packet source and detector to one blocking thread. That thread
//! owns all detection state until the source runs dry; nothing shuts it down
//! otherwise.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tokio::task::JoinHandle;

use crate::config::ScanConfig;
use crate::detect::{AttemptEvent, ScanDetector, Verdict};
use crate::enforce::{Ban, DryRunBan, IptablesBan};
use crate::metrics;
use crate::network::capture::{AttemptSource, CaptureError, PacketSource};
use crate::network::local;

/// Totals reported when the packet source is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempts: u64,
    pub tracked_sources: usize,
    pub banned: usize,
}

/// Run the daemon with `config` until the packet source is exhausted.
pub async fn run(config: ScanConfig) -> Result<()> {
    warn_if_unprivileged();

    let handle = metrics::install()?;
    let listener = metrics::bind(config.metrics_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(listener, handle).await {
            tracing::error!("[metrics] {:#}", e);
        }
    });

    let locals = local::local_ipv4_addrs().context("Error getting interfaces")?;
    let source = open_source(&config, &locals)?;
    let allowed = allow_list(locals, &config);

    let mut worker = None;
    let backend: Box<dyn Ban + Send> = if config.dry_run {
        Box::new(DryRunBan)
    } else {
        let (backend, handle) = IptablesBan::spawn(config.iptables_path.clone(), config.ban_timeout());
        worker = Some(handle);
        Box::new(backend)
    };

    let detector = ScanDetector::new(config.max_ports, config.scan_seconds, allowed, backend)
        .with_context(|| format!("Error when creating queue with max ports {}", config.max_ports))?;

    tracing::info!(
        "[scan] [started] max_ports={} scan_seconds={}",
        config.max_ports,
        config.scan_seconds
    );

    let summary = tokio::task::spawn_blocking(move || {
        let mut source = source;
        let mut detector = detector;
        process_events(&mut source, &mut detector)
    })
    .await
    .context("Capture thread panicked")??;

    // Let queued bans finish; the detector (and its sender) is gone by now.
    if let Some(worker) = worker {
        drain_ban_worker(worker).await;
    }

    tracing::info!(
        "[scan] capture finished: attempts={} tracked={} banned={}",
        summary.attempts,
        summary.tracked_sources,
        summary.banned
    );
    Ok(())
}

/// Own addresses plus any configured extras.
fn allow_list(locals: HashSet<Ipv4Addr>, config: &ScanConfig) -> HashSet<Ipv4Addr> {
    let mut allowed = locals;
    allowed.extend(config.allow.iter().copied());
    let mut listed: Vec<_> = allowed.iter().collect();
    listed.sort();
    tracing::info!("[scan] allow-list: {:?}", listed);
    allowed
}

fn open_source(config: &ScanConfig, locals: &HashSet<Ipv4Addr>) -> Result<PacketSource> {
    if let Some(path) = &config.read_file {
        return PacketSource::open_file(path, locals).map_err(Into::into);
    }
    let ip = local::interface_ipv4(&config.device)
        .with_context(|| format!("Can't get IP address of device {}", config.device))?;
    Ok(PacketSource::open_live(&config.device, ip)?)
}

/// Wait for queued bans to finish. Returns `false` if the worker died.
async fn drain_ban_worker(worker: JoinHandle<()>) -> bool {
    match worker.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("[ban] worker did not finish cleanly: {}", e);
            false
        }
    }
}

/// Pull every event from `source` through `detector`, counting each one.
///
/// Events whose destination is not one of the detector's own addresses are
/// dropped before they are counted.
pub fn process_events<S, B>(source: &mut S, detector: &mut ScanDetector<B>) -> Result<RunSummary, CaptureError>
where
    S: AttemptSource + ?Sized,
    B: Ban,
{
    let mut attempts = 0;
    while let Some(event) = source.next_attempt()? {
        if !detector.is_allowed(&event.dst) {
            tracing::debug!("[scan] ignoring attempt to foreign address {}", event.dst);
            continue;
        }
        attempts += 1;
        metrics::record_attempt();
        log_attempt(&event);
        if detector.process(&event) == Verdict::Banned {
            tracing::info!("[scan] ip={} added to deny list", event.src);
        }
    }
    Ok(RunSummary {
        attempts,
        tracked_sources: detector.tracked_sources(),
        banned: detector.banned_count(),
    })
}

fn log_attempt(event: &AttemptEvent) {
    let when = DateTime::<Utc>::from_timestamp(event.timestamp, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| event.timestamp.to_string());
    tracing::info!(
        "{}: New connection: {}:{} -> {}:{}",
        when,
        event.src,
        event.src_port,
        event.dst,
        event.dst_port
    );
}

fn warn_if_unprivileged() {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        tracing::warn!(
            "[scan] running as uid {}; capture and iptables usually need root",
            euid
        );
    }
}
