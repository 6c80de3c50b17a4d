//! Packet source
//!
//! Opens libpcap on a device (or a saved capture file) and turns inbound SYN
//! packets into [`AttemptEvent`]s. Both live capture and file replay install a
//! BPF filter so libpcap only hands us connection attempts addressed to this
//! host; the decoder checks the flags again.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Active, Activated, Capture, Linktype, Offline};

use crate::detect::AttemptEvent;

/// Bytes kept per packet: ethernet + vlan tag + largest IPv4 header + largest
/// TCP header. SYNs rarely carry payload, so this is the whole packet.
pub const SNAPLEN: i32 = 14 + 4 + 60 + 60;

/// SYN set, ACK clear: connection initiations, not the SYN-ACK replies.
pub const SYN_FILTER: &str = "tcp[tcpflags] & tcp-syn != 0 and tcp[tcpflags] & tcp-ack == 0";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("pcap cannot open device {device}: {source}")]
    OpenDevice {
        device: String,
        #[source]
        source: pcap::Error,
    },

    #[error("pcap cannot open file {path}: {source}")]
    OpenFile {
        path: String,
        #[source]
        source: pcap::Error,
    },

    #[error("pcap cannot set filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("pcap read failed: {0}")]
    Read(#[from] pcap::Error),
}

/// Anything that yields attempt events in arrival order.
///
/// `Ok(None)` means the source is exhausted.
pub trait AttemptSource {
    fn next_attempt(&mut self) -> Result<Option<AttemptEvent>, CaptureError>;
}

/// BPF expression selecting connection attempts to `local`.
pub fn bpf_filter(local: Ipv4Addr) -> String {
    format!("dst host {} and {}", local, SYN_FILTER)
}

/// BPF expression selecting connection attempts to any of `locals`.
///
/// An empty set yields an expression libpcap rejects.
pub fn replay_filter(locals: &HashSet<Ipv4Addr>) -> String {
    let mut hosts: Vec<_> = locals.iter().collect();
    hosts.sort();
    let hosts: Vec<_> = hosts.iter().map(|ip| format!("dst host {}", ip)).collect();
    format!("({}) and {}", hosts.join(" or "), SYN_FILTER)
}

pub enum PacketSource {
    Live(Capture<Active>),
    Offline(Capture<Offline>),
}

impl PacketSource {
    /// Non-promiscuous live capture on `device`, filtered to SYNs for `local`.
    pub fn open_live(device: &str, local: Ipv4Addr) -> Result<Self, CaptureError> {
        let open_err = |source| CaptureError::OpenDevice {
            device: device.to_string(),
            source,
        };
        let mut cap = Capture::from_device(device)
            .map_err(open_err)?
            .snaplen(SNAPLEN)
            .promisc(false)
            .open()
            .map_err(open_err)?;

        let filter = bpf_filter(local);
        cap.filter(&filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: filter.clone(),
                source,
            })?;
        tracing::info!("[capture] listening on {} {} filter={:?}", device, local, filter);
        Ok(Self::Live(cap))
    }

    /// Replay a saved capture file, keeping only SYNs addressed to `locals`.
    pub fn open_file(path: impl AsRef<Path>, locals: &HashSet<Ipv4Addr>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let mut cap = Capture::from_file(path).map_err(|source| CaptureError::OpenFile {
            path: path.display().to_string(),
            source,
        })?;

        let filter = replay_filter(locals);
        cap.filter(&filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: filter.clone(),
                source,
            })?;
        tracing::info!("[capture] replaying {} filter={:?}", path.display(), filter);
        Ok(Self::Offline(cap))
    }
}

impl AttemptSource for PacketSource {
    fn next_attempt(&mut self) -> Result<Option<AttemptEvent>, CaptureError> {
        match self {
            Self::Live(cap) => next_from(cap),
            Self::Offline(cap) => next_from(cap),
        }
    }
}

fn next_from<T: Activated + ?Sized>(cap: &mut Capture<T>) -> Result<Option<AttemptEvent>, CaptureError> {
    let linktype = cap.get_datalink();
    loop {
        match cap.next_packet() {
            Ok(pkt) => {
                #[allow(clippy::unnecessary_cast)]
                let timestamp = pkt.header.ts.tv_sec as i64;
                match decode(linktype, pkt.data, timestamp) {
                    Some(event) => return Ok(Some(event)),
                    None => tracing::trace!("[capture] skipped {} byte frame", pkt.data.len()),
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Decode one captured frame into an attempt event.
///
/// Returns `None` for anything that is not an IPv4 TCP SYN without ACK, or
/// that fails to parse.
pub fn decode(linktype: Linktype, data: &[u8], timestamp: i64) -> Option<AttemptEvent> {
    let sliced = match linktype {
        Linktype::ETHERNET => SlicedPacket::from_ethernet(data).ok()?,
        Linktype::RAW | Linktype::IPV4 => SlicedPacket::from_ip(data).ok()?,
        Linktype::LINUX_SLL => SlicedPacket::from_linux_sll(data).ok()?,
        _ => return None,
    };

    let ip = match sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => ipv4,
        _ => return None,
    };
    let tcp = match sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => tcp,
        _ => return None,
    };
    if !tcp.syn() || tcp.ack() {
        return None;
    }

    let header = ip.header();
    Some(AttemptEvent {
        src: header.source_addr(),
        dst: header.destination_addr(),
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        timestamp,
    })
}
