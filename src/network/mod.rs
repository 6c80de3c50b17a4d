//! Network plumbing: packet capture and local address discovery.

pub mod capture;
pub mod local;

pub use capture::{AttemptSource, CaptureError, PacketSource};
