//! Packet capture subsystem

pub mod classify;
pub mod dispatch;
pub mod source;

pub use classify::{classify, is_echo_request, LinkType, PacketClass};
pub use dispatch::{run, run_live, DispatchSummary, PacketLimit};
pub use source::{CaptureSettings, LiveCapture, OfflineCapture, PacketSource, Poll};
