// AF_PACKET packet capture.
//
// Linux-only: the capture socket, the kernel prefilter, and the socket
// statistics all come from AF_PACKET. The crate still builds elsewhere —
// frame decoding has no platform dependency — but `live` refuses to run
// off Linux.
//
// Exports:
//   - AfPacketCapture
//   - CaptureStats
//   - check_capture_access() -> Result<(), FlowtapError>

/// Kernel-side prefilter installed on the capture socket.
///
/// The prefilter only cuts socket traffic; userspace classification runs
/// on every delivered frame either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Accept every frame.
    All,
    /// Accept only non-fragmented TCP over IPv4.
    Ipv4Tcp,
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::*;
