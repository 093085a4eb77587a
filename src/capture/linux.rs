// Linux capture implementation — AF_PACKET raw sockets.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::FlowtapError;

use super::FilterKind;

// ---------------------------------------------------------------------------
// AF_PACKET constants
// ---------------------------------------------------------------------------

const ETH_P_ALL: u16 = 0x0003;
const SOL_PACKET: i32 = 263;
const PACKET_ADD_MEMBERSHIP: i32 = 1;
const PACKET_MR_PROMISC: u16 = 1;
const PACKET_STATISTICS: i32 = 6;

// Classic BPF opcodes for the socket filter
const BPF_LD: u16 = 0x00;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;
const BPF_ABS: u16 = 0x20;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_JSET: u16 = 0x40;
const BPF_RET: u16 = 0x06;
const BPF_K: u16 = 0x00;

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy)]
struct sock_filter {
    code: u16,
    jt: u8,
    jf: u8,
    k: u32,
}

#[allow(non_camel_case_types)]
#[repr(C)]
struct sock_fprog {
    len: u16,
    filter: *mut sock_filter,
}

#[allow(non_camel_case_types)]
#[repr(C)]
struct packet_mreq {
    mr_ifindex: i32,
    mr_type: u16,
    mr_alen: u16,
    mr_address: [u8; 8],
}

#[allow(non_camel_case_types)]
#[repr(C)]
struct tpacket_stats {
    tp_packets: u32,
    tp_drops: u32,
}

/// AF_PACKET capture device bound to one interface.
pub struct AfPacketCapture {
    fd: OwnedFd,
    buffer: Vec<u8>,
    interface: String,
}

/// Kernel-side socket counters, read via PACKET_STATISTICS.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub received: u32,
    pub dropped: u32,
}

impl AfPacketCapture {
    /// Create a new AF_PACKET capture device bound to `interface`.
    pub fn new(
        interface: &str,
        buffer_size: u32,
        filter_kind: FilterKind,
        promiscuous: bool,
    ) -> Result<Self, FlowtapError> {
        // 1. Create raw socket
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                (ETH_P_ALL as u32).to_be() as i32,
            )
        };
        if fd < 0 {
            return Err(FlowtapError::CaptureDevice(format!(
                "socket(AF_PACKET) failed: {}",
                io::Error::last_os_error()
            )));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // 2. Get interface index
        let if_index = if_nametoindex(interface)?;

        // 3. Bind to interface
        let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        #[allow(clippy::unnecessary_cast)]
        {
            sll.sll_protocol = (ETH_P_ALL as u16).to_be();
        }
        sll.sll_ifindex = if_index as i32;

        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(FlowtapError::CaptureDevice(format!(
                "bind(AF_PACKET, {}) failed: {}",
                interface,
                io::Error::last_os_error()
            )));
        }

        // 4. Install the kernel prefilter
        if let FilterKind::Ipv4Tcp = filter_kind {
            install_filter(&fd, &ipv4_tcp_filter())?;
        }

        // 5. Set read timeout (500ms) so shutdown requests are noticed
        let timeout = libc::timeval {
            tv_sec: 0,
            tv_usec: 500_000,
        };
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            log::warn!(
                "SO_RCVTIMEO failed on {}: {}",
                interface,
                io::Error::last_os_error()
            );
        }

        // 6. Set receive buffer size
        let buf_size = buffer_size.max(4096) as i32;
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &buf_size as *const i32 as *const libc::c_void,
                std::mem::size_of::<i32>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            log::warn!(
                "SO_RCVBUF failed on {}: {}",
                interface,
                io::Error::last_os_error()
            );
        }

        // 7. Promiscuous mode, only when asked for
        if promiscuous {
            let mreq = packet_mreq {
                mr_ifindex: if_index as i32,
                mr_type: PACKET_MR_PROMISC,
                mr_alen: 0,
                mr_address: [0u8; 8],
            };
            let ret = unsafe {
                libc::setsockopt(
                    fd.as_raw_fd(),
                    SOL_PACKET,
                    PACKET_ADD_MEMBERSHIP,
                    &mreq as *const packet_mreq as *const libc::c_void,
                    std::mem::size_of::<packet_mreq>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                log::warn!(
                    "PACKET_MR_PROMISC failed on {}: {} (continuing without promiscuous mode)",
                    interface,
                    io::Error::last_os_error()
                );
            }
        }

        let buffer = vec![0u8; buffer_size.max(4096) as usize];

        log::info!(
            "AF_PACKET capture on {} (if_index={}, buffer={}, filter={:?})",
            interface,
            if_index,
            buffer.len(),
            filter_kind
        );

        Ok(Self {
            fd,
            buffer,
            interface: interface.to_string(),
        })
    }

    /// Blocking read of one frame from the AF_PACKET socket.
    ///
    /// Returns `Ok(None)` when the read timeout expires with no data, so
    /// the caller can check for a shutdown request and come back.
    pub fn read_frame(&mut self) -> Result<Option<&[u8]>, FlowtapError> {
        let n = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EAGAIN)
                || err.raw_os_error() == Some(libc::EWOULDBLOCK)
            {
                return Ok(None);
            }
            return Err(FlowtapError::CaptureDevice(format!(
                "recvfrom on {} failed: {}",
                self.interface, err
            )));
        }

        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.buffer[..n as usize]))
    }

    /// Kernel receive/drop counters for this socket.
    ///
    /// The kernel resets the counters on every read; call once at exit.
    pub fn stats(&self) -> Result<CaptureStats, FlowtapError> {
        let mut st = tpacket_stats {
            tp_packets: 0,
            tp_drops: 0,
        };
        let mut len = std::mem::size_of::<tpacket_stats>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd.as_raw_fd(),
                SOL_PACKET,
                PACKET_STATISTICS,
                &mut st as *mut tpacket_stats as *mut libc::c_void,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(FlowtapError::CaptureDevice(format!(
                "PACKET_STATISTICS on {} failed: {}",
                self.interface,
                io::Error::last_os_error()
            )));
        }
        Ok(CaptureStats {
            received: st.tp_packets,
            dropped: st.tp_drops,
        })
    }

    /// Returns the interface name this capture is bound to.
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check that we have raw capture access on Linux.
pub fn check_capture_access() -> Result<(), FlowtapError> {
    // Root always has access
    if unsafe { libc::getuid() } == 0 {
        return Ok(());
    }

    // CAP_NET_RAW is enough; probe with a test socket
    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW,
            (ETH_P_ALL as u32).to_be() as i32,
        )
    };
    if fd >= 0 {
        unsafe { libc::close(fd) };
        return Ok(());
    }

    Err(FlowtapError::InsufficientPermission(
        "flowtap requires raw packet capture privileges. Either:\n  \
         1. Run with sudo: sudo flowtap live <interface>\n  \
         2. Grant the capability: sudo setcap cap_net_raw+ep $(command -v flowtap)"
            .to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn if_nametoindex(name: &str) -> Result<u32, FlowtapError> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| FlowtapError::CaptureDevice("invalid interface name".to_string()))?;
    let idx = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if idx == 0 {
        return Err(FlowtapError::CaptureDevice(format!(
            "if_nametoindex({}) failed: {}",
            name,
            io::Error::last_os_error()
        )));
    }
    Ok(idx)
}

fn install_filter(fd: &OwnedFd, filter: &[sock_filter]) -> Result<(), FlowtapError> {
    let mut insns = filter.to_vec();
    let prog = sock_fprog {
        len: insns.len() as u16,
        filter: insns.as_mut_ptr(),
    };

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &prog as *const sock_fprog as *const libc::c_void,
            std::mem::size_of::<sock_fprog>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(FlowtapError::CaptureDevice(format!(
            "SO_ATTACH_FILTER failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BPF filter program for AF_PACKET (Ethernet framing)
// ---------------------------------------------------------------------------

fn insn(code: u16, jt: u8, jf: u8, k: u32) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

/// Accept non-fragmented TCP over IPv4, reject everything else.
///
/// Mirrors the userspace classification so the socket only delivers frames
/// that stand a chance of producing a record. Malformed frames still pass
/// (the filter checks no header lengths); userspace stays authoritative.
fn ipv4_tcp_filter() -> Vec<sock_filter> {
    vec![
        // Load EtherType at offset 12
        insn(BPF_LD | BPF_H | BPF_ABS, 0, 0, 12),
        // If not IPv4 (0x0800), reject
        insn(BPF_JMP | BPF_JEQ | BPF_K, 0, 5, 0x0800),
        // Load IPv4 protocol at offset 23 (14 + 9)
        insn(BPF_LD | BPF_B | BPF_ABS, 0, 0, 23),
        // If not TCP (6), reject
        insn(BPF_JMP | BPF_JEQ | BPF_K, 0, 3, 6),
        // Load flags + fragment offset at offset 20 (14 + 6)
        insn(BPF_LD | BPF_H | BPF_ABS, 0, 0, 20),
        // If MF or a fragment offset is set, reject
        insn(BPF_JMP | BPF_JSET | BPF_K, 1, 0, 0x3FFF),
        // Accept: return 65535
        insn(BPF_RET | BPF_K, 0, 0, 0xFFFF),
        // Reject: return 0
        insn(BPF_RET | BPF_K, 0, 0, 0),
    ]
}
