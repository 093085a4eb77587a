// Frame decoding: Ethernet/IPv4/TCP header parsing and flow extraction.
//
// Everything here is synchronous, allocation-free, and stateless per frame.
// The capture loop and the replay reader both feed raw frames to
// [`decode_frame`], one buffer in, one outcome out. Header fields live in
// packed bit-fields (the IPv4 IHL nibble, the TCP data-offset nibble), so
// all decoding is explicit mask-and-shift over single bytes — never a
// struct cast over the buffer.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// Ethernet
const ETH_HLEN: usize = 14;
const ETH_ETHERTYPE_OFFSET: usize = 12;
const ETHERTYPE_IPV4: u16 = 0x0800;

// IPv4
const IPV4_MIN_HLEN: usize = 20;
const IPV4_TOTAL_LEN_OFFSET: usize = 2;
const IPV4_FLAGS_FRAG_OFFSET: usize = 6;
const IPV4_PROTO_OFFSET: usize = 9;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;

// More-fragments flag (bit 13) plus the 13-bit fragment offset. Any set bit
// means the transport header is not co-located with this datagram.
const IPV4_FRAGMENT_MASK: u16 = 0x3FFF;

// TCP
const TCP_MIN_HLEN: usize = 20;
const TCP_DOFF_OFFSET: usize = 12;

const PROTO_TCP: u8 = 6;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// A frame that could not be decoded.
///
/// These are per-frame conditions, never fatal: the caller counts them and
/// moves on to the next frame. `OutOfBounds` covers truncation at any layer;
/// the remaining variants are structural malformations in fields that did
/// fit the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("read of {len} bytes at offset {offset} exceeds frame length {frame_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        frame_len: usize,
    },
    #[error("IPv4 header length {len} below the 20-byte minimum")]
    HeaderTooShort { len: usize },
    #[error("TCP data offset {len} below the 20-byte minimum")]
    BadDataOffset { len: usize },
    #[error("IPv4 total length {total_len} smaller than the {header_len} header bytes it covers")]
    NegativePayloadLength { total_len: usize, header_len: usize },
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Bounds-checked, offset-based access to one captured frame.
///
/// Every header field in this module is read through this type, so the
/// arithmetic on untrusted offsets sits in exactly one place. Reads never
/// panic: a read past the end of the frame (or an offset that overflows)
/// comes back as [`ParseError::OutOfBounds`].
#[derive(Debug, Clone, Copy)]
pub struct FrameReader<'f> {
    data: &'f [u8],
}

impl<'f> FrameReader<'f> {
    pub fn new(data: &'f [u8]) -> Self {
        Self { data }
    }

    /// Length of the underlying frame in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<&'f [u8], ParseError> {
        let out_of_bounds = ParseError::OutOfBounds {
            offset,
            len,
            frame_len: self.data.len(),
        };
        let end = offset.checked_add(len).ok_or(out_of_bounds)?;
        if end > self.data.len() {
            return Err(out_of_bounds);
        }
        Ok(&self.data[offset..end])
    }

    /// Read one byte at `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8, ParseError> {
        Ok(self.read(offset, 1)?[0])
    }

    /// Read a big-endian u16 at `offset`.
    pub fn read_u16_be(&self, offset: usize) -> Result<u16, ParseError> {
        let b = self.read(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a 4-byte IPv4 address at `offset`.
    ///
    /// The bytes are taken in on-wire order; no integer byte-order
    /// conversion is applied, so dotted-decimal rendering follows byte
    /// position in the frame.
    pub fn read_ipv4(&self, offset: usize) -> Result<Ipv4Addr, ParseError> {
        let b = self.read(offset, 4)?;
        Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }
}

// ---------------------------------------------------------------------------
// Header views
// ---------------------------------------------------------------------------

/// Scalar fields extracted from one IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (IHL × 4), already validated ≥ 20.
    pub header_len: usize,
    /// Total datagram length (header + payload) as declared on the wire.
    pub total_len: u16,
    /// Transport protocol number.
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

/// Scalar fields extracted from one TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header length in bytes (data offset × 4), already validated ≥ 20.
    pub header_len: usize,
}

// ---------------------------------------------------------------------------
// Layer parsers
// ---------------------------------------------------------------------------

/// Read the EtherType of an Ethernet frame.
pub fn read_ethertype(r: &FrameReader) -> Result<u16, ParseError> {
    r.read_u16_be(ETH_ETHERTYPE_OFFSET)
}

/// Parse the IPv4 header beginning at `nhoff`.
///
/// The IHL nibble is decoded first and the declared header must both meet
/// the 20-byte minimum and fit inside the frame, so callers may trust
/// `header_len` for offset arithmetic. The version nibble is not checked;
/// the EtherType gate upstream is authoritative.
pub fn parse_ipv4_header(r: &FrameReader, nhoff: usize) -> Result<Ipv4Header, ParseError> {
    let version_ihl = r.read_u8(nhoff)?;
    let header_len = ((version_ihl & 0x0F) as usize) * 4;
    if header_len < IPV4_MIN_HLEN {
        return Err(ParseError::HeaderTooShort { len: header_len });
    }
    // The declared header (including options) must lie within the frame.
    r.read(nhoff, header_len)?;

    let protocol = r.read_u8(nhoff + IPV4_PROTO_OFFSET)?;
    let total_len = r.read_u16_be(nhoff + IPV4_TOTAL_LEN_OFFSET)?;
    let src = r.read_ipv4(nhoff + IPV4_SRC_OFFSET)?;
    let dst = r.read_ipv4(nhoff + IPV4_DST_OFFSET)?;

    Ok(Ipv4Header {
        header_len,
        total_len,
        protocol,
        src,
        dst,
    })
}

/// Test the IPv4 flags + fragment-offset field at `nhoff + 6`.
///
/// True when the more-fragments flag is set or the fragment offset is
/// nonzero — either way the TCP header is not in this datagram.
pub fn is_fragment(r: &FrameReader, nhoff: usize) -> Result<bool, ParseError> {
    let flags_frag = r.read_u16_be(nhoff + IPV4_FLAGS_FRAG_OFFSET)?;
    Ok((flags_frag & IPV4_FRAGMENT_MASK) != 0)
}

/// Parse the TCP header beginning at `tcp_offset`.
///
/// The data-offset nibble shares its byte with reserved bits, so the header
/// length is extracted by mask and shift. The declared header must meet the
/// 20-byte minimum and fit inside the frame.
pub fn parse_tcp_header(r: &FrameReader, tcp_offset: usize) -> Result<TcpHeader, ParseError> {
    let src_port = r.read_u16_be(tcp_offset)?;
    let dst_port = r.read_u16_be(tcp_offset + 2)?;

    let doff_byte = r.read_u8(tcp_offset + TCP_DOFF_OFFSET)?;
    let header_len = (((doff_byte & 0xF0) >> 4) as usize) * 4;
    if header_len < TCP_MIN_HLEN {
        return Err(ParseError::BadDataOffset { len: header_len });
    }
    r.read(tcp_offset, header_len)?;

    Ok(TcpHeader {
        src_port,
        dst_port,
        header_len,
    })
}

/// Compute the payload span from the three header lengths and the IPv4
/// total length.
///
/// The subtraction is checked: a total length smaller than the headers it
/// is supposed to cover reports a malformation instead of wrapping.
pub fn locate_payload(
    eth_len: usize,
    ip_header_len: usize,
    tcp_header_len: usize,
    ip_total_len: usize,
) -> Result<(usize, usize), ParseError> {
    let offset = eth_len + ip_header_len + tcp_header_len;
    let length = ip_total_len
        .checked_sub(ip_header_len + tcp_header_len)
        .ok_or(ParseError::NegativePayloadLength {
            total_len: ip_total_len,
            header_len: ip_header_len + tcp_header_len,
        })?;
    Ok((offset, length))
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a frame produced no record.
///
/// These are expected traffic classes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// EtherType is not 0x0800 (ARP, IPv6, VLAN-tagged, ...).
    NotIpv4 { ethertype: u16 },
    /// Non-first or multi-part IPv4 fragment.
    Fragment,
    /// IPv4 protocol other than TCP.
    NotTcp { protocol: u8 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotIpv4 { ethertype } => {
                write!(f, "not IPv4 (ethertype 0x{ethertype:04X})")
            }
            SkipReason::Fragment => write!(f, "IPv4 fragment"),
            SkipReason::NotTcp { protocol } => write!(f, "not TCP (protocol {protocol})"),
        }
    }
}

/// One extracted TCP/IPv4 flow.
///
/// All fields are copied scalars; the record has no tie to the frame it
/// came from. `payload_offset` counts from the start of the frame, and
/// `payload_offset + payload_len` never exceeds the frame length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload_offset: usize,
    pub payload_len: usize,
}

/// Decoding outcome for one frame that was structurally sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A non-fragmented TCP/IPv4 frame; the payload span is in bounds.
    Flow(FlowRecord),
    /// Sound frame of a class this tool does not report on.
    NotApplicable(SkipReason),
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Decode one link-layer frame into a flow record, a skip, or an error.
///
/// Stops at the first terminal condition, in this order: non-IPv4
/// EtherType, malformed IPv4 header, fragment, non-TCP protocol, malformed
/// TCP header, bad payload arithmetic, payload span past the end of the
/// buffer. For a non-IPv4 frame no byte beyond the Ethernet header is
/// touched. Bytes read are bounded by the header lengths — payload size
/// never affects the cost of a call.
pub fn decode_frame(frame: &[u8]) -> Result<Verdict, ParseError> {
    let r = FrameReader::new(frame);

    let ethertype = read_ethertype(&r)?;
    if ethertype != ETHERTYPE_IPV4 {
        return Ok(Verdict::NotApplicable(SkipReason::NotIpv4 { ethertype }));
    }

    let ipv4 = parse_ipv4_header(&r, ETH_HLEN)?;

    if is_fragment(&r, ETH_HLEN)? {
        return Ok(Verdict::NotApplicable(SkipReason::Fragment));
    }

    if ipv4.protocol != PROTO_TCP {
        return Ok(Verdict::NotApplicable(SkipReason::NotTcp {
            protocol: ipv4.protocol,
        }));
    }

    let tcp = parse_tcp_header(&r, ETH_HLEN + ipv4.header_len)?;

    let (payload_offset, payload_len) = locate_payload(
        ETH_HLEN,
        ipv4.header_len,
        tcp.header_len,
        usize::from(ipv4.total_len),
    )?;

    // The declared span must lie within the captured bytes; a total length
    // pointing past the buffer must not become a record.
    r.read(payload_offset, payload_len)?;

    Ok(Verdict::Flow(FlowRecord {
        src_addr: ipv4.src,
        dst_addr: ipv4.dst,
        src_port: tcp.src_port,
        dst_port: tcp.dst_port,
        payload_offset,
        payload_len,
    }))
}

// ---------------------------------------------------------------------------
// Stream tally
// ---------------------------------------------------------------------------

/// Per-classification counters over a stream of frames.
///
/// One decode outcome increments exactly one class counter plus `frames`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub flows: u64,
    pub not_ipv4: u64,
    pub fragments: u64,
    pub not_tcp: u64,
    pub malformed: u64,
    pub out_of_bounds: u64,
}

impl DecodeStats {
    pub fn record(&mut self, outcome: &Result<Verdict, ParseError>) {
        self.frames += 1;
        match outcome {
            Ok(Verdict::Flow(_)) => self.flows += 1,
            Ok(Verdict::NotApplicable(SkipReason::NotIpv4 { .. })) => self.not_ipv4 += 1,
            Ok(Verdict::NotApplicable(SkipReason::Fragment)) => self.fragments += 1,
            Ok(Verdict::NotApplicable(SkipReason::NotTcp { .. })) => self.not_tcp += 1,
            Err(ParseError::OutOfBounds { .. }) => self.out_of_bounds += 1,
            Err(_) => self.malformed += 1,
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
