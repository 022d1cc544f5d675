//! Frame parser: Ethernet -> (VLAN) -> IPv4 -> TCP/UDP/ICMP.
//!
//! Produces a [`PacketContext`] consumed by the verdict stages. Every field
//! is either copied out of the frame after a bounds check or left at its
//! cleared value; stages never touch the buffer again except through the
//! recorded offsets, re-validated at the point of use.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::frame::FrameView;

// ============================================================================
// Protocol Constants
// ============================================================================

pub const ETH_P_IPV4: u16 = 0x0800;
pub const ETH_P_VLAN_8021Q: u16 = 0x8100;
pub const ETH_P_VLAN_8021AD: u16 = 0x88A8;

pub const ETH_HDR_LEN: usize = 14;
pub const VLAN_TAG_LEN: usize = 4;
pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const TCP_MIN_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;
pub const ICMP_HDR_LEN: usize = 8;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_GRE: u8 = 47;

pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;
pub const TCP_FLAG_URG: u8 = 0x20;
pub const TCP_FLAG_ECE: u8 = 0x40;
pub const TCP_FLAG_CWR: u8 = 0x80;

const IP_FRAG_OFFSET_MASK: u16 = 0x1FFF;
const IP_FLAG_MORE_FRAGMENTS: u16 = 0x2000;

/// Maximum number of stacked VLAN tags stripped before giving up.
const MAX_VLAN_TAGS: usize = 2;

// ============================================================================
// Parse Errors
// ============================================================================

/// Why a frame was rejected by the parser. The pipeline reports any of
/// these as a single `DropReason::ParseError`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short for Ethernet header")]
    TruncatedEthernet,
    #[error("frame too short for VLAN tag")]
    TruncatedVlan,
    #[error("unsupported EtherType {0:#06x}")]
    UnsupportedEtherType(u16),
    #[error("frame too short for IPv4 header")]
    TruncatedIpv4,
    #[error("IPv4 header length below minimum")]
    BadIpv4HeaderLength,
    #[error("frame too short for TCP header")]
    TruncatedTcp,
    #[error("TCP data offset below minimum")]
    BadTcpDataOffset,
    #[error("frame too short for UDP header")]
    TruncatedUdp,
    #[error("frame too short for ICMP header")]
    TruncatedIcmp,
}

// ============================================================================
// Packet Context
// ============================================================================

/// Parsed per-packet metadata, stack-lived for the duration of one stage
/// walk.
///
/// Offsets are measured from the start of the frame. `l4_offset` and
/// `payload_offset` are `None` when the corresponding layer is absent
/// (non-first fragments, unknown L4 protocols, empty payloads past the
/// buffer end).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketContext {
    /// EtherType after VLAN stripping, host byte order.
    pub eth_proto: u16,
    /// Offset of the IPv4 header.
    pub l3_offset: usize,
    /// IPv4 header length in bytes (IHL * 4).
    pub ip_header_len: usize,
    pub ip_proto: u8,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// IPv4 total length field.
    pub pkt_len: u16,
    pub ttl: u8,
    /// More-fragments set or nonzero fragment offset.
    pub is_fragment: bool,
    /// Fragment offset in bytes.
    pub frag_offset: u16,
    /// Offset of the L4 header, when one was parsed.
    pub l4_offset: Option<usize>,
    /// Source port, host byte order. Zero for ICMP.
    pub src_port: u16,
    /// Destination port, host byte order. For ICMP this carries the
    /// message type as a pseudo-port.
    pub dst_port: u16,
    /// TCP flag byte (FIN/SYN/RST/PSH/ACK/URG/ECE/CWR).
    pub tcp_flags: u8,
    /// TCP sequence number, host byte order.
    pub tcp_seq: u32,
    /// TCP acknowledgement number, host byte order.
    pub tcp_ack_seq: u32,
    /// Offset of the L4 payload, when any payload bytes are in the buffer.
    pub payload_offset: Option<usize>,
    /// L4 payload length derived from the IPv4 total length.
    pub payload_len: u16,
    /// First four payload bytes as a native-endian fingerprint; zero when
    /// fewer than four bytes are present.
    pub payload_hash4: u32,
    pub icmp_type: u8,
    pub icmp_code: u8,
}

impl PacketContext {
    fn cleared() -> Self {
        Self {
            eth_proto: 0,
            l3_offset: 0,
            ip_header_len: 0,
            ip_proto: 0,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            pkt_len: 0,
            ttl: 0,
            is_fragment: false,
            frag_offset: 0,
            l4_offset: None,
            src_port: 0,
            dst_port: 0,
            tcp_flags: 0,
            tcp_seq: 0,
            tcp_ack_seq: 0,
            payload_offset: None,
            payload_len: 0,
            payload_hash4: 0,
            icmp_type: 0,
            icmp_code: 0,
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.ip_proto == IPPROTO_TCP
    }

    pub fn is_udp(&self) -> bool {
        self.ip_proto == IPPROTO_UDP
    }

    pub fn is_icmp(&self) -> bool {
        self.ip_proto == IPPROTO_ICMP
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse a raw frame into a [`PacketContext`].
pub fn parse(frame: &[u8]) -> Result<PacketContext, ParseError> {
    let view = FrameView::new(frame);
    let mut pkt = PacketContext::cleared();

    // ---- L2: Ethernet ----
    if view.len() < ETH_HDR_LEN {
        return Err(ParseError::TruncatedEthernet);
    }
    let mut eth_proto = view.read_u16(12).ok_or(ParseError::TruncatedEthernet)?;
    let mut l3_offset = ETH_HDR_LEN;

    // Strip up to two stacked VLAN tags; a third leaves a VLAN EtherType
    // behind, which is rejected below.
    for _ in 0..MAX_VLAN_TAGS {
        if eth_proto != ETH_P_VLAN_8021Q && eth_proto != ETH_P_VLAN_8021AD {
            break;
        }
        eth_proto = view
            .read_u16(l3_offset + 2)
            .ok_or(ParseError::TruncatedVlan)?;
        l3_offset += VLAN_TAG_LEN;
    }
    pkt.eth_proto = eth_proto;

    if eth_proto != ETH_P_IPV4 {
        return Err(ParseError::UnsupportedEtherType(eth_proto));
    }

    // ---- L3: IPv4 ----
    if view.slice(l3_offset, IPV4_MIN_HDR_LEN).is_none() {
        return Err(ParseError::TruncatedIpv4);
    }
    let version_ihl = view.read_u8(l3_offset).ok_or(ParseError::TruncatedIpv4)?;
    let ihl = version_ihl & 0x0f;
    if ihl < 5 {
        return Err(ParseError::BadIpv4HeaderLength);
    }
    let ip_header_len = ihl as usize * 4;
    if view.slice(l3_offset, ip_header_len).is_none() {
        return Err(ParseError::TruncatedIpv4);
    }

    pkt.l3_offset = l3_offset;
    pkt.ip_header_len = ip_header_len;
    pkt.pkt_len = view.read_u16(l3_offset + 2).ok_or(ParseError::TruncatedIpv4)?;
    pkt.ttl = view.read_u8(l3_offset + 8).ok_or(ParseError::TruncatedIpv4)?;
    pkt.ip_proto = view.read_u8(l3_offset + 9).ok_or(ParseError::TruncatedIpv4)?;
    pkt.src_ip = Ipv4Addr::from(view.read_u32(l3_offset + 12).ok_or(ParseError::TruncatedIpv4)?);
    pkt.dst_ip = Ipv4Addr::from(view.read_u32(l3_offset + 16).ok_or(ParseError::TruncatedIpv4)?);

    let frag_field = view.read_u16(l3_offset + 6).ok_or(ParseError::TruncatedIpv4)?;
    let frag_offset_units = frag_field & IP_FRAG_OFFSET_MASK;
    let more_fragments = frag_field & IP_FLAG_MORE_FRAGMENTS != 0;
    if frag_offset_units != 0 || more_fragments {
        pkt.is_fragment = true;
        pkt.frag_offset = frag_offset_units * 8;
        // Non-first fragments carry no parseable L4 header.
        if frag_offset_units != 0 {
            return Ok(pkt);
        }
    }

    // ---- L4 ----
    let l4_offset = l3_offset + ip_header_len;
    let l4_len = pkt.pkt_len.saturating_sub(ip_header_len as u16);

    match pkt.ip_proto {
        IPPROTO_TCP => {
            if view.slice(l4_offset, TCP_MIN_HDR_LEN).is_none() {
                return Err(ParseError::TruncatedTcp);
            }
            pkt.src_port = view.read_u16(l4_offset).ok_or(ParseError::TruncatedTcp)?;
            pkt.dst_port = view.read_u16(l4_offset + 2).ok_or(ParseError::TruncatedTcp)?;
            pkt.tcp_seq = view.read_u32(l4_offset + 4).ok_or(ParseError::TruncatedTcp)?;
            pkt.tcp_ack_seq = view.read_u32(l4_offset + 8).ok_or(ParseError::TruncatedTcp)?;
            pkt.tcp_flags = view.read_u8(l4_offset + 13).ok_or(ParseError::TruncatedTcp)?;

            let doff = view.read_u8(l4_offset + 12).ok_or(ParseError::TruncatedTcp)? >> 4;
            let tcp_header_len = doff as usize * 4;
            if tcp_header_len < TCP_MIN_HDR_LEN {
                return Err(ParseError::BadTcpDataOffset);
            }

            pkt.l4_offset = Some(l4_offset);
            pkt.payload_len = l4_len.saturating_sub(tcp_header_len as u16);
            set_payload(&mut pkt, &view, l4_offset + tcp_header_len);
        }
        IPPROTO_UDP => {
            if view.slice(l4_offset, UDP_HDR_LEN).is_none() {
                return Err(ParseError::TruncatedUdp);
            }
            pkt.src_port = view.read_u16(l4_offset).ok_or(ParseError::TruncatedUdp)?;
            pkt.dst_port = view.read_u16(l4_offset + 2).ok_or(ParseError::TruncatedUdp)?;

            pkt.l4_offset = Some(l4_offset);
            pkt.payload_len = l4_len.saturating_sub(UDP_HDR_LEN as u16);
            set_payload(&mut pkt, &view, l4_offset + UDP_HDR_LEN);
        }
        IPPROTO_ICMP => {
            if view.slice(l4_offset, ICMP_HDR_LEN).is_none() {
                return Err(ParseError::TruncatedIcmp);
            }
            pkt.icmp_type = view.read_u8(l4_offset).ok_or(ParseError::TruncatedIcmp)?;
            pkt.icmp_code = view.read_u8(l4_offset + 1).ok_or(ParseError::TruncatedIcmp)?;
            // ICMP has no ports; the message type stands in as the
            // destination port for port-keyed tables.
            pkt.src_port = 0;
            pkt.dst_port = pkt.icmp_type as u16;

            pkt.l4_offset = Some(l4_offset);
            pkt.payload_len = l4_len.saturating_sub(ICMP_HDR_LEN as u16);
        }
        _ => {
            // Unknown L4 protocol (e.g. GRE); record the bounds and let the
            // stages decide.
            pkt.l4_offset = Some(l4_offset);
            pkt.payload_len = l4_len;
        }
    }

    Ok(pkt)
}

/// Record the payload offset when any payload bytes are inside the buffer
/// and fingerprint the first four when all of them are.
fn set_payload(pkt: &mut PacketContext, view: &FrameView<'_>, payload_offset: usize) {
    if let Some(first4) = view.read_array::<4>(payload_offset) {
        pkt.payload_offset = Some(payload_offset);
        pkt.payload_hash4 = u32::from_ne_bytes(first4);
    } else if payload_offset < view.len() {
        pkt.payload_offset = Some(payload_offset);
    }
}
