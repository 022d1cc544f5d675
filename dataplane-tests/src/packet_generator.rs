//! Frame builders for pipeline tests.
//!
//! Fluent builders for Ethernet, IPv4, TCP, UDP and ICMP layers plus
//! convenience functions that assemble whole frames. Length fields are
//! derived from the payload unless a test overrides them to craft a
//! malformed frame.

use std::net::Ipv4Addr;

pub use packetshield_dataplane::parser::{
    IPPROTO_GRE, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP, TCP_FLAG_ACK, TCP_FLAG_CWR, TCP_FLAG_ECE,
    TCP_FLAG_FIN, TCP_FLAG_PSH, TCP_FLAG_RST, TCP_FLAG_SYN, TCP_FLAG_URG,
};

pub const ETH_P_IPV4: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;

/// Default endpoints used across the test suite.
pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

// ============================================================================
// Ethernet
// ============================================================================

pub struct EthFrame {
    dst: [u8; 6],
    src: [u8; 6],
    ethertype: u16,
    vlan_tags: Vec<u16>,
    payload: Vec<u8>,
}

impl Default for EthFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl EthFrame {
    pub fn new() -> Self {
        Self {
            dst: [0x22; 6],
            src: [0x11; 6],
            ethertype: ETH_P_IPV4,
            vlan_tags: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn with_dst(mut self, dst: [u8; 6]) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_src(mut self, src: [u8; 6]) -> Self {
        self.src = src;
        self
    }

    /// Push one 802.1Q tag (outer first).
    pub fn with_vlan(mut self, tci: u16) -> Self {
        self.vlan_tags.push(tci);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(14 + self.vlan_tags.len() * 4 + self.payload.len());
        frame.extend_from_slice(&self.dst);
        frame.extend_from_slice(&self.src);

        if self.vlan_tags.is_empty() {
            frame.extend_from_slice(&self.ethertype.to_be_bytes());
        } else {
            frame.extend_from_slice(&0x8100u16.to_be_bytes());
            for (i, tci) in self.vlan_tags.iter().enumerate() {
                frame.extend_from_slice(&tci.to_be_bytes());
                let next = if i + 1 < self.vlan_tags.len() {
                    0x8100
                } else {
                    self.ethertype
                };
                frame.extend_from_slice(&next.to_be_bytes());
            }
        }

        frame.extend_from_slice(&self.payload);
        frame
    }
}

// ============================================================================
// IPv4
// ============================================================================

pub struct Ipv4Packet {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    ttl: u8,
    id: u16,
    frag_field: u16,
    total_len: Option<u16>,
    payload: Vec<u8>,
}

impl Default for Ipv4Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Ipv4Packet {
    pub fn new() -> Self {
        Self {
            src: CLIENT_IP,
            dst: SERVER_IP,
            protocol: IPPROTO_TCP,
            ttl: 64,
            id: 0,
            frag_field: 0,
            total_len: None,
            payload: Vec::new(),
        }
    }

    pub fn with_src(mut self, src: Ipv4Addr) -> Self {
        self.src = src;
        self
    }

    pub fn with_dst(mut self, dst: Ipv4Addr) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the More-Fragments flag.
    pub fn with_more_fragments(mut self) -> Self {
        self.frag_field |= 0x2000;
        self
    }

    /// Fragment offset in 8-byte units.
    pub fn with_fragment_offset(mut self, units: u16) -> Self {
        self.frag_field = (self.frag_field & !0x1FFF) | (units & 0x1FFF);
        self
    }

    /// Override the total-length field (for malformed frames).
    pub fn with_total_length(mut self, total_len: u16) -> Self {
        self.total_len = Some(total_len);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_len = self
            .total_len
            .unwrap_or(20 + self.payload.len() as u16);
        let mut packet = Vec::with_capacity(20 + self.payload.len());
        packet.push(0x45);
        packet.push(0);
        packet.extend_from_slice(&total_len.to_be_bytes());
        packet.extend_from_slice(&self.id.to_be_bytes());
        packet.extend_from_slice(&self.frag_field.to_be_bytes());
        packet.push(self.ttl);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0, 0]); // checksum, not validated on ingress
        packet.extend_from_slice(&self.src.octets());
        packet.extend_from_slice(&self.dst.octets());
        packet.extend_from_slice(&self.payload);
        packet
    }
}

// ============================================================================
// TCP
// ============================================================================

pub struct TcpSegment {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack_seq: u32,
    flags: u8,
    window: u16,
    data_offset: u8,
    payload: Vec<u8>,
}

impl Default for TcpSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSegment {
    pub fn new() -> Self {
        Self {
            src_port: 12345,
            dst_port: 80,
            seq: 1000,
            ack_seq: 0,
            flags: TCP_FLAG_SYN,
            window: 65535,
            data_offset: 5,
            payload: Vec::new(),
        }
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_ack_seq(mut self, ack_seq: u32) -> Self {
        self.ack_seq = ack_seq;
        self
    }

    pub fn with_data_offset(mut self, data_offset: u8) -> Self {
        self.data_offset = data_offset;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut segment = Vec::with_capacity(20 + self.payload.len());
        segment.extend_from_slice(&self.src_port.to_be_bytes());
        segment.extend_from_slice(&self.dst_port.to_be_bytes());
        segment.extend_from_slice(&self.seq.to_be_bytes());
        segment.extend_from_slice(&self.ack_seq.to_be_bytes());
        segment.push(self.data_offset << 4);
        segment.push(self.flags);
        segment.extend_from_slice(&self.window.to_be_bytes());
        segment.extend_from_slice(&[0, 0]); // checksum
        segment.extend_from_slice(&[0, 0]); // urgent pointer
        segment.extend_from_slice(&self.payload);
        segment
    }
}

// ============================================================================
// UDP
// ============================================================================

pub struct UdpDatagram {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl Default for UdpDatagram {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpDatagram {
    pub fn new() -> Self {
        Self {
            src_port: 54321,
            dst_port: 443,
            payload: Vec::new(),
        }
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(8 + self.payload.len());
        datagram.extend_from_slice(&self.src_port.to_be_bytes());
        datagram.extend_from_slice(&self.dst_port.to_be_bytes());
        datagram.extend_from_slice(&((8 + self.payload.len()) as u16).to_be_bytes());
        datagram.extend_from_slice(&[0, 0]); // checksum
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}

// ============================================================================
// ICMP
// ============================================================================

pub struct IcmpMessage {
    icmp_type: u8,
    code: u8,
    payload: Vec<u8>,
}

impl IcmpMessage {
    pub fn echo_request() -> Self {
        Self {
            icmp_type: 8,
            code: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = icmp_type;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut message = Vec::with_capacity(8 + self.payload.len());
        message.push(self.icmp_type);
        message.push(self.code);
        message.extend_from_slice(&[0, 0]); // checksum
        message.extend_from_slice(&[0, 0, 0, 1]); // identifier / sequence
        message.extend_from_slice(&self.payload);
        message
    }
}

// ============================================================================
// Whole-frame helpers
// ============================================================================

/// Ethernet/IPv4/TCP frame between the default endpoints.
pub fn tcp_frame(segment: TcpSegment) -> Vec<u8> {
    tcp_frame_between(CLIENT_IP, SERVER_IP, segment)
}

pub fn tcp_frame_between(src: Ipv4Addr, dst: Ipv4Addr, segment: TcpSegment) -> Vec<u8> {
    EthFrame::new()
        .with_payload(
            Ipv4Packet::new()
                .with_src(src)
                .with_dst(dst)
                .with_protocol(IPPROTO_TCP)
                .with_payload(segment.build())
                .build(),
        )
        .build()
}

/// Ethernet/IPv4/UDP frame between the default endpoints.
pub fn udp_frame(datagram: UdpDatagram) -> Vec<u8> {
    udp_frame_between(CLIENT_IP, SERVER_IP, datagram)
}

pub fn udp_frame_between(src: Ipv4Addr, dst: Ipv4Addr, datagram: UdpDatagram) -> Vec<u8> {
    EthFrame::new()
        .with_payload(
            Ipv4Packet::new()
                .with_src(src)
                .with_dst(dst)
                .with_protocol(IPPROTO_UDP)
                .with_payload(datagram.build())
                .build(),
        )
        .build()
}

/// Ethernet/IPv4/ICMP frame between the default endpoints.
pub fn icmp_frame(message: IcmpMessage) -> Vec<u8> {
    EthFrame::new()
        .with_payload(
            Ipv4Packet::new()
                .with_protocol(IPPROTO_ICMP)
                .with_payload(message.build())
                .build(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_syn_frame_has_expected_layout() {
        let frame = tcp_frame(TcpSegment::new());
        assert_eq!(frame.len(), 14 + 20 + 20);
        assert_eq!(&frame[12..14], &ETH_P_IPV4.to_be_bytes());
        assert_eq!(frame[14], 0x45);
        assert_eq!(frame[23], IPPROTO_TCP);
        assert_eq!(frame[47], TCP_FLAG_SYN);
    }

    #[test]
    fn vlan_tags_nest_with_final_ethertype_last() {
        let frame = EthFrame::new()
            .with_vlan(100)
            .with_vlan(200)
            .with_payload(vec![0xAA])
            .build();
        assert_eq!(&frame[12..14], &0x8100u16.to_be_bytes());
        assert_eq!(&frame[16..18], &0x8100u16.to_be_bytes());
        assert_eq!(&frame[20..22], &ETH_P_IPV4.to_be_bytes());
        assert_eq!(frame[22], 0xAA);
    }

    #[test]
    fn udp_length_field_tracks_payload() {
        let frame = udp_frame(UdpDatagram::new().with_payload(vec![0; 10]));
        // UDP length at offset 14 + 20 + 4.
        assert_eq!(&frame[38..40], &18u16.to_be_bytes());
        // IP total length covers header + UDP.
        assert_eq!(&frame[16..18], &38u16.to_be_bytes());
    }
}
