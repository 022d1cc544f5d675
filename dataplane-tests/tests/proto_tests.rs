//! Deep protocol validation: DNS, NTP, SSDP, memcached and the TCP state
//! machine.

use packetshield_dataplane::{
    proto_bits, ConfigKey, DropReason, Engine, EngineConfig, EscalationLevel, Verdict,
};
use packetshield_dataplane_tests::*;
use pretty_assertions::assert_eq;

const SEC: u64 = 1_000_000_000;

fn proto_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    let control = engine.control();
    control.set_config(ConfigKey::Enabled, 1);
    control.set_config(ConfigKey::ProtoValidationEnable, 1);
    engine
}

/// DNS message: 12-byte header plus padding up to `pad_to`.
fn dns_payload(flags: u16, qdcount: u16, ancount: u16, pad_to: usize) -> Vec<u8> {
    let mut payload = vec![0u8; 12.max(pad_to)];
    payload[2..4].copy_from_slice(&flags.to_be_bytes());
    payload[4..6].copy_from_slice(&qdcount.to_be_bytes());
    payload[6..8].copy_from_slice(&ancount.to_be_bytes());
    payload
}

fn dns_frame(payload: Vec<u8>) -> Vec<u8> {
    udp_frame(UdpDatagram::new().with_ports(40000, 53).with_payload(payload))
}

// ============================================================================
// DNS
// ============================================================================

#[test]
fn dns_response_with_stacked_answers_is_amplification() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::DnsValidationMode, 1);
    let mut worker = engine.worker(0);

    let mut frame = dns_frame(dns_payload(0x8000, 1, 11, 64));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::DnsAmplification)
    );
    assert_eq!(engine.stats().dns_queries_blocked, 1);

    // Ten answers is still plausible.
    let mut frame = dns_frame(dns_payload(0x8000, 1, 10, 64));
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn strict_mode_rejects_multi_question_queries() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::DnsValidationMode, 2);
    let mut worker = engine.worker(0);

    let mut frame = dns_frame(dns_payload(0, 2, 0, 64));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ProtocolInvalid)
    );
}

#[test]
fn strict_mode_rejects_non_query_opcodes() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::DnsValidationMode, 2);
    let mut worker = engine.worker(0);

    // Opcode 4 (NOTIFY) in bits 14..11.
    let mut frame = dns_frame(dns_payload(4 << 11, 1, 0, 64));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ProtocolInvalid)
    );
}

#[test]
fn strict_mode_enforces_the_512_byte_query_limit() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::DnsValidationMode, 2);
    let mut worker = engine.worker(0);

    let mut frame = dns_frame(dns_payload(0, 1, 0, 600));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ProtocolInvalid)
    );

    let mut frame = dns_frame(dns_payload(0, 1, 0, 512));
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
    assert_eq!(engine.stats().dns_queries_validated, 1);
}

#[test]
fn basic_mode_leaves_queries_alone() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::DnsValidationMode, 1);
    let mut worker = engine.worker(0);

    // Multi-question query only matters in strict mode.
    let mut frame = dns_frame(dns_payload(0, 3, 0, 64));
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn dns_validation_off_ignores_responses() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = dns_frame(dns_payload(0x8000, 1, 50, 64));
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn registered_port_gets_dns_validation() {
    let engine = proto_engine();
    let control = engine.control();
    control.set_config(ConfigKey::DnsValidationMode, 1);
    control.register_port_protocol(5353, proto_bits::DNS);
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(40000, 5353)
            .with_payload(dns_payload(0x8000, 1, 11, 64)),
    );
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::DnsAmplification)
    );
}

// ============================================================================
// NTP
// ============================================================================

fn ntp_payload(mode: u8, len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    // LI=0, VN=4, mode in the low three bits.
    payload[0] = (4 << 3) | (mode & 0x07);
    payload
}

fn ntp_frame(payload: Vec<u8>) -> Vec<u8> {
    udp_frame(UdpDatagram::new().with_ports(40000, 123).with_payload(payload))
}

#[test]
fn ntp_monlist_is_always_dropped() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = ntp_frame(ntp_payload(7, 48));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::NtpAmplification)
    );
    assert_eq!(engine.stats().ntp_monlist_blocked, 1);
}

#[test]
fn ntp_control_requires_an_established_exchange() {
    let engine = proto_engine();
    engine.control().set_config(ConfigKey::ConntrackEnable, 1);
    let mut worker = engine.worker(0);

    // Unsolicited control query drops.
    let mut frame = ntp_frame(ntp_payload(6, 48));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::NtpAmplification)
    );

    // Client mode 3 poll creates the flow, the server's reply promotes
    // it to established.
    let mut poll = ntp_frame(ntp_payload(3, 48));
    assert_eq!(worker.process(&mut poll, 2 * SEC), Verdict::Pass);
    let mut reply = udp_frame_between(
        SERVER_IP,
        CLIENT_IP,
        UdpDatagram::new()
            .with_ports(123, 40000)
            .with_payload(ntp_payload(4, 48)),
    );
    assert_eq!(worker.process(&mut reply, 2 * SEC + 1), Verdict::Pass);
    assert_eq!(engine.stats().conntrack_established, 1);

    // Now the control query is part of a live exchange.
    let mut frame = ntp_frame(ntp_payload(6, 48));
    assert_eq!(worker.process(&mut frame, 2 * SEC + 2), Verdict::Pass);
}

#[test]
fn ntp_client_packets_must_carry_a_full_header() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = ntp_frame(ntp_payload(3, 47));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ProtocolInvalid)
    );

    let mut frame = ntp_frame(ntp_payload(3, 48));
    assert_eq!(worker.process(&mut frame, 2 * SEC), Verdict::Pass);
}

// ============================================================================
// SSDP
// ============================================================================

fn ssdp_frame(payload: &[u8]) -> Vec<u8> {
    udp_frame(
        UdpDatagram::new()
            .with_ports(40000, 1900)
            .with_payload(payload.to_vec()),
    )
}

#[test]
fn ssdp_response_shapes_are_dropped() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = ssdp_frame(b"HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\n");
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::SsdpAmplification)
    );

    let mut frame = ssdp_frame(b"NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n");
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::SsdpAmplification)
    );

    assert_eq!(engine.stats().ssdp_amp_dropped, 2);
}

#[test]
fn ssdp_search_requests_pass() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = ssdp_frame(b"M-SEARCH * HTTP/1.1\r\nMAN: \"ssdp:discover\"\r\n");
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

// ============================================================================
// Memcached
// ============================================================================

#[test]
fn udp_memcached_is_unconditionally_dropped() {
    let engine = proto_engine();
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(40000, 11211)
            .with_payload(b"get flood_key\r\n".to_vec()),
    );
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::MemcachedAmplification)
    );
    assert_eq!(engine.stats().memcached_amp_dropped, 1);
}

// ============================================================================
// TCP state machine
// ============================================================================

fn state_engine() -> Engine {
    let engine = proto_engine();
    let control = engine.control();
    control.set_config(ConfigKey::TcpStateEnable, 1);
    control.set_config(ConfigKey::ConntrackEnable, 1);
    engine
}

#[test]
fn untracked_ack_is_a_state_violation() {
    let engine = state_engine();
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_ACK));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::TcpState)
    );
    assert_eq!(engine.stats().tcp_state_dropped, 1);
}

#[test]
fn untracked_syn_and_rst_are_acceptable() {
    let engine = state_engine();
    let mut worker = engine.worker(0);

    let mut syn = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(worker.process(&mut syn, SEC), Verdict::Pass);

    let mut rst = tcp_frame_between(
        "10.0.0.7".parse().unwrap(),
        SERVER_IP,
        TcpSegment::new().with_flags(TCP_FLAG_RST),
    );
    assert_eq!(worker.process(&mut rst, SEC), Verdict::Pass);
}

#[test]
fn repeated_violations_cross_the_tolerance_window() {
    let engine = state_engine();
    let mut worker = engine.worker(0);

    // First SYN creates the flow (NEW -> SYN_SENT after conntrack).
    let mut syn = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(worker.process(&mut syn, SEC), Verdict::Pass);

    // SYN retransmissions against SYN_SENT are violations; three are
    // tolerated, the fourth drops.
    for i in 0..3 {
        let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
        assert_eq!(worker.process(&mut frame, SEC + i), Verdict::Pass);
    }
    let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(
        worker.process(&mut frame, 2 * SEC),
        Verdict::Drop(DropReason::TcpState)
    );
    assert_eq!(engine.stats().tcp_state_violations, 4);
}

#[test]
fn high_escalation_drops_on_the_second_violation() {
    let engine = state_engine();
    engine.control().set_escalation(EscalationLevel::High);
    let mut worker = engine.worker(0);

    let mut syn = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(worker.process(&mut syn, SEC), Verdict::Pass);

    let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(worker.process(&mut frame, SEC + 1), Verdict::Pass);

    let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(
        worker.process(&mut frame, SEC + 2),
        Verdict::Drop(DropReason::TcpState)
    );
}
