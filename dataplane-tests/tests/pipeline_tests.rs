//! End-to-end verdict scenarios for the stage walk.

use packetshield_dataplane::{ConfigKey, DropReason, Engine, EngineConfig, EventAction, Verdict};
use packetshield_dataplane_tests::*;
use pretty_assertions::assert_eq;

const SEC: u64 = 1_000_000_000;

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
}

fn enabled_engine() -> Engine {
    let engine = engine();
    engine.control().set_config(ConfigKey::Enabled, 1);
    engine
}

#[test]
fn disabled_scrubber_passes_everything() {
    let engine = engine();
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);

    // Disabled means untouched: not even rx counters move.
    assert_eq!(engine.stats().rx_packets, 0);
}

#[test]
fn plain_tcp_syn_passes() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);

    let stats = engine.stats();
    assert_eq!(stats.rx_packets, 1);
    assert_eq!(stats.rx_bytes, 40);
    assert_eq!(stats.dropped_packets, 0);
}

#[test]
fn plain_udp_passes() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(UdpDatagram::new().with_payload(vec![0; 10]));
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn icmp_echo_request_passes() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = icmp_frame(IcmpMessage::echo_request());
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn truncated_frame_is_a_parse_error() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    // Ethernet header only, h_proto claims IPv4.
    let mut frame = EthFrame::new().build();
    assert_eq!(frame.len(), 14);
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ParseError)
    );

    let stats = engine.stats();
    assert_eq!(stats.dropped_packets, 1);
    assert_eq!(stats.rx_packets, 0);

    let event = engine.poll_event().expect("parse failure event");
    assert_eq!(event.drop_reason, Some(DropReason::ParseError));
    assert_eq!(event.action, EventAction::Drop);
}

#[test]
fn non_ipv4_frame_is_a_parse_error() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = EthFrame::new()
        .with_ethertype(ETH_P_IPV6)
        .with_payload(vec![0xA5; 64])
        .build();
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::ParseError)
    );
}

#[test]
fn fragments_are_dropped() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    // First fragment: MF set, offset 0, L4 still parseable.
    let mut frame = EthFrame::new()
        .with_payload(
            Ipv4Packet::new()
                .with_more_fragments()
                .with_payload(TcpSegment::new().build())
                .build(),
        )
        .build();
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::Fragment)
    );

    // Non-first fragment: no L4, still dropped.
    let mut frame = EthFrame::new()
        .with_payload(
            Ipv4Packet::new()
                .with_fragment_offset(16)
                .with_payload(vec![0; 32])
                .build(),
        )
        .build();
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::Fragment)
    );

    assert_eq!(engine.stats().fragment_dropped, 2);
}

#[test]
fn dns_amplification_response_is_dropped() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(53, 12345)
            .with_payload(vec![0; 600]),
    );
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::DnsAmplification)
    );
    assert_eq!(engine.stats().dns_amp_dropped, 1);
}

#[test]
fn ntp_amplification_response_is_dropped() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(123, 12345)
            .with_payload(vec![0; 500]),
    );
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::NtpAmplification)
    );
    assert_eq!(engine.stats().ntp_amp_dropped, 1);
}

#[test]
fn drop_emits_exactly_one_event() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(53, 12345)
            .with_payload(vec![0; 600]),
    );
    worker.process(&mut frame, SEC);

    let event = engine.poll_event().expect("drop event");
    assert_eq!(event.drop_reason, Some(DropReason::DnsAmplification));
    assert_eq!(event.src_ip, CLIENT_IP);
    assert_eq!(event.dst_ip, SERVER_IP);
    assert_eq!(event.src_port, 53);
    assert_eq!(event.dst_port, 12345);
    assert_eq!(event.pps_estimate, 0);
    assert_eq!(event.bps_estimate, 0);
    assert!(engine.poll_event().is_none());
}

#[test]
fn passed_traffic_counts_as_forwarded() {
    let engine = enabled_engine();
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    worker.process(&mut frame, SEC);

    let stats = engine.stats();
    assert_eq!(stats.tx_packets, 1);
    assert_eq!(stats.tx_bytes, 40);
}

#[test]
fn per_core_stats_aggregate_at_read_time() {
    let engine = enabled_engine();
    let mut worker_a = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    worker_a.process(&mut frame, SEC);

    assert_eq!(engine.core_stats(0).unwrap().rx_packets, 1);
    assert_eq!(engine.stats().rx_packets, 1);
}
