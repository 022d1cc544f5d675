//! SYN-cookie challenge/response: reflection, validation, rotation.

use packetshield_dataplane::{ConfigKey, DropReason, Engine, EngineConfig, Verdict};
use packetshield_dataplane_tests::*;
use pretty_assertions::assert_eq;

const SEC: u64 = 1_000_000_000;

const ETH_LEN: usize = 14;
const IP_OFF: usize = ETH_LEN;
const TCP_OFF: usize = ETH_LEN + 20;

fn cookie_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    let control = engine.control();
    control.set_config(ConfigKey::Enabled, 1);
    control.set_config(ConfigKey::SynCookieEnable, 1);
    control.set_config(ConfigKey::ConntrackEnable, 1);
    control.rotate_syn_cookie_seed(0x5eed_0001, 0);
    engine
}

fn syn() -> Vec<u8> {
    tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN).with_seq(1000))
}

fn ack_answering(cookie: u32) -> Vec<u8> {
    tcp_frame(
        TcpSegment::new()
            .with_flags(TCP_FLAG_ACK)
            .with_seq(1001)
            .with_ack_seq(cookie.wrapping_add(1)),
    )
}

/// Reflect a SYN and return the rewritten frame.
fn reflect(worker: &mut packetshield_dataplane::Worker, now: u64) -> Vec<u8> {
    let mut frame = syn();
    assert_eq!(worker.process(&mut frame, now), Verdict::Tx);
    frame
}

fn cookie_of(reply: &[u8]) -> u32 {
    u32::from_be_bytes(reply[TCP_OFF + 4..TCP_OFF + 8].try_into().unwrap())
}

#[test]
fn syn_is_reflected_as_syn_ack() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);

    // Ethernet addresses swapped.
    assert_eq!(&reply[0..6], &[0x11; 6]);
    assert_eq!(&reply[6..12], &[0x22; 6]);

    // IP addresses swapped, id zeroed, TTL restamped.
    assert_eq!(&reply[IP_OFF + 12..IP_OFF + 16], &SERVER_IP.octets());
    assert_eq!(&reply[IP_OFF + 16..IP_OFF + 20], &CLIENT_IP.octets());
    assert_eq!(&reply[IP_OFF + 4..IP_OFF + 6], &[0, 0]);
    assert_eq!(reply[IP_OFF + 8], 64);

    // TCP ports swapped, SYN+ACK raised, window advertised, client ISN
    // acknowledged.
    assert_eq!(&reply[TCP_OFF..TCP_OFF + 2], &80u16.to_be_bytes());
    assert_eq!(&reply[TCP_OFF + 2..TCP_OFF + 4], &12345u16.to_be_bytes());
    assert_eq!(reply[TCP_OFF + 13], TCP_FLAG_SYN | TCP_FLAG_ACK);
    assert_eq!(&reply[TCP_OFF + 14..TCP_OFF + 16], &65535u16.to_be_bytes());
    assert_eq!(
        &reply[TCP_OFF + 8..TCP_OFF + 12],
        &1001u32.to_be_bytes(),
        "ack must be client seq + 1"
    );

    // TCP checksum cleared for hardware offload.
    assert_eq!(&reply[TCP_OFF + 16..TCP_OFF + 18], &[0, 0]);

    assert_eq!(engine.stats().syn_cookies_sent, 1);
    assert_eq!(engine.stats().tx_packets, 1);
}

#[test]
fn reflected_ip_header_checksum_verifies() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);

    let mut sum: u32 = 0;
    for i in 0..10 {
        let word = u16::from_be_bytes(reply[IP_OFF + i * 2..IP_OFF + i * 2 + 2].try_into().unwrap());
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    assert_eq!(sum, 0xffff, "ones-complement sum over a valid header");
}

#[test]
fn ack_with_valid_cookie_is_accepted_once_and_tracked() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);
    let cookie = cookie_of(&reply);

    let mut ack = ack_answering(cookie);
    assert_eq!(worker.process(&mut ack, SEC + 1), Verdict::Pass);
    assert_eq!(engine.stats().syn_cookies_validated, 1);

    // Follow-up ACKs ride the established entry, not the cookie path.
    let mut ack = ack_answering(cookie);
    assert_eq!(worker.process(&mut ack, SEC + 2), Verdict::Pass);
    assert_eq!(engine.stats().syn_cookies_validated, 1);
    assert_eq!(engine.stats().syn_cookies_failed, 0);
}

#[test]
fn ack_without_cookie_or_flow_is_the_flood() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    let mut ack = ack_answering(0xbad_cafe);
    assert_eq!(
        worker.process(&mut ack, SEC),
        Verdict::Drop(DropReason::SynFlood)
    );
    assert_eq!(engine.stats().syn_cookies_failed, 1);
}

#[test]
fn cookie_survives_one_seed_rotation() {
    let engine = cookie_engine();
    let control = engine.control();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);
    let cookie = cookie_of(&reply);

    control.rotate_syn_cookie_seed(0x5eed_0002, 2 * SEC);

    let mut ack = ack_answering(cookie);
    assert_eq!(worker.process(&mut ack, 2 * SEC), Verdict::Pass);
    assert_eq!(engine.stats().syn_cookies_validated, 1);
}

#[test]
fn cookie_expires_after_two_seed_rotations() {
    let engine = cookie_engine();
    let control = engine.control();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);
    let cookie = cookie_of(&reply);

    control.rotate_syn_cookie_seed(0x5eed_0002, 2 * SEC);
    control.rotate_syn_cookie_seed(0x5eed_0003, 3 * SEC);

    let mut ack = ack_answering(cookie);
    assert_eq!(
        worker.process(&mut ack, 3 * SEC),
        Verdict::Drop(DropReason::SynFlood)
    );
    assert_eq!(engine.stats().syn_cookies_failed, 1);
}

#[test]
fn cookie_is_tuple_bound() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    let reply = reflect(&mut worker, SEC);
    let cookie = cookie_of(&reply);

    // Same cookie from a different source port answers nothing.
    let mut ack = tcp_frame(
        TcpSegment::new()
            .with_ports(12346, 80)
            .with_flags(TCP_FLAG_ACK)
            .with_ack_seq(cookie.wrapping_add(1)),
    );
    assert_eq!(
        worker.process(&mut ack, SEC + 1),
        Verdict::Drop(DropReason::SynFlood)
    );
}

#[test]
fn syn_cookie_disabled_leaves_syns_alone() {
    let engine = Engine::new(EngineConfig::default());
    engine.control().set_config(ConfigKey::Enabled, 1);
    let mut worker = engine.worker(0);

    let mut frame = syn();
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
    assert_eq!(engine.stats().syn_cookies_sent, 0);
}

#[test]
fn tx_accounts_bytes_in_tx_counters() {
    let engine = cookie_engine();
    let mut worker = engine.worker(0);

    reflect(&mut worker, SEC);
    let stats = engine.stats();
    assert_eq!(stats.tx_packets, 1);
    assert_eq!(stats.tx_bytes, 40);
    assert_eq!(stats.dropped_packets, 0);
}
