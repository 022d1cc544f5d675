//! Whitelist/blacklist behaviour and pipeline-ordering properties.

use packetshield_dataplane::{ConfigKey, DropReason, Engine, EngineConfig, Verdict};
use packetshield_dataplane_tests::*;
use pretty_assertions::assert_eq;

const SEC: u64 = 1_000_000_000;

fn enabled_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    engine.control().set_config(ConfigKey::Enabled, 1);
    engine
}

#[test]
fn blacklisted_source_is_dropped() {
    let engine = enabled_engine();
    let control = engine.control();
    control.load_blacklist(["10.0.0.0/24".parse().unwrap()]);
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::Blacklist)
    );
    assert_eq!(engine.stats().acl_dropped, 1);
}

#[test]
fn whitelist_overrides_blacklist() {
    let engine = enabled_engine();
    let control = engine.control();
    control.load_blacklist(["10.0.0.0/8".parse().unwrap()]);
    control.load_whitelist(["10.0.0.1/32".parse().unwrap()]);
    let mut worker = engine.worker(0);

    let mut frame = tcp_frame(TcpSegment::new());
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);
}

#[test]
fn blacklisted_source_never_passes_regardless_of_later_stages() {
    let engine = enabled_engine();
    let control = engine.control();
    control.load_blacklist(["10.0.0.1/32".parse().unwrap()]);
    // Later stages that would otherwise produce TX or PASS verdicts.
    control.set_config(ConfigKey::SynCookieEnable, 1);
    control.set_config(ConfigKey::ConntrackEnable, 1);
    let mut worker = engine.worker(0);

    // A SYN that the cookie stage would reflect.
    let mut frame = tcp_frame(TcpSegment::new().with_flags(TCP_FLAG_SYN));
    assert_eq!(
        worker.process(&mut frame, SEC),
        Verdict::Drop(DropReason::Blacklist)
    );

    // A benign UDP datagram.
    let mut frame = udp_frame(UdpDatagram::new().with_payload(vec![0; 10]));
    assert_eq!(
        worker.process(&mut frame, 2 * SEC),
        Verdict::Drop(DropReason::Blacklist)
    );
}

#[test]
fn whitelisted_source_bypasses_drop_stages() {
    let engine = enabled_engine();
    let control = engine.control();
    control.load_whitelist(["10.0.0.0/8".parse().unwrap()]);
    control.set_config(ConfigKey::ConntrackEnable, 1);
    control.set_config(ConfigKey::ProtoValidationEnable, 1);
    let mut worker = engine.worker(0);

    // Memcached over UDP would be dropped unconditionally otherwise.
    let mut frame = udp_frame(
        UdpDatagram::new()
            .with_ports(40000, 11211)
            .with_payload(vec![0; 32]),
    );
    assert_eq!(worker.process(&mut frame, SEC), Verdict::Pass);

    // Conntrack still saw the flow.
    assert_eq!(engine.stats().conntrack_new, 1);
    assert_eq!(engine.stats().memcached_amp_dropped, 0);
}

#[test]
fn longest_prefix_decides_between_conflicting_entries() {
    let engine = enabled_engine();
    let control = engine.control();
    // Blanket blacklist with a narrow whitelisted host inside it.
    control.load_blacklist(["10.0.0.0/8".parse().unwrap()]);
    control.load_whitelist(["10.0.0.1/32".parse().unwrap()]);
    let mut worker = engine.worker(0);

    let mut ok = tcp_frame(TcpSegment::new());
    assert_eq!(worker.process(&mut ok, SEC), Verdict::Pass);

    let mut blocked = tcp_frame_between(
        "10.0.0.2".parse().unwrap(),
        SERVER_IP,
        TcpSegment::new(),
    );
    assert_eq!(
        worker.process(&mut blocked, SEC),
        Verdict::Drop(DropReason::Blacklist)
    );
}
