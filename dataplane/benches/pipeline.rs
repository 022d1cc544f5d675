use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use packetshield_dataplane::{ConfigKey, Engine, EngineConfig};

fn tcp_syn_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(54);
    frame.extend_from_slice(&[0x22; 6]);
    frame.extend_from_slice(&[0x11; 6]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    let mut ip = [0u8; 20];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&40u16.to_be_bytes());
    ip[8] = 64;
    ip[9] = 6;
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[192, 168, 1, 1]);
    frame.extend_from_slice(&ip);

    let mut tcp = [0u8; 20];
    tcp[0..2].copy_from_slice(&12345u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
    tcp[4..8].copy_from_slice(&1000u32.to_be_bytes());
    tcp[12] = 5 << 4;
    tcp[13] = 0x02; // SYN
    frame.extend_from_slice(&tcp);
    frame
}

fn udp_frame(payload_len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(42 + payload_len);
    frame.extend_from_slice(&[0x22; 6]);
    frame.extend_from_slice(&[0x11; 6]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());

    let mut ip = [0u8; 20];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&((28 + payload_len) as u16).to_be_bytes());
    ip[8] = 64;
    ip[9] = 17;
    ip[12..16].copy_from_slice(&[10, 0, 0, 2]);
    ip[16..20].copy_from_slice(&[192, 168, 1, 1]);
    frame.extend_from_slice(&ip);

    let mut udp = [0u8; 8];
    udp[0..2].copy_from_slice(&54321u16.to_be_bytes());
    udp[2..4].copy_from_slice(&443u16.to_be_bytes());
    udp[4..6].copy_from_slice(&((8 + payload_len) as u16).to_be_bytes());
    frame.extend_from_slice(&udp);
    frame.resize(42 + payload_len, 0);
    frame
}

fn bench_pipeline(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default());
    let control = engine.control();
    control.set_config(ConfigKey::Enabled, 1);
    control.set_config(ConfigKey::ConntrackEnable, 1);
    control.set_config(ConfigKey::ProtoValidationEnable, 1);
    control.set_config(ConfigKey::TcpStateEnable, 1);
    control.set_config(ConfigKey::SynRatePps, 1_000_000);
    control.set_config(ConfigKey::UdpRatePps, 1_000_000);

    let mut worker = engine.worker(0);

    c.bench_function("pipeline_tcp_syn", |b| {
        let template = tcp_syn_frame();
        let mut now: u64 = 1;
        b.iter(|| {
            let mut frame = template.clone();
            now += 1_000;
            black_box(worker.process(black_box(&mut frame), now))
        })
    });

    c.bench_function("pipeline_udp_small", |b| {
        let template = udp_frame(64);
        let mut now: u64 = 1;
        b.iter(|| {
            let mut frame = template.clone();
            now += 1_000;
            black_box(worker.process(black_box(&mut frame), now))
        })
    });

    c.bench_function("parser_only", |b| {
        let frame = tcp_syn_frame();
        b.iter(|| black_box(packetshield_dataplane::parse(black_box(&frame))))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
