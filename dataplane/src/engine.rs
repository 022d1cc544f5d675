//! Engine and workers: shared state plus the ordered stage walk.
//!
//! An [`Engine`] owns everything the control plane publishes and the
//! per-core statistics blocks. Each [`Worker`] handles packets end to end
//! on one core: it holds its own LRU shards (conntrack, rate limiters,
//! reputation, port-scan) and never blocks, suspends or locks on the
//! packet path.

use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::sync::Arc;

use ahash::{AHashMap, RandomState};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::{ConfigKey, ConfigStore};
use crate::cookie::SynCookieSeeds;
use crate::events::{EventAction, EventRecord, EventRing};
use crate::parser::{self, PacketContext};
use crate::stages::{self, AclDecision, StageCtx, StageVerdict};
use crate::stats::{CoreStats, StatsSnapshot};
use crate::tables::{
    ConntrackTable, GeoAction, GeoEntry, Ipv4LpmTable, PayloadRuleTable, PortScanTable,
    ReputationTable, SignatureTable, ThreatIntelEntry, TokenBucket,
};
use crate::verdict::{AttackType, DropReason, Verdict};

/// Sizing knobs for one engine. Per-core table capacities bound each
/// worker's shard independently; eviction is LRU within a shard.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of workers; one per core.
    pub cores: usize,
    pub conntrack_capacity: usize,
    pub rate_limiter_capacity: usize,
    pub reputation_capacity: usize,
    pub port_scan_capacity: usize,
    /// Event-ring capacity shared by all workers.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cores: 1,
            conntrack_capacity: 1 << 16,
            rate_limiter_capacity: 1 << 16,
            reputation_capacity: 1 << 16,
            port_scan_capacity: 1 << 16,
            event_capacity: 1 << 14,
        }
    }
}

/// State shared by all workers. Control-plane-published tables are
/// snapshots behind `ArcSwap`; data-path reads are wait-free and tolerate
/// observing either side of an update.
pub(crate) struct SharedState {
    pub config: ConfigStore,
    pub whitelist: ArcSwap<Ipv4LpmTable<()>>,
    pub blacklist: ArcSwap<Ipv4LpmTable<()>>,
    pub geoip: ArcSwap<Ipv4LpmTable<GeoEntry>>,
    pub threat_intel: ArcSwap<Ipv4LpmTable<ThreatIntelEntry>>,
    pub gre_tunnels: ArcSwap<Ipv4LpmTable<Ipv4Addr>>,
    pub country_policy: ArcSwap<AHashMap<u16, GeoAction>>,
    pub port_protocols: ArcSwap<AHashMap<u16, u32>>,
    pub signatures: ArcSwap<SignatureTable>,
    pub payload_rules: ArcSwap<PayloadRuleTable>,
    pub syn_cookie: ArcSwap<SynCookieSeeds>,
    /// Source IP -> tightened PPS limit, installed by policy stages.
    pub adaptive_rates: DashMap<Ipv4Addr, u64, RandomState>,
    pub events: EventRing,
    pub core_stats: Vec<Arc<CoreStats>>,
    /// Serializes control-plane writers; never touched on the packet path.
    pub control_mutex: Mutex<()>,
}

/// One worker's private tables.
pub(crate) struct CoreTables {
    pub conntrack: ConntrackTable,
    pub rate_limiters: LruCache<Ipv4Addr, TokenBucket>,
    pub reputation: ReputationTable,
    pub port_scan: PortScanTable,
    pub global_pps: TokenBucket,
    pub global_bps: TokenBucket,
}

impl CoreTables {
    fn new(config: &EngineConfig) -> Self {
        Self {
            conntrack: ConntrackTable::new(config.conntrack_capacity),
            rate_limiters: LruCache::new(
                NonZeroUsize::new(config.rate_limiter_capacity.max(1)).unwrap(),
            ),
            reputation: ReputationTable::new(config.reputation_capacity),
            port_scan: PortScanTable::new(config.port_scan_capacity),
            global_pps: TokenBucket::unconfigured(),
            global_bps: TokenBucket::unconfigured(),
        }
    }
}

/// The scrubbing engine: construct once, hand a [`Worker`] to each core
/// and a [`crate::ControlHandle`] to the control channel.
pub struct Engine {
    shared: Arc<SharedState>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let shared = SharedState {
            config: ConfigStore::new(),
            whitelist: ArcSwap::from_pointee(Ipv4LpmTable::new()),
            blacklist: ArcSwap::from_pointee(Ipv4LpmTable::new()),
            geoip: ArcSwap::from_pointee(Ipv4LpmTable::new()),
            threat_intel: ArcSwap::from_pointee(Ipv4LpmTable::new()),
            gre_tunnels: ArcSwap::from_pointee(Ipv4LpmTable::new()),
            country_policy: ArcSwap::from_pointee(AHashMap::new()),
            port_protocols: ArcSwap::from_pointee(AHashMap::new()),
            signatures: ArcSwap::from_pointee(SignatureTable::default()),
            payload_rules: ArcSwap::from_pointee(PayloadRuleTable::default()),
            syn_cookie: ArcSwap::from_pointee(SynCookieSeeds::new(0, 0)),
            adaptive_rates: DashMap::with_hasher(RandomState::new()),
            events: EventRing::new(config.event_capacity),
            core_stats: (0..config.cores.max(1))
                .map(|_| Arc::new(CoreStats::new()))
                .collect(),
            control_mutex: Mutex::new(()),
        };
        Self {
            shared: Arc::new(shared),
            config,
        }
    }

    /// Control-plane handle; any number may coexist, writes are
    /// serialized internally.
    pub fn control(&self) -> crate::control::ControlHandle {
        crate::control::ControlHandle::new(self.shared.clone())
    }

    /// Build the worker for `core`. One worker per core: the per-core
    /// shards belong to the returned value.
    ///
    /// # Panics
    ///
    /// Panics when `core` is outside the configured core count.
    pub fn worker(&self, core: usize) -> Worker {
        let stats = self
            .shared
            .core_stats
            .get(core)
            .unwrap_or_else(|| panic!("core {core} out of range"))
            .clone();
        Worker {
            shared: self.shared.clone(),
            stats,
            tables: CoreTables::new(&self.config),
            core,
        }
    }

    pub fn cores(&self) -> usize {
        self.config.cores.max(1)
    }

    /// Aggregate statistics across all cores.
    pub fn stats(&self) -> StatsSnapshot {
        let mut total = StatsSnapshot::default();
        for core in &self.shared.core_stats {
            total.merge(&core.snapshot());
        }
        total
    }

    /// One core's statistics.
    pub fn core_stats(&self, core: usize) -> Option<StatsSnapshot> {
        self.shared.core_stats.get(core).map(|s| s.snapshot())
    }

    /// Drain one telemetry event; collectors poll this continuously.
    pub fn poll_event(&self) -> Option<EventRecord> {
        self.shared.events.pop()
    }

    pub fn pending_events(&self) -> usize {
        self.shared.events.len()
    }

    /// GRE tunnel endpoint for a destination, for host-glue re-injection.
    pub fn gre_endpoint(&self, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        self.shared.gre_tunnels.load().lookup(dst).copied()
    }
}

/// Per-core packet handler. Each frame is processed end to end without
/// suspension; the buffer is exclusively owned for the duration of the
/// call and is only mutated on the SYN-cookie reflection path.
pub struct Worker {
    shared: Arc<SharedState>,
    stats: Arc<CoreStats>,
    tables: CoreTables,
    core: usize,
}

impl Worker {
    pub fn core(&self) -> usize {
        self.core
    }

    /// Walk one frame through the pipeline and return its verdict.
    ///
    /// `now_ns` comes from the host's monotonic time source. On a `Tx`
    /// verdict the frame has been rewritten in place into the reply to
    /// transmit.
    pub fn process(&mut self, frame: &mut [u8], now_ns: u64) -> Verdict {
        let shared = self.shared.as_ref();
        if shared.config.get(ConfigKey::Enabled) == 0 {
            return Verdict::Pass;
        }

        // ---- Stage 1: Parse ----
        let pkt = match parser::parse(frame) {
            Ok(pkt) => pkt,
            Err(error) => {
                self.stats.count_drop(0);
                shared.events.emit(parse_failure_event(now_ns, shared));
                trace!(%error, "frame rejected by parser");
                return Verdict::Drop(DropReason::ParseError);
            }
        };
        self.stats.count_rx(pkt.pkt_len);

        let ctx = StageCtx {
            shared,
            stats: self.stats.as_ref(),
            now_ns,
        };
        let pkt = &pkt;

        // ---- Stage 2: ACL ----
        match stages::acl::check(&ctx, pkt) {
            AclDecision::Drop => {
                self.stats.count_drop(pkt.pkt_len);
                trace!(src = %pkt.src_ip, "blacklisted source dropped");
                return Verdict::Drop(DropReason::Blacklist);
            }
            AclDecision::Whitelisted => {
                // Whitelisted traffic bypasses the drop stages but still
                // updates conntrack so return flows stay visible.
                stages::conntrack::update(&ctx, &mut self.tables, pkt, true);
                self.stats.count_tx(pkt.pkt_len);
                return Verdict::Pass;
            }
            AclDecision::Pass => {}
        }

        // ---- Stages 3-14: drop stages in dependency order ----
        if let Some(out) = settle(&self.stats, pkt, stages::threat_intel::check(&ctx, pkt)) {
            return out;
        }
        if let Some(out) = settle(&self.stats, pkt, stages::geoip::check(&ctx, pkt)) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::reputation::check(&ctx, &mut self.tables, pkt),
        ) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::fragment::check(&ctx, &mut self.tables, pkt),
        ) {
            return out;
        }
        if let Some(out) = settle(&self.stats, pkt, stages::fingerprint::check(&ctx, pkt)) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::payload_match::check(
                &ctx,
                &mut self.tables,
                pkt,
                &crate::frame::FrameView::new(frame),
            ),
        ) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::proto_validator::check(
                &ctx,
                &mut self.tables,
                pkt,
                &crate::frame::FrameView::new(frame),
            ),
        ) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::syn_flood::check(&ctx, &mut self.tables, pkt, &mut *frame),
        ) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::ack_flood::check(&ctx, &mut self.tables, pkt),
        ) {
            return out;
        }
        if let Some(out) = settle(&self.stats, pkt, stages::udp_flood::check(&ctx, pkt)) {
            return out;
        }
        if let Some(out) = settle(&self.stats, pkt, stages::icmp_flood::check(&ctx, pkt)) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::rate_limiter::per_source(&ctx, &mut self.tables, pkt),
        ) {
            return out;
        }
        if let Some(out) = settle(
            &self.stats,
            pkt,
            stages::rate_limiter::global(&ctx, &mut self.tables, pkt),
        ) {
            return out;
        }

        // ---- Stage 15: conntrack closes the pipeline ----
        stages::conntrack::update(&ctx, &mut self.tables, pkt, false);

        self.stats.count_tx(pkt.pkt_len);
        Verdict::Pass
    }
}

/// Fold a stage verdict into the walk: account for terminal verdicts and
/// return the final [`Verdict`], or `None` to continue.
fn settle(stats: &CoreStats, pkt: &PacketContext, verdict: StageVerdict) -> Option<Verdict> {
    match verdict {
        StageVerdict::Pass => None,
        StageVerdict::Drop(reason) => {
            stats.count_drop(pkt.pkt_len);
            trace!(?reason, src = %pkt.src_ip, "packet dropped");
            Some(Verdict::Drop(reason))
        }
        StageVerdict::Tx => {
            stats.count_tx(pkt.pkt_len);
            Some(Verdict::Tx)
        }
    }
}

/// The one event the pipeline emits without a parsed packet.
fn parse_failure_event(now_ns: u64, shared: &SharedState) -> EventRecord {
    EventRecord {
        timestamp_ns: now_ns,
        src_ip: Ipv4Addr::UNSPECIFIED,
        dst_ip: Ipv4Addr::UNSPECIFIED,
        src_port: 0,
        dst_port: 0,
        protocol: 0,
        attack_type: AttackType::None,
        action: EventAction::Drop,
        drop_reason: Some(DropReason::ParseError),
        pps_estimate: 0,
        bps_estimate: 0,
        reputation_score: 0,
        country_code: 0,
        escalation_level: shared.config.escalation(),
    }
}
