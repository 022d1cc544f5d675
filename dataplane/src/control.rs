//! Control-plane handle.
//!
//! The write side of every shared table: configuration keys, ACL and
//! policy tries, signature and payload-rule arrays, the port-protocol
//! map and the SYN-cookie seed pair. All mutations publish by replace: a
//! private clone is updated and swapped in whole, so data-path readers
//! only ever observe complete tables. Writers are serialized by an
//! internal mutex and never contend with the packet path.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use tracing::{debug, info};

use crate::config::{ConfigKey, EscalationLevel};
use crate::cookie::SynCookieSeeds;
use crate::engine::SharedState;
use crate::error::ControlError;
use crate::tables::{
    AttackSignature, GeoAction, GeoEntry, Ipv4LpmTable, PayloadRule, PayloadRuleTable,
    SignatureTable, ThreatIntelEntry, MAX_PAYLOAD_RULES, MAX_SIGNATURES,
};

#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<SharedState>,
}

impl ControlHandle {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn set_config(&self, key: ConfigKey, value: u64) {
        debug!(?key, value, "config write");
        self.shared.config.set(key, value);
    }

    pub fn get_config(&self, key: ConfigKey) -> u64 {
        self.shared.config.get(key)
    }

    pub fn set_escalation(&self, level: EscalationLevel) {
        info!(?level, "escalation level change");
        self.shared
            .config
            .set(ConfigKey::EscalationLevel, level.as_raw());
    }

    // ========================================================================
    // ACL tries
    // ========================================================================

    pub fn load_whitelist(&self, prefixes: impl IntoIterator<Item = Ipv4Network>) {
        let _guard = self.shared.control_mutex.lock();
        let table = Ipv4LpmTable::from_entries(prefixes.into_iter().map(|net| (net, ())));
        info!(entries = table.len(), "whitelist loaded");
        self.shared.whitelist.store(Arc::new(table));
    }

    pub fn insert_whitelist(&self, prefix: Ipv4Network) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.whitelist.load()).clone();
        table.insert(prefix, ());
        self.shared.whitelist.store(Arc::new(table));
    }

    pub fn remove_whitelist(&self, prefix: Ipv4Network) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.whitelist.load()).clone();
        table.remove(prefix);
        self.shared.whitelist.store(Arc::new(table));
    }

    pub fn load_blacklist(&self, prefixes: impl IntoIterator<Item = Ipv4Network>) {
        let _guard = self.shared.control_mutex.lock();
        let table = Ipv4LpmTable::from_entries(prefixes.into_iter().map(|net| (net, ())));
        info!(entries = table.len(), "blacklist loaded");
        self.shared.blacklist.store(Arc::new(table));
    }

    pub fn insert_blacklist(&self, prefix: Ipv4Network) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.blacklist.load()).clone();
        table.insert(prefix, ());
        self.shared.blacklist.store(Arc::new(table));
    }

    pub fn remove_blacklist(&self, prefix: Ipv4Network) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.blacklist.load()).clone();
        table.remove(prefix);
        self.shared.blacklist.store(Arc::new(table));
    }

    // ========================================================================
    // GeoIP
    // ========================================================================

    pub fn load_geoip(&self, entries: impl IntoIterator<Item = (Ipv4Network, GeoEntry)>) {
        let _guard = self.shared.control_mutex.lock();
        let table = Ipv4LpmTable::from_entries(entries);
        info!(entries = table.len(), "geoip database loaded");
        self.shared.geoip.store(Arc::new(table));
    }

    pub fn insert_geoip(&self, prefix: Ipv4Network, entry: GeoEntry) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.geoip.load()).clone();
        table.insert(prefix, entry);
        self.shared.geoip.store(Arc::new(table));
    }

    pub fn set_country_policy(&self, country: u16, action: GeoAction) {
        let _guard = self.shared.control_mutex.lock();
        let mut policy = (**self.shared.country_policy.load()).clone();
        policy.insert(country, action);
        self.shared.country_policy.store(Arc::new(policy));
    }

    pub fn clear_country_policy(&self, country: u16) {
        let _guard = self.shared.control_mutex.lock();
        let mut policy = (**self.shared.country_policy.load()).clone();
        policy.remove(&country);
        self.shared.country_policy.store(Arc::new(policy));
    }

    // ========================================================================
    // Threat intelligence
    // ========================================================================

    pub fn load_threat_intel(
        &self,
        entries: impl IntoIterator<Item = (Ipv4Network, ThreatIntelEntry)>,
    ) {
        let _guard = self.shared.control_mutex.lock();
        let table = Ipv4LpmTable::from_entries(entries);
        info!(entries = table.len(), "threat intel feed loaded");
        self.shared.threat_intel.store(Arc::new(table));
    }

    pub fn insert_threat_intel(&self, prefix: Ipv4Network, entry: ThreatIntelEntry) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.threat_intel.load()).clone();
        table.insert(prefix, entry);
        self.shared.threat_intel.store(Arc::new(table));
    }

    pub fn remove_threat_intel(&self, prefix: Ipv4Network) {
        let _guard = self.shared.control_mutex.lock();
        let mut table = (**self.shared.threat_intel.load()).clone();
        table.remove(prefix);
        self.shared.threat_intel.store(Arc::new(table));
    }

    // ========================================================================
    // GRE tunnels
    // ========================================================================

    pub fn load_gre_tunnels(&self, entries: impl IntoIterator<Item = (Ipv4Network, Ipv4Addr)>) {
        let _guard = self.shared.control_mutex.lock();
        let table = Ipv4LpmTable::from_entries(entries);
        info!(entries = table.len(), "gre tunnel table loaded");
        self.shared.gre_tunnels.store(Arc::new(table));
    }

    // ========================================================================
    // Port-protocol registrations
    // ========================================================================

    /// Register protocol bits (see [`crate::tables::proto_bits`]) for a
    /// non-well-known port.
    pub fn register_port_protocol(&self, port: u16, bits: u32) {
        let _guard = self.shared.control_mutex.lock();
        let mut map = (**self.shared.port_protocols.load()).clone();
        map.insert(port, bits);
        self.shared.port_protocols.store(Arc::new(map));
    }

    pub fn clear_port_protocol(&self, port: u16) {
        let _guard = self.shared.control_mutex.lock();
        let mut map = (**self.shared.port_protocols.load()).clone();
        map.remove(&port);
        self.shared.port_protocols.store(Arc::new(map));
    }

    // ========================================================================
    // Signatures and payload rules
    // ========================================================================

    /// Replace the attack-signature array.
    pub fn install_signatures(
        &self,
        signatures: Vec<AttackSignature>,
    ) -> Result<(), ControlError> {
        if signatures.len() > MAX_SIGNATURES {
            return Err(ControlError::TooManySignatures {
                count: signatures.len(),
                max: MAX_SIGNATURES,
            });
        }
        let _guard = self.shared.control_mutex.lock();
        info!(count = signatures.len(), "attack signatures installed");
        self.shared
            .signatures
            .store(Arc::new(SignatureTable::new(signatures)));
        Ok(())
    }

    /// Replace the payload-rule array. Hit counters restart at zero for
    /// the new table.
    pub fn install_payload_rules(&self, rules: Vec<PayloadRule>) -> Result<(), ControlError> {
        if rules.len() > MAX_PAYLOAD_RULES {
            return Err(ControlError::TooManyPayloadRules {
                count: rules.len(),
                max: MAX_PAYLOAD_RULES,
            });
        }
        let _guard = self.shared.control_mutex.lock();
        info!(count = rules.len(), "payload rules installed");
        self.shared
            .payload_rules
            .store(Arc::new(PayloadRuleTable::new(rules)));
        Ok(())
    }

    /// Hit count of a currently-published payload rule.
    pub fn payload_rule_hits(&self, rule_id: u32) -> Option<u64> {
        self.shared
            .payload_rules
            .load()
            .iter()
            .find(|rule| rule.rule_id() == rule_id)
            .map(|rule| rule.hit_count())
    }

    // ========================================================================
    // SYN-cookie seeds
    // ========================================================================

    /// Rotate the cookie seed: current becomes previous, `seed` becomes
    /// current. Run at least every few minutes under SYN pressure.
    pub fn rotate_syn_cookie_seed(&self, seed: u32, now_ns: u64) {
        let _guard = self.shared.control_mutex.lock();
        let rotated = self.shared.syn_cookie.load().rotated(seed, now_ns);
        debug!("syn cookie seed rotated");
        self.shared.syn_cookie.store(Arc::new(rotated));
    }

    /// Rotate with a randomly drawn seed.
    pub fn rotate_syn_cookie_seed_random(&self, now_ns: u64) {
        self.rotate_syn_cookie_seed(rand::random::<u32>(), now_ns);
    }

    pub fn syn_cookie_seeds(&self) -> SynCookieSeeds {
        **self.shared.syn_cookie.load()
    }

    // ========================================================================
    // Adaptive overrides
    // ========================================================================

    /// Pin a per-source rate override, as the anomaly detector would.
    pub fn set_adaptive_override(&self, src: Ipv4Addr, rate_pps: u64) {
        self.shared.adaptive_rates.insert(src, rate_pps);
    }

    pub fn clear_adaptive_override(&self, src: Ipv4Addr) {
        self.shared.adaptive_rates.remove(&src);
    }

    pub fn adaptive_override(&self, src: Ipv4Addr) -> Option<u64> {
        self.shared.adaptive_rates.get(&src).map(|entry| *entry)
    }
}
