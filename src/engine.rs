/// The capture engine: one owned instance holding every store, both
/// schedulers, the skip-list and the exporter.
///
/// The platform calls [`CaptureEngine::tick`] from its main loop. Each tick
/// drains what the radio callback posted through the [`Bridge`], folds it
/// into the stores, runs the current mode's scheduler and saves finished
/// captures. Nothing here runs in the callback context.
use heapless::Deque;
use log::{debug, info, warn};

use crate::active::{AbandonReason, ActiveAttack, ActiveEvent, AttackState};
use crate::bridge::{Bridge, CounterSnapshot, EapolCapture, PmkidCapture, Sighting, Trace};
use crate::config::EngineConfig;
use crate::defaults::*;
use crate::dispatch::{Shared, ACTIVE, PASSIVE};
use crate::error::{Error, Result};
use crate::export::{CaptureExporter, ExportStats, Saved, Storage};
use crate::passive::{PassiveRecon, PassiveState};
use crate::radio::{random_mac, Radio};
use crate::skiplist::SkipList;
use crate::store::{Network, Stores, Upsert};
use crate::types::{Interval, MacAddr, Ssid};

const MAX_NOTICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Passive,
    Active,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Passive => "passive",
            Mode::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passive" => Some(Mode::Passive),
            "active" => Some(Mode::Active),
            _ => None,
        }
    }
}

/// Something the user should hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    HandshakeCaptured { bssid: MacAddr, station: MacAddr },
    PmkidCaptured { bssid: MacAddr, station: MacAddr },
    Saved(Saved),
    TargetLocked { bssid: MacAddr, channel: u8 },
    TargetSkipped { bssid: MacAddr },
}

/// Read-only view for status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub mode: Mode,
    pub running: bool,
    pub attacking: bool,
    pub locking: bool,
    /// Scheduler state name
    pub state: &'static str,
    pub channel: u8,
    pub networks: usize,
    pub handshakes: usize,
    pub complete: usize,
    pub pmkids: usize,
    pub skipped: usize,
    pub frames: CounterSnapshot,
    pub export: ExportStats,
    /// Captures lost to the free-heap guard
    pub oom_drops: u32,
    pub frames_sent: u32,
}

/// The active mode's current target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub bssid: MacAddr,
    pub ssid: Ssid,
    pub channel: u8,
    pub clients: u8,
    pub attempts: u8,
    pub state: AttackState,
}

pub struct CaptureEngine<'s> {
    shared: &'s Shared,
    mode: Mode,
    stores: Stores,
    skiplist: SkipList,
    passive: PassiveRecon,
    active: ActiveAttack,
    exporter: CaptureExporter,
    config: EngineConfig,
    notices: Deque<Notice, MAX_NOTICES>,
    save: Interval,
    dirty: bool,
    oom_drops: u32,
}

impl<'s> CaptureEngine<'s> {
    pub fn new(shared: &'s Shared, config: EngineConfig) -> Self {
        Self {
            shared,
            mode: Mode::Idle,
            stores: Stores::new(),
            skiplist: SkipList::new(),
            passive: PassiveRecon::new(),
            active: ActiveAttack::new(),
            exporter: CaptureExporter::new(),
            config,
            notices: Deque::new(),
            save: Interval::new(SAVE_INTERVAL_MS),
            dirty: false,
            oom_drops: 0,
        }
    }

    fn bridge(&self) -> &'s Bridge {
        &self.shared.bridge
    }

    /// Load the persisted skip-list. A missing file leaves it empty.
    pub fn load_skiplist(&mut self, storage: &mut impl Storage) {
        match SkipList::load(storage) {
            Ok(list) => {
                info!("engine: {} skip-listed networks", list.len());
                self.skiplist = list;
            }
            Err(e) => debug!("engine: no skip-list ({})", e),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Takes effect on the next tick.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn skiplist(&self) -> &SkipList {
        &self.skiplist
    }

    pub fn networks(&self) -> &[Network] {
        self.stores.networks.as_slice()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    // ── Mode control ───────────────────────────────────────────────────

    /// Start a mode from scratch: fresh stores, sniffer on, consumer
    /// installed last. Anything unsaved from a previous run is dropped, so
    /// call [`stop`](Self::stop) first.
    pub fn start(&mut self, mode: Mode, now: u32, radio: &mut impl Radio) {
        let bridge = self.bridge();
        self.shared.install(None);
        bridge.drain();
        bridge.activity.reset();
        bridge.request_beacon(None);
        self.stores.clear();
        self.notices.clear();
        self.dirty = false;

        if mode == Mode::Idle {
            radio.set_sniffer(false);
            self.mode = Mode::Idle;
            return;
        }
        if self.config.randomize_mac {
            let mac = random_mac(radio);
            radio.randomize_mac(mac);
            info!("engine: station MAC now {}", mac);
        }
        radio.set_sniffer(true);
        match mode {
            Mode::Passive => {
                self.passive.start(now, radio);
                self.shared.install(Some(&PASSIVE));
            }
            _ => {
                self.active.start(now, radio);
                self.shared.install(Some(&ACTIVE));
            }
        }
        self.save.reset(now);
        self.mode = mode;
        info!("engine: {} mode started", mode.as_str());
    }

    /// Passive to active without touching the radio setup. Stores carry
    /// over and the callback picks up the new consumer on its next frame.
    pub fn switch_seamless(&mut self, now: u32, radio: &mut impl Radio) {
        if self.mode != Mode::Passive {
            warn!("engine: seamless switch needs passive mode, in {}", self.mode.as_str());
            return;
        }
        self.shared.install(Some(&ACTIVE));
        if let Some(held) = self.passive.release() {
            self.store_pmkid(held, Ssid::new(), now);
        }
        self.active.start(now, radio);
        self.mode = Mode::Active;
        info!("engine: switched to active mode");
    }

    /// Stop the current mode. The callback is detached and the sniffer
    /// turned off before anything is released; whatever the callback
    /// already posted is still folded in and saved.
    pub fn stop(&mut self, now: u32, radio: &mut impl Radio, storage: &mut impl Storage) {
        if self.mode == Mode::Idle {
            return;
        }
        self.shared.install(None);
        radio.set_sniffer(false);

        self.drain_events(now, &*radio);
        if let Some(held) = self.passive.release() {
            self.store_pmkid(held, Ssid::new(), now);
        }
        self.save_captures(storage);

        let bridge = self.bridge();
        bridge.drain();
        bridge.request_beacon(None);
        self.stores.clear();
        info!("engine: {} mode stopped", self.mode.as_str());
        self.mode = Mode::Idle;
    }

    // ── Main loop ──────────────────────────────────────────────────────

    pub fn tick(&mut self, now: u32, radio: &mut impl Radio, storage: &mut impl Storage) {
        if self.mode == Mode::Idle {
            return;
        }
        self.drain_events(now, &*radio);

        let wanted = self.stores.handshakes.missing_beacon();
        if self.bridge().beacon_requested() != wanted {
            self.bridge().request_beacon(wanted);
        }

        match self.mode {
            Mode::Passive => {
                if let Some(expired) = self.passive.tick(now, radio, &self.shared.bridge.activity) {
                    self.store_pmkid(expired, Ssid::new(), now);
                }
                if self.passive.cleanup_due(now) {
                    self.cleanup(now, PASSIVE_STALE_MS, None);
                }
            }
            Mode::Active => {
                let event = self
                    .active
                    .tick(now, radio, &mut self.stores, &self.skiplist, &self.config);
                if let Some(event) = event {
                    self.on_active(event);
                }
                if self.active.cleanup_due(now) {
                    let keep = self.active.target().map(|t| t.bssid);
                    self.cleanup(now, ACTIVE_STALE_MS, keep);
                }
            }
            Mode::Idle => {}
        }

        let due = self.save.due(now);
        if (self.dirty || due) && CaptureExporter::has_pending(&self.stores) {
            self.save_captures(storage);
        }
        self.dirty = false;
    }

    fn drain_events(&mut self, now: u32, radio: &impl Radio) {
        let bridge = self.bridge();
        while let Some(sighting) = bridge.next_sighting() {
            self.on_sighting(sighting, now);
        }
        while let Some(seen) = bridge.next_client() {
            if let Some(net) = self.stores.networks.get_mut(&seen.ap) {
                if net.observe_client(seen.client, seen.rssi, now) {
                    debug!("engine: client {} on {}", seen.client, seen.ap);
                }
            }
        }
        while let Some(capture) = bridge.next_eapol() {
            self.on_eapol(capture, now, radio);
        }
        while let Some(capture) = bridge.next_pmkid() {
            self.on_pmkid(capture, now);
        }
        while let Some(beacon) = bridge.next_beacon() {
            if self.reserve(radio).is_err() {
                continue;
            }
            let attached = self.stores.handshakes.attach_beacon(&beacon.bssid, &beacon.frame);
            if attached > 0 {
                debug!("engine: beacon attached to {} handshake(s) of {}", attached, beacon.bssid);
            }
        }
        while let Some(trace) = bridge.next_trace() {
            match trace {
                Trace::Eapol { message, ap, station } => {
                    debug!("eapol {:?} {} <-> {}", message, ap, station)
                }
                Trace::Pmkid { ap } => debug!("pmkid from {}", ap),
            }
        }
    }

    fn on_sighting(&mut self, sighting: Sighting, now: u32) {
        let channel = sighting.channel();
        let info = &sighting.info;
        match self.stores.networks.upsert(info, channel, sighting.rssi, now) {
            Ok(Upsert::Created) => debug!(
                "engine: new network {} \"{}\" ch {} {}",
                info.bssid,
                info.ssid,
                channel,
                info.auth.as_str()
            ),
            Ok(Upsert::Updated) => {}
            Err(e) => debug!("engine: network {} dropped ({})", info.bssid, e),
        }
        if info.ssid.is_hidden() {
            return;
        }
        self.stores.handshakes.backfill_ssid(&info.bssid, &info.ssid);
        self.stores.pmkids.backfill_ssid(&info.bssid, &info.ssid);
        if self.mode == Mode::Passive {
            if let Some(held) = self.passive.resolve_pmkid(&info.bssid, now) {
                self.store_pmkid(held, info.ssid.clone(), now);
            }
        }
    }

    fn on_eapol(&mut self, capture: EapolCapture, now: u32, radio: &impl Radio) {
        let EapolCapture {
            ap, station, message, ..
        } = capture;
        if !self.stores.handshakes.contains(&ap, &station) {
            if let Err(e) = self.reserve(radio) {
                warn!("engine: handshake {} / {} skipped ({})", ap, station, e);
                return;
            }
        }
        let recorded = match self.stores.handshakes.record(ap, station, message, &capture.eapol, now) {
            Ok(recorded) => recorded,
            Err(e) => {
                debug!("engine: {:?} from {} dropped ({})", message, ap, e);
                return;
            }
        };
        if recorded.created {
            if let Some(ssid) = self.stores.networks.ssid_for(&ap).cloned() {
                self.stores.handshakes.backfill_ssid(&ap, &ssid);
            }
        }
        if recorded.completed {
            info!("engine: handshake captured {} / {}", ap, station);
            if let Some(net) = self.stores.networks.get_mut(&ap) {
                net.handshake_captured = true;
            }
            self.dirty = true;
            self.notify(Notice::HandshakeCaptured { bssid: ap, station });
        }
    }

    fn on_pmkid(&mut self, capture: PmkidCapture, now: u32) {
        let known = self
            .stores
            .networks
            .ssid_for(&capture.ap)
            .filter(|ssid| !ssid.is_hidden())
            .cloned();
        match known {
            Some(ssid) => self.store_pmkid(capture, ssid, now),
            None if self.mode == Mode::Passive => {
                if let Err(capture) = self.passive.hold_pmkid(capture, now) {
                    self.store_pmkid(capture, Ssid::new(), now);
                }
            }
            None => self.store_pmkid(capture, Ssid::new(), now),
        }
    }

    fn store_pmkid(&mut self, capture: PmkidCapture, ssid: Ssid, now: u32) {
        let PmkidCapture { ap, station, pmkid, .. } = capture;
        match self.stores.pmkids.insert(ap, station, pmkid, ssid, now) {
            Ok(true) => {
                info!("engine: PMKID captured {} / {}", ap, station);
                self.dirty = true;
                self.notify(Notice::PmkidCaptured { bssid: ap, station });
            }
            Ok(false) => {}
            Err(e) => debug!("engine: PMKID from {} dropped ({})", ap, e),
        }
    }

    fn on_active(&mut self, event: ActiveEvent) {
        match event {
            ActiveEvent::Locked { bssid, channel } => self.notify(Notice::TargetLocked { bssid, channel }),
            ActiveEvent::Abandoned {
                bssid,
                reason: AbandonReason::Skipped,
            } => self.notify(Notice::TargetSkipped { bssid }),
            ActiveEvent::Abandoned { bssid, reason } => debug!("engine: target {} dropped ({:?})", bssid, reason),
            ActiveEvent::Finished { bssid, captured } => {
                info!("engine: done with {} (captured: {})", bssid, captured)
            }
            ActiveEvent::Bored => info!("engine: no targets left"),
        }
    }

    fn cleanup(&mut self, now: u32, stale_ms: u32, keep: Option<MacAddr>) {
        let _sweep = self.shared.bridge.sweep();
        let networks = self.stores.networks.evict_stale(now, stale_ms, CLIENT_STALE_MS, keep);
        let handshakes = self
            .stores
            .handshakes
            .evict_stale(now, HANDSHAKE_INCOMPLETE_MS, CAPTURE_RETENTION_MS);
        let pmkids = self.stores.pmkids.evict_stale(now, CAPTURE_RETENTION_MS);
        if networks + handshakes + pmkids > 0 {
            debug!(
                "engine: evicted {} networks, {} handshakes, {} pmkids",
                networks, handshakes, pmkids
            );
        }
    }

    fn save_captures(&mut self, storage: &mut impl Storage) {
        let notices = &mut self.notices;
        let saved = self
            .exporter
            .save_pending(&mut self.stores, storage, |s| push_notice(notices, Notice::Saved(s)));
        if saved > 0 {
            info!("engine: saved {} capture(s)", saved);
        }
    }

    /// Heap guard for anything that allocates. A refusal counts as a drop.
    fn reserve(&mut self, radio: &impl Radio) -> Result<()> {
        if radio.free_heap() >= self.config.min_free_heap {
            return Ok(());
        }
        self.oom_drops += 1;
        Err(Error::OutOfMemory)
    }

    fn notify(&mut self, notice: Notice) {
        push_notice(&mut self.notices, notice);
    }

    // ── Skip-list ──────────────────────────────────────────────────────

    /// Skip-list `bssid` and persist the list. A running attack on it stops
    /// at once. Without an explicit name the known SSID is recorded.
    /// Returns whether it was newly added.
    pub fn exclude(
        &mut self,
        bssid: MacAddr,
        ssid: Option<Ssid>,
        now: u32,
        storage: &mut impl Storage,
    ) -> Result<bool> {
        let ssid = ssid
            .or_else(|| self.stores.networks.ssid_for(&bssid).cloned())
            .unwrap_or_default();
        let added = self.skiplist.add(bssid, ssid)?;
        if self.mode == Mode::Active {
            if let Some(event) = self.active.on_skip(&bssid, now) {
                self.on_active(event);
            }
        }
        if added {
            self.skiplist.save(storage)?;
        }
        Ok(added)
    }

    pub fn include(&mut self, bssid: &MacAddr, storage: &mut impl Storage) -> Result<bool> {
        let removed = self.skiplist.remove(bssid);
        if removed {
            self.skiplist.save(storage)?;
        }
        Ok(removed)
    }

    // ── Read-only views ────────────────────────────────────────────────

    pub fn poll_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    pub fn status(&self) -> EngineStatus {
        let (state, channel) = match self.mode {
            Mode::Idle => ("idle", 0),
            Mode::Passive => (self.passive.state().as_str(), self.passive.channel()),
            Mode::Active => (self.active.state().as_str(), self.active.channel()),
        };
        let attack_state = (self.mode == Mode::Active).then(|| self.active.state());
        EngineStatus {
            mode: self.mode,
            running: self.mode != Mode::Idle,
            attacking: attack_state == Some(AttackState::Attacking),
            locking: attack_state == Some(AttackState::Locking),
            state,
            channel,
            networks: self.stores.networks.len(),
            handshakes: self.stores.handshakes.len(),
            complete: self.stores.handshakes.iter().filter(|h| h.is_complete()).count(),
            pmkids: self.stores.pmkids.len(),
            skipped: self.skiplist.len(),
            frames: self.shared.bridge.counters.snapshot(),
            export: self.exporter.stats(),
            oom_drops: self.oom_drops,
            frames_sent: self.active.frames_sent(),
        }
    }

    pub fn passive_state(&self) -> Option<PassiveState> {
        (self.mode == Mode::Passive).then(|| self.passive.state())
    }

    pub fn target_snapshot(&self) -> Option<TargetSnapshot> {
        if self.mode != Mode::Active {
            return None;
        }
        let target = self.active.target()?;
        let net = self.stores.networks.get(&target.bssid)?;
        Some(TargetSnapshot {
            bssid: net.bssid,
            ssid: net.ssid.clone(),
            channel: target.channel,
            clients: net.clients.len() as u8,
            attempts: net.attack_attempts,
            state: self.active.state(),
        })
    }
}

/// Queue a notice, dropping the oldest when full.
fn push_notice(notices: &mut Deque<Notice, MAX_NOTICES>, notice: Notice) {
    if notices.is_full() {
        notices.pop_front();
    }
    let _ = notices.push_back(notice);
}
