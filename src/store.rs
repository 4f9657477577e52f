/// Bounded stores for discovered networks, handshakes and PMKIDs.
///
/// Only the main loop mutates these. Every store has a fixed capacity and
/// an insert past it fails with `CapacityExceeded`; space comes back through
/// the periodic `evict_stale` sweeps.
use alloc::boxed::Box;

use crate::defaults::{MAX_CLIENTS_PER_NETWORK, MAX_EAPOL_LEN, MAX_HANDSHAKES, MAX_NETWORKS, MAX_PMKIDS};
use crate::error::{Error, Result};
use crate::parser::{KeyMessage, NetworkInfo};
use crate::types::{elapsed_ms, AuthMode, MacAddr, Ssid};

// ── Networks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub mac: MacAddr,
    pub rssi: i8,
    pub last_seen: u32,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub bssid: MacAddr,
    pub ssid: Ssid,
    pub channel: u8,
    pub rssi: i8,
    pub auth: AuthMode,
    pub pmf_required: bool,
    pub clients: heapless::Vec<Client, MAX_CLIENTS_PER_NETWORK>,
    pub handshake_captured: bool,
    pub attack_attempts: u8,
    pub first_seen: u32,
    pub last_seen: u32,
    pub beacon_count: u32,
}

impl Network {
    pub fn new(info: &NetworkInfo, channel: u8, rssi: i8, now: u32) -> Self {
        Self {
            bssid: info.bssid,
            ssid: info.ssid.clone(),
            channel,
            rssi,
            auth: info.auth,
            pmf_required: info.pmf_required,
            clients: heapless::Vec::new(),
            handshake_captured: false,
            attack_attempts: 0,
            first_seen: now,
            last_seen: now,
            beacon_count: 1,
        }
    }

    /// Refresh from a new sighting. A hidden beacon never erases an SSID
    /// learned from a probe response.
    pub fn update(&mut self, info: &NetworkInfo, channel: u8, rssi: i8, now: u32) {
        if !info.ssid.is_hidden() {
            self.ssid = info.ssid.clone();
        }
        self.channel = channel;
        self.rssi = rssi;
        self.auth = info.auth;
        self.pmf_required = info.pmf_required;
        self.last_seen = now;
        self.beacon_count = self.beacon_count.saturating_add(1);
    }

    pub fn has_clients(&self) -> bool {
        !self.clients.is_empty()
    }

    /// Record a station talking to this AP. Returns `true` for a new client.
    pub fn observe_client(&mut self, mac: MacAddr, rssi: i8, now: u32) -> bool {
        if let Some(client) = self.clients.iter_mut().find(|c| c.mac == mac) {
            client.rssi = rssi;
            client.last_seen = now;
            return false;
        }
        self.clients.push(Client { mac, rssi, last_seen: now }).is_ok()
    }

    pub fn age_clients(&mut self, now: u32, timeout_ms: u32) {
        self.clients.retain(|c| elapsed_ms(now, c.last_seen) <= timeout_ms);
    }
}

/// Result of folding a sighting into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

#[derive(Default)]
pub struct NetworkStore {
    items: heapless::Vec<Network, MAX_NETWORKS>,
}

impl NetworkStore {
    pub const fn new() -> Self {
        Self { items: heapless::Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    pub fn as_slice(&self) -> &[Network] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.items.iter()
    }

    pub fn get(&self, bssid: &MacAddr) -> Option<&Network> {
        self.items.iter().find(|n| n.bssid == *bssid)
    }

    pub fn get_mut(&mut self, bssid: &MacAddr) -> Option<&mut Network> {
        self.items.iter_mut().find(|n| n.bssid == *bssid)
    }

    pub fn contains(&self, bssid: &MacAddr) -> bool {
        self.get(bssid).is_some()
    }

    pub fn upsert(&mut self, info: &NetworkInfo, channel: u8, rssi: i8, now: u32) -> Result<Upsert> {
        if let Some(net) = self.get_mut(&info.bssid) {
            net.update(info, channel, rssi, now);
            return Ok(Upsert::Updated);
        }
        self.items
            .push(Network::new(info, channel, rssi, now))
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(Upsert::Created)
    }

    /// Known, non-hidden SSID for a BSSID.
    pub fn ssid_for(&self, bssid: &MacAddr) -> Option<&Ssid> {
        self.get(bssid).map(|n| &n.ssid).filter(|s| !s.is_hidden())
    }

    /// Drop networks not seen within `timeout_ms` (except `keep`) and age
    /// out clients of the survivors. Returns the number of networks removed.
    pub fn evict_stale(&mut self, now: u32, timeout_ms: u32, client_timeout_ms: u32, keep: Option<MacAddr>) -> usize {
        let before = self.items.len();
        self.items
            .retain(|n| Some(n.bssid) == keep || elapsed_ms(now, n.last_seen) <= timeout_ms);
        for net in self.items.iter_mut() {
            net.age_clients(now, client_timeout_ms);
        }
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ── Handshakes ─────────────────────────────────────────────────────────

/// One captured EAPOL message.
#[derive(Debug, Clone)]
pub struct EapolFrameSlot {
    pub data: heapless::Vec<u8, MAX_EAPOL_LEN>,
    pub timestamp: u32,
}

/// Which two messages a hashcat line is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePair {
    /// ANonce from M1, MIC and EAPOL from M2
    M1M2,
    /// ANonce from M3, MIC and EAPOL from M2
    M2M3,
}

impl MessagePair {
    /// hashcat message-pair byte
    pub fn byte(&self) -> u8 {
        match self {
            MessagePair::M1M2 => 0x00,
            MessagePair::M2M3 => 0x02,
        }
    }

    pub fn nonce_message(&self) -> KeyMessage {
        match self {
            MessagePair::M1M2 => KeyMessage::M1,
            MessagePair::M2M3 => KeyMessage::M3,
        }
    }
}

#[derive(Debug)]
pub struct Handshake {
    pub bssid: MacAddr,
    pub station: MacAddr,
    pub ssid: Ssid,
    frames: [Option<EapolFrameSlot>; 4],
    mask: u8,
    /// Beacon of the AP for the PCAP, owned until eviction
    pub beacon: Option<Box<[u8]>>,
    pub first_seen: u32,
    pub last_seen: u32,
    pub saved: bool,
}

impl Handshake {
    pub fn new(bssid: MacAddr, station: MacAddr, now: u32) -> Self {
        Self {
            bssid,
            station,
            ssid: Ssid::new(),
            frames: [None, None, None, None],
            mask: 0,
            beacon: None,
            first_seen: now,
            last_seen: now,
            saved: false,
        }
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn has(&self, msg: KeyMessage) -> bool {
        self.mask & msg.bit() != 0
    }

    pub fn frame(&self, msg: KeyMessage) -> Option<&EapolFrameSlot> {
        self.frames[msg.index()].as_ref()
    }

    /// Store one message. The first copy of each message wins, except that a
    /// fresh M1 replaces an unmatched one so ANonce and MIC stay from the
    /// same exchange. Returns whether the frame was stored.
    pub fn record(&mut self, msg: KeyMessage, eapol: &[u8], now: u32) -> bool {
        self.last_seen = now;
        let replace = msg == KeyMessage::M1 && !self.has_valid_pair();
        if self.has(msg) && !replace {
            return false;
        }
        let len = eapol.len().min(MAX_EAPOL_LEN);
        let Ok(data) = heapless::Vec::from_slice(&eapol[..len]) else {
            return false;
        };
        self.frames[msg.index()] = Some(EapolFrameSlot { data, timestamp: now });
        self.mask |= msg.bit();
        true
    }

    /// M1+M2 or M2+M3: enough to verify a passphrase offline.
    pub fn has_valid_pair(&self) -> bool {
        self.message_pair().is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.has_valid_pair()
    }

    /// Preferred pair for export; M1+M2 wins when both are present.
    pub fn message_pair(&self) -> Option<MessagePair> {
        if !self.has(KeyMessage::M2) {
            None
        } else if self.has(KeyMessage::M1) {
            Some(MessagePair::M1M2)
        } else if self.has(KeyMessage::M3) {
            Some(MessagePair::M2M3)
        } else {
            None
        }
    }
}

/// What recording a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub created: bool,
    pub stored: bool,
    /// The handshake gained its first valid pair with this message
    pub completed: bool,
}

#[derive(Default)]
pub struct HandshakeStore {
    items: heapless::Vec<Handshake, MAX_HANDSHAKES>,
}

impl HandshakeStore {
    pub const fn new() -> Self {
        Self { items: heapless::Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handshake> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Handshake> {
        self.items.iter_mut()
    }

    pub fn get(&self, bssid: &MacAddr, station: &MacAddr) -> Option<&Handshake> {
        self.items.iter().find(|h| h.bssid == *bssid && h.station == *station)
    }

    pub fn contains(&self, bssid: &MacAddr, station: &MacAddr) -> bool {
        self.get(bssid, station).is_some()
    }

    pub fn record(
        &mut self,
        bssid: MacAddr,
        station: MacAddr,
        msg: KeyMessage,
        eapol: &[u8],
        now: u32,
    ) -> Result<Recorded> {
        let created = !self.contains(&bssid, &station);
        if created {
            self.items
                .push(Handshake::new(bssid, station, now))
                .map_err(|_| Error::CapacityExceeded)?;
        }
        let Some(hs) = self.items.iter_mut().find(|h| h.bssid == bssid && h.station == station) else {
            return Err(Error::CapacityExceeded);
        };
        let was_complete = hs.is_complete();
        let stored = hs.record(msg, eapol, now);
        Ok(Recorded {
            created,
            stored,
            completed: !was_complete && hs.is_complete(),
        })
    }

    /// Any complete handshake for this AP
    pub fn has_complete(&self, bssid: &MacAddr) -> bool {
        self.items.iter().any(|h| h.bssid == *bssid && h.is_complete())
    }

    /// An M1 went out without a reply yet: a client is mid-association.
    pub fn m1_without_m2(&self, bssid: &MacAddr) -> bool {
        self.items
            .iter()
            .any(|h| h.bssid == *bssid && h.has(KeyMessage::M1) && !h.has(KeyMessage::M2))
    }

    /// First AP whose handshakes still lack a beacon.
    pub fn missing_beacon(&self) -> Option<MacAddr> {
        self.items.iter().find(|h| h.beacon.is_none()).map(|h| h.bssid)
    }

    /// Attach a copy of `beacon` to every handshake of `bssid` that has
    /// none. Returns how many were updated.
    pub fn attach_beacon(&mut self, bssid: &MacAddr, beacon: &[u8]) -> usize {
        let mut attached = 0;
        for hs in self.items.iter_mut().filter(|h| h.bssid == *bssid && h.beacon.is_none()) {
            hs.beacon = Some(Box::from(beacon));
            attached += 1;
        }
        attached
    }

    pub fn backfill_ssid(&mut self, bssid: &MacAddr, ssid: &Ssid) {
        for hs in self.items.iter_mut().filter(|h| h.bssid == *bssid && h.ssid.is_hidden()) {
            hs.ssid = ssid.clone();
        }
    }

    /// Evict incomplete handshakes idle past `incomplete_ms` and saved ones
    /// past `retention_ms`. Complete but unsaved handshakes stay until export
    /// succeeds. Dropping an entry frees its beacon.
    pub fn evict_stale(&mut self, now: u32, incomplete_ms: u32, retention_ms: u32) -> usize {
        let before = self.items.len();
        self.items.retain(|h| {
            let idle = elapsed_ms(now, h.last_seen);
            if h.saved {
                idle <= retention_ms
            } else {
                h.is_complete() || idle <= incomplete_ms
            }
        });
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ── PMKIDs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PmkidEntry {
    pub bssid: MacAddr,
    pub station: MacAddr,
    pub pmkid: [u8; 16],
    pub ssid: Ssid,
    pub saved: bool,
    pub captured_at: u32,
}

#[derive(Default)]
pub struct PmkidStore {
    items: heapless::Vec<PmkidEntry, MAX_PMKIDS>,
}

impl PmkidStore {
    pub const fn new() -> Self {
        Self { items: heapless::Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PmkidEntry> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PmkidEntry> {
        self.items.iter_mut()
    }

    pub fn get(&self, bssid: &MacAddr, station: &MacAddr) -> Option<&PmkidEntry> {
        self.items.iter().find(|p| p.bssid == *bssid && p.station == *station)
    }

    /// Store a PMKID. Returns `true` if it is new or replaced a different
    /// value for the same pair. All-zero PMKIDs are never stored.
    pub fn insert(&mut self, bssid: MacAddr, station: MacAddr, pmkid: [u8; 16], ssid: Ssid, now: u32) -> Result<bool> {
        if pmkid == [0u8; 16] {
            return Err(Error::Malformed);
        }
        if let Some(entry) = self.items.iter_mut().find(|p| p.bssid == bssid && p.station == station) {
            if !ssid.is_hidden() {
                entry.ssid = ssid;
            }
            if entry.pmkid == pmkid {
                return Ok(false);
            }
            entry.pmkid = pmkid;
            entry.saved = false;
            entry.captured_at = now;
            return Ok(true);
        }
        self.items
            .push(PmkidEntry {
                bssid,
                station,
                pmkid,
                ssid,
                saved: false,
                captured_at: now,
            })
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(true)
    }

    pub fn backfill_ssid(&mut self, bssid: &MacAddr, ssid: &Ssid) {
        for entry in self.items.iter_mut().filter(|p| p.bssid == *bssid && p.ssid.is_hidden()) {
            entry.ssid = ssid.clone();
        }
    }

    /// Release saved entries older than `retention_ms`.
    pub fn evict_stale(&mut self, now: u32, retention_ms: u32) -> usize {
        let before = self.items.len();
        self.items
            .retain(|p| !p.saved || elapsed_ms(now, p.captured_at) <= retention_ms);
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// All capture state owned by the engine.
#[derive(Default)]
pub struct Stores {
    pub networks: NetworkStore,
    pub handshakes: HandshakeStore,
    pub pmkids: PmkidStore,
}

impl Stores {
    pub const fn new() -> Self {
        Self {
            networks: NetworkStore::new(),
            handshakes: HandshakeStore::new(),
            pmkids: PmkidStore::new(),
        }
    }

    pub fn clear(&mut self) {
        self.networks.clear();
        self.handshakes.clear();
        self.pmkids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn info(bssid: MacAddr, ssid: &[u8]) -> NetworkInfo {
        NetworkInfo {
            bssid,
            ssid: Ssid::from_bytes(ssid).unwrap(),
            channel: Some(6),
            auth: AuthMode::Wpa2,
            pmf_required: false,
            pmf_capable: false,
            probe_response: false,
        }
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, n])
    }

    // ── Networks ───────────────────────────────────────────────────────

    #[test]
    fn upsert_creates_then_updates() {
        let mut store = NetworkStore::new();
        assert_eq!(store.upsert(&info(AP, b"LAB"), 6, -50, 0), Ok(Upsert::Created));
        assert_eq!(store.upsert(&info(AP, b"LAB"), 6, -40, 100), Ok(Upsert::Updated));
        let net = store.get(&AP).unwrap();
        assert_eq!(net.rssi, -40);
        assert_eq!(net.beacon_count, 2);
        assert_eq!(net.last_seen, 100);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn hidden_beacon_keeps_known_ssid() {
        let mut store = NetworkStore::new();
        store.upsert(&info(AP, b"LAB"), 6, -50, 0).unwrap();
        store.upsert(&info(AP, b""), 6, -50, 10).unwrap();
        assert_eq!(store.ssid_for(&AP).unwrap().as_bytes(), b"LAB");
    }

    #[test]
    fn insert_past_capacity_is_rejected_without_side_effects() {
        let mut store = NetworkStore::new();
        for i in 0..MAX_NETWORKS {
            let bssid = MacAddr([0x02, 0, 0, 0, (i >> 8) as u8, i as u8]);
            store.upsert(&info(bssid, b"x"), 1, -70, 0).unwrap();
        }
        assert!(store.is_full());
        assert_eq!(store.upsert(&info(AP, b"LAB"), 6, -50, 0), Err(Error::CapacityExceeded));
        assert_eq!(store.len(), MAX_NETWORKS);
        assert!(!store.contains(&AP));
    }

    #[test]
    fn age_out_is_idempotent() {
        let mut store = NetworkStore::new();
        store.upsert(&info(mac(1), b"old"), 1, -70, 0).unwrap();
        store.upsert(&info(mac(2), b"new"), 1, -70, 25_000).unwrap();
        assert_eq!(store.evict_stale(40_000, 30_000, 60_000, None), 1);
        assert_eq!(store.evict_stale(40_000, 30_000, 60_000, None), 0);
        assert!(store.contains(&mac(2)));
    }

    #[test]
    fn age_out_spares_kept_bssid() {
        let mut store = NetworkStore::new();
        store.upsert(&info(AP, b"target"), 1, -70, 0).unwrap();
        assert_eq!(store.evict_stale(100_000, 30_000, 60_000, Some(AP)), 0);
        assert!(store.contains(&AP));
    }

    #[test]
    fn clients_are_bounded_and_aged() {
        let mut store = NetworkStore::new();
        store.upsert(&info(AP, b"LAB"), 1, -70, 0).unwrap();
        let net = store.get_mut(&AP).unwrap();
        for i in 0..(MAX_CLIENTS_PER_NETWORK as u8 + 2) {
            net.observe_client(mac(i), -60, i as u32 * 1000);
        }
        assert_eq!(net.clients.len(), MAX_CLIENTS_PER_NETWORK);
        assert!(!net.observe_client(mac(0), -40, 50_000), "known client is refreshed");
        net.age_clients(67_000, 60_000);
        assert_eq!(net.clients.len(), 2);
    }

    // ── Handshakes ─────────────────────────────────────────────────────

    fn handshake_with(msgs: &[KeyMessage]) -> Handshake {
        let mut hs = Handshake::new(AP, STA, 0);
        for &m in msgs {
            hs.record(m, &eapol_key(m, None), 0);
        }
        hs
    }

    #[test]
    fn valid_pair_rules() {
        use KeyMessage::*;
        assert!(!handshake_with(&[M1, M3]).has_valid_pair());
        assert!(!handshake_with(&[M1]).has_valid_pair());
        assert!(!handshake_with(&[M3, M4]).has_valid_pair());
        assert_eq!(handshake_with(&[M1, M2]).message_pair(), Some(MessagePair::M1M2));
        assert_eq!(handshake_with(&[M2, M3]).message_pair(), Some(MessagePair::M2M3));
        assert_eq!(handshake_with(&[M1, M2, M3, M4]).message_pair(), Some(MessagePair::M1M2));
        assert_eq!(handshake_with(&[M1, M2, M3, M4]).mask(), 0x0F);
    }

    #[test]
    fn unmatched_m1_is_replaced_matched_one_is_kept() {
        let mut hs = Handshake::new(AP, STA, 0);
        let mut first = eapol_key(KeyMessage::M1, None);
        first[20] = 0x01;
        assert!(hs.record(KeyMessage::M1, &first, 0));
        assert!(hs.record(KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 10));
        assert_eq!(hs.frame(KeyMessage::M1).unwrap().timestamp, 10);

        assert!(hs.record(KeyMessage::M2, &eapol_key(KeyMessage::M2, None), 20));
        assert!(!hs.record(KeyMessage::M1, &first, 30));
        assert_eq!(hs.frame(KeyMessage::M1).unwrap().timestamp, 10);
        assert!(!hs.record(KeyMessage::M2, &eapol_key(KeyMessage::M2, None), 40));
    }

    #[test]
    fn store_reports_completion_once() {
        let mut store = HandshakeStore::new();
        let r = store.record(AP, STA, KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 0).unwrap();
        assert!(r.created && r.stored && !r.completed);
        assert!(store.m1_without_m2(&AP));
        let r = store.record(AP, STA, KeyMessage::M2, &eapol_key(KeyMessage::M2, None), 5).unwrap();
        assert!(!r.created && r.completed);
        assert!(store.has_complete(&AP));
        assert!(!store.m1_without_m2(&AP));
        let r = store.record(AP, STA, KeyMessage::M3, &eapol_key(KeyMessage::M3, None), 6).unwrap();
        assert!(r.stored && !r.completed);
    }

    #[test]
    fn handshake_capacity_is_bounded() {
        let mut store = HandshakeStore::new();
        for i in 0..MAX_HANDSHAKES as u8 {
            store.record(AP, mac(i), KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 0).unwrap();
        }
        let err = store.record(AP, mac(200), KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 0);
        assert_eq!(err, Err(Error::CapacityExceeded));
        assert_eq!(store.len(), MAX_HANDSHAKES);
    }

    #[test]
    fn beacon_attaches_to_every_handshake_of_the_ap() {
        let mut store = HandshakeStore::new();
        store.record(AP, STA, KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 0).unwrap();
        store.record(AP, mac(9), KeyMessage::M1, &eapol_key(KeyMessage::M1, None), 0).unwrap();
        assert_eq!(store.missing_beacon(), Some(AP));
        assert_eq!(store.attach_beacon(&AP, &[0x80, 0x00]), 2);
        assert_eq!(store.attach_beacon(&AP, &[0x80, 0x00]), 0);
        assert_eq!(store.missing_beacon(), None);
    }

    #[test]
    fn handshake_eviction_policy() {
        let mut store = HandshakeStore::new();
        let m1 = eapol_key(KeyMessage::M1, None);
        let m2 = eapol_key(KeyMessage::M2, None);
        store.record(AP, mac(1), KeyMessage::M1, &m1, 0).unwrap();
        store.record(AP, mac(2), KeyMessage::M1, &m1, 0).unwrap();
        store.record(AP, mac(2), KeyMessage::M2, &m2, 0).unwrap();
        store.record(AP, mac(3), KeyMessage::M1, &m1, 0).unwrap();
        store.record(AP, mac(3), KeyMessage::M2, &m2, 0).unwrap();
        store.iter_mut().filter(|h| h.station == mac(3)).for_each(|h| h.saved = true);

        // incomplete expires first, unsaved complete one never does
        assert_eq!(store.evict_stale(200_000, 120_000, 300_000), 1);
        assert_eq!(store.evict_stale(200_000, 120_000, 300_000), 0);
        assert_eq!(store.evict_stale(400_000, 120_000, 300_000), 1);
        assert!(store.contains(&AP, &mac(2)));
    }

    // ── PMKIDs ─────────────────────────────────────────────────────────

    #[test]
    fn zero_pmkid_is_never_stored() {
        let mut store = PmkidStore::new();
        assert_eq!(store.insert(AP, STA, [0; 16], Ssid::new(), 0), Err(Error::Malformed));
        assert!(store.is_empty());
    }

    #[test]
    fn pmkid_dedup_and_replace() {
        let mut store = PmkidStore::new();
        let ssid = Ssid::from_bytes(b"LAB").unwrap();
        assert_eq!(store.insert(AP, STA, [1; 16], Ssid::new(), 0), Ok(true));
        assert_eq!(store.insert(AP, STA, [1; 16], ssid.clone(), 5), Ok(false));
        assert_eq!(store.get(&AP, &STA).unwrap().ssid, ssid);

        store.iter_mut().for_each(|p| p.saved = true);
        assert_eq!(store.insert(AP, STA, [2; 16], Ssid::new(), 9), Ok(true));
        let entry = store.get(&AP, &STA).unwrap();
        assert!(!entry.saved);
        assert_eq!(entry.ssid, ssid, "hidden ssid does not erase a known one");
    }

    #[test]
    fn pmkid_backfill_only_fills_unknown() {
        let mut store = PmkidStore::new();
        store.insert(AP, STA, [1; 16], Ssid::new(), 0).unwrap();
        store.insert(AP, mac(1), [2; 16], Ssid::from_bytes(b"Other").unwrap(), 0).unwrap();
        store.backfill_ssid(&AP, &Ssid::from_bytes(b"LAB").unwrap());
        assert_eq!(store.get(&AP, &STA).unwrap().ssid.as_bytes(), b"LAB");
        assert_eq!(store.get(&AP, &mac(1)).unwrap().ssid.as_bytes(), b"Other");
    }
}
