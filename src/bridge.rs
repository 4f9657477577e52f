/// Radio callback → main loop hand-off.
///
/// The radio callback owns nothing and never allocates. It parses a frame,
/// then posts a fixed-size event into one bounded channel per event kind
/// with `try_send`; a full channel drops the event, and the next matching
/// frame recreates it. The main loop drains the channels once per tick and
/// is the only writer of the stores.
///
/// A store sweep raises the `busy` flag for its duration; the dispatcher
/// drops frames while it is set so callback latency stays bounded.
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::defaults::{MAX_BEACON_LEN, MAX_CHANNEL, MAX_EAPOL_LEN};
use crate::parser::{KeyMessage, NetworkInfo};
use crate::types::MacAddr;

// ── Events ─────────────────────────────────────────────────────────────

/// A beacon or probe response, already parsed.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub info: NetworkInfo,
    pub rssi: i8,
    /// Channel the radio was tuned to when the frame arrived
    pub channel: u8,
}

impl Sighting {
    /// Advertised channel, falling back to the receive channel.
    pub fn channel(&self) -> u8 {
        self.info.channel.filter(|&c| c >= 1 && c <= MAX_CHANNEL).unwrap_or(self.channel)
    }
}

/// One EAPOL-Key message, copied out of the driver buffer.
#[derive(Debug, Clone)]
pub struct EapolCapture {
    pub ap: MacAddr,
    pub station: MacAddr,
    pub message: KeyMessage,
    pub eapol: heapless::Vec<u8, MAX_EAPOL_LEN>,
    pub channel: u8,
}

#[derive(Debug, Clone)]
pub struct PmkidCapture {
    pub ap: MacAddr,
    pub station: MacAddr,
    pub pmkid: [u8; 16],
    pub channel: u8,
}

/// A station seen exchanging data with an AP.
#[derive(Debug, Clone, Copy)]
pub struct ClientSighting {
    pub ap: MacAddr,
    pub client: MacAddr,
    pub rssi: i8,
}

/// Raw beacon forwarded on request, for attaching to handshakes.
#[derive(Debug, Clone)]
pub struct BeaconCapture {
    pub bssid: MacAddr,
    pub frame: heapless::Vec<u8, MAX_BEACON_LEN>,
}

/// Callback-side diagnostics, formatted by the main loop.
#[derive(Debug, Clone, Copy)]
pub enum Trace {
    Eapol { message: KeyMessage, ap: MacAddr, station: MacAddr },
    Pmkid { ap: MacAddr },
}

// ── Activity and counters ──────────────────────────────────────────────

const CHANNEL_SLOTS: usize = MAX_CHANNEL as usize + 1;

/// Per-channel frame counts since the scheduler last took them.
pub struct ChannelActivity {
    beacons: [AtomicU32; CHANNEL_SLOTS],
    eapol: [AtomicU32; CHANNEL_SLOTS],
}

impl ChannelActivity {
    pub const fn new() -> Self {
        Self {
            beacons: [const { AtomicU32::new(0) }; CHANNEL_SLOTS],
            eapol: [const { AtomicU32::new(0) }; CHANNEL_SLOTS],
        }
    }

    pub fn record_beacon(&self, channel: u8) {
        if let Some(c) = self.beacons.get(channel as usize) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eapol(&self, channel: u8) {
        if let Some(c) = self.eapol.get(channel as usize) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take and reset the (beacons, eapol) counts for a channel.
    pub fn take(&self, channel: u8) -> (u32, u32) {
        let i = channel as usize;
        match (self.beacons.get(i), self.eapol.get(i)) {
            (Some(b), Some(e)) => (b.swap(0, Ordering::Relaxed), e.swap(0, Ordering::Relaxed)),
            _ => (0, 0),
        }
    }

    pub fn reset(&self) {
        for c in self.beacons.iter().chain(self.eapol.iter()) {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Frame and drop counters, surfaced in status reports.
pub struct Counters {
    pub frames: AtomicU32,
    pub short: AtomicU32,
    pub busy: AtomicU32,
    pub full: AtomicU32,
    pub passive: AtomicU32,
    pub active: AtomicU32,
}

/// Plain copy of [`Counters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub frames: u32,
    pub short: u32,
    pub busy: u32,
    pub full: u32,
    pub passive: u32,
    pub active: u32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            frames: AtomicU32::new(0),
            short: AtomicU32::new(0),
            busy: AtomicU32::new(0),
            full: AtomicU32::new(0),
            passive: AtomicU32::new(0),
            active: AtomicU32::new(0),
        }
    }

    pub fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            short: self.short.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            full: self.full.load(Ordering::Relaxed),
            passive: self.passive.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

// ── Bridge ─────────────────────────────────────────────────────────────

type Slot<T, const N: usize> = Channel<CriticalSectionRawMutex, T, N>;

pub struct Bridge {
    sightings: Slot<Sighting, 8>,
    eapol: Slot<EapolCapture, 4>,
    pmkids: Slot<PmkidCapture, 2>,
    clients: Slot<ClientSighting, 8>,
    beacons: Slot<BeaconCapture, 1>,
    trace: Slot<Trace, 8>,
    beacon_request: Mutex<Cell<Option<MacAddr>>>,
    busy: AtomicBool,
    pub activity: ChannelActivity,
    pub counters: Counters,
}

impl Bridge {
    pub const fn new() -> Self {
        Self {
            sightings: Channel::new(),
            eapol: Channel::new(),
            pmkids: Channel::new(),
            clients: Channel::new(),
            beacons: Channel::new(),
            trace: Channel::new(),
            beacon_request: Mutex::new(Cell::new(None)),
            busy: AtomicBool::new(false),
            activity: ChannelActivity::new(),
            counters: Counters::new(),
        }
    }

    fn post<T, const N: usize>(&self, slot: &Slot<T, N>, event: T) -> bool {
        let sent = slot.try_send(event).is_ok();
        if !sent {
            Counters::bump(&self.counters.full);
        }
        sent
    }

    // ── Producer side (radio callback) ──

    pub fn post_sighting(&self, sighting: Sighting) -> bool {
        self.post(&self.sightings, sighting)
    }

    pub fn post_eapol(&self, capture: EapolCapture) -> bool {
        self.post(&self.eapol, capture)
    }

    pub fn post_pmkid(&self, capture: PmkidCapture) -> bool {
        self.post(&self.pmkids, capture)
    }

    pub fn post_client(&self, sighting: ClientSighting) -> bool {
        self.post(&self.clients, sighting)
    }

    /// Trace events are best effort and do not count as drops.
    pub fn trace(&self, event: Trace) {
        let _ = self.trace.try_send(event);
    }

    /// Forward `frame` if the main loop asked for a beacon of `bssid`.
    pub fn offer_beacon(&self, bssid: MacAddr, frame: &[u8]) {
        let wanted = critical_section::with(|cs| self.beacon_request.borrow(cs).get());
        if wanted != Some(bssid) {
            return;
        }
        let Ok(frame) = heapless::Vec::from_slice(&frame[..frame.len().min(MAX_BEACON_LEN)]) else {
            return;
        };
        if self.beacons.try_send(BeaconCapture { bssid, frame }).is_ok() {
            critical_section::with(|cs| self.beacon_request.borrow(cs).set(None));
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // ── Consumer side (main loop) ──

    pub fn next_sighting(&self) -> Option<Sighting> {
        self.sightings.try_receive().ok()
    }

    pub fn next_eapol(&self) -> Option<EapolCapture> {
        self.eapol.try_receive().ok()
    }

    pub fn next_pmkid(&self) -> Option<PmkidCapture> {
        self.pmkids.try_receive().ok()
    }

    pub fn next_client(&self) -> Option<ClientSighting> {
        self.clients.try_receive().ok()
    }

    pub fn next_beacon(&self) -> Option<BeaconCapture> {
        self.beacons.try_receive().ok()
    }

    pub fn next_trace(&self) -> Option<Trace> {
        self.trace.try_receive().ok()
    }

    pub fn request_beacon(&self, bssid: Option<MacAddr>) {
        critical_section::with(|cs| self.beacon_request.borrow(cs).set(bssid));
    }

    pub fn beacon_requested(&self) -> Option<MacAddr> {
        critical_section::with(|cs| self.beacon_request.borrow(cs).get())
    }

    /// Raise `busy` until the guard drops.
    pub fn sweep(&self) -> SweepGuard<'_> {
        self.busy.store(true, Ordering::Release);
        SweepGuard { busy: &self.busy }
    }

    /// Discard everything pending, e.g. after the sniffer was disabled.
    pub fn drain(&self) {
        while self.sightings.try_receive().is_ok() {}
        while self.eapol.try_receive().is_ok() {}
        while self.pmkids.try_receive().is_ok() {}
        while self.clients.try_receive().is_ok() {}
        while self.beacons.try_receive().is_ok() {}
        while self.trace.try_receive().is_ok() {}
        self.request_beacon(None);
        self.activity.reset();
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SweepGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{AP, STA};

    fn client(n: u8) -> ClientSighting {
        ClientSighting {
            ap: AP,
            client: MacAddr([0x02, 0, 0, 0, 0, n]),
            rssi: -60,
        }
    }

    #[test]
    fn full_slot_drops_and_counts() {
        let bridge = Bridge::new();
        for n in 0..8 {
            assert!(bridge.post_client(client(n)));
        }
        assert!(!bridge.post_client(client(9)));
        assert_eq!(bridge.counters.snapshot().full, 1);

        // drained in arrival order
        assert_eq!(bridge.next_client().unwrap().client, client(0).client);
        assert!(bridge.post_client(client(10)));
    }

    #[test]
    fn beacon_forwarded_only_when_requested() {
        let bridge = Bridge::new();
        bridge.offer_beacon(AP, &[0x80, 0x00, 1, 2]);
        assert!(bridge.next_beacon().is_none());

        bridge.request_beacon(Some(AP));
        bridge.offer_beacon(STA, &[0x80, 0x00]);
        assert!(bridge.next_beacon().is_none());
        bridge.offer_beacon(AP, &[0x80, 0x00, 1, 2]);
        assert_eq!(bridge.beacon_requested(), None, "request is one-shot");
        let beacon = bridge.next_beacon().unwrap();
        assert_eq!(beacon.bssid, AP);
        assert_eq!(&beacon.frame[..], &[0x80, 0x00, 1, 2]);
    }

    #[test]
    fn sweep_guard_clears_busy() {
        let bridge = Bridge::new();
        {
            let _guard = bridge.sweep();
            assert!(bridge.is_busy());
        }
        assert!(!bridge.is_busy());
    }

    #[test]
    fn activity_take_resets() {
        let activity = ChannelActivity::new();
        activity.record_beacon(6);
        activity.record_beacon(6);
        activity.record_eapol(6);
        activity.record_beacon(200); // out of range, ignored
        assert_eq!(activity.take(6), (2, 1));
        assert_eq!(activity.take(6), (0, 0));
        assert_eq!(activity.take(200), (0, 0));
    }

    #[test]
    fn drain_empties_every_slot() {
        let bridge = Bridge::new();
        bridge.post_client(client(1));
        bridge.trace(Trace::Pmkid { ap: AP });
        bridge.request_beacon(Some(AP));
        bridge.drain();
        assert!(bridge.next_client().is_none());
        assert!(bridge.next_trace().is_none());
        assert_eq!(bridge.beacon_requested(), None);
    }
}
