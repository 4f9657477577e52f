/// Frame dispatch from the radio callback.
///
/// [`Shared`] is the only state the callback touches. It holds the bridge
/// and a reference to the current [`FrameConsumer`]; switching modes swaps
/// that reference inside a critical section. Dispatch strips the driver
/// trailer, drops runts and frames that arrive during a store sweep, and
/// hands everything else to exactly one consumer method.
use core::cell::Cell;

use critical_section::Mutex;

use crate::bridge::{Bridge, ClientSighting, Counters, EapolCapture, PmkidCapture, Sighting, Trace};
use crate::defaults::MAX_EAPOL_LEN;
use crate::parser::{
    extract_pmkid, parse_eapol, parse_network, resolve_addresses, FrameControl, FrameKind, MIN_HEADER_LEN,
    SUBTYPE_BEACON, SUBTYPE_PROBE_RESPONSE,
};

/// Receive metadata supplied by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMeta {
    pub rssi: i8,
    pub channel: u8,
}

/// A mode's frame handlers. Runs in the radio callback context: must not
/// block, allocate or log.
pub trait FrameConsumer: Sync {
    fn name(&self) -> &'static str;

    /// Beacons and probe responses.
    fn on_management(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta);

    fn on_data(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta);
}

/// State shared between the radio callback and the main loop.
pub struct Shared {
    pub bridge: Bridge,
    consumer: Mutex<Cell<Option<&'static dyn FrameConsumer>>>,
    trailer_len: usize,
}

impl Shared {
    pub const fn new() -> Self {
        Self::with_trailer(0)
    }

    /// For drivers that append `len` bytes (e.g. an FCS) to every frame.
    pub const fn with_trailer(len: usize) -> Self {
        Self {
            bridge: Bridge::new(),
            consumer: Mutex::new(Cell::new(None)),
            trailer_len: len,
        }
    }

    /// Replace the current consumer. `None` makes dispatch a no-op.
    pub fn install(&self, consumer: Option<&'static dyn FrameConsumer>) {
        critical_section::with(|cs| self.consumer.borrow(cs).set(consumer));
    }

    pub fn consumer(&self) -> Option<&'static dyn FrameConsumer> {
        critical_section::with(|cs| self.consumer.borrow(cs).get())
    }

    /// Entry point for the radio callback.
    pub fn dispatch(&self, raw: &[u8], meta: RxMeta) {
        let counters = &self.bridge.counters;
        let frame = &raw[..raw.len().saturating_sub(self.trailer_len)];
        Counters::bump(&counters.frames);
        if frame.len() < MIN_HEADER_LEN {
            Counters::bump(&counters.short);
            return;
        }
        let Some(consumer) = self.consumer() else {
            return;
        };
        if self.bridge.is_busy() {
            Counters::bump(&counters.busy);
            return;
        }
        let Some(fc) = FrameControl::read(frame) else {
            return;
        };
        match (fc.kind(), fc.subtype()) {
            (FrameKind::Management, SUBTYPE_BEACON | SUBTYPE_PROBE_RESPONSE) => {
                consumer.on_management(&self.bridge, frame, meta)
            }
            (FrameKind::Data, _) => consumer.on_data(&self.bridge, frame, meta),
            _ => {}
        }
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

// ── Harvesting shared by both modes ────────────────────────────────────

fn post_sighting(bridge: &Bridge, frame: &[u8], meta: RxMeta) {
    let Some(info) = parse_network(frame) else {
        return;
    };
    let bssid = info.bssid;
    bridge.post_sighting(Sighting {
        info,
        rssi: meta.rssi,
        channel: meta.channel,
    });
    bridge.offer_beacon(bssid, frame);
}

/// Post EAPOL, PMKID or client events for a data frame. Returns whether
/// the frame was an EAPOL-Key message.
fn harvest_data(bridge: &Bridge, frame: &[u8], meta: RxMeta) -> bool {
    let Some(key) = parse_eapol(frame) else {
        post_client(bridge, frame, meta);
        return false;
    };

    let eapol = &key.eapol[..key.eapol.len().min(MAX_EAPOL_LEN)];
    if let Ok(eapol) = heapless::Vec::from_slice(eapol) {
        bridge.post_eapol(EapolCapture {
            ap: key.ap,
            station: key.station,
            message: key.message,
            eapol,
            channel: meta.channel,
        });
        bridge.trace(Trace::Eapol {
            message: key.message,
            ap: key.ap,
            station: key.station,
        });
    }

    if let Some(pmkid) = extract_pmkid(&key) {
        bridge.post_pmkid(PmkidCapture {
            ap: key.ap,
            station: key.station,
            pmkid,
            channel: meta.channel,
        });
        bridge.trace(Trace::Pmkid { ap: key.ap });
    }
    true
}

fn post_client(bridge: &Bridge, frame: &[u8], meta: RxMeta) {
    let Some(addrs) = resolve_addresses(frame) else {
        return;
    };
    if !addrs.bssid.is_unicast() {
        return;
    }
    let client = [addrs.src, addrs.dst]
        .into_iter()
        .find(|mac| mac.is_unicast() && *mac != addrs.bssid);
    if let Some(client) = client {
        bridge.post_client(ClientSighting {
            ap: addrs.bssid,
            client,
            rssi: meta.rssi,
        });
    }
}

// ── Consumers ──────────────────────────────────────────────────────────

/// Listen-only consumer. Also feeds per-channel activity to the hop logic.
pub struct PassiveSniffer;

impl FrameConsumer for PassiveSniffer {
    fn name(&self) -> &'static str {
        "passive"
    }

    fn on_management(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta) {
        Counters::bump(&bridge.counters.passive);
        bridge.activity.record_beacon(meta.channel);
        post_sighting(bridge, frame, meta);
    }

    fn on_data(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta) {
        Counters::bump(&bridge.counters.passive);
        if harvest_data(bridge, frame, meta) {
            bridge.activity.record_eapol(meta.channel);
        }
    }
}

/// Consumer for the attack scheduler.
pub struct ActiveSniffer;

impl FrameConsumer for ActiveSniffer {
    fn name(&self) -> &'static str {
        "active"
    }

    fn on_management(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta) {
        Counters::bump(&bridge.counters.active);
        post_sighting(bridge, frame, meta);
    }

    fn on_data(&self, bridge: &Bridge, frame: &[u8], meta: RxMeta) {
        Counters::bump(&bridge.counters.active);
        harvest_data(bridge, frame, meta);
    }
}

pub static PASSIVE: PassiveSniffer = PassiveSniffer;
pub static ACTIVE: ActiveSniffer = ActiveSniffer;
