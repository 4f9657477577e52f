/// Capture export: PCAP files and hashcat 22000 lines.
///
/// Everything for one AP lives under `/handshakes/<BSSID>` with a suffix per
/// artifact. Saves only ever append captures not yet marked saved, so files
/// left by an earlier pass or an earlier session keep their contents.
///
/// The SSID is the salt of every hash line. Export is deferred until one is
/// known, looked up in order from the capture itself, the network store and
/// the SSID sidecar left by an earlier session.
use core::fmt::Write;

use heapless::String;
use log::{debug, info, warn};

use crate::defaults::{MAX_EAPOL_LEN, MAX_HANDSHAKES, MAX_PMKIDS};
use crate::error::{Error, Result};
use crate::parser::{eapol_frame_len, key_mic, key_nonce, KeyMessage, EAPOL_KEY_MIN_LEN, KEY_MIC_OFFSET, LLC_SNAP_EAPOL, MIN_HEADER_LEN};
use crate::store::{Handshake, HandshakeStore, NetworkStore, PmkidEntry, PmkidStore, Stores};
use crate::types::{Hex, MacAddr, Ssid, MAX_SSID_LEN};

/// File sink for captures. Paths are absolute, `/`-separated.
pub trait Storage {
    /// Create or truncate `path` and write `data`.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    /// Append to `path`, creating it when missing.
    fn append(&mut self, path: &str, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes from the start of `path`.
    fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize>;
}

// ── Paths ──────────────────────────────────────────────────────────────

pub const CAPTURE_DIR: &str = "/handshakes";

pub type CapturePath = String<48>;

/// Artifacts written per AP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Pcap,
    HandshakeHashes,
    PmkidHashes,
    HandshakeSsid,
    PmkidSsid,
}

impl Artifact {
    fn suffix(&self) -> &'static str {
        match self {
            Artifact::Pcap => ".pcap",
            Artifact::HandshakeHashes => "_hs.22000",
            Artifact::PmkidHashes => ".22000",
            Artifact::HandshakeSsid => ".txt",
            Artifact::PmkidSsid => "_pmkid.txt",
        }
    }
}

/// `/handshakes/AABBCCDDEEFF<suffix>`
pub fn capture_path(bssid: &MacAddr, artifact: Artifact) -> Result<CapturePath> {
    let mut path = CapturePath::new();
    write!(path, "{}/{}{}", CAPTURE_DIR, bssid.compact(), artifact.suffix())?;
    Ok(path)
}

// ── PCAP ───────────────────────────────────────────────────────────────

pub const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
pub const PCAP_SNAPLEN: u32 = 65_535;
pub const LINKTYPE_IEEE802_11: u32 = 105;

pub const PCAP_HEADER_LEN: usize = 24;
pub const PCAP_RECORD_HEADER_LEN: usize = 16;

/// Largest data frame we rebuild around a stored EAPOL message
pub const MAX_RECONSTRUCTED_LEN: usize = MIN_HEADER_LEN + LLC_SNAP_EAPOL.len() + MAX_EAPOL_LEN;

pub fn pcap_header() -> [u8; PCAP_HEADER_LEN] {
    let mut h = [0u8; PCAP_HEADER_LEN];
    h[0..4].copy_from_slice(&PCAP_MAGIC.to_le_bytes());
    h[4..6].copy_from_slice(&2u16.to_le_bytes());
    h[6..8].copy_from_slice(&4u16.to_le_bytes());
    // thiszone and sigfigs stay zero
    h[16..20].copy_from_slice(&PCAP_SNAPLEN.to_le_bytes());
    h[20..24].copy_from_slice(&LINKTYPE_IEEE802_11.to_le_bytes());
    h
}

pub fn pcap_record_header(timestamp_ms: u32, len: usize) -> [u8; PCAP_RECORD_HEADER_LEN] {
    let len = len as u32;
    let mut h = [0u8; PCAP_RECORD_HEADER_LEN];
    h[0..4].copy_from_slice(&(timestamp_ms / 1000).to_le_bytes());
    h[4..8].copy_from_slice(&((timestamp_ms % 1000) * 1000).to_le_bytes());
    h[8..12].copy_from_slice(&len.to_le_bytes());
    h[12..16].copy_from_slice(&len.to_le_bytes());
    h
}

/// Rebuild the 802.11 data frame an EAPOL message travelled in.
///
/// AP messages go FromDS (to the station), station messages go ToDS.
pub fn reconstruct_frame(
    msg: KeyMessage,
    ap: &MacAddr,
    station: &MacAddr,
    seq: u16,
    eapol: &[u8],
) -> heapless::Vec<u8, MAX_RECONSTRUCTED_LEN> {
    let (flags, a1, a2) = if msg.from_ap() {
        (0x02, station, ap)
    } else {
        (0x01, ap, station)
    };
    let mut f = heapless::Vec::new();
    // Capacity covers header + LLC + MAX_EAPOL_LEN; stored messages never exceed it.
    let _ = f.extend_from_slice(&[0x08, flags, 0x00, 0x00]);
    let _ = f.extend_from_slice(&a1.0);
    let _ = f.extend_from_slice(&a2.0);
    let _ = f.extend_from_slice(&ap.0);
    let _ = f.extend_from_slice(&((seq & 0x0FFF) << 4).to_le_bytes());
    let _ = f.extend_from_slice(&LLC_SNAP_EAPOL);
    let _ = f.extend_from_slice(&eapol[..eapol.len().min(MAX_EAPOL_LEN)]);
    f
}

fn append_record(storage: &mut impl Storage, path: &str, timestamp_ms: u32, frame: &[u8]) -> Result<()> {
    storage.append(path, &pcap_record_header(timestamp_ms, frame.len()))?;
    storage.append(path, frame)
}

/// Complete handshakes of one AP that are not on storage yet, in store order.
fn unsaved_for<'a>(handshakes: &'a HandshakeStore, bssid: &'a MacAddr) -> impl Iterator<Item = &'a Handshake> {
    handshakes
        .iter()
        .filter(move |h| h.bssid == *bssid && h.is_complete() && !h.saved)
}

/// A sink that cannot read reports every file as missing.
fn file_exists(storage: &mut impl Storage, path: &str) -> bool {
    storage.read(path, &mut [0u8; 1]).is_ok_and(|n| n > 0)
}

/// One PCAP per AP. A new file starts with the header and the attached
/// beacon; every pass then appends the messages of newly saved handshakes.
fn write_pcap(storage: &mut impl Storage, handshakes: &HandshakeStore, bssid: &MacAddr) -> Result<usize> {
    let path = capture_path(bssid, Artifact::Pcap)?;
    let mut records = 0;
    if !file_exists(storage, &path) {
        storage.write(&path, &pcap_header())?;
        let beacon = unsaved_for(handshakes, bssid).find_map(|h| h.beacon.as_deref().map(|b| (h.first_seen, b)));
        if let Some((timestamp, beacon)) = beacon {
            append_record(storage, &path, timestamp, beacon)?;
            records += 1;
        }
    }
    let mut seq = 0u16;
    for hs in unsaved_for(handshakes, bssid) {
        for msg in KeyMessage::ALL {
            let Some(slot) = hs.frame(msg) else { continue };
            let frame = reconstruct_frame(msg, &hs.bssid, &hs.station, seq, &slot.data);
            append_record(storage, &path, slot.timestamp, &frame)?;
            seq = seq.wrapping_add(1);
            records += 1;
        }
    }
    Ok(records)
}

// ── hashcat 22000 ──────────────────────────────────────────────────────

/// Longest line: 512-byte EAPOL plus fixed fields
pub const MAX_HASH_LINE: usize = 1280;

pub type HashLine = String<MAX_HASH_LINE>;

/// `WPA*02*MIC*AP*CLIENT*ESSID*ANONCE*EAPOL*PAIR` for a complete handshake.
///
/// MIC and EAPOL come from M2, with the MIC zeroed inside the EAPOL copy;
/// the ANonce comes from M1 or M3 depending on the pair.
pub fn handshake_line(hs: &Handshake, ssid: &Ssid) -> Result<HashLine> {
    let pair = hs.message_pair().ok_or(Error::Malformed)?;
    let m2 = hs.frame(KeyMessage::M2).ok_or(Error::Malformed)?;
    let nonce_slot = hs.frame(pair.nonce_message()).ok_or(Error::Malformed)?;

    let anonce = key_nonce(&nonce_slot.data).ok_or(Error::Malformed)?;
    let mic = key_mic(&m2.data).ok_or(Error::Malformed)?;
    let eapol = &m2.data[..eapol_frame_len(&m2.data)];
    if eapol.len() < EAPOL_KEY_MIN_LEN {
        return Err(Error::Malformed);
    }
    let mut zeroed: heapless::Vec<u8, MAX_EAPOL_LEN> =
        heapless::Vec::from_slice(eapol).map_err(|_| Error::Overflow)?;
    zeroed[KEY_MIC_OFFSET..KEY_MIC_OFFSET + 16].fill(0);

    let mut line = HashLine::new();
    write!(
        line,
        "WPA*02*{}*{}*{}*{}*{}*{}*{:02x}",
        Hex(mic),
        Hex(&hs.bssid.0),
        Hex(&hs.station.0),
        Hex(ssid.as_bytes()),
        Hex(anonce),
        Hex(&zeroed),
        pair.byte()
    )?;
    Ok(line)
}

/// `WPA*01*PMKID*AP*CLIENT*ESSID***01`
pub fn pmkid_line(entry: &PmkidEntry, ssid: &Ssid) -> Result<HashLine> {
    let mut line = HashLine::new();
    write!(
        line,
        "WPA*01*{}*{}*{}*{}***01",
        Hex(&entry.pmkid),
        Hex(&entry.bssid.0),
        Hex(&entry.station.0),
        Hex(ssid.as_bytes())
    )?;
    Ok(line)
}

// ── SSID lookup ────────────────────────────────────────────────────────

/// SSID sidecar left on storage by an earlier export.
fn read_sidecar(storage: &mut impl Storage, path: &str) -> Option<Ssid> {
    let mut buf = [0u8; MAX_SSID_LEN + 2];
    let len = storage.read(path, &mut buf).ok()?;
    let text = &buf[..len];
    let end = text.iter().position(|&b| b == b'\n' || b == b'\r').unwrap_or(text.len());
    Ssid::from_bytes(&text[..end]).filter(|s| !s.is_hidden())
}

fn resolve_ssid(
    known: Option<Ssid>,
    networks: &NetworkStore,
    storage: &mut impl Storage,
    bssid: &MacAddr,
    sidecar: Artifact,
) -> Result<Ssid> {
    if let Some(ssid) = known.filter(|s| !s.is_hidden()) {
        return Ok(ssid);
    }
    if let Some(ssid) = networks.ssid_for(bssid) {
        return Ok(ssid.clone());
    }
    let path = capture_path(bssid, sidecar)?;
    read_sidecar(storage, &path).ok_or(Error::MissingSsid)
}

fn write_sidecar(storage: &mut impl Storage, bssid: &MacAddr, artifact: Artifact, ssid: &Ssid) -> Result<()> {
    let path = capture_path(bssid, artifact)?;
    let mut text: heapless::Vec<u8, { MAX_SSID_LEN + 1 }> = heapless::Vec::new();
    text.extend_from_slice(ssid.as_bytes()).map_err(|_| Error::Overflow)?;
    text.push(b'\n').map_err(|_| Error::Overflow)?;
    storage.write(&path, &text)
}

// ── Exporter ───────────────────────────────────────────────────────────

/// What a save pass persisted, one per capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Handshake { bssid: MacAddr, station: MacAddr },
    Pmkid { bssid: MacAddr, station: MacAddr },
}

/// Export counters for status reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub handshakes: u32,
    pub pmkids: u32,
    /// Save passes skipped for lack of an SSID
    pub deferred: u32,
    pub failures: u32,
}

#[derive(Debug, Default)]
pub struct CaptureExporter {
    stats: ExportStats,
}

fn push_unique<const N: usize>(list: &mut heapless::Vec<MacAddr, N>, bssid: MacAddr) {
    if !list.contains(&bssid) {
        let _ = list.push(bssid);
    }
}

impl CaptureExporter {
    pub const fn new() -> Self {
        Self {
            stats: ExportStats {
                handshakes: 0,
                pmkids: 0,
                deferred: 0,
                failures: 0,
            },
        }
    }

    pub fn stats(&self) -> ExportStats {
        self.stats
    }

    /// Anything complete that still needs writing?
    pub fn has_pending(stores: &Stores) -> bool {
        stores.handshakes.iter().any(|h| h.is_complete() && !h.saved) || stores.pmkids.iter().any(|p| !p.saved)
    }

    /// Persist every unsaved complete handshake and PMKID. Items that fail
    /// or lack an SSID stay unsaved for the next pass. Returns how many
    /// captures were written.
    pub fn save_pending(
        &mut self,
        stores: &mut Stores,
        storage: &mut impl Storage,
        mut on_saved: impl FnMut(Saved),
    ) -> usize {
        let Stores {
            networks,
            handshakes,
            pmkids,
        } = stores;
        let saved = self.save_handshakes(networks, handshakes, storage, &mut on_saved);
        saved + self.save_pmkids(networks, pmkids, storage, &mut on_saved)
    }

    fn save_handshakes(
        &mut self,
        networks: &NetworkStore,
        handshakes: &mut HandshakeStore,
        storage: &mut impl Storage,
        on_saved: &mut impl FnMut(Saved),
    ) -> usize {
        let mut pending: heapless::Vec<MacAddr, MAX_HANDSHAKES> = heapless::Vec::new();
        for hs in handshakes.iter().filter(|h| h.is_complete() && !h.saved) {
            push_unique(&mut pending, hs.bssid);
        }

        let mut saved = 0;
        for bssid in pending {
            let known = handshakes
                .iter()
                .find(|h| h.bssid == bssid && !h.ssid.is_hidden())
                .map(|h| h.ssid.clone());
            let ssid = match resolve_ssid(known, networks, storage, &bssid, Artifact::HandshakeSsid) {
                Ok(ssid) => ssid,
                Err(e) => {
                    debug!("handshake {} deferred: {}", bssid, e);
                    self.stats.deferred += 1;
                    continue;
                }
            };
            handshakes.backfill_ssid(&bssid, &ssid);

            if let Err(e) = Self::write_handshakes(storage, handshakes, &bssid, &ssid) {
                warn!("handshake {} not saved: {}", bssid, e);
                self.stats.failures += 1;
                continue;
            }
            for hs in handshakes.iter_mut().filter(|h| h.bssid == bssid && h.is_complete() && !h.saved) {
                hs.saved = true;
                saved += 1;
                self.stats.handshakes += 1;
                info!("handshake saved: {} {} \"{}\"", hs.bssid, hs.station, ssid);
                on_saved(Saved::Handshake {
                    bssid: hs.bssid,
                    station: hs.station,
                });
            }
        }
        saved
    }

    fn write_handshakes(
        storage: &mut impl Storage,
        handshakes: &HandshakeStore,
        bssid: &MacAddr,
        ssid: &Ssid,
    ) -> Result<()> {
        let path = capture_path(bssid, Artifact::HandshakeHashes)?;
        for hs in unsaved_for(handshakes, bssid) {
            let line = handshake_line(hs, ssid)?;
            storage.append(&path, line.as_bytes())?;
            storage.append(&path, b"\n")?;
        }

        let records = write_pcap(storage, handshakes, bssid)?;
        debug!("{} pcap records for {}", records, bssid);
        write_sidecar(storage, bssid, Artifact::HandshakeSsid, ssid)
    }

    fn save_pmkids(
        &mut self,
        networks: &NetworkStore,
        pmkids: &mut PmkidStore,
        storage: &mut impl Storage,
        on_saved: &mut impl FnMut(Saved),
    ) -> usize {
        let mut pending: heapless::Vec<MacAddr, MAX_PMKIDS> = heapless::Vec::new();
        for entry in pmkids.iter().filter(|p| !p.saved) {
            push_unique(&mut pending, entry.bssid);
        }

        let mut saved = 0;
        for bssid in pending {
            let known = pmkids
                .iter()
                .find(|p| p.bssid == bssid && !p.ssid.is_hidden())
                .map(|p| p.ssid.clone());
            let ssid = match resolve_ssid(known, networks, storage, &bssid, Artifact::PmkidSsid) {
                Ok(ssid) => ssid,
                Err(e) => {
                    debug!("pmkid {} deferred: {}", bssid, e);
                    self.stats.deferred += 1;
                    continue;
                }
            };
            pmkids.backfill_ssid(&bssid, &ssid);

            if let Err(e) = Self::write_pmkids(storage, pmkids, &bssid) {
                warn!("pmkid {} not saved: {}", bssid, e);
                self.stats.failures += 1;
                continue;
            }
            if let Err(e) = write_sidecar(storage, &bssid, Artifact::PmkidSsid, &ssid) {
                warn!("pmkid sidecar {} not written: {}", bssid, e);
            }
            for entry in pmkids.iter_mut().filter(|p| p.bssid == bssid && !p.saved) {
                entry.saved = true;
                saved += 1;
                self.stats.pmkids += 1;
                info!("pmkid saved: {} {} \"{}\"", entry.bssid, entry.station, entry.ssid);
                on_saved(Saved::Pmkid {
                    bssid: entry.bssid,
                    station: entry.station,
                });
            }
        }
        saved
    }

    fn write_pmkids(storage: &mut impl Storage, pmkids: &PmkidStore, bssid: &MacAddr) -> Result<()> {
        let path = capture_path(bssid, Artifact::PmkidHashes)?;
        for entry in pmkids.iter().filter(|p| p.bssid == *bssid && !p.saved) {
            let line = pmkid_line(entry, &entry.ssid)?;
            storage.append(&path, line.as_bytes())?;
            storage.append(&path, b"\n")?;
        }
        Ok(())
    }
}
