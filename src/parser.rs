/// 802.11 / EAPOL frame dissection.
///
/// Pure functions over raw radio bytes, shared by both capture modes and
/// safe to call from the radio callback (no allocation, no blocking).
/// Beacons and probe responses are recognized through the ieee80211 crate;
/// tagged elements, RSN capabilities and EAPOL-Key bodies are read with a
/// bounds-checked [`Cursor`] so that truncated input yields `None`.
use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, ProbeResponseFrame};

use crate::cursor::{Cursor, Elements};
use crate::types::{AuthMode, MacAddr, Ssid};

/// Minimum 802.11 MAC header (FC, duration, three addresses, sequence)
pub const MIN_HEADER_LEN: usize = 24;

/// Tagged elements start after the header and 12 bytes of fixed fields
/// (timestamp, beacon interval, capability info).
pub const IE_OFFSET: usize = MIN_HEADER_LEN + 12;

/// 802.2 LLC/SNAP header announcing an EAPOL (0x888E) payload
pub const LLC_SNAP_EAPOL: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];

// EAPOL-Key layout, offsets from the EAPOL version byte
pub const EAPOL_HEADER_LEN: usize = 4;
pub const KEY_DESCRIPTOR_OFFSET: usize = 4;
pub const KEY_INFO_OFFSET: usize = 5;
pub const KEY_NONCE_OFFSET: usize = 17;
pub const KEY_MIC_OFFSET: usize = 81;
pub const KEY_DATA_LEN_OFFSET: usize = 97;
pub const KEY_DATA_OFFSET: usize = 99;
/// Shortest EAPOL-Key frame: header plus key body up to the key-data length
pub const EAPOL_KEY_MIN_LEN: usize = KEY_DATA_OFFSET;

const EAPOL_TYPE_KEY: u8 = 3;
pub const DESCRIPTOR_RSN: u8 = 0x02;
pub const DESCRIPTOR_WPA: u8 = 0xFE;

const PMKID_KDE_PREFIX: [u8; 6] = [0xDD, 0x14, 0x00, 0x0F, 0xAC, 0x04];

const EID_SSID: u8 = 0;
const EID_DS_PARAMS: u8 = 3;
const EID_RSN: u8 = 48;
const EID_VENDOR: u8 = 221;
const WPA1_OUI_TYPE: [u8; 4] = [0x00, 0x50, 0xF2, 0x01];

const CAP_PRIVACY: u16 = 0x0010;
const RSN_CAP_MFPR: u16 = 0x0040;
const RSN_CAP_MFPC: u16 = 0x0080;

pub const SUBTYPE_PROBE_RESPONSE: u8 = 5;
pub const SUBTYPE_BEACON: u8 = 8;

// ── Frame control ──────────────────────────────────────────────────────

/// 802.11 frame type from the frame control field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Management,
    Control,
    Data,
    Extension,
}

impl FrameKind {
    /// Classify from the first frame control byte.
    pub fn from_fc(fc0: u8) -> Self {
        match (fc0 >> 2) & 0x03 {
            0 => FrameKind::Management,
            1 => FrameKind::Control,
            2 => FrameKind::Data,
            _ => FrameKind::Extension,
        }
    }

    pub fn of(frame: &[u8]) -> Option<Self> {
        frame.first().map(|&b| Self::from_fc(b))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Management => "mgmt",
            FrameKind::Control => "ctrl",
            FrameKind::Data => "data",
            FrameKind::Extension => "ext",
        }
    }
}

/// The two frame control bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl([u8; 2]);

impl FrameControl {
    pub fn read(frame: &[u8]) -> Option<Self> {
        Cursor::new(frame).array().map(FrameControl)
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_fc(self.0[0])
    }

    pub fn subtype(&self) -> u8 {
        self.0[0] >> 4
    }

    pub fn to_ds(&self) -> bool {
        self.0[1] & 0x01 != 0
    }

    pub fn from_ds(&self) -> bool {
        self.0[1] & 0x02 != 0
    }

    pub fn protected(&self) -> bool {
        self.0[1] & 0x40 != 0
    }

    /// +HTC/Order bit; on QoS data frames it announces a 4-byte HT control field.
    pub fn order(&self) -> bool {
        self.0[1] & 0x80 != 0
    }

    pub fn is_qos_data(&self) -> bool {
        self.kind() == FrameKind::Data && self.subtype() & 0x08 != 0
    }
}

// ── Beacon / probe response ────────────────────────────────────────────

/// What a beacon or probe response tells us about an access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub bssid: MacAddr,
    pub ssid: Ssid,
    /// From the DS parameter set, when present
    pub channel: Option<u8>,
    pub auth: AuthMode,
    pub pmf_required: bool,
    pub pmf_capable: bool,
    pub probe_response: bool,
}

/// RSN capability bits relevant to deauth immunity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsnInfo {
    pub mfp_required: bool,
    pub mfp_capable: bool,
}

/// Parse a beacon or probe response. Any other frame, or a malformed
/// element list, yields `None`.
pub fn parse_network(frame: &[u8]) -> Option<NetworkInfo> {
    if frame.len() < IE_OFFSET {
        return None;
    }

    let result = match_frames! {
        frame,
        beacon = BeaconFrame<'_> => {
            (beacon.header.transmitter_address.0, false)
        }
        probe_resp = ProbeResponseFrame<'_> => {
            (probe_resp.header.transmitter_address.0, true)
        }
    };
    let (bssid, probe_response) = result.ok()?;

    let mut fixed = Cursor::at(frame, MIN_HEADER_LEN)?;
    fixed.skip(10)?; // timestamp + beacon interval
    let capabilities = fixed.u16_le()?;

    let mut ssid = Ssid::new();
    let mut channel = None;
    let mut rsn = None;
    let mut wpa1 = false;

    for element in Elements::new(&frame[IE_OFFSET..]) {
        match element.id {
            // An over-long SSID cannot be a hash salt; track the AP as hidden.
            EID_SSID => ssid = Ssid::from_bytes(element.body).unwrap_or_else(Ssid::new),
            EID_DS_PARAMS if element.body.len() == 1 => channel = Some(element.body[0]),
            EID_RSN => rsn = Some(parse_rsn(element.body)),
            EID_VENDOR if element.body.starts_with(&WPA1_OUI_TYPE) => wpa1 = true,
            _ => {}
        }
    }

    let rsn_info = rsn.unwrap_or_default();
    let auth = match (rsn, wpa1) {
        (Some(info), _) if info.mfp_required => AuthMode::Wpa3,
        (Some(_), true) => AuthMode::WpaWpa2,
        (Some(_), false) => AuthMode::Wpa2,
        (None, true) => AuthMode::Wpa,
        (None, false) if capabilities & CAP_PRIVACY != 0 => AuthMode::Wep,
        (None, false) => AuthMode::Open,
    };

    Some(NetworkInfo {
        bssid: MacAddr(bssid),
        ssid,
        channel,
        auth,
        pmf_required: rsn_info.mfp_required,
        pmf_capable: rsn_info.mfp_capable,
        probe_response,
    })
}

/// Read RSN capabilities past the version, group cipher and the
/// variable-length pairwise and AKM suite lists. A body that ends before
/// the capabilities field reports no PMF.
pub fn parse_rsn(body: &[u8]) -> RsnInfo {
    fn capabilities(body: &[u8]) -> Option<u16> {
        let mut cur = Cursor::new(body);
        cur.skip(2 + 4)?; // version, group cipher
        let pairwise = cur.u16_le()? as usize;
        cur.skip(pairwise.checked_mul(4)?)?;
        let akm = cur.u16_le()? as usize;
        cur.skip(akm.checked_mul(4)?)?;
        cur.u16_le()
    }

    match capabilities(body) {
        Some(caps) => RsnInfo {
            mfp_required: caps & RSN_CAP_MFPR != 0,
            mfp_capable: caps & RSN_CAP_MFPC != 0,
        },
        None => RsnInfo::default(),
    }
}

// ── Data frames ────────────────────────────────────────────────────────

/// Addresses of a data frame resolved through the To-DS/From-DS table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAddrs {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub bssid: MacAddr,
}

/// Resolve source, destination and BSSID. Four-address (WDS) frames are
/// rejected.
pub fn resolve_addresses(frame: &[u8]) -> Option<DataAddrs> {
    let fc = FrameControl::read(frame)?;
    let mut cur = Cursor::at(frame, 4)?;
    let a1 = MacAddr(cur.array()?);
    let a2 = MacAddr(cur.array()?);
    let a3 = MacAddr(cur.array()?);

    match (fc.to_ds(), fc.from_ds()) {
        (false, false) => Some(DataAddrs { dst: a1, src: a2, bssid: a3 }),
        (true, false) => Some(DataAddrs { dst: a3, src: a2, bssid: a1 }),
        (false, true) => Some(DataAddrs { dst: a1, src: a3, bssid: a2 }),
        (true, true) => None,
    }
}

/// Payload of an unprotected data frame carrying LLC/SNAP + EAPOL, starting
/// at the EAPOL version byte.
pub fn eapol_payload(frame: &[u8]) -> Option<&[u8]> {
    let fc = FrameControl::read(frame)?;
    if fc.kind() != FrameKind::Data || fc.protected() || (fc.to_ds() && fc.from_ds()) {
        return None;
    }

    let mut offset = MIN_HEADER_LEN;
    if fc.is_qos_data() {
        offset += 2;
        if fc.order() {
            offset += 4;
        }
    }

    let mut cur = Cursor::at(frame, offset)?;
    if cur.take(LLC_SNAP_EAPOL.len())? != LLC_SNAP_EAPOL {
        return None;
    }
    Some(cur.rest())
}

// ── EAPOL-Key ──────────────────────────────────────────────────────────

/// Which message of the 4-way handshake a key frame is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyMessage {
    M1,
    M2,
    M3,
    M4,
}

impl KeyMessage {
    pub const ALL: [KeyMessage; 4] = [KeyMessage::M1, KeyMessage::M2, KeyMessage::M3, KeyMessage::M4];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Presence bit in a handshake mask (bit 0 = M1 .. bit 3 = M4)
    pub fn bit(&self) -> u8 {
        1 << self.index()
    }

    /// M1 and M3 are sent by the AP.
    pub fn from_ap(&self) -> bool {
        matches!(self, KeyMessage::M1 | KeyMessage::M3)
    }

    pub fn number(&self) -> u8 {
        self.index() as u8 + 1
    }
}

/// EAPOL-Key information field (802.11i bit layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo(pub u16);

impl KeyInfo {
    const PAIRWISE: u16 = 0x0008;
    const INSTALL: u16 = 0x0040;
    const ACK: u16 = 0x0080;
    const MIC: u16 = 0x0100;
    const SECURE: u16 = 0x0200;

    pub fn pairwise(&self) -> bool {
        self.0 & Self::PAIRWISE != 0
    }

    pub fn install(&self) -> bool {
        self.0 & Self::INSTALL != 0
    }

    pub fn ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }

    pub fn mic(&self) -> bool {
        self.0 & Self::MIC != 0
    }

    pub fn secure(&self) -> bool {
        self.0 & Self::SECURE != 0
    }

    /// Classify a pairwise key message. Group-key messages and any other
    /// bit combination return `None`.
    pub fn message(&self) -> Option<KeyMessage> {
        if !self.pairwise() {
            return None;
        }
        match (self.ack(), self.mic(), self.install(), self.secure()) {
            (true, false, _, _) => Some(KeyMessage::M1),
            (false, true, false, false) => Some(KeyMessage::M2),
            (true, true, true, _) => Some(KeyMessage::M3),
            (false, true, _, true) => Some(KeyMessage::M4),
            _ => None,
        }
    }
}

/// A classified EAPOL-Key frame.
#[derive(Debug, Clone, Copy)]
pub struct EapolKey<'a> {
    pub message: KeyMessage,
    pub ap: MacAddr,
    pub station: MacAddr,
    pub descriptor: u8,
    pub key_info: KeyInfo,
    /// EAPOL bytes from the version byte to the end of the capture
    pub eapol: &'a [u8],
}

/// Extract and classify an EAPOL-Key frame from a data frame.
pub fn parse_eapol(frame: &[u8]) -> Option<EapolKey<'_>> {
    let addrs = resolve_addresses(frame)?;
    let eapol = eapol_payload(frame)?;
    if eapol.len() < EAPOL_KEY_MIN_LEN || eapol[1] != EAPOL_TYPE_KEY {
        return None;
    }

    let mut cur = Cursor::at(eapol, KEY_DESCRIPTOR_OFFSET)?;
    let descriptor = cur.u8()?;
    if descriptor != DESCRIPTOR_RSN && descriptor != DESCRIPTOR_WPA {
        return None;
    }
    let key_info = KeyInfo(cur.u16_be()?);
    let message = key_info.message()?;

    let station = if message.from_ap() { addrs.dst } else { addrs.src };
    if !station.is_unicast() || station == addrs.bssid {
        return None;
    }

    Some(EapolKey {
        message,
        ap: addrs.bssid,
        station,
        descriptor,
        key_info,
        eapol,
    })
}

/// PMKID from the key data of an RSN M1. All-zero PMKIDs, which some APs
/// send as a placeholder, are treated as absent.
pub fn extract_pmkid(key: &EapolKey<'_>) -> Option<[u8; 16]> {
    if key.message != KeyMessage::M1 || key.descriptor != DESCRIPTOR_RSN {
        return None;
    }

    let mut cur = Cursor::at(key.eapol, KEY_DATA_LEN_OFFSET)?;
    let data_len = cur.u16_be()? as usize;
    let key_data = cur.take(data_len.min(cur.remaining()))?;

    let start = key_data
        .windows(PMKID_KDE_PREFIX.len())
        .position(|w| w == PMKID_KDE_PREFIX)?;
    let mut kde = Cursor::at(key_data, start + PMKID_KDE_PREFIX.len())?;
    let pmkid: [u8; 16] = kde.array()?;

    (pmkid != [0u8; 16]).then_some(pmkid)
}

/// Declared EAPOL frame length (header + body), capped at what was captured.
pub fn eapol_frame_len(eapol: &[u8]) -> usize {
    let declared = Cursor::at(eapol, 2)
        .and_then(|mut c| c.u16_be())
        .map_or(eapol.len(), |len| len as usize + EAPOL_HEADER_LEN);
    declared.min(eapol.len())
}

/// Key nonce field (ANonce in M1/M3, SNonce in M2).
pub fn key_nonce(eapol: &[u8]) -> Option<&[u8]> {
    eapol.get(KEY_NONCE_OFFSET..KEY_NONCE_OFFSET + 32)
}

pub fn key_mic(eapol: &[u8]) -> Option<&[u8]> {
    eapol.get(KEY_MIC_OFFSET..KEY_MIC_OFFSET + 16)
}
