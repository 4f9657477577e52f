//! Frame builders and fake platform collaborators for unit tests.

use std::collections::BTreeMap;
use std::string::String;
use std::vec::Vec;

use crate::error::{Error, Result};
use crate::export::Storage;
use crate::parser::{KeyMessage, LLC_SNAP_EAPOL};
use crate::radio::Radio;
use crate::types::MacAddr;

pub const AP: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
pub const STA: MacAddr = MacAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
pub const ANONCE_FILL: u8 = 0xA5;
pub const SNONCE_FILL: u8 = 0x5A;
pub const MIC_FILL: u8 = 0xC1;

// ── Beacons ────────────────────────────────────────────────────────────

pub struct BeaconBuilder {
    bssid: MacAddr,
    ssid: Vec<u8>,
    channel: Option<u8>,
    privacy: bool,
    rsn: Option<bool>,
    wpa1: bool,
    probe_response: bool,
}

impl BeaconBuilder {
    pub fn new(bssid: MacAddr, ssid: &[u8]) -> Self {
        Self {
            bssid,
            ssid: ssid.to_vec(),
            channel: None,
            privacy: false,
            rsn: None,
            wpa1: false,
            probe_response: false,
        }
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn rsn(mut self, mfp_required: bool) -> Self {
        self.rsn = Some(mfp_required);
        self.privacy = true;
        self
    }

    pub fn wpa1(mut self) -> Self {
        self.wpa1 = true;
        self.privacy = true;
        self
    }

    pub fn privacy(mut self) -> Self {
        self.privacy = true;
        self
    }

    pub fn probe_response(mut self) -> Self {
        self.probe_response = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut f = Vec::new();
        f.push(if self.probe_response { 0x50 } else { 0x80 });
        f.push(0x00);
        f.extend_from_slice(&[0x00, 0x00]);
        if self.probe_response {
            f.extend_from_slice(&STA.0);
        } else {
            f.extend_from_slice(&MacAddr::BROADCAST.0);
        }
        f.extend_from_slice(&self.bssid.0);
        f.extend_from_slice(&self.bssid.0);
        f.extend_from_slice(&[0x10, 0x00]);

        f.extend_from_slice(&[0; 8]); // timestamp
        f.extend_from_slice(&[0x64, 0x00]); // 100 TU
        let caps: u16 = 0x0001 | if self.privacy { 0x0010 } else { 0 };
        f.extend_from_slice(&caps.to_le_bytes());

        f.push(0x00);
        f.push(self.ssid.len() as u8);
        f.extend_from_slice(&self.ssid);
        f.extend_from_slice(&[0x01, 0x08, 0x82, 0x84, 0x8B, 0x96, 0x0C, 0x12, 0x18, 0x24]);
        if let Some(ch) = self.channel {
            f.extend_from_slice(&[0x03, 0x01, ch]);
        }
        if let Some(mfpr) = self.rsn {
            let caps: u16 = if mfpr { 0x00C0 } else { 0x0000 };
            f.extend_from_slice(&[0x30, 0x14, 0x01, 0x00]);
            f.extend_from_slice(&[0x00, 0x0F, 0xAC, 0x04]);
            f.extend_from_slice(&[0x01, 0x00, 0x00, 0x0F, 0xAC, 0x04]);
            f.extend_from_slice(&[0x01, 0x00, 0x00, 0x0F, 0xAC, 0x02]);
            f.extend_from_slice(&caps.to_le_bytes());
        }
        if self.wpa1 {
            f.extend_from_slice(&[0xDD, 0x16, 0x00, 0x50, 0xF2, 0x01, 0x01, 0x00]);
            f.extend_from_slice(&[0x00, 0x50, 0xF2, 0x02]);
            f.extend_from_slice(&[0x01, 0x00, 0x00, 0x50, 0xF2, 0x02]);
            f.extend_from_slice(&[0x01, 0x00, 0x00, 0x50, 0xF2, 0x02]);
        }
        f
    }
}

// ── EAPOL ──────────────────────────────────────────────────────────────

/// EAPOL-Key bytes (from the version byte) for one handshake message.
pub fn eapol_key(msg: KeyMessage, pmkid: Option<[u8; 16]>) -> Vec<u8> {
    let key_info: u16 = match msg {
        KeyMessage::M1 => 0x008A,
        KeyMessage::M2 => 0x010A,
        KeyMessage::M3 => 0x13CA,
        KeyMessage::M4 => 0x030A,
    };
    let nonce = match msg {
        KeyMessage::M1 | KeyMessage::M3 => ANONCE_FILL,
        KeyMessage::M2 => SNONCE_FILL,
        KeyMessage::M4 => 0x00,
    };
    let mic = if msg == KeyMessage::M1 { 0x00 } else { MIC_FILL };

    let mut key_data = Vec::new();
    match (msg, pmkid) {
        (KeyMessage::M1, Some(pmkid)) => {
            key_data.extend_from_slice(&[0xDD, 0x14, 0x00, 0x0F, 0xAC, 0x04]);
            key_data.extend_from_slice(&pmkid);
        }
        (KeyMessage::M2, _) => {
            key_data.extend_from_slice(&[0x30, 0x14, 0x01, 0x00, 0x00, 0x0F, 0xAC, 0x04]);
            key_data.extend_from_slice(&[0x01, 0x00, 0x00, 0x0F, 0xAC, 0x04]);
            key_data.extend_from_slice(&[0x01, 0x00, 0x00, 0x0F, 0xAC, 0x02, 0x00, 0x00]);
        }
        _ => {}
    }

    let body_len = 95 + key_data.len();
    let mut e = Vec::new();
    e.extend_from_slice(&[0x02, 0x03]);
    e.extend_from_slice(&(body_len as u16).to_be_bytes());
    e.push(0x02);
    e.extend_from_slice(&key_info.to_be_bytes());
    e.extend_from_slice(&[0x00, 0x10]);
    e.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, msg.number()]);
    e.extend_from_slice(&[nonce; 32]);
    e.extend_from_slice(&[0; 16]); // IV
    e.extend_from_slice(&[0; 8]); // RSC
    e.extend_from_slice(&[0; 8]); // reserved
    e.extend_from_slice(&[mic; 16]);
    e.extend_from_slice(&(key_data.len() as u16).to_be_bytes());
    e.extend_from_slice(&key_data);
    e
}

/// Three-address data frame between `ap` and `sta` with an LLC/SNAP EAPOL
/// header in front of `payload`.
pub fn data_frame(ap: MacAddr, sta: MacAddr, from_ap: bool, qos: bool, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::new();
    f.push(if qos { 0x88 } else { 0x08 });
    f.push(if from_ap { 0x02 } else { 0x01 });
    f.extend_from_slice(&[0x00, 0x00]);
    if from_ap {
        f.extend_from_slice(&sta.0);
        f.extend_from_slice(&ap.0);
        f.extend_from_slice(&ap.0);
    } else {
        f.extend_from_slice(&ap.0);
        f.extend_from_slice(&sta.0);
        f.extend_from_slice(&ap.0);
    }
    f.extend_from_slice(&[0x00, 0x00]);
    if qos {
        f.extend_from_slice(&[0x00, 0x00]);
    }
    f.extend_from_slice(&LLC_SNAP_EAPOL);
    f.extend_from_slice(payload);
    f
}

pub fn eapol_frame(msg: KeyMessage, ap: MacAddr, sta: MacAddr) -> Vec<u8> {
    data_frame(ap, sta, msg.from_ap(), false, &eapol_key(msg, None))
}

pub fn eapol_frame_with_pmkid(ap: MacAddr, sta: MacAddr, pmkid: [u8; 16]) -> Vec<u8> {
    data_frame(ap, sta, true, false, &eapol_key(KeyMessage::M1, Some(pmkid)))
}

/// Plain (non-EAPOL) data frame, used for client discovery.
pub fn traffic_frame(ap: MacAddr, sta: MacAddr, from_ap: bool) -> Vec<u8> {
    let mut f = data_frame(ap, sta, from_ap, false, &[]);
    let llc = f.len() - LLC_SNAP_EAPOL.len();
    f[llc + 6] = 0x08;
    f[llc + 7] = 0x00;
    f.extend_from_slice(&[0x45; 40]);
    f
}

// ── Fakes ──────────────────────────────────────────────────────────────

/// Radio that records everything the engine asks of it.
pub struct FakeRadio {
    pub channel: u8,
    pub channel_changes: usize,
    pub sniffing: bool,
    pub transmitted: Vec<Vec<u8>>,
    pub mac_randomized: usize,
    pub delayed_us: u64,
    pub free_heap: usize,
    pub rng: u32,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            channel: 1,
            channel_changes: 0,
            sniffing: false,
            transmitted: Vec::new(),
            mac_randomized: 0,
            delayed_us: 0,
            free_heap: 200 * 1024,
            rng: 0x1234_5678,
        }
    }
}

impl Radio for FakeRadio {
    fn set_channel(&mut self, channel: u8) {
        self.channel = channel;
        self.channel_changes += 1;
    }

    fn transmit_raw(&mut self, frame: &[u8]) -> bool {
        self.transmitted.push(frame.to_vec());
        true
    }

    fn set_sniffer(&mut self, enabled: bool) {
        self.sniffing = enabled;
    }

    fn randomize_mac(&mut self, mac: MacAddr) {
        assert!(mac.is_locally_administered());
        self.mac_randomized += 1;
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += us as u64;
    }

    fn random_u32(&mut self) -> u32 {
        // xorshift32
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        x
    }

    fn free_heap(&self) -> usize {
        self.free_heap
    }
}

/// In-memory file store.
#[derive(Default)]
pub struct MemStorage {
    pub files: BTreeMap<String, Vec<u8>>,
    pub offline: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.files.get(path).and_then(|b| core::str::from_utf8(b).ok())
    }
}

impl Storage for MemStorage {
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if self.offline {
            return Err(Error::StorageUnavailable);
        }
        self.files.insert(path.into(), data.to_vec());
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if self.offline {
            return Err(Error::StorageUnavailable);
        }
        self.files.entry(path.into()).or_default().extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize> {
        if self.offline {
            return Err(Error::StorageUnavailable);
        }
        let data = self.files.get(path).ok_or(Error::StorageUnavailable)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}
