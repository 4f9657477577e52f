/// Persistent user skip-list.
///
/// Networks on this list are never attacked. The list is a text file with
/// one `BSSID[ SSID]` per line; blank lines and lines starting with `#` are
/// ignored, as are lines whose BSSID does not parse.
use heapless::Vec;

use crate::defaults::MAX_SKIPLIST;
use crate::error::{Error, Result};
use crate::export::Storage;
use crate::types::{MacAddr, Ssid};

/// Location of the skip-list on storage
pub const SKIPLIST_PATH: &str = "/skiplist.txt";

/// Serialized list size: "AA:BB:CC:DD:EE:FF" + ' ' + SSID + '\n' per entry
const SKIPLIST_FILE_MAX: usize = MAX_SKIPLIST * (17 + 1 + 32 + 1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEntry {
    pub bssid: MacAddr,
    pub ssid: Ssid,
}

#[derive(Debug, Default)]
pub struct SkipList {
    entries: Vec<SkipEntry, MAX_SKIPLIST>,
}

impl SkipList {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkipEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, bssid: &MacAddr) -> bool {
        self.entries.iter().any(|e| e.bssid == *bssid)
    }

    /// Add a BSSID. Returns `false` if it was already listed (the SSID is
    /// refreshed when a new one is given).
    pub fn add(&mut self, bssid: MacAddr, ssid: Ssid) -> Result<bool> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.bssid == bssid) {
            if !ssid.is_hidden() {
                entry.ssid = ssid;
            }
            return Ok(false);
        }
        self.entries
            .push(SkipEntry { bssid, ssid })
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(true)
    }

    pub fn remove(&mut self, bssid: &MacAddr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.bssid != *bssid);
        before != self.entries.len()
    }

    /// Parse the file format. Entries past capacity are dropped.
    pub fn parse(text: &[u8]) -> Self {
        let mut list = Self::new();
        for line in text.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() || line[0] == b'#' || line.len() < 17 {
                continue;
            }
            let Some(bssid) = core::str::from_utf8(&line[..17]).ok().and_then(MacAddr::parse) else {
                continue;
            };
            let ssid = match line.get(17) {
                Some(b' ') => Ssid::from_bytes(&line[18..]).unwrap_or_default(),
                _ => Ssid::new(),
            };
            if list.add(bssid, ssid).is_err() {
                break;
            }
        }
        list
    }

    /// Serialize in the file format.
    pub fn serialize(&self) -> Result<Vec<u8, SKIPLIST_FILE_MAX>> {
        use core::fmt::Write;

        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let mut mac = heapless::String::<17>::new();
            write!(mac, "{}", entry.bssid)?;
            out.extend_from_slice(mac.as_bytes()).map_err(|_| Error::Overflow)?;
            if !entry.ssid.is_hidden() {
                out.push(b' ').map_err(|_| Error::Overflow)?;
                out.extend_from_slice(entry.ssid.as_bytes()).map_err(|_| Error::Overflow)?;
            }
            out.push(b'\n').map_err(|_| Error::Overflow)?;
        }
        Ok(out)
    }

    /// Replace the list with the stored copy. A missing file leaves the
    /// list empty.
    pub fn load(storage: &mut impl Storage) -> Result<Self> {
        let mut buf = [0u8; SKIPLIST_FILE_MAX];
        let len = storage.read(SKIPLIST_PATH, &mut buf)?;
        Ok(Self::parse(&buf[..len]))
    }

    pub fn save(&self, storage: &mut impl Storage) -> Result<()> {
        storage.write(SKIPLIST_PATH, &self.serialize()?)
    }
}
