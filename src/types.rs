/// Value types shared across the engine: MAC addresses, SSIDs, auth modes.
use core::fmt;

/// Maximum SSID length in bytes (802.11 limit)
pub const MAX_SSID_LEN: usize = 32;

/// Milliseconds from `since` to `now` on a wrapping 32-bit clock.
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Periodic deadline on the engine clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period_ms: u32,
    last: u32,
}

impl Interval {
    pub const fn new(period_ms: u32) -> Self {
        Self { period_ms, last: 0 }
    }

    pub fn reset(&mut self, now: u32) {
        self.last = now;
    }

    /// True once per period; re-arms when it fires.
    pub fn due(&mut self, now: u32) -> bool {
        if elapsed_ms(now, self.last) >= self.period_ms {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// 48-bit IEEE MAC address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Read an address from the first six bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.get(..6)?.try_into().ok().map(MacAddr)
    }

    /// Parse `AA:BB:CC:DD:EE:FF` (also accepts `-` separators).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 17 {
            return None;
        }
        let mut out = [0u8; 6];
        for (i, part) in s.split(|c| c == ':' || c == '-').enumerate() {
            if i >= 6 || part.len() != 2 {
                return None;
            }
            out[i] = u8::from_str_radix(part, 16).ok()?;
        }
        Some(MacAddr(out))
    }

    /// Group bit set (includes broadcast).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && *self != Self::ZERO
    }

    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Force the locally-administered bit and clear the group bit, so a
    /// random address is valid as a station MAC.
    pub fn with_local_bits(mut self) -> Self {
        self.0[0] = (self.0[0] & 0xFC) | 0x02;
        self
    }

    /// Uppercase hex without separators, used for capture file names.
    pub fn compact(&self) -> Compact<'_> {
        Compact(self)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub struct Compact<'a>(&'a MacAddr);

impl fmt::Display for Compact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 .0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Lowercase hex of a byte slice.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Raw SSID bytes. Not necessarily UTF-8; the bytes are the cracking salt.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Ssid(heapless::Vec<u8, MAX_SSID_LEN>);

impl Ssid {
    pub const fn new() -> Self {
        Ssid(heapless::Vec::new())
    }

    /// `None` if longer than 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        heapless::Vec::from_slice(bytes).ok().map(Ssid)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Empty, or zero-padded by an AP hiding its name.
    pub fn is_hidden(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                for &b in self.0.iter() {
                    let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
                    write!(f, "{}", c)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// Network authentication as advertised in beacons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa3,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Open => "open",
            AuthMode::Wep => "wep",
            AuthMode::Wpa => "wpa",
            AuthMode::Wpa2 => "wpa2",
            AuthMode::WpaWpa2 => "wpa/wpa2",
            AuthMode::Wpa3 => "wpa3",
        }
    }

    /// Lower is weaker, and weaker networks are attacked first. WEP ranks
    /// last among protected modes since it never runs a 4-way handshake.
    pub fn weakness_rank(&self) -> u8 {
        match self {
            AuthMode::Wpa => 0,
            AuthMode::WpaWpa2 => 1,
            AuthMode::Wpa2 => 2,
            AuthMode::Wpa3 => 3,
            AuthMode::Wep => 4,
            AuthMode::Open => 5,
        }
    }
}
