/// JSON message protocol between the device and a companion host.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::defaults::MAX_JITTER_US;
use crate::engine::Mode;
use crate::types::{MacAddr, Ssid};

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for SSID strings
pub type NameString = String<33>;

/// Raw bytes carried per `file` message
pub const FILE_CHUNK: usize = 160;

/// Hex payload of one `file` message
pub type HexChunk = String<{ FILE_CHUNK * 2 }>;

/// Messages sent from the device to the companion
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Engine status report
    #[serde(rename = "status")]
    Status {
        /// "idle", "passive" or "active"
        mode: &'static str,
        /// Scheduler state name
        state: &'static str,
        running: bool,
        attacking: bool,
        locking: bool,
        ch: u8,
        networks: u16,
        handshakes: u16,
        /// Handshakes with a crackable message pair
        complete: u16,
        pmkids: u16,
        saved: u32,
        frames: u32,
        /// Frames lost to full channels, sweeps and the memory guard
        dropped: u32,
        heap_free: u32,
        /// Uptime in seconds
        uptime: u32,
        board: &'static str,
        version: &'static str,
    },
    /// One entry of the network list
    #[serde(rename = "network")]
    Network {
        bssid: &'a MacString,
        ssid: &'a NameString,
        ch: u8,
        rssi: i8,
        auth: &'static str,
        pmf: bool,
        clients: u8,
        captured: bool,
        attempts: u8,
    },
    /// A capture was made or written out
    #[serde(rename = "capture")]
    Capture {
        /// "handshake" or "pmkid"
        kind: &'static str,
        /// "captured" or "saved"
        event: &'static str,
        bssid: &'a MacString,
        station: &'a MacString,
        /// Uptime in milliseconds
        ts: u32,
    },
    /// Active-mode target change
    #[serde(rename = "target")]
    Target {
        /// "locked" or "skipped"
        event: &'static str,
        bssid: &'a MacString,
        #[serde(skip_serializing_if = "Option::is_none")]
        ssid: Option<&'a NameString>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ch: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        clients: Option<u8>,
    },
    /// Storage write forwarded to a host-side capture sink
    #[serde(rename = "file")]
    File {
        path: &'a str,
        /// Replace the file on the first chunk instead of appending
        append: bool,
        /// Chunk number within this write
        seq: u16,
        data: &'a HexChunk,
        last: bool,
    },
}

/// Partial configuration update; absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub hop_ms: Option<u32>,
    pub lock_ms: Option<u32>,
    pub deauth: Option<bool>,
    pub randomize_mac: Option<bool>,
    pub burst: Option<u8>,
    pub jitter_us: Option<u32>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(v) = self.hop_ms {
            config.hop_interval_ms = v;
        }
        if let Some(v) = self.lock_ms {
            config.lock_time_ms = v;
        }
        if let Some(v) = self.deauth {
            config.deauth_enabled = v;
        }
        if let Some(v) = self.randomize_mac {
            config.randomize_mac = v;
        }
        if let Some(v) = self.burst {
            config.burst_count = v;
        }
        if let Some(v) = self.jitter_us {
            config.jitter_max_us = v.min(MAX_JITTER_US);
        }
    }
}

/// Commands sent from the companion to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, PartialEq)]
pub enum HostCommand {
    /// Start a mode; active while passive runs switches seamlessly
    Start { mode: Mode },
    Stop,
    /// Request current status
    GetStatus,
    /// Request the network list
    ListNetworks,
    /// Add to the skip-list, optionally naming the network
    Skip { bssid: MacAddr, ssid: Option<Ssid> },
    Unskip { bssid: MacAddr },
    Configure(ConfigUpdate),
}

/// Wire format for host commands — flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub mode: Option<String<8>>,
    #[serde(default)]
    pub bssid: Option<MacString>,
    #[serde(default)]
    pub ssid: Option<NameString>,
    #[serde(default)]
    pub hop_ms: Option<u32>,
    #[serde(default)]
    pub lock_ms: Option<u32>,
    #[serde(default)]
    pub deauth: Option<bool>,
    #[serde(default)]
    pub randomize_mac: Option<bool>,
    #[serde(default)]
    pub burst: Option<u8>,
    #[serde(default)]
    pub jitter_us: Option<u32>,
}

impl RawCommand {
    pub(crate) fn config_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            hop_ms: self.hop_ms,
            lock_ms: self.lock_ms,
            deauth: self.deauth,
            randomize_mac: self.randomize_mac,
            burst: self.burst,
            jitter_us: self.jitter_us,
        }
    }
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 512;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
