/// Communication layer — serial NDJSON transport to a companion host.
///
/// The device streams status, the network list, capture notices and
/// forwarded capture files as newline-delimited JSON. Commands arrive on
/// the same serial line and are applied to the engine between ticks.
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};

use crate::engine::{CaptureEngine, EngineStatus, Mode, Notice};
use crate::error::{Error, Result};
use crate::export::{Saved, Storage};
use crate::protocol::{
    DeviceMessage, HexChunk, HostCommand, MacString, MsgBuffer, NameString, RawCommand, FILE_CHUNK, MAX_MSG_LEN,
    VERSION,
};
use crate::radio::Radio;
use crate::store::Network;
use crate::types::{Hex, MacAddr, Ssid};

/// Output channel for messages to be sent to the companion
pub type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
pub type OutputSender<'a> = Sender<'a, CriticalSectionRawMutex, MsgBuffer, 8>;

/// Command channel for host commands received via serial
pub type CommandChannel = Channel<CriticalSectionRawMutex, HostCommand, 4>;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize into a fresh [`MsgBuffer`].
pub fn encode(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut out = MsgBuffer::new();
    out.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut out)?;
    out.truncate(len);
    Some(out)
}

fn mac_string(mac: &MacAddr) -> MacString {
    let mut s = MacString::new();
    let _ = write!(s, "{}", mac);
    s
}

fn name_string(ssid: &Ssid) -> NameString {
    let mut s = NameString::new();
    if !ssid.is_hidden() {
        let _ = write!(s, "{}", ssid);
    }
    s
}

pub fn encode_status(status: &EngineStatus, heap_free: u32, uptime_s: u32) -> Option<MsgBuffer> {
    let frames = status.frames;
    encode(&DeviceMessage::Status {
        mode: status.mode.as_str(),
        state: status.state,
        running: status.running,
        attacking: status.attacking,
        locking: status.locking,
        ch: status.channel,
        networks: status.networks as u16,
        handshakes: status.handshakes as u16,
        complete: status.complete as u16,
        pmkids: status.pmkids as u16,
        saved: status.export.handshakes + status.export.pmkids,
        frames: frames.frames,
        dropped: frames.busy.saturating_add(frames.full).saturating_add(status.oom_drops),
        heap_free,
        uptime: uptime_s,
        board: crate::board::BOARD_NAME,
        version: VERSION,
    })
}

pub fn encode_network(net: &Network) -> Option<MsgBuffer> {
    let bssid = mac_string(&net.bssid);
    let ssid = name_string(&net.ssid);
    encode(&DeviceMessage::Network {
        bssid: &bssid,
        ssid: &ssid,
        ch: net.channel,
        rssi: net.rssi,
        auth: net.auth.as_str(),
        pmf: net.pmf_required,
        clients: net.clients.len() as u8,
        captured: net.handshake_captured,
        attempts: net.attack_attempts,
    })
}

/// Capture and target notices. Locked targets carry the engine's view of
/// the network.
pub fn encode_notice(notice: &Notice, engine: &CaptureEngine, ts: u32) -> Option<MsgBuffer> {
    let capture = |kind: &'static str, event: &'static str, bssid: &MacAddr, station: &MacAddr| {
        encode(&DeviceMessage::Capture {
            kind,
            event,
            bssid: &mac_string(bssid),
            station: &mac_string(station),
            ts,
        })
    };
    match notice {
        Notice::HandshakeCaptured { bssid, station } => capture("handshake", "captured", bssid, station),
        Notice::PmkidCaptured { bssid, station } => capture("pmkid", "captured", bssid, station),
        Notice::Saved(Saved::Handshake { bssid, station }) => capture("handshake", "saved", bssid, station),
        Notice::Saved(Saved::Pmkid { bssid, station }) => capture("pmkid", "saved", bssid, station),
        Notice::TargetLocked { bssid, channel } => {
            let target = engine.target_snapshot().filter(|t| t.bssid == *bssid);
            let ssid = target.as_ref().map(|t| name_string(&t.ssid));
            encode(&DeviceMessage::Target {
                event: "locked",
                bssid: &mac_string(bssid),
                ssid: ssid.as_ref(),
                ch: Some(*channel),
                clients: target.as_ref().map(|t| t.clients),
            })
        }
        Notice::TargetSkipped { bssid } => encode(&DeviceMessage::Target {
            event: "skipped",
            bssid: &mac_string(bssid),
            ssid: None,
            ch: None,
            clients: None,
        }),
    }
}

/// Split a storage write into hex-encoded `file` messages.
pub fn encode_file(path: &str, data: &[u8], append: bool, mut emit: impl FnMut(MsgBuffer)) -> Result<()> {
    let mut chunks = data.chunks(FILE_CHUNK).peekable();
    let mut hex = HexChunk::new();
    let mut seq = 0u16;
    loop {
        let chunk = chunks.next().unwrap_or(&[]);
        let last = chunks.peek().is_none();
        hex.clear();
        write!(hex, "{}", Hex(chunk))?;
        let msg = encode(&DeviceMessage::File {
            path,
            append: append || seq > 0,
            seq,
            data: &hex,
            last,
        })
        .ok_or(Error::Overflow)?;
        emit(msg);
        if last {
            break;
        }
        seq += 1;
    }
    Ok(())
}

// ── Commands ───────────────────────────────────────────────────────────

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    let bssid = || raw.bssid.as_deref().and_then(MacAddr::parse);
    match raw.cmd.as_str() {
        "start" => Mode::parse(raw.mode.as_deref()?).map(|mode| HostCommand::Start { mode }),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "networks" => Some(HostCommand::ListNetworks),
        "skip" => Some(HostCommand::Skip {
            bssid: bssid()?,
            ssid: raw.ssid.as_deref().and_then(|s| Ssid::from_bytes(s.as_bytes())),
        }),
        "unskip" => Some(HostCommand::Unskip { bssid: bssid()? }),
        "config" => {
            let update = raw.config_update();
            (!update.is_empty()).then_some(HostCommand::Configure(update))
        }
        _ => None,
    }
}

/// What the caller should send back after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Nothing,
    Status,
    Networks,
}

/// Apply a host command to the engine.
pub fn handle_command(
    cmd: HostCommand,
    engine: &mut CaptureEngine,
    now: u32,
    radio: &mut impl Radio,
    storage: &mut impl Storage,
) -> Reply {
    match cmd {
        HostCommand::Start { mode } => {
            let current = engine.mode();
            if current == mode {
                log::info!("Already in {} mode", mode.as_str());
            } else if current == Mode::Passive && mode == Mode::Active {
                engine.switch_seamless(now, radio);
            } else {
                engine.stop(now, radio, storage);
                engine.start(mode, now, radio);
            }
            Reply::Status
        }
        HostCommand::Stop => {
            engine.stop(now, radio, storage);
            log::info!("Capture stopped by host command");
            Reply::Status
        }
        HostCommand::GetStatus => Reply::Status,
        HostCommand::ListNetworks => Reply::Networks,
        HostCommand::Skip { bssid, ssid } => {
            match engine.exclude(bssid, ssid, now, storage) {
                Ok(_) => log::info!("{} skip-listed", bssid),
                Err(e) => log::warn!("Skip-list update for {} failed: {}", bssid, e),
            }
            Reply::Nothing
        }
        HostCommand::Unskip { bssid } => {
            match engine.include(&bssid, storage) {
                Ok(true) => log::info!("{} removed from skip-list", bssid),
                Ok(false) => {}
                Err(e) => log::warn!("Skip-list update for {} failed: {}", bssid, e),
            }
            Reply::Nothing
        }
        HostCommand::Configure(update) => {
            let mut config = *engine.config();
            update.apply(&mut config);
            engine.set_config(config);
            log::info!("Config updated: {:?}", config);
            Reply::Nothing
        }
    }
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected. An overlong line is discarded whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let len = core::mem::take(&mut self.pos);
            if core::mem::take(&mut self.overflowed) || len == 0 {
                return None;
            }
            Some(&self.buf[..len])
        } else if self.overflowed {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            self.overflowed = true;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}
