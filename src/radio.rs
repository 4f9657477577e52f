/// Radio platform seam and the management frames we transmit.
///
/// The engine never talks to a driver directly: firmware implements
/// [`Radio`] over esp-radio, tests implement it with a recorder.
use crate::types::MacAddr;

/// Everything the engine needs from the radio and the chip around it.
pub trait Radio {
    fn set_channel(&mut self, channel: u8);

    /// Inject a raw 802.11 frame. Returns `false` if the driver refused it.
    fn transmit_raw(&mut self, frame: &[u8]) -> bool;

    /// Enable or disable delivery of received frames to the dispatcher.
    fn set_sniffer(&mut self, enabled: bool);

    fn randomize_mac(&mut self, mac: MacAddr);

    /// Short busy-wait between burst frames.
    fn delay_us(&mut self, us: u32);

    fn random_u32(&mut self) -> u32;

    fn free_heap(&self) -> usize;
}

pub const DEAUTH_FRAME_LEN: usize = 26;

const FC_DEAUTH: u8 = 0xC0;
const FC_DISASSOC: u8 = 0xA0;

/// Deauth/disassoc subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kick {
    Deauth,
    Disassoc,
}

/// Build a 26-byte deauthentication or disassociation frame.
///
/// `seq` is the 12-bit sequence number; fragment number is always zero.
pub fn build_kick(
    kind: Kick,
    da: MacAddr,
    sa: MacAddr,
    bssid: MacAddr,
    reason: u16,
    seq: u16,
) -> [u8; DEAUTH_FRAME_LEN] {
    let mut f = [0u8; DEAUTH_FRAME_LEN];
    f[0] = match kind {
        Kick::Deauth => FC_DEAUTH,
        Kick::Disassoc => FC_DISASSOC,
    };
    f[2..4].copy_from_slice(&314u16.to_le_bytes()); // duration
    f[4..10].copy_from_slice(&da.0);
    f[10..16].copy_from_slice(&sa.0);
    f[16..22].copy_from_slice(&bssid.0);
    f[22..24].copy_from_slice(&((seq & 0x0FFF) << 4).to_le_bytes());
    f[24..26].copy_from_slice(&reason.to_le_bytes());
    f
}

/// Random locally-administered unicast address.
pub fn random_mac(radio: &mut impl Radio) -> MacAddr {
    let a = radio.random_u32().to_le_bytes();
    let b = radio.random_u32().to_le_bytes();
    MacAddr([a[0], a[1], a[2], a[3], b[0], b[1]]).with_local_bits()
}
