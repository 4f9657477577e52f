/// Passive reconnaissance: adaptive channel hopping, never transmits.
///
/// Each channel visit lasts a hop delay derived from what the channel
/// showed last time, scaled by how busy the whole band was over the last
/// full cycle. A visit with handshake traffic or a crowd of beacons turns
/// into a hunt that camps on the channel. A cycle with no traffic at all
/// switches to fast sweeps until something shows up again.
///
/// The scheduler only decides where the radio listens. Store mutation
/// stays with the engine; a PMKID whose network name is still unknown is
/// held here for a short dwell and handed back when resolved or expired.
use log::{debug, info};

use crate::bridge::{ChannelActivity, PmkidCapture};
use crate::defaults::*;
use crate::radio::Radio;
use crate::types::{elapsed_ms, Interval, MacAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveState {
    Hopping,
    /// Paused for one beacon naming a held PMKID's network
    Dwelling,
    /// Camping on a channel with handshake traffic
    Hunting,
    /// Minimum-dwell sweeps after a cycle without traffic
    IdleSweep,
}

impl PassiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassiveState::Hopping => "hopping",
            PassiveState::Dwelling => "dwelling",
            PassiveState::Hunting => "hunting",
            PassiveState::IdleSweep => "idle_sweep",
        }
    }
}

/// What a channel showed on its last visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub beacons: u32,
    pub eapol: u32,
    /// Consecutive visits with no frames at all
    pub dead_streak: u8,
    pub last_hunt: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    beacons: u32,
    eapol: u32,
}

impl Tally {
    fn is_empty(&self) -> bool {
        self.beacons == 0 && self.eapol == 0
    }
}

fn is_primary(channel: u8) -> bool {
    matches!(channel, 1 | 6 | 11)
}

/// Whole-band scaling in permille, from the beacon total of one cycle.
pub fn cycle_permille(cycle_beacons: u32) -> u32 {
    if cycle_beacons < CYCLE_QUIET_BEACONS {
        600
    } else if cycle_beacons > CYCLE_BUSY_BEACONS {
        1200
    } else {
        1000
    }
}

/// Visit length for `channel` given its last visit and the band factor.
pub fn hop_delay_ms(channel: u8, stats: &ChannelStats, cycle_permille: u32) -> u32 {
    if stats.dead_streak >= DEAD_STREAK_LIMIT {
        return HOP_MIN_MS;
    }
    let base = if is_primary(channel) {
        HOP_BASE_PRIMARY_MS
    } else {
        HOP_BASE_SECONDARY_MS
    };
    let per_channel = if stats.beacons >= BUSY_BEACONS {
        base * 3 / 2
    } else if stats.beacons >= NORMAL_BEACONS {
        base
    } else {
        base * 7 / 10
    };
    (per_channel * cycle_permille / 1000).max(HOP_MIN_MS)
}

const STAT_SLOTS: usize = MAX_CHANNEL as usize + 1;

pub struct PassiveRecon {
    state: PassiveState,
    index: usize,
    visit_start: u32,
    state_since: u32,
    delay_ms: u32,
    visit: Tally,
    cycle: Tally,
    cycle_permille: u32,
    stats: [ChannelStats; STAT_SLOTS],
    pending: Option<(PmkidCapture, u32)>,
    decay: Interval,
    cleanup: Interval,
    hops: u32,
}

impl PassiveRecon {
    pub fn new() -> Self {
        Self {
            state: PassiveState::Hopping,
            index: 0,
            visit_start: 0,
            state_since: 0,
            delay_ms: HOP_BASE_PRIMARY_MS,
            visit: Tally::default(),
            cycle: Tally::default(),
            cycle_permille: 1000,
            stats: [ChannelStats::default(); STAT_SLOTS],
            pending: None,
            decay: Interval::new(STATS_DECAY_MS),
            cleanup: Interval::new(PASSIVE_CLEANUP_MS),
            hops: 0,
        }
    }

    /// Reset and tune to the first channel.
    pub fn start(&mut self, now: u32, radio: &mut impl Radio) {
        *self = Self::new();
        self.decay.reset(now);
        self.cleanup.reset(now);
        self.enter_channel(now, radio);
    }

    pub fn state(&self) -> PassiveState {
        self.state
    }

    pub fn channel(&self) -> u8 {
        PASSIVE_CHANNEL_ORDER[self.index]
    }

    pub fn stats(&self, channel: u8) -> ChannelStats {
        self.stats.get(channel as usize).copied().unwrap_or_default()
    }

    /// Length of the current visit
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn holding(&self) -> Option<MacAddr> {
        self.pending.as_ref().map(|(p, _)| p.ap)
    }

    /// True every cleanup period; the engine then ages out its stores.
    pub fn cleanup_due(&mut self, now: u32) -> bool {
        self.cleanup.due(now)
    }

    /// Advance the state machine. Returns a held PMKID whose dwell expired
    /// without its network being named.
    pub fn tick(&mut self, now: u32, radio: &mut impl Radio, activity: &ChannelActivity) -> Option<PmkidCapture> {
        let (beacons, eapol) = activity.take(self.channel());
        self.visit.beacons += beacons;
        self.visit.eapol += eapol;

        if self.decay.due(now) {
            for stats in self.stats.iter_mut() {
                *stats = ChannelStats {
                    last_hunt: stats.last_hunt,
                    ..ChannelStats::default()
                };
            }
            debug!("passive: channel stats decayed");
        }

        if let Some((capture, since)) = &self.pending {
            if elapsed_ms(now, *since) >= DWELL_MS {
                debug!("passive: dwell for {} expired", capture.ap);
                let expired = self.pending.take().map(|(capture, _)| capture);
                if self.state == PassiveState::Dwelling {
                    self.end_dwell(now);
                }
                return expired;
            }
        }

        let in_state = elapsed_ms(now, self.state_since);
        let in_visit = elapsed_ms(now, self.visit_start);
        match self.state {
            PassiveState::Hopping => {
                if self.hunt_triggered(now) {
                    info!(
                        "passive: hunting on ch {} ({} eapol, {} beacons)",
                        self.channel(),
                        self.visit.eapol,
                        self.visit.beacons
                    );
                    self.set_state(PassiveState::Hunting, now);
                } else if in_visit >= self.delay_ms {
                    self.hop(now, radio, activity);
                }
            }
            PassiveState::Hunting => {
                if in_state >= HUNT_DURATION_MS {
                    let channel = self.channel();
                    self.stats[channel as usize].last_hunt = Some(now);
                    self.set_state(PassiveState::Hopping, now);
                    self.hop(now, radio, activity);
                }
            }
            PassiveState::Dwelling => {}
            PassiveState::IdleSweep => {
                if !self.visit.is_empty() {
                    info!("passive: activity on ch {}, resuming hops", self.channel());
                    self.set_state(PassiveState::Hopping, now);
                    self.delay_ms = hop_delay_ms(self.channel(), &self.stats(self.channel()), self.cycle_permille);
                } else if in_visit >= self.delay_ms {
                    self.hop(now, radio, activity);
                }
            }
        }
        None
    }

    /// Hold a PMKID whose SSID is unknown and pause on this channel for a
    /// beacon. A hunt already camps, so it just carries on. Only one PMKID
    /// is held at a time; a second is handed straight back.
    pub fn hold_pmkid(&mut self, capture: PmkidCapture, now: u32) -> Result<(), PmkidCapture> {
        if self.pending.is_some() {
            return Err(capture);
        }
        debug!("passive: dwelling on ch {} for {}", self.channel(), capture.ap);
        self.pending = Some((capture, now));
        if self.state != PassiveState::Hunting {
            self.set_state(PassiveState::Dwelling, now);
        }
        Ok(())
    }

    /// A sighting named `bssid`: release the held PMKID if it belongs to it.
    pub fn resolve_pmkid(&mut self, bssid: &MacAddr, now: u32) -> Option<PmkidCapture> {
        if self.holding() != Some(*bssid) {
            return None;
        }
        let resolved = self.pending.take().map(|(capture, _)| capture);
        if self.state == PassiveState::Dwelling {
            self.end_dwell(now);
        }
        resolved
    }

    /// Give up a held PMKID unresolved, e.g. when leaving passive mode.
    pub fn release(&mut self) -> Option<PmkidCapture> {
        self.pending.take().map(|(capture, _)| capture)
    }

    fn end_dwell(&mut self, now: u32) {
        self.set_state(PassiveState::Hopping, now);
    }

    fn set_state(&mut self, state: PassiveState, now: u32) {
        self.state = state;
        self.state_since = now;
    }

    fn hunt_triggered(&self, now: u32) -> bool {
        let busy = self.visit.eapol >= HUNT_TRIGGER_EAPOL || self.visit.beacons >= HUNT_TRIGGER_BEACONS;
        let cooled = self.stats(self.channel())
            .last_hunt
            .map_or(true, |at| elapsed_ms(now, at) >= HUNT_COOLDOWN_MS);
        busy && cooled
    }

    /// Fold the finished visit into the channel's stats and move on.
    fn hop(&mut self, now: u32, radio: &mut impl Radio, activity: &ChannelActivity) {
        let channel = self.channel();
        let visit = core::mem::take(&mut self.visit);
        let stats = &mut self.stats[channel as usize];
        stats.beacons = visit.beacons;
        stats.eapol = visit.eapol;
        stats.dead_streak = if visit.is_empty() {
            stats.dead_streak.saturating_add(1)
        } else {
            0
        };
        self.cycle.beacons += visit.beacons;
        self.cycle.eapol += visit.eapol;

        self.index = (self.index + 1) % PASSIVE_CHANNEL_ORDER.len();
        self.hops = self.hops.wrapping_add(1);
        if self.index == 0 {
            self.end_cycle(now);
        }
        self.enter_channel(now, radio);
        // frames tagged with this channel before the radio got here
        let _ = activity.take(self.channel());
    }

    fn end_cycle(&mut self, now: u32) {
        let cycle = core::mem::take(&mut self.cycle);
        self.cycle_permille = cycle_permille(cycle.beacons);
        if cycle.is_empty() && self.state == PassiveState::Hopping {
            info!("passive: band silent, sweeping");
            self.set_state(PassiveState::IdleSweep, now);
        }
        debug!(
            "passive: cycle done, {} beacons {} eapol, factor {}",
            cycle.beacons, cycle.eapol, self.cycle_permille
        );
    }

    fn enter_channel(&mut self, now: u32, radio: &mut impl Radio) {
        let channel = self.channel();
        radio.set_channel(channel);
        self.visit_start = now;
        self.visit = Tally::default();
        self.delay_ms = match self.state {
            PassiveState::IdleSweep => IDLE_SWEEP_MS,
            _ => hop_delay_ms(channel, &self.stats(channel), self.cycle_permille),
        };
    }
}

impl Default for PassiveRecon {
    fn default() -> Self {
        Self::new()
    }
}
