/// Compile-time tuning for stores and schedulers.
///
/// Capacities are sized for an ESP32-S3 with the engine held in a static
/// cell; timings are in milliseconds of engine clock.

// ── Store capacities ───────────────────────────────────────────────────

pub const MAX_NETWORKS: usize = 100;
pub const MAX_HANDSHAKES: usize = 25;
pub const MAX_PMKIDS: usize = 50;
pub const MAX_CLIENTS_PER_NETWORK: usize = 8;
pub const MAX_SKIPLIST: usize = 64;

/// Largest EAPOL frame kept per handshake message
pub const MAX_EAPOL_LEN: usize = 512;

/// Largest beacon forwarded for attachment to a handshake
pub const MAX_BEACON_LEN: usize = 512;

/// 2.4 GHz channels usable by the sniffer
pub const MAX_CHANNEL: u8 = 13;

// ── Retention ──────────────────────────────────────────────────────────

/// Clients not heard from in this long are dropped from their network
pub const CLIENT_STALE_MS: u32 = 60_000;

/// Incomplete handshakes with no new message in this long are evicted
pub const HANDSHAKE_INCOMPLETE_MS: u32 = 120_000;

/// Saved handshakes and PMKIDs are released after this long
pub const CAPTURE_RETENTION_MS: u32 = 300_000;

/// Interval of the export retry timer
pub const SAVE_INTERVAL_MS: u32 = 2_000;

// ── Passive recon ──────────────────────────────────────────────────────

/// Primary channels first, then interleaved so adjacent channels are
/// never visited back to back.
pub const PASSIVE_CHANNEL_ORDER: [u8; 13] = [1, 6, 11, 2, 7, 12, 3, 8, 13, 4, 9, 5, 10];

pub const PASSIVE_STALE_MS: u32 = 30_000;
pub const PASSIVE_CLEANUP_MS: u32 = 10_000;

pub const HOP_BASE_PRIMARY_MS: u32 = 250;
pub const HOP_BASE_SECONDARY_MS: u32 = 150;
pub const HOP_MIN_MS: u32 = 80;

/// Beacons in one visit that mark a channel busy
pub const BUSY_BEACONS: u32 = 6;
/// Beacons in one visit below which a channel is light
pub const NORMAL_BEACONS: u32 = 2;
/// Consecutive empty visits before a channel is treated as dead
pub const DEAD_STREAK_LIMIT: u8 = 3;

/// Whole-cycle beacon totals for the spectrum activity factor
pub const CYCLE_QUIET_BEACONS: u32 = 5;
pub const CYCLE_BUSY_BEACONS: u32 = 40;

/// One visit with this much traffic starts a hunt on the channel
pub const HUNT_TRIGGER_EAPOL: u32 = 2;
pub const HUNT_TRIGGER_BEACONS: u32 = 8;
pub const HUNT_DURATION_MS: u32 = 5_000;
pub const HUNT_COOLDOWN_MS: u32 = 20_000;

/// Pause waiting for a beacon that names a PMKID's network
pub const DWELL_MS: u32 = 300;

pub const IDLE_SWEEP_MS: u32 = HOP_MIN_MS;

pub const STATS_DECAY_MS: u32 = 120_000;

// ── Active attack ──────────────────────────────────────────────────────

/// Non-overlapping channels first, then the rest in order
pub const ACTIVE_CHANNEL_ORDER: [u8; 13] = [1, 6, 11, 2, 3, 4, 5, 7, 8, 9, 10, 12, 13];

pub const ACTIVE_STALE_MS: u32 = 60_000;
pub const ACTIVE_CLEANUP_MS: u32 = 30_000;

pub const ATTACK_TIMEOUT_MS: u32 = 15_000;
pub const ATTACK_INTERVAL_MS: u32 = 1_000;
pub const WAIT_MS: u32 = 4_000;
pub const WAIT_EXTENSION_MS: u32 = 3_000;

/// Empty scans or selections in a row before the scheduler gets bored
pub const FAILURE_LIMIT: u8 = 3;
pub const BORED_HOP_MS: u32 = 2_000;
pub const BORED_RETRY_MS: u32 = 30_000;

/// Clients targeted per burst round
pub const MAX_BURST_CLIENTS: usize = 4;

/// Upper bound on the random pause after each transmitted frame
pub const MAX_JITTER_US: u32 = 50_000;

/// Attempts below which a network with clients stays in the first pass
pub const RETRY_WITH_CLIENTS: u8 = 3;
/// Attempts below which any network stays in the second pass
pub const RETRY_ANY: u8 = 2;

pub const REASON_DEAUTH: u16 = 7; // class 3 frame from nonassociated STA
pub const REASON_DISASSOC: u16 = 8; // STA leaving BSS
