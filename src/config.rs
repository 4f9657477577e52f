/// Runtime engine configuration.
///
/// Values arrive from the host (see `comm::handle_command`) or from a JSON
/// blob; every field has a default so partial documents are accepted.
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Channel hop interval while the active scheduler scans
    pub hop_interval_ms: u32,
    /// How long the active scheduler scans before ranking targets
    pub scan_duration_ms: u32,
    /// Transmit deauth/disassoc bursts while attacking
    pub deauth_enabled: bool,
    /// Put a random locally-administered MAC on the radio at mode start
    pub randomize_mac: bool,
    /// Listen-only dwell on a locked target before attacking
    pub lock_time_ms: u32,
    /// Repeats per burst round
    pub burst_count: u8,
    /// Upper bound of the random gap between burst frames
    pub jitter_max_us: u32,
    /// Allocations are skipped below this much free heap
    pub min_free_heap: usize,
}

impl EngineConfig {
    pub const fn new() -> Self {
        Self {
            hop_interval_ms: 500,
            scan_duration_ms: 5_000,
            deauth_enabled: true,
            randomize_mac: false,
            lock_time_ms: 4_000,
            burst_count: 5,
            jitter_max_us: 2_000,
            min_free_heap: 24 * 1024,
        }
    }

    /// Parse a JSON config document.
    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json_core::from_slice::<EngineConfig>(data)
            .ok()
            .map(|(config, _)| config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
