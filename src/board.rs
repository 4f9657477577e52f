/// Hardware abstraction for supported boards.
///
/// Each board module defines capabilities selected at compile time via
/// feature flags.

#[cfg(feature = "board-cardputer")]
mod hw {
    pub const HEAP_SIZE: usize = 96 * 1024;
    pub const BOARD_NAME: &str = "m5_cardputer";
}

#[cfg(feature = "board-xiao")]
mod hw {
    pub const HEAP_SIZE: usize = 128 * 1024; // PSRAM-backed
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(not(any(feature = "board-cardputer", feature = "board-xiao")))]
mod hw {
    pub const HEAP_SIZE: usize = 64 * 1024;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

/// The ESP32 promiscuous callback hands over frames with the 4-byte FCS
/// still attached.
pub const RX_TRAILER_LEN: usize = 4;
