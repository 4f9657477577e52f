//! Truffle library — portable WPA handshake and PMKID capture engine.
//!
//! Everything between the radio callback and the capture files lives here:
//! frame parsing, the callback-side dispatcher, the passive and active
//! schedulers, the network/handshake/PMKID stores and the PCAP + hashcat
//! 22000 exporter. Hardware is reached only through the [`radio::Radio`] and
//! [`export::Storage`] traits, so the whole engine is testable on any host
//! with `cargo test`. The ESP32 firmware binary is a thin consumer that
//! provides the radio, a storage sink and the serial link.
//!
//! Data flow:
//! - the sniffer callback calls [`dispatch::Shared::dispatch`], which parses
//!   the frame and posts events to bounded channels in [`bridge`];
//! - [`engine::CaptureEngine::tick`] drains those channels on the main loop,
//!   owns all stores and runs whichever scheduler is active;
//! - [`comm`] turns engine state into NDJSON for the companion host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod active;
pub mod board;
pub mod bridge;
pub mod comm;
pub mod config;
pub mod cursor;
pub mod defaults;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod export;
pub mod parser;
pub mod passive;
pub mod protocol;
pub mod radio;
pub mod skiplist;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutil;
