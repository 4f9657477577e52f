//! Truffle — handshake and PMKID capture firmware
//!
//! Sniffs 802.11 traffic in promiscuous mode, reconstructs WPA 4-way
//! handshakes and PMKIDs, and in active mode deauthenticates clients of a
//! chosen AP to provoke fresh handshakes. Status, notices and capture files
//! stream to a companion host as NDJSON over the USB serial port.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::fmt::Write as _;

use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::usb_serial_jtag::UsbSerialJtag;
use esp_radio::wifi::sniffer::{PromiscuousPkt, Sniffer};
use esp_radio::wifi::WifiController;
use static_cell::StaticCell;

use truffle::board;
use truffle::comm::{self, CommandChannel, LineReader, OutputChannel, OutputSender, Reply};
use truffle::config::EngineConfig;
use truffle::dispatch::{RxMeta, Shared};
use truffle::engine::{CaptureEngine, Mode};
use truffle::error::{Error, Result};
use truffle::export::Storage;
use truffle::protocol::VERSION;
use truffle::radio::Radio;
use truffle::types::MacAddr;

// ── Static channels and shared state ─────────────────────────────────

/// Everything the sniffer callback touches
static SHARED: Shared = Shared::with_trailer(board::RX_TRAILER_LEN);

/// Static channel for serialized output messages
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Static channel for host commands
static CMD_CHANNEL: CommandChannel = Channel::new();

static ENGINE: StaticCell<CaptureEngine<'static>> = StaticCell::new();

/// Main-loop period
const TICK_MS: u64 = 10;

/// Unsolicited status report period
const STATUS_INTERVAL_MS: u32 = 30_000;

fn now_ms() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

// ── WiFi sniffer ─────────────────────────────────────────────────────

/// Promiscuous callback — runs in the WiFi driver's context. Hands the
/// frame to the dispatcher and returns.
fn wifi_sniffer_callback(pkt: PromiscuousPkt<'_>) {
    let meta = RxMeta {
        rssi: pkt.rx_cntl.rssi as i8,
        channel: pkt.rx_cntl.channel as u8,
    };
    SHARED.dispatch(pkt.data, meta);
}

// FFI bindings for channel and MAC control.
// The symbols are linked via esp-radio's WiFi driver.
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
    fn esp_wifi_set_mac(ifx: u32, mac: *const u8) -> i32;
}

const WIFI_IF_STA: u32 = 0;

/// [`Radio`] over the esp-radio sniffer.
struct EspRadio {
    sniffer: Sniffer<'static>,
    _controller: WifiController<'static>,
    delay: esp_hal::delay::Delay,
    rng: esp_hal::rng::Rng,
}

impl Radio for EspRadio {
    fn set_channel(&mut self, channel: u8) {
        unsafe {
            esp_wifi_set_channel(channel, 0);
        }
    }

    fn transmit_raw(&mut self, frame: &[u8]) -> bool {
        self.sniffer.send_raw_frame(false, frame, false).is_ok()
    }

    fn set_sniffer(&mut self, enabled: bool) {
        if let Err(e) = self.sniffer.set_promiscuous_mode(enabled) {
            log::warn!("Promiscuous mode change failed: {:?}", e);
        }
    }

    fn randomize_mac(&mut self, mac: MacAddr) {
        let rc = unsafe { esp_wifi_set_mac(WIFI_IF_STA, mac.0.as_ptr()) };
        if rc != 0 {
            log::warn!("esp_wifi_set_mac failed: {}", rc);
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_micros(us);
    }

    fn random_u32(&mut self) -> u32 {
        self.rng.random()
    }

    fn free_heap(&self) -> usize {
        esp_alloc::HEAP.free()
    }
}

// ── Host-side storage ────────────────────────────────────────────────

/// Capture sink for boards without an SD card: every write becomes a run
/// of `file` messages printed straight to serial. Nothing can be read back.
struct SerialStorage;

impl SerialStorage {
    fn forward(&mut self, path: &str, data: &[u8], append: bool) -> Result<()> {
        comm::encode_file(path, data, append, |msg| {
            if let Ok(s) = core::str::from_utf8(&msg) {
                esp_println::print!("{}", s);
            }
        })
    }
}

impl Storage for SerialStorage {
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.forward(path, data, false)
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.forward(path, data, true)
    }

    fn read(&mut self, _path: &str, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::StorageUnavailable)
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: board::HEAP_SIZE);

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("Truffle v{} starting on {}", VERSION, board::BOARD_NAME);

    let (controller, interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");
    let mut sniffer = interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);

    let radio = EspRadio {
        sniffer,
        _controller: controller,
        delay: esp_hal::delay::Delay::new(),
        rng: esp_hal::rng::Rng::new(),
    };
    log::info!("WiFi sniffer ready");

    let engine = ENGINE.init_with(|| CaptureEngine::new(&SHARED, EngineConfig::new()));
    engine.load_skiplist(&mut SerialStorage);

    let serial = UsbSerialJtag::new(peripherals.USB_DEVICE);

    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(command_task(serial)).unwrap();
    spawner.spawn(engine_task(engine, radio)).unwrap();
}

/// Engine task — owns the engine and the radio. Applies host commands,
/// ticks the engine and forwards its notices.
#[embassy_executor::task]
async fn engine_task(engine: &'static mut CaptureEngine<'static>, mut radio: EspRadio) {
    log::info!("Engine task started");

    let cmd_rx = CMD_CHANNEL.receiver();
    let output_tx = OUTPUT_CHANNEL.sender();
    let mut storage = SerialStorage;
    let mut last_status = now_ms();

    engine.start(Mode::Passive, now_ms(), &mut radio);

    loop {
        let now = now_ms();

        while let Ok(cmd) = cmd_rx.try_receive() {
            match comm::handle_command(cmd, engine, now, &mut radio, &mut storage) {
                Reply::Nothing => {}
                Reply::Status => send_status(engine, &output_tx),
                Reply::Networks => {
                    for net in engine.networks() {
                        if let Some(msg) = comm::encode_network(net) {
                            output_tx.send(msg).await;
                        }
                    }
                }
            }
        }

        engine.tick(now, &mut radio, &mut storage);

        while let Some(notice) = engine.poll_notice() {
            if let Some(msg) = comm::encode_notice(&notice, engine, now) {
                let _ = output_tx.try_send(msg);
            }
        }

        if now.wrapping_sub(last_status) >= STATUS_INTERVAL_MS {
            last_status = now;
            send_status(engine, &output_tx);
        }

        Timer::after(Duration::from_millis(TICK_MS)).await;
    }
}

fn send_status(engine: &CaptureEngine, output_tx: &OutputSender<'_>) {
    let uptime_secs = (Instant::now().as_millis() / 1000) as u32;
    let heap_free = esp_alloc::HEAP.free() as u32;
    if let Some(msg) = comm::encode_status(&engine.status(), heap_free, uptime_secs) {
        let _ = output_tx.try_send(msg);
    }
}

/// Serial output task — prints queued messages as NDJSON lines.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            esp_println::print!("{}", s);
        }
    }
}

/// Host command task — polls the USB serial port and queues parsed
/// commands for the engine task.
#[embassy_executor::task]
async fn command_task(mut serial: UsbSerialJtag<'static, esp_hal::Blocking>) {
    let mut reader = LineReader::new();
    let mut buf = [0u8; 64];

    loop {
        let n = serial.drain_rx_fifo(&mut buf);
        for &byte in &buf[..n] {
            if let Some(line) = reader.feed(byte) {
                match comm::parse_command(line) {
                    Some(cmd) => {
                        let _ = CMD_CHANNEL.try_send(cmd);
                    }
                    None => {
                        let mut preview = heapless::String::<32>::new();
                        for &b in line.iter().take(32) {
                            let _ = preview.write_char(if b.is_ascii_graphic() { b as char } else { '.' });
                        }
                        log::warn!("Ignoring unknown command: {}", preview);
                    }
                }
            }
        }
        Timer::after(Duration::from_millis(50)).await;
    }
}
