//! AirHound — RF wardriving companion device
//!
//! A thin sensor/relay that scans WiFi and BLE, filters results against
//! known surveillance device signatures, and emits matches as NDJSON
//! over BLE GATT notifications and serial.
//!
//! The companion app (DeFlock or similar) handles analysis, scoring,
//! alerting, GPS tagging, and storage.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

// Hardware-specific modules (binary crate only)
#[cfg(feature = "m5stickc")]
mod buzzer;
#[cfg(feature = "m5stickc")]
mod display;

// Re-export library modules so binary submodules (display, buzzer) can use crate::*
pub(crate) use airhound::{
    arbiter, ble, board, capture, channel, classifier, comm, defaults, eapol, filter, inject, odid, pcap, pineap,
    protocol, scanner, wardriving,
};

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use arbiter::{Arbiter, HeapInfo, HeapLog, RadioDriver, RadioMode, WifiBufferProfile};
use ble::{AirTagTable, FlipperTable, FlipperVariant, TrackerType};
use capture::{CaptureItem, CaptureProducer, CaptureType, CaptureWriter, RawQueue, WifiPktType};
use classifier::FrameKind;
use comm::LineReader;
use eapol::HandshakeTable;
use filter::{filter_ble, filter_wifi, format_mac, BleScanInput, FilterConfig, WiFiScanInput};
use odid::AerialDeviceTable;
use pcap::PcapSink;
use pineap::{PineapDetector, PineapEvent};
use protocol::{DeviceMessage, HostCommand, MacString, MsgBuffer, MAX_MSG_LEN, NameString, VERSION};
use scanner::{BleEvent, FrameType, ScanEvent, WiFiEvent};

// ── BLE GATT server definition ──────────────────────────────────────
//
// Moved from comm.rs — proc macros depend on trouble-host which is
// firmware-only. The UUID constants in comm::ble_uuids are the canonical
// source; proc macros require string literals.

#[gatt_service(uuid = "4a690001-1c4a-4e3c-b5d8-f47b2e1c0a9d")]
struct AirHoundGattService {
    /// TX — filtered scan results, notify-only.
    /// Messages are chunked into BLE_MAX_NOTIFY-sized pieces.
    /// The companion accumulates until it sees '\n' (NDJSON delimiter).
    #[characteristic(uuid = "4a690002-1c4a-4e3c-b5d8-f47b2e1c0a9d", notify)]
    tx: [u8; 20],

    /// RX — host commands, write-only.
    /// Companion sends NDJSON commands which are accumulated via LineReader.
    #[characteristic(uuid = "4a690003-1c4a-4e3c-b5d8-f47b2e1c0a9d", write)]
    rx: [u8; 20],
}

/// Top-level AirHound GATT server.
#[gatt_server]
struct AirHoundServer {
    airhound_service: AirHoundGattService,
}

// ── Channel type aliases ──────────────────────────────────────────────

type ScanChannel = Channel<CriticalSectionRawMutex, ScanEvent, 16>;
type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
type BleOutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;
type CommandChannel = Channel<CriticalSectionRawMutex, HostCommand, 4>;

// ── Static channels and shared state ─────────────────────────────────

/// Static channel for scan events from WiFi sniffer ISR + BLE scan task
pub(crate) static SCAN_CHANNEL: ScanChannel = Channel::new();

/// Static channel for serialized output messages
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Static channel for host commands
static CMD_CHANNEL: CommandChannel = Channel::new();

/// Static channel for BLE output — serial task clones messages here
/// for the GATT server to send as notifications.
static BLE_OUTPUT_CHANNEL: BleOutputChannel = Channel::new();

/// Static filter config — shared between tasks via critical-section Mutex.
/// Safe on Embassy's single-threaded executor; the Mutex only guards against
/// ISR access (WiFi sniffer callback).
static FILTER_CONFIG: Mutex<Cell<FilterConfig>> = Mutex::new(Cell::new(FilterConfig::new()));

/// PineAP / evil-twin table, fed by every beacon seen on the filter task.
static PINEAP: Mutex<RefCell<PineapDetector>> = Mutex::new(RefCell::new(PineapDetector::new()));

/// Whether scanning is active (toggled by host Start/Stop commands)
pub(crate) static SCANNING: AtomicBool = AtomicBool::new(true);

/// Number of connected BLE clients
static BLE_CLIENTS: AtomicU8 = AtomicU8::new(0);

/// Match counters for display
pub(crate) static WIFI_MATCH_COUNT: AtomicU32 = AtomicU32::new(0);
pub(crate) static BLE_MATCH_COUNT: AtomicU32 = AtomicU32::new(0);

/// Last match description for display
pub(crate) static LAST_MATCH: Mutex<RefCell<heapless::String<32>>> =
    Mutex::new(RefCell::new(heapless::String::new()));

/// Whether the buzzer is enabled (M5StickC only)
#[cfg(feature = "m5stickc")]
pub(crate) static BUZZER_ENABLED: AtomicBool = AtomicBool::new(true);

/// Signal channel for buzzer beeps (M5StickC only)
#[cfg(feature = "m5stickc")]
pub(crate) static BUZZER_SIGNAL: Channel<CriticalSectionRawMutex, (), 1> = Channel::new();

/// Radio arbiter — tracks which stack (Wi-Fi / BLE) currently owns the
/// shared front end. This firmware runs both concurrently via `join3`
/// rather than time-slicing one at a time, so every transition below is a
/// bookkeeping call (see `FirmwareRadioDriver`), not a hardware gate.
static ARBITER: Mutex<RefCell<Arbiter>> = Mutex::new(RefCell::new(Arbiter::new()));

/// EAPOL 4-way handshake tracker, fed from the Wi-Fi sniffer callback.
static EAPOL_TABLE: Mutex<RefCell<HandshakeTable>> = Mutex::new(RefCell::new(HandshakeTable::new()));

/// AirTag / Flipper Zero / OpenDroneID-BLE device tables, fed from the BLE
/// advertisement report handler.
static AIRTAG_TABLE: Mutex<RefCell<AirTagTable<16>>> = Mutex::new(RefCell::new(AirTagTable::new()));
static FLIPPER_TABLE: Mutex<RefCell<FlipperTable<8>>> = Mutex::new(RefCell::new(FlipperTable::new()));
static AERIAL_TABLE: Mutex<RefCell<AerialDeviceTable<16>>> = Mutex::new(RefCell::new(AerialDeviceTable::new()));

/// Producer half of the capture pipeline's SPSC queue. Set once in `main()`
/// after the queue is split; `None` until then so the Wi-Fi sniffer
/// callback (which can fire before that point on some boot paths) has
/// somewhere safe to no-op.
static CAPTURE_PRODUCER: Mutex<RefCell<Option<CaptureProducer<'static>>>> = Mutex::new(RefCell::new(None));
static CAPTURE_QUEUE: StaticCell<RawQueue> = StaticCell::new();

/// Whether the demo beacon injector is armed (toggled by `set_inject`).
static INJECT_ENABLED: AtomicBool = AtomicBool::new(false);

/// Get a snapshot of the current filter config.
fn get_filter_config() -> FilterConfig {
    critical_section::with(|cs| FILTER_CONFIG.borrow(cs).get())
}

// ── Radio arbiter firmware seams ─────────────────────────────────────

struct FirmwareHeap;

impl HeapInfo for FirmwareHeap {
    fn largest_free_block(&self) -> usize {
        esp_alloc::HEAP.free()
    }
}

struct FirmwareHeapLog;

impl HeapLog for FirmwareHeapLog {
    fn log_heap(&mut self, label: &str, bytes: usize) {
        log::info!("arbiter heap[{}]: {} bytes free", label, bytes);
    }
}

/// Wi-Fi sniffing and BLE scanning already run concurrently for the whole
/// device lifetime (see the `join3` block in `main`) — there is no literal
/// stack teardown/reinit to perform, so every call here just reports
/// success. The arbiter's state machine and failure-unwind paths are still
/// exercised; only the actual radio-stack bring-up is a no-op.
struct FirmwareRadioDriver;

impl RadioDriver for FirmwareRadioDriver {
    fn init_ble(&mut self, _mode: RadioMode) -> airhound::error::Result<()> {
        Ok(())
    }

    fn init_wifi(&mut self, _mode: RadioMode, _profile: WifiBufferProfile) -> airhound::error::Result<()> {
        Ok(())
    }

    fn teardown(&mut self, _mode: RadioMode) -> airhound::error::Result<()> {
        Ok(())
    }
}

fn request_arbiter_mode(f: impl FnOnce(&mut Arbiter, &FirmwareHeap, &mut FirmwareHeapLog, &mut FirmwareRadioDriver)) {
    let heap = FirmwareHeap;
    let mut log = FirmwareHeapLog;
    let mut driver = FirmwareRadioDriver;
    critical_section::with(|cs| {
        let mut arbiter = ARBITER.borrow(cs).borrow_mut();
        f(&mut arbiter, &heap, &mut log, &mut driver);
    });
}

// ── Capture pipeline PCAP sink ───────────────────────────────────────

/// Logging-only sink: no filesystem or SD card exists on this firmware, so
/// records are counted and logged rather than persisted. A real sink would
/// implement `PcapSink` over an SD/SPIFFS file handle and be swapped in
/// here without touching the pipeline above it.
struct LoggingPcapSink {
    bytes_written: u32,
}

impl PcapSink for LoggingPcapSink {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes_written = self.bytes_written.wrapping_add(bytes.len() as u32);
    }

    fn flush(&mut self) {
        log::debug!("pcap sink: {} bytes buffered since last flush", self.bytes_written);
        self.bytes_written = 0;
    }
}

/// Drains the capture queue every 500 ms, matching `callbacks.c`'s PCAP
/// writer task cadence (spec.md §4.2).
#[embassy_executor::task]
async fn capture_writer_task(consumer: heapless::spsc::Consumer<'static, CaptureItem>) {
    let mut writer = CaptureWriter::new(consumer);
    let mut sink = LoggingPcapSink { bytes_written: 0 };
    writer.write_global_header(&mut sink, CaptureType::Wifi);

    loop {
        Timer::after(Duration::from_millis(500)).await;
        writer.drain_into(&mut sink);
    }
}

/// Demo beacon-flood injector, armed/disarmed by the `set_inject` host
/// command. Transmits through the same raw-802.11-TX entry point
/// ESP-IDF's Wi-Fi driver exposes for injection (`esp_wifi_80211_tx`).
const INJECT_SSID: &str = "AirHound-Demo";
const INJECT_INTERVAL_MS: u64 = 200;

#[embassy_executor::task]
async fn inject_task() {
    let mut bssid = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    let mut channel: u8 = 1;

    loop {
        Timer::after(Duration::from_millis(INJECT_INTERVAL_MS)).await;
        if !INJECT_ENABLED.load(Ordering::Relaxed) {
            continue;
        }

        inject::set_locally_administered(&mut bssid);
        if let Ok(frame) = inject::broadcast_beacon(INJECT_SSID, bssid, channel) {
            let ret = unsafe { esp_wifi_80211_tx(0, frame.as_ptr(), frame.len() as i32, true) };
            if ret != 0 {
                log::warn!("inject: esp_wifi_80211_tx failed ({})", ret);
            }
        }
        bssid[5] = bssid[5].wrapping_add(1);
        channel = if channel >= 11 { 1 } else { channel + 1 };
    }
}

// ── WiFi sniffer (moved from scanner.rs — references SCAN_CHANNEL) ──

/// WiFi sniffer callback — called from ISR context by the esp-radio sniffer.
///
/// Parses raw 802.11 frames using `parse_wifi_frame()` (ieee80211 crate)
/// and pushes matching events to the scan channel via `try_send` (non-blocking).
fn wifi_sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    let rssi = pkt.rx_cntl.rssi as i8;
    let channel = pkt.rx_cntl.channel as u8;
    let frame = pkt.data;

    if let Some(event) = scanner::parse_wifi_frame(frame, rssi, channel) {
        let _ = SCAN_CHANNEL.try_send(ScanEvent::WiFi(event));
    }

    let header = classifier::parse_header(frame);
    let pkt_type = match header.as_ref().map(|h| h.fc.kind) {
        Some(FrameKind::Mgmt) => WifiPktType::Mgmt,
        Some(FrameKind::Ctrl) => WifiPktType::Ctrl,
        Some(FrameKind::Data) => WifiPktType::Data,
        None => WifiPktType::Misc,
    };

    let timestamp_us = Instant::now().as_micros();
    critical_section::with(|cs| {
        let mut slot = CAPTURE_PRODUCER.borrow(cs).borrow_mut();
        if let Some(producer) = slot.as_mut() {
            if producer.early_filter(pkt_type, frame.len(), rssi) {
                let _ = producer.enqueue(frame, CaptureType::Wifi, timestamp_us);
            }
        }
    });

    let Some(header) = header else { return };

    if header.fc.kind == FrameKind::Data {
        if let Some(info) = classifier::extract_eapol(frame, &header) {
            if let Some(msg_type) = eapol::classify(&info) {
                let ap = header.addr3;
                let (sta, from_ap) = if header.addr2 == ap { (header.addr1, true) } else { (header.addr2, false) };
                let found = critical_section::with(|cs| {
                    EAPOL_TABLE.borrow(cs).borrow_mut().observe(ap, sta, info.replay_counter, from_ap, msg_type)
                });
                if let Some(handshake) = found {
                    send_handshake_alert(&handshake.ap, &handshake.sta);
                }
            }
        }
        return;
    }

    if header.fc.kind == FrameKind::Mgmt && header.fc.subtype == classifier::subtype::BEACON {
        emit_wardriving_row(frame, &header, rssi, channel);
    }
}

/// Builds and sends a `Handshake` message for a completed (or
/// half-observed, per `eapol::HandshakeTable`) EAPOL pairing.
fn send_handshake_alert(ap: &[u8; 6], sta: &[u8; 6]) {
    let mut ap_str = MacString::new();
    format_mac(ap, &mut ap_str);
    let mut sta_str = MacString::new();
    format_mac(sta, &mut sta_str);
    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::Handshake { ap: &ap_str, sta: &sta_str, ts };
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

/// Derives the auth/WPS/SSID fields from a raw beacon frame and emits one
/// rendered wardriving CSV row (spec.md §4.3 Wardriving, §6).
fn emit_wardriving_row(frame: &[u8], header: &classifier::Header, rssi: i8, channel: u8) {
    let body_off = classifier::body_offset(header);
    // Fixed beacon parameters: 8-byte timestamp, 2-byte interval, 2-byte
    // capability info, before the IEs start.
    if frame.len() < body_off + 12 {
        return;
    }
    let body = &frame[body_off..];
    let capability_info = u16::from_le_bytes([body[10], body[11]]);
    let ies = &body[12..];
    let auth = classifier::derive_auth(ies, capability_info);
    let wps = classifier::detect_wps(ies).is_some();

    let mut name = heapless::String::<32>::new();
    classifier::walk_information_elements(ies, 0, |ie| {
        if ie.id == 0 && name.is_empty() {
            if let Ok(s) = core::str::from_utf8(ie.value) {
                let _ = name.push_str(s);
            }
        }
    });

    let record = wardriving::WardrivingRecord {
        record_type: wardriving::RecordType::Wifi,
        name,
        mac: header.addr3,
        associated_mac: None,
        channel: Some(channel),
        frequency_mhz: None,
        rssi,
        auth: Some(auth),
        cipher: None,
        dot11_standard: None,
        wps,
        gps: None,
        first_seen_ms: Instant::now().as_millis(),
    };
    let row = wardriving::render_row(&record);
    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::Wardriving { row: &row, ts };
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

// FFI bindings for WiFi channel control and raw frame injection.
// Both symbols are linked via esp-radio's WiFi driver (ESP-IDF's
// `esp_wifi.h`).
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
    fn esp_wifi_80211_tx(ifx: u32, buffer: *const u8, len: i32, en_sys_seq: bool) -> i32;
}

/// WiFi channel hop task — drives `channel::Hopper` over the regulatory
/// 2.4 GHz list (promiscuous mode on this hardware doesn't see 5 GHz), one
/// short tick at a time so a failed channel set can be retried per
/// spec.md §4.7 instead of blindly sleeping through the dwell period.
const CHANNEL_HOP_TICK_MS: u32 = 20;

#[embassy_executor::task]
async fn wifi_channel_hop_task() {
    let channels = channel::build_channel_list(None, false);
    let mut hopper = channel::Hopper::new(channels, channel::DEFAULT_DWELL_MS);

    loop {
        Timer::after(Duration::from_millis(CHANNEL_HOP_TICK_MS as u64)).await;
        if let channel::HopOutcome::SetChannel(ch) = hopper.tick(CHANNEL_HOP_TICK_MS) {
            let ret = unsafe { esp_wifi_set_channel(ch, 0) };
            hopper.report_result(ret == 0);
        }
    }
}

// ── BLE scan event handler (moved from scanner.rs) ──────────────────

/// EventHandler for BLE advertisement reports from trouble-host.
///
/// Receives advertisement reports from the BLE stack runner, parses them
/// using `BleAdvParser`, and pushes results to the scan channel.
/// Called synchronously from the runner — must not block.
struct ScanEventHandler;

impl EventHandler for ScanEventHandler {
    fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = it.next() {
            let addr_bytes: &[u8; 6] = report.addr.raw().try_into().unwrap();
            let event = scanner::BleAdvParser::parse(addr_bytes, report.rssi, report.data);
            let _ = SCAN_CHANNEL.try_send(ScanEvent::Ble(event));

            handle_ble_trackers(*addr_bytes, report.rssi, report.data);
        }
    }
}

/// Runs the AirTag / Flipper Zero / generic-tracker / OpenDroneID-BLE /
/// DJI-BLE / skimmer handlers against one raw advertisement report,
/// independent of the name/UUID filter pipeline in `handle_ble_event`.
fn handle_ble_trackers(addr: [u8; 6], rssi: i8, data: &[u8]) {
    let name = ble::complete_name(data);
    let name_str = name.as_ref().map(|s| s.as_str());
    let now_ms = Instant::now().as_millis();

    if ble::matches_airtag_pattern(data) {
        let should_log = critical_section::with(|cs| AIRTAG_TABLE.borrow(cs).borrow_mut().observe(addr, rssi, now_ms));
        if should_log == Some(true) {
            send_tracker_alert("airtag", addr, rssi);
        }
    } else if let Some(variant) = ble::detect_flipper(data) {
        let is_new = critical_section::with(|cs| FLIPPER_TABLE.borrow(cs).borrow_mut().observe(addr, variant, rssi));
        if is_new {
            send_tracker_alert(flipper_kind(variant), addr, rssi);
        }
    } else if let Some(kind) = ble::classify_tracker(data, name_str) {
        send_tracker_alert(tracker_kind(kind), addr, rssi);
    }

    if let Some(odid_payload) = ble::decode_odid_ble(data) {
        let aerial = critical_section::with(|cs| {
            let mut table = AERIAL_TABLE.borrow(cs).borrow_mut();
            let device = table.find_or_create(addr)?;
            device.rssi = rssi;
            device.last_seen_ms = now_ms as u32;
            device.apply_odid_message(odid_payload);
            if device.device_type == odid::AerialType::Unknown {
                device.device_type = odid::AerialType::RemoteIdBle;
            }
            device
                .has_location
                .then(|| (device.latitude, device.longitude, device.altitude, device.device_id.clone()))
        });
        if let Some((lat, lon, alt, device_id)) = aerial {
            send_aerial_alert(addr, device_id.as_str(), lat, lon, alt);
        }
    } else if let Some(description) = ble::decode_dji_ble(data) {
        critical_section::with(|cs| {
            let mut table = AERIAL_TABLE.borrow(cs).borrow_mut();
            if let Some(device) = table.find_or_create(addr) {
                device.rssi = rssi;
                device.last_seen_ms = now_ms as u32;
                device.description = description;
                if device.device_type == odid::AerialType::Unknown {
                    device.device_type = odid::AerialType::DjiBle;
                }
            }
        });
    }

    if let Some(name) = name_str {
        if let Some(reason) = ble::match_skimmer_name(name) {
            send_tracker_alert(reason, addr, rssi);

            let mut record: heapless::Vec<u8, 128> = heapless::Vec::new();
            if ble::build_skimmer_record(addr, rssi, name, reason, data, &mut record).is_some() {
                let timestamp_us = Instant::now().as_micros();
                critical_section::with(|cs| {
                    let mut slot = CAPTURE_PRODUCER.borrow(cs).borrow_mut();
                    if let Some(producer) = slot.as_mut() {
                        let _ = producer.enqueue(&record, CaptureType::Bluetooth, timestamp_us);
                    }
                });
            }
        }
    }
}

fn flipper_kind(variant: FlipperVariant) -> &'static str {
    match variant {
        FlipperVariant::White => "flipper_white",
        FlipperVariant::Black => "flipper_black",
        FlipperVariant::Transparent => "flipper_transparent",
    }
}

fn tracker_kind(kind: TrackerType) -> &'static str {
    match kind {
        TrackerType::AppleAirtag => "airtag",
        TrackerType::AppleFindMy => "findmy",
        TrackerType::SamsungSmartTag => "smarttag",
        TrackerType::Tile => "tile",
        TrackerType::Chipolo => "chipolo",
        TrackerType::GenericFindMy => "findmy_generic",
    }
}

fn send_tracker_alert(kind: &'static str, mac: [u8; 6], rssi: i8) {
    let mut mac_str = MacString::new();
    format_mac(&mac, &mut mac_str);
    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::Tracker { kind, mac: &mac_str, rssi, ts };
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

fn send_aerial_alert(mac: [u8; 6], device_id: &str, lat: f64, lon: f64, alt: f32) {
    let mut mac_str = MacString::new();
    format_mac(&mac, &mut mac_str);
    let mut id_str = NameString::new();
    let _ = id_str.push_str(device_id);
    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::Aerial { mac: &mac_str, device_id: &id_str, lat, lon, alt, ts };
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Set up heap allocator (needed for BLE + WiFi coex stacks).
    // ESP32-S3 needs more heap for coex; ESP32 is tighter on DRAM.
    #[cfg(feature = "esp32")]
    {
        esp_alloc::heap_allocator!(size: 64 * 1024);
    }
    #[cfg(not(feature = "esp32"))]
    {
        esp_alloc::heap_allocator!(size: 128 * 1024);
    }

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("AirHound v{} starting on {}", VERSION, board::BOARD_NAME);

    log::info!(
        "Filter loaded: {} MAC prefixes, {} SSID patterns, {} BLE name patterns",
        defaults::MAC_PREFIXES.len(),
        defaults::SSID_PATTERNS.len(),
        defaults::BLE_NAME_PATTERNS.len(),
    );

    // Capture pipeline: split the SPSC queue, keep the producer half under
    // a Mutex for the (synchronous) Wi-Fi/BLE callbacks, move the consumer
    // half into its own drain task.
    let capture_queue = CAPTURE_QUEUE.init(RawQueue::new());
    let (capture_tx, capture_rx) = capture_queue.split();
    critical_section::with(|cs| {
        *CAPTURE_PRODUCER.borrow(cs).borrow_mut() = Some(CaptureProducer::new(capture_tx));
    });

    // Spawn non-BLE tasks
    spawner.spawn(filter_task(spawner)).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();
    spawner.spawn(command_task()).unwrap();
    spawner.spawn(capture_writer_task(capture_rx)).unwrap();
    spawner.spawn(inject_task()).unwrap();

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "m5stickc")]
    let _power_hold = esp_hal::gpio::Output::new(
        peripherals.GPIO4,
        esp_hal::gpio::Level::High,
        esp_hal::gpio::OutputConfig::default(),
    );

    // Display + buzzer tasks (M5StickC only)
    #[cfg(feature = "m5stickc")]
    {
        spawner
            .spawn(display::display_task(
                peripherals.SPI2,
                peripherals.GPIO15,
                peripherals.GPIO13,
                peripherals.GPIO5,
                peripherals.GPIO14,
                peripherals.GPIO12,
                peripherals.GPIO27,
            ))
            .unwrap();
        log::info!("Display task spawned");

        spawner
            .spawn(buzzer::buzzer_task(peripherals.LEDC, peripherals.GPIO2))
            .unwrap();
        log::info!("Buzzer task spawned");
    }

    log::info!(
        "Build target: {}",
        if cfg!(feature = "xiao") {
            "xiao (ESP32-S3)"
        } else if cfg!(feature = "m5stickc") {
            "m5stickc (ESP32)"
        } else {
            "unknown"
        }
    );

    // ── BLE radio initialization ───────────────────────────────────────
    // BLE must be initialized BEFORE WiFi for coexistence to work
    // (especially on ESP32-S3).

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");

    request_arbiter_mode(|arbiter, heap, heap_log, driver| {
        if let Err(e) = arbiter.request_ble(true, heap, heap_log, driver) {
            log::warn!("arbiter: BLE mode request failed: {:?}", e);
        }
    });

    log::info!("BLE connector initialized");

    // ── WiFi sniffer initialization ─────────────────────────────────────

    let (_wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    request_arbiter_mode(|arbiter, heap, heap_log, driver| {
        if let Err(e) = arbiter.request_wifi(true, heap, heap_log, driver) {
            log::warn!("arbiter: WiFi mode request failed: {:?}", e);
        }
    });

    let mut sniffer = wifi_interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);
    sniffer
        .set_promiscuous_mode(true)
        .expect("Promiscuous mode failed");

    spawner.spawn(wifi_channel_hop_task()).unwrap();

    log::info!("WiFi sniffer initialized in promiscuous mode");

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xab]);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        mut peripheral,
        central,
        mut runner,
        ..
    } = stack.build();

    log::info!("BLE radio initialized");

    // Create GATT server
    let server = AirHoundServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: comm::BLE_ADV_NAME,
        appearance: &appearance::UNKNOWN,
    }))
    .expect("GATT server init failed");

    // Event handler for BLE advertisement reports
    let scan_handler = ScanEventHandler;

    // ── BLE orchestration ──────────────────────────────────────────────
    //
    // Three concurrent futures via join3:
    //   1. BLE stack runner (drives HCI, delivers scan reports to handler)
    //   2. BLE scanner (starts scan, keeps session alive)
    //   3. GATT server (advertise, accept connections, send notifications)

    let _ = embassy_futures::join::join3(
        // ── Runner: drives the BLE stack ────────────────────────────────
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        // ── Scanner: start BLE scan and keep session alive ──────────────
        async {
            let mut scanner = trouble_host::scan::Scanner::new(central);
            let config = ScanConfig::default();

            let result = scanner.scan(&config).await;
            let _session = match result {
                Ok(session) => session,
                Err(e) => {
                    log::error!("BLE scan failed to start: {:?}", e);
                    return;
                }
            };

            log::info!("BLE scan started (active, continuous)");
            // Session stays alive as long as _session exists.
            // Reports flow through ScanEventHandler on the runner.
            loop {
                Timer::after(Duration::from_secs(60)).await;
            }
        },
        // ── GATT server: advertise, connect, notify ─────────────────────
        async {
            loop {
                // Build advertisement data
                let mut adv_data = [0u8; 31];
                let adv_len = match AdStructure::encode_slice(
                    &[
                        AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                        AdStructure::CompleteLocalName(comm::BLE_ADV_NAME.as_bytes()),
                    ],
                    &mut adv_data[..],
                ) {
                    Ok(len) => len,
                    Err(e) => {
                        log::error!("Ad encode error: {:?}", e);
                        Timer::after(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                // Start advertising
                let advertiser = match peripheral
                    .advertise(
                        &Default::default(),
                        Advertisement::ConnectableScannableUndirected {
                            adv_data: &adv_data[..adv_len],
                            scan_data: &[],
                        },
                    )
                    .await
                {
                    Ok(adv) => adv,
                    Err(e) => {
                        log::error!("BLE advertise error: {:?}", e);
                        Timer::after(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                log::info!("BLE advertising as '{}'", comm::BLE_ADV_NAME);

                // Wait for a central to connect
                let conn = match advertiser.accept().await {
                    Ok(c) => c,
                    Err(e) => {
                        log::error!("BLE accept error: {:?}", e);
                        continue;
                    }
                };

                let gatt_conn = match conn.with_attribute_server(&server) {
                    Ok(gc) => gc,
                    Err(e) => {
                        log::error!("GATT setup error: {:?}", e);
                        continue;
                    }
                };

                log::info!("BLE client connected");
                BLE_CLIENTS.fetch_add(1, Ordering::Relaxed);

                // Handle the connection until disconnect
                handle_gatt_connection(&gatt_conn, &server).await;

                BLE_CLIENTS.fetch_sub(1, Ordering::Relaxed);
                log::info!("BLE client disconnected, re-advertising");
            }
        },
    )
    .await;
}

/// Handle a GATT connection: forward output messages as notifications
/// and process incoming writes as host commands.
async fn handle_gatt_connection<'s, P: PacketPool>(
    conn: &GattConnection<'_, 's, P>,
    server: &'s AirHoundServer<'_>,
) {
    let ble_rx = BLE_OUTPUT_CHANNEL.receiver();
    let mut line_reader = LineReader::new();

    loop {
        match embassy_futures::select::select(ble_rx.receive(), conn.next()).await {
            embassy_futures::select::Either::First(msg) => {
                // Chunk the NDJSON message into BLE_MAX_NOTIFY-sized pieces.
                // Pad with newlines so the companion NDJSON parser sees
                // harmless empty lines instead of null bytes.
                for chunk in msg.chunks(comm::BLE_MAX_NOTIFY) {
                    let mut padded = [b'\n'; 20];
                    padded[..chunk.len()].copy_from_slice(chunk);
                    if server
                        .airhound_service
                        .tx
                        .notify(conn, &padded)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            embassy_futures::select::Either::Second(event) => {
                match event {
                    GattConnectionEvent::Disconnected { .. } => return,
                    GattConnectionEvent::Gatt { event } => {
                        // Check if this is a write to our RX characteristic
                        if let GattEvent::Write(ref write_event) = event {
                            if write_event.handle() == server.airhound_service.rx.handle {
                                for &byte in write_event.data() {
                                    if let Some(line) = line_reader.feed(byte) {
                                        if let Some(cmd) = comm::parse_command(line) {
                                            let _ = CMD_CHANNEL.try_send(cmd);
                                        }
                                    }
                                }
                            }
                        }
                        // Must accept/reply to all GATT events
                        match event.accept() {
                            Ok(reply) => reply.send().await,
                            Err(_) => {}
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Filter task — receives raw scan events, applies filters, and serializes
/// matching results to the output channel.
#[embassy_executor::task]
async fn filter_task(spawner: embassy_executor::Spawner) {
    log::info!("Filter task started");

    let scan_rx = SCAN_CHANNEL.receiver();
    let output_tx = OUTPUT_CHANNEL.sender();

    loop {
        let event = scan_rx.receive().await;

        if !SCANNING.load(Ordering::Relaxed) {
            continue;
        }

        let config = get_filter_config();

        match event {
            ScanEvent::WiFi(ref wifi) => {
                handle_wifi_event(wifi, &config, &output_tx, &spawner).await;
            }
            ScanEvent::Ble(ref ble) => {
                handle_ble_event(ble, &config, &output_tx).await;
            }
        }
    }
}

/// Feeds beacon frames into the PineAP/evil-twin detector and acts on
/// whatever events it returns — a one-time OUI-match alert sent immediately,
/// or a deferred summary task spawned to fire ~5s later (see `pineap.rs`).
async fn handle_pineap_beacon(
    wifi: &WiFiEvent,
    output_tx: &embassy_sync::channel::Sender<'_, CriticalSectionRawMutex, MsgBuffer, 8>,
    spawner: &embassy_executor::Spawner,
) {
    if wifi.frame_type != FrameType::Beacon {
        return;
    }
    let now_ms = Instant::now().as_millis();
    let events = critical_section::with(|cs| {
        PINEAP
            .borrow(cs)
            .borrow_mut()
            .observe_beacon(wifi.mac, wifi.channel, wifi.rssi, wifi.ssid.as_str(), now_ms)
    });

    for event in events {
        match event {
            PineapEvent::PineappleOuiMatch { .. } => {
                send_pineap_alert(&wifi.mac, wifi.ssid.as_str(), false, output_tx).await;
            }
            PineapEvent::ScheduleLogTask { network_index, new_token, .. } => {
                let _ = spawner.spawn(pineap_log_task(network_index, new_token));
            }
        }
    }
}

async fn send_pineap_alert(
    bssid: &[u8; 6],
    ssid: &str,
    evil_twin: bool,
    output_tx: &embassy_sync::channel::Sender<'_, CriticalSectionRawMutex, MsgBuffer, 8>,
) {
    let mut mac_str = MacString::new();
    format_mac(bssid, &mut mac_str);
    let mut ssid_str = NameString::new();
    let _ = ssid_str.push_str(ssid);
    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::PineapAlert { bssid: &mac_str, ssid: &ssid_str, evil_twin, ts };
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = output_tx.try_send(buf);
    }
}

/// Fires `pineap::LOG_TASK_DELAY_MS` after a detection. Re-checks the
/// network's pending-token under the lock before logging, since a later
/// detection on the same network may have cancelled-and-replaced this one.
#[embassy_executor::task(pool_size = 4)]
async fn pineap_log_task(network_index: usize, token: u32) {
    Timer::after(Duration::from_millis(pineap::LOG_TASK_DELAY_MS)).await;

    let alert = critical_section::with(|cs| {
        let detector = PINEAP.borrow(cs).borrow();
        let net = detector.network(network_index)?;
        if net.pending_log_task != Some(token) {
            return None; // superseded by a newer detection
        }
        let ssid = net.recent_ssids.last()?.clone();
        let evil_twin = !detector.find_evil_twins(network_index).is_empty();
        Some((net.bssid, ssid, evil_twin))
    });

    if let Some((bssid, ssid, evil_twin)) = alert {
        let output_tx = OUTPUT_CHANNEL.sender();
        send_pineap_alert(&bssid, ssid.as_str(), evil_twin, &output_tx).await;
    }
}

async fn handle_wifi_event(
    wifi: &WiFiEvent,
    config: &FilterConfig,
    output_tx: &embassy_sync::channel::Sender<'_, CriticalSectionRawMutex, MsgBuffer, 8>,
    spawner: &embassy_executor::Spawner,
) {
    handle_pineap_beacon(wifi, output_tx, spawner).await;

    let input = WiFiScanInput {
        mac: &wifi.mac,
        ssid: wifi.ssid.as_str(),
        rssi: wifi.rssi,
    };

    let result = filter_wifi(&input, config);
    if !result.matched {
        return;
    }

    WIFI_MATCH_COUNT.fetch_add(1, Ordering::Relaxed);

    // Update last match description for display
    if let Some(first) = result.matches.first() {
        critical_section::with(|cs| {
            let mut s = LAST_MATCH.borrow(cs).borrow_mut();
            s.clear();
            let _ = s.push_str(&first.detail);
        });
    }

    // Trigger buzzer beep
    #[cfg(feature = "m5stickc")]
    let _ = BUZZER_SIGNAL.try_send(());

    let mut mac_str = MacString::new();
    format_mac(&wifi.mac, &mut mac_str);

    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::WiFiScan {
        mac: &mac_str,
        ssid: &wifi.ssid,
        rssi: wifi.rssi,
        ch: wifi.channel,
        frame: wifi.frame_type.as_str(),
        matches: &result.matches,
        ts,
    };

    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = output_tx.try_send(buf);
    }
}

async fn handle_ble_event(
    ble: &BleEvent,
    config: &FilterConfig,
    output_tx: &embassy_sync::channel::Sender<'_, CriticalSectionRawMutex, MsgBuffer, 8>,
) {
    let input = BleScanInput {
        mac: &ble.mac,
        name: ble.name.as_str(),
        rssi: ble.rssi,
        service_uuids_16: &ble.service_uuids_16,
        manufacturer_id: ble.manufacturer_id,
    };

    let result = filter_ble(&input, config);
    if !result.matched {
        return;
    }

    BLE_MATCH_COUNT.fetch_add(1, Ordering::Relaxed);

    // Update last match description for display
    if let Some(first) = result.matches.first() {
        critical_section::with(|cs| {
            let mut s = LAST_MATCH.borrow(cs).borrow_mut();
            s.clear();
            let _ = s.push_str(&first.detail);
        });
    }

    // Trigger buzzer beep
    #[cfg(feature = "m5stickc")]
    let _ = BUZZER_SIGNAL.try_send(());

    let mut mac_str = MacString::new();
    format_mac(&ble.mac, &mut mac_str);

    let ts = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

    let msg = DeviceMessage::BleScan {
        mac: &mac_str,
        name: &ble.name,
        rssi: ble.rssi,
        uuid: None, // TODO: format primary UUID if present
        mfr: ble.manufacturer_id,
        matches: &result.matches,
        ts,
    };

    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(&msg, &mut buf) {
        buf.truncate(len);
        let _ = output_tx.try_send(buf);
    }
}

/// Serial output task — reads from output channel, logs to serial,
/// and forwards a clone to the BLE output channel.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        // Forward to BLE output channel (non-blocking, drops if full or no client)
        let _ = BLE_OUTPUT_CHANNEL.try_send(msg.clone());

        // Log to serial via esp-println
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(30)).await;

        let uptime_secs = (Instant::now().as_millis() / 1000) as u32;

        let msg = DeviceMessage::Status {
            scanning: SCANNING.load(Ordering::Relaxed),
            uptime: uptime_secs,
            heap_free: esp_alloc::HEAP.free() as u32,
            ble_clients: BLE_CLIENTS.load(Ordering::Relaxed),
            board: board::BOARD_NAME,
            version: VERSION,
        };

        let mut buf = MsgBuffer::new();
        buf.resize_default(MAX_MSG_LEN).ok();
        if let Some(len) = comm::serialize_message(&msg, &mut buf) {
            buf.truncate(len);
            let _ = OUTPUT_CHANNEL.try_send(buf);
        }
    }
}

/// Host command processing task — drains CMD_CHANNEL, updates filter config
/// and scanning state, responds to status requests.
#[embassy_executor::task]
async fn command_task() {
    let cmd_rx = CMD_CHANNEL.receiver();
    let output_tx = OUTPUT_CHANNEL.sender();

    loop {
        let cmd = cmd_rx.receive().await;
        let is_status_request = matches!(cmd, HostCommand::GetStatus);

        if let HostCommand::SetInject { enabled } = &cmd {
            INJECT_ENABLED.store(*enabled, Ordering::Relaxed);
        }

        let mut config = get_filter_config();
        let mut scanning = SCANNING.load(Ordering::Relaxed);

        let buzzer_state = comm::handle_command(&cmd, &mut config, &mut scanning);

        // Apply buzzer side effect (M5StickC only)
        #[cfg(feature = "m5stickc")]
        if let Some(enabled) = buzzer_state {
            BUZZER_ENABLED.store(enabled, Ordering::Relaxed);
        }

        // Suppress unused variable warning on boards without buzzer
        #[cfg(not(feature = "m5stickc"))]
        let _ = buzzer_state;

        // Write back updated state
        critical_section::with(|cs| FILTER_CONFIG.borrow(cs).set(config));
        SCANNING.store(scanning, Ordering::Relaxed);

        // GetStatus: build and send a live status response
        if is_status_request {
            let uptime_secs = (Instant::now().as_millis() / 1000) as u32;
            let msg = DeviceMessage::Status {
                scanning: SCANNING.load(Ordering::Relaxed),
                uptime: uptime_secs,
                heap_free: esp_alloc::HEAP.free() as u32,
                ble_clients: BLE_CLIENTS.load(Ordering::Relaxed),
                board: board::BOARD_NAME,
                version: VERSION,
            };

            let mut buf = MsgBuffer::new();
            buf.resize_default(MAX_MSG_LEN).ok();
            if let Some(len) = comm::serialize_message(&msg, &mut buf) {
                buf.truncate(len);
                let _ = output_tx.try_send(buf);
            }
        }
    }
}
