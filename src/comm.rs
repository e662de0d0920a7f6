/// Communication helpers — NDJSON serialization, command parsing, line reader.
///
/// Pure protocol logic with no hardware or OS dependencies.
/// BLE GATT definitions and channel types are in the firmware binary (`main.rs`).

use crate::filter::FilterConfig;
use crate::protocol::{DeviceMessage, HostCommand, RawCommand, MAX_MSG_LEN};

/// BLE GATT service UUIDs for AirHound.
///
/// These duplicate the string literals in the `#[gatt_service]` and `#[characteristic]`
/// proc macro attributes in the firmware binary — Rust proc macros require string literals,
/// so we can't reference these constants there. Kept here as the canonical source of truth.
#[allow(dead_code)]
pub mod ble_uuids {
    /// AirHound primary service UUID
    pub const SERVICE: &str = "4a690001-1c4a-4e3c-b5d8-f47b2e1c0a9d";
    /// TX characteristic — scan results, notify
    pub const TX_CHAR: &str = "4a690002-1c4a-4e3c-b5d8-f47b2e1c0a9d";
    /// RX characteristic — commands, write
    pub const RX_CHAR: &str = "4a690003-1c4a-4e3c-b5d8-f47b2e1c0a9d";
}

/// BLE advertising name
pub const BLE_ADV_NAME: &str = "AirHound";

/// Maximum BLE notification payload (MTU-3)
pub const BLE_MAX_NOTIFY: usize = 20;

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

/// Deserialize a HostCommand from a JSON byte slice.
///
/// Uses [`RawCommand`] as an intermediate because `serde_json_core` does not
/// support internally tagged enums (no `deserialize_any`).
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "start" => Some(HostCommand::Start),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "set_rssi" => raw.min_rssi.map(|min_rssi| HostCommand::SetRssi { min_rssi }),
        "set_buzzer" => raw.enabled.map(|enabled| HostCommand::SetBuzzer { enabled }),
        "set_inject" => raw.enabled.map(|enabled| HostCommand::SetInject { enabled }),
        _ => None,
    }
}

/// Process a received host command and update state accordingly.
///
/// Updates `config` and `scanning` as directed. Returns `Some(enabled)` for
/// `SetBuzzer` commands so the caller can apply hardware-specific side effects.
pub fn handle_command(
    cmd: &HostCommand,
    config: &mut FilterConfig,
    scanning: &mut bool,
) -> Option<bool> {
    match cmd {
        HostCommand::Start => {
            *scanning = true;
            log::info!("Scanning started by host command");
            None
        }
        HostCommand::Stop => {
            *scanning = false;
            log::info!("Scanning stopped by host command");
            None
        }
        HostCommand::GetStatus => {
            // Status message will be constructed by the caller with real uptime/heap data
            None
        }
        HostCommand::SetRssi { min_rssi } => {
            config.min_rssi = *min_rssi;
            log::info!("RSSI threshold set to {}", min_rssi);
            None
        }
        HostCommand::SetBuzzer { enabled } => {
            log::info!(
                "Buzzer {}",
                if *enabled { "enabled" } else { "disabled" }
            );
            Some(*enabled)
        }
        HostCommand::SetInject { enabled } => {
            log::info!(
                "Injector {}",
                if *enabled { "enabled" } else { "disabled" }
            );
            // The injector toggle itself is picked up by the caller
            // (it isn't hardware-specific the way the buzzer is), so this
            // arm only logs.
            None
        }
    }
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow — discard and reset
            self.pos = 0;
            None
        }
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0
        && (data[end - 1] == b' '
            || data[end - 1] == b'\n'
            || data[end - 1] == b'\r'
            || data[end - 1] == b'\t')
    {
        end -= 1;
    }
    &data[..end]
}
