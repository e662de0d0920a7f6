//! Radio arbiter (spec.md §4.1): exclusive ownership of the shared RF front
//! end, with suspend/restore of Wi-Fi station credentials when BLE preempts
//! it. Heap queries go through `HeapInfo` so the state machine itself stays
//! hardware-free and testable, mirroring the way `board.rs` keeps hardware
//! facts behind a `pub use hw::*` seam but for a *behavioral* rather than
//! constant seam.

use heapless::String;

use crate::error::{AirhoundError, Result};

pub type Ssid = String<32>;
pub type Psk = String<64>;

/// `Off → WifiUp → WifiPromiscuous ↔ WifiStation → Off` and
/// `Off → BleUp → (BleObserver | BleBroadcaster) → Off`, per spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    WifiUp,
    WifiPromiscuous,
    WifiStation,
    BleUp,
    BleObserver,
    BleBroadcaster,
}

impl RadioMode {
    fn is_wifi(self) -> bool {
        matches!(self, Self::WifiUp | Self::WifiPromiscuous | Self::WifiStation)
    }

    fn is_ble(self) -> bool {
        matches!(self, Self::BleUp | Self::BleObserver | Self::BleBroadcaster)
    }
}

/// Heap observation seam; firmware implements this over the ESP-IDF/esp-hal
/// allocator. Used to pick the Wi-Fi reinit buffer count (spec.md §4.1).
pub trait HeapInfo {
    fn largest_free_block(&self) -> usize;
}

/// Below this many free bytes, the arbiter reinitializes Wi-Fi with a
/// reduced buffer count rather than defaults (spec.md §4.1).
pub const LOW_HEAP_THRESHOLD_BYTES: usize = 40 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiBufferProfile {
    Default,
    Reduced,
}

/// Snapshot of the Wi-Fi station the arbiter restores after a BLE session
/// ends, per spec.md §4.1 ("remembers the prior Wi-Fi mode and SSID/PSK to
/// restore afterwards").
#[derive(Debug, Clone)]
pub struct StationSnapshot {
    pub ssid: Ssid,
    pub psk: Psk,
}

/// A log sink for the "pre-init heap" / "post-init heap" observations
/// spec.md §4.1 calls out explicitly; firmware wires this to `log::info!`
/// alongside a heap reading.
pub trait HeapLog {
    fn log_heap(&mut self, label: &str, bytes: usize);
}

/// The actual radio stack calls, behind a seam so the state machine stays
/// hardware-free. Firmware implements this over `esp-radio`/`esp-idf-svc`.
/// `init_ble`/`init_wifi` model the fallible "bring this stack up" step
/// spec.md §4.1's failure semantics unwind around; `teardown` is best-effort
/// and its failure never blocks a transition to `Off`.
pub trait RadioDriver {
    fn init_ble(&mut self, mode: RadioMode) -> Result<()>;
    fn init_wifi(&mut self, mode: RadioMode, profile: WifiBufferProfile) -> Result<()>;
    fn teardown(&mut self, mode: RadioMode) -> Result<()>;
}

pub struct Arbiter {
    mode: RadioMode,
    suspended_station: Option<StationSnapshot>,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbiter {
    pub const fn new() -> Self {
        Self { mode: RadioMode::Off, suspended_station: None }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Records the Wi-Fi station credentials to restore after BLE releases
    /// the front end. Call this before `request_ble` while still in
    /// `WifiStation`.
    pub fn suspend_station_credentials(&mut self, ssid: &str, psk: &str) -> Result<()> {
        if self.mode != RadioMode::WifiStation {
            return Err(AirhoundError::RadioBusy);
        }
        let mut s = Ssid::new();
        s.push_str(ssid).map_err(|_| AirhoundError::ParseTruncated)?;
        let mut p = Psk::new();
        p.push_str(psk).map_err(|_| AirhoundError::ParseTruncated)?;
        self.suspended_station = Some(StationSnapshot { ssid: s, psk: p });
        Ok(())
    }

    /// Requests BLE ownership, per spec.md §4.1: if Wi-Fi is active it is
    /// torn down first (station credentials must already have been
    /// snapshotted via `suspend_station_credentials` if restore is wanted).
    ///
    /// Failure semantics (spec.md §4.1): if the BLE stack fails to come up,
    /// the suspend step is unwound and the previous stack is reinitialized
    /// best-effort. A failed restore is fatal at the feature level, not the
    /// process level — the arbiter drops to `Off` and surfaces the error
    /// rather than leaving the radio in a half-torn-down state.
    pub fn request_ble(
        &mut self,
        observer: bool,
        heap: &dyn HeapInfo,
        log: &mut dyn HeapLog,
        driver: &mut dyn RadioDriver,
    ) -> Result<RadioMode> {
        if self.mode.is_ble() {
            return Err(AirhoundError::RadioBusy);
        }
        let previous_mode = self.mode;
        log.log_heap("pre-init", heap.largest_free_block());
        let target = if observer { RadioMode::BleObserver } else { RadioMode::BleBroadcaster };

        if driver.init_ble(target).is_err() {
            return self.unwind_to(previous_mode, heap, log, driver);
        }

        self.mode = target;
        log.log_heap("post-init", heap.largest_free_block());
        Ok(self.mode)
    }

    /// Requests Wi-Fi ownership. Returns the buffer profile to initialize
    /// with, chosen from `heap.largest_free_block()` per spec.md §4.1.
    ///
    /// On a failed driver init the arbiter drops straight to `Off` — unlike
    /// BLE preempting Wi-Fi, nothing is ever suspended to make room for
    /// Wi-Fi, so there's no prior stack to restore.
    pub fn request_wifi(
        &mut self,
        promiscuous: bool,
        heap: &dyn HeapInfo,
        log: &mut dyn HeapLog,
        driver: &mut dyn RadioDriver,
    ) -> Result<(RadioMode, WifiBufferProfile)> {
        if !self.mode.is_wifi() {
            log.log_heap("pre-init", heap.largest_free_block());
        }
        let profile = if heap.largest_free_block() < LOW_HEAP_THRESHOLD_BYTES {
            WifiBufferProfile::Reduced
        } else {
            WifiBufferProfile::Default
        };
        let target = if promiscuous { RadioMode::WifiPromiscuous } else { RadioMode::WifiStation };

        if driver.init_wifi(target, profile).is_err() {
            self.mode = RadioMode::Off;
            log.log_heap("init-failed", heap.largest_free_block());
            return Err(AirhoundError::DriverError);
        }

        self.mode = target;
        log.log_heap("post-init", heap.largest_free_block());
        Ok((self.mode, profile))
    }

    /// Unwinds a failed stack-init by reinitializing `previous_mode`
    /// best-effort. Always returns `Err(DriverError)` — the caller asked for
    /// a mode change that didn't happen — but leaves `self.mode` in whatever
    /// state the radio actually ended up in: restored if the reinit worked,
    /// `Off` if it didn't.
    fn unwind_to(
        &mut self,
        previous_mode: RadioMode,
        heap: &dyn HeapInfo,
        log: &mut dyn HeapLog,
        driver: &mut dyn RadioDriver,
    ) -> Result<RadioMode> {
        if previous_mode.is_wifi() {
            let profile = if heap.largest_free_block() < LOW_HEAP_THRESHOLD_BYTES {
                WifiBufferProfile::Reduced
            } else {
                WifiBufferProfile::Default
            };
            if driver.init_wifi(previous_mode, profile).is_ok() {
                self.mode = previous_mode;
                log.log_heap("restore-ok", heap.largest_free_block());
                return Err(AirhoundError::DriverError);
            }
        }
        self.mode = RadioMode::Off;
        log.log_heap("restore-failed", heap.largest_free_block());
        Err(AirhoundError::DriverError)
    }

    /// Takes back any snapshot left by a prior `suspend_station_credentials`
    /// call, for the caller to use when actually restoring Wi-Fi station
    /// mode (spec.md §4.1's suspend/restore sequence).
    pub fn take_suspended_station(&mut self) -> Option<StationSnapshot> {
        self.suspended_station.take()
    }

    /// Releases the current mode back to `Off`. Illegal if already `Off`.
    /// Teardown is best-effort: a driver error here doesn't block the
    /// transition, since the arbiter must not wedge in a non-`Off` mode
    /// once the caller has asked to release it.
    pub fn release(&mut self, driver: &mut dyn RadioDriver) -> Result<()> {
        if self.mode == RadioMode::Off {
            return Err(AirhoundError::RadioBusy);
        }
        let _ = driver.teardown(self.mode);
        self.mode = RadioMode::Off;
        Ok(())
    }
}
