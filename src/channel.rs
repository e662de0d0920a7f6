//! Regulatory channel-list construction and the channel-hopping scheduler
//! (spec.md §4.7). The hopper is driven by an externally ticked `tick()`
//! call rather than owning a timer, matching spec.md §5's "channel hopper
//! callbacks never block" and keeping it testable without an executor.

use heapless::Vec;

pub const DEFAULT_DWELL_MS: u32 = 250;
const MAX_CHANNELS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Country {
    UsOrCanada,
    Japan,
    China,
    Eu,
    Other,
}

const TWO_GHZ_NON_OVERLAPPING: [u8; 3] = [1, 6, 11];
const TWO_GHZ_REMAINING: [u8; 10] = [2, 3, 4, 5, 7, 8, 9, 10, 12, 13];
const UNII_1: [u8; 4] = [36, 40, 44, 48];
const UNII_2A: [u8; 4] = [52, 56, 60, 64];
const UNII_2C: [u8; 12] = [100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144];
const UNII_3: [u8; 5] = [149, 153, 157, 161, 165];

/// Builds the allowed-channel list per spec.md §4.7: 2.4 GHz
/// non-overlapping channels first, then the rest of 2.4 GHz, then a
/// country-specific 5 GHz list. `has_5ghz` gates whether any 5 GHz channels
/// are appended at all.
pub fn build_channel_list(country: Option<Country>, has_5ghz: bool) -> Vec<u8, MAX_CHANNELS> {
    let mut out = Vec::new();
    match country {
        None => {
            let _ = out.extend_from_slice(&TWO_GHZ_NON_OVERLAPPING);
            if has_5ghz {
                let _ = out.extend_from_slice(&UNII_1);
            }
            return out;
        }
        Some(_) => {
            let _ = out.extend_from_slice(&TWO_GHZ_NON_OVERLAPPING);
            let _ = out.extend_from_slice(&TWO_GHZ_REMAINING);
        }
    }
    if !has_5ghz {
        return out;
    }
    match country.unwrap() {
        Country::UsOrCanada => {
            let _ = out.extend_from_slice(&UNII_1);
            let _ = out.extend_from_slice(&UNII_2A);
            let _ = out.extend_from_slice(&UNII_2C);
            let _ = out.extend_from_slice(&UNII_3);
        }
        Country::Japan => {
            let _ = out.extend_from_slice(&UNII_1);
            let _ = out.extend_from_slice(&UNII_2A);
            let _ = out.extend_from_slice(&UNII_2C);
        }
        Country::China => {
            let _ = out.extend_from_slice(&UNII_1);
            let _ = out.extend_from_slice(&UNII_2A);
            let _ = out.extend_from_slice(&UNII_3);
        }
        Country::Eu => {
            let _ = out.extend_from_slice(&UNII_1);
            let _ = out.extend_from_slice(&UNII_2A);
            let _ = out.extend_from_slice(&UNII_2C);
        }
        Country::Other => {
            let _ = out.extend_from_slice(&UNII_1);
        }
    }
    out
}

/// Seam for the "probe each 5 GHz channel the driver accepts" construction
/// mode spec.md §4.7 names as an alternative on some variants.
pub trait ChannelProbe {
    fn accepts(&self, channel: u8) -> bool;
}

pub fn build_channel_list_by_probing(probe: &dyn ChannelProbe) -> Vec<u8, MAX_CHANNELS> {
    let mut out = Vec::new();
    for ch in 1..=196u8 {
        if probe.accepts(ch) && out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Result of a scheduler tick: either stay (nothing due yet), a channel to
/// switch to, or the hop giving up after exhausting the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    NotDue,
    SetChannel(u8),
    GaveUp,
}

/// Whether the radio accepted the most recent channel set, fed back via
/// `Hopper::report_result` so the retry logic in spec.md §4.7 can advance.
pub struct Hopper {
    channels: Vec<u8, MAX_CHANNELS>,
    index: usize,
    dwell_ms: u32,
    elapsed_ms: u32,
    fixed: bool,
    retry_count: usize,
}

impl Hopper {
    pub fn new(channels: Vec<u8, MAX_CHANNELS>, dwell_ms: u32) -> Self {
        Self { channels, index: 0, dwell_ms, elapsed_ms: 0, fixed: false, retry_count: 0 }
    }

    /// Setting a fixed channel cancels hopping, per spec.md §4.7.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn current(&self) -> Option<u8> {
        self.channels.get(self.index).copied()
    }

    /// Advances the dwell clock by `delta_ms`; when the dwell elapses and
    /// hopping isn't fixed, returns the next channel to set. The caller
    /// must report back via `report_result` whether the set succeeded.
    pub fn tick(&mut self, delta_ms: u32) -> HopOutcome {
        if self.fixed || self.channels.is_empty() {
            return HopOutcome::NotDue;
        }
        self.elapsed_ms += delta_ms;
        if self.elapsed_ms < self.dwell_ms {
            return HopOutcome::NotDue;
        }
        self.elapsed_ms = 0;
        self.retry_count = 0;
        self.advance_and_try()
    }

    fn advance_and_try(&mut self) -> HopOutcome {
        if self.retry_count >= self.channels.len() {
            return HopOutcome::GaveUp;
        }
        self.index = (self.index + 1) % self.channels.len();
        match self.current() {
            Some(ch) => HopOutcome::SetChannel(ch),
            None => HopOutcome::GaveUp,
        }
    }

    /// Called after the caller attempted to set the channel `tick()`
    /// returned. On failure, retries the next channel up to the list size
    /// before giving up silently, per spec.md §4.7.
    pub fn report_result(&mut self, succeeded: bool) -> HopOutcome {
        if succeeded {
            self.retry_count = 0;
            return HopOutcome::NotDue;
        }
        self.retry_count += 1;
        self.advance_and_try()
    }
}
