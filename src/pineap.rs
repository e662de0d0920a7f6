//! PineAP / evil-twin detector (spec.md §4.8), grounded in `callbacks.c`'s
//! `find_or_create_network`/blacklist/is_pineapple_oui logic. The deferred
//! ~5 s log summary is modeled as a cancellation-token + arena-index pair
//! rather than an owned timer, keeping this module executor-free.

use heapless::{String, Vec};

use crate::classifier::djb2;

pub const MAX_NETWORKS: usize = 20;
pub const MIN_SSIDS_FOR_DETECTION: u32 = 2;
pub const RECENT_SSID_SLOTS: usize = 5;
pub const MAX_SSID_HASHES: usize = 10;
pub const BLACKLIST_COOLDOWN_MS: u64 = 30_000;
pub const LOG_TASK_DELAY_MS: u64 = 5_000;

pub const PINEAPPLE_OUIS: [[u8; 3]; 1] = [[0x00, 0x13, 0x37]];

pub fn is_pineapple_oui(bssid: &[u8; 6]) -> bool {
    PINEAPPLE_OUIS.iter().any(|oui| bssid[0..3] == *oui)
}

pub type Ssid = String<32>;

#[derive(Debug, Clone)]
pub struct PineapNetwork {
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i8,
    pub ssid_hashes: Vec<u32, MAX_SSID_HASHES>,
    pub recent_ssids: Vec<Ssid, RECENT_SSID_SLOTS>,
    pub recent_ssid_index: usize,
    pub is_pineap: bool,
    pub has_pineapple_oui: bool,
    pub oui_logged: bool,
    /// Set when a log task is pending for this network; a later detection
    /// on the same network cancels-and-replaces it rather than stacking.
    pub pending_log_task: Option<u32>,
}

impl PineapNetwork {
    fn new(bssid: [u8; 6]) -> Self {
        Self {
            bssid,
            channel: 0,
            rssi: 0,
            ssid_hashes: Vec::new(),
            recent_ssids: Vec::new(),
            recent_ssid_index: 0,
            is_pineap: false,
            has_pineapple_oui: is_pineapple_oui(&bssid),
            oui_logged: false,
            pending_log_task: None,
        }
    }

    fn push_recent_ssid(&mut self, ssid: &str) {
        let mut s = Ssid::new();
        let _ = s.push_str(ssid);
        if self.recent_ssids.len() < RECENT_SSID_SLOTS {
            let _ = self.recent_ssids.push(s);
        } else {
            self.recent_ssids[self.recent_ssid_index] = s;
        }
        self.recent_ssid_index = (self.recent_ssid_index + 1) % RECENT_SSID_SLOTS;
    }
}

#[derive(Debug, Clone, Copy)]
struct BlacklistEntry {
    bssid: [u8; 6],
    last_update_ms: u64,
}

/// One-shot notices / scheduled actions the detector wants the caller to
/// perform, since this module owns no timers or log sink itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PineapEvent {
    /// Schedule (or replace) a summary log task for `network_index`, firing
    /// in `LOG_TASK_DELAY_MS` — cancel any prior token for that network
    /// first via the returned `old_token`, if present.
    ScheduleLogTask { network_index: usize, new_token: u32, old_token: Option<u32> },
    PineappleOuiMatch { network_index: usize },
}

pub struct PineapDetector {
    networks: Vec<PineapNetwork, MAX_NETWORKS>,
    blacklist: Vec<BlacklistEntry, MAX_NETWORKS>,
    next_token: u32,
}

impl Default for PineapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PineapDetector {
    pub const fn new() -> Self {
        Self { networks: Vec::new(), blacklist: Vec::new(), next_token: 0 }
    }

    fn find_or_create(&mut self, bssid: [u8; 6]) -> Option<usize> {
        if let Some(i) = self.networks.iter().position(|n| n.bssid == bssid) {
            return Some(i);
        }
        if self.networks.push(PineapNetwork::new(bssid)).is_err() {
            return None;
        }
        Some(self.networks.len() - 1)
    }

    fn is_blacklisted(&self, bssid: &[u8; 6]) -> bool {
        self.blacklist.iter().any(|b| &b.bssid == bssid)
    }

    fn should_update_blacklisted(&mut self, bssid: &[u8; 6], now_ms: u64) -> bool {
        if let Some(e) = self.blacklist.iter_mut().find(|b| &b.bssid == bssid) {
            if now_ms.saturating_sub(e.last_update_ms) >= BLACKLIST_COOLDOWN_MS {
                e.last_update_ms = now_ms;
                return true;
            }
            return false;
        }
        false
    }

    fn add_to_blacklist(&mut self, bssid: [u8; 6], now_ms: u64) {
        if let Some(e) = self.blacklist.iter_mut().find(|b| b.bssid == bssid) {
            e.last_update_ms = now_ms;
            return;
        }
        let _ = self.blacklist.push(BlacklistEntry { bssid, last_update_ms: now_ms });
    }

    pub fn network(&self, index: usize) -> Option<&PineapNetwork> {
        self.networks.get(index)
    }

    /// Processes one beacon: find-or-create by BSSID, refresh channel/RSSI,
    /// and run the unique-SSID / blacklist / pineapple-OUI logic from
    /// spec.md §4.8. Returns any events the caller must act on.
    pub fn observe_beacon(
        &mut self,
        bssid: [u8; 6],
        channel: u8,
        rssi: i8,
        ssid: &str,
        now_ms: u64,
    ) -> Vec<PineapEvent, 2> {
        let mut events = Vec::new();
        let Some(idx) = self.find_or_create(bssid) else {
            return events;
        };
        {
            let net = &mut self.networks[idx];
            net.channel = channel;
            net.rssi = rssi;
        }

        if !ssid.is_empty() {
            let hash = djb2(ssid.as_bytes());
            let already_seen = self.networks[idx].ssid_hashes.iter().any(|h| *h == hash);
            if !already_seen {
                let net = &mut self.networks[idx];
                if net.ssid_hashes.len() < MAX_SSID_HASHES {
                    let _ = net.ssid_hashes.push(hash);
                }
                net.push_recent_ssid(ssid);
                let ssid_count = net.ssid_hashes.len() as u32;

                if ssid_count >= MIN_SSIDS_FOR_DETECTION
                    && (!self.is_blacklisted(&bssid) || self.should_update_blacklisted(&bssid, now_ms))
                {
                    self.networks[idx].is_pineap = true;
                    self.add_to_blacklist(bssid, now_ms);
                    let new_token = self.next_token;
                    self.next_token = self.next_token.wrapping_add(1);
                    let old_token = self.networks[idx].pending_log_task.replace(new_token);
                    let _ = events.push(PineapEvent::ScheduleLogTask { network_index: idx, new_token, old_token });
                }
            }
        }

        let net = &mut self.networks[idx];
        if net.has_pineapple_oui && !net.oui_logged {
            net.oui_logged = true;
            let _ = events.push(PineapEvent::PineappleOuiMatch { network_index: idx });
        }
        events
    }

    /// Evil-twin cross-check, run inside the deferred log task: flags any
    /// other network whose most recent SSID matches `network_index`'s
    /// case-insensitively. Returns the BSSIDs of matching networks.
    pub fn find_evil_twins(&self, network_index: usize) -> Vec<[u8; 6], MAX_NETWORKS> {
        let mut out = Vec::new();
        let Some(target) = self.networks.get(network_index) else {
            return out;
        };
        let Some(target_ssid) = target.recent_ssids.last() else {
            return out;
        };
        for (i, net) in self.networks.iter().enumerate() {
            if i == network_index {
                continue;
            }
            if let Some(last) = net.recent_ssids.last() {
                if eq_ignore_case(last.as_str(), target_ssid.as_str()) {
                    let _ = out.push(net.bssid);
                }
            }
        }
        out
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pineapple_oui_matches_known_prefix() {
        assert!(is_pineapple_oui(&[0x00, 0x13, 0x37, 0xAA, 0xBB, 0xCC]));
        assert!(!is_pineapple_oui(&[0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn single_ssid_does_not_trigger_detection() {
        let mut d = PineapDetector::new();
        let events = d.observe_beacon([1; 6], 6, -40, "CoffeeShop", 0);
        assert!(events.is_empty());
        assert!(!d.network(0).unwrap().is_pineap);
    }

    #[test]
    fn two_distinct_ssids_on_same_bssid_triggers_detection() {
        let mut d = PineapDetector::new();
        d.observe_beacon([1; 6], 6, -40, "CoffeeShop", 0);
        let events = d.observe_beacon([1; 6], 6, -40, "FreeWifi", 0);
        assert!(d.network(0).unwrap().is_pineap);
        assert!(events.iter().any(|e| matches!(e, PineapEvent::ScheduleLogTask { .. })));
    }

    #[test]
    fn repeated_ssid_does_not_recount() {
        let mut d = PineapDetector::new();
        d.observe_beacon([1; 6], 6, -40, "CoffeeShop", 0);
        d.observe_beacon([1; 6], 6, -40, "CoffeeShop", 100);
        assert!(!d.network(0).unwrap().is_pineap);
        assert_eq!(d.network(0).unwrap().ssid_hashes.len(), 1);
    }

    #[test]
    fn blacklist_cooldown_suppresses_rapid_retrigger() {
        let mut d = PineapDetector::new();
        d.observe_beacon([1; 6], 6, -40, "A", 0);
        d.observe_beacon([1; 6], 6, -40, "B", 0); // triggers, blacklists at t=0
        // A third distinct SSID immediately after should not re-trigger
        // (already blacklisted and cooldown not elapsed), though is_pineap
        // stays true from before.
        let events = d.observe_beacon([1; 6], 6, -40, "C", 100);
        assert!(!events.iter().any(|e| matches!(e, PineapEvent::ScheduleLogTask { .. })));
        // After 30s, a fresh distinct SSID re-triggers the schedule.
        let events2 = d.observe_beacon([1; 6], 6, -40, "D", 30_000);
        assert!(events2.iter().any(|e| matches!(e, PineapEvent::ScheduleLogTask { .. })));
    }

    #[test]
    fn pineapple_oui_match_fires_once() {
        let mut d = PineapDetector::new();
        let events = d.observe_beacon([0x00, 0x13, 0x37, 1, 2, 3], 6, -40, "X", 0);
        assert!(events.iter().any(|e| matches!(e, PineapEvent::PineappleOuiMatch { .. })));
        let events2 = d.observe_beacon([0x00, 0x13, 0x37, 1, 2, 3], 6, -40, "Y", 0);
        assert!(!events2.iter().any(|e| matches!(e, PineapEvent::PineappleOuiMatch { .. })));
    }

    #[test]
    fn evil_twin_flags_matching_recent_ssid_across_bssids() {
        let mut d = PineapDetector::new();
        d.observe_beacon([1; 6], 6, -40, "HomeWifi", 0);
        d.observe_beacon([2; 6], 6, -50, "homewifi", 0);
        let twins = d.find_evil_twins(0);
        assert_eq!(twins.as_slice(), &[[2; 6]]);
    }

    #[test]
    fn new_log_task_replaces_pending_one() {
        let mut d = PineapDetector::new();
        d.observe_beacon([1; 6], 6, -40, "A", 0);
        let events = d.observe_beacon([1; 6], 6, -40, "B", 0);
        let PineapEvent::ScheduleLogTask { new_token: t1, old_token: o1, .. } = events[0] else {
            panic!("expected schedule event");
        };
        assert!(o1.is_none());
        let events2 = d.observe_beacon([1; 6], 6, -40, "C", 30_000);
        let PineapEvent::ScheduleLogTask { new_token: t2, old_token: o2, .. } = events2[0] else {
            panic!("expected schedule event");
        };
        assert_eq!(o2, Some(t1));
        assert_ne!(t1, t2);
    }
}
