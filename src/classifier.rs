//! Wi-Fi frame classifier (spec.md §4.3): header + IE walking, dispatched
//! over the installed `Operation`. IE walking is grounded in
//! `wifi_wps_detection_callback` and `callbacks.c`'s beacon/probe handling
//! for the dedupe and limiter tables; the fixed-header layout is the same
//! 24-byte frame `scanner.rs` already parses by hand.

use heapless::Vec;

use crate::eapol;

pub const HEADER_LEN: usize = 24;
pub const MAX_IE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Mgmt,
    Ctrl,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub protocol_version: u8,
    pub kind: FrameKind,
    pub subtype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
}

fn decode_frame_control(b0: u8, b1: u8) -> Option<FrameControl> {
    let protocol_version = b0 & 0b11;
    let kind = match (b0 >> 2) & 0b11 {
        0 => FrameKind::Mgmt,
        1 => FrameKind::Ctrl,
        2 => FrameKind::Data,
        _ => return None,
    };
    let subtype = (b0 >> 4) & 0x0F;
    Some(FrameControl {
        protocol_version,
        kind,
        subtype,
        to_ds: b1 & 0x01 != 0,
        from_ds: b1 & 0x02 != 0,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub fc: FrameControl,
    pub addr1: [u8; 6],
    pub addr2: [u8; 6],
    pub addr3: [u8; 6],
    pub seq_ctrl: u16,
    pub qos_ctrl: Option<u16>,
}

/// Parses the fixed 24-byte 802.11 header (plus the 2-byte QoS control
/// field on QoS data subtypes), per spec.md §3's `Ieee80211Header`.
/// Returns `None` if `frame` is shorter than the declared body length
/// requires — callers must not read further on `None`.
pub fn parse_header(frame: &[u8]) -> Option<Header> {
    if frame.len() < HEADER_LEN {
        return None;
    }
    let fc = decode_frame_control(frame[0], frame[1])?;
    let addr = |lo: usize| -> [u8; 6] {
        let mut a = [0u8; 6];
        a.copy_from_slice(&frame[lo..lo + 6]);
        a
    };
    let addr1 = addr(4);
    let addr2 = addr(10);
    let addr3 = addr(16);
    let seq_ctrl = u16::from_le_bytes([frame[22], frame[23]]);
    let is_qos_data = fc.kind == FrameKind::Data && fc.subtype & 0x08 != 0;
    let qos_ctrl = if is_qos_data {
        if frame.len() < HEADER_LEN + 2 {
            return None;
        }
        Some(u16::from_le_bytes([frame[24], frame[25]]))
    } else {
        None
    };
    Some(Header { fc, addr1, addr2, addr3, seq_ctrl, qos_ctrl })
}

pub fn body_offset(header: &Header) -> usize {
    HEADER_LEN + if header.qos_ctrl.is_some() { 2 } else { 0 }
}

#[derive(Debug, Clone, Copy)]
pub struct InformationElement<'a> {
    pub id: u8,
    pub value: &'a [u8],
}

/// Walks `(id, len, value)` triples starting at `start`, bounding each
/// length to `0..=255` and stopping (not recovering) on truncation, per
/// spec.md §3's IE-walk invariant. `f` is called once per fully-in-bounds
/// IE; the walk stops silently the first time an IE's declared length
/// would read past `buf`.
pub fn walk_information_elements<'a>(buf: &'a [u8], start: usize, mut f: impl FnMut(InformationElement<'a>)) {
    let mut index = start;
    while index + 2 <= buf.len() {
        let id = buf[index];
        let len = buf[index + 1] as usize;
        if index + 2 + len > buf.len() {
            break;
        }
        f(InformationElement { id, value: &buf[index + 2..index + 2 + len] });
        index += 2 + len;
    }
}

pub fn djb2(s: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in s {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash
}

/// Sanitizes an SSID byte string to UTF-8, replacing non-printable bytes
/// with `?`, per spec.md §3's `WifiAp.ssid` rule.
pub fn sanitize_ssid(raw: &[u8]) -> heapless::String<32> {
    let mut out = heapless::String::new();
    for &b in raw.iter().take(32) {
        let c = if (0x20..=0x7E).contains(&b) { b as char } else { '?' };
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ---- Probe-request dedupe (spec.md §4.3 ProbeRequestListen) ----

const PROBE_DEDUPE_MAX: usize = 64;
pub const PROBE_DEDUPE_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct ProbeDedupeEntry {
    src: [u8; 6],
    ssid_hash: u32,
    last_ms: u64,
}

pub struct ProbeDedupe {
    entries: [Option<ProbeDedupeEntry>; PROBE_DEDUPE_MAX],
    count: usize,
    insert_idx: usize,
}

impl Default for ProbeDedupe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeDedupe {
    pub const fn new() -> Self {
        Self { entries: [None; PROBE_DEDUPE_MAX], count: 0, insert_idx: 0 }
    }

    /// Returns `true` if this `(src, ssid)` pair should be emitted now,
    /// per the 64-entry LRU table and 1000 ms minimum interval.
    pub fn should_emit(&mut self, src: [u8; 6], ssid: &[u8], now_ms: u64) -> bool {
        let ssid_hash = djb2(ssid);
        for slot in self.entries.iter_mut().take(self.count) {
            if let Some(e) = slot {
                if e.src == src && e.ssid_hash == ssid_hash {
                    if now_ms.saturating_sub(e.last_ms) < PROBE_DEDUPE_INTERVAL_MS {
                        return false;
                    }
                    e.last_ms = now_ms;
                    return true;
                }
            }
        }
        let idx = if self.count < PROBE_DEDUPE_MAX {
            let i = self.count;
            self.count += 1;
            i
        } else {
            let i = self.insert_idx;
            self.insert_idx = (self.insert_idx + 1) % PROBE_DEDUPE_MAX;
            i
        };
        self.entries[idx] = Some(ProbeDedupeEntry { src, ssid_hash, last_ms: now_ms });
        true
    }
}

// ---- Beacon limiter (spec.md §4.3 BeaconLimitedCapture) ----

const BEACON_LIMIT_MAX: usize = 64;
pub const BEACON_MAX_PER_BSSID: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct BeaconLimitEntry {
    bssid: [u8; 6],
    emitted: u8,
    saw_nonempty_ssid: bool,
}

pub struct BeaconLimiter {
    entries: [Option<BeaconLimitEntry>; BEACON_LIMIT_MAX],
    count: usize,
    insert_idx: usize,
}

impl Default for BeaconLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconLimiter {
    pub const fn new() -> Self {
        Self { entries: [None; BEACON_LIMIT_MAX], count: 0, insert_idx: 0 }
    }

    /// Implements the "cap at 3 beacons per BSSID, plus one extra the first
    /// time a non-empty SSID is seen after only-hidden beacons" rule.
    pub fn should_emit(&mut self, bssid: [u8; 6], ssid_has_text: bool) -> bool {
        for slot in self.entries.iter_mut().take(self.count) {
            if let Some(e) = slot {
                if e.bssid == bssid {
                    if e.emitted >= BEACON_MAX_PER_BSSID {
                        if !e.saw_nonempty_ssid && ssid_has_text {
                            e.saw_nonempty_ssid = true;
                            return true;
                        }
                        return false;
                    }
                    e.emitted += 1;
                    if ssid_has_text {
                        e.saw_nonempty_ssid = true;
                    }
                    return true;
                }
            }
        }
        let idx = if self.count < BEACON_LIMIT_MAX {
            let i = self.count;
            self.count += 1;
            i
        } else {
            let i = self.insert_idx;
            self.insert_idx = (self.insert_idx + 1) % BEACON_LIMIT_MAX;
            i
        };
        self.entries[idx] = Some(BeaconLimitEntry { bssid, emitted: 1, saw_nonempty_ssid: ssid_has_text });
        true
    }
}

// ---- WPS detection (spec.md §4.3 WPSDetect) ----

pub const WPS_OUI: [u8; 3] = [0x00, 0x50, 0xF2];
pub const WPS_OUI_TYPE: u8 = 0x04;
pub const WPS_ATTR_CONFIG_METHODS: u16 = 0x1008;
pub const WPS_CONF_METHODS_PBC: u16 = 0x0080;
pub const WPS_CONF_METHODS_PIN_DISPLAY: u16 = 0x0004;
pub const WPS_CONF_METHODS_PIN_KEYPAD: u16 = 0x0008;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WpsMethods(pub u16);

impl WpsMethods {
    pub fn pbc(self) -> bool {
        self.0 & WPS_CONF_METHODS_PBC != 0
    }
    pub fn pin_display(self) -> bool {
        self.0 & WPS_CONF_METHODS_PIN_DISPLAY != 0
    }
    pub fn pin_keypad(self) -> bool {
        self.0 & WPS_CONF_METHODS_PIN_KEYPAD != 0
    }
}

/// Walks IE 221 (vendor-specific) entries looking for OUI `00:50:F2` type
/// `0x04` (WPS), then walks its attributes for Config Methods (`0x1008`).
/// Returns the config-methods bitset the first time it's found.
pub fn detect_wps(ies: &[u8]) -> Option<WpsMethods> {
    let mut found = None;
    walk_information_elements(ies, 0, |ie| {
        if found.is_some() || ie.id != 221 || ie.value.len() < 4 {
            return;
        }
        if ie.value[0..3] != WPS_OUI || ie.value[3] != WPS_OUI_TYPE {
            return;
        }
        let attrs = &ie.value[4..];
        let mut attr_index = 0usize;
        while attr_index + 4 <= attrs.len() {
            let attr_id = u16::from_be_bytes([attrs[attr_index], attrs[attr_index + 1]]);
            let attr_len = u16::from_be_bytes([attrs[attr_index + 2], attrs[attr_index + 3]]) as usize;
            if attr_len > MAX_IE_LEN || attr_index + 4 + attr_len > attrs.len() {
                break;
            }
            if attr_id == WPS_ATTR_CONFIG_METHODS && attr_len == 2 {
                let methods = u16::from_be_bytes([attrs[attr_index + 4], attrs[attr_index + 5]]);
                found = Some(WpsMethods(methods));
                return;
            }
            attr_index += 4 + attr_len;
        }
    });
    found
}

// ---- Wardriving AKM/cipher/auth derivation (spec.md §4.3 Wardriving) ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Open,
    Wep,
    Wpa,
    Wpa2,
    Wpa3,
    Owe,
}

const RSN_OUI: [u8; 3] = [0x00, 0x0F, 0xAC];
const AKM_SUITE_WPA3_SAE: u8 = 0x08;
const AKM_SUITE_OWE: u8 = 0x09;
const WPA_OUI_TYPE: [u8; 4] = [0x00, 0x50, 0xF2, 0x01];
const CAPABILITY_PRIVACY_BIT: u16 = 0x0010;

/// Derives the authentication type from IE 48 (RSN), vendor IE 221 (WPA),
/// and capability info, per spec.md §4.3's bullet list, verbatim.
pub fn derive_auth(ies: &[u8], capability_info: u16) -> Auth {
    let mut rsn_akm: Option<u8> = None;
    let mut wpa_vendor = false;
    walk_information_elements(ies, 0, |ie| {
        if ie.id == 48 && ie.value.len() >= 2 {
            // RSN: version(2) group_cipher(4) pairwise_count(2) pairwise(4*n)
            // akm_count(2) akm_suites(4*m). We only need the first AKM
            // suite's last byte (the suite type), matching spec.md's
            // shorthand.
            if ie.value.len() >= 8 {
                let pairwise_count = u16::from_le_bytes([ie.value[6], ie.value[7]]) as usize;
                let akm_count_offset = 8 + pairwise_count * 4;
                if ie.value.len() >= akm_count_offset + 2 {
                    let akm_offset = akm_count_offset + 2;
                    if ie.value.len() >= akm_offset + 4 && ie.value[akm_offset..akm_offset + 3] == RSN_OUI {
                        rsn_akm = Some(ie.value[akm_offset + 3]);
                    }
                }
            }
        }
        if ie.id == 221 && ie.value.len() >= 4 && ie.value[0..4] == WPA_OUI_TYPE {
            wpa_vendor = true;
        }
    });
    if let Some(akm) = rsn_akm {
        return match akm {
            AKM_SUITE_WPA3_SAE => Auth::Wpa3,
            AKM_SUITE_OWE => Auth::Owe,
            _ => Auth::Wpa2,
        };
    }
    if wpa_vendor {
        return Auth::Wpa;
    }
    if capability_info & CAPABILITY_PRIVACY_BIT != 0 {
        return Auth::Wep;
    }
    Auth::Open
}

// ---- Operation dispatch (spec.md §4.3) ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RawCapture,
    ProbeRequestListen,
    BeaconCapture,
    BeaconLimitedCapture,
    DeauthCapture,
    EapolCapture,
    WpsDetect,
    Wardriving,
    PineapDetect,
}

/// Subtype constants per spec.md §4.3.
pub mod subtype {
    pub const ASSOC_REQ: u8 = 0x0;
    pub const ASSOC_RESP: u8 = 0x1;
    pub const REASSOC_REQ: u8 = 0x2;
    pub const REASSOC_RESP: u8 = 0x3;
    pub const PROBE_REQ: u8 = 0x4;
    pub const BEACON: u8 = 0x8;
    pub const AUTH: u8 = 0xB;
    pub const DEAUTH: u8 = 0xC;
    pub const DISASSOC: u8 = 0xA;
}

/// What the classifier decided to do with one frame; the caller (a Layer 2
/// task) turns this into an actual enqueue/log/table-update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyAction {
    Enqueue,
    Drop,
}

/// Dispatches one already-header-parsed frame under the given operation.
/// Returns whether the frame should be enqueued to PCAP. EAPOL/WPS/
/// Wardriving-specific payload extraction is exposed via the dedicated
/// functions above; this function only decides enqueue/drop, matching
/// spec.md §4.3's per-operation subtype filters.
pub fn classify(
    op: Operation,
    header: &Header,
    ssid_has_text: bool,
    probe_dedupe: &mut ProbeDedupe,
    beacon_limiter: &mut BeaconLimiter,
    now_ms: u64,
    ssid: &[u8],
) -> ClassifyAction {
    use ClassifyAction::*;
    let subtype = header.fc.subtype;
    match op {
        Operation::RawCapture => Enqueue,
        Operation::ProbeRequestListen => {
            if subtype == subtype::PROBE_REQ && probe_dedupe.should_emit(header.addr2, ssid, now_ms) {
                Enqueue
            } else {
                Drop
            }
        }
        Operation::BeaconCapture => {
            if subtype == subtype::BEACON {
                Enqueue
            } else {
                Drop
            }
        }
        Operation::BeaconLimitedCapture => {
            if subtype == subtype::BEACON && beacon_limiter.should_emit(header.addr3, ssid_has_text) {
                Enqueue
            } else {
                Drop
            }
        }
        Operation::DeauthCapture => {
            if subtype == subtype::DEAUTH || subtype == subtype::DISASSOC {
                Enqueue
            } else {
                Drop
            }
        }
        Operation::EapolCapture => match subtype {
            subtype::ASSOC_REQ | subtype::ASSOC_RESP | subtype::REASSOC_REQ | subtype::REASSOC_RESP | subtype::AUTH => Enqueue,
            subtype::PROBE_REQ => {
                if probe_dedupe.should_emit(header.addr2, ssid, now_ms) {
                    Enqueue
                } else {
                    Drop
                }
            }
            subtype::BEACON => {
                if beacon_limiter.should_emit(header.addr3, ssid_has_text) {
                    Enqueue
                } else {
                    Drop
                }
            }
            _ if header.fc.kind == FrameKind::Data => Enqueue, // EAPOL data frames always enqueued.
            _ => Drop,
        },
        Operation::WpsDetect | Operation::Wardriving => {
            if subtype == subtype::BEACON {
                Enqueue
            } else {
                Drop
            }
        }
        Operation::PineapDetect => {
            if subtype == subtype::BEACON {
                Enqueue
            } else {
                Drop
            }
        }
    }
}

/// Extracts an EAPOL key info, if `frame`'s body is a data frame carrying
/// an LLC/SNAP EtherType 0x888E PDU, for the EapolCapture operation.
pub fn extract_eapol(frame: &[u8], header: &Header) -> Option<eapol::EapolKeyInfo> {
    if header.fc.kind != FrameKind::Data {
        return None;
    }
    let body = &frame[body_offset(header)..];
    let pdu = eapol::strip_llc_snap_eapol(body)?;
    eapol::parse_eapol_key(pdu).ok()
}
