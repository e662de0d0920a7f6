//! EAPOL 4-way handshake tracker (spec.md §4.4), grounded in
//! `callbacks.c`'s `process_eapol_candidate_pair`: a 16-entry FIFO table
//! keyed by `(ap, sta, replay_counter)`, promoted and reset to `None` the
//! first time both halves of a pair are present.

use crate::error::{AirhoundError, Result};

pub const TABLE_CAPACITY: usize = 16;

/// LLC/SNAP + EtherType 0x888E dissection used by `EAPOLCapture` in
/// `classifier.rs` to locate the EAPOL-Key frame inside a data frame body.
/// 802.2 LLC/SNAP header: `dsap=0xAA, ssap=0xAA, control=0x03, oui=00:00:00,
/// ethertype`.
pub const EAPOL_ETHERTYPE: u16 = 0x888E;
const LLC_SNAP_HEADER_LEN: usize = 8;

/// Returns the EAPOL-Key frame bytes if `body` is an LLC/SNAP-encapsulated
/// EtherType-0x888E payload, else `None`. Bounds-checked; never reads past
/// `body`.
pub fn strip_llc_snap_eapol(body: &[u8]) -> Option<&[u8]> {
    if body.len() < LLC_SNAP_HEADER_LEN {
        return None;
    }
    if body[0] != 0xAA || body[1] != 0xAA || body[2] != 0x03 {
        return None;
    }
    if body[3] != 0x00 || body[4] != 0x00 || body[5] != 0x00 {
        return None;
    }
    let ethertype = u16::from_be_bytes([body[6], body[7]]);
    if ethertype != EAPOL_ETHERTYPE {
        return None;
    }
    Some(&body[LLC_SNAP_HEADER_LEN..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    M1,
    M2,
    M3,
    M4,
}

impl MsgType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M2 => "M2",
            Self::M3 => "M3",
            Self::M4 => "M4",
        }
    }
}

/// Minimal EAPOL-Key frame fields spec.md §4.4 needs: no MIC verification,
/// just the flags that classify the message and the replay counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EapolKeyInfo {
    pub key_descriptor_type: u8,
    pub mic: bool,
    pub ack: bool,
    pub install: bool,
    pub pairwise: bool,
    pub replay_counter: u64,
}

/// Parses the IEEE 802.1X header (version, type, length) plus the
/// EAPOL-Key body from `eapol_pdu` (the bytes after LLC/SNAP). Layout:
/// `[version][type][body_len:u16 BE][descriptor_type][key_info:u16 BE]
/// [key_length:u16 BE][replay_counter:u64 BE]...`.
pub fn parse_eapol_key(eapol_pdu: &[u8]) -> Result<EapolKeyInfo> {
    const MIN_LEN: usize = 1 + 1 + 2 + 1 + 2 + 2 + 8;
    if eapol_pdu.len() < MIN_LEN {
        return Err(AirhoundError::ParseTruncated);
    }
    const EAPOL_TYPE_KEY: u8 = 3;
    if eapol_pdu[1] != EAPOL_TYPE_KEY {
        return Err(AirhoundError::ParseTruncated);
    }
    let descriptor_type = eapol_pdu[4];
    let key_info = u16::from_be_bytes([eapol_pdu[5], eapol_pdu[6]]);
    let replay_counter = u64::from_be_bytes([
        eapol_pdu[9], eapol_pdu[10], eapol_pdu[11], eapol_pdu[12],
        eapol_pdu[13], eapol_pdu[14], eapol_pdu[15], eapol_pdu[16],
    ]);
    Ok(EapolKeyInfo {
        key_descriptor_type: descriptor_type,
        mic: key_info & 0x0100 != 0,
        ack: key_info & 0x0080 != 0,
        install: key_info & 0x0040 != 0,
        pairwise: key_info & 0x0008 != 0,
        replay_counter,
    })
}

/// Classifies an `EapolKeyInfo` into M1..M4 per spec.md §4.4's flag table.
/// Returns `None` for flag combinations that match no handshake message
/// (e.g. group-key or malformed frames).
pub fn classify(info: &EapolKeyInfo) -> Option<MsgType> {
    match (info.mic, info.ack, info.install) {
        (false, true, false) => Some(MsgType::M1),
        (true, false, false) => Some(MsgType::M2),
        (true, true, true) => Some(MsgType::M3),
        (true, false, true) => Some(MsgType::M4),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    ap: [u8; 6],
    sta: [u8; 6],
    replay: u64,
    ap_msg: Option<MsgType>,
    sta_msg: Option<MsgType>,
}

/// A completed handshake pairing, ready to log, per spec.md's
/// `Handshake found! AP=<bssid> Pair=Mi/Mj` wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeFound {
    pub ap: [u8; 6],
    pub sta: [u8; 6],
    pub ap_msg: MsgType,
    pub sta_msg: MsgType,
}

/// 16-entry FIFO table keyed by `(ap, sta, replay_counter)`.
pub struct HandshakeTable {
    entries: [Option<Entry>; TABLE_CAPACITY],
    count: usize,
    insert_idx: usize,
    pub found_count: u32,
}

impl Default for HandshakeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeTable {
    pub const fn new() -> Self {
        Self { entries: [None; TABLE_CAPACITY], count: 0, insert_idx: 0, found_count: 0 }
    }

    /// Updates the table with one observed half of a handshake. Returns
    /// `Some(HandshakeFound)` the first time both halves for a key are
    /// present, at which point the entry's halves are reset to `None` so
    /// the same replay counter can't re-fire (spec.md §4.4).
    pub fn observe(&mut self, ap: [u8; 6], sta: [u8; 6], replay: u64, from_ap: bool, msg_type: MsgType) -> Option<HandshakeFound> {
        for slot in self.entries.iter_mut().take(self.count) {
            if let Some(e) = slot {
                if e.ap == ap && e.sta == sta && e.replay == replay {
                    if from_ap {
                        e.ap_msg = Some(msg_type);
                    } else {
                        e.sta_msg = Some(msg_type);
                    }
                    if let (Some(ap_msg), Some(sta_msg)) = (e.ap_msg, e.sta_msg) {
                        self.found_count += 1;
                        e.ap_msg = None;
                        e.sta_msg = None;
                        return Some(HandshakeFound { ap, sta, ap_msg, sta_msg });
                    }
                    return None;
                }
            }
        }
        let idx = if self.count < TABLE_CAPACITY {
            let i = self.count;
            self.count += 1;
            i
        } else {
            let i = self.insert_idx;
            self.insert_idx = (self.insert_idx + 1) % TABLE_CAPACITY;
            i
        };
        self.entries[idx] = Some(Entry {
            ap,
            sta,
            replay,
            ap_msg: if from_ap { Some(msg_type) } else { None },
            sta_msg: if from_ap { None } else { Some(msg_type) },
        });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_frame(mic: bool, ack: bool, install: bool, replay: u64) -> [u8; 17] {
        let mut out = [0u8; 17];
        out[1] = 3; // EAPOL type = Key
        out[4] = 2; // key descriptor type
        let mut key_info: u16 = 0;
        if mic {
            key_info |= 0x0100;
        }
        if ack {
            key_info |= 0x0080;
        }
        if install {
            key_info |= 0x0040;
        }
        key_info |= 0x0008; // pairwise
        out[5..7].copy_from_slice(&key_info.to_be_bytes());
        out[9..17].copy_from_slice(&replay.to_be_bytes());
        out
    }

    #[test]
    fn strip_llc_snap_matches_eapol_ethertype() {
        let mut body = [0u8; 20];
        body[0] = 0xAA;
        body[1] = 0xAA;
        body[2] = 0x03;
        body[6] = 0x88;
        body[7] = 0x8E;
        body[8] = 0xAB;
        let stripped = strip_llc_snap_eapol(&body).unwrap();
        assert_eq!(stripped[0], 0xAB);
    }

    #[test]
    fn strip_llc_snap_rejects_other_ethertype() {
        let mut body = [0u8; 20];
        body[0] = 0xAA;
        body[1] = 0xAA;
        body[2] = 0x03;
        body[6] = 0x08;
        body[7] = 0x00; // IPv4
        assert!(strip_llc_snap_eapol(&body).is_none());
    }

    #[test]
    fn classify_matches_spec_table() {
        assert_eq!(classify(&parse_eapol_key(&key_frame(false, true, false, 1)).unwrap()), Some(MsgType::M1));
        assert_eq!(classify(&parse_eapol_key(&key_frame(true, false, false, 1)).unwrap()), Some(MsgType::M2));
        assert_eq!(classify(&parse_eapol_key(&key_frame(true, true, true, 1)).unwrap()), Some(MsgType::M3));
        assert_eq!(classify(&parse_eapol_key(&key_frame(true, false, true, 1)).unwrap()), Some(MsgType::M4));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert_eq!(parse_eapol_key(&[0u8; 5]), Err(AirhoundError::ParseTruncated));
    }

    #[test]
    fn full_handshake_fires_once_per_replay_value() {
        // Real 4-way handshakes pair M1/M2 under one replay counter and
        // M3/M4 under the next, so a full handshake produces two distinct
        // "Handshake found" events — one per unique replay value, matching
        // spec.md §8's invariant exactly.
        let mut table = HandshakeTable::new();
        let ap = [1; 6];
        let sta = [2; 6];
        assert!(table.observe(ap, sta, 42, true, MsgType::M1).is_none());
        let first = table.observe(ap, sta, 42, false, MsgType::M2).unwrap();
        assert_eq!(first.ap_msg, MsgType::M1);
        assert_eq!(first.sta_msg, MsgType::M2);
        assert_eq!(table.found_count, 1);

        assert!(table.observe(ap, sta, 43, true, MsgType::M3).is_none());
        let second = table.observe(ap, sta, 43, false, MsgType::M4).unwrap();
        assert_eq!(second.ap_msg, MsgType::M3);
        assert_eq!(second.sta_msg, MsgType::M4);
        assert_eq!(table.found_count, 2);

        // A lone stray message on an already-resolved replay counter must
        // not re-fire on its own.
        assert!(table.observe(ap, sta, 42, true, MsgType::M1).is_none());
        assert_eq!(table.found_count, 2);
    }

    #[test]
    fn fifo_eviction_when_table_full() {
        let mut table = HandshakeTable::new();
        for i in 0..TABLE_CAPACITY as u64 {
            table.observe([0; 6], [i as u8; 6], i, true, MsgType::M1);
        }
        // Table full; this insert evicts the oldest (sta = [0;6], replay 0).
        table.observe([0; 6], [99; 6], 999, true, MsgType::M1);
        // The evicted entry's other half should no longer be tracked.
        assert!(table.observe([0; 6], [0; 6], 0, false, MsgType::M2).is_none());
    }

    #[test]
    fn independent_replay_counters_track_separately() {
        let mut table = HandshakeTable::new();
        let ap = [1; 6];
        let sta = [2; 6];
        table.observe(ap, sta, 1, true, MsgType::M1);
        table.observe(ap, sta, 2, true, MsgType::M1);
        let found = table.observe(ap, sta, 1, false, MsgType::M2);
        assert!(found.is_some());
        assert_eq!(table.found_count, 1);
        // replay=2's half is still pending.
        assert!(table.observe(ap, sta, 2, false, MsgType::M2).is_some());
        assert_eq!(table.found_count, 2);
    }
}
