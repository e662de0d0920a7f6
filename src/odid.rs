//! OpenDroneID (ASTM F3411) codec and `AerialDevice` table (spec.md §4.6,
//! §3 `AerialDevice`). Byte offsets and scaling factors are preserved
//! verbatim from `aerial_detector_manager.c`'s `decode_opendroneid_message`;
//! every multi-byte read is assembled from individual bytes rather than a
//! packed-struct cast, since Rust has no memcpy-to-local idiom to preserve
//! and this gets the same effect (no unaligned access) the idiomatic way.

use heapless::{String, Vec};

pub const MESSAGE_SIZE: usize = 25;
pub const ID_SIZE: usize = 20;
pub const STR_SIZE: usize = 23;
const MAX_PACKED_SUBMESSAGES: usize = 9;

pub type DeviceId = String<ID_SIZE>;
pub type Description = String<STR_SIZE>;

/// Terminates at the first byte outside `0x20..=0x7E`, never reading past
/// `len` bytes, per spec.md §4.6.
fn ascii_trim<const N: usize>(data: &[u8], len: usize) -> String<N> {
    let mut out = String::new();
    for &b in data.iter().take(len) {
        if !(0x20..=0x7E).contains(&b) {
            break;
        }
        if out.push(b as char).is_err() {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicId {
    pub ua_type: u8,
    pub id_type: u8,
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub status: u8,
    pub latitude: f64,
    pub longitude: f64,
    /// `None` when the wire value was the `0xFFFF` unknown sentinel.
    pub altitude: Option<f32>,
    pub direction: f32,
    /// `None` when the wire value was `255` (unknown).
    pub speed_horizontal: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelfId {
    pub description: Description,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemMsg {
    pub operator_latitude: f64,
    pub operator_longitude: f64,
    pub operator_altitude: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorId {
    pub operator_id: DeviceId,
}

fn le_i32(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

fn le_u16(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[0], data[1]])
}

pub fn decode_basic_id(data: &[u8]) -> Option<BasicId> {
    if data.len() < MESSAGE_SIZE {
        return None;
    }
    Some(BasicId {
        ua_type: data[1] & 0x0F,
        id_type: (data[1] >> 4) & 0x0F,
        device_id: ascii_trim(&data[2..], ID_SIZE),
    })
}

pub fn decode_location(data: &[u8]) -> Option<Location> {
    if data.len() < MESSAGE_SIZE {
        return None;
    }
    let lat = le_i32(&data[5..9]) as f64 / 10_000_000.0;
    let lon = le_i32(&data[9..13]) as f64 / 10_000_000.0;
    let alt_raw = le_u16(&data[15..17]);
    let altitude = if alt_raw != 0xFFFF { Some(alt_raw as f32 * 0.5 - 1000.0) } else { None };
    let speed_horizontal = if data[3] != 255 { Some(data[3] as f32 * 0.25) } else { None };
    Some(Location {
        status: (data[1] >> 4) & 0x0F,
        latitude: lat,
        longitude: lon,
        altitude,
        direction: data[2] as f32,
        speed_horizontal,
    })
}

pub fn decode_self_id(data: &[u8]) -> Option<SelfId> {
    if data.len() < MESSAGE_SIZE {
        return None;
    }
    Some(SelfId { description: ascii_trim(&data[2..], STR_SIZE) })
}

pub fn decode_system(data: &[u8]) -> Option<SystemMsg> {
    if data.len() < MESSAGE_SIZE {
        return None;
    }
    let op_lat = le_i32(&data[2..6]) as f64 / 10_000_000.0;
    let op_lon = le_i32(&data[6..10]) as f64 / 10_000_000.0;
    let alt_raw = le_u16(&data[18..20]);
    let operator_altitude = if alt_raw != 0xFFFF { Some(alt_raw as f32 * 0.5 - 1000.0) } else { None };
    Some(SystemMsg { operator_latitude: op_lat, operator_longitude: op_lon, operator_altitude })
}

pub fn decode_operator_id(data: &[u8]) -> Option<OperatorId> {
    if data.len() < MESSAGE_SIZE {
        return None;
    }
    Some(OperatorId { operator_id: ascii_trim(&data[2..], ID_SIZE) })
}

/// `ID type = SerialNumber(1)`, `UA type = HelicopterOrMultirotor(2)`, per
/// spec.md §4.6's emulation symmetry note.
pub fn encode_basic_id(uasid: &str) -> [u8; MESSAGE_SIZE] {
    let mut out = [0u8; MESSAGE_SIZE];
    out[0] = 0x00; // msg_type BasicID in the top nibble
    out[1] = (1 << 4) | 2;
    let bytes = uasid.as_bytes();
    let n = bytes.len().min(ID_SIZE);
    out[2..2 + n].copy_from_slice(&bytes[..n]);
    out
}

/// `status = Airborne`, direction/speed zeroed, altitude clamped to the
/// 0.5 m grid with the -1000 m offset, per spec.md §4.6.
pub fn encode_location(lat: f64, lon: f64, alt: f32) -> [u8; MESSAGE_SIZE] {
    let mut out = [0u8; MESSAGE_SIZE];
    out[0] = 0x10; // msg_type Location in the top nibble
    out[1] = (AerialStatus::Airborne as u8) << 4;
    out[2] = 0; // direction
    out[3] = 0; // speed
    let lat_raw = (lat * 10_000_000.0).round() as i32;
    let lon_raw = (lon * 10_000_000.0).round() as i32;
    out[5..9].copy_from_slice(&lat_raw.to_le_bytes());
    out[9..13].copy_from_slice(&lon_raw.to_le_bytes());
    let alt_raw = ((alt + 1000.0) / 0.5).round().clamp(0.0, 0xFFFEu16 as f32) as u16;
    out[15..17].copy_from_slice(&alt_raw.to_le_bytes());
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AerialType {
    Unknown,
    RemoteIdWifi,
    RemoteIdBle,
    DjiWifi,
    DjiBle,
    DroneNetwork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AerialStatus {
    Unknown = 0,
    Ground = 1,
    Airborne = 2,
    Emergency = 3,
    SystemFailure = 4,
}

impl AerialStatus {
    fn from_nibble(n: u8) -> Self {
        match n {
            1 => Self::Ground,
            2 => Self::Airborne,
            3 => Self::Emergency,
            4 => Self::SystemFailure,
            _ => Self::Unknown,
        }
    }
}

pub const MESSAGES_SEEN_BASIC_ID: u8 = 1 << 0;
pub const MESSAGES_SEEN_LOCATION: u8 = 1 << 1;
pub const MESSAGES_SEEN_SELF_ID: u8 = 1 << 3;
pub const MESSAGES_SEEN_SYSTEM: u8 = 1 << 4;
pub const MESSAGES_SEEN_OPERATOR_ID: u8 = 1 << 5;

/// Sentinel used for altitude fields that have never decoded a value,
/// matching the original's `-1000.0f` initializer. `has_location` /
/// `has_operator_location` are the authoritative "is this set" flags;
/// this sentinel exists only so an unconditional print has something
/// sane to show.
pub const ALTITUDE_UNKNOWN: f32 = -1000.0;

#[derive(Debug, Clone)]
pub struct AerialDevice {
    pub mac: [u8; 6],
    pub device_type: AerialType,
    pub status: AerialStatus,
    pub rssi: i8,
    pub channel: u8,
    pub device_id: DeviceId,
    pub operator_id: DeviceId,
    pub description: Description,
    pub vendor: String<16>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub speed_horizontal: f32,
    pub direction: f32,
    pub height_agl: f32,
    pub operator_latitude: f64,
    pub operator_longitude: f64,
    pub operator_altitude: f32,
    pub messages_seen: u8,
    pub has_location: bool,
    pub has_operator_location: bool,
    pub is_tracked: bool,
    pub last_seen_ms: u32,
}

impl AerialDevice {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            mac,
            device_type: AerialType::Unknown,
            status: AerialStatus::Unknown,
            rssi: 0,
            channel: 0,
            device_id: DeviceId::new(),
            operator_id: DeviceId::new(),
            description: Description::new(),
            vendor: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: ALTITUDE_UNKNOWN,
            speed_horizontal: 0.0,
            direction: 0.0,
            height_agl: 0.0,
            operator_latitude: 0.0,
            operator_longitude: 0.0,
            operator_altitude: ALTITUDE_UNKNOWN,
            messages_seen: 0,
            has_location: false,
            has_operator_location: false,
            is_tracked: false,
            last_seen_ms: 0,
        }
    }

    /// Applies one decoded ODID message (BasicID/Location/SelfID/System/
    /// OperatorID/Packed) to this device, recursing into Packed contents up
    /// to 9 sub-messages deep, per spec.md §4.6 and
    /// `decode_opendroneid_message`'s own recursion.
    pub fn apply_odid_message(&mut self, data: &[u8]) {
        if data.len() < MESSAGE_SIZE {
            return;
        }
        let msg_type = (data[0] >> 4) & 0x0F;
        match msg_type {
            0 => {
                if let Some(b) = decode_basic_id(data) {
                    self.messages_seen |= MESSAGES_SEEN_BASIC_ID;
                    self.device_id = b.device_id;
                    if self.device_type == AerialType::Unknown {
                        self.device_type = AerialType::RemoteIdWifi;
                    }
                }
            }
            1 => {
                if let Some(l) = decode_location(data) {
                    self.messages_seen |= MESSAGES_SEEN_LOCATION;
                    self.has_location = true;
                    self.status = AerialStatus::from_nibble(l.status);
                    self.latitude = l.latitude;
                    self.longitude = l.longitude;
                    if let Some(alt) = l.altitude {
                        self.altitude = alt;
                    }
                    if let Some(speed) = l.speed_horizontal {
                        self.speed_horizontal = speed;
                    }
                    self.direction = l.direction;
                }
            }
            3 => {
                if let Some(s) = decode_self_id(data) {
                    self.messages_seen |= MESSAGES_SEEN_SELF_ID;
                    self.description = s.description;
                }
            }
            4 => {
                if let Some(s) = decode_system(data) {
                    self.messages_seen |= MESSAGES_SEEN_SYSTEM;
                    self.has_operator_location = true;
                    self.operator_latitude = s.operator_latitude;
                    self.operator_longitude = s.operator_longitude;
                    if let Some(alt) = s.operator_altitude {
                        self.operator_altitude = alt;
                    }
                }
            }
            5 => {
                if let Some(o) = decode_operator_id(data) {
                    self.messages_seen |= MESSAGES_SEEN_OPERATOR_ID;
                    self.operator_id = o.operator_id;
                }
            }
            0xF => {
                if data.len() > 3 && data[1] as usize == MESSAGE_SIZE && data[2] > 0 {
                    let count = (data[2] as usize).min(MAX_PACKED_SUBMESSAGES);
                    for i in 0..count {
                        let start = 3 + i * MESSAGE_SIZE;
                        if start + MESSAGE_SIZE > data.len() {
                            break;
                        }
                        self.apply_odid_message(&data[start..start + MESSAGE_SIZE]);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Bounded device table implementing spec.md §3's `AerialDevice` lifecycle:
/// create-on-first-match, compaction removes Unknown-type only, ageing
/// removes devices older than a caller threshold.
pub struct AerialDeviceTable<const N: usize> {
    devices: Vec<AerialDevice, N>,
}

impl<const N: usize> Default for AerialDeviceTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AerialDeviceTable<N> {
    pub const fn new() -> Self {
        Self { devices: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Finds the device by MAC, or creates it if table space remains.
    /// Returns `None` only when the table is full and the MAC is new.
    pub fn find_or_create(&mut self, mac: [u8; 6]) -> Option<&mut AerialDevice> {
        if let Some(idx) = self.devices.iter().position(|d| d.mac == mac) {
            return Some(&mut self.devices[idx]);
        }
        self.devices.push(AerialDevice::new(mac)).ok()?;
        self.devices.last_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AerialDevice> {
        self.devices.iter()
    }

    /// Removes devices still at `AerialType::Unknown` (never upgraded by a
    /// decoded payload).
    pub fn compact(&mut self) {
        let mut kept: Vec<AerialDevice, N> = Vec::new();
        for d in self.devices.drain(..) {
            if d.device_type != AerialType::Unknown {
                let _ = kept.push(d);
            }
        }
        self.devices = kept;
    }

    /// Removes devices whose `last_seen_ms` is older than `now_ms -
    /// max_age_ms`.
    pub fn age_out(&mut self, now_ms: u32, max_age_ms: u32) {
        let cutoff = now_ms.saturating_sub(max_age_ms);
        let mut kept: Vec<AerialDevice, N> = Vec::new();
        for d in self.devices.drain(..) {
            if d.last_seen_ms >= cutoff {
                let _ = kept.push(d);
            }
        }
        self.devices = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_id_roundtrip() {
        let encoded = encode_basic_id("DRONE-SERIAL-0001");
        let decoded = decode_basic_id(&encoded).unwrap();
        assert_eq!(decoded.device_id.as_str(), "DRONE-SERIAL-0001");
        assert_eq!(decoded.ua_type, 2);
        assert_eq!(decoded.id_type, 1);
    }

    #[test]
    fn location_roundtrip_within_tolerance() {
        let encoded = encode_location(37.7749, -122.4194, 100.0);
        let decoded = decode_location(&encoded).unwrap();
        assert!((decoded.latitude - 37.7749).abs() < 1e-6);
        assert!((decoded.longitude - -122.4194).abs() < 1e-6);
        assert!((decoded.altitude.unwrap() - 100.0).abs() < 0.5);
        assert_eq!(decoded.status, AerialStatus::Airborne as u8);
    }

    #[test]
    fn location_unknown_altitude_and_speed_sentinels() {
        let mut data = [0u8; MESSAGE_SIZE];
        data[0] = 0x10;
        data[3] = 255; // speed unknown
        data[15] = 0xFF;
        data[16] = 0xFF; // altitude unknown
        let decoded = decode_location(&data).unwrap();
        assert_eq!(decoded.altitude, None);
        assert_eq!(decoded.speed_horizontal, None);
    }

    #[test]
    fn self_id_truncates_at_first_non_printable() {
        let mut data = [0x20u8; MESSAGE_SIZE];
        data[0] = 0x30;
        data[2] = b'H';
        data[3] = b'i';
        data[4] = 0x01; // non-printable terminator
        data[5] = b'X';
        let decoded = decode_self_id(&data).unwrap();
        assert_eq!(decoded.description.as_str(), "Hi");
    }

    #[test]
    fn messages_shorter_than_25_bytes_return_none() {
        let short = [0u8; 10];
        assert!(decode_basic_id(&short).is_none());
        assert!(decode_location(&short).is_none());
    }

    #[test]
    fn packed_message_recurses_into_submessages() {
        let mut packed = [0u8; 3 + 2 * MESSAGE_SIZE];
        packed[0] = 0xF0;
        packed[1] = MESSAGE_SIZE as u8;
        packed[2] = 2;
        let basic = encode_basic_id("PACKED-ID-000001");
        packed[3..3 + MESSAGE_SIZE].copy_from_slice(&basic);
        let loc = encode_location(1.0, 2.0, 50.0);
        packed[3 + MESSAGE_SIZE..3 + 2 * MESSAGE_SIZE].copy_from_slice(&loc);

        let mut device = AerialDevice::new([0; 6]);
        device.apply_odid_message(&packed);
        assert_eq!(device.device_id.as_str(), "PACKED-ID-000001");
        assert!(device.has_location);
        assert!((device.latitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn device_upgrades_from_unknown_on_first_payload() {
        let mut device = AerialDevice::new([1; 6]);
        assert_eq!(device.device_type, AerialType::Unknown);
        device.apply_odid_message(&encode_basic_id("X"));
        assert_eq!(device.device_type, AerialType::RemoteIdWifi);
    }

    #[test]
    fn table_find_or_create_is_idempotent_per_mac() {
        let mut table: AerialDeviceTable<4> = AerialDeviceTable::new();
        table.find_or_create([1; 6]).unwrap().rssi = -40;
        table.find_or_create([1; 6]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().rssi, -40);
    }

    #[test]
    fn compact_removes_only_unknown_type() {
        let mut table: AerialDeviceTable<4> = AerialDeviceTable::new();
        table.find_or_create([1; 6]).unwrap().apply_odid_message(&encode_basic_id("A"));
        table.find_or_create([2; 6]); // stays Unknown
        assert_eq!(table.len(), 2);
        table.compact();
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().mac, [1; 6]);
    }

    #[test]
    fn age_out_removes_stale_devices() {
        let mut table: AerialDeviceTable<4> = AerialDeviceTable::new();
        table.find_or_create([1; 6]).unwrap().last_seen_ms = 1_000;
        table.find_or_create([2; 6]).unwrap().last_seen_ms = 9_000;
        table.age_out(10_000, 5_000);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().mac, [2; 6]);
    }

    #[test]
    fn table_rejects_new_mac_when_full() {
        let mut table: AerialDeviceTable<1> = AerialDeviceTable::new();
        assert!(table.find_or_create([1; 6]).is_some());
        assert!(table.find_or_create([2; 6]).is_none());
    }
}
