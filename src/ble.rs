//! BLE advertising decoder and scanner (spec.md §4.5): a single AD-structure
//! walker dispatched to eight independent, idempotent handlers. Grounded in
//! `ble_manager.c`'s tracker/Flipper/AirTag/skimmer callbacks and
//! `callbacks.c`'s suspicious-name table.

use heapless::String;

use crate::odid;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_UUID16_INCOMPLETE: u8 = 0x02;
pub const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
pub const AD_TYPE_UUID32_INCOMPLETE: u8 = 0x04;
pub const AD_TYPE_UUID32_COMPLETE: u8 = 0x05;
pub const AD_TYPE_UUID128_INCOMPLETE: u8 = 0x06;
pub const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvEventType {
    AdvInd,
    DirectInd,
    ScanInd,
    NonconnInd,
    ScanRsp,
}

#[derive(Debug, Clone, Copy)]
pub struct AdvReport<'a> {
    pub addr: [u8; 6],
    pub addr_type: u8,
    pub rssi: i8,
    pub event_type: AdvEventType,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub value: &'a [u8],
}

/// Walks `(len, type, value[len-1])` AD structures in `data`, stopping
/// (not recovering) at the first structure whose declared length would
/// read past `data`.
pub fn walk_ad_structures<'a>(data: &'a [u8], mut f: impl FnMut(AdStructure<'a>)) {
    let mut index = 0usize;
    while index < data.len() {
        let field_len = data[index] as usize;
        if field_len == 0 || index + field_len >= data.len() + 1 || index + 1 + field_len > data.len() {
            break;
        }
        let ad_type = data[index + 1];
        f(AdStructure { ad_type, value: &data[index + 2..index + 1 + field_len] });
        index += 1 + field_len;
    }
}

pub fn complete_name(data: &[u8]) -> Option<String<32>> {
    let mut out: Option<String<32>> = None;
    walk_ad_structures(data, |ad| {
        if out.is_some() {
            return;
        }
        if ad.ad_type == AD_TYPE_COMPLETE_NAME || ad.ad_type == AD_TYPE_SHORT_NAME {
            let mut s = String::new();
            for &b in ad.value.iter().take(32) {
                let c = if (0x20..=0x7E).contains(&b) { b as char } else { '?' };
                if s.push(c).is_err() {
                    break;
                }
            }
            out = Some(s);
        }
    });
    out
}

fn manufacturer_data(data: &[u8]) -> Option<(u16, heapless::Vec<u8, 27>)> {
    let mut found = None;
    walk_ad_structures(data, |ad| {
        if found.is_some() || ad.ad_type != AD_TYPE_MANUFACTURER_DATA || ad.value.len() < 2 {
            return;
        }
        let company_id = u16::from_le_bytes([ad.value[0], ad.value[1]]);
        let mut payload = heapless::Vec::new();
        let _ = payload.extend_from_slice(&ad.value[2..]);
        found = Some((company_id, payload));
    });
    found
}

fn service_data(data: &[u8], uuid: u16) -> Option<heapless::Vec<u8, 31>> {
    let mut found = None;
    walk_ad_structures(data, |ad| {
        if found.is_some() || ad.ad_type != AD_TYPE_SERVICE_DATA_16 || ad.value.len() < 2 {
            return;
        }
        let svc_uuid = u16::from_le_bytes([ad.value[0], ad.value[1]]);
        if svc_uuid != uuid {
            return;
        }
        let mut payload = heapless::Vec::new();
        let _ = payload.extend_from_slice(&ad.value[2..]);
        found = Some(payload);
    });
    found
}

// ---- AirTag handler ----

pub const AIRTAG_RSSI_LOG_INTERVAL_MS: u64 = 3000;

/// True if either of the two Apple nearby-interaction/offline-finding byte
/// patterns appears anywhere in the raw advertisement payload.
pub fn matches_airtag_pattern(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    for i in 0..=data.len() - 4 {
        let w = &data[i..i + 4];
        if w == [0x1E, 0xFF, 0x4C, 0x00] || w == [0x4C, 0x00, 0x12, 0x19] {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Copy)]
pub struct AirTagEntry {
    pub addr: [u8; 6],
    pub rssi: i8,
    pub last_log_ms: u64,
}

pub struct AirTagTable<const N: usize> {
    entries: heapless::Vec<AirTagEntry, N>,
}

impl<const N: usize> Default for AirTagTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AirTagTable<N> {
    pub const fn new() -> Self {
        Self { entries: heapless::Vec::new() }
    }

    /// Inserts or refreshes an AirTag entry. Returns `Some(now_ms)` only
    /// when the per-entry 3-second RSSI log rate limit allows logging now.
    pub fn observe(&mut self, addr: [u8; 6], rssi: i8, now_ms: u64) -> Option<bool> {
        if let Some(e) = self.entries.iter_mut().find(|e| e.addr == addr) {
            e.rssi = rssi;
            let should_log = now_ms.saturating_sub(e.last_log_ms) >= AIRTAG_RSSI_LOG_INTERVAL_MS;
            if should_log {
                e.last_log_ms = now_ms;
            }
            return Some(should_log);
        }
        if self.entries.push(AirTagEntry { addr, rssi, last_log_ms: now_ms }).is_err() {
            return None;
        }
        Some(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---- Flipper Zero handler ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipperVariant {
    White,
    Black,
    Transparent,
}

/// Scans 16-bit service-UUID AD structures (complete or incomplete) for the
/// three known Flipper Zero color-variant UUIDs.
pub fn detect_flipper(data: &[u8]) -> Option<FlipperVariant> {
    let mut found = None;
    walk_ad_structures(data, |ad| {
        if found.is_some() {
            return;
        }
        if (ad.ad_type == AD_TYPE_UUID16_INCOMPLETE || ad.ad_type == AD_TYPE_UUID16_COMPLETE) && ad.value.len() >= 2 {
            let uuid = u16::from_le_bytes([ad.value[0], ad.value[1]]);
            found = match uuid {
                0x3082 => Some(FlipperVariant::White),
                0x3081 => Some(FlipperVariant::Black),
                0x3083 => Some(FlipperVariant::Transparent),
                _ => None,
            };
        }
    });
    found
}

#[derive(Debug, Clone, Copy)]
pub struct FlipperEntry {
    pub addr: [u8; 6],
    pub variant: FlipperVariant,
    pub rssi: i8,
}

pub struct FlipperTable<const N: usize> {
    entries: heapless::Vec<FlipperEntry, N>,
}

impl<const N: usize> Default for FlipperTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FlipperTable<N> {
    pub const fn new() -> Self {
        Self { entries: heapless::Vec::new() }
    }

    pub fn observe(&mut self, addr: [u8; 6], variant: FlipperVariant, rssi: i8) -> bool {
        if let Some(e) = self.entries.iter_mut().find(|e| e.addr == addr) {
            e.rssi = rssi;
            e.variant = variant;
            return true;
        }
        self.entries.push(FlipperEntry { addr, variant, rssi }).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---- OpenDroneID BLE handler ----

pub const ODID_BLE_SERVICE_UUID: u16 = 0xFFFA;

/// Extracts the 25-byte ODID payload following the rolling message counter
/// in the `0xFFFA` service-data AD structure, per spec.md §4.5/§4.6.
pub fn decode_odid_ble(data: &[u8]) -> Option<&[u8]> {
    // service_data() copies into a fixed Vec; we need the raw slice here to
    // avoid an extra copy, so walk directly.
    let mut found = None;
    walk_ad_structures(data, |ad| {
        if found.is_some() || ad.ad_type != AD_TYPE_SERVICE_DATA_16 || ad.value.len() < 3 {
            return;
        }
        let svc_uuid = u16::from_le_bytes([ad.value[0], ad.value[1]]);
        if svc_uuid != ODID_BLE_SERVICE_UUID {
            return;
        }
        // value[2] is the rolling counter; the ODID message follows.
        if ad.value.len() >= 3 + odid::MESSAGE_SIZE {
            found = Some(&ad.value[3..3 + odid::MESSAGE_SIZE]);
        }
    });
    found
}

// ---- DJI BLE handler ----

pub const DJI_BLE_SERVICE_UUID: u16 = 0xFFE0;

/// Best-effort printable-string extraction from the `0xFFE0` DJI service
/// data, for use as a device description.
pub fn decode_dji_ble(data: &[u8]) -> Option<String<23>> {
    let payload = service_data(data, DJI_BLE_SERVICE_UUID)?;
    let mut s = String::new();
    for &b in payload.iter() {
        let c = if (0x20..=0x7E).contains(&b) { b as char } else { continue };
        if s.push(c).is_err() {
            break;
        }
    }
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// ---- Skimmer handler ----

pub const SUSPICIOUS_NAMES: [&str; 12] =
    ["HC-03", "HC-05", "HC-06", "HC-08", "BT-HC05", "JDY-31", "AT-09", "HM-10", "CC41-A", "MLT-BT05", "SPP-CA", "FFD0"];

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// Returns the matched suspicious-name pattern if `name` matches one of the
/// known skimmer device names, case-insensitively.
pub fn match_skimmer_name(name: &str) -> Option<&'static str> {
    SUSPICIOUS_NAMES.iter().copied().find(|pat| eq_ignore_case(name, pat))
}

/// Builds the enhanced skimmer PCAP record layout from spec.md §4.5:
/// `[mac(6)][rssi(1)][name_len(1)][name][reason_len(1)][reason][raw_adv]`.
pub fn build_skimmer_record<const N: usize>(
    mac: [u8; 6],
    rssi: i8,
    name: &str,
    reason: &str,
    raw_adv: &[u8],
    out: &mut heapless::Vec<u8, N>,
) -> Option<()> {
    out.clear();
    out.extend_from_slice(&mac).ok()?;
    out.push(rssi as u8).ok()?;
    out.push(name.len() as u8).ok()?;
    out.extend_from_slice(name.as_bytes()).ok()?;
    out.push(reason.len() as u8).ok()?;
    out.extend_from_slice(reason.as_bytes()).ok()?;
    out.extend_from_slice(raw_adv).ok()?;
    Some(())
}

// ---- BLE Wardriving handler ----

/// Manufacturer ID for a wardriving record, the first two little-endian
/// bytes of manufacturer-specific data, if present.
pub fn manufacturer_id(data: &[u8]) -> Option<u16> {
    manufacturer_data(data).map(|(id, _)| id)
}

// ---- GATT device scan / tracker classification ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerType {
    AppleAirtag,
    AppleFindMy,
    SamsungSmartTag,
    Tile,
    Chipolo,
    GenericFindMy,
}

const TILE_SERVICE_UUID_A: u16 = 0xFEED;
const TILE_SERVICE_UUID_B: u16 = 0xFEEC;

/// Only `ADV_IND`/`DIRECT_IND` (connectable) reports are eligible for the
/// GATT device scan, per spec.md §4.5.
pub fn is_connectable(event_type: AdvEventType) -> bool {
    matches!(event_type, AdvEventType::AdvInd | AdvEventType::DirectInd)
}

/// Classifies the tracker type from service UUIDs / manufacturer data,
/// falling back to a name substring match, mirroring `detect_tracker_type`.
pub fn classify_tracker(data: &[u8], name: Option<&str>) -> Option<TrackerType> {
    let mut detected = None;
    walk_ad_structures(data, |ad| {
        if detected == Some(TrackerType::Tile) {
            return;
        }
        match ad.ad_type {
            AD_TYPE_UUID16_INCOMPLETE | AD_TYPE_UUID16_COMPLETE | AD_TYPE_SERVICE_DATA_16 if ad.value.len() >= 2 => {
                let uuid = u16::from_le_bytes([ad.value[0], ad.value[1]]);
                if uuid == TILE_SERVICE_UUID_A || uuid == TILE_SERVICE_UUID_B {
                    detected = Some(TrackerType::Tile);
                }
            }
            AD_TYPE_MANUFACTURER_DATA if ad.value.len() >= 2 => {
                let company_id = u16::from_le_bytes([ad.value[0], ad.value[1]]);
                let mfg = &ad.value[2..];
                match company_id {
                    0x00D8 => detected = Some(TrackerType::Tile),
                    0x0075 if detected.is_none() => detected = Some(TrackerType::SamsungSmartTag),
                    0x0231 if detected.is_none() => detected = Some(TrackerType::Chipolo),
                    0x004C if mfg.len() >= 2 && detected.is_none() => {
                        let type_byte = mfg[0];
                        let type_len = mfg[1];
                        if type_byte == 0x12 && type_len == 0x19 && mfg.len() >= 25 {
                            detected = Some(TrackerType::AppleAirtag);
                        } else if type_byte == 0x07 || type_byte == 0x10 {
                            detected = Some(TrackerType::AppleFindMy);
                        }
                    }
                    0x004F if !mfg.is_empty() && mfg[0] == 0x12 && detected.is_none() => {
                        detected = Some(TrackerType::GenericFindMy);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    });
    if detected.is_some() {
        return detected;
    }
    let name = name?;
    if name.contains("Tile") {
        Some(TrackerType::Tile)
    } else if name.contains("Chipolo") {
        Some(TrackerType::Chipolo)
    } else if name.contains("SmartTag") {
        Some(TrackerType::SamsungSmartTag)
    } else if name.contains("FindMy") || name.contains("Find My") {
        Some(TrackerType::GenericFindMy)
    } else {
        None
    }
}

pub const TILE_BASE_UUID: [u8; 12] = [0x6C, 0xD6, 0xF8, 0x28, 0x97, 0x8D, 0xAA, 0x86, 0x51, 0x49, 0x1C, 0x7D];

/// Upgrades a tracker classification to `Tile` if the Tile 128-bit base
/// UUID prefix appears among a GATT-discovered device's service UUIDs, per
/// spec.md §4.5's explicit-enumerate-pass correction step.
pub fn correct_tracker_from_services(current: Option<TrackerType>, service_uuid_128: &[u8]) -> Option<TrackerType> {
    if service_uuid_128.len() >= 12 && service_uuid_128[0..12] == TILE_BASE_UUID {
        return Some(TrackerType::Tile);
    }
    current
}

/// Models the connect → discover-all-services → optional pairing → read →
/// disconnect sequence from spec.md §4.5. Firmware supplies the concrete
/// transport; this trait keeps the enumeration flow host-testable.
pub trait GattTransport {
    type ServiceUuid;
    fn connect(&mut self, addr: [u8; 6]) -> bool;
    fn discover_services(&mut self) -> heapless::Vec<Self::ServiceUuid, 16>;
    /// Returns `true` if pairing (PASSKEY auto-accept / default PIN 000000
    /// on INPUT) succeeded or wasn't required.
    fn pair(&mut self) -> bool;
    fn read_characteristic(&mut self, uuid16: u16) -> Option<heapless::Vec<u8, 32>>;
    fn disconnect(&mut self);
}

pub const CHAR_DEVICE_NAME: u16 = 0x180A;
pub const CHAR_BATTERY_SERVICE: u16 = 0x180F;
pub const CHAR_CURRENT_TIME: u16 = 0x1805;

/// Runs the explicit enumeration pass over `transport`, reading the three
/// well-known characteristics spec.md names and always disconnecting
/// afterward, even on a failed read.
pub fn enumerate_gatt_device<T: GattTransport>(transport: &mut T, addr: [u8; 6]) -> bool {
    if !transport.connect(addr) {
        return false;
    }
    let _services = transport.discover_services();
    let _ = transport.pair();
    let _ = transport.read_characteristic(CHAR_DEVICE_NAME);
    let _ = transport.read_characteristic(CHAR_BATTERY_SERVICE);
    let _ = transport.read_characteristic(CHAR_CURRENT_TIME);
    transport.disconnect();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_ad_structures_stops_on_truncation() {
        let data = [5u8, 0x09, b'h', b'i']; // declares 5 but only 2 bytes follow
        let mut count = 0;
        walk_ad_structures(&data, |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn complete_name_extracts_ad_type_09() {
        let data = [4u8, AD_TYPE_COMPLETE_NAME, b'p', b'i', b'n'];
        assert_eq!(complete_name(&data).unwrap().as_str(), "pin");
    }

    #[test]
    fn airtag_pattern_matches_nearby_and_offline_finding() {
        assert!(matches_airtag_pattern(&[0x00, 0x1E, 0xFF, 0x4C, 0x00, 0x00]));
        assert!(matches_airtag_pattern(&[0x4C, 0x00, 0x12, 0x19]));
        assert!(!matches_airtag_pattern(&[0x01, 0x02, 0x03, 0x04]));
    }

    #[test]
    fn airtag_table_rate_limits_rssi_log() {
        let mut t = AirTagTable::<4>::new();
        assert_eq!(t.observe([1; 6], -50, 0), Some(true));
        assert_eq!(t.observe([1; 6], -48, 1000), Some(false));
        assert_eq!(t.observe([1; 6], -48, 3000), Some(true));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn flipper_detects_all_three_variants() {
        let white = [3u8, AD_TYPE_UUID16_COMPLETE, 0x82, 0x30];
        let black = [3u8, AD_TYPE_UUID16_COMPLETE, 0x81, 0x30];
        let transparent = [3u8, AD_TYPE_UUID16_COMPLETE, 0x83, 0x30];
        assert_eq!(detect_flipper(&white), Some(FlipperVariant::White));
        assert_eq!(detect_flipper(&black), Some(FlipperVariant::Black));
        assert_eq!(detect_flipper(&transparent), Some(FlipperVariant::Transparent));
    }

    #[test]
    fn odid_ble_extracts_25_byte_payload_after_counter() {
        let mut data = heapless::Vec::<u8, 64>::new();
        let mut msg = [0u8; 25];
        msg[0] = 0x00; // BasicID
        let payload_len = 1 + 2 + 1 + msg.len(); // type(1)+svc_uuid(2)+counter(1)+msg(25)
        data.push(payload_len as u8).unwrap();
        data.push(AD_TYPE_SERVICE_DATA_16).unwrap();
        data.extend_from_slice(&ODID_BLE_SERVICE_UUID.to_le_bytes()).unwrap();
        data.push(7).unwrap(); // rolling counter
        data.extend_from_slice(&msg).unwrap();
        let decoded = decode_odid_ble(&data).unwrap();
        assert_eq!(decoded.len(), 25);
        assert_eq!(decoded[0], 0x00);
    }

    #[test]
    fn dji_ble_extracts_printable_description() {
        let mut data = heapless::Vec::<u8, 32>::new();
        data.push(6).unwrap(); // type(1)+uuid(2)+"M2P"(3)
        data.push(AD_TYPE_SERVICE_DATA_16).unwrap();
        data.extend_from_slice(&DJI_BLE_SERVICE_UUID.to_le_bytes()).unwrap();
        data.extend_from_slice(b"M2P").unwrap();
        assert_eq!(decode_dji_ble(&data).unwrap().as_str(), "M2P");
    }

    #[test]
    fn skimmer_name_matches_case_insensitively() {
        assert_eq!(match_skimmer_name("hc-05"), Some("HC-05"));
        assert_eq!(match_skimmer_name("JDY-31"), Some("JDY-31"));
        assert!(match_skimmer_name("iPhone").is_none());
    }

    #[test]
    fn skimmer_record_has_expected_layout() {
        let mac = [0xAA; 6];
        let raw_adv = [0x01, 0x02, 0x03];
        let mut out = heapless::Vec::<u8, 64>::new();
        build_skimmer_record::<64>(mac, -70, "HC-05", "HC-05", &raw_adv, &mut out).unwrap();
        assert_eq!(&out[0..6], &mac);
        assert_eq!(out[6] as i8, -70);
        assert_eq!(out[7], 5); // name_len
        assert_eq!(&out[8..13], b"HC-05");
        assert_eq!(out[13], 5); // reason_len
        assert_eq!(&out[14..19], b"HC-05");
        assert_eq!(&out[19..22], &raw_adv);
    }

    #[test]
    fn tracker_classifies_tile_by_manufacturer_id() {
        let mut data = heapless::Vec::<u8, 16>::new();
        data.push(3).unwrap();
        data.push(AD_TYPE_MANUFACTURER_DATA).unwrap();
        data.extend_from_slice(&0x00D8u16.to_le_bytes()).unwrap();
        assert_eq!(classify_tracker(&data, None), Some(TrackerType::Tile));
    }

    #[test]
    fn tracker_classifies_airtag_by_apple_subpattern() {
        let mut data = heapless::Vec::<u8, 32>::new();
        let mut mfg = heapless::Vec::<u8, 32>::new();
        mfg.extend_from_slice(&0x004Cu16.to_le_bytes()).unwrap();
        mfg.push(0x12).unwrap();
        mfg.push(0x19).unwrap();
        mfg.extend_from_slice(&[0u8; 23]).unwrap();
        data.push((mfg.len() + 1) as u8).unwrap();
        data.push(AD_TYPE_MANUFACTURER_DATA).unwrap();
        data.extend_from_slice(&mfg).unwrap();
        assert_eq!(classify_tracker(&data, None), Some(TrackerType::AppleAirtag));
    }

    #[test]
    fn tracker_falls_back_to_name_substring() {
        assert_eq!(classify_tracker(&[], Some("My Tile Slim")), Some(TrackerType::Tile));
        assert_eq!(classify_tracker(&[], Some("random")), None);
    }

    #[test]
    fn tracker_corrected_to_tile_from_base_uuid() {
        let corrected = correct_tracker_from_services(None, &TILE_BASE_UUID);
        assert_eq!(corrected, Some(TrackerType::Tile));
    }

    #[test]
    fn only_connectable_events_pass_gatt_filter() {
        assert!(is_connectable(AdvEventType::AdvInd));
        assert!(is_connectable(AdvEventType::DirectInd));
        assert!(!is_connectable(AdvEventType::ScanInd));
        assert!(!is_connectable(AdvEventType::NonconnInd));
    }

    struct FakeTransport {
        connected: bool,
        reads: u32,
    }

    impl GattTransport for FakeTransport {
        type ServiceUuid = u16;
        fn connect(&mut self, _addr: [u8; 6]) -> bool {
            self.connected = true;
            true
        }
        fn discover_services(&mut self) -> heapless::Vec<u16, 16> {
            let mut v = heapless::Vec::new();
            let _ = v.push(CHAR_DEVICE_NAME);
            v
        }
        fn pair(&mut self) -> bool {
            true
        }
        fn read_characteristic(&mut self, _uuid16: u16) -> Option<heapless::Vec<u8, 32>> {
            self.reads += 1;
            None
        }
        fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    #[test]
    fn enumerate_gatt_device_reads_three_characteristics_then_disconnects() {
        let mut t = FakeTransport { connected: false, reads: 0 };
        assert!(enumerate_gatt_device(&mut t, [1; 6]));
        assert_eq!(t.reads, 3);
        assert!(!t.connected);
    }

    #[test]
    fn manufacturer_id_reads_first_two_le_bytes() {
        let mut data = heapless::Vec::<u8, 16>::new();
        data.push(3).unwrap();
        data.push(AD_TYPE_MANUFACTURER_DATA).unwrap();
        data.extend_from_slice(&0x1234u16.to_le_bytes()).unwrap();
        assert_eq!(manufacturer_id(&data), Some(0x1234));
    }
}
