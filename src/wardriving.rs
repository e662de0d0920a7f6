//! Wardriving CSV export (spec.md §6): the `WardrivingRecord` type shared
//! by the Wi-Fi classifier's `Wardriving` operation and the BLE
//! `BleWardriving` handler, and the exact CSV schema/quoting rule.
//!
//! Missing GPS is modeled as `Option<GpsFix>` rather than zero coordinates,
//! so the writer can tell "no fix" from "fix at 0,0" — see DESIGN.md.

use heapless::String;

use crate::classifier::Auth;

pub const CSV_HEADER: &str =
    "Type,Name,MAC,Associated MAC,Channel,Frequency,RSSI,Auth,Cipher,802.11,WPS,Latitude,Longitude,Altitude,First Seen";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Wifi,
    Ble,
}

impl RecordType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "WIFI",
            Self::Ble => "BLE",
        }
    }
}

pub struct WardrivingRecord {
    pub record_type: RecordType,
    pub name: String<32>,
    pub mac: [u8; 6],
    pub associated_mac: Option<[u8; 6]>,
    pub channel: Option<u8>,
    pub frequency_mhz: Option<u32>,
    pub rssi: i8,
    pub auth: Option<Auth>,
    pub cipher: Option<String<16>>,
    pub dot11_standard: Option<String<8>>,
    pub wps: bool,
    pub gps: Option<GpsFix>,
    pub first_seen_ms: u64,
}

fn format_mac(mac: [u8; 6], out: &mut String<32>) {
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = out.push(':');
        }
        let hex = b"0123456789abcdef";
        let _ = out.push(hex[(b >> 4) as usize] as char);
        let _ = out.push(hex[(b & 0xF) as usize] as char);
    }
}

fn auth_str(auth: Auth) -> &'static str {
    match auth {
        Auth::Open => "Open",
        Auth::Wep => "WEP",
        Auth::Wpa => "WPA",
        Auth::Wpa2 => "WPA2",
        Auth::Wpa3 => "WPA3",
        Auth::Owe => "OWE",
    }
}

fn needs_quoting(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n')
}

/// Appends `field`, double-quoting it (with embedded quotes doubled) if it
/// contains a comma, quote, or newline, per spec.md §6's CSV quoting rule.
fn push_csv_field<const N: usize>(out: &mut String<N>, field: &str) {
    if needs_quoting(field) {
        let _ = out.push('"');
        for c in field.chars() {
            if c == '"' {
                let _ = out.push('"');
            }
            let _ = out.push(c);
        }
        let _ = out.push('"');
    } else {
        let _ = out.push_str(field);
    }
}

const MAX_ROW_LEN: usize = 256;

/// Renders one CSV data row (no trailing newline) per the `CSV_HEADER`
/// column order.
pub fn render_row(record: &WardrivingRecord) -> String<MAX_ROW_LEN> {
    let mut row: String<MAX_ROW_LEN> = String::new();
    let mut mac_str: String<32> = String::new();
    format_mac(record.mac, &mut mac_str);

    push_csv_field(&mut row, record.record_type.as_str());
    let _ = row.push(',');
    push_csv_field(&mut row, record.name.as_str());
    let _ = row.push(',');
    push_csv_field(&mut row, mac_str.as_str());
    let _ = row.push(',');
    if let Some(assoc) = record.associated_mac {
        let mut s: String<32> = String::new();
        format_mac(assoc, &mut s);
        push_csv_field(&mut row, s.as_str());
    }
    let _ = row.push(',');
    if let Some(ch) = record.channel {
        let mut s: String<8> = String::new();
        let _ = core::fmt::write(&mut s, format_args!("{ch}"));
        push_csv_field(&mut row, s.as_str());
    }
    let _ = row.push(',');
    if let Some(freq) = record.frequency_mhz {
        let mut s: String<16> = String::new();
        let _ = core::fmt::write(&mut s, format_args!("{freq}"));
        push_csv_field(&mut row, s.as_str());
    }
    let _ = row.push(',');
    {
        let mut s: String<8> = String::new();
        let _ = core::fmt::write(&mut s, format_args!("{}", record.rssi));
        push_csv_field(&mut row, s.as_str());
    }
    let _ = row.push(',');
    if let Some(auth) = record.auth {
        push_csv_field(&mut row, auth_str(auth));
    }
    let _ = row.push(',');
    if let Some(cipher) = &record.cipher {
        push_csv_field(&mut row, cipher.as_str());
    }
    let _ = row.push(',');
    if let Some(std) = &record.dot11_standard {
        push_csv_field(&mut row, std.as_str());
    }
    let _ = row.push(',');
    push_csv_field(&mut row, if record.wps { "true" } else { "false" });
    let _ = row.push(',');
    match record.gps {
        Some(fix) => {
            let mut lat: String<24> = String::new();
            let _ = core::fmt::write(&mut lat, format_args!("{:.6}", fix.latitude));
            push_csv_field(&mut row, lat.as_str());
            let _ = row.push(',');
            let mut lon: String<24> = String::new();
            let _ = core::fmt::write(&mut lon, format_args!("{:.6}", fix.longitude));
            push_csv_field(&mut row, lon.as_str());
            let _ = row.push(',');
            let mut alt: String<16> = String::new();
            let _ = core::fmt::write(&mut alt, format_args!("{:.1}", fix.altitude));
            push_csv_field(&mut row, alt.as_str());
        }
        None => {
            let _ = row.push(',');
            let _ = row.push(',');
        }
    }
    let _ = row.push(',');
    {
        let mut s: String<24> = String::new();
        let _ = core::fmt::write(&mut s, format_args!("{}", record.first_seen_ms));
        push_csv_field(&mut row, s.as_str());
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> WardrivingRecord {
        WardrivingRecord {
            record_type: RecordType::Wifi,
            name: String::try_from("HomeNet").unwrap(),
            mac: [0xAA, 0xBB, 0xCC, 0x11, 0x22, 0x33],
            associated_mac: None,
            channel: Some(6),
            frequency_mhz: Some(2437),
            rssi: -55,
            auth: Some(Auth::Wpa2),
            cipher: Some(String::try_from("CCMP").unwrap()),
            dot11_standard: Some(String::try_from("n").unwrap()),
            wps: false,
            gps: None,
            first_seen_ms: 12345,
        }
    }

    #[test]
    fn header_matches_schema_exactly() {
        assert_eq!(
            CSV_HEADER,
            "Type,Name,MAC,Associated MAC,Channel,Frequency,RSSI,Auth,Cipher,802.11,WPS,Latitude,Longitude,Altitude,First Seen"
        );
    }

    #[test]
    fn row_has_fourteen_commas_for_fifteen_columns() {
        let row = render_row(&base_record());
        assert_eq!(row.matches(',').count(), 14);
    }

    #[test]
    fn row_renders_mac_as_lowercase_colon_hex() {
        let row = render_row(&base_record());
        assert!(row.contains("aa:bb:cc:11:22:33"));
    }

    #[test]
    fn missing_gps_emits_empty_lat_long_alt_fields() {
        let row = render_row(&base_record());
        assert!(row.contains(",,,,12345"));
    }

    #[test]
    fn present_gps_emits_coordinates() {
        let mut r = base_record();
        r.gps = Some(GpsFix { latitude: 37.422, longitude: -122.084, altitude: 12.5 });
        let row = render_row(&r);
        assert!(row.contains("37.422000"));
        assert!(row.contains("-122.084000"));
        assert!(row.contains("12.5"));
    }

    #[test]
    fn ssid_with_comma_is_quoted_with_doubled_quotes() {
        let mut r = base_record();
        r.name = String::try_from("Joe's \"Cafe\", Guest").unwrap();
        let row = render_row(&r);
        assert!(row.contains("\"Joe's \"\"Cafe\"\", Guest\""));
    }

    #[test]
    fn plain_field_is_not_quoted() {
        let row = render_row(&base_record());
        assert!(row.starts_with("WIFI,HomeNet,"));
    }

    #[test]
    fn ble_record_type_label() {
        let mut r = base_record();
        r.record_type = RecordType::Ble;
        r.channel = None;
        r.frequency_mhz = None;
        let row = render_row(&r);
        assert!(row.starts_with("BLE,"));
    }
}
