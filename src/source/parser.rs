//! Row parsing into validated device records.
//!
//! Rows are `device_type, device_id, lat, lon, apps`. Short rows, rows that
//! are not UTF-8 and rows without identity are expected noise and dropped
//! silently. Bad coordinates drop the row with a warning. Bad app ids only
//! drop the single entry.

use tracing::warn;

/// Minimum number of fields a row needs.
pub const MIN_FIELDS: usize = 5;

/// A validated install record for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_type: String,
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

/// Why a row did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A field is not valid UTF-8.
    InvalidEncoding,
    /// Fewer than five fields.
    TooFewFields,
    /// Empty device type or device id.
    MissingIdentity,
    /// Latitude or longitude is not a finite number.
    InvalidGeo,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidEncoding => "invalid_encoding",
            DropReason::TooFewFields => "too_few_fields",
            DropReason::MissingIdentity => "missing_identity",
            DropReason::InvalidGeo => "invalid_geo",
        }
    }
}

/// Decode the raw fields of one row.
pub fn decode_fields<'a, I>(fields: I) -> Result<Vec<&'a str>, DropReason>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    fields
        .into_iter()
        .map(|field| std::str::from_utf8(field).map_err(|_| DropReason::InvalidEncoding))
        .collect()
}

/// Parse one row of fields into a [`DeviceRecord`].
pub fn parse_record<S: AsRef<str>>(fields: &[S]) -> Result<DeviceRecord, DropReason> {
    if fields.len() < MIN_FIELDS {
        return Err(DropReason::TooFewFields);
    }

    let device_type = fields[0].as_ref();
    let device_id = fields[1].as_ref();
    if device_type.is_empty() || device_id.is_empty() {
        return Err(DropReason::MissingIdentity);
    }

    let (raw_lat, raw_lon) = (fields[2].as_ref(), fields[3].as_ref());
    let Some((lat, lon)) = parse_coords(raw_lat, raw_lon) else {
        warn!(
            device_type,
            device_id,
            lat = raw_lat,
            lon = raw_lon,
            "Invalid geo coords"
        );
        return Err(DropReason::InvalidGeo);
    };

    Ok(DeviceRecord {
        device_type: device_type.to_string(),
        device_id: device_id.to_string(),
        lat,
        lon,
        apps: parse_apps(fields[4].as_ref()),
    })
}

fn parse_coords(lat: &str, lon: &str) -> Option<(f64, f64)> {
    let lat = lat.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let lon = lon.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((lat, lon))
}

/// Parse a comma-separated app list, skipping entries that are not `u32`.
pub fn parse_apps(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|app| app.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a subscriber that captures formatted events.
    fn captured_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn warnings(logs: &str) -> usize {
        logs.lines().filter(|line| line.contains("WARN")).count()
    }

    #[test]
    fn test_parse_valid_row() {
        let record = parse_record(&["idfa", "id123", "55.55", "37.37", "42,43,abc,44"]).unwrap();
        assert_eq!(
            record,
            DeviceRecord {
                device_type: "idfa".to_string(),
                device_id: "id123".to_string(),
                lat: 55.55,
                lon: 37.37,
                apps: vec![42, 43, 44],
            }
        );
    }

    #[test]
    fn test_short_rows_dropped() {
        assert_eq!(parse_record::<&str>(&[]), Err(DropReason::TooFewFields));
        assert_eq!(
            parse_record(&["idfa", "id1", "1.0", "2.0"]),
            Err(DropReason::TooFewFields)
        );
    }

    #[test]
    fn test_missing_identity_dropped() {
        assert_eq!(
            parse_record(&["", "id1", "1.0", "2.0", "1"]),
            Err(DropReason::MissingIdentity)
        );
        assert_eq!(
            parse_record(&["gaid", "", "1.0", "2.0", "1"]),
            Err(DropReason::MissingIdentity)
        );
    }

    #[test]
    fn test_invalid_geo_dropped() {
        assert_eq!(
            parse_record(&["idfa", "id123", "bad", "37.37", "1,2"]),
            Err(DropReason::InvalidGeo)
        );
        assert_eq!(
            parse_record(&["idfa", "id123", "55.55", "", "1,2"]),
            Err(DropReason::InvalidGeo)
        );
    }

    #[test]
    fn test_padded_geo_dropped() {
        assert_eq!(
            parse_record(&["idfa", "id1", " 55.5", "37.37", "1"]),
            Err(DropReason::InvalidGeo)
        );
        assert_eq!(
            parse_record(&["idfa", "id1", "55.5", "37.37 ", "1"]),
            Err(DropReason::InvalidGeo)
        );
    }

    #[test]
    fn test_invalid_geo_logs_one_warning() {
        let logs = captured_logs(|| {
            let _ = parse_record(&["idfa", "id123", "bad", "37.37", "1,2"]);
        });
        assert_eq!(warnings(&logs), 1);
        assert!(logs.contains("Invalid geo coords"));
        assert!(logs.contains("id123"));
    }

    #[test]
    fn test_invalid_apps_log_nothing() {
        let logs = captured_logs(|| {
            let record = parse_record(&["idfa", "id123", "55.55", "37.37", "x,1,-3"]).unwrap();
            assert_eq!(record.apps, vec![1]);
        });
        assert_eq!(warnings(&logs), 0);
    }

    #[test]
    fn test_decode_fields() {
        let ok: [&[u8]; 2] = [b"idfa", b"id1"];
        assert_eq!(decode_fields(ok), Ok(vec!["idfa", "id1"]));

        let bad: [&[u8]; 2] = [b"idfa", b"\xff\xfe"];
        assert_eq!(decode_fields(bad), Err(DropReason::InvalidEncoding));
    }

    #[test]
    fn test_non_finite_geo_dropped() {
        assert_eq!(
            parse_record(&["idfa", "id1", "NaN", "1.0", "1"]),
            Err(DropReason::InvalidGeo)
        );
        assert_eq!(
            parse_record(&["idfa", "id1", "1.0", "inf", "1"]),
            Err(DropReason::InvalidGeo)
        );
    }

    #[test]
    fn test_all_invalid_apps_keeps_record() {
        let record = parse_record(&["adid", "x", "1.5", "-2.5", "a,b,,-1"]).unwrap();
        assert!(record.apps.is_empty());
        assert_eq!(record.lat, 1.5);
        assert_eq!(record.lon, -2.5);
    }

    #[test]
    fn test_apps_trimmed_and_ordered() {
        assert_eq!(parse_apps(" 7 , 3,x, 5"), vec![7, 3, 5]);
        assert_eq!(parse_apps(""), Vec::<u32>::new());
        // out of u32 range
        assert_eq!(parse_apps("4294967296,1"), vec![1]);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let record = parse_record(&["dvid", "d1", "0", "0", "1", "extra"]).unwrap();
        assert_eq!(record.apps, vec![1]);
    }
}
