//! Protobuf payload stored per device.
//!
//! Wire-compatible with the `UserApps` proto2 message:
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1;
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```

use bytes::Bytes;
use prost::Message;
use snafu::prelude::*;
use tracing::info;

use crate::aggregate::StoreKey;
use crate::error::{PayloadDecodeSnafu, PayloadMismatchSnafu, SampleRowSnafu, SelfCheckError};
use crate::source::{DeviceRecord, parse_record};

const SELF_CHECK_SAMPLE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
                                 gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424";

/// Value written to memcached for one device.
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl From<&DeviceRecord> for UserApps {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: Some(record.lat),
            lon: Some(record.lon),
        }
    }
}

/// Serialize the `{lat, lon, apps}` part of a record.
pub fn encode_payload(record: &DeviceRecord) -> Bytes {
    Bytes::from(UserApps::from(record).encode_to_vec())
}

/// Encode and decode a couple of sample rows, checking nothing is lost.
///
/// Returns the number of rows checked.
pub fn self_check() -> Result<usize, SelfCheckError> {
    let mut checked = 0;
    for (idx, line) in SELF_CHECK_SAMPLE.lines().enumerate() {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        let record = parse_record(&fields)
            .ok()
            .context(SampleRowSnafu { line: idx + 1 })?;
        let key = StoreKey::for_record(&record);

        let expected = UserApps::from(&record);
        let unpacked = UserApps::decode(encode_payload(&record)).context(PayloadDecodeSnafu {
            key: key.as_str(),
        })?;
        ensure!(unpacked == expected, PayloadMismatchSnafu { key: key.as_str() });

        info!("{} -> {:?}", key, unpacked);
        checked += 1;
    }
    Ok(checked)
}
