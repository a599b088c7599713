//! Per-file aggregation of device records by store key.

use indexmap::IndexMap;
use std::fmt;

use crate::router::ShardTarget;
use crate::source::DeviceRecord;

/// Composite `device_type:device_id` key used in memcached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(device_type: &str, device_id: &str) -> Self {
        Self(format!("{device_type}:{device_id}"))
    }

    pub fn for_record(record: &DeviceRecord) -> Self {
        Self::new(&record.device_type, &record.device_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record paired with the shard it is written to.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub shard: ShardTarget,
    pub record: DeviceRecord,
}

/// Aggregated records for one file, in first-seen key order.
pub type Aggregated = IndexMap<StoreKey, Routed>;

/// Build the key → record map for one file.
///
/// Later records overwrite earlier ones with the same key; app lists are not
/// merged. An overwritten key keeps the position of its first occurrence.
pub fn aggregate<I>(records: I) -> Aggregated
where
    I: IntoIterator<Item = Routed>,
{
    let mut map = IndexMap::new();
    for routed in records {
        map.insert(StoreKey::for_record(&routed.record), routed);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routed(device_type: &str, device_id: &str, apps: Vec<u32>) -> Routed {
        Routed {
            shard: ShardTarget::route(device_type).unwrap(),
            record: DeviceRecord {
                device_type: device_type.to_string(),
                device_id: device_id.to_string(),
                lat: 1.0,
                lon: 2.0,
                apps,
            },
        }
    }

    #[test]
    fn test_store_key_format() {
        assert_eq!(StoreKey::new("idfa", "id123").as_str(), "idfa:id123");
    }

    #[test]
    fn test_last_write_wins() {
        let map = aggregate(vec![
            routed("idfa", "a", vec![1, 2]),
            routed("gaid", "b", vec![3]),
            routed("idfa", "a", vec![9]),
        ]);

        assert_eq!(map.len(), 2);
        let winner = &map[&StoreKey::new("idfa", "a")];
        assert_eq!(winner.record.apps, vec![9]);
        // position of the first occurrence is kept
        assert_eq!(map.get_index(0).unwrap().0.as_str(), "idfa:a");
    }

    #[test]
    fn test_same_id_different_type_are_distinct() {
        let map = aggregate(vec![routed("idfa", "x", vec![]), routed("adid", "x", vec![])]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
