//! Device-type to shard routing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four memcached shards, one per device-type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardTarget {
    Idfa,
    Gaid,
    Adid,
    Dvid,
}

impl ShardTarget {
    /// All shards, in configuration order.
    pub const ALL: [ShardTarget; 4] = [
        ShardTarget::Idfa,
        ShardTarget::Gaid,
        ShardTarget::Adid,
        ShardTarget::Dvid,
    ];

    /// Route a device type to its shard.
    ///
    /// Matching is exact; anything other than the four known tokens has no
    /// shard and the caller drops the record.
    pub fn route(device_type: &str) -> Option<Self> {
        match device_type {
            "idfa" => Some(ShardTarget::Idfa),
            "gaid" => Some(ShardTarget::Gaid),
            "adid" => Some(ShardTarget::Adid),
            "dvid" => Some(ShardTarget::Dvid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardTarget::Idfa => "idfa",
            ShardTarget::Gaid => "gaid",
            ShardTarget::Adid => "adid",
            ShardTarget::Dvid => "dvid",
        }
    }
}

impl fmt::Display for ShardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
