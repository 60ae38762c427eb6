use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STORE_VERSION: u32 = 1;

/// On-disk wrapper around one stored blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub version: u32,
    /// RFC 3339 UTC timestamp of the last write.
    pub saved_at: String,
    pub value: Value,
}
