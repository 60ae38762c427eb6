use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const STORE_DIR: [&str; 2] = [".canvas-agent", "store"];

#[must_use]
pub fn store_root(cwd: &Path) -> PathBuf {
    cwd.join(STORE_DIR[0]).join(STORE_DIR[1])
}

#[must_use]
pub fn blob_file_name(key: &str) -> String {
    format!("{key}.json")
}

/// Session ids and keys become path segments, so only a conservative
/// alphabet is accepted.
pub fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let valid = !segment.is_empty()
        && segment.len() <= 128
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !segment.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSegment {
            segment: segment.to_string(),
        })
    }
}
