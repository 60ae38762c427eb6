/// Default service root used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787";

const STREAM_PATH: &str = "/stream";

/// Normalize a configured endpoint to the streaming route.
///
/// Blank input falls back to [`DEFAULT_ENDPOINT`]; trailing slashes are
/// dropped and `/stream` is appended unless already present.
pub fn normalize_endpoint(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_ENDPOINT
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(STREAM_PATH) {
        return trimmed.to_string();
    }
    format!("{trimmed}{STREAM_PATH}")
}
