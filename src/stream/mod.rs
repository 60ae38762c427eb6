//! Turning streamed model output into partial action records.

mod actions;
mod repair;

pub use actions::{ActionStreamer, StreamingAction};
pub use repair::{extract_values, repair_json, strip_wrappers};
