//! Canvas agent orchestrator, runtime and binary.
//!
//! ## Provider bootstrap
//!
//! The provider is chosen with `CANVAS_AGENT_PROVIDER`:
//!
//! - `mock` (default) streams a scripted drawing, for local runs and tests
//! - `http` streams partial actions from a model service
//!
//! When `CANVAS_AGENT_PROVIDER=http`, set `CANVAS_AGENT_CONFIG_PATH` to a JSON
//! file of this shape:
//!
//! ```json
//! {
//!   "endpoint": "http://127.0.0.1:8787",
//!   "api_key": "optional",
//!   "models": ["canvas-default"],
//!   "timeout_sec": 120
//! }
//! ```
//!
//! `models` must include at least one non-empty id. `timeout_sec` must be
//! positive when present. Unknown fields are rejected.
//!
//! ## Session state
//!
//! History, chat origin, model choice, todos and context items are written
//! through to a file store under `CANVAS_AGENT_STORE_DIR` (default
//! `.canvas-agent/store`). `CANVAS_AGENT_SYSTEM_INSTRUCTIONS` replaces the
//! base block of the system instruction; the action catalogue is always
//! appended.

pub mod agent;
pub mod atom;
pub mod commands;
pub mod config;
pub mod persist;
pub mod providers;
pub mod runtime;

pub use agent::{Agent, AgentError, HostOps, Mode};
pub use atom::{Atom, SubscriptionId};
pub use config::{AgentConfig, AgentSettings, ConfigError, ProviderKind};
pub use persist::Persistence;
pub use runtime::RuntimeController;
