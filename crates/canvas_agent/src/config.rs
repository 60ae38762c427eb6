use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use canvas_core::PlacementConfig;
use serde::Deserialize;
use thiserror::Error;

pub const PROVIDER_ENV_VAR: &str = "CANVAS_AGENT_PROVIDER";
pub const CONFIG_PATH_ENV_VAR: &str = "CANVAS_AGENT_CONFIG_PATH";
pub const STORE_DIR_ENV_VAR: &str = "CANVAS_AGENT_STORE_DIR";
pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "CANVAS_AGENT_SYSTEM_INSTRUCTIONS";

/// Follow-up turns the agent may issue on its own per user prompt.
pub const DEFAULT_MAX_CONTINUATIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported provider '{0}'; available providers: mock, http")]
    UnsupportedProvider(String),
    #[error("provider '{provider}' requires {var} to point at a JSON config file")]
    MissingConfigPath {
        provider: &'static str,
        var: &'static str,
    },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("failed to resolve working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Mock,
    Http,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "mock" => Ok(Self::Mock),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Http => "http",
        }
    }
}

/// Contents of the file named by `CANVAS_AGENT_CONFIG_PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpFileConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub models: Vec<String>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

impl HttpFileConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_sec.map(Duration::from_secs)
    }
}

/// Tunables of the orchestrator itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_continuations: u32,
    pub placement: PlacementConfig,
    /// Replaces the built-in base block of the system instruction.
    pub system_instructions: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            placement: PlacementConfig::default(),
            system_instructions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub provider: ProviderKind,
    /// Present when `provider` is [`ProviderKind::Http`].
    pub http: Option<HttpFileConfig>,
    pub store_dir: PathBuf,
    pub settings: AgentSettings,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
        Self::from_env_in(&cwd)
    }

    /// Resolves relative defaults against `cwd`.
    pub fn from_env_in(cwd: &Path) -> Result<Self, ConfigError> {
        let provider = match non_blank_var(PROVIDER_ENV_VAR) {
            Some(value) => ProviderKind::parse(&value)?,
            None => ProviderKind::default(),
        };

        let http = match provider {
            ProviderKind::Mock => None,
            ProviderKind::Http => {
                let path =
                    non_blank_var(CONFIG_PATH_ENV_VAR).ok_or(ConfigError::MissingConfigPath {
                        provider: ProviderKind::Http.as_str(),
                        var: CONFIG_PATH_ENV_VAR,
                    })?;
                Some(load_http_config(Path::new(&path))?)
            }
        };

        let store_dir = match non_blank_var(STORE_DIR_ENV_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => agent_store::store_root(cwd),
        };

        Ok(Self {
            provider,
            http,
            store_dir,
            settings: AgentSettings {
                system_instructions: system_instructions_from_env(),
                ..AgentSettings::default()
            },
        })
    }
}

pub fn system_instructions_from_env() -> Option<String> {
    non_blank_var(SYSTEM_INSTRUCTIONS_ENV_VAR)
}

pub fn load_http_config(path: &Path) -> Result<HttpFileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: HttpFileConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let invalid = |reason: &str| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if config.endpoint.trim().is_empty() {
        return Err(invalid("`endpoint` must not be empty"));
    }
    if !config.models.iter().any(|model| !model.trim().is_empty()) {
        return Err(invalid("`models` must include at least one non-empty model id"));
    }
    if config.timeout_sec == Some(0) {
        return Err(invalid("`timeout_sec` must be > 0"));
    }

    Ok(config)
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use super::*;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(self.key, value),
                None => env::remove_var(self.key),
            }
        }
    }

    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
        EnvGuard { key, previous }
    }

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("provider.json");
        std::fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_to_mock_provider_and_cwd_store() {
        let _lock = env_lock();
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, None);
        let _g2 = set_env_guard(STORE_DIR_ENV_VAR, None);
        let _g3 = set_env_guard(SYSTEM_INSTRUCTIONS_ENV_VAR, Some("   "));

        let config = AgentConfig::from_env_in(Path::new("/work")).expect("config");

        assert_eq!(config.provider, ProviderKind::Mock);
        assert!(config.http.is_none());
        assert_eq!(config.store_dir, PathBuf::from("/work/.canvas-agent/store"));
        assert_eq!(config.settings.max_continuations, DEFAULT_MAX_CONTINUATIONS);
        assert_eq!(config.settings.system_instructions, None);
    }

    #[test]
    fn http_provider_requires_config_path() {
        let _lock = env_lock();
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, Some("http"));
        let _g2 = set_env_guard(CONFIG_PATH_ENV_VAR, None);

        let error = AgentConfig::from_env_in(Path::new("/work")).expect_err("missing path");
        assert!(matches!(error, ConfigError::MissingConfigPath { .. }));
    }

    #[test]
    fn http_provider_loads_file_config() {
        let _lock = env_lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(
            &dir,
            r#"{"endpoint": "http://127.0.0.1:9000", "models": ["draw-1"], "timeout_sec": 30}"#,
        );
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, Some(" HTTP "));
        let _g2 = set_env_guard(CONFIG_PATH_ENV_VAR, path.to_str());
        let _g3 = set_env_guard(STORE_DIR_ENV_VAR, Some("/tmp/canvas-store"));
        let _g4 = set_env_guard(SYSTEM_INSTRUCTIONS_ENV_VAR, Some("  Draw tidy diagrams. \n"));

        let config = AgentConfig::from_env_in(Path::new("/work")).expect("config");

        assert_eq!(config.provider, ProviderKind::Http);
        let http = config.http.expect("http config");
        assert_eq!(http.models, vec!["draw-1".to_string()]);
        assert_eq!(http.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/canvas-store"));
        assert_eq!(
            config.settings.system_instructions.as_deref(),
            Some("Draw tidy diagrams.")
        );
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let _lock = env_lock();
        let _g1 = set_env_guard(PROVIDER_ENV_VAR, Some("custom"));

        let error = AgentConfig::from_env_in(Path::new("/work")).expect_err("unknown");
        assert_eq!(
            error.to_string(),
            "unsupported provider 'custom'; available providers: mock, http"
        );
    }

    #[test]
    fn file_config_rejects_unknown_fields_and_bad_values() {
        let dir = tempfile::tempdir().expect("tempdir");

        let unknown = write_config(
            &dir,
            r#"{"endpoint": "http://x", "models": ["m"], "region": "eu"}"#,
        );
        assert!(matches!(
            load_http_config(&unknown),
            Err(ConfigError::Parse { .. })
        ));

        let blank_models = write_config(&dir, r#"{"endpoint": "http://x", "models": [" "]}"#);
        assert!(matches!(
            load_http_config(&blank_models),
            Err(ConfigError::Invalid { .. })
        ));

        let zero_timeout = write_config(
            &dir,
            r#"{"endpoint": "http://x", "models": ["m"], "timeout_sec": 0}"#,
        );
        assert!(matches!(
            load_http_config(&zero_timeout),
            Err(ConfigError::Invalid { .. })
        ));

        assert!(matches!(
            load_http_config(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
