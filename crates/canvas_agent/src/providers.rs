use std::sync::Arc;

use model_provider::{ModelProvider, ProviderInitError};
use model_provider_http::{HttpProvider, HttpProviderConfig};
use model_provider_mock::MockProvider;

use crate::config::{AgentConfig, HttpFileConfig, ProviderKind};

pub fn provider_from_config(config: &AgentConfig) -> Result<Arc<dyn ModelProvider>, ProviderInitError> {
    match config.provider {
        ProviderKind::Mock => Ok(Arc::new(MockProvider::default())),
        ProviderKind::Http => {
            let file = config.http.as_ref().ok_or_else(|| {
                ProviderInitError::new("http provider selected without a config file")
            })?;
            Ok(Arc::new(HttpProvider::new(http_provider_config(file))?))
        }
    }
}

fn http_provider_config(file: &HttpFileConfig) -> HttpProviderConfig {
    let models = file
        .models
        .iter()
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty())
        .collect();
    let mut config = HttpProviderConfig::new(file.endpoint.trim(), models);
    if let Some(api_key) = file.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
        config = config.with_api_key(api_key.trim());
    }
    if let Some(timeout) = file.timeout() {
        config = config.with_timeout(timeout);
    }
    config
}
