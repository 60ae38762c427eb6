//! HTTP-backed implementation of the shared `model_provider` contract.
//!
//! This adapter drives `model_api` on a private current-thread runtime and
//! forwards each decoded frame as a `RunEvent::Action` the moment it arrives.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use model_api::{
    ModelApiClient, ModelApiConfig, ModelApiError, ModelApiRequest, WireContent, WireMessage,
};
use model_provider::{
    CancelSignal, ContentPart, ModelProvider, ModelRequest, ProviderInitError, ProviderProfile,
    RunEvent,
};
use serde_json::Value;

/// Stable provider identifier used for explicit startup selection.
pub const HTTP_PROVIDER_ID: &str = "http";

const DEFAULT_MODEL: &str = "canvas-default";

/// Runtime configuration for the HTTP provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProviderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model_ids: Vec<String>,
    pub timeout: Option<Duration>,
}

impl HttpProviderConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model_ids: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model_ids,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_api_config(self) -> ModelApiConfig {
        let mut config = ModelApiConfig::new(self.endpoint);

        if let Some(api_key) = self.api_key {
            config = config.with_api_key(api_key);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    /// Streams frames into `on_action`; returns whether `[DONE]` was seen.
    fn stream(
        &self,
        request: &ModelApiRequest,
        cancel: &CancelSignal,
        on_action: &mut dyn FnMut(Value),
    ) -> Result<bool, ModelApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ModelApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &ModelApiRequest,
        cancel: &CancelSignal,
        on_action: &mut dyn FnMut(Value),
    ) -> Result<bool, ModelApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| ModelApiError::StreamFailed {
                code: None,
                message: format!("failed to initialize tokio runtime: {error}"),
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |action| on_action(action)),
        )
    }
}

/// `ModelProvider` adapter backed by `model_api` transport primitives.
pub struct HttpProvider {
    model_ids: Vec<String>,
    stream_client: Arc<dyn StreamClient>,
}

impl HttpProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderInitError> {
        let model_ids = sanitize_model_ids(config.model_ids.clone());
        let stream_client = Arc::new(DefaultStreamClient {
            client: ModelApiClient::new(config.into_api_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model_ids,
            stream_client,
        })
    }

    fn resolve_model(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.is_empty() {
            self.model_ids[0].clone()
        } else {
            requested.to_string()
        }
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model_ids: Vec<String>,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model_ids: sanitize_model_ids(model_ids),
            stream_client,
        }
    }
}

impl ModelProvider for HttpProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: HTTP_PROVIDER_ID.to_string(),
            models: self.model_ids.clone(),
        }
    }

    fn run(
        &self,
        req: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });

        if cancel.load(Ordering::Acquire) {
            emit(RunEvent::Cancelled { run_id });
            return Ok(());
        }

        let request = to_wire_request(self.resolve_model(&req.model), req);
        let outcome = self.stream_client.stream(&request, &cancel, &mut |action| {
            emit(RunEvent::Action { run_id, action });
        });

        match outcome {
            Ok(true) => emit(RunEvent::Finished { run_id }),
            Ok(false) => emit(RunEvent::Failed {
                run_id,
                error: "model stream ended before [DONE]".to_string(),
            }),
            Err(ModelApiError::Cancelled) => emit(RunEvent::Cancelled { run_id }),
            Err(error) => emit(RunEvent::Failed {
                run_id,
                error: format!("model request failed: {error}"),
            }),
        }

        Ok(())
    }
}

fn to_wire_request(model: String, req: ModelRequest) -> ModelApiRequest {
    let messages = req
        .messages
        .into_iter()
        .map(|message| WireMessage {
            role: message.role.as_str().to_string(),
            content: message
                .content
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text { text } => WireContent::Text { text },
                    ContentPart::Image { url } => WireContent::Image { image: url },
                })
                .collect(),
        })
        .collect();

    ModelApiRequest {
        model,
        system: req.system,
        messages,
        stream: true,
    }
}

fn sanitize_model_ids(model_ids: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = model_ids
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if sanitized.is_empty() {
        sanitized.push(DEFAULT_MODEL.to_string());
    }

    sanitized
}

fn map_init_error(error: ModelApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize http provider: {error}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, MutexGuard};

    use model_provider::{ModelMessage, Role};
    use serde_json::json;

    use super::*;

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    enum FakeStreamOutcome {
        Success { frames: Vec<Value>, saw_done: bool },
        Error(ModelApiError),
    }

    struct FakeStreamClient {
        observed: Mutex<Option<ModelApiRequest>>,
        outcome: Mutex<Option<FakeStreamOutcome>>,
    }

    impl FakeStreamClient {
        fn success(frames: Vec<Value>, saw_done: bool) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Success { frames, saw_done })),
            })
        }

        fn failure(error: ModelApiError) -> Arc<Self> {
            Arc::new(Self {
                observed: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Error(error))),
            })
        }

        fn observed(&self) -> Option<ModelApiRequest> {
            lock_unpoisoned(&self.observed).clone()
        }
    }

    impl StreamClient for FakeStreamClient {
        fn stream(
            &self,
            request: &ModelApiRequest,
            _cancel: &CancelSignal,
            on_action: &mut dyn FnMut(Value),
        ) -> Result<bool, ModelApiError> {
            *lock_unpoisoned(&self.observed) = Some(request.clone());

            match lock_unpoisoned(&self.outcome).take() {
                Some(FakeStreamOutcome::Success { frames, saw_done }) => {
                    frames.into_iter().for_each(|frame| on_action(frame));
                    Ok(saw_done)
                }
                Some(FakeStreamOutcome::Error(error)) => Err(error),
                None => panic!("fake stream outcome should be consumed exactly once"),
            }
        }
    }

    fn run_events(provider: &HttpProvider, model: &str) -> Vec<RunEvent> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut events = Vec::new();

        provider
            .run(
                ModelRequest {
                    run_id: 9,
                    model: model.to_string(),
                    system: "system".to_string(),
                    messages: vec![ModelMessage {
                        role: Role::User,
                        content: vec![
                            ContentPart::Text {
                                text: "hello".to_string(),
                            },
                            ContentPart::Image {
                                url: "data:image/png;base64,AAAA".to_string(),
                            },
                        ],
                    }],
                },
                cancel,
                &mut |event| events.push(event),
            )
            .expect("run should not return provider-level failure");

        events
    }

    #[test]
    fn profile_reports_http_provider_id_and_models() {
        let stream = FakeStreamClient::success(Vec::new(), true);
        let provider = HttpProvider::with_stream_client_for_tests(
            vec!["fast".to_string(), " smart ".to_string()],
            stream,
        );

        let profile = provider.profile();
        assert_eq!(profile.provider_id, HTTP_PROVIDER_ID);
        assert_eq!(profile.models, vec!["fast", "smart"]);
    }

    #[test]
    fn run_forwards_frames_as_actions_and_done_as_finished() {
        let stream = FakeStreamClient::success(
            vec![
                json!({"_type": "think", "text": "a", "complete": false, "time": 1}),
                json!({"_type": "think", "text": "ab", "complete": true, "time": 2}),
            ],
            true,
        );
        let provider = HttpProvider::with_stream_client_for_tests(
            vec!["fast".to_string()],
            Arc::clone(&stream) as Arc<dyn StreamClient>,
        );

        let events = run_events(&provider, "smart");

        let observed = stream.observed().expect("request observed");
        assert_eq!(observed.model, "smart");
        assert_eq!(observed.messages[0].role, "user");
        assert_eq!(
            observed.messages[0].content[1],
            WireContent::Image {
                image: "data:image/png;base64,AAAA".to_string()
            }
        );

        assert!(matches!(events.first(), Some(RunEvent::Started { run_id: 9 })));
        let actions = events
            .iter()
            .filter(|event| matches!(event, RunEvent::Action { .. }))
            .count();
        assert_eq!(actions, 2);
        assert!(matches!(events.last(), Some(RunEvent::Finished { run_id: 9 })));
    }

    #[test]
    fn blank_model_falls_back_to_first_configured() {
        let stream = FakeStreamClient::success(Vec::new(), true);
        let provider = HttpProvider::with_stream_client_for_tests(
            Vec::new(),
            Arc::clone(&stream) as Arc<dyn StreamClient>,
        );

        run_events(&provider, "  ");
        assert_eq!(
            stream.observed().map(|request| request.model).as_deref(),
            Some(DEFAULT_MODEL)
        );
    }

    #[test]
    fn run_maps_missing_done_to_failed_event() {
        let stream = FakeStreamClient::success(Vec::new(), false);
        let provider = HttpProvider::with_stream_client_for_tests(vec!["fast".to_string()], stream);

        let events = run_events(&provider, "fast");

        assert!(matches!(
            events.last(),
            Some(RunEvent::Failed { run_id: 9, error }) if error.contains("[DONE]")
        ));
    }

    #[test]
    fn run_maps_cancelled_transport_to_cancelled_terminal_event() {
        let stream = FakeStreamClient::failure(ModelApiError::Cancelled);
        let provider = HttpProvider::with_stream_client_for_tests(vec!["fast".to_string()], stream);

        let events = run_events(&provider, "fast");

        assert!(matches!(events.first(), Some(RunEvent::Started { run_id: 9 })));
        assert!(matches!(events.last(), Some(RunEvent::Cancelled { run_id: 9 })));
    }

    #[test]
    fn run_maps_transport_error_to_failed_terminal_event() {
        let stream = FakeStreamClient::failure(ModelApiError::MalformedFrame("{oops".to_string()));
        let provider = HttpProvider::with_stream_client_for_tests(vec!["fast".to_string()], stream);

        let events = run_events(&provider, "fast");

        assert!(matches!(
            events.last(),
            Some(RunEvent::Failed { run_id: 9, error }) if error.contains("{oops")
        ));
    }
}
