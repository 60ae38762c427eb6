use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;

use crate::config::ModelApiConfig;
use crate::error::{parse_error_message, ModelApiError};
use crate::payload::{is_valid_data_url, ModelApiRequest, WireContent};
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::sse::{SseStreamParser, StreamFrame};
use crate::url::normalize_endpoint;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ModelApiClient {
    http: Client,
    config: ModelApiConfig,
    endpoint: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamResult {
    pub actions: Vec<Value>,
    /// Whether the stream ended with `data: [DONE]` rather than a bare EOF.
    pub saw_done: bool,
}

impl ModelApiClient {
    pub fn new(config: ModelApiConfig) -> Result<Self, ModelApiError> {
        let normalized = normalize_endpoint(&config.endpoint);
        let endpoint = Url::parse(&normalized)
            .map_err(|error| ModelApiError::InvalidEndpoint(format!("{normalized}: {error}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ModelApiError::InvalidEndpoint(normalized));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ModelApiError::from)?;
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    pub fn config(&self) -> &ModelApiConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ModelApiError> {
        let mut out = HeaderMap::new();
        out.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        if let Some(api_key) = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| ModelApiError::InvalidHeader("authorization".to_string()))?;
            out.insert(AUTHORIZATION, value);
        }

        if let Some(user_agent) = self.config.user_agent.as_deref() {
            let value = HeaderValue::from_str(user_agent)
                .map_err(|_| ModelApiError::InvalidHeader("user-agent".to_string()))?;
            out.insert(USER_AGENT, value);
        }

        for (key, value) in &self.config.extra_headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ModelApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(value)
                    .map_err(|_| ModelApiError::InvalidHeader(format!("invalid value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ModelApiRequest,
    ) -> Result<reqwest::RequestBuilder, ModelApiError> {
        validate_request_payload(request)?;

        let headers = self.build_headers()?;
        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&payload))
    }

    pub async fn send_with_retry(
        &self,
        request: &ModelApiRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ModelApiError> {
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if is_cancelled(cancellation) {
                return Err(ModelApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(ModelApiError::from);

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }

                    return Err(ModelApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < max_retries {
                        self.backoff(attempt, cancellation).await?;
                        continue;
                    }
                    return Err(ModelApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(ModelApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    async fn backoff(
        &self,
        attempt: u32,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(), ModelApiError> {
        let delay = retry_delay(self.config.retry_base_delay, attempt);
        await_or_cancel(tokio::time::sleep(delay), cancellation).await
    }

    /// Streams partial action values to `on_action` in arrival order.
    ///
    /// Returns whether `[DONE]` was seen. An `error` frame or an undecodable
    /// frame fails the stream.
    pub async fn stream_with_handler<F>(
        &self,
        request: &ModelApiRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_action: F,
    ) -> Result<bool, ModelApiError>
    where
        F: FnMut(Value),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ModelApiError::Cancelled);
            }
            let chunk = chunk.map_err(ModelApiError::from)?;
            for frame in parser.feed(&chunk) {
                process_frame(frame, &mut on_action)?;
            }
            if parser.is_done() {
                break;
            }
        }

        if is_cancelled(cancellation) {
            return Err(ModelApiError::Cancelled);
        }

        Ok(parser.is_done())
    }

    pub async fn stream(
        &self,
        request: &ModelApiRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ModelApiError> {
        let mut actions = Vec::new();
        let saw_done = self
            .stream_with_handler(request, cancellation, |action| actions.push(action))
            .await?;

        Ok(StreamResult { actions, saw_done })
    }
}

fn validate_request_payload(request: &ModelApiRequest) -> Result<(), ModelApiError> {
    if request.model.trim().is_empty() {
        return Err(ModelApiError::InvalidRequest("model must not be empty".to_string()));
    }
    if request.messages.is_empty() {
        return Err(ModelApiError::InvalidRequest(
            "at least one message is required".to_string(),
        ));
    }

    let bad_image = request
        .messages
        .iter()
        .flat_map(|message| &message.content)
        .find_map(|content| match content {
            WireContent::Image { image } if !is_valid_data_url(image) => Some(image),
            _ => None,
        });
    if let Some(image) = bad_image {
        let preview: String = image.chars().take(32).collect();
        return Err(ModelApiError::InvalidRequest(format!(
            "image must be a base64 data URL, got {preview}"
        )));
    }

    Ok(())
}

fn process_frame<F>(frame: StreamFrame, on_action: &mut F) -> Result<(), ModelApiError>
where
    F: FnMut(Value),
{
    match frame {
        StreamFrame::Action(action) => {
            on_action(action);
            Ok(())
        }
        StreamFrame::Done => Ok(()),
        StreamFrame::Malformed(payload) => Err(ModelApiError::MalformedFrame(payload)),
        StreamFrame::Error { code, message } => Err(ModelApiError::StreamFailed {
            message: message
                .or_else(|| code.clone())
                .unwrap_or_else(|| "model service reported an error".to_owned()),
            code,
        }),
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ModelApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ModelApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ModelApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
