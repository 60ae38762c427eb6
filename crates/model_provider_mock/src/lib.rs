//! Deterministic mock implementation of the shared `model_provider` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and orchestrator-level integration testing.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use model_provider::{CancelSignal, ModelProvider, ModelRequest, ProviderProfile, RunEvent};
use serde_json::Value;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// What the provider answers for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum MockTurn {
    /// Raw model text, streamed token by token.
    Text(Vec<String>),
    /// Pre-framed partial actions, as a transport would deliver them.
    Frames(Vec<Value>),
    /// The run fails after starting.
    Fail(String),
}

/// Deterministic mock provider used by `canvas_agent` tests and local runs.
///
/// Scripted turns are consumed one per run; once exhausted every further
/// run answers with the fallback turn.
#[derive(Debug)]
pub struct MockProvider {
    turns: Mutex<VecDeque<MockTurn>>,
    fallback: MockTurn,
    models: Vec<String>,
    token_delay: Duration,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockProvider {
    #[must_use]
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: MockTurn::Text(vec![r#"{"actions": []}"#.to_string()]),
            models: vec!["mock".to_string(), "mock-alt".to_string()],
            token_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Single text turn split into the given chunks.
    #[must_use]
    pub fn from_chunks(chunks: Vec<String>) -> Self {
        Self::new(vec![MockTurn::Text(chunks)])
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: MockTurn) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = sanitize_models(models);
        self
    }

    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    pub fn push_turn(&self, turn: MockTurn) {
        lock_unpoisoned(&self.turns).push_back(turn);
    }

    fn next_turn(&self) -> MockTurn {
        lock_unpoisoned(&self.turns)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for MockProvider {
    /// A small scripted drawing, streamed as raw text.
    fn default() -> Self {
        Self::from_chunks(vec![
            "```json\n{\"actions\": [".to_string(),
            "{\"_type\": \"think\", \"text\": \"A house needs walls and a roof.\"}, ".to_string(),
            "{\"_type\": \"create\", \"intent\": \"Walls\", \"shape\": {\"_type\": \"rectangle\", \"shapeId\": \"walls\", \"x\": 0, \"y\": 100, \"w\": 200, \"h\": 150, \"color\": \"blue\"}}, ".to_string(),
            "{\"_type\": \"create\", \"intent\": \"Roof\", \"shape\": {\"_type\": \"triangle\", \"shapeId\": \"roof\", \"x\": 0, \"y\": 0, \"w\": 200, \"h\": 100, \"color\": \"red\", \"fill\": \"solid\"}}, ".to_string(),
            "{\"_type\": \"message\", \"text\": \"I drew a house.\"}".to_string(),
            "]}\n```".to_string(),
        ])
        .with_token_delay(Duration::from_millis(20))
    }
}

impl ModelProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            models: self.models.clone(),
        }
    }

    fn run(
        &self,
        req: ModelRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;
        lock_unpoisoned(&self.requests).push(req);
        let cancelled = || cancel.load(Ordering::SeqCst);

        emit(RunEvent::Started { run_id });

        match self.next_turn() {
            MockTurn::Fail(error) => {
                emit(RunEvent::Failed { run_id, error });
                return Ok(());
            }
            MockTurn::Frames(frames) => {
                for action in frames {
                    if cancelled() {
                        emit(RunEvent::Cancelled { run_id });
                        return Ok(());
                    }
                    emit(RunEvent::Action { run_id, action });
                    self.pause();
                }
            }
            MockTurn::Text(chunks) => {
                for chunk in chunks {
                    let mut pending_token = String::new();
                    for ch in chunk.chars() {
                        pending_token.push(ch);
                        if matches!(ch, ' ' | '\n') {
                            if cancelled() {
                                emit(RunEvent::Cancelled { run_id });
                                return Ok(());
                            }
                            emit(RunEvent::Chunk {
                                run_id,
                                text: std::mem::take(&mut pending_token),
                            });
                            self.pause();
                        }
                    }

                    if !pending_token.is_empty() {
                        if cancelled() {
                            emit(RunEvent::Cancelled { run_id });
                            return Ok(());
                        }
                        emit(RunEvent::Chunk {
                            run_id,
                            text: pending_token,
                        });
                        self.pause();
                    }
                }
            }
        }

        if cancelled() {
            emit(RunEvent::Cancelled { run_id });
        } else {
            emit(RunEvent::Finished { run_id });
        }
        Ok(())
    }
}

fn sanitize_models(models: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = models
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();

    if sanitized.is_empty() {
        sanitized.push("mock".to_string());
    }

    sanitized
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
