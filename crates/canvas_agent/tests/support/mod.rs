#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};

use canvas_agent::agent::{Agent, HostOps};
use canvas_core::{ChatHistoryItem, MemoryCanvas, Shape};
use model_provider::{ContentPart, ModelMessage, RunId};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct StartedRun {
    pub run_id: RunId,
    pub model: String,
    pub system: String,
    pub messages: Vec<ModelMessage>,
}

impl StartedRun {
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .flat_map(|message| message.content.iter())
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Records every host call instead of running anything.
#[derive(Debug, Default)]
pub struct HostSpy {
    next_run_id: RunId,
    pub started: Vec<StartedRun>,
    pub cancelled: Vec<RunId>,
    pub renders: usize,
    pub fail_next_start: Option<String>,
}

impl HostSpy {
    pub fn last_run_id(&self) -> RunId {
        self.started.last().map(|run| run.run_id).unwrap_or_default()
    }
}

impl HostOps for HostSpy {
    fn start_run(
        &mut self,
        model: String,
        system: String,
        messages: Vec<ModelMessage>,
    ) -> Result<RunId, String> {
        if let Some(error) = self.fail_next_start.take() {
            return Err(error);
        }

        self.next_run_id += 1;
        self.started.push(StartedRun {
            run_id: self.next_run_id,
            model,
            system,
            messages,
        });
        Ok(self.next_run_id)
    }

    fn cancel_run(&mut self, run_id: RunId) {
        self.cancelled.push(run_id);
    }

    fn request_render(&mut self) {
        self.renders += 1;
    }
}

pub fn new_agent() -> Agent {
    Agent::new(MemoryCanvas::new(), vec!["mock".to_string(), "mock-alt".to_string()])
        .with_clock(|| None)
}

/// `value` with `complete` set, as the transport frames it.
pub fn frame(value: Value, complete: bool) -> Value {
    let mut fields = match value {
        Value::Object(fields) => fields,
        other => panic!("frame must be an object, got {other}"),
    };
    fields.insert("complete".to_string(), Value::Bool(complete));
    Value::Object(fields)
}

pub fn complete(value: Value) -> Value {
    frame(value, true)
}

pub fn partial(value: Value) -> Value {
    frame(value, false)
}

/// Raw model text for a full response.
pub fn response_text(actions: &[Value]) -> String {
    let mut document = Map::new();
    document.insert("actions".to_string(), Value::Array(actions.to_vec()));
    Value::Object(document).to_string()
}

/// Feeds pre-framed actions for `run_id` and finishes the run.
pub fn stream_frames(agent: &mut Agent, host: &mut HostSpy, run_id: RunId, frames: Vec<Value>) {
    agent.on_run_started(run_id);
    for frame in frames {
        agent.on_run_action(run_id, frame, host);
    }
    agent.on_run_finished(run_id, host);
}

pub fn shapes(agent: &Agent) -> Vec<Shape> {
    agent.canvas().page_shapes().into_iter().cloned().collect()
}

pub fn action_kinds(agent: &Agent) -> Vec<String> {
    agent
        .history()
        .get()
        .iter()
        .filter_map(|item| match item {
            ChatHistoryItem::Action { action, .. } => action.kind().map(str::to_string),
            _ => None,
        })
        .collect()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
