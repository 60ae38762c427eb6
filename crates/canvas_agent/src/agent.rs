//! Agent orchestrator: owns the conversation state and drives one streamed
//! turn at a time against a canvas.
//!
//! The orchestrator never talks to a model directly. It asks a [`HostOps`]
//! implementation to start or cancel runs and is fed the resulting run events
//! through the `on_run_*` methods. Every partial action applies as a
//! speculative preview that is reverted before the next frame lands, so the
//! canvas only ever shows one interpretation of the action being streamed.

use std::mem;

use canvas_core::canvas::ReverseReport;
use canvas_core::{
    capture, Acceptance, ActionFailure, ActionStreamer, BoxModel, Canvas, CanvasError,
    CaptureOptions, ChatHistoryItem, ContextItem, ContextItems, Diff, ExecutionContext, MarkId,
    PlacementSolver, Prompt, PromptBuilder, PromptContent, PromptInput, RecordedEffects, Request,
    RequestSource, Sanitizer, ScheduledRequest, StreamingAction, TodoList, Vec2,
};
use model_provider::{ContentPart, ModelMessage, Role, RunId};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::atom::Atom;
use crate::config::AgentSettings;
use crate::persist::{Persistence, CONTEXT_KEY, HISTORY_KEY, MODEL_KEY, ORIGIN_KEY, TODOS_KEY};

pub const FALLBACK_MODEL: &str = "default";

/// Follow-up message used when a turn ends with unfinished todo items.
pub const TODO_FOLLOW_UP: &str =
    "Continue with the todo list. Work on the items that are not done yet.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Requesting { run_id: RunId },
    Error(String),
}

/// Side effects the orchestrator needs from whoever runs the model.
pub trait HostOps {
    fn start_run(
        &mut self,
        model: String,
        system: String,
        messages: Vec<ModelMessage>,
    ) -> Result<RunId, String>;
    fn cancel_run(&mut self, run_id: RunId);
    fn request_render(&mut self);
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("failed to start run: {0}")]
    StartFailed(String),
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("no history item at index {0}")]
    NoHistoryItem(usize),
    #[error("history item {0} is not an action")]
    NotAnAction(usize),
    #[error("a turn is in progress")]
    Busy,
    #[error("batch action {index} failed: {failure}")]
    BatchFailed { index: usize, failure: ActionFailure },
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// State of the turn whose stream is currently open.
struct Turn {
    run_id: RunId,
    source: RequestSource,
    sanitizer: Sanitizer,
    streamer: ActionStreamer,
    /// Speculative diff currently on the canvas.
    preview: Option<Diff>,
}

pub struct Agent {
    canvas: Box<dyn Canvas + Send>,
    settings: AgentSettings,
    prompt_builder: PromptBuilder,
    mode: Atom<Mode>,
    history: Atom<Vec<ChatHistoryItem>>,
    todos: Atom<TodoList>,
    context: Atom<ContextItems>,
    model: Atom<String>,
    origin: Atom<Option<Vec2>>,
    models: Vec<String>,
    scheduled: Option<ScheduledRequest>,
    agent_viewport: BoxModel,
    solver: PlacementSolver,
    turn: Option<Turn>,
    turn_mark: Option<MarkId>,
    continuations: u32,
    screenshot: Option<String>,
    persistence: Option<Persistence>,
    clock: fn() -> Option<String>,
}

impl Agent {
    /// `models` is the selectable list, preferred first.
    pub fn new(canvas: impl Canvas + Send + 'static, models: Vec<String>) -> Self {
        let models = sanitize_models(models);
        let agent_viewport = canvas.viewport();
        let settings = AgentSettings::default();
        Self {
            canvas: Box::new(canvas),
            prompt_builder: PromptBuilder::default(),
            solver: PlacementSolver::new(settings.placement),
            settings,
            mode: Atom::new(Mode::Idle),
            history: Atom::default(),
            todos: Atom::default(),
            context: Atom::default(),
            model: Atom::new(models[0].clone()),
            origin: Atom::new(None),
            models,
            scheduled: None,
            agent_viewport,
            turn: None,
            turn_mark: None,
            continuations: 0,
            screenshot: None,
            persistence: None,
            clock: current_time,
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.prompt_builder =
            PromptBuilder::default().with_base_instructions(settings.system_instructions.clone());
        self.solver = PlacementSolver::new(settings.placement);
        self.settings = settings;
        self
    }

    /// Attaches a store and restores whatever it holds for the session.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        let restored = persistence.restore();
        if let Some(history) = restored.history {
            self.history.set(history);
        }
        if let Some(todos) = restored.todos {
            self.todos.set(todos);
        }
        if let Some(context) = restored.context {
            self.context.set(context);
        }
        if restored.origin.is_some() {
            self.origin.set(restored.origin);
        }
        if let Some(model) = restored.model {
            if self.models.contains(&model) {
                self.model.set(model);
            } else {
                warn!(model = %model, "stored model is no longer available");
            }
        }
        info!(
            session = persistence.session(),
            history = self.history.get().len(),
            "restored agent session"
        );
        self.persistence = Some(persistence);
        self
    }

    /// Replaces the wall-clock label given to the prompt.
    pub fn with_clock(mut self, clock: fn() -> Option<String>) -> Self {
        self.clock = clock;
        self
    }

    pub fn canvas(&self) -> &dyn Canvas {
        self.canvas.as_ref()
    }

    /// Edits made through this handle are logged as user edits.
    pub fn canvas_mut(&mut self) -> &mut dyn Canvas {
        self.canvas.as_mut()
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn mode(&self) -> &Atom<Mode> {
        &self.mode
    }

    pub fn history(&self) -> &Atom<Vec<ChatHistoryItem>> {
        &self.history
    }

    pub fn todos(&self) -> &Atom<TodoList> {
        &self.todos
    }

    pub fn context_items(&self) -> &Atom<ContextItems> {
        &self.context
    }

    pub fn model(&self) -> &Atom<String> {
        &self.model
    }

    pub fn origin(&self) -> &Atom<Option<Vec2>> {
        &self.origin
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn scheduled_request(&self) -> Option<&ScheduledRequest> {
        self.scheduled.as_ref()
    }

    pub fn agent_viewport(&self) -> BoxModel {
        self.agent_viewport
    }

    /// Automatic follow-ups issued since the last user prompt.
    pub fn continuations(&self) -> u32 {
        self.continuations
    }

    pub fn active_run_id(&self) -> Option<RunId> {
        self.turn.as_ref().map(|turn| turn.run_id)
    }

    /// Undo mark taken when the latest turn started. Bailing to it reverts
    /// every recorded change since, including a streamed `clear`.
    pub fn turn_mark(&self) -> Option<&MarkId> {
        self.turn_mark.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.turn.is_none()
    }

    /// Screenshot attached to the next user prompt, as a data URL.
    pub fn set_screenshot(&mut self, url: Option<String>) {
        self.screenshot = url;
    }

    pub fn set_model(&mut self, model: &str) -> Result<(), AgentError> {
        if !self.models.iter().any(|candidate| candidate == model) {
            return Err(AgentError::UnknownModel(model.to_string()));
        }
        self.model.set(model.to_string());
        self.persist(MODEL_KEY, self.model.get());
        Ok(())
    }

    /// Selects the next model in the list, wrapping around.
    pub fn cycle_model(&mut self) -> &str {
        let current = self
            .models
            .iter()
            .position(|model| model == self.model.get())
            .unwrap_or(0);
        let next = self.models[(current + 1) % self.models.len()].clone();
        self.model.set(next);
        self.persist(MODEL_KEY, self.model.get());
        self.model.get()
    }

    /// Returns false when an equivalent item is already attached.
    pub fn add_context_item(&mut self, item: ContextItem) -> bool {
        let added = self.context.update(|items| items.insert(item));
        if added {
            self.persist(CONTEXT_KEY, self.context.get());
        }
        added
    }

    pub fn remove_context_item(&mut self, item: &ContextItem) -> bool {
        let removed = self.context.update(|items| items.remove(item));
        if removed {
            self.persist(CONTEXT_KEY, self.context.get());
        }
        removed
    }

    /// Starts a user turn, cancelling any turn still streaming.
    pub fn prompt(&mut self, message: &str, host: &mut dyn HostOps) -> Result<RunId, AgentError> {
        let message = message.trim();
        if message.is_empty() {
            host.request_render();
            return Err(AgentError::EmptyPrompt);
        }

        self.cancel(host);
        self.continuations = 0;
        self.scheduled = None;

        let user_viewport = self.canvas.viewport();
        if self.origin.get().is_none() {
            self.origin.set(Some(whole_units(user_viewport.origin())));
            self.persist(ORIGIN_KEY, self.origin.get());
        }

        let context = self.context.update(mem::take);
        self.persist(CONTEXT_KEY, self.context.get());
        let selection = self.canvas.selection();

        let mut request = Request::new(message, user_viewport, self.model.get().clone())
            .with_context(context.items().iter().cloned())
            .with_selection(selection.clone());
        request.image = self.screenshot.take();

        let entry = ChatHistoryItem::Prompt {
            message: message.to_string(),
            context_items: context.items().to_vec(),
            selected_shapes: selection,
        };
        self.start_turn(request, entry, host)
    }

    /// Aborts the open stream and drops its preview. Returns false when no
    /// turn was running.
    pub fn cancel(&mut self, host: &mut dyn HostOps) -> bool {
        let Some(mut turn) = self.turn.take() else {
            return false;
        };

        self.revert_preview(&mut turn);
        self.scheduled = None;
        self.mode.set(Mode::Idle);
        info!(run_id = turn.run_id, "turn cancelled");
        host.cancel_run(turn.run_id);
        host.request_render();
        true
    }

    /// Clears the conversation: history, todos, context items, the queued
    /// follow-up and the chat origin.
    pub fn reset(&mut self, host: &mut dyn HostOps) {
        self.cancel(host);
        self.history.set(Vec::new());
        self.todos.set(TodoList::default());
        self.context.set(ContextItems::new());
        self.origin.set(None);
        self.scheduled = None;
        self.continuations = 0;
        self.solver.reset();
        self.persist(HISTORY_KEY, self.history.get());
        self.persist(TODOS_KEY, self.todos.get());
        self.persist(CONTEXT_KEY, self.context.get());
        self.persist(ORIGIN_KEY, self.origin.get());
        if matches!(self.mode.get(), Mode::Error(_)) {
            self.mode.set(Mode::Idle);
        }
        host.request_render();
    }

    pub fn accept(&mut self, index: usize) -> Result<(), AgentError> {
        self.action_diff(index)?;
        self.set_acceptance(index, Acceptance::Accepted);
        Ok(())
    }

    /// Reverses the action's diff on the canvas. Shapes edited since by
    /// someone else are left alone and reported as skipped.
    pub fn reject(&mut self, index: usize) -> Result<ReverseReport, AgentError> {
        let (diff, acceptance) = self.action_diff(index)?;
        if acceptance == Acceptance::Rejected {
            return Ok(ReverseReport::default());
        }

        let report = self.canvas.reverse_diff(&diff);
        debug!(
            index,
            reverted = report.reverted,
            skipped = report.skipped.len(),
            "rejected action"
        );
        self.set_acceptance(index, Acceptance::Rejected);
        Ok(report)
    }

    /// Applies complete actions as one unit. On the first failure every
    /// change the batch made is rolled back and nothing is recorded.
    pub fn apply_actions(&mut self, actions: Vec<StreamingAction>) -> Result<usize, AgentError> {
        if self.turn.is_some() {
            return Err(AgentError::Busy);
        }

        let mut sanitizer = Sanitizer::new(self.chat_origin());
        let solver_before = self.solver.clone();
        let mut effects = self.seeded_effects();
        let mut entries = Vec::new();
        let mut applied = 0usize;
        let mark = self.canvas.mark("agent-batch");

        for (index, mut frame) in actions.into_iter().enumerate() {
            frame.complete = true;
            let solver = &mut self.solver;
            let (result, diff) =
                capture(self.canvas.as_mut(), CaptureOptions::RECORDED, |canvas| {
                    ExecutionContext::new(canvas, &mut sanitizer, solver, &mut effects)
                        .execute(&frame)
                });

            match result {
                Ok(Some(action)) => {
                    applied += 1;
                    if action.saves_to_history() {
                        entries.push(ChatHistoryItem::Action {
                            info: action.info(),
                            action: frame,
                            diff,
                            acceptance: Acceptance::Pending,
                        });
                    }
                }
                Ok(None) => {}
                Err(failure) => {
                    self.canvas.bail_to_mark(&mark)?;
                    self.solver = solver_before;
                    warn!(index, %failure, "batch rolled back");
                    return Err(AgentError::BatchFailed { index, failure });
                }
            }
        }

        self.fold_effects(effects);
        if !entries.is_empty() {
            self.history.update(|items| items.extend(entries));
            self.persist(HISTORY_KEY, self.history.get());
        }
        Ok(applied)
    }

    pub fn on_run_started(&mut self, run_id: RunId) {
        if self.is_active_run(run_id) {
            debug!(run_id, "stream opened");
        }
    }

    /// Raw model text; decoded incrementally into partial actions.
    pub fn on_run_chunk(&mut self, run_id: RunId, text: &str, host: &mut dyn HostOps) {
        let Some(mut turn) = self.take_turn(run_id) else {
            return;
        };

        for frame in turn.streamer.push(text) {
            self.apply_frame(&mut turn, frame);
        }
        self.turn = Some(turn);
        host.request_render();
    }

    /// A partial action already framed by the transport.
    pub fn on_run_action(&mut self, run_id: RunId, action: Value, host: &mut dyn HostOps) {
        let Some(mut turn) = self.take_turn(run_id) else {
            return;
        };

        match StreamingAction::from_value(action) {
            Some(frame) => self.apply_frame(&mut turn, frame),
            None => debug!(run_id, "ignoring frame without an action type"),
        }
        self.turn = Some(turn);
        host.request_render();
    }

    pub fn on_run_finished(&mut self, run_id: RunId, host: &mut dyn HostOps) {
        let Some(mut turn) = self.take_turn(run_id) else {
            return;
        };

        for frame in turn.streamer.finish() {
            self.apply_frame(&mut turn, frame);
        }
        self.revert_preview(&mut turn);
        info!(run_id, source = ?turn.source, "turn finished");
        self.mode.set(Mode::Idle);

        self.continue_if_needed(host);
        host.request_render();
    }

    pub fn on_run_failed(&mut self, run_id: RunId, error: &str, host: &mut dyn HostOps) {
        let Some(mut turn) = self.take_turn(run_id) else {
            return;
        };

        self.revert_preview(&mut turn);
        self.scheduled = None;
        warn!(run_id, error, "turn failed");
        self.mode.set(Mode::Error(error.to_string()));
        host.request_render();
    }

    /// The provider stopped on its own; treated like a user cancel.
    pub fn on_run_cancelled(&mut self, run_id: RunId, host: &mut dyn HostOps) {
        let Some(mut turn) = self.take_turn(run_id) else {
            return;
        };

        self.revert_preview(&mut turn);
        self.scheduled = None;
        info!(run_id, "turn cancelled by provider");
        self.mode.set(Mode::Idle);
        host.request_render();
    }

    fn start_turn(
        &mut self,
        request: Request,
        entry: ChatHistoryItem,
        host: &mut dyn HostOps,
    ) -> Result<RunId, AgentError> {
        self.agent_viewport = request.bounds;
        let mut sanitizer = Sanitizer::new(self.chat_origin());
        let user_edits = self.canvas.take_user_changes();
        let prompt = self.prompt_builder.build(
            &PromptInput {
                request: &request,
                canvas: self.canvas.as_ref(),
                history: self.history.get(),
                todos: self.todos.get(),
                user_viewport: self.canvas.viewport(),
                user_edits: &user_edits,
                time: (self.clock)(),
            },
            &mut sanitizer,
        );
        self.push_history(entry);

        let Prompt { system, content } = prompt;
        let message = ModelMessage {
            role: Role::User,
            content: content.into_iter().map(content_part).collect(),
        };

        match host.start_run(request.model.clone(), system, vec![message]) {
            Ok(run_id) => {
                info!(run_id, source = ?request.source, model = %request.model, "turn started");
                self.turn_mark = Some(self.canvas.mark("agent-turn"));
                self.turn = Some(Turn {
                    run_id,
                    source: request.source,
                    sanitizer,
                    streamer: ActionStreamer::new(),
                    preview: None,
                });
                self.mode.set(Mode::Requesting { run_id });
                host.request_render();
                Ok(run_id)
            }
            Err(error) => {
                warn!(%error, "failed to start turn");
                self.mode.set(Mode::Error(error.clone()));
                host.request_render();
                Err(AgentError::StartFailed(error))
            }
        }
    }

    /// Queued follow-ups win over the todo list; both count toward the cap.
    fn continue_if_needed(&mut self, host: &mut dyn HostOps) {
        let model = self.model.get().clone();
        let request = match self.scheduled.take() {
            Some(scheduled) => scheduled.into_request(self.agent_viewport, model),
            None if self.todos.get().remaining() > 0 => {
                let mut request = Request::new(TODO_FOLLOW_UP, self.agent_viewport, model);
                request.source = RequestSource::Agent;
                request
            }
            None => return,
        };

        if self.continuations >= self.settings.max_continuations {
            warn!(
                limit = self.settings.max_continuations,
                "continuation limit reached; waiting for user input"
            );
            return;
        }

        self.continuations += 1;
        let entry = ChatHistoryItem::Continuation {
            message: request.message(),
        };
        // start_turn records the failure in `mode`.
        let _ = self.start_turn(request, entry, host);
    }

    fn apply_frame(&mut self, turn: &mut Turn, frame: StreamingAction) {
        self.revert_preview(turn);
        if frame.complete {
            self.commit_frame(turn, frame);
        } else {
            self.preview_frame(turn, frame);
        }
    }

    fn commit_frame(&mut self, turn: &mut Turn, frame: StreamingAction) {
        let mut effects = self.seeded_effects();
        let sanitizer = &mut turn.sanitizer;
        let solver = &mut self.solver;
        let (result, diff) = capture(self.canvas.as_mut(), CaptureOptions::EPHEMERAL, |canvas| {
            ExecutionContext::new(canvas, sanitizer, solver, &mut effects).execute(&frame)
        });
        if result.is_ok() {
            self.canvas.record_undo(diff.clone());
        }

        match result {
            Ok(Some(action)) => {
                debug!(
                    run_id = turn.run_id,
                    action = action.kind().as_str(),
                    "applied action"
                );
                self.fold_effects(effects);
                if action.saves_to_history() {
                    self.push_history(ChatHistoryItem::Action {
                        info: action.info(),
                        action: frame,
                        diff,
                        acceptance: Acceptance::Pending,
                    });
                }
            }
            Ok(None) => {}
            Err(failure) => {
                if !diff.is_empty() {
                    self.canvas.reverse_diff(&diff);
                }
                warn!(
                    run_id = turn.run_id,
                    action = frame.kind().unwrap_or("unknown"),
                    %failure,
                    "rejected action"
                );
            }
        }
    }

    /// Applies an incomplete frame against scratch copies of the turn state,
    /// so nothing but the canvas preview survives it.
    fn preview_frame(&mut self, turn: &mut Turn, frame: StreamingAction) {
        let mut sanitizer = turn.sanitizer.clone();
        let mut solver = self.solver.clone();
        let mut effects = self.seeded_effects();
        let (result, diff) = capture(self.canvas.as_mut(), CaptureOptions::EPHEMERAL, |canvas| {
            ExecutionContext::new(canvas, &mut sanitizer, &mut solver, &mut effects)
                .execute(&frame)
        });

        match result {
            Ok(_) if diff.is_empty() => {}
            Ok(_) => turn.preview = Some(diff),
            Err(failure) => {
                if !diff.is_empty() {
                    self.canvas.reverse_diff(&diff);
                }
                debug!(run_id = turn.run_id, %failure, "preview not applicable yet");
            }
        }
    }

    fn revert_preview(&mut self, turn: &mut Turn) {
        if let Some(preview) = turn.preview.take() {
            let report = self.canvas.reverse_diff(&preview);
            debug!(
                run_id = turn.run_id,
                reverted = report.reverted,
                skipped = report.skipped.len(),
                "reverted preview"
            );
        }
    }

    fn seeded_effects(&self) -> RecordedEffects {
        RecordedEffects {
            scheduled: None,
            todos: self.todos.get().items().to_vec(),
            viewport: self.agent_viewport,
        }
    }

    fn fold_effects(&mut self, effects: RecordedEffects) {
        let RecordedEffects {
            scheduled,
            todos,
            viewport,
        } = effects;

        if let Some(request) = scheduled {
            match self.scheduled.as_mut() {
                Some(existing) => existing.merge(request),
                None => self.scheduled = Some(request),
            }
        }

        if todos.as_slice() != self.todos.get().items() {
            self.todos.update(|list| {
                for item in todos {
                    list.upsert(item);
                }
            });
            self.persist(TODOS_KEY, self.todos.get());
        }

        self.agent_viewport = viewport;
    }

    fn action_diff(&self, index: usize) -> Result<(Diff, Acceptance), AgentError> {
        match self.history.get().get(index) {
            Some(ChatHistoryItem::Action {
                diff, acceptance, ..
            }) => Ok((diff.clone(), *acceptance)),
            Some(_) => Err(AgentError::NotAnAction(index)),
            None => Err(AgentError::NoHistoryItem(index)),
        }
    }

    fn set_acceptance(&mut self, index: usize, value: Acceptance) {
        self.history.update(|items| {
            if let Some(ChatHistoryItem::Action { acceptance, .. }) = items.get_mut(index) {
                *acceptance = value;
            }
        });
        self.persist(HISTORY_KEY, self.history.get());
    }

    fn push_history(&mut self, entry: ChatHistoryItem) {
        self.history.update(|items| items.push(entry));
        self.persist(HISTORY_KEY, self.history.get());
    }

    fn chat_origin(&self) -> Vec2 {
        self.origin
            .get()
            .unwrap_or_else(|| whole_units(self.canvas.viewport().origin()))
    }

    fn is_active_run(&self, run_id: RunId) -> bool {
        self.active_run_id() == Some(run_id)
    }

    /// Takes the turn out of `self` when `run_id` is the open stream.
    fn take_turn(&mut self, run_id: RunId) -> Option<Turn> {
        if self.is_active_run(run_id) {
            self.turn.take()
        } else {
            None
        }
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) {
        if let Some(persistence) = &self.persistence {
            persistence.save(key, value);
        }
    }
}

/// Integer origins keep the page/chat-origin translation exact.
fn whole_units(point: Vec2) -> Vec2 {
    Vec2::new(point.x.round(), point.y.round())
}

fn content_part(content: PromptContent) -> ContentPart {
    match content {
        PromptContent::Text { text } => ContentPart::Text { text },
        PromptContent::Image { url } => ContentPart::Image { url },
    }
}

fn sanitize_models(models: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = Vec::new();
    for model in models {
        let model = model.trim();
        if !model.is_empty() && !sanitized.iter().any(|existing| existing == model) {
            sanitized.push(model.to_string());
        }
    }
    if sanitized.is_empty() {
        sanitized.push(FALLBACK_MODEL.to_string());
    }
    sanitized
}

fn current_time() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use canvas_core::{ContextSource, MemoryCanvas, ShapeId};

    use super::*;

    #[derive(Default)]
    struct HostStub {
        next_run_id: RunId,
        started: Vec<(String, String, Vec<ModelMessage>)>,
        cancelled: Vec<RunId>,
        renders: usize,
        fail_with: Option<String>,
    }

    impl HostOps for HostStub {
        fn start_run(
            &mut self,
            model: String,
            system: String,
            messages: Vec<ModelMessage>,
        ) -> Result<RunId, String> {
            if let Some(error) = self.fail_with.clone() {
                return Err(error);
            }
            self.next_run_id += 1;
            self.started.push((model, system, messages));
            Ok(self.next_run_id)
        }

        fn cancel_run(&mut self, run_id: RunId) {
            self.cancelled.push(run_id);
        }

        fn request_render(&mut self) {
            self.renders += 1;
        }
    }

    fn agent() -> Agent {
        Agent::new(MemoryCanvas::new(), vec!["mock".into(), "mock-alt".into()])
            .with_clock(|| None)
    }

    #[test]
    fn models_are_trimmed_deduplicated_and_never_empty() {
        assert_eq!(
            sanitize_models(vec![" a ".into(), "a".into(), String::new(), "b".into()]),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(sanitize_models(Vec::new()), vec![FALLBACK_MODEL.to_string()]);
    }

    #[test]
    fn cycle_model_wraps_and_set_model_rejects_unknown() {
        let mut agent = agent();
        assert_eq!(agent.cycle_model(), "mock-alt");
        assert_eq!(agent.cycle_model(), "mock");
        assert_eq!(
            agent.set_model("gpt"),
            Err(AgentError::UnknownModel("gpt".to_string()))
        );
        agent.set_model("mock-alt").expect("known model");
        assert_eq!(agent.model().get(), "mock-alt");
    }

    #[test]
    fn empty_prompt_is_rejected_without_starting_a_run() {
        let mut agent = agent();
        let mut host = HostStub::default();

        assert_eq!(agent.prompt("  \n", &mut host), Err(AgentError::EmptyPrompt));
        assert!(host.started.is_empty());
        assert!(agent.history().get().is_empty());
        assert_eq!(host.renders, 1);
    }

    #[test]
    fn prompt_consumes_context_items_and_records_them_in_history() {
        let mut agent = agent();
        let mut host = HostStub::default();
        let item = ContextItem::Shape {
            shape_id: ShapeId::new("walls"),
            source: ContextSource::User,
        };
        assert!(agent.add_context_item(item.clone()));
        assert!(!agent.add_context_item(item.clone()));

        let run_id = agent.prompt("Make it taller", &mut host).expect("start");

        assert_eq!(agent.mode().get(), &Mode::Requesting { run_id });
        assert!(agent.context_items().get().is_empty());
        assert_eq!(
            agent.history().get().as_slice(),
            &[ChatHistoryItem::Prompt {
                message: "Make it taller".to_string(),
                context_items: vec![item],
                selected_shapes: Vec::new(),
            }]
        );
        let (model, system, messages) = &host.started[0];
        assert_eq!(model, "mock");
        assert!(!system.is_empty());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn start_failure_surfaces_error_mode() {
        let mut agent = agent();
        let mut host = HostStub {
            fail_with: Some("no provider".to_string()),
            ..HostStub::default()
        };

        let error = agent.prompt("Draw", &mut host).expect_err("start fails");
        assert_eq!(error, AgentError::StartFailed("no provider".to_string()));
        assert_eq!(agent.mode().get(), &Mode::Error("no provider".to_string()));
        assert!(agent.is_idle());
    }

    #[test]
    fn mode_transitions_notify_subscribers_in_order() {
        let mut agent = agent();
        let mut host = HostStub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            agent
                .mode()
                .subscribe(move |mode: &Mode| seen.lock().expect("seen").push(mode.clone()));
        }

        let run_id = agent.prompt("Draw", &mut host).expect("start");
        assert!(agent.cancel(&mut host));
        assert!(!agent.cancel(&mut host));

        assert_eq!(
            *seen.lock().expect("seen"),
            vec![Mode::Requesting { run_id }, Mode::Idle]
        );
        assert_eq!(host.cancelled, vec![run_id]);
    }

    #[test]
    fn origin_is_set_once_from_user_viewport() {
        let canvas = MemoryCanvas::new().with_viewport(BoxModel::new(300.0, -40.0, 800.0, 600.0));
        let mut agent = Agent::new(canvas, vec!["mock".into()]).with_clock(|| None);
        let mut host = HostStub::default();

        agent.prompt("one", &mut host).expect("start");
        agent
            .canvas_mut()
            .set_viewport(BoxModel::new(0.0, 0.0, 100.0, 100.0));
        agent.prompt("two", &mut host).expect("start");

        assert_eq!(agent.origin().get(), &Some(Vec2::new(300.0, -40.0)));
    }

    #[test]
    fn origin_snaps_to_whole_units() {
        let canvas = MemoryCanvas::new().with_viewport(BoxModel::new(10.4, -3.6, 800.0, 600.0));
        let mut agent = Agent::new(canvas, vec!["mock".into()]).with_clock(|| None);
        let mut host = HostStub::default();

        agent.prompt("one", &mut host).expect("start");

        assert_eq!(agent.origin().get(), &Some(Vec2::new(10.0, -4.0)));
    }
}
