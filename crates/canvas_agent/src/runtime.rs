use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use model_provider::{
    CancelSignal, ModelMessage, ModelProvider, ModelRequest, ProviderProfile, RunEvent, RunId,
};
use tracing::{debug, warn};

use crate::agent::{Agent, HostOps};

pub const ERROR_RUN_ALREADY_ACTIVE: &str = "Run already active";

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct ActiveRun {
    run_id: RunId,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Runs provider streams on worker threads and feeds their events to the
/// shared [`Agent`].
///
/// Events are applied on the worker thread under the agent lock, in the
/// order the provider emits them. A run cancelled by the agent is detached
/// when the next run starts; its remaining events are stale and ignored.
pub struct RuntimeController {
    agent: Arc<Mutex<Agent>>,
    provider: Arc<dyn ModelProvider>,
    next_run_id: AtomicU64,
    active_run: Mutex<Option<ActiveRun>>,
    render_requests: AtomicU64,
}

impl RuntimeController {
    pub fn new(agent: Arc<Mutex<Agent>>, provider: Arc<dyn ModelProvider>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            provider,
            next_run_id: AtomicU64::new(1),
            active_run: Mutex::new(None),
            render_requests: AtomicU64::new(0),
        })
    }

    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    /// Locks the agent and hands it a host bound to this controller.
    pub fn with_agent<R>(self: &Arc<Self>, f: impl FnOnce(&mut Agent, &mut dyn HostOps) -> R) -> R {
        let mut controller = Arc::clone(self);
        let host: &mut dyn HostOps = &mut controller;
        let mut agent = lock_unpoisoned(&self.agent);
        f(&mut *agent, host)
    }

    /// Blocks until no turn is open and no run is in flight. Returns false on
    /// timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let agent_idle = lock_unpoisoned(&self.agent).is_idle();
            if agent_idle && self.lock_active_run().is_none() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    pub fn render_requests(&self) -> u64 {
        self.render_requests.load(Ordering::SeqCst)
    }

    fn start_run_internal(
        self: &Arc<Self>,
        model: String,
        system: String,
        messages: Vec<ModelMessage>,
    ) -> Result<RunId, String> {
        let mut active_run = self.lock_active_run();
        if let Some(active) = active_run.as_ref() {
            if !active.cancel.load(Ordering::SeqCst) {
                return Err(ERROR_RUN_ALREADY_ACTIVE.to_string());
            }
            debug!(run_id = active.run_id, "detaching cancelled run");
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let request = ModelRequest {
            run_id,
            model,
            system,
            messages,
        };
        let join_handle = self.spawn_worker(request, Arc::clone(&cancel))?;

        *active_run = Some(ActiveRun {
            run_id,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(run_id)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: ModelRequest,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, String> {
        let run_id = request.run_id;
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name(format!("canvas-agent-run-{run_id}"))
            .spawn(move || controller.run_worker(request, cancel))
            .map_err(|error| format!("Failed to spawn run worker: {error}"))
    }

    fn run_worker(self: Arc<Self>, request: ModelRequest, cancel: CancelSignal) {
        let run_id = request.run_id;
        self.wait_for_agent_run_visibility(run_id);

        let terminal_emitted = AtomicBool::new(false);
        let mut emit = |event: RunEvent| {
            if event.is_terminal() {
                terminal_emitted.store(true, Ordering::SeqCst);
            }
            self.apply_run_event(event);
        };

        let provider = Arc::clone(&self.provider);
        let run_outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.run(request, Arc::clone(&cancel), &mut emit)
        }));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => emit(RunEvent::Failed { run_id, error }),
            Err(_) => emit(RunEvent::Failed {
                run_id,
                error: "Model provider panicked".to_string(),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst) && self.is_active_run_id(run_id) {
            warn!(run_id, "provider returned without a terminal event");
            emit(RunEvent::Failed {
                run_id,
                error: "Model provider exited without terminal event".to_string(),
            });
        }
    }

    fn wait_for_agent_run_visibility(&self, run_id: RunId) {
        for _ in 0..256 {
            let run_visible = lock_unpoisoned(&self.agent).active_run_id() == Some(run_id);
            if run_visible {
                return;
            }

            thread::yield_now();
        }
    }

    /// Terminal events release the run slot first, so the agent may start
    /// its follow-up turn while handling them.
    fn apply_run_event(self: &Arc<Self>, event: RunEvent) {
        if event.is_terminal() {
            self.clear_active_run_if_matching(event.run_id());
        }

        let mut host = Arc::clone(self);
        let mut agent = lock_unpoisoned(&self.agent);
        match event {
            RunEvent::Started { run_id } => agent.on_run_started(run_id),
            RunEvent::Chunk { run_id, text } => agent.on_run_chunk(run_id, &text, &mut host),
            RunEvent::Action { run_id, action } => agent.on_run_action(run_id, action, &mut host),
            RunEvent::Finished { run_id } => agent.on_run_finished(run_id, &mut host),
            RunEvent::Failed { run_id, error } => agent.on_run_failed(run_id, &error, &mut host),
            RunEvent::Cancelled { run_id } => agent.on_run_cancelled(run_id, &mut host),
        }
    }

    fn clear_active_run_if_matching(&self, run_id: RunId) {
        let mut active_run = self.lock_active_run();
        let matches = active_run.as_ref().map(|active| active.run_id) == Some(run_id);
        if !matches {
            return;
        }

        let Some(mut completed) = active_run.take() else {
            return;
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }

    fn is_active_run_id(&self, run_id: RunId) -> bool {
        self.lock_active_run().as_ref().map(|active| active.run_id) == Some(run_id)
    }

    fn cancel_run_internal(&self, run_id: RunId) {
        let active_run = self.lock_active_run();
        if let Some(active_run) = active_run.as_ref() {
            if active_run.run_id == run_id {
                active_run.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    fn lock_active_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        lock_unpoisoned(&self.active_run)
    }
}

impl HostOps for Arc<RuntimeController> {
    fn start_run(
        &mut self,
        model: String,
        system: String,
        messages: Vec<ModelMessage>,
    ) -> Result<RunId, String> {
        self.start_run_internal(model, system, messages)
    }

    fn cancel_run(&mut self, run_id: RunId) {
        self.cancel_run_internal(run_id);
    }

    fn request_render(&mut self) {
        self.render_requests.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
