mod support;

use agent_store::{FileStore, KeyValueStore, MemoryStore};
use canvas_agent::agent::Agent;
use canvas_agent::persist::{Persistence, HISTORY_KEY, MODEL_KEY, TODOS_KEY};
use canvas_core::{ContextItem, ContextSource, MemoryCanvas, ShapeId, TodoStatus, Vec2};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{complete, new_agent, stream_frames, HostSpy};
use tempfile::tempdir;

const SESSION: &str = "session-1";

fn agent_with(store: impl KeyValueStore + 'static) -> Agent {
    new_agent().with_persistence(Persistence::new(Box::new(store), SESSION))
}

#[test]
fn session_state_survives_a_restart() {
    let dir = tempdir().expect("tempdir");
    let mut host = HostSpy::default();

    let mut first = agent_with(FileStore::new(dir.path()));
    first.set_model("mock-alt").expect("model");
    let run_id = first.prompt("Plan a garden", &mut host).expect("start");
    stream_frames(
        &mut first,
        &mut host,
        run_id,
        vec![complete(
            json!({"_type": "update-todo-list", "id": 0, "status": "done", "text": "beds"}),
        )],
    );
    let context = ContextItem::Shape {
        shape_id: ShapeId::new("bed"),
        source: ContextSource::User,
    };
    assert!(first.add_context_item(context.clone()));
    let history = first.history().get().clone();
    drop(first);

    let restored = agent_with(FileStore::new(dir.path()));

    assert_eq!(restored.history().get(), &history);
    assert_eq!(restored.model().get(), "mock-alt");
    assert_eq!(restored.origin().get(), &Some(Vec2::new(0.0, 0.0)));
    assert_eq!(restored.todos().get().items()[0].status, TodoStatus::Done);
    assert_eq!(restored.context_items().get().items(), &[context]);
}

#[test]
fn reset_clears_the_persisted_conversation() {
    let store = MemoryStore::new();
    let mut host = HostSpy::default();

    let mut agent = agent_with(store.clone());
    let run_id = agent.prompt("Draw", &mut host).expect("start");
    stream_frames(&mut agent, &mut host, run_id, Vec::new());
    agent.reset(&mut host);
    drop(agent);

    let restored = agent_with(store.clone());
    assert!(restored.history().get().is_empty());
    assert!(restored.todos().get().is_empty());
    assert_eq!(restored.origin().get(), &None);
    assert_eq!(store.load(SESSION, HISTORY_KEY).expect("load"), Some(json!([])));
}

#[test]
fn unknown_stored_model_keeps_the_default() {
    let store = MemoryStore::new();
    store
        .save(SESSION, MODEL_KEY, &json!("retired-model"))
        .expect("seed");

    let agent = agent_with(store);
    assert_eq!(agent.model().get(), "mock");
}

#[test]
fn corrupt_blob_is_skipped_and_the_rest_restores() {
    let store = MemoryStore::new();
    store
        .save(SESSION, TODOS_KEY, &json!({"not": "a todo list"}))
        .expect("seed");
    store
        .save(SESSION, MODEL_KEY, &json!("mock-alt"))
        .expect("seed");

    let agent = agent_with(store);
    assert!(agent.todos().get().is_empty());
    assert_eq!(agent.model().get(), "mock-alt");
}

#[test]
fn agent_without_store_keeps_state_in_memory_only() {
    let mut agent = Agent::new(MemoryCanvas::new(), vec!["mock".to_string()]).with_clock(|| None);
    let mut host = HostSpy::default();
    agent.prompt("Draw", &mut host).expect("start");
    assert_eq!(agent.history().get().len(), 1);
}
