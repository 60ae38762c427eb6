//! Write-through persistence of agent state to a [`KeyValueStore`].
//!
//! Failures never interrupt a turn: loads fall back to defaults and writes
//! are logged and dropped.

use agent_store::{load_as, save_as, KeyValueStore, StoreError};
use canvas_core::{ChatHistoryItem, ContextItems, TodoList, Vec2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

pub const HISTORY_KEY: &str = "history";
pub const ORIGIN_KEY: &str = "origin";
pub const MODEL_KEY: &str = "model";
pub const TODOS_KEY: &str = "todos";
pub const CONTEXT_KEY: &str = "context";

/// State recovered at session start. Missing or unreadable keys stay `None`.
#[derive(Debug, Default)]
pub struct RestoredState {
    pub history: Option<Vec<ChatHistoryItem>>,
    pub origin: Option<Vec2>,
    pub model: Option<String>,
    pub todos: Option<TodoList>,
    pub context: Option<ContextItems>,
}

pub struct Persistence {
    store: Box<dyn KeyValueStore>,
    session: String,
}

impl Persistence {
    pub fn new(store: Box<dyn KeyValueStore>, session: impl Into<String>) -> Self {
        Self {
            store,
            session: session.into(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn restore(&self) -> RestoredState {
        RestoredState {
            history: self.load(HISTORY_KEY),
            origin: self.load::<Option<Vec2>>(ORIGIN_KEY).flatten(),
            model: self.load(MODEL_KEY),
            todos: self.load(TODOS_KEY),
            context: self.load(CONTEXT_KEY),
        }
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) {
        if let Err(error) = save_as(self.store.as_ref(), &self.session, key, value) {
            warn!(session = %self.session, key, %error, "failed to persist agent state");
        }
    }

    fn load<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        match load_as(self.store.as_ref(), &self.session, key) {
            Ok(value) => value,
            Err(error @ StoreError::Corrupt { .. }) => {
                warn!(session = %self.session, key, %error, "ignoring corrupt agent state");
                None
            }
            Err(error) => {
                warn!(session = %self.session, key, %error, "failed to load agent state");
                None
            }
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use agent_store::MemoryStore;
    use canvas_core::{TodoItem, TodoStatus};
    use serde_json::json;

    use super::*;

    #[test]
    fn restore_reads_back_saved_keys() {
        let store = MemoryStore::new();
        let persistence = Persistence::new(Box::new(store.clone()), "s1");

        let mut todos = TodoList::default();
        todos.upsert(TodoItem {
            id: 0,
            status: TodoStatus::InProgress,
            text: "roof".to_string(),
        });
        persistence.save(TODOS_KEY, &todos);
        persistence.save(ORIGIN_KEY, &Some(Vec2::new(10.0, -4.0)));
        persistence.save(MODEL_KEY, "mock-alt");

        let restored = Persistence::new(Box::new(store), "s1").restore();
        assert_eq!(restored.todos, Some(todos));
        assert_eq!(restored.origin, Some(Vec2::new(10.0, -4.0)));
        assert_eq!(restored.model.as_deref(), Some("mock-alt"));
        assert!(restored.history.is_none());
        assert!(restored.context.is_none());
    }

    #[test]
    fn corrupt_blob_is_skipped() {
        let store = MemoryStore::new();
        store
            .save("s1", HISTORY_KEY, &json!({"not": "a list"}))
            .expect("raw save");
        store.save("s1", MODEL_KEY, &json!("mock")).expect("raw save");

        let restored = Persistence::new(Box::new(store), "s1").restore();
        assert!(restored.history.is_none());
        assert_eq!(restored.model.as_deref(), Some("mock"));
    }

    #[test]
    fn cleared_origin_restores_as_none() {
        let store = MemoryStore::new();
        let persistence = Persistence::new(Box::new(store), "s1");
        persistence.save(ORIGIN_KEY, &None::<Vec2>);

        assert_eq!(persistence.restore().origin, None);
    }
}
