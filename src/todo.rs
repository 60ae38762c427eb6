use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TodoStatus {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "todo" | "pending" => Some(Self::Todo),
            "in-progress" | "doing" => Some(Self::InProgress),
            "done" | "complete" | "completed" => Some(Self::Done),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u32,
    pub status: TodoStatus,
    pub text: String,
}

/// Todo list keyed by item id, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList(Vec<TodoItem>);

impl TodoList {
    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces the item with the same id, or appends it.
    pub fn upsert(&mut self, item: TodoItem) {
        match self.0.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.0.push(item),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.0
            .iter()
            .filter(|item| item.status != TodoStatus::Done)
            .count()
    }

    #[must_use]
    pub fn next_id(&self) -> u32 {
        self.0.iter().map(|item| item.id).max().map_or(0, |id| id + 1)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_by_id_and_counts_remaining() {
        let mut todos = TodoList::default();
        for (id, text) in [(0, "sky"), (1, "sun"), (2, "grass")] {
            todos.upsert(TodoItem {
                id,
                status: TodoStatus::Todo,
                text: text.to_string(),
            });
        }
        todos.upsert(TodoItem {
            id: 1,
            status: TodoStatus::Done,
            text: "sun".to_string(),
        });

        assert_eq!(todos.items().len(), 3);
        assert_eq!(todos.remaining(), 2);
        assert_eq!(todos.next_id(), 3);
    }

    #[test]
    fn status_parsing_is_lenient() {
        assert_eq!(TodoStatus::parse("In Progress"), Some(TodoStatus::InProgress));
        assert_eq!(TodoStatus::parse("completed"), Some(TodoStatus::Done));
        assert_eq!(TodoStatus::parse("later"), None);
    }
}
