use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TodoId = i64;

/// One row of the `todos` table as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub user_id: Uuid,
    pub task: String,
    #[serde(default)]
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    pub fn state(&self) -> RowState {
        RowState::Persisted {
            complete: self.is_complete,
        }
    }
}

/// Insert payload; the server fills in `id`, `is_complete` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTodo {
    pub task: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TodoPatch {
    pub is_complete: bool,
}

/// Where a row sits in its lifecycle. Every transition is confirmed by the
/// server before the list reflects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Pending,
    Persisted { complete: bool },
    Deleted,
}

impl RowState {
    pub fn label(self) -> &'static str {
        match self {
            RowState::Pending => "saving",
            RowState::Persisted { complete: true } => "[x]",
            RowState::Persisted { complete: false } => "[ ]",
            RowState::Deleted => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_postgrest_row() {
        let json = r#"{
            "id": 7,
            "user_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "task": "Buy milk",
            "is_complete": true,
            "created_at": "2024-05-01T10:15:30.123456+00:00"
        }"#;
        let todo: Todo = serde_json::from_str(json).unwrap();
        assert_eq!(todo.id, 7);
        assert_eq!(todo.task, "Buy milk");
        assert_eq!(todo.state(), RowState::Persisted { complete: true });
    }

    #[test]
    fn missing_flag_defaults_to_incomplete() {
        let json = r#"{
            "id": 1,
            "user_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "task": "Walk dog",
            "created_at": "2024-05-01T10:15:30Z"
        }"#;
        let todo: Todo = serde_json::from_str(json).unwrap();
        assert!(!todo.is_complete);
    }

    #[test]
    fn insert_payload_carries_only_task_and_owner() {
        let row = NewTodo {
            task: "Buy milk".into(),
            user_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "task": "Buy milk",
                "user_id": "00000000-0000-0000-0000-000000000000"
            })
        );
    }

    #[test]
    fn labels_follow_state() {
        let done = Todo {
            id: 1,
            user_id: Uuid::nil(),
            task: "x".into(),
            is_complete: true,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(done.state().label(), "[x]");
        assert_eq!(RowState::Pending.label(), "saving");
    }
}
