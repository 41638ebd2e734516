use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    backend::RemoteResult,
    entities::todo::{RowState, Todo, TodoId},
    input::InputField,
};

/// A remote call the list wants made.
#[derive(Debug, Clone, PartialEq)]
pub enum TodoRequest {
    Load,
    Insert { task: String },
    SetComplete { id: TodoId, is_complete: bool },
    Delete { id: TodoId },
}

/// How a [`TodoRequest`] settled.
#[derive(Debug, Clone, PartialEq)]
pub enum TodoResponse {
    Loaded(RemoteResult<Vec<Todo>>),
    Inserted(RemoteResult<Todo>),
    Updated {
        id: TodoId,
        result: RemoteResult<Todo>,
    },
    Deleted {
        id: TodoId,
        result: RemoteResult<()>,
    },
}

/// Blocking message shown until the user dismisses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
}

impl Notice {
    fn failure(action: &str, message: &str) -> Self {
        Self {
            text: format!("Error {action}: {message}"),
        }
    }
}

/// Local mirror of the signed-in user's rows.
///
/// Methods starting an operation hand back the [`TodoRequest`] to run; the
/// collection only changes once [`TodoList::apply`] sees the server's answer.
#[derive(Debug)]
pub struct TodoList {
    todos: Vec<Todo>,
    loading: bool,
    new_task: InputField,
    notices: VecDeque<Notice>,
    owner: Option<Uuid>,
    pending_inserts: usize,
    in_flight: HashSet<TodoId>,
    dedupe: bool,
}

impl TodoList {
    pub fn new(dedupe: bool) -> Self {
        Self {
            todos: Vec::new(),
            loading: true,
            new_task: InputField::new(),
            notices: VecDeque::new(),
            owner: None,
            pending_inserts: 0,
            in_flight: HashSet::new(),
            dedupe,
        }
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn new_task(&self) -> &InputField {
        &self.new_task
    }

    pub fn new_task_mut(&mut self) -> &mut InputField {
        &mut self.new_task
    }

    /// Oldest failure not yet dismissed.
    pub fn notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    fn notify(&mut self, action: &str, message: &str) {
        self.notices.push_back(Notice::failure(action, message));
    }

    pub fn set_owner(&mut self, owner: Option<Uuid>) {
        self.owner = owner;
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|todo| todo.id == id)
    }

    /// Rows absent from the list read as deleted.
    pub fn state_of(&self, id: TodoId) -> RowState {
        self.get(id).map_or(RowState::Deleted, Todo::state)
    }

    /// `Some(Pending)` while an insert has not settled.
    pub fn draft_state(&self) -> Option<RowState> {
        (self.pending_inserts > 0).then_some(RowState::Pending)
    }

    /// Rows whose owner is not the signed-in user. Filtering is the server's job,
    /// so these are reported, never hidden.
    pub fn foreign_rows(&self) -> usize {
        match self.owner {
            Some(owner) => self.todos.iter().filter(|t| t.user_id != owner).count(),
            None => 0,
        }
    }

    pub fn begin_load(&mut self) -> TodoRequest {
        self.loading = true;
        TodoRequest::Load
    }

    /// `None` when the field holds only whitespace.
    pub fn submit(&mut self) -> Option<TodoRequest> {
        if self.new_task.is_blank() {
            return None;
        }
        self.pending_inserts += 1;
        Some(TodoRequest::Insert {
            task: self.new_task.value().to_string(),
        })
    }

    pub fn toggle(&mut self, id: TodoId, is_complete: bool) -> Option<TodoRequest> {
        self.claim(id)?;
        Some(TodoRequest::SetComplete {
            id,
            is_complete: !is_complete,
        })
    }

    pub fn delete(&mut self, id: TodoId) -> Option<TodoRequest> {
        self.claim(id)?;
        Some(TodoRequest::Delete { id })
    }

    fn claim(&mut self, id: TodoId) -> Option<()> {
        if self.dedupe && !self.in_flight.insert(id) {
            debug!(id, "request already in flight, ignoring");
            return None;
        }
        Some(())
    }

    pub fn apply(&mut self, response: TodoResponse) {
        match response {
            TodoResponse::Loaded(result) => {
                self.loading = false;
                match result {
                    Ok(todos) => {
                        self.todos = todos;
                        let foreign = self.foreign_rows();
                        if foreign > 0 {
                            warn!(foreign, "server returned rows owned by another user");
                        }
                    }
                    Err(err) => self.notify("fetching data", err.message()),
                }
            }
            TodoResponse::Inserted(result) => {
                self.pending_inserts = self.pending_inserts.saturating_sub(1);
                match result {
                    Ok(todo) => {
                        self.todos.insert(0, todo);
                        self.new_task.clear();
                    }
                    Err(err) => self.notify("adding todo", err.message()),
                }
            }
            TodoResponse::Updated { id, result } => {
                self.in_flight.remove(&id);
                match result {
                    Ok(updated) => {
                        for todo in self.todos.iter_mut().filter(|todo| todo.id == id) {
                            *todo = updated.clone();
                        }
                    }
                    Err(err) => self.notify("updating todo", err.message()),
                }
            }
            TodoResponse::Deleted { id, result } => {
                self.in_flight.remove(&id);
                match result {
                    Ok(()) => self.todos.retain(|todo| todo.id != id),
                    Err(err) => self.notify("deleting todo", err.message()),
                }
            }
        }
    }
}
