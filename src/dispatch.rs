use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    backend::{AuthProvider, RemoteResult, TodoTable},
    entities::{
        session::Session,
        todo::{NewTodo, Todo, TodoPatch},
    },
    store::{TodoRequest, TodoResponse},
};

/// Bumped whenever the signed-in identity changes; todo replies carry the
/// epoch they were issued under.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Todo { epoch: Epoch, request: TodoRequest },
    SignIn { callback: String },
    SignOut,
}

impl Command {
    /// Log-safe label; the sign-in callback carries tokens.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Todo { request, .. } => match request {
                TodoRequest::Load => "load",
                TodoRequest::Insert { .. } => "insert",
                TodoRequest::SetComplete { .. } => "set_complete",
                TodoRequest::Delete { .. } => "delete",
            },
            Command::SignIn { .. } => "sign_in",
            Command::SignOut => "sign_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Todo {
        epoch: Epoch,
        response: TodoResponse,
    },
    SignedIn(RemoteResult<Session>),
    SignedOut,
}

/// The two remote collaborators, injected as trait objects.
#[derive(Clone)]
pub struct Backend {
    auth: Arc<dyn AuthProvider>,
    table: Arc<dyn TodoTable>,
}

impl Backend {
    pub fn new(auth: Arc<dyn AuthProvider>, table: Arc<dyn TodoTable>) -> Self {
        Self { auth, table }
    }

    /// Runs one command to completion. Failures travel inside the reply.
    pub async fn execute(&self, command: Command) -> Reply {
        debug!(command = command.name(), "executing");
        match command {
            Command::Todo { epoch, request } => Reply::Todo {
                epoch,
                response: self.execute_todo(request).await,
            },
            Command::SignIn { callback } => {
                Reply::SignedIn(self.auth.complete_sign_in(&callback).await)
            }
            Command::SignOut => {
                if let Err(err) = self.auth.sign_out().await {
                    warn!(error = %err, "sign-out failed, leaving anyway");
                }
                Reply::SignedOut
            }
        }
    }

    async fn execute_todo(&self, request: TodoRequest) -> TodoResponse {
        match request {
            TodoRequest::Load => TodoResponse::Loaded(self.table.select_all().await),
            TodoRequest::Insert { task } => TodoResponse::Inserted(self.insert(task).await),
            TodoRequest::SetComplete { id, is_complete } => TodoResponse::Updated {
                id,
                result: self.table.update(id, TodoPatch { is_complete }).await,
            },
            TodoRequest::Delete { id } => TodoResponse::Deleted {
                id,
                result: self.table.delete(id).await,
            },
        }
    }

    async fn insert(&self, task: String) -> RemoteResult<Todo> {
        let user = self.auth.get_user().await?;
        self.table
            .insert(NewTodo {
                task,
                user_id: user.id,
            })
            .await
    }
}

/// Spawns commands on the runtime and funnels replies back to the event loop.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Backend,
    replies: mpsc::UnboundedSender<Reply>,
}

impl Dispatcher {
    pub fn new(backend: Backend) -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (replies, rx) = mpsc::unbounded_channel();
        (Self { backend, replies }, rx)
    }

    pub fn dispatch(&self, command: Command) {
        let backend = self.backend.clone();
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let reply = backend.execute(command).await;
            if replies.send(reply).is_err() {
                debug!("event loop gone, dropping reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            mock::{MockAuth, MockTable},
            RemoteError,
        },
        entities::session::User,
        store::TodoList,
    };
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::from_u128(42),
            email: Some("ada@example.com".into()),
        }
    }

    fn row(id: i64, task: &str, is_complete: bool) -> Todo {
        Todo {
            id,
            user_id: user().id,
            task: task.into(),
            is_complete,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    fn backend(auth: MockAuth, table: MockTable) -> Backend {
        Backend::new(Arc::new(auth), Arc::new(table))
    }

    async fn drive(list: &mut TodoList, backend: &Backend, request: Option<TodoRequest>) {
        if let Some(request) = request {
            match backend.execute(Command::Todo { epoch: 0, request }).await {
                Reply::Todo { response, .. } => list.apply(response),
                other => panic!("unexpected reply {other:?}"),
            }
        }
    }

    fn list_with(rows: Vec<Todo>) -> TodoList {
        let mut list = TodoList::new(false);
        list.set_owner(Some(user().id));
        list.apply(TodoResponse::Loaded(Ok(rows)));
        list
    }

    #[tokio::test]
    async fn whitespace_add_issues_no_call() {
        // Mocks without expectations panic on any call.
        let backend = backend(MockAuth::new(), MockTable::new());
        let mut list = list_with(vec![]);
        list.new_task_mut().enter_str("  ");
        let request = list.submit();
        drive(&mut list, &backend, request).await;
        assert!(list.todos().is_empty());
        assert_eq!(list.new_task().value(), "  ");
    }

    #[tokio::test]
    async fn add_inserts_once_with_owner() {
        let mut auth = MockAuth::new();
        auth.expect_get_user().times(1).returning(|| Ok(user()));
        let mut table = MockTable::new();
        table
            .expect_insert()
            .with(eq(NewTodo {
                task: "Buy milk".into(),
                user_id: user().id,
            }))
            .times(1)
            .returning(|_| Ok(row(1, "Buy milk", false)));
        let backend = backend(auth, table);

        let mut list = list_with(vec![]);
        list.new_task_mut().enter_str("Buy milk");
        let request = list.submit();
        drive(&mut list, &backend, request).await;

        assert_eq!(list.todos(), &[row(1, "Buy milk", false)]);
        assert_eq!(list.new_task().value(), "");
    }

    #[tokio::test]
    async fn add_fails_when_user_cannot_be_resolved() {
        let mut auth = MockAuth::new();
        auth.expect_get_user()
            .returning(|| Err(RemoteError::new("JWT expired")));
        let backend = backend(auth, MockTable::new());

        let mut list = list_with(vec![]);
        list.new_task_mut().enter_str("Buy milk");
        let request = list.submit();
        drive(&mut list, &backend, request).await;

        assert!(list.todos().is_empty());
        assert_eq!(list.new_task().value(), "Buy milk");
        assert_eq!(list.notice().unwrap().text, "Error adding todo: JWT expired");
    }

    #[tokio::test]
    async fn toggle_sends_negated_flag() {
        let mut table = MockTable::new();
        table
            .expect_update()
            .with(eq(5), eq(TodoPatch { is_complete: true }))
            .times(1)
            .returning(|id, patch| Ok(row(id, "a", patch.is_complete)));
        let backend = backend(MockAuth::new(), table);

        let mut list = list_with(vec![row(5, "a", false)]);
        let request = list.toggle(5, false);
        drive(&mut list, &backend, request).await;
        assert!(list.get(5).unwrap().is_complete);
    }

    #[tokio::test]
    async fn toggle_failure_keeps_row_incomplete() {
        let mut table = MockTable::new();
        table
            .expect_update()
            .returning(|_, _| Err(RemoteError::new("network down")));
        let backend = backend(MockAuth::new(), table);

        let mut list = list_with(vec![row(5, "a", false)]);
        let request = list.toggle(5, false);
        drive(&mut list, &backend, request).await;
        assert!(!list.get(5).unwrap().is_complete);
        assert!(list.notice().is_some());
    }

    #[tokio::test]
    async fn toggling_twice_restores_original_value() {
        let mut table = MockTable::new();
        table
            .expect_update()
            .times(2)
            .returning(|id, patch| Ok(row(id, "a", patch.is_complete)));
        let backend = backend(MockAuth::new(), table);

        let mut list = list_with(vec![row(5, "a", false)]);
        for _ in 0..2 {
            let current = list.get(5).unwrap().is_complete;
            let request = list.toggle(5, current);
            drive(&mut list, &backend, request).await;
        }
        assert!(!list.get(5).unwrap().is_complete);
    }

    #[tokio::test]
    async fn delete_targets_one_id() {
        let mut table = MockTable::new();
        table
            .expect_delete()
            .with(eq(2))
            .times(1)
            .returning(|_| Ok(()));
        let backend = backend(MockAuth::new(), table);

        let mut list = list_with(vec![row(3, "c", false), row(2, "b", false), row(1, "a", false)]);
        let request = list.delete(2);
        drive(&mut list, &backend, request).await;
        let ids: Vec<_> = list.todos().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn delete_failure_keeps_row() {
        let mut table = MockTable::new();
        table
            .expect_delete()
            .returning(|_| Err(RemoteError::new("permission denied")));
        let backend = backend(MockAuth::new(), table);

        let mut list = list_with(vec![row(2, "b", false)]);
        let request = list.delete(2);
        drive(&mut list, &backend, request).await;
        assert!(list.get(2).is_some());
    }

    #[tokio::test]
    async fn foreign_rows_from_server_break_ownership() {
        let mut stranger = row(9, "someone else's", false);
        stranger.user_id = Uuid::from_u128(7);
        let rows = vec![row(1, "mine", false), stranger];
        let mut table = MockTable::new();
        table
            .expect_select_all()
            .times(1)
            .returning(move || Ok(rows.clone()));
        let backend = backend(MockAuth::new(), table);

        let mut list = TodoList::new(false);
        list.set_owner(Some(user().id));
        let request = list.begin_load();
        drive(&mut list, &backend, Some(request)).await;

        let owner = user().id;
        assert!(!list.todos().iter().all(|t| t.user_id == owner));
        assert_eq!(list.foreign_rows(), 1);
    }

    #[tokio::test]
    async fn sign_out_reply_ignores_failure() {
        let mut auth = MockAuth::new();
        auth.expect_sign_out()
            .times(1)
            .returning(|| Err(RemoteError::new("offline")));
        let backend = backend(auth, MockTable::new());
        assert_eq!(backend.execute(Command::SignOut).await, Reply::SignedOut);
    }

    #[tokio::test]
    async fn dispatcher_delivers_reply() {
        let mut table = MockTable::new();
        table.expect_select_all().returning(|| Ok(vec![]));
        let (dispatcher, mut replies) = Dispatcher::new(backend(MockAuth::new(), table));
        dispatcher.dispatch(Command::Todo {
            epoch: 3,
            request: TodoRequest::Load,
        });
        assert_eq!(
            replies.recv().await,
            Some(Reply::Todo {
                epoch: 3,
                response: TodoResponse::Loaded(Ok(vec![])),
            })
        );
    }
}
