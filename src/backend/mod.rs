use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{
    session::{Session, User},
    todo::{NewTodo, Todo, TodoId, TodoPatch},
};

pub mod session_file;
pub mod supabase;

/// The only failure the client distinguishes: a remote call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Identity provider boundary.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Where the user signs in with the configured external provider.
    fn sign_in_url(&self) -> String;

    /// Turns the provider's redirect URL into a session and keeps it.
    async fn complete_sign_in(&self, callback: &str) -> RemoteResult<Session>;

    async fn get_session(&self) -> Option<Session>;

    async fn get_user(&self) -> RemoteResult<User>;

    async fn sign_out(&self) -> RemoteResult<()>;
}

/// Row store for the todos table. Row-level filtering happens server side.
#[async_trait]
pub trait TodoTable: Send + Sync {
    /// All visible rows, newest first.
    async fn select_all(&self) -> RemoteResult<Vec<Todo>>;

    async fn insert(&self, row: NewTodo) -> RemoteResult<Todo>;

    async fn update(&self, id: TodoId, patch: TodoPatch) -> RemoteResult<Todo>;

    async fn delete(&self, id: TodoId) -> RemoteResult<()>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub Auth {}

        #[async_trait]
        impl AuthProvider for Auth {
            fn sign_in_url(&self) -> String;
            async fn complete_sign_in(&self, callback: &str) -> RemoteResult<Session>;
            async fn get_session(&self) -> Option<Session>;
            async fn get_user(&self) -> RemoteResult<User>;
            async fn sign_out(&self) -> RemoteResult<()>;
        }
    }

    mock! {
        pub Table {}

        #[async_trait]
        impl TodoTable for Table {
            async fn select_all(&self) -> RemoteResult<Vec<Todo>>;
            async fn insert(&self, row: NewTodo) -> RemoteResult<Todo>;
            async fn update(&self, id: TodoId, patch: TodoPatch) -> RemoteResult<Todo>;
            async fn delete(&self, id: TodoId) -> RemoteResult<()>;
        }
    }
}
