pub mod session;
pub mod todo;
