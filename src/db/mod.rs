//! Persistence for the session core.
//!
//! `ConnectionManager` owns the bounded pool and hands out one
//! deadline-bound `OperationContext` per storage call; `DbOperations`
//! holds the credential record queries built on top of it.

pub mod models;
pub mod operations;
pub mod pool;

pub use models::User;
pub use operations::DbOperations;
pub use pool::{ConnectionManager, DbPoolStatus, OperationContext};
