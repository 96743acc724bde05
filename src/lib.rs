//! Per-request workflow state over Redis.
//!
//! A [`StateStore`] is configured with a flow name and request id, then shared
//! by the workers of that request. Values live under
//! `<prefix>.<flow>.<request>.<key>`; `update` is an atomic compare-and-swap
//! evaluated server side, and `cleanup` removes everything the request wrote.

pub mod cli;
pub mod error;
pub mod namespace;
pub mod retry;
pub mod storage;

pub use error::{Result, StateError};
pub use namespace::Namespace;
pub use retry::{RetryConfig, update_with};
pub use storage::StateStore;
pub use storage::memory_store::MemoryStateStore;
pub use storage::redis_store::RedisStateStore;
