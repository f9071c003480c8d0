//! `Session`/`SessionPool` (§3 Session, §4.6).
//!
//! Grounded on the teacher's `CircuitBreaker`/domain-health cache: sessions
//! live in a `DashMap` keyed by id, each session's mutable state behind a
//! `parking_lot::Mutex` so reads under contention never block on an async
//! runtime.

mod pool;
mod session;

pub use pool::SessionPool;
pub use session::Session;
