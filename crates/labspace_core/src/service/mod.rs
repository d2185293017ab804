//! Lab use-case services.
//!
//! # Responsibility
//! - Run lab mutations through the optimistic confirm/rollback protocol.
//! - Keep presentation and FFI callers away from remote details.

pub mod lab_engine;
pub mod mutation;
