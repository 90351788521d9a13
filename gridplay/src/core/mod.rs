//! Deterministic, pure logic shared by the turn engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod decision;
pub mod schema;
pub mod state;
pub mod types;
pub mod window;
