//! Turn orchestration engine for an agent that plays grid puzzle games.
//!
//! Each session resets a remote game, then repeatedly renders the latest
//! frame, asks a reasoning model for exactly one action under a strict
//! schema, submits it, and records the outcome in a bounded window that feeds
//! the next decision. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (schema, decision validation,
//!   turn window, session transitions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (game and model backends,
//!   rendering, prompts, processes, logs). Behind traits to enable scripted
//!   fakes in tests.
//!
//! Orchestration modules ([`session`], [`supervisor`]) coordinate core logic
//! with I/O to implement `gridplay play`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
