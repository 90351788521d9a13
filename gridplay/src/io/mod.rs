//! I/O: backend clients, rendering, prompts, processes and logs.

pub mod codex;
pub mod config;
pub mod decider;
pub mod game;
pub mod interrupt;
pub mod process;
pub mod prompt;
pub mod render;
pub mod responses;
pub mod scorecard;
pub mod turn_log;
