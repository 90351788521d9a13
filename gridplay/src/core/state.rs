//! Per-session state threaded explicitly through the turn loop.

use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::budget::ActionBudget;
use crate::core::types::GameState;

/// Token usage reported by the decision-maker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Operator-requested shutdown, set by the interrupt watcher and polled between turns.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable bookkeeping for one game session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session token from the most recent frame that carried one.
    pub guid: Option<String>,
    pub actions_taken: u32,
    pub usage: Usage,
    pub full_resets: u32,
    pub shutdown: ShutdownFlag,
}

impl SessionState {
    pub fn new(shutdown: ShutdownFlag) -> Self {
        Self {
            guid: None,
            actions_taken: 0,
            usage: Usage::default(),
            full_resets: 0,
            shutdown,
        }
    }

    /// Adopt the frame's session token when it carries one.
    pub fn observe_guid(&mut self, guid: Option<&str>) {
        if let Some(guid) = guid {
            self.guid = Some(guid.to_string());
        }
    }
}

/// States of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Init,
    Resetting,
    Deciding,
    Submitting,
    Won,
    BudgetExceeded,
    Interrupted,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Init => "INIT",
            SessionPhase::Resetting => "RESETTING",
            SessionPhase::Deciding => "DECIDING",
            SessionPhase::Submitting => "SUBMITTING",
            SessionPhase::Won => "WON",
            SessionPhase::BudgetExceeded => "BUDGET_EXCEEDED",
            SessionPhase::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition out of `RESETTING` once the reset frame arrived.
pub fn after_reset(state: GameState) -> SessionPhase {
    if state == GameState::Win {
        return SessionPhase::Won;
    }
    SessionPhase::Deciding
}

/// Transition out of `SUBMITTING` once a turn has been recorded.
///
/// A win takes precedence over an exhausted budget.
pub fn after_submit(state: GameState, actions_taken: u32, budget: &ActionBudget) -> SessionPhase {
    if state == GameState::Win {
        return SessionPhase::Won;
    }
    if budget.exhausted(actions_taken) {
        return SessionPhase::BudgetExceeded;
    }
    SessionPhase::Deciding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage {
            input_tokens: 10,
            output_tokens: 5,
            reasoning_tokens: 2,
            total_tokens: 15,
        };
        total += Usage {
            input_tokens: 1,
            output_tokens: 1,
            reasoning_tokens: 0,
            total_tokens: 2,
        };
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.total_tokens, 17);
    }

    #[test]
    fn shutdown_flag_is_shared_between_clones() {
        let flag = ShutdownFlag::new();
        let watcher = flag.clone();
        assert!(!flag.is_requested());
        watcher.request();
        assert!(flag.is_requested());
    }

    #[test]
    fn guid_only_changes_when_frame_carries_one() {
        let mut state = SessionState::new(ShutdownFlag::new());
        state.observe_guid(Some("g-1"));
        state.observe_guid(None);
        assert_eq!(state.guid.as_deref(), Some("g-1"));
        state.observe_guid(Some("g-2"));
        assert_eq!(state.guid.as_deref(), Some("g-2"));
    }

    #[test]
    fn transitions_follow_win_then_budget() {
        let budget = ActionBudget::new(2).expect("budget");
        assert_eq!(after_reset(GameState::Win), SessionPhase::Won);
        assert_eq!(after_reset(GameState::NotPlayed), SessionPhase::Deciding);
        assert_eq!(after_submit(GameState::Playing, 1, &budget), SessionPhase::Deciding);
        assert_eq!(after_submit(GameState::GameOver, 1, &budget), SessionPhase::Deciding);
        assert_eq!(after_submit(GameState::Playing, 2, &budget), SessionPhase::BudgetExceeded);
        assert_eq!(after_submit(GameState::Win, 2, &budget), SessionPhase::Won);
    }
}
