//! Action budget shared by the session loop and its configuration.

use anyhow::{Result, anyhow};

/// Upper bound on decided actions per game session (the initial reset is free).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionBudget {
    max_actions: u32,
}

impl ActionBudget {
    pub fn new(max_actions: u32) -> Result<Self> {
        if max_actions == 0 {
            return Err(anyhow!("max_actions must be > 0"));
        }
        Ok(Self { max_actions })
    }

    pub fn max_actions(&self) -> u32 {
        self.max_actions
    }

    /// True once `taken` actions use up the budget.
    pub fn exhausted(&self, taken: u32) -> bool {
        taken >= self.max_actions
    }
}
