//! Shared deterministic types for the turn engine.
//!
//! These types define stable contracts between the loop, the game backend, and
//! the decision-maker. They must not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Inclusive lower bound for coordinate arguments.
pub const COORDINATE_MIN: i64 = 0;
/// Inclusive upper bound for coordinate arguments.
pub const COORDINATE_MAX: i64 = 63;

/// One 2-D grid layer of cell colour indices (rows of columns).
pub type Grid = Vec<Vec<u8>>;

/// Actions the game understands. `Reset` is always permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameAction {
    #[serde(rename = "RESET")]
    Reset,
    #[serde(rename = "ACTION1")]
    Action1,
    #[serde(rename = "ACTION2")]
    Action2,
    #[serde(rename = "ACTION3")]
    Action3,
    #[serde(rename = "ACTION4")]
    Action4,
    #[serde(rename = "ACTION5")]
    Action5,
    #[serde(rename = "ACTION6")]
    Action6,
    #[serde(rename = "ACTION7")]
    Action7,
}

impl GameAction {
    pub const ALL: [GameAction; 8] = [
        GameAction::Reset,
        GameAction::Action1,
        GameAction::Action2,
        GameAction::Action3,
        GameAction::Action4,
        GameAction::Action5,
        GameAction::Action6,
        GameAction::Action7,
    ];

    /// Offered when the backend does not list any permitted actions.
    pub const DEFAULT_PERMITTED: [GameAction; 5] = [
        GameAction::Action1,
        GameAction::Action2,
        GameAction::Action3,
        GameAction::Action4,
        GameAction::Action5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GameAction::Reset => "RESET",
            GameAction::Action1 => "ACTION1",
            GameAction::Action2 => "ACTION2",
            GameAction::Action3 => "ACTION3",
            GameAction::Action4 => "ACTION4",
            GameAction::Action5 => "ACTION5",
            GameAction::Action6 => "ACTION6",
            GameAction::Action7 => "ACTION7",
        }
    }

    /// Backend numeric id (`RESET` is 0).
    pub fn id(self) -> u8 {
        match self {
            GameAction::Reset => 0,
            GameAction::Action1 => 1,
            GameAction::Action2 => 2,
            GameAction::Action3 => 3,
            GameAction::Action4 => 4,
            GameAction::Action5 => 5,
            GameAction::Action6 => 6,
            GameAction::Action7 => 7,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        GameAction::ALL.into_iter().find(|action| action.id() == id)
    }

    /// Whether this action takes an (x, y) target.
    pub fn is_coordinate(self) -> bool {
        self == GameAction::Action6
    }
}

impl fmt::Display for GameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameAction {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        GameAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| anyhow!("unknown action '{raw}'"))
    }
}

/// Lifecycle state reported by the game backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    #[serde(rename = "NOT_PLAYED")]
    NotPlayed,
    #[serde(rename = "PLAYING", alias = "NOT_FINISHED")]
    Playing,
    #[serde(rename = "WIN")]
    Win,
    #[serde(rename = "GAME_OVER")]
    GameOver,
}

impl GameState {
    pub fn as_str(self) -> &'static str {
        match self {
            GameState::NotPlayed => "NOT_PLAYED",
            GameState::Playing => "PLAYING",
            GameState::Win => "WIN",
            GameState::GameOver => "GAME_OVER",
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of remote game state returned by every reset/submit call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub game_id: String,
    /// Stacked grid layers, most recent last.
    #[serde(default, rename = "frame")]
    pub layers: Vec<Grid>,
    pub state: GameState,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub win_score: u32,
    /// Session token correlating subsequent calls.
    #[serde(default)]
    pub guid: Option<String>,
    /// Set when the backend restarted the session as a side effect of the last action.
    #[serde(default)]
    pub full_reset: bool,
    #[serde(default)]
    pub available_actions: Vec<u8>,
}

impl Frame {
    pub fn latest_grid(&self) -> Option<&Grid> {
        self.layers.last()
    }

    /// Actions the decision-maker may choose from, `RESET` always last.
    ///
    /// Unknown ids are dropped. Only an empty `available_actions` falls back to
    /// [`GameAction::DEFAULT_PERMITTED`]; a list naming just `RESET` permits just `RESET`.
    pub fn permitted_actions(&self) -> Vec<GameAction> {
        let mut actions: Vec<GameAction> = self
            .available_actions
            .iter()
            .filter_map(|id| GameAction::from_id(*id))
            .filter(|action| *action != GameAction::Reset)
            .collect();
        actions.sort();
        actions.dedup();
        if self.available_actions.is_empty() {
            actions.extend(GameAction::DEFAULT_PERMITTED);
        }
        actions.push(GameAction::Reset);
        actions
    }
}

/// Encoded image of a grid, ready to attach to a decision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub png: Vec<u8>,
    /// `data:image/png;base64,...`
    pub data_url: String,
}
