//! Optional per-turn debug dumps under `<log_dir>/<game_id>/<turn>/`.
//!
//! Dumps are diagnostics only: the session never reads them back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::decision::Decision;
use crate::core::state::Usage;
use crate::core::types::Frame;

#[derive(Debug, Clone)]
pub struct TurnLogPaths {
    pub dir: PathBuf,
    pub request_path: PathBuf,
    pub decision_path: PathBuf,
    pub frame_path: PathBuf,
}

impl TurnLogPaths {
    pub fn new(root: &Path, game_id: &str, turn: u32) -> Self {
        let dir = root.join(game_id).join(turn.to_string());
        Self {
            request_path: dir.join("request.json"),
            decision_path: dir.join("decision.json"),
            frame_path: dir.join("frame.json"),
            dir,
        }
    }
}

/// What was sent to the decision-maker.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDump<'a> {
    pub game_id: &'a str,
    pub turn: u32,
    pub history_items: usize,
    pub prompt: &'a str,
    pub has_image: bool,
    pub schema: Value,
}

/// The decision as submitted, with the raw reply it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionDump<'a> {
    pub decision: &'a Decision,
    pub fallback: Option<String>,
    pub coordinates_sanitized: bool,
    pub raw_arguments: Option<&'a Value>,
    pub call_id: Option<&'a str>,
    pub usage: Usage,
}

pub struct TurnWriteRequest<'a> {
    pub root: &'a Path,
    pub game_id: &'a str,
    pub turn: u32,
    pub request: &'a RequestDump<'a>,
    pub decision: &'a DecisionDump<'a>,
    pub frame: &'a Frame,
}

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    written_at: String,
    #[serde(flatten)]
    body: &'a T,
}

pub fn write_turn(request: &TurnWriteRequest<'_>) -> Result<TurnLogPaths> {
    let paths = TurnLogPaths::new(request.root, request.game_id, request.turn);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn log dir {}", paths.dir.display()))?;

    // Fixed order: request, decision, frame.
    write_json(&paths.request_path, request.request)?;
    write_json(&paths.decision_path, request.decision)?;
    write_json(&paths.frame_path, request.frame)?;

    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let stamped = Stamped {
        written_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        body: value,
    };
    let mut buf = serde_json::to_string_pretty(&stamped)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::ActionChoice;
    use crate::core::types::{GameAction, GameState};
    use serde_json::json;

    #[test]
    fn turn_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TurnLogPaths::new(temp.path(), "ls20", 3);

        assert!(paths.dir.ends_with(Path::new("ls20/3")));
        assert!(paths.request_path.ends_with("request.json"));
        assert!(paths.decision_path.ends_with("decision.json"));
        assert!(paths.frame_path.ends_with("frame.json"));
    }

    #[test]
    fn writes_all_three_dumps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let decision = Decision {
            choice: ActionChoice::Simple {
                action: GameAction::Action2,
            },
            reason: "move".to_string(),
            short_description: "down".to_string(),
            hypothesis: String::new(),
            aggregated_findings: String::new(),
        };
        let arguments = json!({ "action": "ACTION2" });
        let frame = Frame {
            game_id: "ls20".to_string(),
            layers: Vec::new(),
            state: GameState::Playing,
            score: 0,
            win_score: 1,
            guid: Some("g-1".to_string()),
            full_reset: false,
            available_actions: vec![1, 2],
        };

        let paths = write_turn(&TurnWriteRequest {
            root: temp.path(),
            game_id: "ls20",
            turn: 1,
            request: &RequestDump {
                game_id: "ls20",
                turn: 1,
                history_items: 0,
                prompt: "Turn 1",
                has_image: false,
                schema: json!({}),
            },
            decision: &DecisionDump {
                decision: &decision,
                fallback: None,
                coordinates_sanitized: false,
                raw_arguments: Some(&arguments),
                call_id: Some("call-1"),
                usage: Usage::default(),
            },
            frame: &frame,
        })
        .expect("write dumps");

        assert!(paths.request_path.is_file());
        let written: Value =
            serde_json::from_str(&fs::read_to_string(&paths.decision_path).expect("read"))
                .expect("parse");
        assert_eq!(written["decision"]["choice"]["kind"], json!("simple"));
        assert_eq!(written["decision"]["choice"]["action"], json!("ACTION2"));
        assert!(written["written_at"].is_string());
        let frame_dump: Value =
            serde_json::from_str(&fs::read_to_string(&paths.frame_path).expect("read"))
                .expect("parse");
        assert_eq!(frame_dump["state"], json!("PLAYING"));
    }
}
