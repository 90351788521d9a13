//! Prompt rendering for decision requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::window::WindowItem;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const TRANSCRIPT_TEMPLATE: &str = include_str!("prompts/transcript.md");

/// Inputs for the per-turn prompt.
#[derive(Debug, Clone, Serialize)]
pub struct TurnPromptInputs {
    pub game_id: String,
    /// 1-indexed decision number within the session.
    pub turn: u32,
    pub state: String,
    pub score: u32,
    pub win_score: u32,
    pub full_reset: bool,
    pub actions: Vec<String>,
    /// Latest grid as text, if the frame carried one.
    pub grid: Option<String>,
    pub layers: usize,
}

/// One rendered entry of a text transcript.
#[derive(Debug, Clone, Serialize)]
struct TranscriptEntry {
    role: &'static str,
    body: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("turn", TURN_TEMPLATE)
            .context("load turn template")?;
        env.add_template("transcript", TRANSCRIPT_TEMPLATE)
            .context("load transcript template")?;
        Ok(Self { env })
    }

    /// System instructions for a game session.
    pub fn system_instructions(&self, game_id: &str) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! { game_id => game_id })?;
        Ok(rendered.trim().to_string())
    }

    pub fn turn_prompt(&self, inputs: &TurnPromptInputs) -> Result<String> {
        let template = self.env.get_template("turn")?;
        let rendered = template.render(context! {
            game_id => inputs.game_id,
            turn => inputs.turn,
            state => inputs.state,
            score => inputs.score,
            win_score => inputs.win_score,
            full_reset => inputs.full_reset,
            actions => inputs.actions,
            grid => inputs.grid.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            layers => inputs.layers,
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Flatten instructions, history and the current prompt into one text document.
    ///
    /// Used by backends that take a single prompt instead of structured input items.
    pub fn transcript(
        &self,
        instructions: &str,
        history: &[WindowItem<'_>],
        prompt: &str,
    ) -> Result<String> {
        let entries: Vec<TranscriptEntry> = history.iter().map(transcript_entry).collect();
        let template = self.env.get_template("transcript")?;
        let rendered = template.render(context! {
            instructions => instructions.trim(),
            history => entries,
            prompt => prompt.trim(),
        })?;
        Ok(rendered)
    }
}

fn transcript_entry(item: &WindowItem<'_>) -> TranscriptEntry {
    match item {
        WindowItem::Prompt(prompt) => TranscriptEntry {
            role: "Turn",
            body: prompt.text.trim().to_string(),
        },
        WindowItem::Output(value) => TranscriptEntry {
            role: "Your decision",
            body: value.to_string(),
        },
        WindowItem::Outcome(outcome) => TranscriptEntry {
            role: "Outcome",
            body: outcome.summary.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::ActionChoice;
    use crate::core::types::{GameAction, GameState};
    use crate::core::window::{PromptContent, TurnOutcome};
    use serde_json::json;

    fn inputs() -> TurnPromptInputs {
        TurnPromptInputs {
            game_id: "ls20".to_string(),
            turn: 3,
            state: "PLAYING".to_string(),
            score: 1,
            win_score: 4,
            full_reset: false,
            actions: vec!["ACTION1".to_string(), "RESET".to_string()],
            grid: Some("01\n23".to_string()),
            layers: 2,
        }
    }

    #[test]
    fn turn_prompt_lists_state_actions_and_grid() {
        let builder = PromptBuilder::new().expect("builder");
        let prompt = builder.turn_prompt(&inputs()).expect("render");
        assert!(prompt.starts_with("Turn 3 of `ls20`."));
        assert!(prompt.contains("Score: 1/4"));
        assert!(prompt.contains("Permitted actions: ACTION1, RESET."));
        assert!(prompt.contains("01\n23"));
        assert!(prompt.contains("2 layers"));
        assert!(!prompt.contains("full reset"));
    }

    #[test]
    fn turn_prompt_flags_full_reset_and_missing_grid() {
        let builder = PromptBuilder::new().expect("builder");
        let mut inputs = inputs();
        inputs.full_reset = true;
        inputs.grid = None;
        let prompt = builder.turn_prompt(&inputs).expect("render");
        assert!(prompt.contains("full reset"));
        assert!(prompt.contains("no grid"));
    }

    #[test]
    fn system_instructions_name_the_game() {
        let builder = PromptBuilder::new().expect("builder");
        let system = builder.system_instructions("ft09").expect("render");
        assert!(system.contains("`ft09`"));
        assert!(system.contains("take_action"));
    }

    #[test]
    fn transcript_keeps_history_order() {
        let builder = PromptBuilder::new().expect("builder");
        let prompt = PromptContent {
            text: "Turn 1 prompt".to_string(),
            image: None,
        };
        let output = json!({ "action": "ACTION1" });
        let outcome = TurnOutcome {
            call_id: None,
            status: GameState::Playing,
            action: ActionChoice::Simple {
                action: GameAction::Action1,
            },
            score: 0,
            summary: "ACTION1 submitted; score 0/4; state PLAYING".to_string(),
        };
        let history = vec![
            WindowItem::Prompt(&prompt),
            WindowItem::Output(&output),
            WindowItem::Outcome(&outcome),
        ];
        let text = builder
            .transcript("Play well.", &history, "Turn 2 prompt")
            .expect("render");

        let first = text.find("Turn 1 prompt").expect("prompt");
        let decision = text.find("\"action\":\"ACTION1\"").expect("decision");
        let result = text.find("ACTION1 submitted").expect("outcome");
        let current = text.find("Turn 2 prompt").expect("current");
        assert!(first < decision && decision < result && result < current);
        assert!(text.starts_with("# Instructions\n\nPlay well."));
    }

    #[test]
    fn transcript_without_history_skips_section() {
        let builder = PromptBuilder::new().expect("builder");
        let text = builder.transcript("Play.", &[], "Turn 1").expect("render");
        assert!(!text.contains("Previous turns"));
        assert!(text.contains("# Current turn\n\nTurn 1"));
    }
}
