//! Bounded, ordered history of completed turns.
//!
//! The window is a fixed-capacity FIFO over [`TurnRecord`]s: appending past the
//! cap evicts the oldest record. Flattening yields each turn's prompt, then its
//! raw decision output, then its outcome, in chronological order.

use std::collections::VecDeque;
use std::iter;

use serde::Serialize;
use serde_json::Value;

use crate::core::decision::ActionChoice;
use crate::core::types::{Frame, GameState, ImagePayload};

/// Prompt content sent to the decision-maker for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContent {
    pub text: String,
    pub image: Option<ImagePayload>,
}

/// What happened when the chosen action was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Correlates the outcome with the decision-maker's tool call, when it issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub status: GameState,
    pub action: ActionChoice,
    pub score: u32,
    pub summary: String,
}

impl TurnOutcome {
    pub fn from_frame(call_id: Option<String>, action: ActionChoice, frame: &Frame) -> Self {
        let mut summary = format!(
            "{} submitted; score {}/{}; state {}",
            action.action(),
            frame.score,
            frame.win_score,
            frame.state
        );
        if frame.full_reset {
            summary.push_str("; the game performed a full reset");
        }
        Self {
            call_id,
            status: frame.state,
            action,
            score: frame.score,
            summary,
        }
    }
}

/// One decided-and-submitted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub prompt: PromptContent,
    /// Raw output items returned by the decision-maker.
    pub output: Vec<Value>,
    pub outcome: TurnOutcome,
}

impl TurnRecord {
    /// This turn's items in their fixed order: prompt, outputs, outcome.
    pub fn items(&self) -> impl Iterator<Item = WindowItem<'_>> {
        iter::once(WindowItem::Prompt(&self.prompt))
            .chain(self.output.iter().map(WindowItem::Output))
            .chain(iter::once(WindowItem::Outcome(&self.outcome)))
    }
}

/// A borrowed element of a flattened window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowItem<'a> {
    Prompt(&'a PromptContent),
    Output(&'a Value),
    Outcome(&'a TurnOutcome),
}

/// Fixed-capacity FIFO of turn records.
#[derive(Debug, Clone)]
pub struct TurnWindow {
    cap: usize,
    turns: VecDeque<TurnRecord>,
}

impl TurnWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            turns: VecDeque::with_capacity(cap),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a completed turn, evicting the oldest records beyond the cap.
    pub fn append(&mut self, turn: TurnRecord) {
        self.turns.push_back(turn);
        while self.turns.len() > self.cap {
            self.turns.pop_front();
        }
    }

    /// Drop all history. Used when the game restarted underneath the agent.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TurnRecord> {
        self.turns.iter()
    }

    /// All turns' items in chronological order.
    pub fn flatten(&self) -> impl Iterator<Item = WindowItem<'_>> {
        self.turns.iter().flat_map(|turn| turn.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GameAction;
    use serde_json::json;

    fn record(n: u32) -> TurnRecord {
        TurnRecord {
            prompt: PromptContent {
                text: format!("prompt {n}"),
                image: None,
            },
            output: vec![json!({ "type": "function_call", "turn": n })],
            outcome: TurnOutcome {
                call_id: Some(format!("call-{n}")),
                status: GameState::Playing,
                action: ActionChoice::Simple {
                    action: GameAction::Action1,
                },
                score: n,
                summary: format!("outcome {n}"),
            },
        }
    }

    #[test]
    fn keeps_exactly_the_most_recent_records_in_order() {
        for cap in 1..=5usize {
            for n in cap..cap + 7 {
                let mut window = TurnWindow::new(cap);
                for turn in 0..n as u32 {
                    window.append(record(turn));
                    assert!(window.len() <= cap);
                }
                let scores: Vec<u32> = window.iter().map(|t| t.outcome.score).collect();
                let expected: Vec<u32> = ((n - cap) as u32..n as u32).collect();
                assert_eq!(scores, expected, "cap {cap}, turns {n}");
            }
        }
    }

    #[test]
    fn flatten_interleaves_prompt_output_outcome() {
        let mut window = TurnWindow::new(3);
        window.append(record(1));
        let mut second = record(2);
        second.output.push(json!({ "type": "reasoning" }));
        window.append(second);

        let kinds: Vec<&str> = window
            .flatten()
            .map(|item| match item {
                WindowItem::Prompt(_) => "prompt",
                WindowItem::Output(_) => "output",
                WindowItem::Outcome(_) => "outcome",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["prompt", "output", "outcome", "prompt", "output", "output", "outcome"]
        );

        let Some(WindowItem::Prompt(first)) = window.flatten().next() else {
            panic!("expected prompt first");
        };
        assert_eq!(first.text, "prompt 1");
    }

    #[test]
    fn clear_empties_the_window() {
        let mut window = TurnWindow::new(2);
        window.append(record(1));
        window.append(record(2));
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.flatten().count(), 0);
        assert_eq!(window.cap(), 2);
    }

    #[test]
    fn outcome_summary_mentions_full_reset() {
        let frame = Frame {
            game_id: "g".to_string(),
            layers: Vec::new(),
            state: GameState::Playing,
            score: 1,
            win_score: 3,
            guid: None,
            full_reset: true,
            available_actions: Vec::new(),
        };
        let outcome = TurnOutcome::from_frame(
            None,
            ActionChoice::Coordinate { x: 1, y: 2 },
            &frame,
        );
        assert_eq!(outcome.status, GameState::Playing);
        assert!(outcome.summary.starts_with("ACTION6 submitted; score 1/3"));
        assert!(outcome.summary.contains("full reset"));
    }
}
