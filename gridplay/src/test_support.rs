//! Scripted collaborators and frame builders for session tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::state::Usage;
use crate::core::types::{Frame, GameAction, GameState};
use crate::core::window::WindowItem;
use crate::io::decider::{DecisionClient, DecisionRequest, DecisionResponse};
use crate::io::game::{ActionRequest, GameClient, ResetRequest, ScorecardClient};

/// Create a deterministic 2x2 frame with the four directional actions permitted.
pub fn frame(state: GameState, score: u32) -> Frame {
    Frame {
        game_id: "test".to_string(),
        layers: vec![vec![vec![0, 1], vec![2, 3]]],
        state,
        score,
        win_score: 5,
        guid: Some("guid-1".to_string()),
        full_reset: false,
        available_actions: vec![1, 2, 3, 4],
    }
}

/// A frame with an explicit permitted-action list.
pub fn frame_with_actions(state: GameState, score: u32, actions: &[GameAction]) -> Frame {
    Frame {
        available_actions: actions.iter().map(|action| action.id()).collect(),
        ..frame(state, score)
    }
}

/// A frame flagged as a backend-initiated full reset.
pub fn full_reset_frame(score: u32) -> Frame {
    Frame {
        full_reset: true,
        ..frame(GameState::Playing, score)
    }
}

/// Valid tool arguments for a simple action when the coordinate action is not permitted.
pub fn action_args(action: &str) -> Value {
    json!({
        "reason": format!("try {action}"),
        "short_description": action,
        "hypothesis": "",
        "aggregated_findings": "",
        "action": action
    })
}

/// Valid tool arguments for a simple action when `x`/`y` are part of the contract.
pub fn action_args_with_null_xy(action: &str) -> Value {
    let mut args = action_args(action);
    args["x"] = Value::Null;
    args["y"] = Value::Null;
    args
}

/// Tool arguments for the coordinate action with raw (unsanitized) coordinates.
pub fn coordinate_args(x: Value, y: Value) -> Value {
    json!({
        "reason": "click a cell",
        "short_description": "click",
        "hypothesis": "",
        "aggregated_findings": "",
        "action": "ACTION6",
        "x": x,
        "y": y
    })
}

/// One scripted decision-maker reply.
#[derive(Debug, Clone)]
pub enum ScriptedDecision {
    Arguments(Value),
    /// A reply that carries no tool call.
    NoAction,
    TransportError(String),
}

/// What a scripted decider saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub turn: u32,
    /// Completed turns visible in the window.
    pub history_turns: usize,
    pub history_items: usize,
    pub permitted: Vec<GameAction>,
    pub prompt: String,
    pub has_image: bool,
}

/// Decision client that replays a fixed script and records every request.
pub struct ScriptedDecider {
    script: RefCell<VecDeque<ScriptedDecision>>,
    seen: RefCell<Vec<SeenRequest>>,
}

impl ScriptedDecider {
    pub fn new(script: Vec<ScriptedDecision>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.borrow().clone()
    }

    pub fn assert_drained(&self) {
        let remaining = self.script.borrow().len();
        assert_eq!(remaining, 0, "{remaining} scripted decisions were never requested");
    }
}

impl DecisionClient for ScriptedDecider {
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionResponse> {
        let history_turns = request
            .history
            .iter()
            .filter(|item| matches!(item, WindowItem::Prompt(_)))
            .count();
        self.seen.borrow_mut().push(SeenRequest {
            turn: request.turn,
            history_turns,
            history_items: request.history.len(),
            permitted: request.schema.actions().to_vec(),
            prompt: request.prompt.text.clone(),
            has_image: request.prompt.image.is_some(),
        });

        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted decider exhausted at turn {}", request.turn))?;
        let call_id = format!("call-{}", request.turn);
        match next {
            ScriptedDecision::Arguments(arguments) => Ok(DecisionResponse {
                output_items: vec![json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": "take_action",
                    "arguments": arguments.to_string(),
                })],
                arguments: Some(arguments),
                call_id: Some(call_id),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 2,
                    reasoning_tokens: 1,
                    total_tokens: 12,
                },
            }),
            ScriptedDecision::NoAction => Ok(DecisionResponse {
                output_items: vec![json!({ "type": "message", "content": [] })],
                ..DecisionResponse::default()
            }),
            ScriptedDecision::TransportError(message) => Err(anyhow!(message)),
        }
    }
}

/// Game and scorecard backend that replays scripted frames and records every call.
pub struct ScriptedGame {
    reset_frame: RefCell<Option<Frame>>,
    frames: RefCell<VecDeque<Frame>>,
    submit_error: Option<String>,
    close_error: Option<String>,
    resets: RefCell<Vec<ResetRequest>>,
    submissions: RefCell<Vec<ActionRequest>>,
    closed: RefCell<Vec<String>>,
}

impl ScriptedGame {
    pub const CARD_ID: &'static str = "card-test";

    /// `reset` answers the opening `RESET`; `frames` answer submissions in order.
    pub fn new(reset: Frame, frames: Vec<Frame>) -> Self {
        Self {
            reset_frame: RefCell::new(Some(reset)),
            frames: RefCell::new(frames.into()),
            submit_error: None,
            close_error: None,
            resets: RefCell::new(Vec::new()),
            submissions: RefCell::new(Vec::new()),
            closed: RefCell::new(Vec::new()),
        }
    }

    /// Fail every submission once the scripted frames run out.
    pub fn with_submit_error(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }

    pub fn with_close_error(mut self, message: &str) -> Self {
        self.close_error = Some(message.to_string());
        self
    }

    pub fn resets(&self) -> Vec<ResetRequest> {
        self.resets.borrow().clone()
    }

    pub fn submissions(&self) -> Vec<ActionRequest> {
        self.submissions.borrow().clone()
    }

    pub fn submitted_actions(&self) -> Vec<GameAction> {
        self.submissions
            .borrow()
            .iter()
            .map(|request| request.choice.action())
            .collect()
    }

    pub fn closed_scorecards(&self) -> Vec<String> {
        self.closed.borrow().clone()
    }

    pub fn assert_drained(&self) {
        let remaining = self.frames.borrow().len();
        assert_eq!(remaining, 0, "{remaining} scripted frames were never requested");
    }
}

impl GameClient for ScriptedGame {
    fn reset(&self, request: &ResetRequest) -> Result<Frame> {
        self.resets.borrow_mut().push(request.clone());
        self.reset_frame
            .borrow_mut()
            .take()
            .ok_or_else(|| anyhow!("scripted game was reset twice"))
    }

    fn submit(&self, request: &ActionRequest) -> Result<Frame> {
        self.submissions.borrow_mut().push(request.clone());
        if let Some(frame) = self.frames.borrow_mut().pop_front() {
            return Ok(frame);
        }
        match &self.submit_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Err(anyhow!("scripted game has no frame for submission")),
        }
    }
}

impl ScorecardClient for ScriptedGame {
    fn open_scorecard(&self, _tags: &[String]) -> Result<String> {
        Ok(Self::CARD_ID.to_string())
    }

    fn close_scorecard(&self, card_id: &str) -> Result<()> {
        self.closed.borrow_mut().push(card_id.to_string());
        match &self.close_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}
