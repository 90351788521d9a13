//! Decision-maker abstraction.
//!
//! The [`DecisionClient`] trait decouples the session loop from the reasoning
//! backend (the Responses API or `codex exec`). Tests use scripted deciders
//! that return predetermined arguments without network or processes.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::decision::{Interpretation, interpret};
use crate::core::schema::ActionSchema;
use crate::core::state::Usage;
use crate::core::window::{PromptContent, WindowItem};
use crate::io::codex::CodexDecisionClient;
use crate::io::config::{DecisionBackendKind, DecisionConfig, api_key_from_env};
use crate::io::responses::ResponsesClient;

/// Everything the decision-maker sees for one turn.
#[derive(Debug, Clone)]
pub struct DecisionRequest<'a> {
    pub game_id: &'a str,
    /// 1-indexed decision number within the session.
    pub turn: u32,
    pub instructions: &'a str,
    /// Flattened window, oldest first.
    pub history: Vec<WindowItem<'a>>,
    pub prompt: &'a PromptContent,
    pub schema: &'a ActionSchema,
}

/// Raw decision-maker reply before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionResponse {
    /// Tool-call arguments, or `None` when the backend produced no action.
    pub arguments: Option<Value>,
    /// Tool-call id to correlate the outcome with, when the backend issues one.
    pub call_id: Option<String>,
    /// Output items to replay in later turns.
    pub output_items: Vec<Value>,
    pub usage: Usage,
}

/// Abstraction over reasoning backends.
///
/// `Err` means the backend could not be reached or answered unusably at the
/// transport level; a reply without a valid action is still `Ok`.
pub trait DecisionClient {
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionResponse>;
}

/// A decided turn: the validated decision plus the raw reply it came from.
#[derive(Debug, Clone)]
pub struct DecidedTurn {
    pub interpretation: Interpretation,
    pub response: DecisionResponse,
}

/// Ask the decision-maker for one action and validate it against the schema.
#[instrument(
    skip_all,
    fields(game_id = request.game_id, turn = request.turn, history = request.history.len())
)]
pub fn decide_action<D: DecisionClient + ?Sized>(
    client: &D,
    request: &DecisionRequest<'_>,
) -> Result<DecidedTurn> {
    let response = client.decide(request)?;
    let interpretation = interpret(request.schema, response.arguments.as_ref())?;
    if let Some(reason) = &interpretation.fallback {
        warn!(reason = %reason.describe(), "decision unusable, falling back to RESET");
    }
    if interpretation.coordinates_sanitized {
        warn!(
            coordinates = ?interpretation.decision.choice.coordinates(),
            "coordinates sanitized into range"
        );
    }
    debug!(
        action = %interpretation.decision.choice.action(),
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "decision received"
    );
    Ok(DecidedTurn {
        interpretation,
        response,
    })
}

/// Backend selected by configuration.
pub enum DecisionBackend {
    Responses(ResponsesClient),
    Codex(CodexDecisionClient),
}

impl DecisionBackend {
    /// Build the configured backend. Only the Responses backend needs an API key.
    pub fn from_config(cfg: &DecisionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        match cfg.backend {
            DecisionBackendKind::Responses => Ok(DecisionBackend::Responses(ResponsesClient::new(
                &cfg.base_url,
                api_key_from_env(&cfg.api_key_env)?,
                &cfg.model,
                cfg.reasoning_effort.clone(),
                timeout,
            )?)),
            DecisionBackendKind::Codex => Ok(DecisionBackend::Codex(CodexDecisionClient::new(
                &cfg.model,
                cfg.reasoning_effort.clone(),
                cfg.work_dir.clone(),
                timeout,
                cfg.output_limit_bytes,
            )?)),
        }
    }
}

impl DecisionClient for DecisionBackend {
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionResponse> {
        match self {
            DecisionBackend::Responses(client) => client.decide(request),
            DecisionBackend::Codex(client) => client.decide(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GameAction;
    use anyhow::anyhow;
    use serde_json::json;

    struct FixedDecider {
        reply: Option<Value>,
        fail: bool,
    }

    impl DecisionClient for FixedDecider {
        fn decide(&self, _request: &DecisionRequest<'_>) -> Result<DecisionResponse> {
            if self.fail {
                return Err(anyhow!("connection reset"));
            }
            Ok(DecisionResponse {
                arguments: self.reply.clone(),
                call_id: Some("call-1".to_string()),
                output_items: Vec::new(),
                usage: Usage::default(),
            })
        }
    }

    fn prompt() -> PromptContent {
        PromptContent {
            text: "turn".to_string(),
            image: None,
        }
    }

    /// Verifies a valid reply is passed through with its call id.
    #[test]
    fn valid_reply_is_interpreted() {
        let schema = ActionSchema::new(&[GameAction::Action1, GameAction::Action2]);
        let prompt = prompt();
        let request = DecisionRequest {
            game_id: "ls20",
            turn: 1,
            instructions: "play",
            history: Vec::new(),
            prompt: &prompt,
            schema: &schema,
        };
        let decider = FixedDecider {
            reply: Some(json!({
                "reason": "move right",
                "short_description": "right",
                "hypothesis": "",
                "aggregated_findings": "",
                "action": "ACTION2"
            })),
            fail: false,
        };
        let turn = decide_action(&decider, &request).expect("decide");
        assert_eq!(turn.interpretation.decision.choice.action(), GameAction::Action2);
        assert_eq!(turn.response.call_id.as_deref(), Some("call-1"));
    }

    /// Verifies a reply without arguments becomes the RESET fallback, not an error.
    #[test]
    fn missing_arguments_fall_back() {
        let schema = ActionSchema::new(&[GameAction::Action1]);
        let prompt = prompt();
        let request = DecisionRequest {
            game_id: "ls20",
            turn: 1,
            instructions: "play",
            history: Vec::new(),
            prompt: &prompt,
            schema: &schema,
        };
        let decider = FixedDecider {
            reply: None,
            fail: false,
        };
        let turn = decide_action(&decider, &request).expect("decide");
        assert!(turn.interpretation.fallback.is_some());
        assert_eq!(turn.interpretation.decision.choice.action(), GameAction::Reset);
    }

    /// Verifies transport failures propagate unchanged.
    #[test]
    fn transport_errors_propagate() {
        let schema = ActionSchema::new(&[GameAction::Action1]);
        let prompt = prompt();
        let request = DecisionRequest {
            game_id: "ls20",
            turn: 1,
            instructions: "play",
            history: Vec::new(),
            prompt: &prompt,
            schema: &schema,
        };
        let decider = FixedDecider {
            reply: None,
            fail: true,
        };
        let err = decide_action(&decider, &request).expect_err("should fail");
        assert!(err.to_string().contains("connection reset"));
    }
}
