//! Decision contract for a single turn.
//!
//! The contract is built from the actions the game currently permits and is
//! closed: unknown fields, unknown actions, and missing justification are all
//! rejected. It is rendered twice:
//!
//! - [`ActionSchema::model_schema`] is strict-mode compatible (every property
//!   required, coordinates nullable) and is what the decision-maker sees.
//! - [`ActionSchema::validation_schema`] adds the conditional rule that
//!   coordinates are non-null exactly when the coordinate action is chosen. It
//!   is compiled with `jsonschema` and applied to every response.

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde_json::{Map, Value, json};

use crate::core::types::{COORDINATE_MAX, COORDINATE_MIN, GameAction};

pub const REASON_MAX_CHARS: u64 = 1000;
pub const SHORT_DESCRIPTION_MAX_CHARS: u64 = 120;
pub const HYPOTHESIS_MAX_CHARS: u64 = 600;
pub const FINDINGS_MAX_CHARS: u64 = 2000;

/// Name of the function tool the decision-maker must call.
pub const TOOL_NAME: &str = "take_action";

/// Closed single-choice contract over the permitted actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSchema {
    actions: Vec<GameAction>,
}

impl ActionSchema {
    /// Build the contract for `permitted`; `RESET` is appended when absent.
    pub fn new(permitted: &[GameAction]) -> Self {
        let mut actions: Vec<GameAction> = Vec::with_capacity(permitted.len() + 1);
        for action in permitted {
            if !actions.contains(action) {
                actions.push(*action);
            }
        }
        if !actions.contains(&GameAction::Reset) {
            actions.push(GameAction::Reset);
        }
        Self { actions }
    }

    pub fn actions(&self) -> &[GameAction] {
        &self.actions
    }

    /// Whether the coordinate action is permitted (and `x`/`y` are part of the contract).
    pub fn has_coordinates(&self) -> bool {
        self.actions.iter().any(|action| action.is_coordinate())
    }

    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|action| action.as_str()).collect()
    }

    /// Strict-mode schema sent to the decision-maker.
    pub fn model_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "reason".to_string(),
            bounded_text(1, REASON_MAX_CHARS, "Why this action is the best next move."),
        );
        properties.insert(
            "short_description".to_string(),
            bounded_text(
                1,
                SHORT_DESCRIPTION_MAX_CHARS,
                "A few words describing the action, e.g. `move the block left`.",
            ),
        );
        properties.insert(
            "hypothesis".to_string(),
            bounded_text(
                0,
                HYPOTHESIS_MAX_CHARS,
                "Current hypothesis about the game rules this action tests.",
            ),
        );
        properties.insert(
            "aggregated_findings".to_string(),
            bounded_text(
                0,
                FINDINGS_MAX_CHARS,
                "Everything learned about the game so far, carried forward between turns.",
            ),
        );
        properties.insert(
            "action".to_string(),
            json!({
                "type": "string",
                "enum": self.action_names(),
                "description": "Exactly one of the permitted actions."
            }),
        );

        let mut required = vec![
            "reason",
            "short_description",
            "hypothesis",
            "aggregated_findings",
            "action",
        ];
        if self.has_coordinates() {
            properties.insert(
                "x".to_string(),
                coordinate("Column to target with ACTION6; null for any other action."),
            );
            properties.insert(
                "y".to_string(),
                coordinate("Row to target with ACTION6; null for any other action."),
            );
            required.extend(["x", "y"]);
        }

        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
            "additionalProperties": false
        })
    }

    /// Model schema plus the "coordinates iff coordinate action" rule.
    pub fn validation_schema(&self) -> Value {
        let mut schema = self.model_schema();
        if self.has_coordinates()
            && let Value::Object(root) = &mut schema
        {
            root.insert(
                "if".to_string(),
                json!({
                    "properties": { "action": { "const": GameAction::Action6.as_str() } }
                }),
            );
            root.insert(
                "then".to_string(),
                json!({
                    "properties": { "x": { "type": "integer" }, "y": { "type": "integer" } }
                }),
            );
            root.insert(
                "else".to_string(),
                json!({
                    "properties": { "x": { "type": "null" }, "y": { "type": "null" } }
                }),
            );
        }
        schema
    }

    /// Validate `instance` against [`Self::validation_schema`].
    ///
    /// Returns every violation; an empty list means the instance conforms.
    pub fn violations(&self, instance: &Value) -> Result<Vec<String>> {
        let schema = self.validation_schema();
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .context("compile decision schema")?;
        Ok(compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect())
    }
}

fn bounded_text(min: u64, max: u64, description: &str) -> Value {
    json!({
        "type": "string",
        "minLength": min,
        "maxLength": max,
        "description": description
    })
}

fn coordinate(description: &str) -> Value {
    json!({
        "type": ["integer", "null"],
        "minimum": COORDINATE_MIN,
        "maximum": COORDINATE_MAX,
        "description": description
    })
}
