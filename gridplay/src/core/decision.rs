//! Interpretation of raw decision-maker output into a validated [`Decision`].
//!
//! Two recoveries happen here, never errors:
//!
//! - coordinates for the coordinate action are sanitized (clamped into range,
//!   `0` when missing or non-numeric) before validation;
//! - any other contract violation, including a missing action, turns the
//!   decision into a `RESET` fallback that the caller must log.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::schema::ActionSchema;
use crate::core::types::{COORDINATE_MAX, COORDINATE_MIN, GameAction};

/// The single action chosen for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionChoice {
    /// Any action without arguments (including `RESET`).
    Simple { action: GameAction },
    /// The coordinate action with its sanitized target.
    Coordinate { x: u8, y: u8 },
}

impl ActionChoice {
    pub fn action(&self) -> GameAction {
        match self {
            ActionChoice::Simple { action } => *action,
            ActionChoice::Coordinate { .. } => GameAction::Action6,
        }
    }

    pub fn coordinates(&self) -> Option<(u8, u8)> {
        match self {
            ActionChoice::Simple { .. } => None,
            ActionChoice::Coordinate { x, y } => Some((*x, *y)),
        }
    }
}

/// One completed, validated model decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub choice: ActionChoice,
    pub reason: String,
    pub short_description: String,
    pub hypothesis: String,
    pub aggregated_findings: String,
}

impl Decision {
    fn reset_fallback(why: &str) -> Self {
        Self {
            choice: ActionChoice::Simple {
                action: GameAction::Reset,
            },
            reason: format!("fallback: {why}"),
            short_description: "reset (fallback)".to_string(),
            hypothesis: String::new(),
            aggregated_findings: String::new(),
        }
    }

    /// Reasoning metadata attached to the game submission.
    pub fn reasoning(&self) -> Value {
        json!({
            "reason": self.reason,
            "short_description": self.short_description,
            "hypothesis": self.hypothesis,
            "aggregated_findings": self.aggregated_findings,
        })
    }
}

/// Why a decision was replaced by the `RESET` fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The decision-maker produced no action at all.
    MissingAction,
    /// The response did not conform to the decision contract.
    SchemaViolation(Vec<String>),
}

impl FallbackReason {
    pub fn describe(&self) -> String {
        match self {
            FallbackReason::MissingAction => "no action in decision output".to_string(),
            FallbackReason::SchemaViolation(errors) => {
                format!("decision violated contract: {}", errors.join("; "))
            }
        }
    }
}

/// Result of interpreting one decision-maker response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub decision: Decision,
    /// Set when `decision` is the `RESET` fallback.
    pub fallback: Option<FallbackReason>,
    /// Set when coordinates had to be clamped or substituted.
    pub coordinates_sanitized: bool,
}

/// Clamp a raw coordinate into `COORDINATE_MIN..=COORDINATE_MAX`.
pub fn clamp_coordinate(raw: i64) -> u8 {
    // Bounds fit in u8.
    raw.clamp(COORDINATE_MIN, COORDINATE_MAX) as u8
}

/// Sanitize one coordinate value; returns the value and whether it changed.
fn sanitize_coordinate(value: Option<&Value>) -> (u8, bool) {
    match value {
        Some(Value::Number(number)) => {
            if let Some(raw) = number.as_i64() {
                let clamped = clamp_coordinate(raw);
                (clamped, i64::from(clamped) != raw)
            } else if let Some(raw) = number.as_f64() {
                // Saturating cast; NaN becomes 0.
                (clamp_coordinate(raw as i64), true)
            } else {
                (0, true)
            }
        }
        _ => (0, true),
    }
}

/// Turn the decision-maker's arguments into a validated decision.
///
/// `Err` is reserved for failures to compile the contract itself; every
/// problem with the response is recovered into the `RESET` fallback.
pub fn interpret(schema: &ActionSchema, arguments: Option<&Value>) -> Result<Interpretation> {
    let Some(Value::Object(raw)) = arguments else {
        return Ok(fallback(FallbackReason::MissingAction));
    };
    let Some(action_name) = raw.get("action").and_then(Value::as_str) else {
        return Ok(fallback(FallbackReason::MissingAction));
    };

    let mut instance = raw.clone();
    let mut coordinates_sanitized = false;
    let chose_coordinate_action = action_name == GameAction::Action6.as_str();
    if chose_coordinate_action && schema.has_coordinates() {
        let (x, x_changed) = sanitize_coordinate(raw.get("x"));
        let (y, y_changed) = sanitize_coordinate(raw.get("y"));
        instance.insert("x".to_string(), json!(x));
        instance.insert("y".to_string(), json!(y));
        coordinates_sanitized = x_changed || y_changed;
    }

    let instance = Value::Object(instance);
    let violations = schema.violations(&instance)?;
    if !violations.is_empty() {
        return Ok(fallback(FallbackReason::SchemaViolation(violations)));
    }

    let action: GameAction = match action_name.parse() {
        Ok(action) => action,
        Err(err) => {
            return Ok(fallback(FallbackReason::SchemaViolation(vec![err.to_string()])));
        }
    };
    let choice = if action.is_coordinate() {
        ActionChoice::Coordinate {
            x: coordinate_field(&instance, "x"),
            y: coordinate_field(&instance, "y"),
        }
    } else {
        ActionChoice::Simple { action }
    };

    Ok(Interpretation {
        decision: Decision {
            choice,
            reason: text_field(&instance, "reason"),
            short_description: text_field(&instance, "short_description"),
            hypothesis: text_field(&instance, "hypothesis"),
            aggregated_findings: text_field(&instance, "aggregated_findings"),
        },
        fallback: None,
        coordinates_sanitized,
    })
}

fn fallback(reason: FallbackReason) -> Interpretation {
    Interpretation {
        decision: Decision::reset_fallback(&reason.describe()),
        fallback: Some(reason),
        coordinates_sanitized: false,
    }
}

fn text_field(instance: &Value, key: &str) -> String {
    instance
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn coordinate_field(instance: &Value, key: &str) -> u8 {
    instance
        .get(key)
        .and_then(Value::as_i64)
        .map(clamp_coordinate)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_click() -> ActionSchema {
        ActionSchema::new(&[GameAction::Action1, GameAction::Action6])
    }

    fn args(action: &str, x: Value, y: Value) -> Value {
        json!({
            "reason": "probe the top-left tile",
            "short_description": "click tile",
            "hypothesis": "tiles toggle colour",
            "aggregated_findings": "clicking changes one cell",
            "action": action,
            "x": x,
            "y": y
        })
    }

    #[test]
    fn clamping_law_holds_for_in_and_out_of_range_values() {
        for raw in [-1000, -1, 0, 1, 31, 63, 64, 70, 10_000] {
            let clamped = i64::from(clamp_coordinate(raw));
            assert!((COORDINATE_MIN..=COORDINATE_MAX).contains(&clamped));
            if (COORDINATE_MIN..=COORDINATE_MAX).contains(&raw) {
                assert_eq!(clamped, raw);
            }
        }
    }

    #[test]
    fn out_of_range_coordinates_are_clamped() {
        let interpretation = interpret(&with_click(), Some(&args("ACTION6", json!(70), json!(-1))))
            .expect("interpret");
        assert_eq!(interpretation.fallback, None);
        assert!(interpretation.coordinates_sanitized);
        assert_eq!(
            interpretation.decision.choice,
            ActionChoice::Coordinate { x: 63, y: 0 }
        );
    }

    #[test]
    fn missing_or_garbage_coordinates_become_origin() {
        let interpretation =
            interpret(&with_click(), Some(&args("ACTION6", Value::Null, json!("top"))))
                .expect("interpret");
        assert_eq!(interpretation.fallback, None);
        assert_eq!(
            interpretation.decision.choice,
            ActionChoice::Coordinate { x: 0, y: 0 }
        );
    }

    #[test]
    fn in_range_coordinates_pass_through_unchanged() {
        let interpretation = interpret(&with_click(), Some(&args("ACTION6", json!(12), json!(40))))
            .expect("interpret");
        assert!(!interpretation.coordinates_sanitized);
        assert_eq!(interpretation.decision.choice.coordinates(), Some((12, 40)));
        assert_eq!(interpretation.decision.short_description, "click tile");
    }

    #[test]
    fn simple_action_carries_no_coordinates() {
        let interpretation =
            interpret(&with_click(), Some(&args("ACTION1", Value::Null, Value::Null)))
                .expect("interpret");
        assert_eq!(
            interpretation.decision.choice,
            ActionChoice::Simple {
                action: GameAction::Action1
            }
        );
        assert_eq!(interpretation.decision.choice.coordinates(), None);
    }

    #[test]
    fn missing_action_falls_back_to_reset() {
        let interpretation = interpret(&with_click(), None).expect("interpret");
        assert_eq!(interpretation.fallback, Some(FallbackReason::MissingAction));
        assert_eq!(interpretation.decision.choice.action(), GameAction::Reset);

        let no_action = json!({ "reason": "thinking" });
        let interpretation = interpret(&with_click(), Some(&no_action)).expect("interpret");
        assert_eq!(interpretation.fallback, Some(FallbackReason::MissingAction));
    }

    #[test]
    fn unpermitted_action_falls_back_to_reset() {
        let schema = ActionSchema::new(&[GameAction::Action1]);
        let raw = json!({
            "reason": "try something",
            "short_description": "act",
            "hypothesis": "",
            "aggregated_findings": "",
            "action": "ACTION3"
        });
        let interpretation = interpret(&schema, Some(&raw)).expect("interpret");
        assert!(matches!(
            interpretation.fallback,
            Some(FallbackReason::SchemaViolation(_))
        ));
        assert_eq!(interpretation.decision.choice.action(), GameAction::Reset);
        assert!(interpretation.decision.reason.starts_with("fallback:"));
    }
}
