//! Decision backend speaking the Responses API with a strict function tool.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use crate::core::schema::TOOL_NAME;
use crate::core::state::Usage;
use crate::core::window::{PromptContent, TurnOutcome, WindowItem};
use crate::io::decider::{DecisionClient, DecisionRequest, DecisionResponse};

/// Output item types that can be replayed as input on later turns.
const REPLAYABLE_OUTPUT_TYPES: [&str; 2] = ["function_call", "message"];

/// Blocking client for `POST {base}/responses`.
pub struct ResponsesClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    reasoning_effort: Option<String>,
}

impl ResponsesClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        reasoning_effort: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build responses http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/responses", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            reasoning_effort,
        })
    }

    /// Request body for one decision.
    pub fn payload(&self, request: &DecisionRequest<'_>) -> Value {
        let mut input: Vec<Value> = request.history.iter().map(input_item).collect();
        input.push(prompt_message(request.prompt));

        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert("instructions".to_string(), json!(request.instructions));
        body.insert("input".to_string(), Value::Array(input));
        body.insert(
            "tools".to_string(),
            json!([{
                "type": "function",
                "name": TOOL_NAME,
                "description": "Submit exactly one action for this turn.",
                "strict": true,
                "parameters": request.schema.model_schema(),
            }]),
        );
        body.insert("tool_choice".to_string(), json!("required"));
        body.insert("parallel_tool_calls".to_string(), json!(false));
        body.insert("store".to_string(), json!(false));
        if let Some(effort) = &self.reasoning_effort {
            body.insert("reasoning".to_string(), json!({ "effort": effort }));
        }
        Value::Object(body)
    }
}

impl DecisionClient for ResponsesClient {
    #[instrument(skip_all, fields(model = %self.model, turn = request.turn))]
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionResponse> {
        let payload = self.payload(request);
        debug!(input_items = request.history.len() + 1, "calling responses api");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .context("POST /responses")?;
        let status = response.status();
        let text = response.text().context("read responses body")?;
        if !status.is_success() {
            bail!("responses api returned {status}: {}", text.trim());
        }
        let body: Value = serde_json::from_str(&text).context("parse responses body")?;
        let decision = parse_response(&body)?;
        info!(
            total_tokens = decision.usage.total_tokens,
            has_action = decision.arguments.is_some(),
            "responses api replied"
        );
        Ok(decision)
    }
}

/// Extract the tool call, replayable output items and usage from a response body.
pub fn parse_response(body: &Value) -> Result<DecisionResponse> {
    if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
        bail!("responses api error: {error}");
    }
    let output = body
        .get("output")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let call = output.iter().find(|item| {
        item.get("type").and_then(Value::as_str) == Some("function_call")
            && item.get("name").and_then(Value::as_str) == Some(TOOL_NAME)
    });
    let call_id = call
        .and_then(|item| item.get("call_id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    // Arguments arrive as a JSON-encoded string; unparseable arguments count as no action.
    let arguments = call
        .and_then(|item| item.get("arguments"))
        .and_then(|raw| match raw {
            Value::String(encoded) => serde_json::from_str(encoded).ok(),
            Value::Object(_) => Some(raw.clone()),
            _ => None,
        });

    let output_items = output
        .into_iter()
        .filter(|item| {
            item.get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| REPLAYABLE_OUTPUT_TYPES.contains(&kind))
        })
        .collect();

    Ok(DecisionResponse {
        arguments,
        call_id,
        output_items,
        usage: parse_usage(body.get("usage")),
    })
}

fn parse_usage(usage: Option<&Value>) -> Usage {
    let Some(usage) = usage else {
        return Usage::default();
    };
    let count = |value: Option<&Value>| value.and_then(Value::as_u64).unwrap_or(0);
    Usage {
        input_tokens: count(usage.get("input_tokens")),
        output_tokens: count(usage.get("output_tokens")),
        reasoning_tokens: count(usage.pointer("/output_tokens_details/reasoning_tokens")),
        total_tokens: count(usage.get("total_tokens")),
    }
}

fn prompt_message(prompt: &PromptContent) -> Value {
    let mut content = vec![json!({ "type": "input_text", "text": prompt.text })];
    if let Some(image) = &prompt.image {
        content.push(json!({ "type": "input_image", "image_url": image.data_url }));
    }
    json!({ "role": "user", "content": content })
}

fn outcome_item(outcome: &TurnOutcome) -> Value {
    let Some(call_id) = &outcome.call_id else {
        return json!({
            "role": "user",
            "content": [{ "type": "input_text", "text": format!("Outcome: {}", outcome.summary) }],
        });
    };
    let output = serde_json::to_string(outcome).unwrap_or_else(|_| outcome.summary.clone());
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": output,
    })
}

fn input_item(item: &WindowItem<'_>) -> Value {
    match item {
        WindowItem::Prompt(prompt) => prompt_message(prompt),
        WindowItem::Output(value) => (*value).clone(),
        WindowItem::Outcome(outcome) => outcome_item(outcome),
    }
}
