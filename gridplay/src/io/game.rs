//! Game backend client.
//!
//! The [`GameClient`] trait decouples the session loop from the HTTP backend.
//! Tests use scripted games that return predetermined frames.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::core::decision::ActionChoice;
use crate::core::types::{Frame, GameAction};

/// Parameters for the unconditional `RESET` that starts a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    pub game_id: String,
    pub card_id: Option<String>,
}

/// Parameters for one submitted action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub game_id: String,
    pub card_id: Option<String>,
    /// Session token from the latest frame, once established.
    pub guid: Option<String>,
    pub choice: ActionChoice,
    /// Justification metadata recorded by the backend alongside the action.
    pub reasoning: Option<Value>,
}

/// Abstraction over game backends.
pub trait GameClient {
    fn reset(&self, request: &ResetRequest) -> Result<Frame>;
    fn submit(&self, request: &ActionRequest) -> Result<Frame>;
}

/// Backend-side bookkeeping for one run.
pub trait ScorecardClient {
    /// Open a scorecard and return its id.
    fn open_scorecard(&self, tags: &[String]) -> Result<String>;
    fn close_scorecard(&self, card_id: &str) -> Result<()>;
}

/// A game listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Blocking HTTP client for the game backend.
pub struct HttpGameClient {
    client: Client,
    base_url: String,
}

impl HttpGameClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key).context("invalid API key header")?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("build game http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip_all)]
    pub fn list_games(&self) -> Result<Vec<GameInfo>> {
        let url = format!("{}/api/games", self.base_url);
        let response = self.client.get(&url).send().context("GET /api/games")?;
        let body = read_json(response, "list games")?;
        serde_json::from_value(body).context("parse game list")
    }

    fn post_command(&self, action: GameAction, body: &Value) -> Result<Frame> {
        let url = format!("{}/api/cmd/{}", self.base_url, action.as_str());
        debug!(%url, "posting game command");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("POST /api/cmd/{action}"))?;
        let body = read_json(response, action.as_str())?;
        parse_frame(body)
    }
}

impl GameClient for HttpGameClient {
    #[instrument(skip_all, fields(game_id = %request.game_id))]
    fn reset(&self, request: &ResetRequest) -> Result<Frame> {
        self.post_command(GameAction::Reset, &reset_body(request))
    }

    #[instrument(skip_all, fields(game_id = %request.game_id, action = %request.choice.action()))]
    fn submit(&self, request: &ActionRequest) -> Result<Frame> {
        self.post_command(request.choice.action(), &action_body(request))
    }
}

impl ScorecardClient for HttpGameClient {
    #[instrument(skip_all)]
    fn open_scorecard(&self, tags: &[String]) -> Result<String> {
        let url = format!("{}/api/scorecard/open", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "tags": tags }))
            .send()
            .context("POST /api/scorecard/open")?;
        let body = read_json(response, "open scorecard")?;
        body.get("card_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("scorecard response has no card_id: {body}"))
    }

    #[instrument(skip_all, fields(card_id = %card_id))]
    fn close_scorecard(&self, card_id: &str) -> Result<()> {
        let url = format!("{}/api/scorecard/close", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "card_id": card_id }))
            .send()
            .context("POST /api/scorecard/close")?;
        read_json(response, "close scorecard")?;
        Ok(())
    }
}

/// Read a JSON body, treating non-2xx statuses and `{"error": ...}` bodies as failures.
fn read_json(response: Response, what: &str) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .with_context(|| format!("{what}: read response body"))?;
    if !status.is_success() {
        bail!("{what}: backend returned {status}: {}", text.trim());
    }
    let body: Value =
        serde_json::from_str(&text).with_context(|| format!("{what}: parse response body"))?;
    if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
        bail!("{what}: backend error: {error}");
    }
    Ok(body)
}

fn reset_body(request: &ResetRequest) -> Value {
    let mut body = Map::new();
    body.insert("game_id".to_string(), json!(request.game_id));
    if let Some(card_id) = &request.card_id {
        body.insert("card_id".to_string(), json!(card_id));
    }
    Value::Object(body)
}

fn action_body(request: &ActionRequest) -> Value {
    let mut body = Map::new();
    body.insert("game_id".to_string(), json!(request.game_id));
    if let Some(card_id) = &request.card_id {
        body.insert("card_id".to_string(), json!(card_id));
    }
    if let Some(guid) = &request.guid {
        body.insert("guid".to_string(), json!(guid));
    }
    if let Some((x, y)) = request.choice.coordinates() {
        body.insert("x".to_string(), json!(x));
        body.insert("y".to_string(), json!(y));
    }
    if let Some(reasoning) = &request.reasoning {
        body.insert("reasoning".to_string(), reasoning.clone());
    }
    Value::Object(body)
}

fn parse_frame(body: Value) -> Result<Frame> {
    serde_json::from_value(body).context("parse frame")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GameState;

    fn request(choice: ActionChoice) -> ActionRequest {
        ActionRequest {
            game_id: "ls20".to_string(),
            card_id: Some("card-1".to_string()),
            guid: Some("g-1".to_string()),
            choice,
            reasoning: Some(json!({ "reason": "probe" })),
        }
    }

    #[test]
    fn reset_body_carries_scorecard_but_no_guid() {
        let body = reset_body(&ResetRequest {
            game_id: "ls20".to_string(),
            card_id: Some("card-1".to_string()),
        });
        assert_eq!(body, json!({ "game_id": "ls20", "card_id": "card-1" }));
    }

    #[test]
    fn coordinate_action_body_includes_x_and_y() {
        let body = action_body(&request(ActionChoice::Coordinate { x: 63, y: 0 }));
        assert_eq!(body["x"], json!(63));
        assert_eq!(body["y"], json!(0));
        assert_eq!(body["guid"], json!("g-1"));
        assert_eq!(body["reasoning"]["reason"], json!("probe"));
    }

    #[test]
    fn simple_action_body_omits_coordinates_and_missing_guid() {
        let mut req = request(ActionChoice::Simple {
            action: GameAction::Action2,
        });
        req.guid = None;
        req.reasoning = None;
        let body = action_body(&req);
        assert!(body.get("x").is_none());
        assert!(body.get("y").is_none());
        assert!(body.get("guid").is_none());
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn parses_backend_frame() {
        let frame = parse_frame(json!({
            "game_id": "ls20",
            "guid": "g-2",
            "frame": [[[0, 1], [1, 0]]],
            "state": "WIN",
            "score": 3,
            "win_score": 3,
            "available_actions": [1, 2]
        }))
        .expect("frame");
        assert_eq!(frame.state, GameState::Win);
        assert_eq!(frame.guid.as_deref(), Some("g-2"));
    }

    #[test]
    fn frame_without_state_is_rejected() {
        assert!(parse_frame(json!({ "game_id": "ls20" })).is_err());
    }
}
