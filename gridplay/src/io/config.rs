//! Player configuration stored as TOML (default `gridplay.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Player configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that play against the public backend. Secrets are never stored here:
/// `*_api_key_env` name the environment variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PlayerConfig {
    pub game: GameConfig,
    pub decision: DecisionConfig,
    pub session: SessionSettings,
    pub render: RenderConfig,
    pub logs: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    /// Backend root, e.g. `https://three.arcprize.org`.
    pub base_url: String,
    /// Environment variable holding the backend API key.
    pub api_key_env: String,
    /// Per-request timeout for game calls.
    pub timeout_secs: u64,
    /// Tags attached to the scorecard opened for a run.
    pub tags: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            base_url: "https://three.arcprize.org".to_string(),
            api_key_env: "ARC_API_KEY".to_string(),
            timeout_secs: 30,
            tags: vec!["gridplay".to_string()],
        }
    }
}

/// Which decision-maker backend to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionBackendKind {
    /// HTTP Responses API with a strict function tool.
    Responses,
    /// `codex exec --output-schema` subprocess.
    Codex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecisionConfig {
    pub backend: DecisionBackendKind,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Passed through as `reasoning.effort` when set.
    pub reasoning_effort: Option<String>,
    pub timeout_secs: u64,
    /// Truncate codex stdout/stderr captures beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Scratch directory for codex schema/image/output files.
    pub work_dir: PathBuf,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            backend: DecisionBackendKind::Responses,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "o4-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            reasoning_effort: Some("low".to_string()),
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            work_dir: PathBuf::from(".gridplay/codex"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSettings {
    /// Decisions allowed per game before the session stops.
    pub max_actions: u32,
    /// Completed turns kept as decision context.
    pub window_cap: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_actions: 80,
            window_cap: 10,
        }
    }
}

/// Largest accepted `render.scale`.
pub const MAX_RENDER_SCALE: u32 = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    /// Pixels per grid cell in rendered frames.
    pub scale: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { scale: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LogConfig {
    /// When set, per-turn request/decision/frame dumps are written here.
    pub turn_log_dir: Option<PathBuf>,
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.game.base_url.trim().is_empty() {
            return Err(anyhow!("game.base_url must be non-empty"));
        }
        if self.game.timeout_secs == 0 {
            return Err(anyhow!("game.timeout_secs must be > 0"));
        }
        if self.decision.model.trim().is_empty() {
            return Err(anyhow!("decision.model must be non-empty"));
        }
        if self.decision.timeout_secs == 0 {
            return Err(anyhow!("decision.timeout_secs must be > 0"));
        }
        if self.decision.output_limit_bytes == 0 {
            return Err(anyhow!("decision.output_limit_bytes must be > 0"));
        }
        if self.session.max_actions == 0 {
            return Err(anyhow!("session.max_actions must be > 0"));
        }
        if self.session.window_cap == 0 {
            return Err(anyhow!("session.window_cap must be > 0"));
        }
        if self.render.scale == 0 || self.render.scale > MAX_RENDER_SCALE {
            return Err(anyhow!("render.scale must be in 1..={MAX_RENDER_SCALE}"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlayerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlayerConfig> {
    if !path.exists() {
        let cfg = PlayerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlayerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlayerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Read a secret from the environment variable named by the config.
pub fn api_key_from_env(var: &str) -> Result<String> {
    let value = std::env::var(var).with_context(|| format!("read API key from ${var}"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("${var} is set but empty"));
    }
    Ok(value)
}
