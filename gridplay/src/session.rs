//! The per-game turn loop.
//!
//! One session resets the game, then repeats decide → submit → record until the
//! game is won, the action budget is spent, or an interrupt is observed between
//! turns. Any transport or rendering failure ends the session with a
//! [`SessionFailedError`] attached to the error chain.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::budget::ActionBudget;
use crate::core::decision::ActionChoice;
use crate::core::schema::ActionSchema;
use crate::core::state::{
    SessionPhase, SessionState, ShutdownFlag, Usage, after_reset, after_submit,
};
use crate::core::types::{Frame, GameState};
use crate::core::window::{PromptContent, TurnOutcome, TurnRecord, TurnWindow};
use crate::io::decider::{DecidedTurn, DecisionClient, DecisionRequest, decide_action};
use crate::io::game::{ActionRequest, GameClient, ResetRequest};
use crate::io::prompt::{PromptBuilder, TurnPromptInputs};
use crate::io::render::{Renderer, grid_to_text};
use crate::io::turn_log::{DecisionDump, RequestDump, TurnWriteRequest, write_turn};

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_actions: u32,
    pub window_cap: usize,
    /// Scorecard the session's actions are recorded against.
    pub card_id: Option<String>,
    pub turn_log_dir: Option<PathBuf>,
}

/// Collaborators a session drives.
pub struct SessionClients<'a, G: ?Sized, D: ?Sized, R: ?Sized> {
    pub game: &'a G,
    pub decider: &'a D,
    pub renderer: &'a R,
    pub prompts: &'a PromptBuilder,
}

/// Reason why `run_session` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStop {
    /// The game reported `WIN`.
    Won,
    /// `max_actions` decisions were submitted without a win.
    BudgetExceeded { actions: u32, max_actions: u32 },
    /// Shutdown was requested; observed between turns.
    Interrupted,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub game_id: String,
    pub guid: Option<String>,
    pub stop: SessionStop,
    pub actions_taken: u32,
    pub full_resets: u32,
    pub usage: Usage,
    /// Every frame received, starting with the reset frame.
    pub frames: Vec<Frame>,
}

impl SessionOutcome {
    pub fn final_score(&self) -> u32 {
        self.frames.last().map_or(0, |frame| frame.score)
    }
}

/// One completed turn, reported to the caller as it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub game_id: String,
    pub turn: u32,
    pub choice: ActionChoice,
    /// The decision was replaced by the `RESET` fallback.
    pub fallback: bool,
    pub score: u32,
    pub state: GameState,
    pub full_reset: bool,
}

/// Attached to the error chain when a session fails, so callers can report
/// which game and session token were involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailedError {
    pub game_id: String,
    pub guid: Option<String>,
    pub phase: SessionPhase,
    pub actions_taken: u32,
}

impl fmt::Display for SessionFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session for game {} (guid {}) failed while {} after {} actions",
            self.game_id,
            self.guid.as_deref().unwrap_or("none"),
            self.phase,
            self.actions_taken
        )
    }
}

impl std::error::Error for SessionFailedError {}

/// Play one game until it is won, the budget is spent, or shutdown is requested.
#[instrument(
    skip_all,
    fields(game_id = %game_id, max_actions = config.max_actions, window_cap = config.window_cap)
)]
pub fn run_session<G, D, R, F>(
    game_id: &str,
    clients: &SessionClients<'_, G, D, R>,
    config: &SessionConfig,
    shutdown: ShutdownFlag,
    on_turn: F,
) -> Result<SessionOutcome>
where
    G: GameClient + ?Sized,
    D: DecisionClient + ?Sized,
    R: Renderer + ?Sized,
    F: FnMut(&TurnReport),
{
    let budget = ActionBudget::new(config.max_actions)?;
    if config.window_cap == 0 {
        return Err(anyhow!("window cap must be > 0"));
    }
    let mut session = Session {
        game_id,
        clients,
        config,
        budget,
        phase: SessionPhase::Init,
        state: SessionState::new(shutdown),
        window: TurnWindow::new(config.window_cap),
        frames: Vec::new(),
    };
    match session.run(on_turn) {
        Ok(stop) => {
            info!(
                stop = ?stop,
                actions = session.state.actions_taken,
                score = session.frames.last().map_or(0, |frame| frame.score),
                "session finished"
            );
            Ok(SessionOutcome {
                game_id: game_id.to_string(),
                guid: session.state.guid,
                stop,
                actions_taken: session.state.actions_taken,
                full_resets: session.state.full_resets,
                usage: session.state.usage,
                frames: session.frames,
            })
        }
        Err(err) => {
            let failed = SessionFailedError {
                game_id: game_id.to_string(),
                guid: session.state.guid.clone(),
                phase: session.phase,
                actions_taken: session.state.actions_taken,
            };
            Err(err.context(failed))
        }
    }
}

struct Session<'s, 'c, G: ?Sized, D: ?Sized, R: ?Sized> {
    game_id: &'s str,
    clients: &'s SessionClients<'c, G, D, R>,
    config: &'s SessionConfig,
    budget: ActionBudget,
    phase: SessionPhase,
    state: SessionState,
    window: TurnWindow,
    frames: Vec<Frame>,
}

impl<G, D, R> Session<'_, '_, G, D, R>
where
    G: GameClient + ?Sized,
    D: DecisionClient + ?Sized,
    R: Renderer + ?Sized,
{
    fn run<F: FnMut(&TurnReport)>(&mut self, mut on_turn: F) -> Result<SessionStop> {
        self.phase = SessionPhase::Resetting;
        let frame = self
            .clients
            .game
            .reset(&ResetRequest {
                game_id: self.game_id.to_string(),
                card_id: self.config.card_id.clone(),
            })
            .context("reset game")?;
        self.state.observe_guid(frame.guid.as_deref());
        info!(guid = ?self.state.guid, state = %frame.state, score = frame.score, "game reset");
        let reset_state = frame.state;
        self.frames.push(frame);

        self.phase = after_reset(reset_state);
        if self.phase == SessionPhase::Won {
            return Ok(SessionStop::Won);
        }

        let instructions = self.clients.prompts.system_instructions(self.game_id)?;
        loop {
            if self.state.shutdown.is_requested() {
                self.phase = SessionPhase::Interrupted;
                warn!(actions = self.state.actions_taken, "shutdown requested, stopping session");
                return Ok(SessionStop::Interrupted);
            }
            let report = self.play_turn(&instructions)?;
            on_turn(&report);

            self.phase = after_submit(report.state, self.state.actions_taken, &self.budget);
            match self.phase {
                SessionPhase::Won => return Ok(SessionStop::Won),
                SessionPhase::BudgetExceeded => {
                    return Ok(SessionStop::BudgetExceeded {
                        actions: self.state.actions_taken,
                        max_actions: self.budget.max_actions(),
                    });
                }
                _ => {}
            }
        }
    }

    /// One decide → submit → record cycle.
    fn play_turn(&mut self, instructions: &str) -> Result<TurnReport> {
        self.phase = SessionPhase::Deciding;
        let turn = self.state.actions_taken + 1;
        let latest = self
            .frames
            .last()
            .ok_or_else(|| anyhow!("no frame to decide on"))?;

        let schema = ActionSchema::new(&latest.permitted_actions());
        let grid = latest.latest_grid();
        let image = grid
            .map(|grid| self.clients.renderer.render(grid))
            .transpose()
            .context("render frame")?;
        let text = self.clients.prompts.turn_prompt(&TurnPromptInputs {
            game_id: self.game_id.to_string(),
            turn,
            state: latest.state.to_string(),
            score: latest.score,
            win_score: latest.win_score,
            full_reset: latest.full_reset,
            actions: schema.action_names().iter().map(|name| name.to_string()).collect(),
            grid: grid.map(grid_to_text),
            layers: latest.layers.len(),
        })?;
        let prompt = PromptContent { text, image };

        let history_items;
        let decided: DecidedTurn = {
            let request = DecisionRequest {
                game_id: self.game_id,
                turn,
                instructions,
                history: self.window.flatten().collect(),
                prompt: &prompt,
                schema: &schema,
            };
            history_items = request.history.len();
            decide_action(self.clients.decider, &request).context("decide action")?
        };
        let choice = decided.interpretation.decision.choice;

        self.phase = SessionPhase::Submitting;
        let next = self
            .clients
            .game
            .submit(&ActionRequest {
                game_id: self.game_id.to_string(),
                card_id: self.config.card_id.clone(),
                guid: self.state.guid.clone(),
                choice,
                reasoning: Some(decided.interpretation.decision.reasoning()),
            })
            .with_context(|| format!("submit {}", choice.action()))?;
        self.state.observe_guid(next.guid.as_deref());
        self.state.actions_taken = turn;
        self.state.usage += decided.response.usage;

        if let Some(root) = &self.config.turn_log_dir {
            self.log_turn(root, turn, history_items, &prompt, &schema, &decided, &next);
        }

        let report = TurnReport {
            game_id: self.game_id.to_string(),
            turn,
            choice,
            fallback: decided.interpretation.fallback.is_some(),
            score: next.score,
            state: next.state,
            full_reset: next.full_reset,
        };
        info!(
            turn,
            action = %choice.action(),
            coordinates = ?choice.coordinates(),
            score = next.score,
            state = %next.state,
            "turn complete"
        );

        let outcome = TurnOutcome::from_frame(decided.response.call_id, choice, &next);
        self.window.append(TurnRecord {
            prompt,
            output: decided.response.output_items,
            outcome,
        });
        if next.full_reset {
            // Earlier turns describe a game that no longer exists.
            self.window.clear();
            self.state.full_resets += 1;
            info!(turn, "game performed a full reset, window cleared");
        }
        self.frames.push(next);
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn log_turn(
        &self,
        root: &Path,
        turn: u32,
        history_items: usize,
        prompt: &PromptContent,
        schema: &ActionSchema,
        decided: &DecidedTurn,
        frame: &Frame,
    ) {
        let interpretation = &decided.interpretation;
        let result = write_turn(&TurnWriteRequest {
            root,
            game_id: self.game_id,
            turn,
            request: &RequestDump {
                game_id: self.game_id,
                turn,
                history_items,
                prompt: &prompt.text,
                has_image: prompt.image.is_some(),
                schema: schema.model_schema(),
            },
            decision: &DecisionDump {
                decision: &interpretation.decision,
                fallback: interpretation.fallback.as_ref().map(|reason| reason.describe()),
                coordinates_sanitized: interpretation.coordinates_sanitized,
                raw_arguments: decided.response.arguments.as_ref(),
                call_id: decided.response.call_id.as_deref(),
                usage: decided.response.usage,
            },
            frame,
        });
        if let Err(err) = result {
            warn!(turn, err = %format!("{err:#}"), "failed to write turn log");
        }
    }
}
