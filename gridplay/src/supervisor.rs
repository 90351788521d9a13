//! Run supervisor for `gridplay play`.
//!
//! Opens one scorecard, plays the requested games strictly one after another,
//! and closes the scorecard exactly once on every terminal path.

use anyhow::Result;
use tracing::{error, info};

use crate::core::state::ShutdownFlag;
use crate::io::decider::DecisionClient;
use crate::io::game::{GameClient, ScorecardClient};
use crate::io::render::Renderer;
use crate::io::scorecard::ScorecardGuard;
use crate::session::{
    SessionClients, SessionConfig, SessionFailedError, SessionOutcome, SessionStop, TurnReport,
    run_session,
};

/// Settings shared by every game of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_actions: u32,
    pub window_cap: usize,
    pub turn_log_dir: Option<std::path::PathBuf>,
    /// Tags attached to the scorecard.
    pub tags: Vec<String>,
}

/// Summary of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub card_id: Option<String>,
    pub sessions: Vec<SessionOutcome>,
    pub interrupted: bool,
}

/// Play `game_ids` in order under one scorecard.
///
/// A failed session stops the run; its error is returned after a best-effort
/// scorecard close that never masks it.
pub fn run_games<G, D, R, F>(
    game_ids: &[String],
    clients: &SessionClients<'_, G, D, R>,
    settings: &RunSettings,
    shutdown: &ShutdownFlag,
    mut on_turn: F,
) -> Result<RunReport>
where
    G: GameClient + ScorecardClient + ?Sized,
    D: DecisionClient + ?Sized,
    R: Renderer + ?Sized,
    F: FnMut(&TurnReport),
{
    let mut guard = ScorecardGuard::open(clients.game, &settings.tags)?;
    let config = SessionConfig {
        max_actions: settings.max_actions,
        window_cap: settings.window_cap,
        card_id: guard.card_id().map(str::to_string),
        turn_log_dir: settings.turn_log_dir.clone(),
    };

    let mut sessions = Vec::with_capacity(game_ids.len());
    let played = play_all(game_ids, clients, &config, shutdown, &mut sessions, &mut on_turn);
    teardown(&mut guard, clients.game, &played)?;
    let interrupted = played?;
    Ok(RunReport {
        card_id: config.card_id,
        sessions,
        interrupted,
    })
}

/// Returns whether the run was interrupted.
fn play_all<G, D, R, F>(
    game_ids: &[String],
    clients: &SessionClients<'_, G, D, R>,
    config: &SessionConfig,
    shutdown: &ShutdownFlag,
    sessions: &mut Vec<SessionOutcome>,
    on_turn: &mut F,
) -> Result<bool>
where
    G: GameClient + ?Sized,
    D: DecisionClient + ?Sized,
    R: Renderer + ?Sized,
    F: FnMut(&TurnReport),
{
    for game_id in game_ids {
        if shutdown.is_requested() {
            return Ok(true);
        }
        info!(%game_id, "starting session");
        let outcome = run_session(game_id, clients, config, shutdown.clone(), &mut *on_turn)?;
        let interrupted = outcome.stop == SessionStop::Interrupted;
        sessions.push(outcome);
        if interrupted {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The single teardown site: close the scorecard at most once.
fn teardown<S: ScorecardClient + ?Sized>(
    guard: &mut ScorecardGuard,
    scorecards: &S,
    played: &Result<bool>,
) -> Result<()> {
    match played {
        Ok(_) => {
            guard.close(scorecards)?;
        }
        Err(err) => {
            match err.downcast_ref::<SessionFailedError>() {
                Some(failed) => error!(
                    game_id = %failed.game_id,
                    guid = ?failed.guid,
                    phase = %failed.phase,
                    "session failed, closing scorecard"
                ),
                None => error!("run failed, closing scorecard"),
            }
            guard.close_best_effort(scorecards);
        }
    }
    Ok(())
}
