//! At-most-once scorecard teardown.

use anyhow::Result;
use tracing::{info, warn};

use crate::io::game::ScorecardClient;

/// Owns an open scorecard until it is closed.
///
/// `close` takes the id out of the guard, so every terminal path can call it
/// and only the first call reaches the backend.
#[derive(Debug)]
pub struct ScorecardGuard {
    card_id: Option<String>,
}

impl ScorecardGuard {
    /// Open a scorecard through `client`.
    pub fn open<S: ScorecardClient + ?Sized>(client: &S, tags: &[String]) -> Result<Self> {
        let card_id = client.open_scorecard(tags)?;
        info!(%card_id, "opened scorecard");
        Ok(Self {
            card_id: Some(card_id),
        })
    }

    pub fn card_id(&self) -> Option<&str> {
        self.card_id.as_deref()
    }

    /// Close the scorecard if still open. Returns whether a close was attempted.
    pub fn close<S: ScorecardClient + ?Sized>(&mut self, client: &S) -> Result<bool> {
        let Some(card_id) = self.card_id.take() else {
            return Ok(false);
        };
        client.close_scorecard(&card_id)?;
        info!(%card_id, "closed scorecard");
        Ok(true)
    }

    /// Close without masking a primary error: failures are logged, not returned.
    pub fn close_best_effort<S: ScorecardClient + ?Sized>(&mut self, client: &S) {
        let card_id = self.card_id.clone();
        if let Err(err) = self.close(client) {
            warn!(card_id = ?card_id, err = %format!("{err:#}"), "failed to close scorecard");
        }
    }
}
