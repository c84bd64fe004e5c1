//! Launching of bot sessions, one per installation.

use std::collections::HashMap;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::{
    base::types::{Installation, Res},
    runtime::Runtime,
};

use super::session::BotSession;

/// Owns the running sessions, keyed by team.
///
/// Sessions share nothing with each other; the supervisor only keeps their
/// handles so a team never ends up with two sessions.
pub struct Supervisor {
    runtime: Runtime,
    sessions: HashMap<String, JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            sessions: HashMap::new(),
        }
    }

    /// Launch a session for every stored installation that has a channel.
    ///
    /// Returns the number of sessions launched.
    #[instrument(skip_all)]
    pub async fn launch_existing(&mut self) -> Res<usize> {
        let installations = self.runtime.store.find_all().await?;

        let launched = installations.into_iter().filter(|installation| self.launch(installation.clone())).count();

        info!("Launched {} session(s) for existing installations", launched);

        Ok(launched)
    }

    /// Launch a session for one installation.
    ///
    /// A session already running for the same team is replaced.  Returns
    /// `false` (and launches nothing) when the installation has no channel.
    #[instrument(skip_all, fields(team_id = %installation.team_id))]
    pub fn launch(&mut self, installation: Installation) -> bool {
        if installation.channel_id.is_none() {
            warn!("Not launching a session for an installation without a channel");
            return false;
        }

        let team_id = installation.team_id.clone();
        let session = BotSession::new(&self.runtime, installation);

        let handle = tokio::spawn(async move {
            let reason = session.run().await;
            warn!("Session for team {} ended: {}", session.installation().team_id, reason);
        });

        if let Some(previous) = self.sessions.insert(team_id, handle)
            && !previous.is_finished()
        {
            info!("Replacing the running session");
            previous.abort();
        }

        true
    }

    /// The number of sessions still running.
    pub fn running(&mut self) -> usize {
        self.sessions.retain(|_, handle| !handle.is_finished());
        self.sessions.len()
    }

    /// Stop every session.
    pub fn shutdown(&mut self) {
        for (_, handle) in self.sessions.drain() {
            handle.abort();
        }
    }
}
