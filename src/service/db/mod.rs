use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Installation, Res, Void};

pub mod surreal;

// Traits.

/// Generic installation store trait that stores must implement.
///
/// The bot itself only reads from the store; the installation front end is
/// the only writer.
#[async_trait]
pub trait GenericInstallationStore: Send + Sync + 'static {
    /// Gets every stored installation.
    ///
    /// Used at startup to relaunch a session for each configured installation.
    async fn find_all(&self) -> Res<Vec<Installation>>;

    /// Gets the installation for a team, if there is one.
    async fn find_by_team(&self, team_id: &str) -> Res<Option<Installation>>;

    /// Creates or replaces the installation for its team.
    async fn save(&self, installation: &Installation) -> Void;
}

/// Installation store for pepito-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct InstallationStore {
    /// The store instance.
    pub inner: Arc<dyn GenericInstallationStore>,
}

impl Deref for InstallationStore {
    type Target = dyn GenericInstallationStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl InstallationStore {
    pub fn new(inner: Arc<dyn GenericInstallationStore>) -> Self {
        Self { inner }
    }
}
