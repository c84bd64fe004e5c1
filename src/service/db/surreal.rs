//! SurrealDB implementation of the installation store.

use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    types::{Installation, Res, Void},
};

use super::{GenericInstallationStore, InstallationStore};

/// Table holding one record per team.
const INSTALLATION_TABLE: &str = "installation";

// Extra methods on `InstallationStore` applied by the surreal implementation.

impl InstallationStore {
    /// Connects to the configured SurrealDB endpoint.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let store = SurrealInstallationStore::connect(config).await?;
        Ok(Self { inner: Arc::new(store) })
    }

    /// Creates a store backed by an in-memory SurrealDB instance.
    pub async fn surreal_memory() -> Res<Self> {
        let db = any::connect("mem://").await?;
        db.use_ns("test").use_db("test").await?;

        Ok(Self {
            inner: Arc::new(SurrealInstallationStore { db }),
        })
    }
}

// Structs.

/// SurrealDB installation store.
struct SurrealInstallationStore {
    db: Surreal<Any>,
}

impl SurrealInstallationStore {
    #[instrument(name = "SurrealInstallationStore::connect", skip_all, fields(endpoint = %config.db_endpoint))]
    async fn connect(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.db_username, &config.db_password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        info!("Connected to the installation store");

        Ok(Self { db })
    }
}

#[async_trait]
impl GenericInstallationStore for SurrealInstallationStore {
    #[instrument(skip(self))]
    async fn find_all(&self) -> Res<Vec<Installation>> {
        let installations: Vec<Installation> = self.db.select(INSTALLATION_TABLE).await?;
        Ok(installations)
    }

    #[instrument(skip(self))]
    async fn find_by_team(&self, team_id: &str) -> Res<Option<Installation>> {
        let installation: Option<Installation> = self.db.select((INSTALLATION_TABLE, team_id)).await?;
        Ok(installation)
    }

    #[instrument(skip_all, fields(team_id = %installation.team_id))]
    async fn save(&self, installation: &Installation) -> Void {
        let _: Option<Installation> = self.db.upsert((INSTALLATION_TABLE, installation.team_id.as_str())).content(installation.clone()).await?;
        Ok(())
    }
}

// Tests.
