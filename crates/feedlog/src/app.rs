//! Wiring between configuration, local preferences and the history manager.
//!
//! [`App`] is what the binary builds at startup. Every component is created
//! here and shared through `Arc`; nothing in the crate is a global.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{CloudBackend, SqliteCloud};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::SyncGateway;
use crate::history::HistoryManager;
use crate::preferences::PreferenceStore;
use crate::record::FeedingRecord;

/// The assembled application.
#[derive(Debug)]
pub struct App {
    config: Config,
    preferences: Arc<PreferenceStore>,
    history: Arc<HistoryManager>,
}

impl App {
    /// Open the databases named by `config` and build every component.
    ///
    /// # Errors
    ///
    /// Returns an error if either database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let backend = SqliteCloud::open(
            config.cloud_database_path(),
            &config.cloud.container_id,
            config.cloud.account_id.clone(),
        )?;
        let preferences = PreferenceStore::open(config.preferences_database_path())?;
        Ok(Self::assemble(config, Arc::new(backend), preferences))
    }

    /// Build the application over an existing backend and preference store.
    #[must_use]
    pub fn assemble(
        config: Config,
        backend: Arc<dyn CloudBackend>,
        preferences: PreferenceStore,
    ) -> Self {
        debug!("Using container '{}'", backend.container_id());
        let gateway = Arc::new(SyncGateway::new(backend));
        Self {
            config,
            preferences: Arc::new(preferences),
            history: Arc::new(HistoryManager::new(gateway)),
        }
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Local preferences.
    #[must_use]
    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    /// The history manager.
    #[must_use]
    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    /// Record a feeding by the stored user for the stored pet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when setup has not been completed,
    /// otherwise whatever [`HistoryManager::record_feeding`] returns.
    pub async fn feed(&self) -> Result<FeedingRecord> {
        let prefs = self.preferences.snapshot();
        if prefs.needs_setup() || prefs.pet_name.trim().is_empty() {
            return Err(Error::invalid_input(
                "no name stored on this device; run `feedlog setup --name NAME --pet PET` first",
            ));
        }
        self.history
            .record_feeding(&prefs.user_name, &prefs.pet_name)
            .await
    }
}
