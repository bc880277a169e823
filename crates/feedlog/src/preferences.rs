//! Local preferences: who is using this device and which pet they feed.
//!
//! Preferences live in a small `SQLite` key-value table in the local data
//! directory, separate from the household database. Every successful write
//! is published to subscribers through a `watch` channel.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::{self, IN_MEMORY_PATH, PREFERENCES_SCHEMA};

/// Key holding the display name of the person using this device.
pub const USER_NAME_KEY: &str = "userName";

/// Key holding the pet's name.
pub const PET_NAME_KEY: &str = "petName";

/// Snapshot of the stored preferences. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preferences {
    /// Who is using this device.
    pub user_name: String,
    /// Which pet they feed.
    pub pet_name: String,
}

impl Preferences {
    /// Whether the setup flow still has to run.
    #[must_use]
    pub fn needs_setup(&self) -> bool {
        self.user_name.trim().is_empty()
    }
}

/// Durable key-value preference storage.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    changes: watch::Sender<Preferences>,
}

impl PreferenceStore {
    /// Open or create the preference database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = storage::open_database(path, &PREFERENCES_SCHEMA)?;
        Self::from_connection(path.to_path_buf(), conn)
    }

    /// Create an in-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = storage::open_in_memory(&PREFERENCES_SCHEMA)?;
        Self::from_connection(PathBuf::from(IN_MEMORY_PATH), conn)
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Result<Self> {
        let initial = Preferences {
            user_name: read_value(&conn, USER_NAME_KEY)?.unwrap_or_default(),
            pet_name: read_value(&conn, PET_NAME_KEY)?.unwrap_or_default(),
        };
        let (changes, _) = watch::channel(initial);
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Path of the preference database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("preference database lock poisoned"))
    }

    /// Read a raw preference value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        read_value(&*self.conn()?, key)
    }

    /// Write a raw preference value and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        debug!("Stored preference {key}");

        self.changes.send_if_modified(|prefs| {
            let slot = match key {
                USER_NAME_KEY => &mut prefs.user_name,
                PET_NAME_KEY => &mut prefs.pet_name,
                _ => return false,
            };
            if slot.as_str() == value {
                return false;
            }
            value.clone_into(slot);
            true
        });
        Ok(())
    }

    /// The stored user name, or an empty string.
    #[must_use]
    pub fn user_name(&self) -> String {
        self.changes.borrow().user_name.clone()
    }

    /// The stored pet name, or an empty string.
    #[must_use]
    pub fn pet_name(&self) -> String {
        self.changes.borrow().pet_name.clone()
    }

    /// Store the user name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set_user_name(&self, name: &str) -> Result<()> {
        self.set(USER_NAME_KEY, name.trim())
    }

    /// Store the pet name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set_pet_name(&self, name: &str) -> Result<()> {
        self.set(PET_NAME_KEY, name.trim())
    }

    /// Current values of both preferences.
    #[must_use]
    pub fn snapshot(&self) -> Preferences {
        self.changes.borrow().clone()
    }

    /// Whether no user name has been stored yet.
    #[must_use]
    pub fn needs_setup(&self) -> bool {
        self.changes.borrow().needs_setup()
    }

    /// Subscribe to preference changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.changes.subscribe()
    }

    /// Run the setup flow: store both names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if either name is blank, or an error
    /// if the database write fails.
    pub fn complete_setup(&self, user_name: &str, pet_name: &str) -> Result<Preferences> {
        if user_name.trim().is_empty() {
            return Err(Error::invalid_input("your name must not be empty"));
        }
        if pet_name.trim().is_empty() {
            return Err(Error::invalid_input("pet name must not be empty"));
        }
        self.set_user_name(user_name)?;
        self.set_pet_name(pet_name)?;
        info!("Setup complete for {}", user_name.trim());
        Ok(self.snapshot())
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM preferences WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}
