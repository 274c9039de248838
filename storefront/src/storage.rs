//! Client-local key/value storage persisted as one JSON file.
//!
//! Values are strings, as in browser local storage; structured values are
//! JSON-encoded into them. Every write rewrites the whole file.

use crate::error::Result;
use crate::gates::access::UnlockStore;
use crate::types::EventId;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Key holding the JSON map of unlocked private events
pub const UNLOCKED_EVENTS_KEY: &str = "unlocked_events";

/// File-backed string map
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStorage {
    /// Open the storage file at `path`, starting empty if it does not exist
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Local storage opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    /// Value under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(key.to_owned(), value.into());
        self.persist(&entries)
    }

    /// Delete `key`
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    /// Bearer token, if signed in
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Store or clear the bearer token
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn set_token(&self, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) => self.set(TOKEN_KEY, token),
            None => self.remove(TOKEN_KEY),
        }
    }

    fn unlocked_events(&self) -> HashMap<EventId, bool> {
        self.get(UNLOCKED_EVENTS_KEY)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(map) => Some(map),
                Err(error) => {
                    tracing::warn!(%error, "Ignoring malformed unlocked_events");
                    None
                },
            })
            .unwrap_or_default()
    }
}

impl UnlockStore for LocalStorage {
    fn is_unlocked(&self, event_id: EventId) -> bool {
        self.unlocked_events().get(&event_id).copied().unwrap_or(false)
    }

    fn set_unlocked(&self, event_id: EventId, unlocked: bool) -> Result<()> {
        let mut events = self.unlocked_events();
        events.insert(event_id, unlocked);
        self.set(UNLOCKED_EVENTS_KEY, serde_json::to_string(&events)?)
    }
}
