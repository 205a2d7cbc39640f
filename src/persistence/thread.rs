//! Remembers the last viewed conversation and restores it on start-up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::kv::KeyValueStore;

pub const LAST_CONVERSATION_KEY: &str = "lastConversationId";
pub const LAST_ROUTE_KEY: &str = "lastRoute";
pub const THEME_KEY: &str = "theme";
pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";

/// Layout version of the persisted keys.
pub const SCHEMA_VERSION: u32 = 1;

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown theme: {}", s)),
        }
    }
}

/// Where the start-up redirect should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredThread {
    pub conversation_id: String,
    pub route: String,
}

/// Best-effort thread memory. Storage failures are logged, never surfaced.
pub struct ThreadPersistence {
    store: Arc<dyn KeyValueStore>,
    generic_route: String,
    restore_attempted: AtomicBool,
}

impl ThreadPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, generic_route: impl Into<String>) -> Self {
        Self {
            store,
            generic_route: generic_route.into(),
            restore_attempted: AtomicBool::new(false),
        }
    }

    pub fn generic_route(&self) -> &str {
        &self.generic_route
    }

    /// Persist the active conversation and its route. No-op without one.
    pub fn on_route_change(&self, conversation_id: Option<&str>, route: &str) {
        let Some(conversation_id) = conversation_id else {
            return;
        };
        self.write(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string());
        self.write(LAST_CONVERSATION_KEY, conversation_id);
        self.write(LAST_ROUTE_KEY, route);
        debug!(conversation_id, route, "Thread position saved");
    }

    /// Decide the start-up redirect. Fires at most once per session.
    ///
    /// Only the generic entry route is redirected. A stored route that is the
    /// generic route itself, that does not end in the stored conversation id,
    /// or that `is_valid` rejects, is cleared and the user stays where they are.
    pub fn on_app_start(&self, current_route: &str, is_valid: impl Fn(&str) -> bool) -> Option<RestoredThread> {
        if self.restore_attempted.swap(true, Ordering::SeqCst) {
            return None;
        }
        if current_route != self.generic_route {
            return None;
        }

        let version = self.read(SCHEMA_VERSION_KEY);
        if let Some(version) = version.filter(|v| v.parse::<u32>().ok() != Some(SCHEMA_VERSION)) {
            warn!(version = %version, "Ignoring thread state from unknown schema version");
            return None;
        }

        let conversation_id = self.read(LAST_CONVERSATION_KEY)?;
        let route = self.read(LAST_ROUTE_KEY)?;

        // The keys are written separately; a torn write leaves them disagreeing.
        let names_conversation = route.rsplit('/').next() == Some(conversation_id.as_str());
        if route == self.generic_route || !names_conversation || !is_valid(&route) {
            info!(route = %route, "Stored route is no longer valid, staying on generic route");
            self.clear_thread();
            return None;
        }

        info!(conversation_id = %conversation_id, route = %route, "Restoring last thread");
        Some(RestoredThread { conversation_id, route })
    }

    /// Forget the stored thread. The theme is left alone.
    pub fn on_logout(&self) {
        self.clear_thread();
        debug!("Thread position cleared");
    }

    pub fn theme_preference(&self) -> Option<Theme> {
        let raw = self.read(THEME_KEY)?;
        match raw.parse() {
            Ok(theme) => Some(theme),
            Err(e) => {
                warn!(error = %e, "Ignoring stored theme");
                None
            }
        }
    }

    pub fn set_theme_preference(&self, theme: Theme) {
        self.write(THEME_KEY, &theme.to_string());
    }

    fn clear_thread(&self) {
        for key in [LAST_CONVERSATION_KEY, LAST_ROUTE_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to clear persisted key");
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted key");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Failed to persist key");
        }
    }
}
