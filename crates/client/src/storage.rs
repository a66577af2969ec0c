//! Persistent client preferences.
//!
//! Values are stored as JSON under string keys through a [`KeyValueStore`]:
//! - [`FileStore`]: one JSON file per key in the platform config directory:
//!   - Linux: `~/.config/parley/`
//!   - macOS: `~/Library/Application Support/parley/`
//!   - Windows: `%APPDATA%\parley\`
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

const KEY_LAST_URL: &str = "websocketUrl";
const KEY_NICKNAME: &str = "nickname";
const KEY_THEME: &str = "theme";
const KEY_RECENT_SERVERS: &str = "recentServers";

/// How many previously used servers are remembered.
pub const MAX_RECENT_SERVERS: usize = 3;

/// Raw string storage keyed by name.
pub trait KeyValueStore: Send {
    fn load_raw(&self, key: &str) -> Option<String>;

    /// Returns `true` if the value was stored.
    fn save_raw(&mut self, key: &str, value: &str) -> bool;

    fn remove_raw(&mut self, key: &str);
}

/// JSON files in a directory, one per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config dir>/parley`, if the platform has a config directory.
    pub fn default_location() -> Option<Self> {
        Some(Self::new(dirs::config_dir()?.join("parley")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn save_raw(&mut self, key: &str, value: &str) -> bool {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "cannot create config dir");
            return false;
        }
        match std::fs::write(self.file_path(key), value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to save preference");
                false
            }
        }
    }

    fn remove_raw(&mut self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn save_raw(&mut self, key: &str, value: &str) -> bool {
        self.values.insert(key.to_string(), value.to_string());
        true
    }

    fn remove_raw(&mut self, key: &str) {
        self.values.remove(key);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Move `url` to the front of `recent`, dropping duplicates and the overflow.
pub fn push_recent(recent: &mut Vec<String>, url: &str, max: usize) {
    recent.retain(|existing| existing != url);
    recent.insert(0, url.to_string());
    recent.truncate(max);
}

/// Typed access to the values the client remembers between runs.
pub struct Preferences {
    store: Box<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    /// Save a value. Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&mut self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.store.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value. `None` if the key is missing or does not deserialize.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.store.load_raw(key)?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&mut self, key: &str) {
        self.store.remove_raw(key);
    }

    pub fn last_url(&self) -> Option<String> {
        self.load(KEY_LAST_URL)
    }

    pub fn nickname(&self) -> Option<String> {
        self.load(KEY_NICKNAME)
    }

    pub fn set_nickname(&mut self, nickname: &str) -> bool {
        self.save(KEY_NICKNAME, &nickname)
    }

    pub fn theme(&self) -> Theme {
        self.load(KEY_THEME).unwrap_or_default()
    }

    pub fn set_theme(&mut self, theme: Theme) -> bool {
        self.save(KEY_THEME, &theme)
    }

    /// Most recent first, at most [`MAX_RECENT_SERVERS`].
    pub fn recent_servers(&self) -> Vec<String> {
        self.load(KEY_RECENT_SERVERS).unwrap_or_default()
    }

    /// Record a successful connection.
    pub fn remember_connection(&mut self, url: &str, nickname: &str) {
        let mut recent = self.recent_servers();
        push_recent(&mut recent, url, MAX_RECENT_SERVERS);

        let saved = self.save(KEY_LAST_URL, &url)
            & self.save(KEY_NICKNAME, &nickname)
            & self.save(KEY_RECENT_SERVERS, &recent);
        if !saved {
            tracing::warn!(url, "could not persist connection preferences");
        }
    }
}
