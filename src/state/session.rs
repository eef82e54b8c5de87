//! Persisted navigation state
//!
//! The last location is saved after every successful navigation and read
//! once at startup to put the user back where they left off.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AppError, AppResult};

/// Last known location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavState {
    /// Root URL of the backend (without credentials)
    pub backend_root_url: String,
    /// Directory shown in the table
    pub current_dir_path: String,
    /// Directory selected in the tree
    pub selected_tree_dir: String,
    /// Entry under the cursor, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_entry_name: Option<String>,
}

/// Storage for [`NavState`]
pub trait StateStore: Send {
    /// Read the saved state. Missing or malformed state is `None`.
    fn load(&self) -> Option<NavState>;

    /// Persist the state
    fn save(&mut self, state: &NavState) -> AppResult<()>;
}

/// Keeps state in a TOML file (`state.toml` in the config directory by
/// default)
#[derive(Debug, Clone)]
pub struct TomlStateStore {
    path: PathBuf,
}

impl TomlStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the default config directory
    pub fn default_location() -> Option<Self> {
        crate::config::config_dir().map(|dir| Self::new(dir.join("state.toml")))
    }
}

impl StateStore for TomlStateStore {
    fn load(&self) -> Option<NavState> {
        let content = fs::read_to_string(&self.path).ok()?;
        match toml_edit::de::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("ignoring malformed state file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&mut self, state: &NavState) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml_edit::ser::to_string_pretty(state)
            .map_err(|e| AppError::StateStore(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// In-process store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<Option<NavState>>>,
}

impl MemoryStateStore {
    pub fn new(initial: Option<NavState>) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
        }
    }

    /// Last saved state
    pub fn current(&self) -> Option<NavState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Option<NavState> {
        self.current()
    }

    fn save(&mut self, state: &NavState) -> AppResult<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| AppError::StateStore("state lock poisoned".to_string()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}
