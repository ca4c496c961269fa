//! Persistence of the configured connection list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::connection::{ConnectionConfig, format_connection_list, parse_connection_list};

/// File name of the persisted connection list inside the app home.
pub const CONNECTIONS_FILE: &str = "connections";

/// Key-value style store for the single persisted connection-list string.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    /// Returns the persisted value, or `None` when nothing was saved yet.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be read.
    fn load(&self) -> io::Result<Option<String>>;

    /// Replaces the persisted value.
    ///
    /// # Errors
    /// Returns an error when the backing storage cannot be written.
    fn save(&self, value: String) -> io::Result<()>;
}

/// Stores the connection list in a plain text file.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn save(&self, value: String) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, value)
    }
}

/// Loads the connection list from `store`.
///
/// # Errors
/// Returns an error when the store cannot be read.
pub fn load_connections(store: &dyn SettingsStore) -> io::Result<Vec<ConnectionConfig>> {
    Ok(store
        .load()?
        .map(|value| parse_connection_list(&value))
        .unwrap_or_default())
}

/// Writes the connection list to `store`.
///
/// # Errors
/// Returns an error when the store cannot be written.
pub fn save_connections(store: &dyn SettingsStore, configs: &[ConnectionConfig]) -> io::Result<()> {
    store.save(format_connection_list(configs))
}
