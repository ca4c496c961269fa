//! App-layer composition root.
//!
//! This module wires the portal connection, tree cache and sync controller
//! and defines the [`HostEvent`] stream consumed by the host.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::connection::DEFAULT_PAGE_SIZE;
use crate::domain::node::NodeId;
use crate::infra::auth::DEFAULT_AUTH_TIMEOUT;

pub mod command;
pub mod connection;
mod paging;
mod service;
pub mod sync;
pub mod tree;

pub use command::{Command, CommandName};
pub use connection::PortalConnection;
pub use service::AppServices;
pub use sync::{SaveOutcome, SyncController, SyncError};
pub use tree::TreeCache;

/// Returns the portal-assistant home directory (`~/.portal-assistant`).
pub fn portal_assistant_home() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".portal-assistant");
    }

    PathBuf::from(".portal-assistant")
}

/// Runtime settings resolved from the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppConfig {
    /// Directory holding the persisted connection list.
    pub home: PathBuf,
    /// Search page size used by newly configured connections.
    pub page_size: u32,
    /// Upper bound on one interactive sign-in.
    pub auth_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home: portal_assistant_home(),
            page_size: DEFAULT_PAGE_SIZE,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

/// Notifications the app sends to the host.
///
/// Producers only emit events; rendering is up to the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostEvent {
    /// Informational message for the user.
    Info(String),
    /// Failure message for the user.
    Error(String),
    /// Requests the host to open the virtual file at the given path.
    ShowDocument(String),
    /// The children of a node (or of the root when `None`) must be re-read.
    TreeChanged(Option<NodeId>),
}
