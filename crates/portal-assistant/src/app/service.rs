//! Shared app dependency container for the controller and its stores.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::app::HostEvent;
use crate::app::connection::PortalConnection;
use crate::domain::connection::ConnectionConfig;
use crate::infra::auth::Authenticator;
use crate::infra::clipboard::Clipboard;
use crate::infra::portal::PortalClient;
use crate::infra::prompt::Prompter;
use crate::infra::settings::SettingsStore;

/// Host capabilities and remote clients used by app workflows.
pub struct AppServices {
    authenticator: Arc<dyn Authenticator>,
    clipboard: Arc<dyn Clipboard>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
    portal_client: Arc<dyn PortalClient>,
    prompter: Arc<dyn Prompter>,
    settings: Arc<dyn SettingsStore>,
}

impl AppServices {
    /// Creates a shared service container.
    pub fn new(
        portal_client: Arc<dyn PortalClient>,
        authenticator: Arc<dyn Authenticator>,
        prompter: Arc<dyn Prompter>,
        clipboard: Arc<dyn Clipboard>,
        settings: Arc<dyn SettingsStore>,
        event_tx: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        Self {
            authenticator,
            clipboard,
            event_tx,
            portal_client,
            prompter,
            settings,
        }
    }

    /// Builds a connection that shares this container's client and
    /// authenticator.
    pub fn connect(&self, config: ConnectionConfig) -> Arc<PortalConnection> {
        Arc::new(PortalConnection::new(
            config,
            Arc::clone(&self.portal_client),
            Arc::clone(&self.authenticator),
        ))
    }

    /// Enqueues a host event; a closed host is ignored.
    pub fn emit_host_event(&self, event: HostEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns a clone of the host event sender.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<HostEvent> {
        self.event_tx.clone()
    }

    pub fn clipboard(&self) -> &dyn Clipboard {
        self.clipboard.as_ref()
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }
}
