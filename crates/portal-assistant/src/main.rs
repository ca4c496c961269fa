use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use portal_assistant::app::{AppConfig, AppServices, SyncController};
use portal_assistant::infra::auth::{Authenticator, OAuthAuthenticator, TokenAuthenticator};
use portal_assistant::infra::clipboard::SystemClipboard;
use portal_assistant::infra::portal::{PortalClient, RestPortalClient};
use portal_assistant::infra::settings::{CONNECTIONS_FILE, FileSettingsStore};
use portal_assistant::runtime::{self, TerminalPrompter, stdin_lines};
use portal_assistant::vfs::MemFs;
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a pre-issued portal token.
const TOKEN_ENV: &str = "PORTAL_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "portal-assistant")]
#[command(version)]
#[command(about = "Browse and edit portal item data from the terminal", long_about = None)]
struct Args {
    /// Directory holding the persisted connection list.
    #[arg(long)]
    home: Option<PathBuf>,

    /// Search page size for item listings.
    #[arg(long = "page-size")]
    page_size: Option<u32>,

    /// Seconds to wait for an interactive sign-in.
    #[arg(long = "auth-timeout-secs")]
    auth_timeout_secs: Option<u64>,

    /// Log debug output to stderr.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> AppConfig {
        let defaults = AppConfig::default();

        AppConfig {
            home: self.home.unwrap_or(defaults.home),
            page_size: self.page_size.unwrap_or(defaults.page_size).max(1),
            auth_timeout: self
                .auth_timeout_secs
                .map_or(defaults.auth_timeout, Duration::from_secs),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();
    let config = args.into_config();

    let lines = stdin_lines();
    let prompter = Arc::new(TerminalPrompter::new(Arc::clone(&lines)));
    let portal_client: Arc<dyn PortalClient> = Arc::new(RestPortalClient::new());
    let authenticator: Arc<dyn Authenticator> = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Arc::new(TokenAuthenticator::new(
            Arc::clone(&portal_client),
            token.trim(),
        )),
        _ => Arc::new(OAuthAuthenticator::new(
            Arc::clone(&portal_client),
            prompter.clone(),
            config.auth_timeout,
        )),
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let services = AppServices::new(
        portal_client,
        authenticator,
        prompter,
        Arc::new(SystemClipboard),
        Arc::new(FileSettingsStore::new(config.home.join(CONNECTIONS_FILE))),
        event_tx,
    );
    let mut controller = SyncController::new(services, Box::new(MemFs::new()), config.page_size);
    if let Err(error) = controller.restore_connections() {
        error!(%error, "Failed to restore connections");
    }

    runtime::run(&mut controller, &mut event_rx, lines).await
}
