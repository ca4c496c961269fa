//! Named host commands and their dispatch to the sync controller.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::app::HostEvent;
use crate::app::sync::{SyncController, SyncError};
use crate::domain::node::NodeId;

/// Command parsing failure.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Command `{0}` needs a node id")]
    MissingNode(CommandName),
    #[error("Invalid node id: {0}")]
    InvalidNode(String),
}

/// Names of the commands the host can invoke.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CommandName {
    AddConnection,
    Refresh,
    Copy,
    Open,
    Paste,
    Delete,
    CreateItem,
}

impl CommandName {
    pub const ALL: [Self; 7] = [
        Self::AddConnection,
        Self::Refresh,
        Self::Copy,
        Self::Open,
        Self::Paste,
        Self::Delete,
        Self::CreateItem,
    ];

    /// Returns the wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddConnection => "addConnection",
            Self::Refresh => "refresh",
            Self::Copy => "copy",
            Self::Open => "open",
            Self::Paste => "paste",
            Self::Delete => "delete",
            Self::CreateItem => "createItem",
        }
    }

    /// Returns a one-line description for help output.
    pub fn description(self) -> &'static str {
        match self {
            Self::AddConnection => "Add a portal connection [url]",
            Self::Refresh => "Reload the children of a node, or of every connection [node]",
            Self::Copy => "Copy the id of a node to the clipboard <node>",
            Self::Open => "Open the data of an item as a virtual file <node>",
            Self::Paste => "Create a copy of the clipboard item <node>",
            Self::Delete => "Delete an item or remove a connection <node>",
            Self::CreateItem => "Create an empty item <node>",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| CommandError::Unknown(value.to_string()))
    }
}

/// A command with its parsed argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    AddConnection(Option<String>),
    Refresh(Option<NodeId>),
    Copy(NodeId),
    Open(NodeId),
    Paste(NodeId),
    Delete(NodeId),
    CreateItem(NodeId),
}

impl Command {
    /// Parses `name` with an optional argument.
    ///
    /// # Errors
    /// Returns an error for unknown names and missing or malformed node ids.
    pub fn parse(name: &str, argument: Option<&str>) -> Result<Self, CommandError> {
        let name = name.parse::<CommandName>()?;
        let argument = argument.map(str::trim).filter(|argument| !argument.is_empty());
        let node = |argument: Option<&str>| -> Result<NodeId, CommandError> {
            let argument = argument.ok_or(CommandError::MissingNode(name))?;

            argument
                .parse()
                .map_err(|_| CommandError::InvalidNode(argument.to_string()))
        };

        Ok(match name {
            CommandName::AddConnection => Self::AddConnection(argument.map(str::to_string)),
            CommandName::Refresh => Self::Refresh(argument.map(|_| node(argument)).transpose()?),
            CommandName::Copy => Self::Copy(node(argument)?),
            CommandName::Open => Self::Open(node(argument)?),
            CommandName::Paste => Self::Paste(node(argument)?),
            CommandName::Delete => Self::Delete(node(argument)?),
            CommandName::CreateItem => Self::CreateItem(node(argument)?),
        })
    }

    pub fn name(&self) -> CommandName {
        match self {
            Self::AddConnection(_) => CommandName::AddConnection,
            Self::Refresh(_) => CommandName::Refresh,
            Self::Copy(_) => CommandName::Copy,
            Self::Open(_) => CommandName::Open,
            Self::Paste(_) => CommandName::Paste,
            Self::Delete(_) => CommandName::Delete,
            Self::CreateItem(_) => CommandName::CreateItem,
        }
    }
}

/// Runs `command` on `controller`.
///
/// Failures are logged and reported to the host as [`HostEvent::Error`].
pub async fn dispatch(controller: &mut SyncController, command: Command) {
    let name = command.name();
    if let Err(error) = run_command(controller, command).await {
        warn!(command = %name, %error, "Command failed");
        controller.notify(HostEvent::Error(error.to_string()));
    }
}

async fn run_command(controller: &mut SyncController, command: Command) -> Result<(), SyncError> {
    match command {
        Command::AddConnection(address) => {
            controller.add_connection(address).await?;
        }
        Command::Refresh(node_id) => controller.refresh(node_id),
        Command::Copy(node_id) => {
            let token = controller.copy(node_id)?;
            controller.notify(HostEvent::Info(format!("Copied {token} to the clipboard.")));
        }
        Command::Open(node_id) => {
            controller.open_leaf(node_id).await?;
        }
        Command::Paste(node_id) => {
            controller.paste(node_id).await?;
        }
        Command::Delete(node_id) => {
            controller.delete(node_id).await?;
        }
        Command::CreateItem(node_id) => {
            if let Some(item_id) = controller.create_item(node_id).await? {
                controller.notify(HostEvent::Info(format!("Created item {item_id}.")));
            }
        }
    }

    Ok(())
}
