//! Terminal host: a line shell over the sync controller.

use std::io::{self, Write};
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::app::command::{self, Command, CommandError, CommandName};
use crate::app::{HostEvent, SaveOutcome, SyncController, SyncError};
use crate::domain::node::{Node, NodeIcon, NodeId};
use crate::vfs::{FileSystemProvider, FileType};

pub mod terminal;

pub use terminal::{SharedLines, TerminalPrompter, stdin_lines};

const SHELL_PROMPT: &str = "portal> ";

/// One parsed shell line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ShellAction {
    Empty,
    Help,
    Quit,
    /// Lists the children of a node or the connections.
    List(Option<NodeId>),
    /// Prints a virtual file.
    Cat(String),
    /// Lists a virtual directory.
    Files(String),
    /// Replaces a virtual file with the content of a local file.
    Write { path: String, source: PathBuf },
    Command(Command),
}

/// Runs the shell until `quit` or end of input.
///
/// # Errors
/// Returns an error when stdout or stdin fail.
pub async fn run(
    controller: &mut SyncController,
    event_rx: &mut mpsc::UnboundedReceiver<HostEvent>,
    lines: SharedLines,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(stdout, "Type `help` for commands.")?;
    render_events(controller.files(), event_rx, &mut stdout)?;

    loop {
        let Some(line) = terminal::read_answer(&lines, SHELL_PROMPT).await else {
            break;
        };

        match parse_line(&line) {
            Ok(ShellAction::Quit) => break,
            Ok(action) => execute(controller, action, &mut stdout).await?,
            Err(error) => writeln!(stdout, "error: {error}")?,
        }
        render_events(controller.files(), event_rx, &mut stdout)?;
    }

    Ok(())
}

/// Parses one shell line.
///
/// # Errors
/// Returns an error for unknown commands and malformed arguments.
pub(crate) fn parse_line(line: &str) -> Result<ShellAction, CommandError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(ShellAction::Empty);
    };
    let argument = words.next();

    let action = match name {
        "help" | "?" => ShellAction::Help,
        "quit" | "exit" => ShellAction::Quit,
        "ls" => ShellAction::List(
            argument
                .map(|node| {
                    node.parse()
                        .map_err(|_| CommandError::InvalidNode(node.to_string()))
                })
                .transpose()?,
        ),
        "cat" => ShellAction::Cat(argument.unwrap_or_default().to_string()),
        "files" => ShellAction::Files(argument.unwrap_or("/").to_string()),
        "write" => match (argument, words.next()) {
            (Some(path), Some(source)) => ShellAction::Write {
                path: path.to_string(),
                source: PathBuf::from(source),
            },
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        },
        name => ShellAction::Command(Command::parse(name, argument)?),
    };

    Ok(action)
}

async fn execute(
    controller: &mut SyncController,
    action: ShellAction,
    out: &mut impl Write,
) -> io::Result<()> {
    match action {
        ShellAction::Empty | ShellAction::Quit => {}
        ShellAction::Help => render_help(out)?,
        ShellAction::List(node_id) => {
            let children = controller.tree_mut().get_children(node_id).await;
            render_nodes(&children, out)?;
        }
        ShellAction::Cat(path) => match controller.files().read_file(&path) {
            Ok(content) => {
                out.write_all(&content)?;
                writeln!(out)?;
            }
            Err(error) => writeln!(out, "error: {error}")?,
        },
        ShellAction::Files(path) => match controller.files().read_directory(&path) {
            Ok(entries) => {
                for (name, file_type) in entries {
                    let suffix = if file_type == FileType::Directory { "/" } else { "" };
                    writeln!(out, "{name}{suffix}")?;
                }
            }
            Err(error) => writeln!(out, "error: {error}")?,
        },
        ShellAction::Write { path, source } => {
            let content = match tokio::fs::read(&source).await {
                Ok(content) => content,
                Err(error) => {
                    writeln!(out, "error: {}: {error}", source.display())?;

                    return Ok(());
                }
            };
            match controller.write_local(&path, &content).await {
                Ok(outcome) => writeln!(out, "{}", outcome_label(outcome))?,
                Err(SyncError::Fs(error)) => writeln!(out, "error: {error}")?,
                // Save failures were already sent as host events.
                Err(_) => {}
            }
        }
        ShellAction::Command(parsed) => command::dispatch(controller, parsed).await,
    }

    Ok(())
}

fn outcome_label(outcome: SaveOutcome) -> &'static str {
    match outcome {
        SaveOutcome::Unchanged => "No changes to upload.",
        SaveOutcome::Declined => "Upload postponed.",
        SaveOutcome::Uploaded => "Uploaded.",
    }
}

fn render_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "ls [node]                 List connections or node children")?;
    writeln!(out, "files [path]              List virtual files")?;
    writeln!(out, "cat <path>                Print a virtual file")?;
    writeln!(out, "write <path> <local file> Save local content to an opened file")?;
    for name in CommandName::ALL {
        writeln!(out, "{:<26}{}", name.as_str(), name.description())?;
    }
    writeln!(out, "quit                      Leave the shell")
}

fn render_nodes(nodes: &[Node], out: &mut impl Write) -> io::Result<()> {
    if nodes.is_empty() {
        return writeln!(out, "(empty)");
    }

    for node in nodes {
        let presentation = node.presentation();
        let icon = match presentation.icon {
            NodeIcon::Portal => '@',
            NodeIcon::Folder => '+',
            NodeIcon::File => '-',
        };
        writeln!(out, "{:>4} {icon} {}", node.id, node.display_name)?;
    }

    Ok(())
}

/// Prints every queued host event.
fn render_events(
    files: &dyn FileSystemProvider,
    event_rx: &mut mpsc::UnboundedReceiver<HostEvent>,
    out: &mut impl Write,
) -> io::Result<()> {
    while let Ok(event) = event_rx.try_recv() {
        render_event(files, &event, out)?;
    }

    Ok(())
}

fn render_event(
    files: &dyn FileSystemProvider,
    event: &HostEvent,
    out: &mut impl Write,
) -> io::Result<()> {
    match event {
        HostEvent::Info(message) => writeln!(out, "info: {message}"),
        HostEvent::Error(message) => writeln!(out, "error: {message}"),
        HostEvent::ShowDocument(path) => {
            writeln!(out, "--- {path}")?;
            if let Ok(content) = files.read_file(path) {
                out.write_all(&content)?;
                writeln!(out)?;
            }

            Ok(())
        }
        HostEvent::TreeChanged(Some(node_id)) => {
            writeln!(out, "Node {node_id} changed, run `ls {node_id}` to reload.")
        }
        HostEvent::TreeChanged(None) => writeln!(out, "Connections changed, run `ls` to reload."),
    }
}
