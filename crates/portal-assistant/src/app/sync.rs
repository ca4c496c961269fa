//! Synchronization between tree nodes, virtual files and portal items.
//!
//! Opening a leaf materializes its payload as `/<portal>/[<folder>/]<id>.json`
//! in the virtual filesystem. Later writes to that path are diffed against
//! the remote payload and, once the user confirms, uploaded.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::HostEvent;
use crate::app::connection::PortalConnection;
use crate::app::service::AppServices;
use crate::app::tree::TreeCache;
use crate::domain::connection::{ConnectionConfig, DEFAULT_PORTAL, normalize_endpoint};
use crate::domain::item::{ItemContent, ItemMetadata, is_valid_json};
use crate::domain::node::{ConnectionId, Node, NodeId, NodeKind};
use crate::infra::clipboard::ClipboardError;
use crate::infra::portal::PortalError;
use crate::infra::settings::{load_connections, save_connections};
use crate::vfs::{
    FileChangeEvent, FileChangeKind, FileSystemProvider, FsError, WriteOptions, normalize_path,
};

const ITEM_FILE_EXTENSION: &str = ".json";
const SAVE_CONFIRM_LABEL: &str = "Yes";
const SAVE_DECLINE_LABEL: &str = "Not Yet";
const DEFAULT_NEW_ITEM_TYPE: &str = "Web Map";

/// Failure of a user-initiated sync operation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error("Content of {0} is not valid JSON")]
    InvalidContent(String),
    #[error("Unknown tree node: {0}")]
    UnknownNode(NodeId),
    #[error("{0}")]
    UnsupportedTarget(String),
    #[error("No connection serves virtual file {0}")]
    UnknownPath(String),
    #[error("Invalid portal address: {0}")]
    InvalidEndpoint(String),
    #[error("Failed to save connections: {0}")]
    Settings(String),
}

/// Result of handling one local write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveOutcome {
    /// The local content already matches the portal.
    Unchanged,
    /// The user chose not to upload yet.
    Declined,
    /// The portal item now holds the local content.
    Uploaded,
}

/// Location of a materialized item in the virtual filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualItemPath {
    pub portal_name: String,
    pub folder_id: Option<String>,
    pub item_id: String,
}

impl VirtualItemPath {
    /// Returns `/<portal>/[<folder>/]<item>.json`.
    pub fn to_path(&self) -> String {
        match &self.folder_id {
            Some(folder_id) => format!(
                "/{}/{folder_id}/{}{ITEM_FILE_EXTENSION}",
                self.portal_name, self.item_id
            ),
            None => format!("/{}/{}{ITEM_FILE_EXTENSION}", self.portal_name, self.item_id),
        }
    }

    /// Parses a virtual item path; the first segment names the portal and
    /// the file stem is the item id.
    pub fn parse(path: &str) -> Option<Self> {
        let path = normalize_path(path).ok()?;
        let segments = path.trim_start_matches('/').split('/').collect::<Vec<_>>();
        let (portal_name, folder_id, file_name) = match segments.as_slice() {
            [portal_name, file_name] => (*portal_name, None, *file_name),
            [portal_name, folder_id, file_name] => {
                (*portal_name, Some((*folder_id).to_string()), *file_name)
            }
            _ => return None,
        };
        let item_id = file_name.strip_suffix(ITEM_FILE_EXTENSION)?;
        if item_id.is_empty() {
            return None;
        }

        Some(Self {
            portal_name: portal_name.to_string(),
            folder_id,
            item_id: item_id.to_string(),
        })
    }
}

/// Clipboard token produced by the last copy.
struct CopiedToken {
    connection: ConnectionId,
    token: String,
}

/// Orchestrates the tree cache, the virtual filesystem and portal uploads.
///
/// Every operation takes `&mut self`, so one operation completes before the
/// next one starts.
pub struct SyncController {
    file_events: mpsc::UnboundedReceiver<Vec<FileChangeEvent>>,
    files: Box<dyn FileSystemProvider>,
    last_copy: Option<CopiedToken>,
    page_size: u32,
    services: AppServices,
    /// Content known to match the portal, keyed by virtual path.
    synced_content: HashMap<String, Vec<u8>>,
    tree: TreeCache,
}

impl SyncController {
    /// Creates a controller over `files`; new connections use `page_size`.
    pub fn new(
        services: AppServices,
        mut files: Box<dyn FileSystemProvider>,
        page_size: u32,
    ) -> Self {
        let file_events = files.watch();
        let tree = TreeCache::new(services.event_sender());

        Self {
            file_events,
            files,
            last_copy: None,
            page_size,
            services,
            synced_content: HashMap::new(),
            tree,
        }
    }

    pub fn tree(&self) -> &TreeCache {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TreeCache {
        &mut self.tree
    }

    /// Sends a notification to the host.
    pub fn notify(&self, event: HostEvent) {
        self.services.emit_host_event(event);
    }

    /// Returns the virtual filesystem for host reads.
    pub fn files(&self) -> &dyn FileSystemProvider {
        self.files.as_ref()
    }

    /// Adds every persisted connection to the tree and returns how many
    /// were added.
    ///
    /// # Errors
    /// Returns [`SyncError::Settings`] when the settings store cannot be read.
    pub fn restore_connections(&mut self) -> Result<usize, SyncError> {
        let configs = load_connections(self.services.settings())
            .map_err(|error| SyncError::Settings(error.to_string()))?;
        let restored = configs
            .into_iter()
            .filter_map(|config| self.insert_connection(config))
            .count();
        info!(restored, "Restored connections");

        Ok(restored)
    }

    /// Fetches a leaf item and shows its payload as a virtual file.
    ///
    /// Returns the virtual path, or `None` when the item has no payload.
    ///
    /// # Errors
    /// Returns an error when the node is not a leaf, the fetch fails or the
    /// file cannot be written.
    pub async fn open_leaf(&mut self, node_id: NodeId) -> Result<Option<String>, SyncError> {
        let node = self.node(node_id)?;
        let (connection, item_id) = self.leaf_target(&node)?;
        let data = connection.fetch_item(&item_id).await?;
        if !data.has_content() {
            let title = display_title(&data.item, &node);
            self.services.emit_host_event(HostEvent::Info(format!(
                "{title} does not have any data to edit."
            )));

            return Ok(None);
        }

        let path = VirtualItemPath {
            portal_name: connection.portal_name(),
            folder_id: self.parent_folder_id(node_id),
            item_id,
        }
        .to_path();
        let content = data.raw.into_bytes();
        self.files
            .write_file(&path, &content, WriteOptions::UPSERT)?;
        self.synced_content.insert(path.clone(), content);
        debug!(path, "Materialized item");
        self.services
            .emit_host_event(HostEvent::ShowDocument(path.clone()));

        Ok(Some(path))
    }

    /// Writes host-edited content to an opened virtual file and handles the
    /// resulting change.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] for files that were never opened and the
    /// save error of the written file.
    pub async fn write_local(
        &mut self,
        path: &str,
        content: &[u8],
    ) -> Result<SaveOutcome, SyncError> {
        let path = normalize_path(path)?;
        self.files.write_file(
            &path,
            content,
            WriteOptions {
                create: false,
                overwrite: true,
            },
        )?;

        let mut outcome = Ok(SaveOutcome::Unchanged);
        for (changed_path, result) in self.process_pending_changes().await {
            if changed_path == path {
                outcome = result;
            }
        }

        outcome
    }

    /// Drains virtual filesystem change batches and saves every file whose
    /// content differs from what was last synced.
    ///
    /// Writes made while materializing items match the synced content and
    /// are skipped.
    pub async fn process_pending_changes(
        &mut self,
    ) -> Vec<(String, Result<SaveOutcome, SyncError>)> {
        let mut changed_paths = Vec::new();
        while let Ok(batch) = self.file_events.try_recv() {
            for FileChangeEvent { kind, path } in batch {
                if kind == FileChangeKind::Deleted {
                    self.synced_content.remove(&path);
                } else if !changed_paths.contains(&path) {
                    changed_paths.push(path);
                }
            }
        }

        let mut results = Vec::new();
        for path in changed_paths {
            let Ok(content) = self.files.read_file(&path) else {
                continue;
            };
            if self.synced_content.get(&path) == Some(&content) {
                continue;
            }

            let result = self.on_local_write(&path, content).await;
            results.push((path, result));
        }

        results
    }

    /// Handles new local content of a materialized item.
    ///
    /// The remote payload is re-fetched; identical content is not uploaded.
    /// Otherwise the user confirms, the content is validated as JSON and
    /// uploaded. Upload results are reported as host notifications.
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidContent`] for malformed JSON, and path,
    /// fetch and upload errors.
    pub async fn on_local_write(
        &mut self,
        path: &str,
        content: Vec<u8>,
    ) -> Result<SaveOutcome, SyncError> {
        let result = self.save_local_change(path, content).await;
        if let Err(error) = &result {
            warn!(path, %error, "Failed to save local change");
            self.services
                .emit_host_event(HostEvent::Error(error.to_string()));
        }

        result
    }

    /// Copies the node's portal token to the clipboard and returns it.
    ///
    /// Items and folders yield their id; connections yield their endpoint.
    ///
    /// # Errors
    /// Returns [`SyncError::UnknownNode`] and clipboard errors.
    pub fn copy(&mut self, node_id: NodeId) -> Result<String, SyncError> {
        let node = self.node(node_id)?;
        let token = match node.kind {
            NodeKind::Connection => self
                .connection_for(&node)?
                .endpoint()
                .to_string(),
            NodeKind::Folder | NodeKind::Leaf => node
                .remote_id
                .clone()
                .ok_or(SyncError::UnknownNode(node_id))?,
        };
        self.services.clipboard().set_text(token.clone())?;
        self.last_copy = Some(CopiedToken {
            connection: node.connection,
            token: token.clone(),
        });
        info!(token, "Copied to clipboard");

        Ok(token)
    }

    /// Creates a copy of the clipboard item under a connection or folder and
    /// returns the new item id.
    ///
    /// The source item is read from the connection of the last copy when the
    /// clipboard still holds that token, and from the target connection
    /// otherwise.
    ///
    /// # Errors
    /// Returns [`SyncError::UnsupportedTarget`] for leaf targets, and
    /// clipboard, fetch and create errors.
    pub async fn paste(&mut self, target_id: NodeId) -> Result<String, SyncError> {
        let target = self.node(target_id)?;
        if !target.kind.accepts_paste() {
            return Err(SyncError::UnsupportedTarget(format!(
                "Cannot paste into {}",
                target.display_name
            )));
        }

        let target_connection = self.connection_for(&target)?;
        let token = self.services.clipboard().get_text()?.trim().to_string();
        let source_connection = self
            .last_copy
            .as_ref()
            .filter(|copied| copied.token == token)
            .and_then(|copied| self.tree.connection(copied.connection))
            .unwrap_or_else(|| Arc::clone(&target_connection));

        let source = source_connection.fetch_item(&token).await?;
        let title = source.item.title.clone();
        let item = ItemMetadata {
            id: String::new(),
            owner: String::new(),
            owner_folder: None,
            created: 0,
            modified: 0,
            ..source.item
        };
        let item_id = target_connection
            .create_item(item, &source.content, folder_id_of(&target), None)
            .await?;
        self.tree.invalidate(Some(target_id));
        self.services.emit_host_event(HostEvent::Info(format!(
            "Pasted {title} to {}.",
            target.display_name
        )));

        Ok(item_id)
    }

    /// Deletes a leaf item from its portal after confirmation, or removes a
    /// connection from the tree and the persisted list.
    ///
    /// Returns `false` when the user cancels.
    ///
    /// # Errors
    /// Returns [`SyncError::UnsupportedTarget`] for folders, and portal and
    /// settings errors.
    pub async fn delete(&mut self, node_id: NodeId) -> Result<bool, SyncError> {
        let node = self.node(node_id)?;
        match node.kind {
            NodeKind::Leaf => {
                let (connection, item_id) = self.leaf_target(&node)?;
                let confirmed = self
                    .services
                    .prompter()
                    .confirm(
                        format!("Delete {} from {}?", node.display_name, connection.portal_name()),
                        "Delete".to_string(),
                        "Cancel".to_string(),
                    )
                    .await;
                if !confirmed {
                    return Ok(false);
                }

                connection.delete_item(&item_id, None).await?;
                self.tree.invalidate(node.parent);
                self.services
                    .emit_host_event(HostEvent::Info(format!("Deleted {}.", node.display_name)));

                Ok(true)
            }
            NodeKind::Connection => {
                self.tree.remove_connection(node_id);
                self.persist_connections()?;
                self.services.emit_host_event(HostEvent::Info(format!(
                    "Removed connection {}.",
                    node.display_name
                )));

                Ok(true)
            }
            NodeKind::Folder => Err(SyncError::UnsupportedTarget(format!(
                "Cannot delete folder {}",
                node.display_name
            ))),
        }
    }

    /// Prompts for a title and type and creates an empty JSON item under a
    /// connection or folder.
    ///
    /// Returns the new item id, or `None` when the user cancels.
    ///
    /// # Errors
    /// Returns [`SyncError::UnsupportedTarget`] for leaf targets and create
    /// errors.
    pub async fn create_item(&mut self, target_id: NodeId) -> Result<Option<String>, SyncError> {
        let target = self.node(target_id)?;
        if !target.kind.accepts_paste() {
            return Err(SyncError::UnsupportedTarget(format!(
                "Cannot create an item in {}",
                target.display_name
            )));
        }
        let connection = self.connection_for(&target)?;

        let prompter = self.services.prompter();
        let Some(title) = prompter
            .input("Item title".to_string(), String::new())
            .await
            .filter(|title| !title.trim().is_empty())
        else {
            return Ok(None);
        };
        let Some(item_type) = prompter
            .input("Item type".to_string(), DEFAULT_NEW_ITEM_TYPE.to_string())
            .await
            .filter(|item_type| !item_type.trim().is_empty())
        else {
            return Ok(None);
        };

        let item = ItemMetadata {
            title: title.trim().to_string(),
            item_type: item_type.trim().to_string(),
            ..ItemMetadata::default()
        };
        let item_id = connection
            .create_item(item, &ItemContent::Json(json!({})), folder_id_of(&target), None)
            .await?;
        self.tree.invalidate(Some(target_id));

        Ok(Some(item_id))
    }

    /// Adds a connection for `address`, prompting for it when absent, and
    /// persists the connection list.
    ///
    /// Returns the new connection node, or `None` when the user cancels or
    /// the portal is already configured.
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidEndpoint`] for unusable addresses and
    /// settings errors.
    pub async fn add_connection(
        &mut self,
        address: Option<String>,
    ) -> Result<Option<NodeId>, SyncError> {
        let address = match address {
            Some(address) => address,
            None => {
                let Some(address) = self
                    .services
                    .prompter()
                    .input("Portal URL".to_string(), DEFAULT_PORTAL.to_string())
                    .await
                else {
                    return Ok(None);
                };

                address
            }
        };
        let endpoint = normalize_endpoint(&address)
            .ok_or_else(|| SyncError::InvalidEndpoint(address.clone()))?;

        let Some(node_id) = self.insert_connection(ConnectionConfig::new(endpoint.clone())) else {
            self.services.emit_host_event(HostEvent::Info(format!(
                "{endpoint} is already connected."
            )));

            return Ok(None);
        };
        self.persist_connections()?;

        Ok(Some(node_id))
    }

    /// Drops cached children of `node_id`, or of every connection.
    pub fn refresh(&mut self, node_id: Option<NodeId>) {
        self.tree.invalidate(node_id);
    }

    async fn save_local_change(
        &mut self,
        path: &str,
        content: Vec<u8>,
    ) -> Result<SaveOutcome, SyncError> {
        let item_path =
            VirtualItemPath::parse(path).ok_or_else(|| SyncError::UnknownPath(path.to_string()))?;
        let (_, connection) = self
            .tree
            .connection_by_portal_name(&item_path.portal_name)
            .ok_or_else(|| SyncError::UnknownPath(path.to_string()))?;

        let remote = connection.fetch_item(&item_path.item_id).await?;
        if remote.raw.as_bytes() == content.as_slice() {
            debug!(path, "Local content matches portal");
            self.synced_content.insert(path.to_string(), content);

            return Ok(SaveOutcome::Unchanged);
        }

        let confirmed = self
            .services
            .prompter()
            .confirm(
                format!(
                    "Save changes to {} on {}?",
                    remote.item.title,
                    connection.portal_name()
                ),
                SAVE_CONFIRM_LABEL.to_string(),
                SAVE_DECLINE_LABEL.to_string(),
            )
            .await;
        if !confirmed {
            return Ok(SaveOutcome::Declined);
        }

        let text =
            String::from_utf8(content).map_err(|_| SyncError::InvalidContent(path.to_string()))?;
        if !is_valid_json(&text) {
            return Err(SyncError::InvalidContent(path.to_string()));
        }

        connection
            .update_item(&item_path.item_id, &ItemContent::Text(text.clone()))
            .await?;
        self.synced_content.insert(path.to_string(), text.into_bytes());
        self.services
            .emit_host_event(HostEvent::Info(format!("Saved {}.", remote.item.title)));

        Ok(SaveOutcome::Uploaded)
    }

    /// Adds a connection unless one with the same portal name exists.
    fn insert_connection(&mut self, config: ConnectionConfig) -> Option<NodeId> {
        let config = config.with_page_size(self.page_size);
        if self
            .tree
            .connection_by_portal_name(&config.portal_name())
            .is_some()
        {
            return None;
        }

        Some(self.tree.add_connection(self.services.connect(config)))
    }

    fn persist_connections(&self) -> Result<(), SyncError> {
        save_connections(self.services.settings(), &self.tree.connection_configs())
            .map_err(|error| SyncError::Settings(error.to_string()))
    }

    fn node(&self, node_id: NodeId) -> Result<Node, SyncError> {
        self.tree
            .node(node_id)
            .cloned()
            .ok_or(SyncError::UnknownNode(node_id))
    }

    fn connection_for(&self, node: &Node) -> Result<Arc<PortalConnection>, SyncError> {
        self.tree
            .connection(node.connection)
            .ok_or(SyncError::UnknownNode(node.id))
    }

    fn leaf_target(&self, node: &Node) -> Result<(Arc<PortalConnection>, String), SyncError> {
        let (NodeKind::Leaf, Some(item_id)) = (node.kind, node.remote_id.clone()) else {
            return Err(SyncError::UnsupportedTarget(format!(
                "{} is not an item",
                node.display_name
            )));
        };

        Ok((self.connection_for(node)?, item_id))
    }

    /// Returns the folder id of a leaf whose parent is a folder node.
    fn parent_folder_id(&self, node_id: NodeId) -> Option<String> {
        self.tree
            .parent(node_id)
            .filter(|parent| parent.kind == NodeKind::Folder)
            .and_then(|parent| parent.remote_id.clone())
    }
}

fn folder_id_of(node: &Node) -> Option<String> {
    match node.kind {
        NodeKind::Folder => node.remote_id.clone(),
        NodeKind::Connection | NodeKind::Leaf => None,
    }
}

fn display_title(item: &ItemMetadata, node: &Node) -> String {
    if item.title.is_empty() {
        return node.display_name.clone();
    }

    item.title.clone()
}
