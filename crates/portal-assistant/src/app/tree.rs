//! Lazily populated portal tree: root, connections, folders and items.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::HostEvent;
use crate::app::connection::{PortalConnection, folder_items_query};
use crate::domain::connection::ConnectionConfig;
use crate::domain::item::{FolderInfo, ItemMetadata};
use crate::domain::node::{ConnectionId, ExpansionState, Node, NodeId, NodeKind};

struct NodeEntry {
    children: Vec<NodeId>,
    node: Node,
    state: ExpansionState,
}

struct ConnectionEntry {
    connection: Arc<PortalConnection>,
    node_id: NodeId,
}

/// Remote listing needed to expand one node.
enum Expansion {
    Connection(Arc<PortalConnection>),
    Folder(Arc<PortalConnection>, String),
}

/// Children fetched for one node, in display order.
enum Fetched {
    Folder(FolderInfo),
    Item(ItemMetadata),
}

/// Arena of tree nodes keyed by [`NodeId`].
///
/// Expanded nodes answer from cache until [`TreeCache::invalidate`] drops
/// their subtree.
pub struct TreeCache {
    connections: BTreeMap<ConnectionId, ConnectionEntry>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
    next_connection_id: u64,
    next_node_id: u64,
    nodes: HashMap<NodeId, NodeEntry>,
}

impl TreeCache {
    pub fn new(event_tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            connections: BTreeMap::new(),
            event_tx,
            next_connection_id: 0,
            next_node_id: 0,
            nodes: HashMap::new(),
        }
    }

    /// Returns the children of `parent`, or the connection nodes for the
    /// root.
    ///
    /// Unexpanded container nodes are loaded from the portal on first access.
    /// Listing failures are logged and yield no children.
    pub async fn get_children(&mut self, parent: Option<NodeId>) -> Vec<Node> {
        let Some(parent_id) = parent else {
            return self
                .connections
                .values()
                .filter_map(|entry| self.node(entry.node_id).cloned())
                .collect();
        };

        let Some(expansion) = self.begin_expansion(parent_id) else {
            return self.cached_children(parent_id);
        };
        let fetched = fetch_children(expansion).await;
        self.finish_expansion(parent_id, fetched);

        self.cached_children(parent_id)
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id).map(|entry| &entry.node)
    }

    /// Returns the loading state of a node.
    pub fn state(&self, node_id: NodeId) -> Option<ExpansionState> {
        self.nodes.get(&node_id).map(|entry| entry.state)
    }

    /// Returns the parent node of `node_id`, if it is not a root child.
    pub fn parent(&self, node_id: NodeId) -> Option<&Node> {
        self.node(node_id)
            .and_then(|node| node.parent)
            .and_then(|parent_id| self.node(parent_id))
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<Arc<PortalConnection>> {
        self.connections
            .get(&connection_id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Returns the connection that owns `node_id`.
    pub fn connection_for_node(&self, node_id: NodeId) -> Option<Arc<PortalConnection>> {
        self.node(node_id)
            .and_then(|node| self.connection(node.connection))
    }

    /// Finds a connection by the host name used as its virtual directory.
    pub fn connection_by_portal_name(
        &self,
        portal_name: &str,
    ) -> Option<(ConnectionId, Arc<PortalConnection>)> {
        self.connections.iter().find_map(|(connection_id, entry)| {
            (entry.connection.portal_name() == portal_name)
                .then(|| (*connection_id, Arc::clone(&entry.connection)))
        })
    }

    /// Adds a connection node under the root and returns its node id.
    pub fn add_connection(&mut self, connection: Arc<PortalConnection>) -> NodeId {
        let connection_id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        let node_id = self.insert_node(
            connection.portal_name(),
            NodeKind::Connection,
            None,
            None,
            connection_id,
        );
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                connection,
                node_id,
            },
        );
        self.emit_tree_changed(None);

        node_id
    }

    /// Removes a connection node with its subtree.
    ///
    /// Returns `None` when `node_id` is not a connection node.
    pub fn remove_connection(&mut self, node_id: NodeId) -> Option<Arc<PortalConnection>> {
        let node = self.node(node_id)?;
        if node.kind != NodeKind::Connection {
            return None;
        }

        let connection_id = node.connection;
        self.drop_descendants(node_id);
        self.nodes.remove(&node_id);
        let entry = self.connections.remove(&connection_id)?;
        self.emit_tree_changed(None);

        Some(entry.connection)
    }

    /// Returns the configured connections in tree order.
    pub fn connection_configs(&self) -> Vec<ConnectionConfig> {
        self.connections
            .values()
            .map(|entry| entry.connection.config().clone())
            .collect()
    }

    /// Drops the cached subtree of `node_id`, or of every connection when
    /// `None`, and tells the host to re-read it.
    pub fn invalidate(&mut self, node_id: Option<NodeId>) {
        let targets = match node_id {
            Some(node_id) => vec![node_id],
            None => self.connections.values().map(|entry| entry.node_id).collect(),
        };
        for target in targets {
            self.drop_descendants(target);
            if let Some(entry) = self.nodes.get_mut(&target) {
                entry.state = ExpansionState::Unexpanded;
            }
        }
        self.emit_tree_changed(node_id);
    }

    /// Marks an unexpanded container as loading and returns what to fetch.
    fn begin_expansion(&mut self, node_id: NodeId) -> Option<Expansion> {
        let entry = self.nodes.get(&node_id)?;
        if !entry.node.kind.is_expandable() || entry.state != ExpansionState::Unexpanded {
            return None;
        }

        let connection = self.connection(entry.node.connection)?;
        let expansion = match (entry.node.kind, entry.node.remote_id.clone()) {
            (NodeKind::Folder, Some(folder_id)) => Expansion::Folder(connection, folder_id),
            (NodeKind::Connection, _) => Expansion::Connection(connection),
            _ => return None,
        };
        if let Some(entry) = self.nodes.get_mut(&node_id) {
            entry.state = ExpansionState::Loading;
        }

        Some(expansion)
    }

    fn finish_expansion(&mut self, parent_id: NodeId, fetched: Vec<Fetched>) {
        let Some(connection_id) = self.node(parent_id).map(|node| node.connection) else {
            return;
        };

        let children = fetched
            .into_iter()
            .map(|child| match child {
                Fetched::Folder(folder) => self.insert_node(
                    folder.title,
                    NodeKind::Folder,
                    Some(folder.id),
                    Some(parent_id),
                    connection_id,
                ),
                Fetched::Item(item) => self.insert_node(
                    leaf_display_name(&item),
                    NodeKind::Leaf,
                    Some(item.id),
                    Some(parent_id),
                    connection_id,
                ),
            })
            .collect();

        if let Some(entry) = self.nodes.get_mut(&parent_id) {
            entry.children = children;
            entry.state = ExpansionState::Expanded;
        }
    }

    fn cached_children(&self, parent_id: NodeId) -> Vec<Node> {
        self.nodes
            .get(&parent_id)
            .map(|entry| {
                entry
                    .children
                    .iter()
                    .filter_map(|child_id| self.node(*child_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert_node(
        &mut self,
        display_name: String,
        kind: NodeKind,
        remote_id: Option<String>,
        parent: Option<NodeId>,
        connection: ConnectionId,
    ) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            NodeEntry {
                children: Vec::new(),
                node: Node {
                    id,
                    display_name,
                    kind,
                    remote_id,
                    parent,
                    connection,
                },
                state: ExpansionState::Unexpanded,
            },
        );

        id
    }

    fn drop_descendants(&mut self, node_id: NodeId) {
        let mut pending = self
            .nodes
            .get_mut(&node_id)
            .map(|entry| std::mem::take(&mut entry.children))
            .unwrap_or_default();
        while let Some(child_id) = pending.pop() {
            if let Some(entry) = self.nodes.remove(&child_id) {
                pending.extend(entry.children);
            }
        }
    }

    fn emit_tree_changed(&self, node_id: Option<NodeId>) {
        let _ = self.event_tx.send(HostEvent::TreeChanged(node_id));
    }
}

/// Returns the `"{title} ({type})"` label of an item node.
pub fn leaf_display_name(item: &ItemMetadata) -> String {
    format!("{} ({})", item.title, item.item_type)
}

async fn fetch_children(expansion: Expansion) -> Vec<Fetched> {
    match expansion {
        Expansion::Connection(connection) => {
            debug!(portal = %connection.portal_name(), "Expanding connection");
            let (folders, items) = tokio::join!(
                connection.list_folders(None),
                connection.list_items(None, None)
            );
            let folders = folders.unwrap_or_else(|error| {
                warn!(portal = %connection.portal_name(), %error, "Failed to list folders");

                Vec::new()
            });
            let items = items.unwrap_or_else(|error| {
                warn!(portal = %connection.portal_name(), %error, "Failed to list items");

                Vec::new()
            });

            folders
                .into_iter()
                .map(Fetched::Folder)
                .chain(items.into_iter().map(Fetched::Item))
                .collect()
        }
        Expansion::Folder(connection, folder_id) => {
            debug!(portal = %connection.portal_name(), folder_id, "Expanding folder");
            match connection
                .list_items(Some(folder_items_query(&folder_id)), None)
                .await
            {
                Ok(items) => items.into_iter().map(Fetched::Item).collect(),
                Err(error) => {
                    warn!(
                        portal = %connection.portal_name(),
                        folder_id,
                        %error,
                        "Failed to list folder items"
                    );

                    Vec::new()
                }
            }
        }
    }
}
