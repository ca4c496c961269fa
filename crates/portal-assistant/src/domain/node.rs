//! Tree node model shared by the tree cache and the sync controller.

use std::fmt;
use std::str::FromStr;

/// Arena id of a tree node. Ids are never reused within one tree.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse().map(Self)
    }
}

/// Stable id of a configured connection.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionId(pub(crate) u64);

/// Kind of a tree node.
///
/// The tree root itself is implicit: its children are the connection nodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// One configured portal.
    Connection,
    /// A user content folder.
    Folder,
    /// A single content item with an editable payload.
    Leaf,
}

/// Icon shown next to a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeIcon {
    Portal,
    Folder,
    File,
}

/// Per-kind rendering descriptor handed to the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NodePresentation {
    pub icon: NodeIcon,
    /// Whether the host should render the node collapsed with an expander.
    pub collapsible: bool,
    /// Whether selecting the node opens its payload.
    pub opens_on_select: bool,
}

impl NodeKind {
    /// Returns whether the node can have children.
    pub fn is_expandable(self) -> bool {
        matches!(self, Self::Connection | Self::Folder)
    }

    /// Returns whether items can be pasted into this node.
    pub fn accepts_paste(self) -> bool {
        matches!(self, Self::Connection | Self::Folder)
    }

    /// Returns how the host should render this kind of node.
    pub fn presentation(self) -> NodePresentation {
        match self {
            Self::Connection => NodePresentation {
                icon: NodeIcon::Portal,
                collapsible: true,
                opens_on_select: false,
            },
            Self::Folder => NodePresentation {
                icon: NodeIcon::Folder,
                collapsible: true,
                opens_on_select: false,
            },
            Self::Leaf => NodePresentation {
                icon: NodeIcon::File,
                collapsible: false,
                opens_on_select: true,
            },
        }
    }
}

/// Loading state of an expandable node.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExpansionState {
    #[default]
    Unexpanded,
    Loading,
    Expanded,
}

/// One node of the portal tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub display_name: String,
    pub kind: NodeKind,
    /// Portal id of the folder or item; `None` for connection nodes.
    pub remote_id: Option<String>,
    /// Parent node; `None` for connection nodes, whose parent is the root.
    pub parent: Option<NodeId>,
    pub connection: ConnectionId,
}

impl Node {
    /// Returns the presentation descriptor for this node.
    pub fn presentation(&self) -> NodePresentation {
        self.kind.presentation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_containers_are_expandable() {
        // Arrange
        let kinds = [NodeKind::Connection, NodeKind::Folder, NodeKind::Leaf];

        // Act
        let expandable = kinds.map(NodeKind::is_expandable);

        // Assert
        assert_eq!(expandable, [true, true, false]);
    }

    #[test]
    fn test_leaf_presentation_opens_on_select() {
        // Arrange
        let kind = NodeKind::Leaf;

        // Act
        let presentation = kind.presentation();

        // Assert
        assert_eq!(presentation.icon, NodeIcon::File);
        assert!(presentation.opens_on_select);
        assert!(!presentation.collapsible);
    }

    #[test]
    fn test_node_id_parses_from_text() {
        // Arrange
        let text = " 42 ";

        // Act
        let node_id = text.parse::<NodeId>();

        // Assert
        assert_eq!(node_id, Ok(NodeId(42)));
    }
}
