//! Identifiers and the names of the node-model elements the engine reads and writes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a node in the content repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node://{}", self.0)
    }
}

/// Identity a unit of work runs as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    System,
    User(String),
}

impl Actor {
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Actor::System => "system",
            Actor::User(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Node types.
pub mod node_types {
    pub const CONTENT: &str = "content";
    pub const RENDITION: &str = "rendition";
}

/// Property names.
pub mod props {
    /// Main content of a node, holding a [`ContentData`](crate::domain::content::ContentData).
    pub const CONTENT: &str = "content";
    pub const NAME: &str = "name";
    pub const RENDITION_NAME: &str = "rendition_name";
    pub const CONTENT_PROPERTY_NAME: &str = "content_property_name";
    pub const INDEXED: &str = "indexed";
    /// Source fingerprint a rendition was produced from.
    pub const RENDITION_FINGERPRINT: &str = "rendition_fingerprint";
    /// `<rendition>:<epoch millis>` entries, one per rendition name.
    pub const LAST_RENDERED: &str = "last_rendered";
}

/// Aspect names.
pub mod aspects {
    /// Marks a rendition node produced by this engine.
    pub const ENGINE_RENDITION: &str = "engine_rendition";
    /// Marks a source node that has had a rendition applied.
    pub const RENDITIONED: &str = "renditioned";
    pub const HIDDEN_RENDITION: &str = "hidden_rendition";
    pub const RENDITION_MODIFIED: &str = "rendition_modified";
    pub const AUDITABLE: &str = "auditable";
    pub const VERSIONABLE: &str = "versionable";
}

/// Child association types.
pub mod assocs {
    pub const RENDITION: &str = "rendition";
}

/// A typed, named link from a parent node to a child node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildAssociation {
    pub parent: NodeId,
    pub assoc_type: String,
    pub name: String,
    pub child: NodeId,
}
