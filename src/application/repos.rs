//! Collaborator traits the engine is wired against.
//!
//! Node storage is transactional and synchronous: a [`NodeTransaction`] sees
//! its own writes and publishes them atomically on commit. Everything else
//! here (content bytes, reply queues, metadata sinks) is non-transactional.

use std::collections::BTreeSet;

use bytes::Bytes;
use thiserror::Error;

use rendition_api_types::TransformReplyEvent;

use crate::domain::content::PropertyValue;
use crate::domain::definitions::RenditionOptions;
use crate::domain::types::{ChildAssociation, NodeId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node `{0}` not found")]
    NodeNotFound(NodeId),
    #[error("content `{0}` not found")]
    ContentNotFound(String),
    /// Another transaction committed a write to the same node first.
    #[error("write conflict on node `{node}`")]
    Conflict { node: NodeId },
    #[error("transaction is read-only")]
    ReadOnly,
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Failure to hand a result to a non-transactional collaborator.
#[derive(Debug, Error)]
#[error("{target} rejected delivery: {message}")]
pub struct SinkError {
    pub target: &'static str,
    pub message: String,
}

impl SinkError {
    pub fn new(target: &'static str, message: impl Into<String>) -> Self {
        Self {
            target,
            message: message.into(),
        }
    }
}

pub trait NodeStore: Send + Sync {
    fn begin(&self, read_only: bool) -> Box<dyn NodeTransaction>;
}

/// Unit of work against the node store. Dropping without [`commit`](Self::commit) rolls back.
pub trait NodeTransaction: Send {
    fn exists(&mut self, node: NodeId) -> Result<bool, StoreError>;

    fn node_type(&mut self, node: NodeId) -> Result<String, StoreError>;

    fn property(&mut self, node: NodeId, name: &str) -> Result<Option<PropertyValue>, StoreError>;

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError>;

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), StoreError>;

    fn aspects(&mut self, node: NodeId) -> Result<BTreeSet<String>, StoreError>;

    fn has_aspect(&mut self, node: NodeId, aspect: &str) -> Result<bool, StoreError> {
        Ok(self.aspects(node)?.contains(aspect))
    }

    fn add_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError>;

    fn remove_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError>;

    /// Creates a parentless node.
    fn create_node(&mut self, node_type: &str) -> Result<NodeId, StoreError>;

    fn create_child(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: &str,
        node_type: &str,
    ) -> Result<ChildAssociation, StoreError>;

    /// Children of `parent` over `assoc_type`, optionally restricted to one association name.
    fn children(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: Option<&str>,
    ) -> Result<Vec<ChildAssociation>, StoreError>;

    /// Deletes the node, its children, and its association to its parent.
    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Binary content storage addressed by locator.
pub trait ContentStore: Send + Sync {
    fn read(&self, locator: &str) -> Result<Bytes, StoreError>;

    /// Stores bytes and returns their new locator.
    fn write(&self, bytes: &[u8]) -> Result<String, StoreError>;
}

/// Policy behaviours that fire on node updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behaviour {
    Auditable,
    Versionable,
    UpdateRules,
}

impl Behaviour {
    pub const ALL: [Behaviour; 3] = [
        Behaviour::Auditable,
        Behaviour::Versionable,
        Behaviour::UpdateRules,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Behaviour::Auditable => "auditable",
            Behaviour::Versionable => "versionable",
            Behaviour::UpdateRules => "update_rules",
        }
    }
}

/// Per-node switch for update side effects. Calls nest: each `disable` is
/// balanced by one `enable`.
pub trait BehaviourFilter: Send + Sync {
    fn disable(&self, node: NodeId, behaviour: Behaviour);
    fn enable(&self, node: NodeId, behaviour: Behaviour);
}

/// Answers which transforms exist and how large a source each accepts.
pub trait TransformCapabilities: Send + Sync {
    /// Largest supported source size in bytes. `Some(-1)` is unlimited, `None`
    /// is unsupported, `Some(0)` is effectively disabled.
    fn find_max_size(
        &self,
        source_media_type: &str,
        target_media_type: &str,
        options: &RenditionOptions,
        rendition_name: Option<&str>,
    ) -> Option<i64>;

    fn is_supported(
        &self,
        source_media_type: &str,
        source_size: i64,
        target_media_type: &str,
        options: &RenditionOptions,
        rendition_name: Option<&str>,
    ) -> bool {
        match self.find_max_size(source_media_type, target_media_type, options, rendition_name) {
            Some(-1) => true,
            Some(max) => max != 0 && source_size <= max,
            None => false,
        }
    }
}

/// Outbound channel for ad hoc transform replies.
pub trait ReplyChannel: Send + Sync {
    fn send(&self, queue: &str, event: TransformReplyEvent) -> Result<(), SinkError>;
}

/// Receives the results of metadata extraction and embedding transforms.
pub trait MetadataSink: Send + Sync {
    fn set_metadata(&self, node: NodeId, metadata: Bytes) -> Result<(), SinkError>;
    fn set_embedded_metadata(&self, node: NodeId, content: Bytes) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<i64>);

    impl TransformCapabilities for Fixed {
        fn find_max_size(
            &self,
            _source: &str,
            _target: &str,
            _options: &RenditionOptions,
            _name: Option<&str>,
        ) -> Option<i64> {
            self.0
        }
    }

    #[test]
    fn support_follows_max_size() {
        let options = RenditionOptions::new();
        assert!(Fixed(Some(-1)).is_supported("a", i64::MAX, "b", &options, None));
        assert!(Fixed(Some(10)).is_supported("a", 10, "b", &options, None));
        assert!(!Fixed(Some(10)).is_supported("a", 11, "b", &options, None));
        assert!(!Fixed(Some(0)).is_supported("a", 0, "b", &options, None));
        assert!(!Fixed(None).is_supported("a", 1, "b", &options, None));
    }
}
