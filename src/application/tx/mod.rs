//! Transaction context and post-commit deferral.

mod deferral;
mod runner;

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

pub use deferral::{DeferralKey, DeferredJob, PostCommitDeferral};
pub use runner::{Committed, DEFAULT_MAX_RETRIES, DeferredOutcome, TransactionRunner};

use crate::application::error::RenditionError;
use crate::application::repos::{NodeTransaction, StoreError};
use crate::domain::content::PropertyValue;
use crate::domain::types::{Actor, ChildAssociation, NodeId};

/// An open node-store transaction together with the identity it runs as and
/// the work it will schedule once it commits.
///
/// Implements [`NodeTransaction`] by forwarding to the store transaction, so
/// `&mut Transaction` is usable wherever `&mut dyn NodeTransaction` is expected.
pub struct Transaction {
    nodes: Box<dyn NodeTransaction>,
    actor: Actor,
    read_only: bool,
    deferred: PostCommitDeferral,
}

impl Transaction {
    pub(crate) fn new(nodes: Box<dyn NodeTransaction>, actor: Actor, read_only: bool) -> Self {
        Self {
            nodes,
            actor,
            read_only,
            deferred: PostCommitDeferral::default(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Schedules `job` to run after this transaction commits. A later job for
    /// the same key replaces the earlier one.
    pub fn defer(&mut self, key: DeferralKey, job: DeferredJob) {
        self.deferred.schedule(key, job);
    }

    pub(crate) fn commit(self) -> Result<PostCommitDeferral, RenditionError> {
        self.nodes.commit()?;
        Ok(self.deferred)
    }
}

impl Deref for Transaction {
    type Target = dyn NodeTransaction;

    fn deref(&self) -> &Self::Target {
        self.nodes.as_ref()
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.nodes.as_mut()
    }
}

impl NodeTransaction for Transaction {
    fn exists(&mut self, node: NodeId) -> Result<bool, StoreError> {
        self.nodes.exists(node)
    }

    fn node_type(&mut self, node: NodeId) -> Result<String, StoreError> {
        self.nodes.node_type(node)
    }

    fn property(&mut self, node: NodeId, name: &str) -> Result<Option<PropertyValue>, StoreError> {
        self.nodes.property(node, name)
    }

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.nodes.set_property(node, name, value)
    }

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), StoreError> {
        self.nodes.remove_property(node, name)
    }

    fn aspects(&mut self, node: NodeId) -> Result<BTreeSet<String>, StoreError> {
        self.nodes.aspects(node)
    }

    fn has_aspect(&mut self, node: NodeId, aspect: &str) -> Result<bool, StoreError> {
        self.nodes.has_aspect(node, aspect)
    }

    fn add_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError> {
        self.nodes.add_aspect(node, aspect)
    }

    fn remove_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError> {
        self.nodes.remove_aspect(node, aspect)
    }

    fn create_node(&mut self, node_type: &str) -> Result<NodeId, StoreError> {
        self.nodes.create_node(node_type)
    }

    fn create_child(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: &str,
        node_type: &str,
    ) -> Result<ChildAssociation, StoreError> {
        self.nodes.create_child(parent, assoc_type, name, node_type)
    }

    fn children(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: Option<&str>,
    ) -> Result<Vec<ChildAssociation>, StoreError> {
        self.nodes.children(parent, assoc_type, name)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        self.nodes.delete_node(node)
    }

    /// Commits node changes only. Deferred jobs run solely through
    /// [`TransactionRunner`].
    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.nodes.commit()
    }
}
