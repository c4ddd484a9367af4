use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::application::repos::{NodeStore, NodeTransaction, StoreError};
use crate::domain::content::PropertyValue;
use crate::domain::types::{ChildAssociation, NodeId};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory::node_store";

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: String,
    properties: BTreeMap<String, PropertyValue>,
    aspects: BTreeSet<String>,
    parent: Option<ChildAssociation>,
    children: Vec<ChildAssociation>,
    /// Bumped on every committed write.
    version: u64,
}

impl NodeRecord {
    fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            properties: BTreeMap::new(),
            aspects: BTreeSet::new(),
            parent: None,
            children: Vec::new(),
            version: 0,
        }
    }
}

type Nodes = HashMap<NodeId, NodeRecord>;

/// Node store kept in process memory with optimistic concurrency: the first
/// transaction to commit a write to a node wins, later writers conflict.
#[derive(Debug, Default, Clone)]
pub struct MemoryNodeStore {
    nodes: Arc<RwLock<Nodes>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed nodes.
    pub fn len(&self) -> usize {
        rw_read(&self.nodes, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStore for MemoryNodeStore {
    fn begin(&self, read_only: bool) -> Box<dyn NodeTransaction> {
        Box::new(MemoryTransaction {
            nodes: Arc::clone(&self.nodes),
            read_only,
            working: HashMap::new(),
            dirty: BTreeSet::new(),
        })
    }
}

/// A node as first loaded by a transaction, plus the transaction's edits.
struct WorkingCopy {
    base_version: Option<u64>,
    record: Option<NodeRecord>,
}

struct MemoryTransaction {
    nodes: Arc<RwLock<Nodes>>,
    read_only: bool,
    working: HashMap<NodeId, WorkingCopy>,
    dirty: BTreeSet<NodeId>,
}

impl MemoryTransaction {
    fn load(&mut self, node: NodeId) -> &mut Option<NodeRecord> {
        let nodes = &self.nodes;
        &mut self
            .working
            .entry(node)
            .or_insert_with(|| {
                let committed = rw_read(nodes, SOURCE, "load").get(&node).cloned();
                WorkingCopy {
                    base_version: committed.as_ref().map(|record| record.version),
                    record: committed,
                }
            })
            .record
    }

    fn read(&mut self, node: NodeId) -> Result<&NodeRecord, StoreError> {
        self.load(node)
            .as_ref()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn write(&mut self, node: NodeId) -> Result<&mut NodeRecord, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.dirty.insert(node);
        self.load(node)
            .as_mut()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn insert(&mut self, node: NodeId, record: NodeRecord) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.dirty.insert(node);
        *self.load(node) = Some(record);
        Ok(())
    }

    fn remove(&mut self, node: NodeId) -> Result<Option<NodeRecord>, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.dirty.insert(node);
        Ok(self.load(node).take())
    }
}

impl NodeTransaction for MemoryTransaction {
    fn exists(&mut self, node: NodeId) -> Result<bool, StoreError> {
        Ok(self.load(node).is_some())
    }

    fn node_type(&mut self, node: NodeId) -> Result<String, StoreError> {
        Ok(self.read(node)?.node_type.clone())
    }

    fn property(&mut self, node: NodeId, name: &str) -> Result<Option<PropertyValue>, StoreError> {
        Ok(self.read(node)?.properties.get(name).cloned())
    }

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.write(node)?.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), StoreError> {
        self.write(node)?.properties.remove(name);
        Ok(())
    }

    fn aspects(&mut self, node: NodeId) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.read(node)?.aspects.clone())
    }

    fn has_aspect(&mut self, node: NodeId, aspect: &str) -> Result<bool, StoreError> {
        Ok(self.read(node)?.aspects.contains(aspect))
    }

    fn add_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError> {
        self.write(node)?.aspects.insert(aspect.to_string());
        Ok(())
    }

    fn remove_aspect(&mut self, node: NodeId, aspect: &str) -> Result<(), StoreError> {
        self.write(node)?.aspects.remove(aspect);
        Ok(())
    }

    fn create_node(&mut self, node_type: &str) -> Result<NodeId, StoreError> {
        let node = NodeId::new();
        self.insert(node, NodeRecord::new(node_type))?;
        Ok(node)
    }

    fn create_child(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: &str,
        node_type: &str,
    ) -> Result<ChildAssociation, StoreError> {
        let child = NodeId::new();
        let association = ChildAssociation {
            parent,
            assoc_type: assoc_type.to_string(),
            name: name.to_string(),
            child,
        };
        self.write(parent)?.children.push(association.clone());
        let mut record = NodeRecord::new(node_type);
        record.parent = Some(association.clone());
        self.insert(child, record)?;
        Ok(association)
    }

    fn children(
        &mut self,
        parent: NodeId,
        assoc_type: &str,
        name: Option<&str>,
    ) -> Result<Vec<ChildAssociation>, StoreError> {
        Ok(self
            .read(parent)?
            .children
            .iter()
            .filter(|association| association.assoc_type == assoc_type)
            .filter(|association| name.is_none_or(|name| association.name == name))
            .cloned()
            .collect())
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        let record = self.remove(node)?.ok_or(StoreError::NodeNotFound(node))?;
        if let Some(association) = &record.parent
            && self.exists(association.parent)?
        {
            self.write(association.parent)?
                .children
                .retain(|sibling| sibling.child != node);
        }
        for association in record.children {
            if self.exists(association.child)? {
                self.delete_node(association.child)?;
            }
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.dirty.is_empty() {
            return Ok(());
        }
        let mut nodes = rw_write(&this.nodes, SOURCE, "commit");
        for node in &this.dirty {
            let base = this.working.get(node).and_then(|copy| copy.base_version);
            let current = nodes.get(node).map(|record| record.version);
            if base != current {
                return Err(StoreError::Conflict { node: *node });
            }
        }
        let mut working = this.working;
        for node in this.dirty {
            let Some(copy) = working.remove(&node) else {
                continue;
            };
            match copy.record {
                Some(mut record) => {
                    record.version = copy.base_version.map_or(1, |version| version + 1);
                    nodes.insert(node, record);
                }
                None => {
                    nodes.remove(&node);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed_node(store: &MemoryNodeStore) -> NodeId {
        let mut tx = store.begin(false);
        let node = tx.create_node("content").expect("create");
        tx.commit().expect("commit");
        node
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let store = MemoryNodeStore::new();
        let node = committed_node(&store);

        let mut writer = store.begin(false);
        writer
            .set_property(node, "title", PropertyValue::from("draft"))
            .expect("set");

        let mut reader = store.begin(true);
        assert_eq!(reader.property(node, "title").expect("read"), None);

        writer.commit().expect("commit");
        let mut reader = store.begin(true);
        assert_eq!(
            reader.property(node, "title").expect("read"),
            Some(PropertyValue::from("draft"))
        );
    }

    #[test]
    fn first_committer_wins() {
        let store = MemoryNodeStore::new();
        let node = committed_node(&store);

        let mut first = store.begin(false);
        let mut second = store.begin(false);
        first
            .set_property(node, "title", PropertyValue::from("one"))
            .expect("set");
        second
            .set_property(node, "title", PropertyValue::from("two"))
            .expect("set");

        first.commit().expect("first commits");
        match second.commit() {
            Err(StoreError::Conflict { node: conflicted }) => assert_eq!(conflicted, node),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn reads_are_not_validated() {
        let store = MemoryNodeStore::new();
        let node = committed_node(&store);

        let mut reader = store.begin(false);
        reader.property(node, "title").expect("read");
        let other = reader.create_node("content").expect("create");

        let mut writer = store.begin(false);
        writer
            .set_property(node, "title", PropertyValue::from("x"))
            .expect("set");
        writer.commit().expect("writer commits");

        reader.commit().expect("reader only wrote its own node");
        assert!(store.begin(true).exists(other).expect("exists"));
    }

    #[test]
    fn read_only_transactions_reject_writes() {
        let store = MemoryNodeStore::new();
        let node = committed_node(&store);
        let mut tx = store.begin(true);

        assert!(matches!(
            tx.add_aspect(node, "hidden"),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(tx.create_node("content"), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn deleting_a_node_detaches_and_removes_its_subtree() {
        let store = MemoryNodeStore::new();
        let parent = committed_node(&store);

        let mut tx = store.begin(false);
        let child = tx
            .create_child(parent, "rendition", "doclib", "rendition")
            .expect("child")
            .child;
        let grandchild = tx
            .create_child(child, "rendition", "nested", "rendition")
            .expect("grandchild")
            .child;
        tx.commit().expect("commit");

        let mut tx = store.begin(false);
        assert_eq!(
            tx.children(parent, "rendition", Some("doclib"))
                .expect("children")
                .len(),
            1
        );
        tx.delete_node(child).expect("delete");
        tx.commit().expect("commit");

        let mut tx = store.begin(true);
        assert!(tx.children(parent, "rendition", None).expect("children").is_empty());
        assert!(!tx.exists(child).expect("exists"));
        assert!(!tx.exists(grandchild).expect("exists"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dropping_a_transaction_rolls_back() {
        let store = MemoryNodeStore::new();
        {
            let mut tx = store.begin(false);
            tx.create_node("content").expect("create");
        }
        assert!(store.is_empty());
    }
}
