use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::application::error::RenditionError;
use crate::application::repos::NodeTransaction;
use crate::domain::types::NodeId;
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "application::rendition::prevention";

/// Content classes, node types or aspects, whose nodes must never be renditioned.
#[derive(Debug, Default)]
pub struct RenditionPreventionRegistry {
    classes: RwLock<BTreeSet<String>>,
}

impl RenditionPreventionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, content_class: impl Into<String>) {
        rw_write(&self.classes, SOURCE, "register").insert(content_class.into());
    }

    pub fn unregister(&self, content_class: &str) -> bool {
        rw_write(&self.classes, SOURCE, "unregister").remove(content_class)
    }

    pub fn is_registered(&self, content_class: &str) -> bool {
        rw_read(&self.classes, SOURCE, "is_registered").contains(content_class)
    }

    pub fn classes(&self) -> Vec<String> {
        rw_read(&self.classes, SOURCE, "classes").iter().cloned().collect()
    }

    /// Fails with `Prevented` when the node's type or any of its aspects is registered.
    pub(crate) fn check(
        &self,
        tx: &mut dyn NodeTransaction,
        node: NodeId,
    ) -> Result<(), RenditionError> {
        let classes = rw_read(&self.classes, SOURCE, "check").clone();
        if classes.is_empty() {
            return Ok(());
        }
        let node_type = tx.node_type(node)?;
        if classes.contains(&node_type) {
            return Err(RenditionError::Prevented {
                node,
                content_class: node_type,
            });
        }
        match tx.aspects(node)?.intersection(&classes).next() {
            Some(aspect) => Err(RenditionError::Prevented {
                node,
                content_class: aspect.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::NodeStore;
    use crate::domain::types::node_types;
    use crate::infra::memory::MemoryNodeStore;

    #[test]
    fn prevents_by_type_and_by_aspect() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let plain = tx.create_node(node_types::CONTENT).expect("plain");
        let secret = tx.create_node(node_types::CONTENT).expect("secret");
        tx.add_aspect(secret, "classified").expect("aspect");

        let registry = RenditionPreventionRegistry::new();
        assert!(registry.check(tx.as_mut(), plain).is_ok());

        registry.register("classified");
        assert!(registry.check(tx.as_mut(), plain).is_ok());
        match registry.check(tx.as_mut(), secret) {
            Err(RenditionError::Prevented { content_class, .. }) => {
                assert_eq!(content_class, "classified")
            }
            other => panic!("expected prevention, got {other:?}"),
        }

        registry.register(node_types::CONTENT);
        assert!(registry.check(tx.as_mut(), plain).is_err());
        assert!(registry.unregister(node_types::CONTENT));
        assert_eq!(registry.classes(), vec!["classified".to_string()]);
    }
}
