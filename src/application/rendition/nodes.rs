//! Node-model reads and writes shared by the orchestrator and the clients.

use crate::application::error::RenditionError;
use crate::application::repos::NodeTransaction;
use crate::domain::content::{ContentData, PropertyValue};
use crate::domain::fingerprint::ContentFingerprint;
use crate::domain::types::{ChildAssociation, NodeId, aspects, assocs, node_types, props};

/// The node's main content, if it has any bytes to point at.
pub(crate) fn source_content(
    tx: &mut dyn NodeTransaction,
    node: NodeId,
) -> Result<Option<ContentData>, RenditionError> {
    if !tx.exists(node)? {
        return Ok(None);
    }
    let content = tx
        .property(node, props::CONTENT)?
        .and_then(|value| value.as_content().cloned())
        .filter(ContentData::has_locator);
    Ok(content)
}

/// Current fingerprint of a node's content; a missing node has no content.
pub(crate) fn source_fingerprint(
    tx: &mut dyn NodeTransaction,
    node: NodeId,
) -> Result<ContentFingerprint, RenditionError> {
    Ok(ContentFingerprint::of(source_content(tx, node)?.as_ref()))
}

pub(crate) fn rendition_association(
    tx: &mut dyn NodeTransaction,
    source: NodeId,
    name: &str,
) -> Result<Option<ChildAssociation>, RenditionError> {
    Ok(tx
        .children(source, assocs::RENDITION, Some(name))?
        .into_iter()
        .next())
}

pub(crate) fn is_engine_rendition(
    tx: &mut dyn NodeTransaction,
    rendition: NodeId,
) -> Result<bool, RenditionError> {
    Ok(tx.has_aspect(rendition, aspects::ENGINE_RENDITION)?)
}

/// Source fingerprint stored on a rendition. `RENDITION_ABSENT` when there is
/// no rendition or it was produced elsewhere; `NO_CONTENT` when the last
/// attempt left it without content.
pub(crate) fn rendition_fingerprint(
    tx: &mut dyn NodeTransaction,
    rendition: Option<NodeId>,
) -> Result<ContentFingerprint, RenditionError> {
    let Some(rendition) = rendition else {
        return Ok(ContentFingerprint::RENDITION_ABSENT);
    };
    if !is_engine_rendition(tx, rendition)? {
        return Ok(ContentFingerprint::RENDITION_ABSENT);
    }
    let stored = tx
        .property(rendition, props::RENDITION_FINGERPRINT)?
        .and_then(|value| value.as_int());
    Ok(stored.map_or(ContentFingerprint::NO_CONTENT, ContentFingerprint::from_raw))
}

pub(crate) fn create_rendition_node(
    tx: &mut dyn NodeTransaction,
    source: NodeId,
    name: &str,
) -> Result<NodeId, RenditionError> {
    let association = tx.create_child(source, assocs::RENDITION, name, node_types::RENDITION)?;
    let rendition = association.child;
    tx.set_property(rendition, props::NAME, PropertyValue::from(name))?;
    tx.set_property(rendition, props::RENDITION_NAME, PropertyValue::from(name))?;
    tx.set_property(
        rendition,
        props::CONTENT_PROPERTY_NAME,
        PropertyValue::from(props::CONTENT),
    )?;
    tx.set_property(rendition, props::INDEXED, PropertyValue::from(false))?;
    tx.add_aspect(rendition, aspects::ENGINE_RENDITION)?;
    tx.add_aspect(rendition, aspects::HIDDEN_RENDITION)?;
    Ok(rendition)
}

/// Removes the rendition's content and stored fingerprint, keeping the node.
pub(crate) fn clear_content(
    tx: &mut dyn NodeTransaction,
    rendition: NodeId,
) -> Result<(), RenditionError> {
    if tx.property(rendition, props::CONTENT)?.is_some() {
        tx.remove_property(rendition, props::CONTENT)?;
    }
    if tx.property(rendition, props::RENDITION_FINGERPRINT)?.is_some() {
        tx.remove_property(rendition, props::RENDITION_FINGERPRINT)?;
    }
    Ok(())
}

/// Records `<name>:<millis>` on the source, replacing any earlier entry for `name`.
pub(crate) fn record_last_rendered(
    tx: &mut dyn NodeTransaction,
    source: NodeId,
    name: &str,
    epoch_millis: i64,
) -> Result<(), RenditionError> {
    let prefix = format!("{name}:");
    let mut entries: Vec<String> = tx
        .property(source, props::LAST_RENDERED)?
        .and_then(|value| value.as_text_list().map(<[String]>::to_vec))
        .unwrap_or_default();
    entries.retain(|entry| !entry.starts_with(&prefix));
    entries.push(format!("{prefix}{epoch_millis}"));
    tx.set_property(source, props::LAST_RENDERED, PropertyValue::TextList(entries))?;
    if !tx.has_aspect(source, aspects::RENDITION_MODIFIED)? {
        tx.add_aspect(source, aspects::RENDITION_MODIFIED)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::NodeStore;
    use crate::infra::memory::MemoryNodeStore;

    fn source(tx: &mut dyn NodeTransaction) -> NodeId {
        tx.create_node(node_types::CONTENT).expect("create")
    }

    #[test]
    fn content_without_locator_is_absent() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let node = source(tx.as_mut());

        assert_eq!(
            source_fingerprint(tx.as_mut(), node).expect("fp"),
            ContentFingerprint::NO_CONTENT
        );
        tx.set_property(
            node,
            props::CONTENT,
            PropertyValue::from(ContentData::new("", "text/plain", 0)),
        )
        .expect("set");
        assert!(source_content(tx.as_mut(), node).expect("read").is_none());
        assert_eq!(
            source_fingerprint(tx.as_mut(), NodeId::new()).expect("missing node"),
            ContentFingerprint::NO_CONTENT
        );
    }

    #[test]
    fn rendition_fingerprint_distinguishes_absent_and_empty() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let node = source(tx.as_mut());
        assert_eq!(
            rendition_fingerprint(tx.as_mut(), None).expect("fp"),
            ContentFingerprint::RENDITION_ABSENT
        );

        let rendition = create_rendition_node(tx.as_mut(), node, "doclib").expect("create");
        assert_eq!(
            rendition_fingerprint(tx.as_mut(), Some(rendition)).expect("fp"),
            ContentFingerprint::NO_CONTENT
        );

        tx.set_property(rendition, props::RENDITION_FINGERPRINT, PropertyValue::Int(42))
            .expect("set");
        assert_eq!(
            rendition_fingerprint(tx.as_mut(), Some(rendition)).expect("fp"),
            ContentFingerprint::from_raw(42)
        );

        tx.remove_aspect(rendition, aspects::ENGINE_RENDITION)
            .expect("remove");
        assert_eq!(
            rendition_fingerprint(tx.as_mut(), Some(rendition)).expect("fp"),
            ContentFingerprint::RENDITION_ABSENT
        );
    }

    #[test]
    fn new_rendition_nodes_are_hidden_and_unindexed() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let node = source(tx.as_mut());
        let rendition = create_rendition_node(tx.as_mut(), node, "pdf").expect("create");

        assert_eq!(
            rendition_association(tx.as_mut(), node, "pdf")
                .expect("lookup")
                .map(|assoc| assoc.child),
            Some(rendition)
        );
        assert_eq!(tx.node_type(rendition).expect("type"), node_types::RENDITION);
        assert_eq!(
            tx.property(rendition, props::INDEXED).expect("prop"),
            Some(PropertyValue::Bool(false))
        );
        assert!(tx.has_aspect(rendition, aspects::HIDDEN_RENDITION).expect("aspect"));
    }

    #[test]
    fn last_rendered_keeps_one_entry_per_name() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let node = source(tx.as_mut());

        record_last_rendered(tx.as_mut(), node, "doclib", 1).expect("first");
        record_last_rendered(tx.as_mut(), node, "pdf", 2).expect("second");
        record_last_rendered(tx.as_mut(), node, "doclib", 3).expect("third");

        assert_eq!(
            tx.property(node, props::LAST_RENDERED).expect("prop"),
            Some(PropertyValue::TextList(vec![
                "pdf:2".to_string(),
                "doclib:3".to_string()
            ]))
        );
        assert!(tx.has_aspect(node, aspects::RENDITION_MODIFIED).expect("aspect"));
    }

    #[test]
    fn clearing_keeps_the_node() {
        let store = MemoryNodeStore::new();
        let mut tx = store.begin(false);
        let node = source(tx.as_mut());
        let rendition = create_rendition_node(tx.as_mut(), node, "doclib").expect("create");
        tx.set_property(
            rendition,
            props::CONTENT,
            PropertyValue::from(ContentData::new("store://r", "image/png", 5)),
        )
        .expect("content");
        tx.set_property(rendition, props::RENDITION_FINGERPRINT, PropertyValue::Int(1))
            .expect("fp");

        clear_content(tx.as_mut(), rendition).expect("clear");

        assert!(tx.exists(rendition).expect("exists"));
        assert_eq!(tx.property(rendition, props::CONTENT).expect("prop"), None);
        assert_eq!(
            tx.property(rendition, props::RENDITION_FINGERPRINT)
                .expect("prop"),
            None
        );
    }
}
