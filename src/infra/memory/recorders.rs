//! Collaborators that remember what they were asked to do.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

use rendition_api_types::TransformReplyEvent;

use crate::application::registry::{ConfigDocument, ConfigSource, ConfigSourceError};
use crate::application::repos::{Behaviour, BehaviourFilter, MetadataSink, ReplyChannel, SinkError};
use crate::domain::types::NodeId;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "infra::memory::recorders";

/// Tracks per-node suppression depth and every toggle in order.
#[derive(Debug, Default)]
pub struct RecordingBehaviourFilter {
    state: Mutex<FilterState>,
}

#[derive(Debug, Default)]
struct FilterState {
    depth: HashMap<(NodeId, Behaviour), u32>,
    history: Vec<BehaviourToggle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviourToggle {
    pub node: NodeId,
    pub behaviour: Behaviour,
    pub enabled: bool,
}

impl RecordingBehaviourFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self, node: NodeId, behaviour: Behaviour) -> bool {
        mutex_lock(&self.state, SOURCE, "is_disabled")
            .depth
            .get(&(node, behaviour))
            .is_some_and(|depth| *depth > 0)
    }

    /// True when every disable has been matched by an enable.
    pub fn is_balanced(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_balanced")
            .depth
            .values()
            .all(|depth| *depth == 0)
    }

    pub fn history(&self) -> Vec<BehaviourToggle> {
        mutex_lock(&self.state, SOURCE, "history").history.clone()
    }
}

impl BehaviourFilter for RecordingBehaviourFilter {
    fn disable(&self, node: NodeId, behaviour: Behaviour) {
        let mut state = mutex_lock(&self.state, SOURCE, "disable");
        *state.depth.entry((node, behaviour)).or_default() += 1;
        state.history.push(BehaviourToggle {
            node,
            behaviour,
            enabled: false,
        });
    }

    fn enable(&self, node: NodeId, behaviour: Behaviour) {
        let mut state = mutex_lock(&self.state, SOURCE, "enable");
        let depth = state.depth.entry((node, behaviour)).or_default();
        *depth = depth.saturating_sub(1);
        state.history.push(BehaviourToggle {
            node,
            behaviour,
            enabled: true,
        });
    }
}

/// Collects reply events per queue.
#[derive(Debug, Default)]
pub struct RecordingReplyChannel {
    sent: Mutex<Vec<(String, TransformReplyEvent)>>,
}

impl RecordingReplyChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, TransformReplyEvent)> {
        mutex_lock(&self.sent, SOURCE, "sent").clone()
    }
}

impl ReplyChannel for RecordingReplyChannel {
    fn send(&self, queue: &str, event: TransformReplyEvent) -> Result<(), SinkError> {
        if queue.trim().is_empty() {
            return Err(SinkError::new("reply channel", "queue name is blank"));
        }
        mutex_lock(&self.sent, SOURCE, "send").push((queue.to_string(), event));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataCall {
    Extracted { node: NodeId, metadata: Bytes },
    Embedded { node: NodeId, content: Bytes },
}

#[derive(Debug, Default)]
pub struct RecordingMetadataSink {
    calls: Mutex<Vec<MetadataCall>>,
}

impl RecordingMetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MetadataCall> {
        mutex_lock(&self.calls, SOURCE, "calls").clone()
    }
}

impl MetadataSink for RecordingMetadataSink {
    fn set_metadata(&self, node: NodeId, metadata: Bytes) -> Result<(), SinkError> {
        mutex_lock(&self.calls, SOURCE, "set_metadata")
            .push(MetadataCall::Extracted { node, metadata });
        Ok(())
    }

    fn set_embedded_metadata(&self, node: NodeId, content: Bytes) -> Result<(), SinkError> {
        mutex_lock(&self.calls, SOURCE, "set_embedded_metadata")
            .push(MetadataCall::Embedded { node, content });
        Ok(())
    }
}

/// Config source whose documents are replaced by hand.
#[derive(Debug)]
pub struct InMemoryConfigSource {
    name: String,
    documents: Mutex<Result<Vec<ConfigDocument>, String>>,
}

impl InMemoryConfigSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Mutex::new(Ok(Vec::new())),
        }
    }

    pub fn set_document(&self, name: impl Into<String>, text: impl Into<String>) {
        *mutex_lock(&self.documents, SOURCE, "set_document") = Ok(vec![ConfigDocument {
            name: name.into(),
            text: text.into(),
        }]);
    }

    /// Makes every following read fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *mutex_lock(&self.documents, SOURCE, "fail_with") = Err(message.into());
    }
}

impl ConfigSource for InMemoryConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_documents(&self) -> Result<Vec<ConfigDocument>, ConfigSourceError> {
        mutex_lock(&self.documents, SOURCE, "read_documents")
            .clone()
            .map_err(|message| ConfigSourceError::new(self.name.clone(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_suppression_needs_matching_enables() {
        let filter = RecordingBehaviourFilter::new();
        let node = NodeId::new();

        filter.disable(node, Behaviour::Auditable);
        filter.disable(node, Behaviour::Auditable);
        filter.enable(node, Behaviour::Auditable);
        assert!(filter.is_disabled(node, Behaviour::Auditable));
        assert!(!filter.is_balanced());

        filter.enable(node, Behaviour::Auditable);
        assert!(!filter.is_disabled(node, Behaviour::Auditable));
        assert!(filter.is_balanced());
        assert_eq!(filter.history().len(), 4);
    }

    #[test]
    fn blank_queues_are_rejected() {
        let channel = RecordingReplyChannel::new();
        let event = TransformReplyEvent {
            request_id: "r".to_string(),
            source_node: NodeId::new().as_uuid(),
            transform_name: None,
            client_data: None,
            target_media_type: "text/plain".to_string(),
            success: false,
            content_locator: None,
            error_message: None,
            source_fingerprint: -1,
        };

        assert!(channel.send(" ", event.clone()).is_err());
        channel.send("replies", event).expect("sent");
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn config_source_can_be_made_to_fail() {
        let source = InMemoryConfigSource::new("memory");
        source.set_document("a.json", "{}");
        assert_eq!(source.read_documents().expect("docs").len(), 1);

        source.fail_with("unreachable");
        let err = source.read_documents().expect_err("fails");
        assert_eq!(err.source_name, "memory");
    }
}
