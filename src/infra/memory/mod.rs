//! In-process implementations of the collaborator traits.

mod content_store;
mod node_store;
mod recorders;

pub use content_store::{LOCATOR_SCHEME, MemoryContentStore};
pub use node_store::MemoryNodeStore;
pub use recorders::{
    BehaviourToggle, InMemoryConfigSource, MetadataCall, RecordingBehaviourFilter,
    RecordingMetadataSink, RecordingReplyChannel,
};
