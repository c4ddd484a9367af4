//! The rendition orchestrator.
//!
//! Requests are validated inside the caller's transaction and turned into a
//! deferred job keyed by source node and rendition name. The job runs after
//! the caller commits, re-reads the source fingerprint and hands the work to
//! the [`TransformClient`]. Replies come back through [`ReplyHandler`] and are
//! applied only while the source still has the fingerprint they were
//! requested against.

mod apply;
pub(crate) mod nodes;
mod prevention;


use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, instrument};

use rendition_api_types::TransformReplyEvent;

use crate::application::dispatch::{DispatchRequest, DispatchRoute, ReplyHandler, TransformClient};
use crate::application::error::RenditionError;
use crate::application::registry::RenditionDefinitionRegistry;
use crate::application::repos::{
    BehaviourFilter, ContentStore, MetadataSink, NodeTransaction, ReplyChannel,
};
use crate::application::tx::{DeferralKey, Transaction, TransactionRunner};
use crate::domain::definitions::{RequestDefinition, TransformDefinition, metadata_media_types};
use crate::domain::fingerprint::ContentFingerprint;
use crate::domain::types::{Actor, ChildAssociation, NodeId, aspects, assocs, props};

pub use prevention::RenditionPreventionRegistry;

pub const METRIC_DISPATCH_TOTAL: &str = "rendition_dispatch_total";
pub const METRIC_STALE_REPLY_TOTAL: &str = "rendition_stale_reply_total";
pub const METRIC_CONSUME_MS: &str = "rendition_consume_ms";

const SOURCE: &str = "application::rendition";

/// Feature switches. Both must be on for requests to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionSettings {
    pub enabled: bool,
    pub thumbnails_enabled: bool,
}

impl From<&crate::config::RenditionsSettings> for RenditionSettings {
    fn from(settings: &crate::config::RenditionsSettings) -> Self {
        Self {
            enabled: settings.enabled,
            thumbnails_enabled: settings.thumbnails_enabled,
        }
    }
}

impl Default for RenditionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            thumbnails_enabled: true,
        }
    }
}

/// Everything the orchestrator is wired against.
pub struct RenditionCollaborators {
    pub runner: TransactionRunner,
    pub registry: Arc<RenditionDefinitionRegistry>,
    pub client: Arc<dyn TransformClient>,
    pub content: Arc<dyn ContentStore>,
    pub behaviours: Arc<dyn BehaviourFilter>,
    pub prevention: Arc<RenditionPreventionRegistry>,
    pub replies: Arc<dyn ReplyChannel>,
    pub metadata: Arc<dyn MetadataSink>,
}

/// Outcome of the support check made while the request was accepted.
#[derive(Debug, Clone)]
enum Support {
    Supported(DispatchRoute),
    Unsupported,
    /// The source had no content when the request was made.
    Unchecked,
}

#[derive(Clone)]
pub struct RenditionService {
    inner: Arc<Inner>,
}

struct Inner {
    settings: RenditionSettings,
    deps: RenditionCollaborators,
}

impl RenditionService {
    pub fn new(settings: RenditionSettings, deps: RenditionCollaborators) -> Self {
        Self {
            inner: Arc::new(Inner { settings, deps }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.enabled && self.inner.settings.thumbnails_enabled
    }

    pub fn registry(&self) -> &Arc<RenditionDefinitionRegistry> {
        &self.inner.deps.registry
    }

    pub fn prevention(&self) -> &Arc<RenditionPreventionRegistry> {
        &self.inner.deps.prevention
    }

    pub fn runner(&self) -> &TransactionRunner {
        &self.inner.deps.runner
    }

    /// Requests the registered rendition `rendition_name` of `source`. The
    /// transform is dispatched once `tx` commits.
    #[instrument(skip(self, tx), fields(source_node = %source))]
    pub fn render(
        &self,
        tx: &mut Transaction,
        source: NodeId,
        rendition_name: &str,
    ) -> Result<(), RenditionError> {
        let definition = self.inner.deps.registry.get(rendition_name).ok_or_else(|| {
            RenditionError::UnknownRendition {
                name: rendition_name.to_string(),
            }
        })?;
        self.request(tx, source, RequestDefinition::Rendition(definition))
    }

    /// Requests an ad hoc transform whose result goes to the definition's
    /// reply queue or, for metadata media types, to the metadata sink.
    #[instrument(skip(self, tx, definition), fields(source_node = %source, request_id = %definition.request_id()))]
    pub fn transform(
        &self,
        tx: &mut Transaction,
        source: NodeId,
        definition: Arc<TransformDefinition>,
    ) -> Result<(), RenditionError> {
        self.request(tx, source, RequestDefinition::Transform(definition))
    }

    fn request(
        &self,
        tx: &mut Transaction,
        source: NodeId,
        definition: RequestDefinition,
    ) -> Result<(), RenditionError> {
        if !self.is_enabled() {
            return Err(RenditionError::ServiceDisabled);
        }
        let label = definition.label();
        if !tx.exists(source)? {
            return Err(RenditionError::SourceNotFound {
                label,
                node: source,
            });
        }
        if let RequestDefinition::Rendition(_) = &definition {
            self.inner.deps.prevention.check(tx, source)?;
        }

        let mut surfaced = None;
        let support = match nodes::source_content(tx, source)? {
            None => Support::Unchecked,
            Some(content) => match self.inner.deps.client.check_supported(&content, &definition) {
                Ok(route) => Support::Supported(route),
                Err(err) if err.is_unsupported() => {
                    debug!(
                        target = SOURCE,
                        source_node = %source,
                        request = %label,
                        error = %err,
                        "request is not supported"
                    );
                    // Only the first request for a rendition reports this.
                    if let RequestDefinition::Rendition(rendition) = &definition
                        && nodes::rendition_association(tx, source, rendition.name())?.is_none()
                    {
                        surfaced = Some(err);
                    }
                    Support::Unsupported
                }
                Err(err) => return Err(err),
            },
        };

        let key = DeferralKey::new(source, definition.rendition_name());
        let service = self.clone();
        tx.defer(
            key,
            Arc::new(move |tx: &mut Transaction| {
                service.run_request(tx, source, &definition, &support)
            }),
        );

        match surfaced {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Body of the deferred job.
    fn run_request(
        &self,
        tx: &mut Transaction,
        source: NodeId,
        definition: &RequestDefinition,
        support: &Support,
    ) -> Result<(), RenditionError> {
        let fingerprint = nodes::source_fingerprint(tx, source)?;

        if let RequestDefinition::Rendition(rendition) = definition {
            let existing = nodes::rendition_association(tx, source, rendition.name())?
                .map(|association| association.child);
            let stored = nodes::rendition_fingerprint(tx, existing)?;
            debug!(
                target = SOURCE,
                source_node = %source,
                rendition = rendition.name(),
                fingerprint = %fingerprint,
                stored = %stored,
                "comparing fingerprints"
            );
            if stored == fingerprint {
                return Err(RenditionError::AlreadyUpToDate {
                    label: definition.label(),
                });
            }
        }

        if !fingerprint.has_content() {
            return self.failure(source, definition, fingerprint);
        }
        let route = match support {
            Support::Supported(route) => route.clone(),
            Support::Unsupported => return self.failure(source, definition, fingerprint),
            Support::Unchecked => {
                let Some(content) = nodes::source_content(tx, source)? else {
                    return self.failure(source, definition, fingerprint);
                };
                match self.inner.deps.client.check_supported(&content, definition) {
                    Ok(route) => route,
                    Err(err) if err.is_unsupported() => {
                        return self.failure(source, definition, fingerprint);
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        counter!(METRIC_DISPATCH_TOTAL).increment(1);
        self.inner.deps.client.dispatch(
            route,
            DispatchRequest {
                source,
                definition: definition.clone(),
                user: tx.actor().clone(),
                fingerprint,
                reply_to: Arc::new(self.clone()),
            },
        )
    }

    /// Whether `source` still has the content a reply was requested against.
    fn is_current(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        definition: &RequestDefinition,
        requested: ContentFingerprint,
    ) -> Result<bool, RenditionError> {
        if !tx.exists(source)? {
            debug!(
                target = SOURCE,
                source_node = %source,
                request = %definition.label(),
                "source node was deleted before the reply arrived"
            );
            return Ok(false);
        }
        let current = nodes::source_fingerprint(tx, source)?;
        if current != requested {
            debug!(
                target = SOURCE,
                source_node = %source,
                request = %definition.label(),
                fingerprint = %current,
                dispatch_fingerprint = %requested,
                "discarding stale reply"
            );
            counter!(METRIC_STALE_REPLY_TOTAL).increment(1);
            return Ok(false);
        }
        Ok(true)
    }

    fn consume_transform(
        &self,
        source: NodeId,
        result: Option<Bytes>,
        definition: &RequestDefinition,
        transform: &TransformDefinition,
        fingerprint: ContentFingerprint,
    ) -> Result<(), RenditionError> {
        let current = self.inner.deps.runner.run(Actor::System, true, |tx| {
            self.is_current(tx, source, definition, fingerprint)
        })?;
        if !current {
            return Ok(());
        }

        match transform.target_media_type() {
            metadata_media_types::EXTRACT => match result {
                Some(metadata) => Ok(self.inner.deps.metadata.set_metadata(source, metadata)?),
                None => {
                    debug!(target = SOURCE, source_node = %source, "metadata extraction failed");
                    Ok(())
                }
            },
            metadata_media_types::EMBED => match result {
                Some(content) => Ok(self
                    .inner
                    .deps
                    .metadata
                    .set_embedded_metadata(source, content)?),
                None => {
                    debug!(target = SOURCE, source_node = %source, "metadata embedding failed");
                    Ok(())
                }
            },
            _ => self.reply(source, result, transform, fingerprint),
        }
    }

    fn reply(
        &self,
        source: NodeId,
        result: Option<Bytes>,
        transform: &TransformDefinition,
        fingerprint: ContentFingerprint,
    ) -> Result<(), RenditionError> {
        let Some(queue) = transform.reply_queue() else {
            debug!(
                target = SOURCE,
                source_node = %source,
                request_id = transform.request_id(),
                "transform has no reply queue"
            );
            return Ok(());
        };
        let content_locator = match &result {
            Some(bytes) => Some(self.inner.deps.content.write(bytes)?),
            None => None,
        };
        let success = content_locator.is_some();
        debug!(
            target = SOURCE,
            source_node = %source,
            queue,
            request_id = transform.request_id(),
            success,
            "replying to transform request"
        );
        let event = TransformReplyEvent {
            request_id: transform.request_id().to_string(),
            source_node: source.as_uuid(),
            transform_name: transform.transform_name().map(str::to_string),
            client_data: transform.client_data().map(str::to_string),
            target_media_type: transform.target_media_type().to_string(),
            success,
            content_locator,
            error_message: if success {
                None
            } else {
                transform.error_message()
            },
            source_fingerprint: fingerprint.raw(),
        };
        Ok(self.inner.deps.replies.send(queue, event)?)
    }

    /// Renditions of `source` that are currently available.
    pub fn get_renditions(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
    ) -> Result<Vec<ChildAssociation>, RenditionError> {
        let associations = rendition_children(tx, source, None)?;
        let mut available = Vec::with_capacity(associations.len());
        for association in associations {
            if self.is_rendition_available(tx, source, association.child)? {
                available.push(association);
            }
        }
        Ok(available)
    }

    /// The rendition named `rendition_name`, if it is available.
    pub fn get_rendition_by_name(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        rendition_name: &str,
    ) -> Result<Option<ChildAssociation>, RenditionError> {
        let Some(association) = rendition_children(tx, source, Some(rendition_name))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        if self.is_rendition_available(tx, source, association.child)? {
            Ok(Some(association))
        } else {
            Ok(None)
        }
    }

    /// Renditions made elsewhere are always available. Ours need content and
    /// a stored fingerprint matching the source.
    pub fn is_rendition_available(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        rendition: NodeId,
    ) -> Result<bool, RenditionError> {
        if !nodes::is_engine_rendition(tx, rendition)? {
            return Ok(true);
        }
        if tx.property(rendition, props::CONTENT)?.is_none() {
            return Ok(false);
        }
        let current = nodes::source_fingerprint(tx, source)?;
        Ok(nodes::rendition_fingerprint(tx, Some(rendition))? == current)
    }

    /// Clears and re-requests every rendition this engine produced for
    /// `source` whose definition is still registered.
    #[instrument(skip(self, tx), fields(source_node = %source))]
    pub fn on_content_update(
        &self,
        tx: &mut Transaction,
        source: NodeId,
    ) -> Result<(), RenditionError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if !tx.exists(source)? {
            debug!(target = SOURCE, source_node = %source, "updated node no longer exists");
            return Ok(());
        }
        for association in rendition_children(tx, source, None)? {
            if !nodes::is_engine_rendition(tx, association.child)? {
                continue;
            }
            if !self.inner.deps.registry.is_registered(&association.name) {
                debug!(
                    target = SOURCE,
                    source_node = %source,
                    rendition = %association.name,
                    "rendition is no longer registered"
                );
                continue;
            }
            nodes::clear_content(tx, association.child)?;
            self.render(tx, source, &association.name)?;
        }
        Ok(())
    }

    pub fn is_created_by_engine(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        rendition_name: &str,
    ) -> Result<bool, RenditionError> {
        match nodes::rendition_association(tx, source, rendition_name)? {
            Some(association) => nodes::is_engine_rendition(tx, association.child),
            None => Ok(false),
        }
    }

    /// Deletes the named rendition if this engine produced it.
    pub fn delete_rendition(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        rendition_name: &str,
    ) -> Result<bool, RenditionError> {
        match nodes::rendition_association(tx, source, rendition_name)? {
            Some(association) if nodes::is_engine_rendition(tx, association.child)? => {
                tx.delete_node(association.child)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn clear_rendition_content_data(
        &self,
        tx: &mut dyn NodeTransaction,
        source: NodeId,
        rendition_name: &str,
    ) -> Result<(), RenditionError> {
        if let Some(association) = nodes::rendition_association(tx, source, rendition_name)? {
            nodes::clear_content(tx, association.child)?;
        }
        Ok(())
    }

    /// Clears `rendition` as the system actor in a transaction of its own.
    pub fn clear_rendition_content_data_in_transaction(
        &self,
        rendition: NodeId,
    ) -> Result<(), RenditionError> {
        self.inner.deps.runner.run(Actor::System, false, |tx| {
            if tx.exists(rendition)? {
                nodes::clear_content(tx, rendition)?;
            }
            Ok(())
        })
    }
}

impl ReplyHandler for RenditionService {
    fn consume(
        &self,
        source: NodeId,
        result: Option<Bytes>,
        definition: &RequestDefinition,
        fingerprint: ContentFingerprint,
    ) -> Result<(), RenditionError> {
        let started = Instant::now();
        let outcome = match definition {
            RequestDefinition::Transform(transform) => {
                self.consume_transform(source, result, definition, transform, fingerprint)
            }
            RequestDefinition::Rendition(rendition) => {
                self.inner.deps.runner.run(Actor::System, false, |tx| {
                    if !self.is_current(tx, source, definition, fingerprint)? {
                        return Ok(());
                    }
                    apply::apply_rendition(
                        tx,
                        self.inner.deps.content.as_ref(),
                        self.inner.deps.behaviours.as_ref(),
                        source,
                        rendition,
                        result.clone(),
                        fingerprint,
                    )
                })
            }
        };
        histogram!(METRIC_CONSUME_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        outcome
    }
}

/// Rendition children of `source`, looked up only once a rendition has been
/// applied to it.
fn rendition_children(
    tx: &mut dyn NodeTransaction,
    source: NodeId,
    name: Option<&str>,
) -> Result<Vec<ChildAssociation>, RenditionError> {
    if !tx.exists(source)? || !tx.has_aspect(source, aspects::RENDITIONED)? {
        return Ok(Vec::new());
    }
    Ok(tx.children(source, assocs::RENDITION, name)?)
}
