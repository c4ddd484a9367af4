//! Hand-off of transform work to engines.
//!
//! A [`TransformClient`] first answers whether it can serve a request,
//! returning a [`DispatchRoute`], and later accepts the request for
//! asynchronous execution along that route. Results come back through the
//! request's [`ReplyHandler`].

mod legacy;
mod local;
mod switching;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

use crate::application::error::RenditionError;
use crate::application::rendition::nodes::source_content;
use crate::application::repos::ContentStore;
use crate::application::tx::TransactionRunner;
use crate::domain::content::ContentData;
use crate::domain::definitions::RequestDefinition;
use crate::domain::fingerprint::ContentFingerprint;
use crate::domain::types::{Actor, NodeId};

pub use legacy::{LegacyTransformClient, SynchronousTransformer};
pub use local::{LocalTransformClient, TransformRequest, Transformer};
pub use switching::SwitchingTransformClient;

pub const METRIC_FAILURE_TOTAL: &str = "rendition_failure_total";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives the outcome of a dispatched request.
pub trait ReplyHandler: Send + Sync {
    fn consume(
        &self,
        source: NodeId,
        result: Option<Bytes>,
        definition: &RequestDefinition,
        fingerprint: ContentFingerprint,
    ) -> Result<(), RenditionError>;

    fn failure(
        &self,
        source: NodeId,
        definition: &RequestDefinition,
        fingerprint: ContentFingerprint,
    ) -> Result<(), RenditionError> {
        self.consume(source, None, definition, fingerprint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStep {
    Primary,
    Secondary,
}

/// Branch choices made by switching clients during the support check,
/// outermost first. A leaf client only accepts an empty route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRoute {
    steps: VecDeque<RouteStep>,
}

impl DispatchRoute {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn via(mut self, step: RouteStep) -> Self {
        self.steps.push_front(step);
        self
    }

    pub fn next_step(&mut self) -> Option<RouteStep> {
        self.steps.pop_front()
    }

    pub fn is_direct(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = RouteStep> + '_ {
        self.steps.iter().copied()
    }

    fn expect_direct(&self, client: &str) -> Result<(), RenditionError> {
        if self.is_direct() {
            Ok(())
        } else {
            Err(RenditionError::routing(format!(
                "{client} client received route {:?}",
                self.steps
            )))
        }
    }
}

#[derive(Clone)]
pub struct DispatchRequest {
    pub source: NodeId,
    pub definition: RequestDefinition,
    pub user: Actor,
    /// Source fingerprint the request was made against.
    pub fingerprint: ContentFingerprint,
    pub reply_to: Arc<dyn ReplyHandler>,
}

pub trait TransformClient: Send + Sync {
    fn check_supported(
        &self,
        source: &ContentData,
        definition: &RequestDefinition,
    ) -> Result<DispatchRoute, RenditionError>;

    /// Accepts the request for asynchronous execution. Returns once queued.
    fn dispatch(&self, route: DispatchRoute, request: DispatchRequest)
    -> Result<(), RenditionError>;
}

/// Name the capability lookup is keyed by: the rendition, or the transform's own name.
fn capability_name(definition: &RequestDefinition) -> Option<&str> {
    match definition {
        RequestDefinition::Rendition(definition) => Some(definition.name()),
        RequestDefinition::Transform(definition) => definition.transform_name(),
    }
}

/// Reads the source's content descriptor and bytes as the requesting user.
fn read_source(
    runner: &TransactionRunner,
    content: &dyn ContentStore,
    request: &DispatchRequest,
) -> Result<(ContentData, Bytes), TransformError> {
    let data = runner
        .run(request.user.clone(), true, |tx| source_content(tx, request.source))
        .map_err(|err| TransformError::new(err.to_string()))?
        .ok_or_else(|| TransformError::new("source has no content"))?;
    let bytes = content
        .read(&data.locator)
        .map_err(|err| TransformError::new(err.to_string()))?;
    Ok((data, bytes))
}

/// Hands a finished transform to the request's reply handler.
fn deliver(request: &DispatchRequest, outcome: Result<Bytes, TransformError>) {
    let result = match outcome {
        Ok(bytes) => request.reply_to.consume(
            request.source,
            Some(bytes),
            &request.definition,
            request.fingerprint,
        ),
        Err(err) => {
            warn!(
                target = "application::dispatch",
                source_node = %request.source,
                request = %request.definition.label(),
                error = %err,
                "transform failed"
            );
            counter!(METRIC_FAILURE_TOTAL).increment(1);
            if let RequestDefinition::Transform(definition) = &request.definition {
                definition.set_error_message(err.0);
            }
            request
                .reply_to
                .failure(request.source, &request.definition, request.fingerprint)
        }
    };
    if let Err(err) = result {
        warn!(
            target = "application::dispatch",
            source_node = %request.source,
            request = %request.definition.label(),
            error = %err,
            "reply handling failed"
        );
    }
}

/// Count of dispatched requests whose reply has not been handled yet.
#[derive(Clone, Default)]
pub struct InFlightDispatches {
    inner: Arc<InFlightState>,
}

#[derive(Default)]
struct InFlightState {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlightDispatches {
    pub fn enter(&self) -> DispatchGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        DispatchGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once no dispatch is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

pub struct DispatchGuard {
    inner: Arc<InFlightState>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_pop_outermost_first() {
        let mut route = DispatchRoute::direct()
            .via(RouteStep::Secondary)
            .via(RouteStep::Primary);

        assert_eq!(
            route.steps().collect::<Vec<_>>(),
            vec![RouteStep::Primary, RouteStep::Secondary]
        );
        assert_eq!(route.next_step(), Some(RouteStep::Primary));
        assert_eq!(route.next_step(), Some(RouteStep::Secondary));
        assert!(route.is_direct());
        assert!(route.expect_direct("leaf").is_ok());
    }

    #[test]
    fn leaf_rejects_unconsumed_steps() {
        let route = DispatchRoute::direct().via(RouteStep::Primary);
        assert!(matches!(
            route.expect_direct("local"),
            Err(RenditionError::Routing { .. })
        ));
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_guard() {
        let in_flight = InFlightDispatches::default();
        let first = in_flight.enter();
        let second = in_flight.enter();
        assert_eq!(in_flight.len(), 2);

        let waiter = {
            let in_flight = in_flight.clone();
            tokio::spawn(async move { in_flight.wait_idle().await })
        };
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(second);
        waiter.await.expect("waiter joins");
        assert!(in_flight.is_empty());
    }
}
