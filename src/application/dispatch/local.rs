use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::application::error::RenditionError;
use crate::application::repos::{ContentStore, TransformCapabilities};
use crate::application::tx::TransactionRunner;
use crate::domain::content::ContentData;
use crate::domain::definitions::{RenditionOptions, RequestDefinition};

use super::{
    DispatchRequest, DispatchRoute, InFlightDispatches, TransformClient, TransformError,
    capability_name, deliver, read_source,
};

#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub source: Bytes,
    pub source_media_type: String,
    pub target_media_type: String,
    pub options: RenditionOptions,
    pub rendition_name: Option<String>,
}

/// An asynchronous transform engine.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, request: TransformRequest) -> Result<Bytes, TransformError>;
}

/// Runs transforms on a tokio runtime, bounded by a semaphore.
pub struct LocalTransformClient {
    runner: TransactionRunner,
    content: Arc<dyn ContentStore>,
    capabilities: Arc<dyn TransformCapabilities>,
    transformer: Arc<dyn Transformer>,
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_concurrent_transforms: usize,
    in_flight: InFlightDispatches,
}

impl LocalTransformClient {
    pub fn new(
        runner: TransactionRunner,
        content: Arc<dyn ContentStore>,
        capabilities: Arc<dyn TransformCapabilities>,
        transformer: Arc<dyn Transformer>,
        runtime: Handle,
        max_concurrent_transforms: usize,
    ) -> Self {
        let max_concurrent_transforms = max_concurrent_transforms.max(1);
        Self {
            runner,
            content,
            capabilities,
            transformer,
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent_transforms)),
            max_concurrent_transforms,
            in_flight: InFlightDispatches::default(),
        }
    }

    pub fn max_concurrent_transforms(&self) -> usize {
        self.max_concurrent_transforms
    }

    pub fn in_flight(&self) -> InFlightDispatches {
        self.in_flight.clone()
    }

    async fn execute(
        runner: TransactionRunner,
        content: Arc<dyn ContentStore>,
        transformer: Arc<dyn Transformer>,
        request: DispatchRequest,
    ) -> Result<Bytes, TransformError> {
        let read_request = request.clone();
        let (data, source) = tokio::task::spawn_blocking(move || {
            read_source(&runner, content.as_ref(), &read_request)
        })
        .await
        .map_err(|err| TransformError::new(format!("source read aborted: {err}")))??;

        let transform = TransformRequest {
            source,
            source_media_type: data.media_type,
            target_media_type: request.definition.target_media_type().to_string(),
            options: request.definition.options().clone(),
            rendition_name: capability_name(&request.definition).map(str::to_string),
        };
        match AssertUnwindSafe(transformer.transform(transform))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(TransformError::new("transformer panicked")),
        }
    }
}

impl TransformClient for LocalTransformClient {
    fn check_supported(
        &self,
        source: &ContentData,
        definition: &RequestDefinition,
    ) -> Result<DispatchRoute, RenditionError> {
        let supported = self.capabilities.is_supported(
            &source.media_type,
            source.size,
            definition.target_media_type(),
            definition.options(),
            capability_name(definition),
        );
        if supported {
            Ok(DispatchRoute::direct())
        } else {
            Err(RenditionError::unsupported(
                definition.label(),
                format!(
                    "no local transform from {} ({} bytes) to {}",
                    source.media_type,
                    source.size,
                    definition.target_media_type()
                ),
            ))
        }
    }

    fn dispatch(
        &self,
        route: DispatchRoute,
        request: DispatchRequest,
    ) -> Result<(), RenditionError> {
        route.expect_direct("local")?;
        debug!(
            target = "application::dispatch::local",
            source_node = %request.source,
            request = %request.definition.label(),
            "queueing transform"
        );

        let guard = self.in_flight.enter();
        let runner = self.runner.clone();
        let content = Arc::clone(&self.content);
        let transformer = Arc::clone(&self.transformer);
        let permits = Arc::clone(&self.permits);
        self.runtime.spawn(async move {
            let _guard = guard;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(target = "application::dispatch::local", "transform pool closed");
                    return;
                }
            };
            let outcome = Self::execute(runner, content, transformer, request.clone()).await;
            let delivered = tokio::task::spawn_blocking(move || deliver(&request, outcome)).await;
            if let Err(err) = delivered {
                warn!(
                    target = "application::dispatch::local",
                    error = %err,
                    "reply delivery aborted"
                );
            }
        });
        Ok(())
    }
}
