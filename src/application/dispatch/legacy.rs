use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::debug;

use crate::application::error::RenditionError;
use crate::application::options::{TransformationOptions, to_structured};
use crate::application::repos::ContentStore;
use crate::application::tx::TransactionRunner;
use crate::domain::content::ContentData;
use crate::domain::definitions::RequestDefinition;

use super::{
    DispatchRequest, DispatchRoute, InFlightDispatches, TransformClient, TransformError, deliver,
    read_source,
};

/// A blocking transform engine that takes structured options.
pub trait SynchronousTransformer: Send + Sync {
    fn is_transformable(
        &self,
        source_media_type: &str,
        source_size: i64,
        target_media_type: &str,
        options: &TransformationOptions,
    ) -> bool;

    fn transform(
        &self,
        source: &[u8],
        source_media_type: &str,
        target_media_type: &str,
        options: &TransformationOptions,
    ) -> Result<Vec<u8>, TransformError>;
}

/// Adapts a [`SynchronousTransformer`] to the asynchronous client contract by
/// running it on the blocking pool.
pub struct LegacyTransformClient {
    runner: TransactionRunner,
    content: Arc<dyn ContentStore>,
    engine: Arc<dyn SynchronousTransformer>,
    runtime: Handle,
    in_flight: InFlightDispatches,
}

impl LegacyTransformClient {
    pub fn new(
        runner: TransactionRunner,
        content: Arc<dyn ContentStore>,
        engine: Arc<dyn SynchronousTransformer>,
        runtime: Handle,
    ) -> Self {
        Self {
            runner,
            content,
            engine,
            runtime,
            in_flight: InFlightDispatches::default(),
        }
    }

    pub fn in_flight(&self) -> InFlightDispatches {
        self.in_flight.clone()
    }

    fn execute(
        runner: &TransactionRunner,
        content: &dyn ContentStore,
        engine: &dyn SynchronousTransformer,
        request: &DispatchRequest,
    ) -> Result<Bytes, TransformError> {
        let (data, source) = read_source(runner, content, request)?;
        let target = request.definition.target_media_type();
        let options = to_structured(request.definition.options(), target)
            .map_err(|err| TransformError::new(err.to_string()))?;
        match catch_unwind(AssertUnwindSafe(|| {
            engine.transform(&source, &data.media_type, target, &options)
        })) {
            Ok(outcome) => outcome.map(Bytes::from),
            Err(_) => Err(TransformError::new("transformer panicked")),
        }
    }
}

impl TransformClient for LegacyTransformClient {
    fn check_supported(
        &self,
        source: &ContentData,
        definition: &RequestDefinition,
    ) -> Result<DispatchRoute, RenditionError> {
        let target = definition.target_media_type();
        let options = to_structured(definition.options(), target)
            .map_err(|err| RenditionError::unsupported(definition.label(), err.to_string()))?;
        if self
            .engine
            .is_transformable(&source.media_type, source.size, target, &options)
        {
            Ok(DispatchRoute::direct())
        } else {
            Err(RenditionError::unsupported(
                definition.label(),
                format!(
                    "no legacy transform from {} ({} bytes) to {target}",
                    source.media_type, source.size
                ),
            ))
        }
    }

    fn dispatch(
        &self,
        route: DispatchRoute,
        request: DispatchRequest,
    ) -> Result<(), RenditionError> {
        route.expect_direct("legacy")?;
        debug!(
            target = "application::dispatch::legacy",
            source_node = %request.source,
            request = %request.definition.label(),
            "queueing legacy transform"
        );

        let guard = self.in_flight.enter();
        let runner = self.runner.clone();
        let content = Arc::clone(&self.content);
        let engine = Arc::clone(&self.engine);
        self.runtime.spawn_blocking(move || {
            let _guard = guard;
            let outcome = Self::execute(&runner, content.as_ref(), engine.as_ref(), &request);
            deliver(&request, outcome);
        });
        Ok(())
    }
}
