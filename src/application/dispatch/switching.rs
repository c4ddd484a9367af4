use std::sync::Arc;

use crate::application::error::RenditionError;
use crate::domain::content::ContentData;
use crate::domain::definitions::RequestDefinition;

use super::{DispatchRequest, DispatchRoute, RouteStep, TransformClient};

/// Prefers `primary` and falls back to `secondary` for requests the primary
/// does not support. The choice made during the support check travels in the
/// route, so switching clients nest freely.
pub struct SwitchingTransformClient {
    primary: Arc<dyn TransformClient>,
    secondary: Arc<dyn TransformClient>,
}

impl SwitchingTransformClient {
    pub fn new(primary: Arc<dyn TransformClient>, secondary: Arc<dyn TransformClient>) -> Self {
        Self { primary, secondary }
    }
}

impl TransformClient for SwitchingTransformClient {
    fn check_supported(
        &self,
        source: &ContentData,
        definition: &RequestDefinition,
    ) -> Result<DispatchRoute, RenditionError> {
        match self.primary.check_supported(source, definition) {
            Ok(route) => Ok(route.via(RouteStep::Primary)),
            Err(err) if err.is_unsupported() => self
                .secondary
                .check_supported(source, definition)
                .map(|route| route.via(RouteStep::Secondary)),
            Err(err) => Err(err),
        }
    }

    fn dispatch(
        &self,
        mut route: DispatchRoute,
        request: DispatchRequest,
    ) -> Result<(), RenditionError> {
        match route.next_step() {
            Some(RouteStep::Primary) => self.primary.dispatch(route, request),
            Some(RouteStep::Secondary) => self.secondary.dispatch(route, request),
            None => Err(RenditionError::routing(
                "switching client received a route without a branch",
            )),
        }
    }
}
