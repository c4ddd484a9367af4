//! Periodic reloading of dynamically configured definitions.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use super::{ReloadReport, RenditionDefinitionRegistry};

pub const METRIC_REGISTRY_RELOAD_TOTAL: &str = "rendition_registry_reload_total";

#[derive(Debug, Error)]
#[error("config source `{source_name}` failed: {message}")]
pub struct ConfigSourceError {
    pub source_name: String,
    pub message: String,
}

impl ConfigSourceError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// A named JSON document holding rendition definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub name: String,
    pub text: String,
}

/// Somewhere rendition documents can be read from, afresh on every reload.
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;
    fn read_documents(&self) -> Result<Vec<ConfigDocument>, ConfigSourceError>;
}

/// Reloads the registry on a cron schedule. After a failed or partial load
/// the next attempt follows the quicker `initial_and_on_error` schedule.
pub struct RegistryReloader {
    registry: Arc<RenditionDefinitionRegistry>,
    sources: Vec<Arc<dyn ConfigSource>>,
    steady: Schedule,
    initial_and_on_error: Schedule,
}

impl RegistryReloader {
    pub fn new(
        registry: Arc<RenditionDefinitionRegistry>,
        sources: Vec<Arc<dyn ConfigSource>>,
        steady: Schedule,
        initial_and_on_error: Schedule,
    ) -> Self {
        Self {
            registry,
            sources,
            steady,
            initial_and_on_error,
        }
    }

    pub fn reload_now(&self) -> ReloadReport {
        let report = self.registry.reload(&self.sources);
        let result = if report.is_clean() { "ok" } else { "partial" };
        counter!(METRIC_REGISTRY_RELOAD_TOTAL, "result" => result).increment(1);
        report
    }

    /// Schedule governing the wait after a reload with this outcome.
    pub fn schedule_after(&self, report: &ReloadReport) -> &Schedule {
        if report.is_clean() {
            &self.steady
        } else {
            &self.initial_and_on_error
        }
    }

    /// Reloads immediately, then on schedule until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let report = self.reload_now();
            let Some(next) = self.schedule_after(&report).upcoming(Utc).next() else {
                info!(
                    target = "application::registry::reload",
                    "reload schedule has no upcoming run; stopping"
                );
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(
                target = "application::registry::reload",
                next = %next,
                clean = report.is_clean(),
                "next registry reload scheduled"
            );
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target = "application::registry::reload", "registry reloader stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
