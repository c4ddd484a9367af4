use std::sync::Arc;

use tracing::{debug, warn};

use crate::application::error::RenditionError;
use crate::application::repos::NodeStore;
use crate::domain::types::Actor;

use super::{DeferralKey, PostCommitDeferral, Transaction};

pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Result of a committed unit of work and of the jobs it deferred.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub deferred: Vec<DeferredOutcome>,
}

#[derive(Debug)]
pub struct DeferredOutcome {
    pub key: DeferralKey,
    pub result: Result<(), RenditionError>,
}

/// Runs units of work in node-store transactions, retrying on write conflicts
/// and running deferred jobs once the transaction commits.
#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn NodeStore>,
    max_retries: u32,
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs `work` and any deferred jobs; deferred failures are logged, not returned.
    pub fn run<T, F>(&self, actor: Actor, read_only: bool, work: F) -> Result<T, RenditionError>
    where
        F: FnMut(&mut Transaction) -> Result<T, RenditionError>,
    {
        self.run_reporting(actor, read_only, work)
            .map(|committed| committed.value)
    }

    /// Like [`run`](Self::run) but hands back each deferred job's outcome.
    pub fn run_reporting<T, F>(
        &self,
        actor: Actor,
        read_only: bool,
        mut work: F,
    ) -> Result<Committed<T>, RenditionError>
    where
        F: FnMut(&mut Transaction) -> Result<T, RenditionError>,
    {
        let (value, deferral) = self.execute(&actor, read_only, &mut work)?;
        let deferred = self.run_deferred(&actor, deferral);
        Ok(Committed { value, deferred })
    }

    fn execute<T>(
        &self,
        actor: &Actor,
        read_only: bool,
        work: &mut dyn FnMut(&mut Transaction) -> Result<T, RenditionError>,
    ) -> Result<(T, PostCommitDeferral), RenditionError> {
        let mut attempt: u32 = 0;
        loop {
            let mut tx = Transaction::new(self.store.begin(read_only), actor.clone(), read_only);
            let outcome =
                work(&mut tx).and_then(|value| tx.commit().map(|deferral| (value, deferral)));
            match outcome {
                Ok(done) => return Ok(done),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        target = "rendition_engine::application::tx",
                        attempt,
                        error = %err,
                        "retrying transaction"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_deferred(&self, actor: &Actor, deferral: PostCommitDeferral) -> Vec<DeferredOutcome> {
        deferral
            .into_jobs()
            .into_iter()
            .map(|(key, job)| {
                let result = self
                    .run_reporting(actor.clone(), false, |tx| job(tx))
                    .map(|_| ());
                match &result {
                    Ok(()) => {}
                    Err(err @ RenditionError::AlreadyUpToDate { .. }) => debug!(
                        target = "rendition_engine::application::tx",
                        key = %key,
                        "{err}"
                    ),
                    Err(err) => warn!(
                        target = "rendition_engine::application::tx",
                        key = %key,
                        error = %err,
                        "deferred job failed"
                    ),
                }
                DeferredOutcome { key, result }
            })
            .collect()
    }
}
