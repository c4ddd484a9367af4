use std::fmt;
use std::sync::Arc;

use crate::application::error::RenditionError;
use crate::domain::types::NodeId;

use super::Transaction;

/// Work run after commit, in a transaction of its own.
pub type DeferredJob = Arc<dyn Fn(&mut Transaction) -> Result<(), RenditionError> + Send + Sync>;

/// Identity of a deferred job: at most one job per source node and rendition
/// name survives until commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeferralKey {
    pub node: NodeId,
    pub rendition: String,
}

impl DeferralKey {
    pub fn new(node: NodeId, rendition: impl Into<String>) -> Self {
        Self {
            node,
            rendition: rendition.into(),
        }
    }
}

impl fmt::Display for DeferralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node, self.rendition)
    }
}

/// Per-transaction queue of keyed jobs. Jobs run in first-scheduled order;
/// rescheduling a key swaps the job but keeps its position. Dropped with the
/// transaction on rollback.
#[derive(Default)]
pub struct PostCommitDeferral {
    jobs: Vec<(DeferralKey, DeferredJob)>,
}

impl PostCommitDeferral {
    /// Returns `true` when the key was not already scheduled.
    pub fn schedule(&mut self, key: DeferralKey, job: DeferredJob) -> bool {
        match self.jobs.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => {
                slot.1 = job;
                false
            }
            None => {
                self.jobs.push((key, job));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DeferralKey> {
        self.jobs.iter().map(|(key, _)| key)
    }

    pub(crate) fn into_jobs(self) -> Vec<(DeferralKey, DeferredJob)> {
        self.jobs
    }
}

impl fmt::Debug for PostCommitDeferral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn job(counter: &Arc<AtomicUsize>, value: usize) -> DeferredJob {
        let counter = Arc::clone(counter);
        Arc::new(move |_tx: &mut Transaction| {
            counter.store(value, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn rescheduling_replaces_but_keeps_position() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = NodeId::new();
        let second = NodeId::new();
        let mut deferral = PostCommitDeferral::default();

        assert!(deferral.schedule(DeferralKey::new(first, "doclib"), job(&counter, 1)));
        assert!(deferral.schedule(DeferralKey::new(second, "doclib"), job(&counter, 2)));
        assert!(!deferral.schedule(DeferralKey::new(first, "doclib"), job(&counter, 3)));

        let keys: Vec<_> = deferral.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                DeferralKey::new(first, "doclib"),
                DeferralKey::new(second, "doclib")
            ]
        );
        assert_eq!(deferral.len(), 2);
    }

    #[test]
    fn distinct_renditions_are_distinct_keys() {
        let counter = Arc::new(AtomicUsize::new(0));
        let node = NodeId::new();
        let mut deferral = PostCommitDeferral::default();

        deferral.schedule(DeferralKey::new(node, "doclib"), job(&counter, 1));
        deferral.schedule(DeferralKey::new(node, "pdf"), job(&counter, 1));

        assert_eq!(deferral.len(), 2);
    }
}
