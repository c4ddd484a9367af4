use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::application::error::RenditionError;
use crate::application::repos::{Behaviour, BehaviourFilter, ContentStore, NodeTransaction};
use crate::domain::content::{ContentData, PropertyValue};
use crate::domain::definitions::RenditionDefinition;
use crate::domain::fingerprint::ContentFingerprint;
use crate::domain::types::{NodeId, aspects, props};

use super::nodes;

const SOURCE: &str = "application::rendition::apply";

/// Keeps update behaviours on one node switched off until dropped.
pub(super) struct BehaviourSuppression<'a> {
    filter: &'a dyn BehaviourFilter,
    node: NodeId,
}

impl<'a> BehaviourSuppression<'a> {
    pub(super) fn enter(filter: &'a dyn BehaviourFilter, node: NodeId) -> Self {
        for behaviour in Behaviour::ALL {
            filter.disable(node, behaviour);
        }
        Self { filter, node }
    }
}

impl Drop for BehaviourSuppression<'_> {
    fn drop(&mut self) {
        for behaviour in Behaviour::ALL.into_iter().rev() {
            self.filter.enable(self.node, behaviour);
        }
    }
}

/// Writes a transform result, or its absence, to the rendition node of
/// `source`, creating the node on first use.
pub(super) fn apply_rendition(
    tx: &mut dyn NodeTransaction,
    content: &dyn ContentStore,
    behaviours: &dyn BehaviourFilter,
    source: NodeId,
    definition: &RenditionDefinition,
    result: Option<Bytes>,
    fingerprint: ContentFingerprint,
) -> Result<(), RenditionError> {
    let _suppressed = BehaviourSuppression::enter(behaviours, source);
    let name = definition.name();

    let rendition = match nodes::rendition_association(tx, source, name)? {
        Some(association) => {
            if !nodes::is_engine_rendition(tx, association.child)? {
                tx.add_aspect(association.child, aspects::ENGINE_RENDITION)?;
                debug!(
                    target = SOURCE,
                    source_node = %source,
                    rendition = name,
                    "took over legacy rendition"
                );
            }
            association.child
        }
        None => {
            let rendition = nodes::create_rendition_node(tx, source, name)?;
            debug!(
                target = SOURCE,
                source_node = %source,
                rendition = name,
                rendition_node = %rendition,
                "created rendition node"
            );
            rendition
        }
    };

    nodes::record_last_rendered(tx, source, name, unix_millis(OffsetDateTime::now_utc()))?;

    match result {
        Some(bytes) if bytes.is_empty() => {
            error!(
                target = SOURCE,
                source_node = %source,
                rendition = name,
                "transform produced zero bytes"
            );
            nodes::clear_content(tx, rendition)?;
        }
        Some(bytes) => {
            let locator = content.write(&bytes)?;
            let data = ContentData::new(
                locator,
                definition.target_media_type(),
                bytes.len() as i64,
            );
            tx.set_property(rendition, props::CONTENT, PropertyValue::from(data))?;
            tx.set_property(
                rendition,
                props::RENDITION_FINGERPRINT,
                PropertyValue::Int(fingerprint.raw()),
            )?;
            debug!(
                target = SOURCE,
                source_node = %source,
                rendition = name,
                fingerprint = %fingerprint,
                "stored rendition content"
            );
        }
        None => {
            debug!(
                target = SOURCE,
                source_node = %source,
                rendition = name,
                "clearing rendition after failed transform"
            );
            nodes::clear_content(tx, rendition)?;
        }
    }

    if !tx.has_aspect(source, aspects::RENDITIONED)? {
        tx.add_aspect(source, aspects::RENDITIONED)?;
    }
    Ok(())
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
        .saturating_mul(1000)
        .saturating_add(i64::from(at.millisecond()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Calls(Mutex<Vec<(bool, Behaviour)>>);

    impl BehaviourFilter for Calls {
        fn disable(&self, _node: NodeId, behaviour: Behaviour) {
            self.0.lock().expect("calls").push((false, behaviour));
        }

        fn enable(&self, _node: NodeId, behaviour: Behaviour) {
            self.0.lock().expect("calls").push((true, behaviour));
        }
    }

    #[test]
    fn suppression_is_balanced_even_on_early_exit() {
        let calls = Calls::default();
        let run = || -> Result<(), &'static str> {
            let _guard = BehaviourSuppression::enter(&calls, NodeId::new());
            Err("bail")
        };
        assert!(run().is_err());

        let calls = calls.0.into_inner().expect("calls");
        assert_eq!(calls.len(), 6);
        assert!(calls[..3].iter().all(|(enabled, _)| !enabled));
        assert!(calls[3..].iter().all(|(enabled, _)| *enabled));
        assert_eq!(calls[2].1, calls[3].1);
    }

    #[test]
    fn last_rendered_stamps_are_unix_millis() {
        use time::macros::datetime;

        assert_eq!(
            unix_millis(datetime!(2024-05-01 12:00:00.250 UTC)),
            1_714_564_800_250
        );
        assert_eq!(unix_millis(datetime!(1969-12-31 23:59:59.500 UTC)), -500);
    }
}
