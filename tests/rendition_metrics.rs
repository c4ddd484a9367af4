use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;

use rendition_engine::application::dispatch::{
    DispatchRequest, DispatchRoute, ReplyHandler, TransformClient,
};
use rendition_engine::application::error::RenditionError;
use rendition_engine::application::registry::{
    ConfigSource, METRIC_REGISTRY_RELOAD_TOTAL, RegistryReloader, RenditionDefinitionRegistry,
};
use rendition_engine::application::rendition::{
    METRIC_CONSUME_MS, METRIC_DISPATCH_TOTAL, METRIC_STALE_REPLY_TOTAL, RenditionCollaborators,
    RenditionPreventionRegistry, RenditionService, RenditionSettings,
};
use rendition_engine::application::repos::{ContentStore, NodeStore};
use rendition_engine::application::tx::TransactionRunner;
use rendition_engine::domain::content::{ContentData, PropertyValue};
use rendition_engine::domain::definitions::{
    RenditionDefinition, RenditionOptions, RequestDefinition,
};
use rendition_engine::domain::types::{Actor, NodeId, node_types, props};
use rendition_engine::infra::capabilities::TransformCapabilityTable;
use rendition_engine::infra::memory::{
    InMemoryConfigSource, MemoryContentStore, MemoryNodeStore, RecordingBehaviourFilter,
    RecordingMetadataSink, RecordingReplyChannel,
};
use rendition_engine::infra::telemetry;

/// Accepts everything and parks requests for the test to answer.
#[derive(Default)]
struct Parked {
    requests: Mutex<Vec<DispatchRequest>>,
}

impl TransformClient for Parked {
    fn check_supported(
        &self,
        _source: &ContentData,
        _definition: &RequestDefinition,
    ) -> Result<DispatchRoute, RenditionError> {
        Ok(DispatchRoute::direct())
    }

    fn dispatch(
        &self,
        _route: DispatchRoute,
        request: DispatchRequest,
    ) -> Result<(), RenditionError> {
        self.requests.lock().expect("requests").push(request);
        Ok(())
    }
}

#[test]
fn rendition_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let runner = TransactionRunner::new(Arc::new(MemoryNodeStore::new()) as Arc<dyn NodeStore>);
    let content = Arc::new(MemoryContentStore::new());
    let client = Arc::new(Parked::default());
    let registry = Arc::new(RenditionDefinitionRegistry::new(Arc::new(
        TransformCapabilityTable::new(),
    )));
    registry.register(RenditionDefinition::new(
        "doclib",
        "image/png",
        RenditionOptions::new(),
    ));
    let service = RenditionService::new(
        RenditionSettings::default(),
        RenditionCollaborators {
            runner: runner.clone(),
            registry: Arc::clone(&registry),
            client: client.clone(),
            content: content.clone(),
            behaviours: Arc::new(RecordingBehaviourFilter::new()),
            prevention: Arc::new(RenditionPreventionRegistry::new()),
            replies: Arc::new(RecordingReplyChannel::new()),
            metadata: Arc::new(RecordingMetadataSink::new()),
        },
    );

    let set_content = |node: Option<NodeId>, body: &str| -> NodeId {
        let locator = content.write(body.as_bytes()).expect("write");
        runner
            .run(Actor::System, false, |tx| {
                let node = match node {
                    Some(node) => node,
                    None => tx.create_node(node_types::CONTENT)?,
                };
                tx.set_property(
                    node,
                    props::CONTENT,
                    PropertyValue::from(ContentData::new(locator.clone(), "text/plain", 4)),
                )?;
                Ok(node)
            })
            .expect("content")
    };

    let node = set_content(None, "one");
    runner
        .run(Actor::user("alice"), false, |tx| service.render(tx, node, "doclib"))
        .expect("request");
    set_content(Some(node), "two");

    let request = client.requests.lock().expect("requests").remove(0);
    request
        .reply_to
        .consume(
            request.source,
            Some(Bytes::from_static(b"png")),
            &request.definition,
            request.fingerprint,
        )
        .expect("stale reply is dropped quietly");

    let config = Arc::new(InMemoryConfigSource::new("inline"));
    config.set_document("broken.json", "{");
    let sources: Vec<Arc<dyn ConfigSource>> = vec![config];
    let schedule: cron::Schedule = "0 * * * * *".parse().expect("cron");
    let reloader = RegistryReloader::new(registry, sources, schedule.clone(), schedule);
    assert!(!reloader.reload_now().is_clean());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        METRIC_DISPATCH_TOTAL,
        METRIC_STALE_REPLY_TOTAL,
        METRIC_CONSUME_MS,
        METRIC_REGISTRY_RELOAD_TOTAL,
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
