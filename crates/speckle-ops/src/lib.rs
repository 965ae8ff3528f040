//! Send and receive: the orchestration layer between object graphs and
//! transports.
//!
//! [`Operations::send`] flattens a graph, streams its records to every
//! transport in parallel, and records new conversions in the cache once
//! everything is acknowledged. [`Operations::receive`] pulls a closure,
//! through a local transport when one is given, and rehydrates it.
//!
//! Both operations are cancellable between record batches. A batch already
//! handed to a transport always completes.

pub mod convert;
pub mod error;
pub mod operations;
pub mod progress;
mod receive;
mod send;

pub use convert::{convert_tree, ConversionFailure, ConversionReport, ToNativeConverter};
pub use error::{OpsError, OpsResult};
pub use operations::{Operations, SendOptions, SendReport};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, Stage};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use speckle_cache::ConversionCache;
    use speckle_serializer::SerializerError;
    use speckle_transport::{DiskTransport, MemoryTransport, Transport, TransportError, TransportResult};
    use speckle_types::{
        Base, CancellationToken, Collection, NodeRef, ObjectId, Point, ProjectScope, SchemaRegistry,
        SpeckleObject, Value,
    };

    use super::*;

    fn ops() -> Operations {
        Operations::default()
    }

    fn memory() -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new())
    }

    fn as_dyn(transport: &Arc<MemoryTransport>) -> Arc<dyn Transport> {
        transport.clone()
    }

    fn collection(n: usize) -> NodeRef {
        let mut collection = Collection::new("points");
        for i in 0..n {
            collection.push(Point::new(i as f64, 0.0, 0.0).to_base());
        }
        collection.to_base().into_ref()
    }

    /// A model whose `@building` child carries an application id and a
    /// detached subgraph of its own.
    fn model(label: &str) -> NodeRef {
        let floor = Base::new("Floor")
            .with_application_id("floor-1")
            .with("@slab", Point::new(0.0, 0.0, 3.0).to_base())
            .with("@beam", Point::new(1.0, 0.0, 3.0).to_base());
        let building = Base::new("Building")
            .with_application_id("building-1")
            .with("@floor", floor)
            .with("height", 12.5);
        Base::new("Model")
            .with("label", label)
            .with("@building", building)
            .into_ref()
    }

    #[tokio::test]
    async fn single_point_is_one_record() {
        let remote = memory();
        let root = Point::new(1.0, 2.0, 3.0).to_base().into_ref();
        let report = ops()
            .send(&root, &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.total_records, 1);
        assert_eq!(remote.len(), 1);

        let back = ops()
            .receive(&report.root_id, remote.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        let point = Point::from_base(&back.read()).unwrap();
        assert_eq!((point.x, point.y, point.z), (1.0, 2.0, 3.0));
        assert_eq!(back.read().id(), Some(report.root_id));
    }

    #[tokio::test]
    async fn chunked_collection_record_count() {
        let remote = memory();
        let root = collection(1500);
        let report = ops()
            .send(&root, &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.total_records, 1500 + 2 + 1);
        assert_eq!(remote.len(), 1503);

        let back = ops()
            .receive(&report.root_id, remote.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(back, root);
        let elements = Collection::from_base(&back.read()).unwrap().elements;
        assert_eq!(elements.len(), 1500);
        assert_eq!(Point::from_base(&elements[1234].read()).unwrap().x, 1234.0);
    }

    #[tokio::test]
    async fn round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let disk: Arc<dyn Transport> = Arc::new(DiskTransport::open(dir.path()).unwrap());
        let root = Base::new("Model")
            .with("@points", collection(2100))
            .with("@building", model("inner").snapshot())
            .with("tags", vec!["a", "b"])
            .with("meta", Value::Map([("k".to_string(), Value::Int(3))].into_iter().collect()))
            .into_ref();

        let report = ops()
            .send(&root, &[disk.clone()], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        let back = ops()
            .receive(&report.root_id, disk.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(back, root);
    }

    #[tokio::test]
    async fn every_transport_gets_every_record() {
        let first = memory();
        let second = memory();
        let root = collection(30);
        let options = SendOptions {
            batch_size: 7,
            max_in_flight: 3,
            project: None,
        };
        let report = ops()
            .with_options(options)
            .send(&root, &[as_dyn(&first), as_dyn(&second)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.len(), report.total_records);
        assert_eq!(second.len(), report.total_records);
        assert_eq!(first.all_ids().len(), second.all_ids().len());
    }

    #[tokio::test]
    async fn progress_reaches_the_total() {
        let remote = memory();
        let events = Mutex::new(Vec::new());
        let sink = |event: ProgressEvent| events.lock().push(event);
        let options = SendOptions {
            batch_size: 10,
            ..SendOptions::default()
        };
        let report = ops()
            .with_options(options)
            .send(&collection(50), &[as_dyn(&remote)], &sink, &CancellationToken::new())
            .await
            .unwrap();

        let events = events.into_inner();
        assert_eq!(events[0].stage, Stage::Serialize);
        let uploads: Vec<_> = events.iter().filter(|e| e.stage == Stage::Upload).collect();
        assert!(uploads.len() > 1);
        assert!(uploads.windows(2).all(|pair| pair[0].done <= pair[1].done));
        let last = uploads.last().unwrap();
        assert_eq!(last.done, report.total_records);
        assert!(last.is_complete());
    }

    #[tokio::test]
    async fn resending_hits_the_cache_and_writes_nothing() {
        let cache = Arc::new(ConversionCache::new());
        let ops = ops().with_cache(cache.clone()).with_options(SendOptions {
            project: Some(ProjectScope::new("project-a")),
            ..SendOptions::default()
        });
        let remote = memory();

        let first = ops
            .send(&model("one"), &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.cache_hits, 0);
        let stored = remote.len();
        let writes = remote.write_count();
        assert!(cache.try_get(&ProjectScope::new("project-a"), "building-1").is_some());

        let second = ops
            .send(&model("one"), &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.root_id, first.root_id);
        // building, floor, slab, beam
        assert_eq!(second.cache_hits, 4);
        assert_eq!(second.total_records, 1);
        assert_eq!(remote.len(), stored);
        assert_eq!(remote.write_count(), writes);

        // The cached subgraph still resolves in full.
        let back = ops
            .receive(&second.root_id, remote.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(back, model("one"));
    }

    #[tokio::test]
    async fn cache_is_bypassed_without_a_project() {
        let cache = Arc::new(ConversionCache::new());
        let ops = ops().with_cache(cache.clone());
        let remote = memory();
        ops.send(&model("x"), &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_writes_nothing() {
        let remote = memory();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ops()
            .send(&collection(10), &[as_dyn(&remote)], &NoProgress, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let remote = memory();
        let cancel = CancellationToken::new();
        let sink = {
            let cancel = cancel.clone();
            move |event: ProgressEvent| {
                if event.stage == Stage::Upload {
                    cancel.cancel();
                }
            }
        };
        let options = SendOptions {
            batch_size: 10,
            max_in_flight: 1,
            project: None,
        };
        let err = ops()
            .with_options(options)
            .send(&collection(100), &[as_dyn(&remote)], &sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Cancelled));
        // The first batch landed in full, nothing after it was started.
        assert_eq!(remote.len(), 10);
    }

    #[tokio::test]
    async fn receive_missing_root_is_structural() {
        let remote = memory();
        let err = ops()
            .receive(&ObjectId::from_hash([1; 32]), remote.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Serializer(SerializerError::MissingObject(_))));
    }

    #[tokio::test]
    async fn receive_with_a_hole_fails_entirely() {
        let remote = memory();
        let report = ops()
            .send(&model("holes"), &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        let mut records = remote.snapshot();
        let victim = *records.keys().find(|id| **id != report.root_id).unwrap();
        records.remove(&victim);
        let damaged = MemoryTransport::new();
        for (id, body) in &records {
            damaged.save_object(id, body).await.unwrap();
        }
        let err = ops()
            .receive(&report.root_id, &damaged, None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn receive_fills_the_local_transport() {
        let remote = memory();
        let report = ops()
            .send(&collection(20), &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();

        let local = MemoryTransport::named("local");
        ops()
            .receive(&report.root_id, remote.as_ref(), Some(&local), &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(local.len(), report.total_records);

        // Served entirely from the local copy now.
        let empty = MemoryTransport::new();
        let back = ops()
            .receive(&report.root_id, &empty, Some(&local), &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(back, collection(20));
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        fn name(&self) -> &str {
            "failing"
        }

        async fn save_object(&self, _id: &ObjectId, _body: &str) -> TransportResult<()> {
            Err(TransportError::Http {
                status: 500,
                message: "disk full".into(),
            })
        }

        async fn get_object(&self, _id: &ObjectId) -> TransportResult<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn one_failing_transport_fails_the_send_and_skips_the_cache() {
        let cache = Arc::new(ConversionCache::new());
        let ops = ops().with_cache(cache.clone()).with_options(SendOptions {
            project: Some(ProjectScope::new("p")),
            ..SendOptions::default()
        });
        let good = memory();
        let failing: Arc<dyn Transport> = Arc::new(FailingTransport);
        let err = ops
            .send(
                &model("fail"),
                &[as_dyn(&good), failing],
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Transport(_)));
        assert!(cache.is_empty());
    }

    struct SlowTransport(MemoryTransport);

    #[async_trait]
    impl Transport for SlowTransport {
        fn name(&self) -> &str {
            "slow"
        }

        async fn save_object(&self, id: &ObjectId, body: &str) -> TransportResult<()> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.save_object(id, body).await
        }

        async fn get_object(&self, id: &ObjectId) -> TransportResult<Option<String>> {
            self.0.get_object(id).await
        }
    }

    #[tokio::test]
    async fn batches_in_flight_finish_when_another_transport_fails() {
        let slow = Arc::new(SlowTransport(MemoryTransport::new()));
        let failing: Arc<dyn Transport> = Arc::new(FailingTransport);
        let err = ops()
            .with_options(SendOptions {
                batch_size: 1,
                max_in_flight: 4,
                project: None,
            })
            .send(
                &collection(20),
                &[slow.clone() as Arc<dyn Transport>, failing],
                &NoProgress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Transport(_)));
        // The four batches handed out before the failure all landed; no more were started.
        assert_eq!(slow.0.len(), 4);
    }

    #[tokio::test]
    async fn send_needs_a_transport() {
        let err = ops()
            .send(&collection(1), &[], &NoProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::NoTransports));
    }

    #[tokio::test]
    async fn unknown_types_survive_the_trip() {
        let remote = memory();
        let root = Base::new("Vendor.Custom:Thing")
            .with("@part", Base::new("Vendor.Part").with("w", 2))
            .into_ref();
        let registry = Arc::new(SchemaRegistry::new());
        let ops = Operations::new(registry);
        let report = ops
            .send(&root, &[as_dyn(&remote)], &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        let back = ops
            .receive(&report.root_id, remote.as_ref(), None, &NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(back, root);
    }
}
