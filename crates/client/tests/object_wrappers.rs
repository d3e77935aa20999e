//! Remote object wrapper behavior: lazy hierarchy loading, snapshot
//! replacement on save, and ownership-preserving annotation writes.

use std::sync::Arc;
use std::time::Duration;

use mira::fake::FakeServer;
use mira::protocol::{AnnotationKind, ObjectKind, ObjectRef};
use mira::{AnnotationWrapper, ClientConfig, Gateway, Identity, ProjectWrapper};
use serde_json::json;

async fn connected_gateway(server: &FakeServer) -> Gateway {
	let config = ClientConfig::default()
		.with_credentials("ada", "pw")
		.with_backoff(Duration::from_millis(10));
	let identity = Identity::from_config(&config).expect("identity should resolve");
	let mut gw = Gateway::new(identity, Arc::new(server.clone()), config.backoff);
	assert!(gw.connect(None).await);
	gw
}

#[tokio::test]
async fn project_loads_hierarchy_lazily() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;

	server.respond_next("find", json!({ "id": 7, "name": "screens" }));
	let mut project = ProjectWrapper::fetch(&mut gw, 7).await.unwrap();
	assert_eq!(project.name(), "screens");
	assert_eq!(server.calls("loadHierarchy"), 0, "fetch must not load children");

	server.respond_next(
		"loadHierarchy",
		json!({ "id": 7, "name": "screens", "datasetIds": [10, 11] }),
	);
	server.respond_next("find", json!({ "id": 10, "name": "plate-a" }));
	server.respond_next("find", json!({ "id": 11, "name": "plate-b" }));

	let datasets = project.datasets(&mut gw).await.unwrap();
	assert_eq!(datasets.len(), 2);
	assert_eq!(datasets[0].name(), "plate-a");
	assert_eq!(server.calls("loadHierarchy"), 1);

	// A second traversal reuses the loaded snapshot.
	server.respond_next("find", json!({ "id": 10, "name": "plate-a" }));
	server.respond_next("find", json!({ "id": 11, "name": "plate-b" }));
	project.datasets(&mut gw).await.unwrap();
	assert_eq!(server.calls("loadHierarchy"), 1);
}

#[tokio::test]
async fn save_replaces_the_snapshot_with_the_servers() -> anyhow::Result<()> {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;

	server.respond_next("find", json!({ "id": 7, "name": "screens" }));
	let mut project = ProjectWrapper::fetch(&mut gw, 7).await?;

	project.set_name("renamed");
	project.set_description("runs 2026-08");
	server.respond_next(
		"saveAndReturn",
		json!({ "id": 7, "name": "renamed", "description": "runs 2026-08", "datasetIds": [] }),
	);
	project.save(&mut gw).await?;

	assert_eq!(project.name(), "renamed");
	assert_eq!(project.data().description.as_deref(), Some("runs 2026-08"));
	assert_eq!(project.data().dataset_ids.as_deref(), Some(&[][..]));
	Ok(())
}

#[tokio::test]
async fn annotations_are_fetched_on_demand_and_never_cached() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;

	server.respond_next("find", json!({ "id": 7, "name": "screens" }));
	let project = ProjectWrapper::fetch(&mut gw, 7).await.unwrap();

	server.respond_next(
		"loadAnnotations",
		json!([{ "id": 40, "kind": "comment", "text": "looks good" }]),
	);
	let annotations = project.annotations(&mut gw).await.unwrap();
	assert_eq!(annotations.len(), 1);
	assert_eq!(annotations[0].text.as_deref(), Some("looks good"));

	server.respond_next("loadAnnotations", json!([]));
	let again = project.annotations(&mut gw).await.unwrap();
	assert!(again.is_empty());
	assert_eq!(server.calls("loadAnnotations"), 2);
}

#[tokio::test]
async fn attach_creates_an_annotation_under_the_callers_identity() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;

	server.respond_next(
		"createAnnotation",
		json!({ "id": 41, "kind": "tag", "text": "qc-pass", "ownerId": 100 }),
	);
	let annotation = AnnotationWrapper::attach(
		&mut gw,
		ObjectRef { kind: ObjectKind::Image, id: 12 },
		AnnotationKind::Tag,
		Some("qc"),
		"qc-pass",
	)
	.await
	.unwrap();

	assert_eq!(annotation.data().owner_id, Some(100));
	assert_eq!(server.calls("createAnnotation"), 1);
}

#[tokio::test]
async fn attach_as_runs_through_a_short_lived_impersonation_session() {
	let server = FakeServer::new();
	let gw = connected_gateway(&server).await;
	let main_uuid = gw.session_uuid().unwrap().to_string();
	let handshakes_before = server.handshakes();

	server.respond_next(
		"createAnnotation",
		json!({ "id": 42, "kind": "comment", "text": "curated", "ownerId": 101 }),
	);
	let annotation = AnnotationWrapper::attach_as(
		&gw,
		"grace",
		ObjectRef { kind: ObjectKind::Dataset, id: 10 },
		AnnotationKind::Comment,
		None,
		"curated",
	)
	.await
	.unwrap();

	// The write ran as grace, in a session that no longer exists.
	assert_eq!(annotation.data().owner_id, Some(101));
	assert_eq!(server.handshakes(), handshakes_before + 1);
	assert_eq!(server.session_refcount(&main_uuid), Some(1), "caller's session is untouched");
	assert!(gw.is_connected());
}

#[tokio::test]
async fn attach_as_closes_the_session_even_when_the_write_fails() {
	let server = FakeServer::new();
	let gw = connected_gateway(&server).await;
	let main_uuid = gw.session_uuid().unwrap().to_string();

	server.fail_next(
		"createAnnotation",
		mira::protocol::ErrorCategory::SecurityViolation,
		"not permitted",
		1,
	);
	let result = AnnotationWrapper::attach_as(
		&gw,
		"grace",
		ObjectRef { kind: ObjectKind::Dataset, id: 10 },
		AnnotationKind::Comment,
		None,
		"curated",
	)
	.await;

	assert!(result.is_err());
	// Only the caller's own session remains on the server.
	assert_eq!(server.session_refcount(&main_uuid), Some(1));
	assert_eq!(server.calls(mira::protocol::session_methods::CLOSE), 1);
}
