//! Safe-call ladder behavior: attempt ceilings per failure class, write
//! semantics, and transparent session replacement.

use std::sync::Arc;
use std::time::Duration;

use mira::fake::FakeServer;
use mira::protocol::ErrorCategory;
use mira::{ClientConfig, Error, Gateway, Identity, ServiceName};
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
async fn persistent_transient_failure_stops_after_three_attempts() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::TransientNetwork, "router flapped", 10);

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Transport(_)), "final attempt's failure is surfaced as-is");
	assert_eq!(server.calls("find"), 3, "direct, recreated handle, post-reconnect");
	assert_eq!(server.connections(), 2, "only the last tier reconnects");
}

#[tokio::test]
async fn transient_failure_recovered_by_recreated_handle() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::TransientNetwork, "router flapped", 1);

	gw.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap();

	assert_eq!(server.calls("find"), 2);
	assert_eq!(server.connections(), 1, "recovery on a recreated handle needs no reconnect");
}

#[tokio::test]
async fn resource_limit_fails_on_first_attempt() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::ResourceLimit, "result set too large", 5);

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::ResourceLimit(_)));
	assert_eq!(server.calls("find"), 1, "refusals are deterministic; retrying wastes a round-trip");
}

#[tokio::test]
async fn server_defect_fails_on_first_attempt() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::InternalDefect, "assertion failed", 5);

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::ServerDefect(_)));
	assert_eq!(server.calls("find"), 1);
}

#[tokio::test]
async fn security_violation_fails_on_first_attempt() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::SecurityViolation, "not your data", 5);

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Security(_)));
	assert_eq!(server.calls("find"), 1);
}

#[tokio::test]
async fn unclassified_failure_gets_exactly_one_backoff_retry() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::Unknown, "who knows", 5);

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Unclassified(_)));
	assert_eq!(server.calls("find"), 2);
	assert_eq!(server.connections(), 1, "unclassified failures never trigger reconnection");
}

#[tokio::test]
async fn unclassified_failure_can_recover_on_the_retry() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("find", ErrorCategory::Unknown, "who knows", 1);

	gw.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap();
	assert_eq!(server.calls("find"), 2);
}

#[tokio::test]
async fn write_skips_the_backoff_tier() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("saveAndReturn", ErrorCategory::Unknown, "who knows", 1);

	let err = gw
		.invoke_write(ServiceName::Update, "saveAndReturn", json!({ "kind": "project" }))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::Unclassified(_)));
	assert_eq!(
		server.calls("saveAndReturn"),
		1,
		"an ambiguous write must never be replayed"
	);
}

#[tokio::test]
async fn write_still_recovers_from_transient_failures() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next("saveAndReturn", ErrorCategory::TransientNetwork, "router flapped", 2);
	server.respond_next("saveAndReturn", json!({ "id": 7, "name": "p", "datasetIds": [] }));

	gw.invoke_write(ServiceName::Update, "saveAndReturn", json!({ "kind": "project" }))
		.await
		.unwrap();

	assert_eq!(server.calls("saveAndReturn"), 3);
	assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn expired_session_is_replaced_transparently() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	let original = gw.session_uuid().unwrap().to_string();
	server.expire_session(&original);

	gw.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.expect("call should succeed under a replacement session");

	assert_ne!(gw.session_uuid().unwrap(), original);
	assert_eq!(server.handshakes(), 2);
	assert_eq!(server.calls("find"), 3, "both pre-replacement attempts saw the dead session");
}

#[tokio::test]
async fn invoke_without_a_session_reports_not_connected() {
	let server = FakeServer::new();
	let config = ClientConfig::default().with_credentials("ada", "pw");
	let identity = Identity::from_config(&config).unwrap();
	let mut gw = Gateway::new(identity, Arc::new(server.clone()), Duration::from_millis(10));

	let err = gw
		.invoke(ServiceName::Query, "find", json!({ "kind": "image", "id": 1 }))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::NotConnected));
}
