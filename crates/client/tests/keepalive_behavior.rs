//! Keep-alive probe behavior: the single-reconnect contract and the refusal
//! cases left to the caller.

use std::sync::Arc;
use std::time::Duration;

use mira::fake::FakeServer;
use mira::protocol::{ErrorCategory, session_methods};
use mira::{ClientConfig, ErrorClass, Gateway, Identity};

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
async fn healthy_session_pings_without_side_effects() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;

	assert!(gw.keep_alive().await);
	assert_eq!(server.calls(session_methods::KEEP_ALIVE), 1);
	assert_eq!(server.connections(), 1);
	assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn expired_session_triggers_one_reconnect() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	let original = gw.session_uuid().unwrap().to_string();
	server.expire_session(&original);

	assert!(gw.keep_alive().await);
	assert!(gw.is_connected());
	assert_ne!(gw.session_uuid().unwrap(), original);
	assert_eq!(server.handshakes(), 2);
}

#[tokio::test]
async fn lost_transport_triggers_one_reconnect_preserving_session() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	let original = gw.session_uuid().unwrap().to_string();
	server.drop_link();

	assert!(gw.keep_alive().await);
	assert_eq!(server.connections(), 2);
	// The session itself never died, so the reconnect re-joins it.
	assert_eq!(gw.session_uuid().unwrap(), original);
	assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn failed_reconnect_leaves_the_gateway_failed() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.drop_link();
	server.fail_connect(10);

	assert!(!gw.keep_alive().await);
	assert!(!gw.is_connected());
	assert_eq!(gw.last_error().unwrap().class(), ErrorClass::TransientNetwork);
}

#[tokio::test]
async fn refusal_is_reported_without_reconnecting() {
	let server = FakeServer::new();
	let mut gw = connected_gateway(&server).await;
	server.fail_next(session_methods::KEEP_ALIVE, ErrorCategory::SecurityViolation, "locked", 1);

	assert!(!gw.keep_alive().await);
	assert_eq!(server.connections(), 1, "refusals are not a transport problem");
	assert_eq!(gw.last_error().unwrap().class(), ErrorClass::SecurityViolation);
}

#[tokio::test]
async fn disconnected_gateway_reports_dead_without_touching_the_wire() {
	let server = FakeServer::new();
	let config = ClientConfig::default().with_credentials("ada", "pw");
	let identity = Identity::from_config(&config).unwrap();
	let mut gw = Gateway::new(identity, Arc::new(server.clone()), Duration::from_millis(10));

	assert!(!gw.keep_alive().await);
	assert_eq!(server.connections(), 0);
}
