//! Session lifecycle: the gateway owning one authenticated server session.
//!
//! The gateway is a small state machine. `connect` drives it toward
//! CONNECTED through join-then-create, `disconnect` tears it down, and the
//! safe-call wrapper asks it to reconnect when a call fails in a way a fresh
//! session can fix. One gateway serves one logical user; calls are expected
//! to be externally serialized, and no internal mutual exclusion is provided.

use std::sync::Arc;
use std::time::Duration;

use mira_protocol::{
	CloseSessionAck, CloseSessionParams, CreateSessionParams, EventContext, JoinSessionParams,
	ServiceName, SessionInfo, UserData, session_methods,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Error, ErrorClass, Result};
use crate::identity::{Credential, Identity};
use crate::services::{ScopedService, ServiceHandle, ServiceRegistry};
use crate::transport::{TcpFactory, TransportFactory};

/// Lifecycle states of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Disconnected,
	Joining,
	Creating,
	Connected,
	Failed,
}

/// Session manager and entry point for all remote calls.
pub struct Gateway {
	identity: Identity,
	factory: Arc<dyn TransportFactory>,
	backoff: Duration,
	state: SessionState,
	connection: Option<Arc<Connection>>,
	session_uuid: Option<String>,
	event_context: Option<EventContext>,
	user: Option<UserData>,
	last_error: Option<Error>,
	registry: ServiceRegistry,
	/// Runtime copy of the identity's group override; cleared when the
	/// degrade path falls back to the user's default group.
	group_override: Option<String>,
}

impl Gateway {
	pub fn new(identity: Identity, factory: Arc<dyn TransportFactory>, backoff: Duration) -> Self {
		let group_override = identity.group().map(str::to_string);
		Self {
			identity,
			factory,
			backoff,
			state: SessionState::Disconnected,
			connection: None,
			session_uuid: None,
			event_context: None,
			user: None,
			last_error: None,
			registry: ServiceRegistry::default(),
			group_override,
		}
	}

	/// Builds a gateway talking TCP to the configured host/port.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let identity = Identity::from_config(config)?;
		let factory = Arc::new(TcpFactory::new(identity.host(), identity.port()));
		Ok(Self::new(identity, factory, config.backoff))
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub(crate) fn factory(&self) -> Arc<dyn TransportFactory> {
		Arc::clone(&self.factory)
	}

	pub(crate) fn backoff(&self) -> Duration {
		self.backoff
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn is_connected(&self) -> bool {
		self.state == SessionState::Connected
	}

	/// Most recent unrecovered failure, if any.
	pub fn last_error(&self) -> Option<&Error> {
		self.last_error.as_ref()
	}

	/// UUID of the live session, if any.
	pub fn session_uuid(&self) -> Option<&str> {
		self.session_uuid.as_deref()
	}

	/// Caller context fetched at session establishment.
	pub fn event_context(&self) -> Option<&EventContext> {
		self.event_context.as_ref()
	}

	/// Full record of the authenticated user, resolved at establishment.
	pub fn user(&self) -> Option<&UserData> {
		self.user.as_ref()
	}

	/// Drives the gateway toward CONNECTED and reports whether it arrived.
	///
	/// Idempotent: calling while already connected performs no handshake and
	/// returns `true`. `uuid_hint` asks to join an existing session first;
	/// if the server rejects it, a fresh session is created instead (unless
	/// the identity is token-only, in which case the join failure stands).
	pub async fn connect(&mut self, uuid_hint: Option<&str>) -> bool {
		if self.state == SessionState::Connected {
			return true;
		}
		match self.establish(uuid_hint).await {
			Ok(()) => {
				self.last_error = None;
				true
			}
			Err(e) => {
				warn!(target = "mira.session", error = %e, "connect failed");
				self.fail(e);
				false
			}
		}
	}

	/// Tears the session down. A graceful disconnect performs a soft close
	/// that decrements the server's shared refcount; the session is only
	/// destroyed once the count reaches zero. "Session already gone" is
	/// treated as success either way; any other close failure is recorded as
	/// the last error, and local teardown proceeds regardless.
	pub async fn disconnect(&mut self, graceful: bool) {
		let close = match (&self.connection, &self.session_uuid) {
			(Some(connection), Some(uuid)) => {
				let params = CloseSessionParams {
					uuid: uuid.clone(),
					soft: graceful,
				};
				let result = match serde_json::to_value(&params) {
					Ok(params) => {
						connection
							.call_as::<CloseSessionAck>(
								Some(uuid),
								ServiceName::Session.wire_name(),
								session_methods::CLOSE,
								params,
							)
							.await
					}
					Err(e) => Err(Error::from(e)),
				};
				Some((uuid.clone(), result))
			}
			_ => None,
		};
		if let Some((uuid, result)) = close {
			match result {
				Ok(ack) => {
					info!(target = "mira.session", %uuid, remaining = ack.remaining, "session closed");
				}
				Err(e) if e.is_stale_session() => {
					debug!(target = "mira.session", %uuid, "session already gone");
				}
				Err(e) => {
					// Only "session already gone" may be swallowed; anything
					// else stays observable through the last-error slot.
					warn!(target = "mira.session", %uuid, error = %e, "close failed; discarding session");
					self.last_error = Some(e);
				}
			}
		}
		self.teardown_local();
		self.state = SessionState::Disconnected;
	}

	/// Liveness probe. On a stale-session or transport failure it makes
	/// exactly one reconnect attempt and returns that outcome; on refusal
	/// classes it returns `false` without reconnecting, leaving escalation
	/// to the caller.
	pub async fn keep_alive(&mut self) -> bool {
		let (Some(connection), Some(uuid)) = (&self.connection, &self.session_uuid) else {
			return false;
		};
		let ping = connection
			.call(
				Some(uuid),
				ServiceName::Session.wire_name(),
				session_methods::KEEP_ALIVE,
				json!({}),
			)
			.await;
		match ping {
			Ok(_) => true,
			Err(e) => match e.class() {
				ErrorClass::TransientNetwork => {
					debug!(target = "mira.session", error = %e, "keep-alive lost transport; reconnecting");
					self.try_reconnect(false).await.is_ok()
				}
				ErrorClass::StaleSession => {
					debug!(target = "mira.session", error = %e, "keep-alive found session gone; reconnecting");
					self.try_reconnect(true).await.is_ok()
				}
				_ => {
					warn!(target = "mira.session", error = %e, "keep-alive refused");
					self.last_error = Some(e);
					false
				}
			},
		}
	}

	/// Returns a handle for `name`, from cache for cacheable services and
	/// freshly resolved for per-use ones.
	pub async fn service(&mut self, name: ServiceName) -> Result<ServiceHandle> {
		let (connection, uuid) = self.live()?;
		self.registry.get_or_create(&connection, &uuid, name).await
	}

	/// Returns a per-use service wrapped in a scope guard that guarantees
	/// its server-side state is released.
	pub async fn scoped_service(&mut self, name: ServiceName) -> Result<ScopedService> {
		let (connection, uuid) = self.live()?;
		let handle = self.registry.get_or_create(&connection, &uuid, name).await?;
		Ok(ScopedService::new(handle, connection, uuid))
	}

	/// Epoch of the proxy cache; bumped whenever cached handles are
	/// invalidated or re-bound.
	pub fn service_epoch(&self) -> u64 {
		self.registry.epoch()
	}

	pub(crate) fn live(&self) -> Result<(Arc<Connection>, String)> {
		match (&self.connection, &self.session_uuid) {
			(Some(connection), Some(uuid)) if self.state == SessionState::Connected => {
				Ok((Arc::clone(connection), uuid.clone()))
			}
			_ => Err(Error::NotConnected),
		}
	}

	pub(crate) async fn recreate_service(&mut self, name: ServiceName) -> Result<ServiceHandle> {
		let (connection, uuid) = self.live()?;
		self.registry.recreate(&connection, &uuid, name).await
	}

	/// Drops the current transport and re-establishes the session. A stale
	/// reconnect forgets the old UUID so it is never joined again; otherwise
	/// joining the retained UUID is attempted before creating.
	pub(crate) async fn try_reconnect(&mut self, stale: bool) -> Result<()> {
		if stale {
			self.session_uuid = None;
		}
		if let Some(old) = self.connection.take() {
			old.shutdown();
		}
		self.state = SessionState::Disconnected;
		match self.establish(None).await {
			Ok(()) => {
				self.last_error = None;
				Ok(())
			}
			Err(e) => {
				warn!(target = "mira.session", error = %e, "reconnect failed");
				self.fail(e.clone());
				Err(e)
			}
		}
	}

	fn fail(&mut self, e: Error) {
		self.state = SessionState::Failed;
		self.teardown_local();
		self.last_error = Some(e);
	}

	fn teardown_local(&mut self) {
		if let Some(connection) = self.connection.take() {
			connection.shutdown();
		}
		self.session_uuid = None;
		self.event_context = None;
		self.user = None;
		self.registry.invalidate_all();
	}

	async fn establish(&mut self, uuid_hint: Option<&str>) -> Result<()> {
		self.state = SessionState::Disconnected;

		// The old transport, if any, is never reused after a failure.
		let connection = Arc::new(Connection::new(self.factory.connect().await?));
		let pump = Arc::clone(&connection);
		tokio::spawn(async move { pump.run().await });

		if let Err(e) = self.establish_on(&connection, uuid_hint).await {
			// The handshake failed; stop the pump so the abandoned link does
			// not linger.
			connection.shutdown();
			return Err(e);
		}
		Ok(())
	}

	async fn establish_on(
		&mut self,
		connection: &Arc<Connection>,
		uuid_hint: Option<&str>,
	) -> Result<()> {
		let token = match self.identity.credential() {
			Credential::SessionToken(token) => Some(token.clone()),
			Credential::Password { .. } => None,
		};
		let join_target = uuid_hint
			.map(str::to_string)
			.or_else(|| self.session_uuid.clone())
			.or_else(|| token.clone());

		if let Some(uuid) = join_target {
			self.state = SessionState::Joining;
			let joined = connection
				.call_as::<SessionInfo>(
					None,
					ServiceName::Session.wire_name(),
					session_methods::JOIN,
					serde_json::to_value(JoinSessionParams { uuid: uuid.clone() })?,
				)
				.await;
			match joined {
				Ok(info) => {
					debug!(target = "mira.session", uuid = %info.uuid, "joined existing session");
					return self.finish(connection, info.uuid).await;
				}
				Err(e) if token.is_some() => {
					// A token identity has nothing to create a session with.
					return Err(e);
				}
				Err(e) => {
					debug!(target = "mira.session", %uuid, error = %e, "join failed; creating instead");
				}
			}
		}

		self.state = SessionState::Creating;
		let info = self.create_session(connection).await?;
		self.finish(connection, info.uuid).await
	}

	/// Session creation with its layered resilience: an immediate degrade to
	/// the default group on a security rejection while an override is in
	/// play, and one fixed-backoff retry for anything unclassified. The
	/// degrade path deliberately takes no backoff.
	async fn create_session(&mut self, connection: &Connection) -> Result<SessionInfo> {
		let Credential::Password { username, password } = self.identity.credential() else {
			return Err(Error::Config("session token identity cannot create sessions".to_string()));
		};
		let params = CreateSessionParams {
			username: username.clone(),
			password: password.clone(),
			group: self.group_override.clone(),
			impersonate: self.identity.impersonate().map(str::to_string),
			properties: self.identity.properties().clone(),
		};

		let first = self.send_create(connection, &params).await;
		let err = match first {
			Ok(info) => return Ok(info),
			Err(e) => e,
		};

		if err.is_security() && self.group_override.is_some() {
			warn!(
				target = "mira.session",
				group = self.group_override.as_deref().unwrap_or(""),
				error = %err,
				"create rejected for requested group; degrading to default group"
			);
			self.group_override = None;
			let degraded = CreateSessionParams { group: None, ..params };
			return self.send_create(connection, &degraded).await;
		}

		if !err.is_fatal() {
			debug!(
				target = "mira.session",
				error = %err,
				backoff_ms = self.backoff.as_millis() as u64,
				"create failed; retrying once after backoff"
			);
			tokio::time::sleep(self.backoff).await;
			return self.send_create(connection, &params).await;
		}

		Err(err)
	}

	async fn send_create(&self, connection: &Connection, params: &CreateSessionParams) -> Result<SessionInfo> {
		connection
			.call_as(
				None,
				ServiceName::Session.wire_name(),
				session_methods::CREATE,
				serde_json::to_value(params)?,
			)
			.await
	}

	async fn finish(&mut self, connection: &Arc<Connection>, uuid: String) -> Result<()> {
		if self.registry.is_empty() {
			// Nothing to carry over; handles are created lazily on first use.
			self.registry.invalidate_all();
		} else {
			self.registry.resync_all(connection, &uuid).await?;
		}

		let context: EventContext = connection
			.call_as(
				Some(&uuid),
				ServiceName::Session.wire_name(),
				session_methods::EVENT_CONTEXT,
				json!({}),
			)
			.await?;

		self.connection = Some(Arc::clone(connection));
		self.session_uuid = Some(uuid.clone());
		self.state = SessionState::Connected;

		// Resolve the authenticated user's full record through the admin
		// service so consumers do not need a follow-up round-trip.
		let admin = self.registry.get_or_create(connection, &uuid, ServiceName::Admin).await?;
		let user: UserData = connection
			.call_as(
				Some(&uuid),
				admin.remote_ref(),
				"getUser",
				json!({ "login": context.user_name }),
			)
			.await?;

		info!(
			target = "mira.session",
			%uuid,
			user = %context.user_name,
			group = %context.group_name,
			"session established"
		);
		self.event_context = Some(context);
		self.user = Some(user);
		Ok(())
	}
}
