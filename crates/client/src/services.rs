//! Service proxy cache: lazily resolved remote service handles.
//!
//! Cacheable services are resolved once and reused for the life of the
//! session; per-use services are resolved fresh on every request because
//! they carry server-side per-client state. After a reconnect the cache is
//! never reused as-is: cacheable handles are re-cast onto the new transport
//! (`resync_all`) or discarded entirely (`invalidate_all`).

use std::collections::HashMap;
use std::sync::Arc;

use mira_protocol::{ServiceName, ServiceRef, session_methods};
use serde_json::json;

use crate::connection::Connection;
use crate::error::Result;

/// A client-side reference to one remote service endpoint.
///
/// The remote reference is valid only for the transport epoch it was
/// resolved under; holders that survive a reconnect must re-fetch from the
/// gateway rather than reuse a stale handle.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
	name: ServiceName,
	remote_ref: Arc<str>,
	epoch: u64,
}

impl ServiceHandle {
	pub fn name(&self) -> ServiceName {
		self.name
	}

	/// Stringified remote reference, sent as the envelope's service field.
	pub fn remote_ref(&self) -> &str {
		&self.remote_ref
	}

	/// Transport epoch this handle was resolved under.
	pub fn epoch(&self) -> u64 {
		self.epoch
	}
}

/// Owns the name → handle mapping for one gateway.
#[derive(Default)]
pub struct ServiceRegistry {
	cached: HashMap<ServiceName, ServiceHandle>,
	epoch: u64,
}

impl ServiceRegistry {
	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	pub fn is_empty(&self) -> bool {
		self.cached.is_empty()
	}

	/// Returns the handle for `name`, resolving it on first use. Per-use
	/// names always resolve fresh and are never stored.
	pub async fn get_or_create(
		&mut self,
		connection: &Connection,
		session: &str,
		name: ServiceName,
	) -> Result<ServiceHandle> {
		if name.is_cacheable() {
			if let Some(handle) = self.cached.get(&name) {
				return Ok(handle.clone());
			}
		}
		let handle = self.resolve(connection, session, name).await?;
		if name.is_cacheable() {
			self.cached.insert(name, handle.clone());
		}
		Ok(handle)
	}

	/// Discards any cached handle for `name` and resolves a fresh one.
	pub async fn recreate(
		&mut self,
		connection: &Connection,
		session: &str,
		name: ServiceName,
	) -> Result<ServiceHandle> {
		self.cached.remove(&name);
		self.get_or_create(connection, session, name).await
	}

	/// Re-binds every cached handle onto a new transport by re-casting its
	/// stringified remote reference. The map is replaced wholesale so no
	/// handle bound to the old transport survives.
	pub async fn resync_all(&mut self, connection: &Connection, session: &str) -> Result<()> {
		self.epoch += 1;
		let mut resynced = HashMap::with_capacity(self.cached.len());
		for (name, stale) in self.cached.drain() {
			let cast: ServiceRef = connection
				.call_as(
					Some(session),
					ServiceName::Session.wire_name(),
					session_methods::CAST_SERVICE,
					json!({ "reference": stale.remote_ref() }),
				)
				.await?;
			tracing::debug!(
				target = "mira.services",
				service = %name,
				reference = %cast.reference,
				"re-cast cached handle"
			);
			resynced.insert(
				name,
				ServiceHandle {
					name,
					remote_ref: Arc::from(cast.reference),
					epoch: self.epoch,
				},
			);
		}
		self.cached = resynced;
		Ok(())
	}

	/// Drops every cached handle. Used when the session dies for good so no
	/// component can retrieve a handle bound to a dead session.
	pub fn invalidate_all(&mut self) {
		self.epoch += 1;
		self.cached.clear();
	}

	async fn resolve(
		&self,
		connection: &Connection,
		session: &str,
		name: ServiceName,
	) -> Result<ServiceHandle> {
		let resolved: ServiceRef = connection
			.call_as(
				Some(session),
				ServiceName::Session.wire_name(),
				session_methods::RESOLVE_SERVICE,
				json!({ "name": name.wire_name() }),
			)
			.await?;
		tracing::debug!(
			target = "mira.services",
			service = %name,
			reference = %resolved.reference,
			"resolved service handle"
		);
		Ok(ServiceHandle {
			name,
			remote_ref: Arc::from(resolved.reference),
			epoch: self.epoch,
		})
	}
}

/// Per-use service handle with guaranteed release.
///
/// Prefer calling [`ScopedService::close`] so release errors are observable;
/// if the scope unwinds first, drop issues a best-effort close in the
/// background so server-side state (open file handles, pixel buffers) does
/// not leak.
pub struct ScopedService {
	handle: ServiceHandle,
	connection: Arc<Connection>,
	session: String,
	closed: bool,
}

impl ScopedService {
	pub(crate) fn new(handle: ServiceHandle, connection: Arc<Connection>, session: String) -> Self {
		Self {
			handle,
			connection,
			session,
			closed: false,
		}
	}

	pub fn handle(&self) -> &ServiceHandle {
		&self.handle
	}

	/// Invokes a method on this service instance, unretried: per-use services
	/// are stateful, so replaying a call against a recreated instance would
	/// not be equivalent.
	pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
		self.connection
			.call(Some(&self.session), self.handle.remote_ref(), method, params)
			.await
	}

	/// Releases the server-side state held by this service.
	pub async fn close(mut self) -> Result<()> {
		self.closed = true;
		self.connection
			.call(
				Some(&self.session),
				ServiceName::Session.wire_name(),
				session_methods::CLOSE_SERVICE,
				json!({ "reference": self.handle.remote_ref() }),
			)
			.await?;
		Ok(())
	}
}

impl Drop for ScopedService {
	fn drop(&mut self) {
		if self.closed {
			return;
		}
		let connection = Arc::clone(&self.connection);
		let session = self.session.clone();
		let reference = self.handle.remote_ref().to_string();
		if let Ok(runtime) = tokio::runtime::Handle::try_current() {
			runtime.spawn(async move {
				let _ = connection
					.call(
						Some(&session),
						ServiceName::Session.wire_name(),
						session_methods::CLOSE_SERVICE,
						json!({ "reference": reference }),
					)
					.await;
			});
		}
	}
}
