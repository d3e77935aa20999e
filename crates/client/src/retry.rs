//! Safe-call wrapper: the tiered retry decorator around remote invocations.
//!
//! The ladder is intentionally asymmetric - cheap local recovery first,
//! expensive full reconnection last - and every ceiling is explicit so the
//! worst case is auditable:
//!
//! - transport/stale failures: direct attempt, retry once on a recreated
//!   handle, then one final attempt after a full reconnect (3 attempts max,
//!   no sleeps; the final attempt's failure is surfaced as-is)
//! - unclassified failures: one fixed-backoff retry of the call (2 attempts
//!   max), and never for writes
//! - security, resource-limit, and server-defect failures: no retries at
//!   all; retrying those wastes a round-trip or masks a real bug

use mira_protocol::ServiceName;
use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorClass, Result};
use crate::session::Gateway;

/// Whether a call may be replayed freely or must stay at-most-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallMode {
	Idempotent,
	Write,
}

impl Gateway {
	/// Invokes a read-only or naturally idempotent method through the
	/// safe-call ladder. Transient failures are invisible to the caller
	/// unless every tier is exhausted.
	pub async fn invoke(&mut self, name: ServiceName, method: &str, params: Value) -> Result<Value> {
		self.safe_call(name, method, params, CallMode::Idempotent).await
	}

	/// Invokes a mutating method. The inner ladder still applies, but the
	/// outer backoff tier does not: a write is never replayed when the
	/// failure gives no signal about whether the server applied it. Callers
	/// must treat the result as at-most-once.
	pub async fn invoke_write(&mut self, name: ServiceName, method: &str, params: Value) -> Result<Value> {
		self.safe_call(name, method, params, CallMode::Write).await
	}

	async fn safe_call(
		&mut self,
		name: ServiceName,
		method: &str,
		params: Value,
		mode: CallMode,
	) -> Result<Value> {
		let err = match self.call_once(name, method, params.clone()).await {
			Ok(value) => return Ok(value),
			Err(e) => e,
		};
		if err.is_fatal() {
			return Err(err);
		}

		match err.class() {
			ErrorClass::TransientNetwork | ErrorClass::StaleSession => {
				let mut stale = err.class() == ErrorClass::StaleSession;
				debug!(
					target = "mira.rpc",
					service = %name,
					method,
					error = %err,
					"call failed; retrying on a recreated handle"
				);
				let second = match self.recreate_and_call(name, method, params.clone()).await {
					Ok(value) => return Ok(value),
					Err(e) => e,
				};
				if second.is_fatal() {
					return Err(second);
				}
				stale |= second.class() == ErrorClass::StaleSession;

				debug!(
					target = "mira.rpc",
					service = %name,
					method,
					error = %second,
					"retry failed; reconnecting for a final attempt"
				);
				self.try_reconnect(stale).await?;
				// Final attempt: whatever happens now is the caller's answer.
				self.call_once(name, method, params).await
			}
			ErrorClass::Unclassified => {
				if mode == CallMode::Write {
					return Err(err);
				}
				debug!(
					target = "mira.rpc",
					service = %name,
					method,
					error = %err,
					backoff_ms = self.backoff().as_millis() as u64,
					"unclassified failure; one backoff retry"
				);
				tokio::time::sleep(self.backoff()).await;
				self.call_once(name, method, params).await
			}
			// is_fatal() already handled the remaining classes.
			_ => Err(err),
		}
	}

	async fn call_once(&mut self, name: ServiceName, method: &str, params: Value) -> Result<Value> {
		let handle = self.service(name).await?;
		let (connection, uuid) = self.live()?;
		connection
			.call(Some(&uuid), handle.remote_ref(), method, params)
			.await
	}

	async fn recreate_and_call(&mut self, name: ServiceName, method: &str, params: Value) -> Result<Value> {
		let handle = self.recreate_service(name).await?;
		let (connection, uuid) = self.live()?;
		connection
			.call(Some(&uuid), handle.remote_ref(), method, params)
			.await
	}
}
