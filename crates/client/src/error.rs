//! Error type and the failure classification driving retry policy.

use mira_protocol::{ErrorCategory, ErrorPayload};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client.
///
/// Remote failures arrive pre-classified by the server ([`ErrorPayload`]);
/// local failures (socket errors, closed channels) are classified on this
/// side. [`Error::class`] is the single source of truth the session manager
/// and the safe-call wrapper consult.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Connection lost, refused, or reset.
	#[error("transport failure: {0}")]
	Transport(String),

	/// The server has no record of the claimed session.
	#[error("session expired: {0}")]
	StaleSession(String),

	/// Credentials rejected or insufficient permission.
	#[error("security violation: {0}")]
	Security(String),

	/// A server-side resource ceiling was hit.
	#[error("resource limit: {0}")]
	ResourceLimit(String),

	/// The server reported a deterministic internal defect.
	#[error("server internal defect: {0}")]
	ServerDefect(String),

	/// A remote failure the server could not classify.
	#[error("unclassified remote failure: {0}")]
	Unclassified(String),

	/// The connection's message loop went away before a response arrived.
	#[error("connection closed while awaiting response")]
	ChannelClosed,

	/// An operation that requires a live session was attempted without one.
	#[error("not connected")]
	NotConnected,

	/// A response arrived but did not have the expected shape.
	#[error("unexpected response shape: {0}")]
	UnexpectedResponse(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("serialization failure: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Serialization(e.to_string())
	}
}

/// Failure classes the retry tiers are keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	TransientNetwork,
	StaleSession,
	SecurityViolation,
	ResourceLimit,
	ServerInternalDefect,
	Unclassified,
	/// Local usage/config errors; never retried.
	Local,
}

impl Error {
	/// Classify this error for retry purposes.
	pub fn class(&self) -> ErrorClass {
		match self {
			Error::Transport(_) | Error::ChannelClosed => ErrorClass::TransientNetwork,
			Error::StaleSession(_) => ErrorClass::StaleSession,
			Error::Security(_) => ErrorClass::SecurityViolation,
			Error::ResourceLimit(_) => ErrorClass::ResourceLimit,
			Error::ServerDefect(_) => ErrorClass::ServerInternalDefect,
			Error::Unclassified(_) => ErrorClass::Unclassified,
			Error::NotConnected
			| Error::UnexpectedResponse(_)
			| Error::Config(_)
			| Error::Serialization(_) => ErrorClass::Local,
		}
	}

	/// Whether retrying can never help: propagate immediately.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self.class(),
			ErrorClass::SecurityViolation
				| ErrorClass::ResourceLimit
				| ErrorClass::ServerInternalDefect
				| ErrorClass::Local
		)
	}

	/// Whether this failure warrants recreating the transport/session.
	pub fn is_recoverable_by_reconnect(&self) -> bool {
		matches!(
			self.class(),
			ErrorClass::TransientNetwork | ErrorClass::StaleSession
		)
	}

	pub fn is_security(&self) -> bool {
		self.class() == ErrorClass::SecurityViolation
	}

	pub fn is_stale_session(&self) -> bool {
		self.class() == ErrorClass::StaleSession
	}
}

impl From<ErrorPayload> for Error {
	fn from(payload: ErrorPayload) -> Self {
		match payload.category {
			ErrorCategory::TransientNetwork => Error::Transport(payload.message),
			ErrorCategory::SessionExpired => Error::StaleSession(payload.message),
			ErrorCategory::SecurityViolation => Error::Security(payload.message),
			ErrorCategory::ResourceLimit => Error::ResourceLimit(payload.message),
			ErrorCategory::InternalDefect => Error::ServerDefect(payload.message),
			ErrorCategory::Unknown => Error::Unclassified(payload.message),
		}
	}
}
