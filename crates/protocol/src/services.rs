//! Logical service names exposed by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of remote services a client can address.
///
/// Cacheable services are stateless from the client's point of view and are
/// reused across calls. Per-use services carry server-side per-client state
/// (open file handles, loaded pixel buffers) and must be created fresh for
/// every logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceName {
	Admin,
	Query,
	Update,
	Container,
	Metadata,
	Pixels,
	Repository,
	Share,
	Timeline,
	Types,
	Config,
	Session,
	RenderingEngine,
	RawPixelsStore,
	RawFileStore,
	ThumbnailStore,
	Search,
}

impl ServiceName {
	/// Whether handles for this service may be reused across calls.
	pub fn is_cacheable(self) -> bool {
		!matches!(
			self,
			ServiceName::RenderingEngine
				| ServiceName::RawPixelsStore
				| ServiceName::RawFileStore
				| ServiceName::ThumbnailStore
				| ServiceName::Search
		)
	}

	/// Wire name used in the request envelope's `service` field.
	pub fn wire_name(self) -> &'static str {
		match self {
			ServiceName::Admin => "admin",
			ServiceName::Query => "query",
			ServiceName::Update => "update",
			ServiceName::Container => "container",
			ServiceName::Metadata => "metadata",
			ServiceName::Pixels => "pixels",
			ServiceName::Repository => "repository",
			ServiceName::Share => "share",
			ServiceName::Timeline => "timeline",
			ServiceName::Types => "types",
			ServiceName::Config => "config",
			ServiceName::Session => "session",
			ServiceName::RenderingEngine => "renderingEngine",
			ServiceName::RawPixelsStore => "rawPixelsStore",
			ServiceName::RawFileStore => "rawFileStore",
			ServiceName::ThumbnailStore => "thumbnailStore",
			ServiceName::Search => "search",
		}
	}
}

impl fmt::Display for ServiceName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.wire_name())
	}
}

/// Methods of the `session` control service.
pub mod session_methods {
	pub const CREATE: &str = "createSession";
	pub const JOIN: &str = "joinSession";
	pub const CLOSE: &str = "closeSession";
	pub const KEEP_ALIVE: &str = "keepAlive";
	pub const EVENT_CONTEXT: &str = "getEventContext";
	/// Resolve a fresh remote reference for a logical service.
	pub const RESOLVE_SERVICE: &str = "resolveService";
	/// Re-cast a stringified remote reference onto the current transport.
	pub const CAST_SERVICE: &str = "castService";
	/// Release a per-use service's server-side state.
	pub const CLOSE_SERVICE: &str = "closeService";
}
