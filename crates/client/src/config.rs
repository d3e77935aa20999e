//! Client configuration: connection target, credentials, and retry tuning.
//!
//! Configuration can be built directly or loaded from a path-style bundle:
//! an ordered list of JSON fragments merged key-by-key, later fragments
//! winning. Deployments typically layer a site fragment, an instance
//! fragment, and a per-user fragment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 4064;
const DEFAULT_BACKOFF_SECS: u64 = 10;

/// One on-disk configuration fragment. Every field is optional so fragments
/// can each contribute a slice of the final configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFragment {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	/// Pre-issued session token; mutually exclusive with username/password.
	#[serde(default)]
	pub session_token: Option<String>,
	/// Effective group to request at session creation.
	#[serde(default)]
	pub group: Option<String>,
	/// Principal used when no credentials are configured.
	#[serde(default)]
	pub anonymous_user: Option<String>,
	#[serde(default)]
	pub anonymous_password: Option<String>,
	#[serde(default)]
	pub backoff_secs: Option<u64>,
	/// Free-form connection properties forwarded at session creation.
	#[serde(default)]
	pub properties: HashMap<String, String>,
}

impl ConfigFragment {
	fn merge_into(self, config: &mut ClientConfig) {
		if let Some(host) = self.host {
			config.host = host;
		}
		if let Some(port) = self.port {
			config.port = port;
		}
		if let Some(username) = self.username {
			config.username = Some(username);
		}
		if let Some(password) = self.password {
			config.password = Some(password);
		}
		if let Some(token) = self.session_token {
			config.session_token = Some(token);
		}
		if let Some(group) = self.group {
			config.group = Some(group);
		}
		if let Some(user) = self.anonymous_user {
			config.anonymous_user = Some(user);
		}
		if let Some(password) = self.anonymous_password {
			config.anonymous_password = Some(password);
		}
		if let Some(secs) = self.backoff_secs {
			config.backoff = Duration::from_secs(secs);
		}
		config.properties.extend(self.properties);
	}
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub host: String,
	pub port: u16,
	pub username: Option<String>,
	pub password: Option<String>,
	pub session_token: Option<String>,
	pub group: Option<String>,
	pub anonymous_user: Option<String>,
	pub anonymous_password: Option<String>,
	/// Fixed backoff used by the create-retry path and the outer safe-call tier.
	pub backoff: Duration,
	pub properties: HashMap<String, String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			host: "localhost".to_string(),
			port: DEFAULT_PORT,
			username: None,
			password: None,
			session_token: None,
			group: None,
			anonymous_user: None,
			anonymous_password: None,
			backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
			properties: HashMap::new(),
		}
	}
}

impl ClientConfig {
	/// Minimal direct construction for host/port plus credentials.
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			..Self::default()
		}
	}

	pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self.password = Some(password.into());
		self
	}

	pub fn with_group(mut self, group: impl Into<String>) -> Self {
		self.group = Some(group.into());
		self
	}

	pub fn with_backoff(mut self, backoff: Duration) -> Self {
		self.backoff = backoff;
		self
	}

	/// Loads and merges a configuration bundle. Fragments are applied in the
	/// order given; a missing file is an error, a malformed one too.
	pub fn from_fragments<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
		let mut config = Self::default();
		for path in paths {
			let path = path.as_ref();
			let content = fs::read_to_string(path)
				.map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
			let fragment: ConfigFragment = serde_json::from_str(&content)
				.map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
			fragment.merge_into(&mut config);
		}
		Ok(config)
	}

	/// Effective login principal: configured credentials, otherwise the
	/// anonymous defaults resolved from configuration.
	pub fn principal(&self) -> Result<(String, Option<String>)> {
		if let Some(username) = &self.username {
			return Ok((username.clone(), self.password.clone()));
		}
		if let Some(anonymous) = &self.anonymous_user {
			return Ok((anonymous.clone(), self.anonymous_password.clone()));
		}
		Err(Error::Config(
			"no credentials configured and no anonymous user available".to_string(),
		))
	}
}
