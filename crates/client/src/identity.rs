//! Immutable identity: the credential bundle a session is established under.

use std::collections::HashMap;

use crate::config::ClientConfig;
use crate::error::Result;

/// How the principal authenticates.
#[derive(Debug, Clone)]
pub enum Credential {
	/// Username plus optional password (anonymous principals have none).
	Password { username: String, password: Option<String> },
	/// Pre-issued session token. Join-only: there is nothing to create a
	/// fresh session with, so a failed join is surfaced directly.
	SessionToken(String),
}

/// The immutable bundle of credentials and connection target used to
/// establish a session. Constructed once from configuration; cloned (never
/// mutated) when a variant identity is needed.
#[derive(Debug, Clone)]
pub struct Identity {
	host: String,
	port: u16,
	credential: Credential,
	group: Option<String>,
	impersonate: Option<String>,
	properties: HashMap<String, String>,
}

impl Identity {
	/// Resolves an identity from configuration, applying anonymous defaults
	/// when no credentials are configured.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let credential = match &config.session_token {
			Some(token) => Credential::SessionToken(token.clone()),
			None => {
				let (username, password) = config.principal()?;
				Credential::Password { username, password }
			}
		};
		Ok(Self {
			host: config.host.clone(),
			port: config.port,
			credential,
			group: config.group.clone(),
			impersonate: None,
			properties: config.properties.clone(),
		})
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Group override requested at session creation, if any.
	pub fn group(&self) -> Option<&str> {
		self.group.as_deref()
	}

	/// Principal this identity acts on behalf of, if any.
	pub fn impersonate(&self) -> Option<&str> {
		self.impersonate.as_deref()
	}

	pub fn properties(&self) -> &HashMap<String, String> {
		&self.properties
	}

	/// Produces a copy sharing credentials but marked to act on behalf of
	/// `owner`, for writes that must preserve another principal's ownership.
	/// The copy always opens a fresh session; short-lived by convention.
	pub fn clone_for_owner(&self, owner: impl Into<String>) -> Identity {
		Identity {
			impersonate: Some(owner.into()),
			..self.clone()
		}
	}
}
