//! Client library for the Mira scientific data server.
//!
//! The crate's center of gravity is the session layer: [`Gateway`] owns one
//! authenticated server session, re-establishes it when the transport or
//! the session itself dies, and routes every remote call through a tiered
//! safe-call wrapper so transient failures stay invisible to callers.
//! Remote entities (projects, datasets, images, annotations) are exposed as
//! thin wrappers over server snapshots in [`objects`].
//!
//! # Connecting
//!
//! ```ignore
//! let config = ClientConfig::new("mira.example.org", 4064).with_credentials("ada", "pw");
//! let mut gateway = Gateway::from_config(&config)?;
//! if !gateway.connect(None).await {
//!     return Err(gateway.last_error().cloned().unwrap().into());
//! }
//! let images = gateway.invoke(ServiceName::Query, "find", params).await?;
//! ```
//!
//! # Threading
//!
//! A gateway provides no internal mutual exclusion: it serves one logical
//! user, and its operations must be externally serialized. Multi-user
//! consumers hold one gateway per user/request path.

pub mod config;
pub mod connection;
pub mod error;
pub mod fake;
pub mod identity;
pub mod objects;
pub mod retry;
pub mod services;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ConfigFragment};
pub use connection::Connection;
pub use error::{Error, ErrorClass, Result};
pub use identity::{Credential, Identity};
pub use mira_protocol as protocol;
pub use mira_protocol::ServiceName;
pub use objects::{AnnotationWrapper, DatasetWrapper, ImageWrapper, ProjectWrapper};
pub use services::{ScopedService, ServiceHandle};
pub use session::{Gateway, SessionState};
pub use transport::{TcpFactory, TcpTransport, Transport, TransportFactory, TransportParts};
