//! Wire types for the Mira data-server protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with a Mira server over its RPC transport. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the server's wire schema
//! * Stable: Changes only when the wire protocol changes
//!
//! The session manager, proxy cache, and retry machinery are built on top of
//! these types in `mira-client`.

pub mod model;
pub mod rpc;
pub mod services;
pub mod session;

pub use model::*;
pub use rpc::*;
pub use services::*;
pub use session::*;
