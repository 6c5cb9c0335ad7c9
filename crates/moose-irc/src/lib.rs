//! IRC adapter.
//!
//! A plain-TCP line client: registration, PING/PONG, nick retries, event
//! translation, and a paced outbound writer. `IrcClient` is the `ChatPort`
//! handed to the router.

pub mod client;
pub mod connection;
pub mod events;
pub mod message;

pub use client::{IrcClient, OutboundQueues};
pub use connection::run;
