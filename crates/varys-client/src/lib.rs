#![warn(missing_docs)]

//! The Varys client library: registers with a coordinator through a local
//! host agent, publishes flows (`putObject`/`putFile`/`putFake`), pulls them
//! back (`getObject`/`getFile`/`getFake`), and reacts to rate updates pushed
//! by the coordinator.

/// The client's handle: connection setup, coflow lifecycle, host ranking.
pub mod client;
/// The client's connection to the coordinator, including unsolicited pushes.
pub mod coordinator_link;
/// The client's own in-process data server for `INMEMORY` flows.
pub mod dataserver;
/// `getObject`/`getFile`/`getFake`.
pub mod get;
/// `putObject`/`putFile`/`putFake`.
pub mod put;

pub use client::Client;
