//! Cairn store gateway.
//!
//! Typed access to the content-addressed store's HTTP API. Everything the
//! rest of the workspace knows about the store goes through the [`Store`]
//! trait: DAG put/get, the mutable file namespace, and recursive DAG
//! export. [`StoreClient`] is the production implementation over reqwest;
//! an in-memory [`testing::MemStore`] backs the integration tests.

pub mod client;
pub mod error;
pub mod gateway;
pub mod link;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::StoreClient;
pub use error::StoreError;
pub use gateway::{ByteStream, Cid, Codec, DagPutOpts, FilesWriteOpts, Store};
pub use link::{link_cid, Link};
