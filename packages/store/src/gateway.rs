//! The store gateway trait and its request options.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::StoreError;

/// Content address of an object in the store. Opaque; equality is by string.
pub type Cid = String;

/// Stream of raw bytes coming back from the store.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Storage codec for DAG objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Binary, link-aware. Used for events and manifests.
    DagCbor,
    /// Human-readable. Used for snapshot documents.
    DagJson,
}

impl Codec {
    /// The store-codec parameter value for this codec.
    pub fn store_codec(&self) -> &'static str {
        match self {
            Codec::DagCbor => "dag-cbor",
            Codec::DagJson => "dag-json",
        }
    }
}

/// Options for a `dag_put` call. Every put pins the object.
#[derive(Debug, Clone)]
pub struct DagPutOpts {
    pub codec: Codec,
    /// Allow blocks above the store's usual size limit. Needed for large
    /// snapshot documents.
    pub allow_big_block: bool,
    /// Per-request timeout override.
    pub timeout: Option<Duration>,
}

impl DagPutOpts {
    /// Binary codec, default timeout.
    pub fn cbor() -> Self {
        Self {
            codec: Codec::DagCbor,
            allow_big_block: false,
            timeout: None,
        }
    }

    /// JSON codec, default timeout.
    pub fn json() -> Self {
        Self {
            codec: Codec::DagJson,
            allow_big_block: false,
            timeout: None,
        }
    }

    pub fn with_big_block(mut self) -> Self {
        self.allow_big_block = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for a `files_write` call.
#[derive(Debug, Clone)]
pub struct FilesWriteOpts {
    pub create: bool,
    pub truncate: bool,
    pub parents: bool,
    /// Per-request timeout override.
    pub timeout: Option<Duration>,
}

impl Default for FilesWriteOpts {
    fn default() -> Self {
        Self {
            create: true,
            truncate: true,
            parents: true,
            timeout: None,
        }
    }
}

impl FilesWriteOpts {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Typed interface over the content-addressed store.
///
/// Documents are `serde_json::Value` trees with links encoded as
/// `{"/": "<cid>"}`; the store mints CIDs and owns serialization to the
/// wire codec.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store a document and return its CID. Pins the object.
    async fn dag_put(&self, doc: &Value, opts: DagPutOpts) -> Result<Cid, StoreError>;

    /// Fetch a document by CID.
    async fn dag_get(&self, cid: &str) -> Result<Value, StoreError>;

    /// Fetch the raw bytes of a document as a stream.
    async fn dag_get_stream(&self, cid: &str) -> Result<ByteStream, StoreError>;

    /// Read a file from the mutable namespace.
    async fn files_read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Write a file in the mutable namespace.
    async fn files_write(
        &self,
        path: &str,
        data: Vec<u8>,
        opts: FilesWriteOpts,
    ) -> Result<(), StoreError>;

    /// Create a directory in the mutable namespace.
    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), StoreError>;

    /// Recursively export the DAG rooted at `cid` as an archive byte stream.
    async fn dag_export(&self, cid: &str) -> Result<ByteStream, StoreError>;
}
