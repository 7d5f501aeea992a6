//! In-memory store for tests.
//!
//! Content-addressed like the real thing: a document's CID is derived from
//! the SHA-256 of its canonical JSON bytes, so identical documents dedupe
//! and CIDs are stable across runs. Failure injection knobs let tests
//! exercise the per-item failure paths of the ingest pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::gateway::{ByteStream, Cid, DagPutOpts, FilesWriteOpts, Store};

/// In-memory [`Store`] used by integration tests across the workspace.
#[derive(Default)]
pub struct MemStore {
    dags: RwLock<HashMap<Cid, Value>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
    /// Number of upcoming `dag_put` calls that fail with `Transient`.
    put_failures: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `dag_put` calls fail with a transient error.
    pub fn fail_next_puts(&self, n: usize) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    /// Delete a mutable file, simulating a missing tip.
    pub fn remove_file(&self, path: &str) {
        self.files.write().remove(path);
    }

    /// Number of stored DAG objects.
    pub fn dag_count(&self) -> usize {
        self.dags.read().len()
    }

    fn mint_cid(doc: &Value) -> Result<Cid, StoreError> {
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| StoreError::Protocol(format!("document serialization: {e}")))?;
        Ok(format!("bafy{}", hex::encode(Sha256::digest(&bytes))))
    }
}

#[async_trait]
impl Store for MemStore {
    async fn dag_put(&self, doc: &Value, _opts: DagPutOpts) -> Result<Cid, StoreError> {
        if self
            .put_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Transient("injected put failure".into()));
        }

        let cid = Self::mint_cid(doc)?;
        self.dags.write().insert(cid.clone(), doc.clone());
        Ok(cid)
    }

    async fn dag_get(&self, cid: &str) -> Result<Value, StoreError> {
        self.dags
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("no object for {cid}")))
    }

    async fn dag_get_stream(&self, cid: &str) -> Result<ByteStream, StoreError> {
        let doc = self.dag_get(cid).await?;
        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| StoreError::Protocol(format!("document serialization: {e}")))?;
        Ok(Box::pin(stream::iter([Ok(Bytes::from(bytes))])))
    }

    async fn files_read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("file does not exist: {path}")))
    }

    async fn files_write(
        &self,
        path: &str,
        data: Vec<u8>,
        opts: FilesWriteOpts,
    ) -> Result<(), StoreError> {
        let mut files = self.files.write();
        if !opts.create && !files.contains_key(path) {
            return Err(StoreError::NotFound(format!("file does not exist: {path}")));
        }
        files.insert(path.to_string(), data);
        Ok(())
    }

    async fn files_mkdir(&self, _path: &str, _parents: bool) -> Result<(), StoreError> {
        Ok(())
    }

    async fn dag_export(&self, cid: &str) -> Result<ByteStream, StoreError> {
        // A real export walks the DAG into an archive; the root document's
        // bytes are enough for tests that only consume the stream.
        self.dag_get_stream(cid).await
    }
}
