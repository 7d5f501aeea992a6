//! HTTP client for the store API.
//!
//! One connection-pooled reqwest client per `StoreClient`, shared for the
//! life of the process. All endpoints are POST with query parameters;
//! upload bodies go as multipart form files, mirroring the store's CLI.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::gateway::{ByteStream, Cid, DagPutOpts, FilesWriteOpts, Store};
use crate::link::link_cid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Production [`Store`] implementation over the store's HTTP API.
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl StoreClient {
    /// Build a client for the given API base URL (e.g.
    /// `http://localhost:5001/api/v0`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Protocol(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Map a non-success response onto the error taxonomy. A 500 whose
    /// body says the file does not exist counts as `NotFound`; the store
    /// reports missing mutable files that way.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(body));
        }
        if status.is_server_error() {
            if body.contains("does not exist") || body.contains("no link named") {
                return Err(StoreError::NotFound(body));
            }
            return Err(StoreError::Transient(format!("{status}: {body}")));
        }
        Err(StoreError::Protocol(format!("unexpected status {status}: {body}")))
    }

    fn file_part(data: Vec<u8>, name: &str) -> Result<Form, StoreError> {
        let part = Part::bytes(data)
            .file_name(name.to_string())
            .mime_str("application/json")
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        Ok(Form::new().part("file", part))
    }
}

#[async_trait]
impl Store for StoreClient {
    async fn dag_put(&self, doc: &Value, opts: DagPutOpts) -> Result<Cid, StoreError> {
        let body = serde_json::to_vec(doc)
            .map_err(|e| StoreError::Protocol(format!("document serialization: {e}")))?;

        let mut query: Vec<(&str, &str)> = vec![
            ("store-codec", opts.codec.store_codec()),
            ("input-codec", "json"),
            ("pin", "true"),
        ];
        if opts.allow_big_block {
            query.push(("allow-big-block", "true"));
        }

        let mut request = self
            .http
            .post(self.url("dag/put"))
            .query(&query)
            .multipart(Self::file_part(body, "doc.json")?);
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }

        let response = Self::check(request.send().await?).await?;
        let result: Value = response.json().await?;

        let cid = result
            .get("Cid")
            .and_then(link_cid)
            .ok_or_else(|| StoreError::Protocol(format!("dag/put response without Cid: {result}")))?;
        debug!(cid, codec = opts.codec.store_codec(), "stored dag object");
        Ok(cid.to_string())
    }

    async fn dag_get(&self, cid: &str) -> Result<Value, StoreError> {
        let response = self
            .http
            .post(self.url("dag/get"))
            .query(&[("arg", cid)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn dag_get_stream(&self, cid: &str) -> Result<ByteStream, StoreError> {
        let response = self
            .http
            .post(self.url("dag/get"))
            .query(&[("arg", cid)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes_stream().map_err(StoreError::from).boxed())
    }

    async fn files_read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .http
            .post(self.url("files/read"))
            .query(&[("arg", path)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn files_write(
        &self,
        path: &str,
        data: Vec<u8>,
        opts: FilesWriteOpts,
    ) -> Result<(), StoreError> {
        let create = opts.create.to_string();
        let truncate = opts.truncate.to_string();
        let parents = opts.parents.to_string();
        let query: Vec<(&str, &str)> = vec![
            ("arg", path),
            ("create", &create),
            ("truncate", &truncate),
            ("parents", &parents),
        ];

        let mut request = self
            .http
            .post(self.url("files/write"))
            .query(&query)
            .multipart(Self::file_part(data, "data")?);
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }

        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), StoreError> {
        let parents = parents.to_string();
        let response = self
            .http
            .post(self.url("files/mkdir"))
            .query(&[("arg", path), ("parents", parents.as_str())])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn dag_export(&self, cid: &str) -> Result<ByteStream, StoreError> {
        let response = self
            .http
            .post(self.url("dag/export"))
            .query(&[("arg", cid)])
            // Exports walk the whole DAG; no sensible fixed bound.
            .timeout(Duration::from_secs(3600))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes_stream().map_err(StoreError::from).boxed())
    }
}
