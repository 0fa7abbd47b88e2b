//! Object store clients
//!
//! The pipeline only needs download-by-name and upload-by-name against a
//! single bucket. [`GcsObjectStore`] talks to the Cloud Storage JSON API,
//! [`LocalObjectStore`] treats a directory as the bucket and
//! [`MemoryObjectStore`] backs tests.

use parking_lot::RwLock;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Result};

/// Blob storage with get/put-by-name semantics
pub trait ObjectStore {
    /// Copy object `name` to the local file `dest`
    fn download(&self, name: &str, dest: &Path) -> Result<()>;

    /// Store the local file `src` as object `name`
    fn upload(&self, src: &Path, name: &str) -> Result<()>;
}

/// Choose the store described by the configuration
pub fn from_config(config: &PipelineConfig) -> Result<Box<dyn ObjectStore>> {
    match &config.local_bucket_root {
        Some(root) => Ok(Box::new(LocalObjectStore::new(root, &config.gcs_bucket))),
        None => Ok(Box::new(GcsObjectStore::new(
            &config.gcs_endpoint,
            &config.gcs_bucket,
            config.gcs_oauth_token.clone(),
        )?)),
    }
}

/// Cloud Storage JSON API client
pub struct GcsObjectStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    token: Option<String>,
}

impl GcsObjectStore {
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| PipelineError::Config(format!("invalid object store endpoint {endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(PipelineError::Config(format!(
                "object store endpoint {endpoint} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| PipelineError::Io(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.to_string(),
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `GET /storage/v1/b/{bucket}/o/{object}?alt=media`
    pub fn download_url(&self, name: &str) -> Url {
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o", name]);
        url.query_pairs_mut().append_pair("alt", "media");
        url
    }

    /// `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}`
    pub fn upload_url(&self, name: &str) -> Url {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check(name: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(PipelineError::Io(format!(
            "object store request for {name} failed with {status}: {body}"
        )))
    }
}

impl ObjectStore for GcsObjectStore {
    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let url = self.download_url(name);
        debug!(%url, "Downloading object");

        let response = self
            .authorize(self.client.get(url))
            .send()
            .map_err(|e| PipelineError::Io(format!("download of {name} failed: {e}")))?;
        let bytes = Self::check(name, response)?
            .bytes()
            .map_err(|e| PipelineError::Io(format!("download of {name} failed: {e}")))?;

        fs::write(dest, &bytes)?;
        info!(bucket = %self.bucket, object = name, bytes = bytes.len(), "Downloaded object");
        Ok(())
    }

    fn upload(&self, src: &Path, name: &str) -> Result<()> {
        let body = fs::read(src)?;
        let size = body.len();
        let url = self.upload_url(name);
        debug!(%url, "Uploading object");

        let response = self
            .authorize(self.client.post(url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .map_err(|e| PipelineError::Io(format!("upload of {name} failed: {e}")))?;
        Self::check(name, response)?;

        info!(bucket = %self.bucket, object = name, bytes = size, "Uploaded object");
        Ok(())
    }
}

/// Bucket stored as a directory tree at `root/bucket/`
pub struct LocalObjectStore {
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P, bucket: &str) -> Self {
        Self {
            bucket_dir: root.as_ref().join(bucket),
        }
    }

    pub fn object_path(&self, name: &str) -> PathBuf {
        self.bucket_dir.join(name)
    }
}

impl ObjectStore for LocalObjectStore {
    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let path = self.object_path(name);
        fs::copy(&path, dest)
            .map_err(|e| PipelineError::Io(format!("cannot read object {}: {}", path.display(), e)))?;
        debug!(object = name, "Copied object from local bucket");
        Ok(())
    }

    fn upload(&self, src: &Path, name: &str) -> Result<()> {
        let path = self.object_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &path)
            .map_err(|e| PipelineError::Io(format!("cannot write object {}: {}", path.display(), e)))?;
        debug!(object = name, "Copied object into local bucket");
        Ok(())
    }
}

/// In-memory bucket
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        self.objects.write().insert(name.to_string(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let bytes = self
            .get(name)
            .ok_or_else(|| PipelineError::Io(format!("no such object: {name}")))?;
        fs::write(dest, bytes)?;
        Ok(())
    }

    fn upload(&self, src: &Path, name: &str) -> Result<()> {
        self.put(name, fs::read(src)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_gcs_urls_encode_object_names() {
        let store = GcsObjectStore::new("http://localhost:4443", "omnivore", None).unwrap();

        assert_eq!(
            store.download_url("data/raw/library_items_2024-03-01.parquet").as_str(),
            "http://localhost:4443/storage/v1/b/omnivore/o/data%2Fraw%2Flibrary_items_2024-03-01.parquet?alt=media"
        );
        assert_eq!(
            store.upload_url("data/models/predict_read_model-v003.pkl").as_str(),
            "http://localhost:4443/upload/storage/v1/b/omnivore/o?uploadType=media&name=data%2Fmodels%2Fpredict_read_model-v003.pkl"
        );
    }

    #[test]
    fn test_gcs_rejects_bad_endpoint() {
        assert!(matches!(
            GcsObjectStore::new("not a url", "b", None),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            GcsObjectStore::new("mailto:ops@example.com", "b", None),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_local_store_round_trip() {
        let root = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let store = LocalObjectStore::new(root.path(), "omnivore");

        let src = scratch.path().join("model.pkl");
        fs::write(&src, b"model bytes").unwrap();
        store.upload(&src, "data/models/m.pkl").unwrap();
        assert!(root.path().join("omnivore/data/models/m.pkl").exists());

        let dest = scratch.path().join("copy.pkl");
        store.download("data/models/m.pkl", &dest).unwrap();
        assert_eq!(fs::read(dest).unwrap(), b"model bytes");
    }

    #[test]
    fn test_missing_objects_are_io_errors() {
        let scratch = tempdir().unwrap();
        let dest = scratch.path().join("x");

        let local = LocalObjectStore::new(scratch.path(), "omnivore");
        assert!(matches!(local.download("nope", &dest), Err(PipelineError::Io(_))));

        let memory = MemoryObjectStore::new();
        assert!(matches!(memory.download("nope", &dest), Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let scratch = tempdir().unwrap();
        let store = MemoryObjectStore::new();
        store.put("a/b", vec![1, 2, 3]);

        let dest = scratch.path().join("b");
        store.download("a/b", &dest).unwrap();
        store.upload(&dest, "c/d").unwrap();
        assert_eq!(store.get("c/d"), Some(vec![1, 2, 3]));
        assert!(store.contains("a/b"));
    }
}
