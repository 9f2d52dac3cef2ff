use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FileUpload, StoredFile};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. FileStorage Contract
/// FileStorage
///
/// Abstract contract for the object store holding uploaded files. Handlers depend only
/// on this trait, so tests swap the S3 client for `InMemoryFileStorage`.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores the bytes under a freshly generated id and returns the metadata.
    async fn upload(&self, file: FileUpload) -> Result<StoredFile, StorageError>;
    /// Returns the metadata together with the file contents.
    async fn download(&self, id: Uuid) -> Result<(StoredFile, Vec<u8>), StorageError>;
    async fn get(&self, id: Uuid) -> Result<StoredFile, StorageError>;
    async fn list(&self) -> Result<Vec<StoredFile>, StorageError>;
    async fn delete(&self, id: Uuid) -> Result<(), StorageError>;
}

/// FileStorageState
///
/// The concrete type used to share file storage across the application state.
pub type FileStorageState = Arc<dyn FileStorage>;

const KEY_PREFIX: &str = "files/";
const FILENAME_METADATA: &str = "filename";

fn object_key(id: Uuid) -> String {
    format!("{KEY_PREFIX}{id}")
}

// 2. The Real Implementation (S3/MinIO)
/// S3FileStorage
///
/// Stores each file at `files/<uuid>`, keeping the original filename in the object
/// metadata and the MIME type as the object's content type.
///
/// `force_path_style(true)` is required for MinIO.
#[derive(Clone)]
pub struct S3FileStorage {
    client: s3::Client,
    bucket_name: String,
    endpoint: String,
}

impl S3FileStorage {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Creates the bucket if it is missing. Used by the local setup only; errors such as
    /// "bucket already owned by you" are ignored.
    pub async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    fn url_for(&self, id: Uuid) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, object_key(id))
    }
}

fn to_chrono(ts: Option<&s3::primitives::DateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl FileStorage for S3FileStorage {
    async fn upload(&self, file: FileUpload) -> Result<StoredFile, StorageError> {
        let id = Uuid::new_v4();
        let size = file.data.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(object_key(id))
            .content_type(&file.content_type)
            .metadata(FILENAME_METADATA, &file.name)
            .body(ByteStream::from(file.data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.into_service_error().to_string()))?;

        Ok(StoredFile {
            id,
            name: file.name,
            size,
            content_type: file.content_type,
            url: self.url_for(id),
            bucket_name: self.bucket_name.clone(),
            uploaded_at: Utc::now(),
        })
    }

    async fn download(&self, id: Uuid) -> Result<(StoredFile, Vec<u8>), StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(object_key(id))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_no_such_key() {
                    StorageError::NotFound
                } else {
                    StorageError::Backend(err.to_string())
                }
            })?;

        let file = StoredFile {
            id,
            name: output
                .metadata()
                .and_then(|m| m.get(FILENAME_METADATA))
                .cloned()
                .unwrap_or_else(|| id.to_string()),
            size: output.content_length().unwrap_or_default(),
            content_type: output
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            url: self.url_for(id),
            bucket_name: self.bucket_name.clone(),
            uploaded_at: to_chrono(output.last_modified()),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .into_bytes();

        Ok((file, bytes.to_vec()))
    }

    async fn get(&self, id: Uuid) -> Result<StoredFile, StorageError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(object_key(id))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_not_found() {
                    StorageError::NotFound
                } else {
                    StorageError::Backend(err.to_string())
                }
            })?;

        Ok(StoredFile {
            id,
            name: head
                .metadata()
                .and_then(|m| m.get(FILENAME_METADATA))
                .cloned()
                .unwrap_or_else(|| id.to_string()),
            size: head.content_length().unwrap_or_default(),
            content_type: head
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            url: self.url_for(id),
            bucket_name: self.bucket_name.clone(),
            uploaded_at: to_chrono(head.last_modified()),
        })
    }

    /// list
    ///
    /// Walks every page under `files/` and resolves each object's metadata.
    async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut ids = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(KEY_PREFIX)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::Backend(e.into_service_error().to_string()))?;

            ids.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter_map(|key| key.strip_prefix(KEY_PREFIX))
                    .filter_map(|id| Uuid::parse_str(id).ok()),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        let mut files = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id).await {
                Ok(file) => files.push(file),
                // Deleted between the listing and the HEAD request.
                Err(StorageError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    /// delete
    ///
    /// S3 deletes are silent for missing keys, so existence is checked first.
    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.get(id).await?;

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(object_key(id))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.into_service_error().to_string()))?;
        Ok(())
    }
}

// 3. The In-Memory Implementation (tests and offline runs)
/// InMemoryFileStorage
///
/// Keeps files in a process-local map. `new_failing()` makes every call fail, which lets
/// tests cover the 500 path of the handlers.
#[derive(Default)]
pub struct InMemoryFileStorage {
    files: RwLock<HashMap<Uuid, (StoredFile, Vec<u8>)>>,
    should_fail: bool,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "in-memory storage configured to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("in-memory storage lock poisoned".to_string())
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, file: FileUpload) -> Result<StoredFile, StorageError> {
        self.check_available()?;
        let id = Uuid::new_v4();
        let stored = StoredFile {
            id,
            size: file.data.len() as i64,
            name: file.name,
            content_type: file.content_type,
            url: format!("memory://classroom/{}", object_key(id)),
            bucket_name: "memory".to_string(),
            uploaded_at: Utc::now(),
        };

        self.files
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(id, (stored.clone(), file.data));
        Ok(stored)
    }

    async fn download(&self, id: Uuid) -> Result<(StoredFile, Vec<u8>), StorageError> {
        self.check_available()?;
        self.files
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn get(&self, id: Uuid) -> Result<StoredFile, StorageError> {
        self.download(id).await.map(|(file, _)| file)
    }

    async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        self.check_available()?;
        let mut files: Vec<StoredFile> = self
            .files
            .read()
            .map_err(|_| Self::poisoned())?
            .values()
            .map(|(file, _)| file.clone())
            .collect();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.check_available()?;
        self.files
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}

/// sanitize_filename
///
/// Keeps only the last path segment of a client-supplied filename and drops `.`/`..`,
/// so names can be echoed in `Content-Disposition` without path components.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .unwrap_or("upload");
    last.chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect()
}
