use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Document, DocumentCreate, DocumentUpdate};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document store error: {0}")]
    Backend(String),
}

/// DocumentStorage
///
/// Contract for the schemaless document store. Documents are JSON objects grouped by a
/// caller-chosen `type`.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn create(&self, doc: DocumentCreate) -> Result<Document, DocumentError>;
    async fn get(&self, id: Uuid) -> Result<Document, DocumentError>;
    /// Replaces the `data` of an existing document and bumps `updated_at`.
    async fn update(&self, id: Uuid, update: DocumentUpdate) -> Result<Document, DocumentError>;
    async fn delete(&self, id: Uuid) -> Result<(), DocumentError>;
    /// All documents of one type, newest first.
    async fn list(&self, doc_type: &str) -> Result<Vec<Document>, DocumentError>;
}

pub type DocumentStorageState = Arc<dyn DocumentStorage>;

/// PostgresDocumentStorage
///
/// Keeps documents in the `documents` table with the payload in a JSONB column.
pub struct PostgresDocumentStorage {
    pool: PgPool,
}

impl PostgresDocumentStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStorage for PostgresDocumentStorage {
    async fn create(&self, doc: DocumentCreate) -> Result<Document, DocumentError> {
        Ok(sqlx::query_as::<_, Document>(
            "INSERT INTO documents (id, doc_type, data) VALUES ($1, $2, $3) \
             RETURNING id, doc_type, data, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(doc.doc_type)
        .bind(Value::Object(doc.data))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get(&self, id: Uuid) -> Result<Document, DocumentError> {
        sqlx::query_as::<_, Document>(
            "SELECT id, doc_type, data, created_at, updated_at FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DocumentError::NotFound)
    }

    async fn update(&self, id: Uuid, update: DocumentUpdate) -> Result<Document, DocumentError> {
        sqlx::query_as::<_, Document>(
            "UPDATE documents SET data = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING id, doc_type, data, created_at, updated_at",
        )
        .bind(id)
        .bind(Value::Object(update.data))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DocumentError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DocumentError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DocumentError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, doc_type: &str) -> Result<Vec<Document>, DocumentError> {
        Ok(sqlx::query_as::<_, Document>(
            "SELECT id, doc_type, data, created_at, updated_at FROM documents \
             WHERE doc_type = $1 ORDER BY created_at DESC",
        )
        .bind(doc_type)
        .fetch_all(&self.pool)
        .await?)
    }
}

/// InMemoryDocumentStorage
///
/// Process-local document store used by tests.
#[derive(Default)]
pub struct InMemoryDocumentStorage {
    docs: RwLock<HashMap<Uuid, Document>>,
}

impl InMemoryDocumentStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DocumentError {
    DocumentError::Backend("in-memory document lock poisoned".to_string())
}

#[async_trait]
impl DocumentStorage for InMemoryDocumentStorage {
    async fn create(&self, doc: DocumentCreate) -> Result<Document, DocumentError> {
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            doc_type: doc.doc_type,
            data: Value::Object(doc.data),
            created_at: now,
            updated_at: now,
        };
        self.docs
            .write()
            .map_err(|_| poisoned())?
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Document, DocumentError> {
        self.docs
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or(DocumentError::NotFound)
    }

    async fn update(&self, id: Uuid, update: DocumentUpdate) -> Result<Document, DocumentError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let doc = docs.get_mut(&id).ok_or(DocumentError::NotFound)?;
        doc.data = Value::Object(update.data);
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DocumentError> {
        self.docs
            .write()
            .map_err(|_| poisoned())?
            .remove(&id)
            .map(|_| ())
            .ok_or(DocumentError::NotFound)
    }

    async fn list(&self, doc_type: &str) -> Result<Vec<Document>, DocumentError> {
        let mut docs: Vec<Document> = self
            .docs
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|doc| doc.doc_type == doc_type)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }
}
