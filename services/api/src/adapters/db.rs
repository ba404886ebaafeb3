//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `DocumentStore` port from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! Every multi-tenant statement carries the owner predicate in its WHERE
//! clause. Nothing in this file fetches a row first and checks ownership
//! afterwards.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medintake_core::domain::{
    Analysis, AnalysisStatus, Document, DocumentStatus, NewAnalysis, NewDocument, User,
    UserProfile,
};
use medintake_core::pagination::{DocumentPage, PageRequest};
use medintake_core::ports::{DocumentStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Creates a new `PgRepository`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Fetches the analyses for a set of documents in one round trip,
    /// grouped by document, newest first within each group.
    async fn analyses_for_documents(
        &self,
        document_ids: &[Uuid],
    ) -> PortResult<HashMap<Uuid, Vec<Analysis>>> {
        if document_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let records = sqlx::query_as::<_, AnalysisRecord>(
            "SELECT id, document_id, summary, insights, health_card, timeline, \
             suggested_questions, status, error_message, processing_time_seconds, \
             created_at, updated_at \
             FROM analyses WHERE document_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(document_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<Analysis>> = HashMap::new();
        for record in records {
            let document_id = record.document_id;
            grouped
                .entry(document_id)
                .or_default()
                .push(record.into_domain()?);
        }
        Ok(grouped)
    }
}

//=========================================================================================
// Error Classification
//=========================================================================================

// Postgres SQLSTATE codes for constraint violations.
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Classifies a `sqlx::Error` into the port taxonomy. Raw driver errors
/// never cross the port boundary.
fn classify_sqlx_error(error: sqlx::Error) -> PortError {
    match error {
        sqlx::Error::RowNotFound => PortError::NotFound,
        sqlx::Error::PoolTimedOut => {
            PortError::Unavailable("timed out waiting for a database connection".to_string())
        }
        sqlx::Error::PoolClosed => {
            PortError::Unavailable("database connection pool is closed".to_string())
        }
        sqlx::Error::Io(e) => PortError::Unavailable(e.to_string()),
        sqlx::Error::Database(db_error) => match db_error.code().as_deref() {
            Some(SQLSTATE_FOREIGN_KEY_VIOLATION) => {
                PortError::Validation(db_error.message().to_string())
            }
            Some(SQLSTATE_UNIQUE_VIOLATION) => {
                PortError::Conflict(db_error.message().to_string())
            }
            _ => PortError::Internal(db_error.message().to_string()),
        },
        other => PortError::Internal(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    external_auth_id: String,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRecord {
    fn into_domain(self) -> User {
        User {
            id: self.id,
            external_auth_id: self.external_auth_id,
            email: self.email,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    owner_id: Uuid,
    original_file_name: String,
    storage_path: String,
    storage_url: Option<String>,
    file_size_bytes: i64,
    mime_type: String,
    extracted_text: Option<String>,
    status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn into_domain(self, analyses: Vec<Analysis>) -> PortResult<Document> {
        let status = DocumentStatus::parse(&self.status).ok_or_else(|| {
            PortError::Internal(format!("unknown document status '{}'", self.status))
        })?;
        Ok(Document {
            id: self.id,
            owner_id: self.owner_id,
            original_file_name: self.original_file_name,
            storage_path: self.storage_path,
            storage_url: self.storage_url,
            file_size_bytes: self.file_size_bytes,
            mime_type: self.mime_type,
            extracted_text: self.extracted_text,
            status,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            analyses,
        })
    }
}

#[derive(FromRow)]
struct AnalysisRecord {
    id: Uuid,
    document_id: Uuid,
    summary: String,
    insights: serde_json::Value,
    health_card: serde_json::Value,
    timeline: serde_json::Value,
    suggested_questions: serde_json::Value,
    status: String,
    error_message: Option<String>,
    processing_time_seconds: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    fn into_domain(self) -> PortResult<Analysis> {
        let status = AnalysisStatus::parse(&self.status).ok_or_else(|| {
            PortError::Internal(format!("unknown analysis status '{}'", self.status))
        })?;
        Ok(Analysis {
            id: self.id,
            document_id: self.document_id,
            summary: self.summary,
            insights: decode_json("insights", self.insights)?,
            health_card: decode_json("health_card", self.health_card)?,
            timeline: decode_json("timeline", self.timeline)?,
            suggested_questions: decode_json("suggested_questions", self.suggested_questions)?,
            status,
            error_message: self.error_message,
            processing_time_seconds: self.processing_time_seconds,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: serde_json::Value,
) -> PortResult<T> {
    serde_json::from_value(value)
        .map_err(|e| PortError::Internal(format!("corrupt {} column: {}", column, e)))
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> PortResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| PortError::Internal(format!("failed to encode {}: {}", column, e)))
}

const ANALYSIS_COLUMNS: &str = "id, document_id, summary, insights, health_card, timeline, \
     suggested_questions, status, error_message, processing_time_seconds, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, owner_id, original_file_name, storage_path, storage_url, \
     file_size_bytes, mime_type, extracted_text, status, error_message, created_at, updated_at";

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgRepository {
    async fn find_or_create_user(
        &self,
        external_auth_id: &str,
        profile: UserProfile,
    ) -> PortResult<User> {
        // Single-statement upsert keyed by the provider's subject id, so a
        // first-sign-in race cannot create two rows.
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, external_auth_id, email, display_name, avatar_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (external_auth_id) DO UPDATE SET \
                 email = EXCLUDED.email, \
                 display_name = EXCLUDED.display_name, \
                 avatar_url = EXCLUDED.avatar_url, \
                 updated_at = now() \
             RETURNING id, external_auth_id, email, display_name, avatar_url, \
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(external_auth_id)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(record.into_domain())
    }

    async fn create_document(
        &self,
        owner_id: Uuid,
        new_document: NewDocument,
    ) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "INSERT INTO documents \
                 (id, owner_id, original_file_name, storage_path, storage_url, \
                  file_size_bytes, mime_type, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'uploaded') \
             RETURNING id, owner_id, original_file_name, storage_path, storage_url, \
                       file_size_bytes, mime_type, extracted_text, status, error_message, \
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&new_document.original_file_name)
        .bind(&new_document.storage_path)
        .bind(&new_document.storage_url)
        .bind(new_document.file_size_bytes)
        .bind(&new_document.mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        record.into_domain(Vec::new())
    }

    async fn list_documents_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> PortResult<DocumentPage> {
        // Probe one row past the page to compute `has_more` without a
        // second COUNT query.
        let mut records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(owner_id)
        .bind(page.limit() + 1)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        let has_more = records.len() as i64 > page.limit();
        records.truncate(page.limit() as usize);

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut analyses = self.analyses_for_documents(&ids).await?;

        let documents = records
            .into_iter()
            .map(|record| {
                let attached = analyses.remove(&record.id).unwrap_or_default();
                record.into_domain(attached)
            })
            .collect::<PortResult<Vec<_>>>()?;

        Ok(DocumentPage {
            documents,
            has_more,
        })
    }

    async fn get_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND owner_id = $2"
        ))
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?
        .ok_or(PortError::NotFound)?;

        let mut analyses = self.analyses_for_documents(&[record.id]).await?;
        let attached = analyses.remove(&record.id).unwrap_or_default();
        record.into_domain(attached)
    }

    async fn update_document_status(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
        extracted_text: Option<&str>,
    ) -> PortResult<u64> {
        // Affects zero rows when the caller is not the owner; callers that
        // need to distinguish "updated" from "not owned" check the count.
        let result = sqlx::query(
            "UPDATE documents SET \
                 status = $3, \
                 error_message = $4, \
                 extracted_text = COALESCE($5, extracted_text), \
                 updated_at = now() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(document_id)
        .bind(owner_id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(extracted_text)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn create_analysis(
        &self,
        document_id: Uuid,
        new_analysis: NewAnalysis,
    ) -> PortResult<Analysis> {
        let record = sqlx::query_as::<_, AnalysisRecord>(&format!(
            "INSERT INTO analyses \
                 (id, document_id, summary, insights, health_card, timeline, \
                  suggested_questions, status, processing_time_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed', $8) \
             RETURNING {ANALYSIS_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(&new_analysis.summary)
        .bind(encode_json("insights", &new_analysis.insights)?)
        .bind(encode_json("health_card", &new_analysis.health_card)?)
        .bind(encode_json("timeline", &new_analysis.timeline)?)
        .bind(encode_json(
            "suggested_questions",
            &new_analysis.suggested_questions,
        )?)
        .bind(new_analysis.processing_time_seconds)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        record.into_domain()
    }

    async fn get_analysis(&self, analysis_id: Uuid, owner_id: Uuid) -> PortResult<Analysis> {
        let record = sqlx::query_as::<_, AnalysisRecord>(
            "SELECT a.id, a.document_id, a.summary, a.insights, a.health_card, a.timeline, \
                    a.suggested_questions, a.status, a.error_message, \
                    a.processing_time_seconds, a.created_at, a.updated_at \
             FROM analyses a \
             INNER JOIN documents d ON d.id = a.document_id \
             WHERE a.id = $1 AND d.owner_id = $2",
        )
        .bind(analysis_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?
        .ok_or(PortError::NotFound)?;

        record.into_domain()
    }

    async fn list_analyses_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> PortResult<Vec<Analysis>> {
        let records = sqlx::query_as::<_, AnalysisRecord>(
            "SELECT a.id, a.document_id, a.summary, a.insights, a.health_card, a.timeline, \
                    a.suggested_questions, a.status, a.error_message, \
                    a.processing_time_seconds, a.created_at, a.updated_at \
             FROM analyses a \
             INNER JOIN documents d ON d.id = a.document_id \
             WHERE d.owner_id = $1 \
             ORDER BY a.created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        records.into_iter().map(|r| r.into_domain()).collect()
    }

    async fn update_analysis_status(
        &self,
        analysis_id: Uuid,
        owner_id: Uuid,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE analyses SET status = $3, error_message = $4, updated_at = now() \
             WHERE id = $1 \
               AND document_id IN (SELECT id FROM documents WHERE owner_id = $2)",
        )
        .bind(analysis_id)
        .bind(owner_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}
