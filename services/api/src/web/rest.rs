//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::analyze_task::spawn_analysis;
use crate::web::state::{AppState, CurrentUser};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use chrono::{DateTime, Utc};
use medintake_core::domain::{Analysis, Document, DocumentStatus, NewDocument};
use medintake_core::pagination::PageRequest;
use medintake_core::ports::{PortError, UploadProgress};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Bound on the liveness probe's database round trip.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_documents_handler,
        upload_document_handler,
        get_document_handler,
        analyze_document_handler,
        list_analyses_handler,
        get_analysis_handler,
    ),
    components(
        schemas(ErrorBody, HealthResponse, PaginationMeta, DocumentListResponse, AnalyzeAccepted)
    ),
    tags(
        (name = "Medintake API", description = "Medical-document intake: uploads, documents, and analyses.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Machine-readable error body returned for every failure.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Wraps a `PortError` so it can leave a handler as an HTTP response with
/// the taxonomy's status mapping.
#[derive(Debug)]
pub struct WebError(pub PortError);

impl From<PortError> for WebError {
    fn from(e: PortError) -> Self {
        WebError(e)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PortError::Validation(_) => StatusCode::BAD_REQUEST,
            PortError::NotFound => StatusCode::NOT_FOUND,
            PortError::Conflict(_) => StatusCode::CONFLICT,
            PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PortError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize)]
pub struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageParams {
    fn to_page(&self) -> PageRequest {
        let default = PageRequest::default();
        PageRequest::new(
            self.limit.unwrap_or(default.limit()),
            self.offset.unwrap_or(default.offset()),
        )
    }
}

/// Echoes the clamped pagination window alongside the look-ahead flag.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentListResponse {
    #[schema(value_type = Vec<Object>)]
    pub documents: Vec<Document>,
    pub pagination: PaginationMeta,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisListResponse {
    #[schema(value_type = Vec<Object>)]
    pub analyses: Vec<Analysis>,
    pub pagination: PaginationMeta,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeAccepted {
    pub document_id: Uuid,
    pub status: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
}

//=========================================================================================
// Health
//=========================================================================================

/// Liveness probe. Unauthenticated by design.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service and store are healthy", body = HealthResponse),
        (status = 503, description = "Store round trip failed", body = HealthResponse),
        (status = 500, description = "Probe itself errored", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let probe = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.repo.health_check()).await;
    let (status_code, status, database) = match probe {
        Ok(true) => (StatusCode::OK, "healthy", "connected"),
        Ok(false) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "unreachable"),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error", "timed out"),
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            database,
            timestamp: Utc::now(),
        }),
    )
}

//=========================================================================================
// Documents
//=========================================================================================

/// List the caller's documents, newest first, analyses attached.
#[utoipa::path(
    get,
    path = "/api/documents",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 0..=100"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, clamped to >= 0")
    ),
    responses(
        (status = 200, description = "One page of documents", body = DocumentListResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 503, description = "Store unavailable, retry later", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    Query(params): Query<PageParams>,
) -> Result<Json<DocumentListResponse>, WebError> {
    let page = params.to_page();
    let result = state.repo.list_documents_by_owner(owner_id, page).await?;

    Ok(Json(DocumentListResponse {
        documents: result.documents,
        pagination: PaginationMeta {
            limit: page.limit(),
            offset: page.offset(),
            has_more: result.has_more,
        },
    }))
}

/// Upload a document. Streams the file to blob storage, then registers it.
#[utoipa::path(
    post,
    path = "/api/documents",
    request_body(content_type = "multipart/form-data", description = "A single `file` part."),
    responses(
        (status = 201, description = "Document registered in `uploaded` status"),
        (status = 400, description = "No file part or malformed upload", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 503, description = "Storage or store unavailable", body = ErrorBody)
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, WebError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| PortError::Validation(format!("failed to read multipart data: {}", e)))?
        .ok_or_else(|| PortError::Validation("multipart form must include a file".to_string()))?;

    let file_name = field.file_name().unwrap_or("untitled").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| PortError::Validation(format!("failed to read file bytes: {}", e)))?;
    if data.is_empty() {
        return Err(PortError::Validation("uploaded file is empty".to_string()).into());
    }

    let blob = state
        .storage
        .upload(
            owner_id,
            &file_name,
            &content_type,
            &data,
            Some(Box::new(|p: UploadProgress| {
                debug!(
                    bytes_sent = p.bytes_sent,
                    total_bytes = p.total_bytes,
                    percent = p.percent(),
                    "upload progress"
                );
            })),
        )
        .await?;

    let created = state
        .repo
        .create_document(
            owner_id,
            NewDocument {
                original_file_name: file_name,
                storage_path: blob.storage_path.clone(),
                storage_url: blob.storage_url,
                file_size_bytes: blob.size_bytes,
                mime_type: blob.content_type,
            },
        )
        .await;

    match created {
        Ok(document) => {
            info!(document_id = %document.id, "document uploaded");
            Ok((StatusCode::CREATED, Json(document)))
        }
        Err(e) => {
            // The blob is orphaned if registration fails; best-effort cleanup.
            if let Err(cleanup) = state.storage.delete(&blob.storage_path).await {
                warn!("failed to clean up orphaned blob: {}", cleanup);
            }
            Err(e.into())
        }
    }
}

/// Fetch one of the caller's documents. A document owned by someone else is
/// indistinguishable from one that does not exist.
#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "The document, analyses attached"),
        (status = 404, description = "Absent or not owned by the caller", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    )
)]
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Document>, WebError> {
    let document = state.repo.get_document(document_id, owner_id).await?;
    Ok(Json(document))
}

/// Kick off analysis of one of the caller's documents.
#[utoipa::path(
    post,
    path = "/api/documents/{id}/analyze",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 202, description = "Analysis started", body = AnalyzeAccepted),
        (status = 404, description = "Absent or not owned by the caller", body = ErrorBody),
        (status = 503, description = "No analysis engine configured", body = ErrorBody)
    )
)]
pub async fn analyze_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, WebError> {
    // Ownership is resolved here, before the engine ever sees the document.
    let document = state.repo.get_document(document_id, owner_id).await?;

    let engine = state
        .engine
        .clone()
        .ok_or_else(|| PortError::Unavailable("no analysis engine configured".to_string()))?;

    state
        .repo
        .update_document_status(document.id, owner_id, DocumentStatus::Processing, None, None)
        .await?;

    spawn_analysis(
        state.repo.clone(),
        engine,
        document,
        owner_id,
        state.shutdown.clone(),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeAccepted {
            document_id,
            status: "processing",
        }),
    ))
}

//=========================================================================================
// Analyses
//=========================================================================================

/// List analyses across all of the caller's documents, newest first.
#[utoipa::path(
    get,
    path = "/api/analyses",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to 0..=100"),
        ("offset" = Option<i64>, Query, description = "Rows to skip, clamped to >= 0")
    ),
    responses(
        (status = 200, description = "One page of analyses"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    )
)]
pub async fn list_analyses_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    Query(params): Query<PageParams>,
) -> Result<Json<AnalysisListResponse>, WebError> {
    let page = params.to_page();
    let analyses = state.repo.list_analyses_by_owner(owner_id, page).await?;

    // The list port has no look-ahead; a full page implies there may be more.
    let has_more = analyses.len() as i64 == page.limit();
    Ok(Json(AnalysisListResponse {
        analyses,
        pagination: PaginationMeta {
            limit: page.limit(),
            offset: page.offset(),
            has_more,
        },
    }))
}

/// Fetch one analysis, authorized through its owning document.
#[utoipa::path(
    get,
    path = "/api/analyses/{id}",
    params(("id" = Uuid, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "The analysis"),
        (status = 404, description = "Absent or not owned by the caller", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody)
    )
)]
pub async fn get_analysis_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(owner_id)): Extension<CurrentUser>,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<Analysis>, WebError> {
    let analysis = state.repo.get_analysis(analysis_id, owner_id).await?;
    Ok(Json(analysis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_error_maps_the_full_taxonomy() {
        let cases = [
            (PortError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (PortError::NotFound, StatusCode::NOT_FOUND),
            (PortError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                PortError::Unavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (PortError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                PortError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = WebError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn page_params_default_and_clamp() {
        let defaulted = PageParams {
            limit: None,
            offset: None,
        }
        .to_page();
        assert_eq!(defaulted.limit(), 20);
        assert_eq!(defaulted.offset(), 0);

        let clamped = PageParams {
            limit: Some(10_000),
            offset: Some(-5),
        }
        .to_page();
        assert_eq!(clamped.limit(), 100);
        assert_eq!(clamped.offset(), 0);
    }
}
