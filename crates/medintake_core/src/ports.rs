//! crates/medintake_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of the concrete database, blob store, and identity
//! provider.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Analysis, AnalysisStatus, Document, DocumentStatus, NewAnalysis, NewDocument, User,
    UserProfile,
};
use crate::pagination::{DocumentPage, PageRequest};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// Adapters classify their library-specific failures into this taxonomy;
/// raw driver errors never cross a port boundary. `NotFound` deliberately
/// covers both "row absent" and "row owned by someone else" so that
/// cross-tenant probing cannot confirm a row exists.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Internal(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Repository Port
//=========================================================================================

/// The repository contract over the users/documents/analyses store.
///
/// Every multi-tenant read and write embeds the ownership predicate in the
/// query itself rather than fetching-then-checking in application code.
/// Implementations must never regress this.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- User Management ---

    /// Idempotent upsert keyed by the identity provider's subject id.
    /// Provider-supplied profile fields are refreshed on every call.
    async fn find_or_create_user(
        &self,
        external_auth_id: &str,
        profile: UserProfile,
    ) -> PortResult<User>;

    // --- Document Management ---

    /// Inserts a document in `Uploaded` status. A dangling `owner_id` is
    /// surfaced as `PortError::Validation`, not a raw constraint error.
    async fn create_document(
        &self,
        owner_id: Uuid,
        new_document: NewDocument,
    ) -> PortResult<Document>;

    /// Documents owned by `owner_id`, newest first, with analyses attached.
    async fn list_documents_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> PortResult<DocumentPage>;

    /// Owner-scoped single fetch; absence and non-ownership are both
    /// `NotFound`.
    async fn get_document(&self, document_id: Uuid, owner_id: Uuid) -> PortResult<Document>;

    /// Conditional update whose WHERE clause includes the owner. Returns the
    /// affected-row count: zero means the caller does not own the document
    /// (or it is gone), and is not an error. `extracted_text = None` leaves
    /// the stored text untouched; `error_message = None` clears it.
    async fn update_document_status(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
        extracted_text: Option<&str>,
    ) -> PortResult<u64>;

    // --- Analysis Management ---

    /// Inserts a completed analysis. Does not itself verify ownership: the
    /// caller is trusted to have resolved `document_id` through an
    /// owner-scoped path first.
    async fn create_analysis(
        &self,
        document_id: Uuid,
        new_analysis: NewAnalysis,
    ) -> PortResult<Analysis>;

    /// Owner-scoped fetch via inner join on the owning document.
    async fn get_analysis(&self, analysis_id: Uuid, owner_id: Uuid) -> PortResult<Analysis>;

    /// Analyses across all of the owner's documents, newest first.
    async fn list_analyses_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> PortResult<Vec<Analysis>>;

    /// Owner-restricted via a subquery on the owning document; silently
    /// affects zero rows when the caller is not the owner.
    async fn update_analysis_status(
        &self,
        analysis_id: Uuid,
        owner_id: Uuid,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> PortResult<u64>;

    // --- Liveness ---

    /// Trivial round-trip query. Swallows every failure and returns `false`;
    /// its only consumer is the liveness probe.
    async fn health_check(&self) -> bool;
}

//=========================================================================================
// Blob Storage Port (Upload Coordinator)
//=========================================================================================

/// A progress snapshot emitted while an upload streams to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_sent as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

/// Fire-and-forget progress callback; it participates in no transaction.
pub type ProgressFn = Box<dyn Fn(UploadProgress) + Send + Sync>;

/// The durable locator and metadata returned by a completed upload.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub storage_path: String,
    pub storage_url: Option<String>,
    pub size_bytes: i64,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Streams `data` to storage under a path derived from the owner and
    /// file name, reporting progress along the way.
    async fn upload(
        &self,
        owner_id: Uuid,
        file_name: &str,
        content_type: &str,
        data: &[u8],
        on_progress: Option<ProgressFn>,
    ) -> PortResult<StoredBlob>;

    /// Removes a blob. A blob that is already gone is not an error.
    async fn delete(&self, storage_path: &str) -> PortResult<()>;
}

//=========================================================================================
// Identity Provider Port
//=========================================================================================

/// Claims extracted from a verified bearer credential.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    /// The provider's subject id; joins to `User.external_auth_id`.
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies a bearer token and returns its claims, or
    /// `PortError::Unauthorized` for anything invalid or expired.
    async fn verify(&self, token: &str) -> PortResult<AuthClaims>;
}

//=========================================================================================
// Analysis Engine Port
//=========================================================================================

/// The seam behind which an analysis pipeline lives. No concrete model or
/// algorithm is assumed; the service runs whatever engine it is wired with.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(&self, document: &Document) -> PortResult<NewAnalysis>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_does_not_leak_ownership() {
        // The display string must be identical whether a row is absent or
        // owned by someone else, so callers cannot distinguish the cases.
        assert_eq!(PortError::NotFound.to_string(), "Not found");
    }

    #[test]
    fn upload_progress_percent() {
        let half = UploadProgress {
            bytes_sent: 1_000_000,
            total_bytes: 2_000_000,
        };
        assert!((half.percent() - 50.0).abs() < f64::EPSILON);

        let empty = UploadProgress {
            bytes_sent: 0,
            total_bytes: 0,
        };
        assert!((empty.percent() - 100.0).abs() < f64::EPSILON);
    }
}
