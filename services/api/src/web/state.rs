//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use medintake_core::ports::{AnalysisEngine, BlobStorage, DocumentStore, TokenVerifier};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all
/// handlers. Every collaborator sits behind its port trait so the web layer
/// never touches sqlx, the filesystem, or the token library directly.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// The analysis pipeline seam. No engine ships with the service yet;
    /// when unset, analyze requests are answered with 503.
    pub engine: Option<Arc<dyn AnalysisEngine>>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown so detached analysis tasks can stop cleanly.
    pub shutdown: CancellationToken,
}

/// The locally resolved identity of the authenticated caller, injected into
/// request extensions by the auth middleware. Handlers scope every
/// repository call with this id.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);
