//! services/api/src/web/analyze_task.rs
//!
//! Runs an analysis engine against a document as a detached task and
//! persists the outcome. The document is assumed to already be in
//! `Processing` status; this task moves it to a terminal state.
//!
//! The task runs past the end of the originating request, so it carries the
//! service-wide cancellation token: on shutdown the document is marked
//! failed instead of being stranded in `Processing`.

use std::sync::Arc;
use std::time::Instant;

use medintake_core::domain::{Document, DocumentStatus};
use medintake_core::ports::{AnalysisEngine, DocumentStore, PortError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub fn spawn_analysis(
    repo: Arc<dyn DocumentStore>,
    engine: Arc<dyn AnalysisEngine>,
    document: Document,
    owner_id: Uuid,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_analysis(repo, engine, document, owner_id, shutdown))
}

pub async fn run_analysis(
    repo: Arc<dyn DocumentStore>,
    engine: Arc<dyn AnalysisEngine>,
    document: Document,
    owner_id: Uuid,
    shutdown: CancellationToken,
) {
    let document_id = document.id;
    let started = Instant::now();

    let outcome = tokio::select! {
        // Shutdown wins when both are ready.
        biased;
        _ = shutdown.cancelled() => {
            Err(PortError::Unavailable(
                "service shut down before analysis completed".to_string(),
            ))
        }
        result = engine.analyze(&document) => result,
    };

    let failure = match outcome {
        Ok(mut new_analysis) => {
            if new_analysis.processing_time_seconds.is_none() {
                new_analysis.processing_time_seconds = Some(started.elapsed().as_secs() as i32);
            }
            match repo.create_analysis(document_id, new_analysis).await {
                Ok(analysis) => {
                    info!(
                        document_id = %document_id,
                        analysis_id = %analysis.id,
                        "analysis completed"
                    );
                    None
                }
                Err(e) => Some(format!("failed to persist analysis: {}", e)),
            }
        }
        Err(e) => Some(e.to_string()),
    };

    let (status, message) = match &failure {
        None => (DocumentStatus::Completed, None),
        Some(msg) => {
            warn!(document_id = %document_id, "analysis failed: {}", msg);
            (DocumentStatus::Failed, Some(msg.as_str()))
        }
    };

    match repo
        .update_document_status(document_id, owner_id, status, message, None)
        .await
    {
        Ok(0) => warn!(
            document_id = %document_id,
            "document disappeared before its analysis outcome was recorded"
        ),
        Ok(_) => {}
        Err(e) => warn!(
            document_id = %document_id,
            "failed to record analysis outcome: {}", e
        ),
    }
}
