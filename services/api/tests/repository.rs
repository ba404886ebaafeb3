//! Integration tests for the Postgres repository adapter.
//!
//! These run against a real PostgreSQL server and are `#[ignore]`d so the
//! default suite stays hermetic. To run them:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/medintake_test cargo test -p api -- --ignored
//! ```
//!
//! Each test creates its own users (unique external ids), so the tests are
//! independent and can share one database.

use api_lib::adapters::db::PgRepository;
use medintake_core::domain::{
    AnalysisStatus, DocumentStatus, HealthCard, Insights, NewAnalysis, NewDocument,
    OverallStatus, TimelineEvent, TimelineEventType, UserProfile, Vital, VitalStatus,
};
use medintake_core::pagination::PageRequest;
use medintake_core::ports::{DocumentStore, PortError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

async fn connect() -> (PgRepository, PgPool) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .expect("failed to connect to the test database");
    let repo = PgRepository::new(pool.clone());
    repo.run_migrations().await.expect("migrations failed");
    (repo, pool)
}

fn profile(email: &str) -> UserProfile {
    UserProfile {
        email: email.to_string(),
        display_name: Some("Test User".to_string()),
        avatar_url: None,
    }
}

fn pdf_document(name: &str) -> NewDocument {
    NewDocument {
        original_file_name: name.to_string(),
        storage_path: format!("test/{}/{}", Uuid::new_v4(), name),
        storage_url: None,
        file_size_bytes: 2_000_000,
        mime_type: "application/pdf".to_string(),
    }
}

fn sample_analysis() -> NewAnalysis {
    NewAnalysis {
        summary: "Routine bloodwork, one flagged value.".to_string(),
        insights: Insights {
            key_findings: vec!["Elevated LDL".to_string()],
            concerns: vec![],
            recommendations: vec!["Repeat lipid panel in 3 months".to_string()],
        },
        health_card: HealthCard {
            overall_status: OverallStatus::Fair,
            vitals: vec![Vital {
                name: "LDL".to_string(),
                value: "162 mg/dL".to_string(),
                status: VitalStatus::Abnormal,
                reference_range: Some("< 130 mg/dL".to_string()),
            }],
            conditions: vec![],
            medications: vec![],
        },
        timeline: vec![TimelineEvent {
            date: "2024-03-01".to_string(),
            event: "Lipid panel drawn".to_string(),
            event_type: TimelineEventType::Test,
            details: None,
        }],
        suggested_questions: vec!["Should I start a statin?".to_string()],
        processing_time_seconds: Some(9),
    }
}

async fn new_user(repo: &PgRepository) -> Uuid {
    let subject = format!("it-{}", Uuid::new_v4());
    repo.find_or_create_user(&subject, profile("it@example.com"))
        .await
        .expect("user upsert failed")
        .id
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn find_or_create_user_is_idempotent_and_refreshes_profile() {
    let (repo, pool) = connect().await;
    let subject = format!("it-{}", Uuid::new_v4());

    let first = repo
        .find_or_create_user(&subject, profile("old@example.com"))
        .await
        .unwrap();
    let second = repo
        .find_or_create_user(&subject, profile("new@example.com"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.email, "new@example.com");

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE external_auth_id = $1")
            .bind(&subject)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn cross_owner_document_access_is_not_found() {
    let (repo, _pool) = connect().await;
    let owner_a = new_user(&repo).await;
    let owner_b = new_user(&repo).await;

    let doc_of_b = repo
        .create_document(owner_b, pdf_document("b-report.pdf"))
        .await
        .unwrap();

    // Owner A probing B's document must see plain not-found, exactly what a
    // nonexistent id yields.
    let err = repo.get_document(doc_of_b.id, owner_a).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound));

    let err = repo.get_document(Uuid::new_v4(), owner_a).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn dangling_owner_is_a_validation_error_and_writes_nothing() {
    let (repo, pool) = connect().await;
    let ghost_owner = Uuid::new_v4();
    let new_doc = pdf_document("ghost.pdf");
    let marker = new_doc.storage_path.clone();

    let err = repo.create_document(ghost_owner, new_doc).await.unwrap_err();
    assert!(matches!(err, PortError::Validation(_)));

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM documents WHERE storage_path = $1")
            .bind(&marker)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn pagination_reports_has_more_correctly() {
    let (repo, _pool) = connect().await;
    let owner = new_user(&repo).await;

    for i in 0..5 {
        repo.create_document(owner, pdf_document(&format!("report-{}.pdf", i)))
            .await
            .unwrap();
        // Distinct created_at values keep the DESC ordering unambiguous.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let first_page = repo
        .list_documents_by_owner(owner, PageRequest::new(2, 0))
        .await
        .unwrap();
    assert_eq!(first_page.documents.len(), 2);
    assert!(first_page.has_more);
    assert_eq!(
        first_page.documents[0].original_file_name,
        "report-4.pdf",
        "newest first"
    );

    let last_page = repo
        .list_documents_by_owner(owner, PageRequest::new(2, 4))
        .await
        .unwrap();
    assert_eq!(last_page.documents.len(), 1);
    assert!(!last_page.has_more);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn deleting_a_user_cascades_to_documents_and_analyses() {
    let (repo, pool) = connect().await;
    let owner = new_user(&repo).await;

    let doc = repo
        .create_document(owner, pdf_document("cascade.pdf"))
        .await
        .unwrap();
    repo.create_analysis(doc.id, sample_analysis()).await.unwrap();
    repo.create_analysis(doc.id, sample_analysis()).await.unwrap();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(owner)
        .execute(&pool)
        .await
        .unwrap();

    let (docs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE owner_id = $1")
        .bind(owner)
        .fetch_one(&pool)
        .await
        .unwrap();
    let (analyses,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM analyses WHERE document_id = $1")
            .bind(doc.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(docs, 0);
    assert_eq!(analyses, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn unauthorized_analysis_update_is_a_silent_noop() {
    let (repo, _pool) = connect().await;
    let owner = new_user(&repo).await;
    let intruder = new_user(&repo).await;

    let doc = repo
        .create_document(owner, pdf_document("private.pdf"))
        .await
        .unwrap();
    let analysis = repo.create_analysis(doc.id, sample_analysis()).await.unwrap();

    let affected = repo
        .update_analysis_status(
            analysis.id,
            intruder,
            AnalysisStatus::Failed,
            Some("forged failure"),
        )
        .await
        .unwrap();
    assert_eq!(affected, 0);

    // Re-fetching with the real owner shows the row untouched.
    let unchanged = repo.get_analysis(analysis.id, owner).await.unwrap();
    assert_eq!(unchanged.status, AnalysisStatus::Completed);
    assert!(unchanged.error_message.is_none());

    // The intruder cannot even see the row.
    let err = repo.get_analysis(analysis.id, intruder).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn upload_lifecycle_lands_in_the_listing() {
    let (repo, _pool) = connect().await;
    let owner = new_user(&repo).await;

    let doc = repo
        .create_document(owner, pdf_document("report.pdf"))
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Uploaded);
    assert_eq!(doc.file_size_bytes, 2_000_000);

    let affected = repo
        .update_document_status(
            doc.id,
            owner,
            DocumentStatus::Completed,
            None,
            Some("Hemoglobin 13.8 g/dL ..."),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let page = repo
        .list_documents_by_owner(owner, PageRequest::new(20, 0))
        .await
        .unwrap();
    assert_eq!(page.documents.len(), 1);
    let listed = &page.documents[0];
    assert_eq!(listed.status, DocumentStatus::Completed);
    assert_eq!(
        listed.extracted_text.as_deref(),
        Some("Hemoglobin 13.8 g/dL ...")
    );
    assert!(!page.has_more);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn listings_attach_analyses_newest_first() {
    let (repo, _pool) = connect().await;
    let owner = new_user(&repo).await;

    let doc = repo
        .create_document(owner, pdf_document("labs.pdf"))
        .await
        .unwrap();
    let first = repo.create_analysis(doc.id, sample_analysis()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = repo.create_analysis(doc.id, sample_analysis()).await.unwrap();

    let fetched = repo.get_document(doc.id, owner).await.unwrap();
    assert_eq!(fetched.analyses.len(), 2);
    assert_eq!(fetched.analyses[0].id, second.id);
    assert_eq!(fetched.analyses[1].id, first.id);

    let all = repo
        .list_analyses_by_owner(owner, PageRequest::new(10, 0))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server via DATABASE_URL"]
async fn health_check_is_true_against_a_live_store() {
    let (repo, _pool) = connect().await;
    assert!(repo.health_check().await);
}
