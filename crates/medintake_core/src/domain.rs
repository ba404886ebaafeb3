//! crates/medintake_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database; the JSON-shaped
//! value types (insights, health card, timeline) derive serde because
//! they are persisted as JSON documents and returned verbatim over the
//! API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated principal, keyed locally by `id` and joined to the
/// external identity provider by `external_auth_id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub external_auth_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields supplied by the identity provider on each sign-in.
/// `find_or_create_user` refreshes the stored row with these values.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// One uploaded file and its processing state. `analyses` is eagerly
/// attached by the repository on reads, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_file_name: String,
    pub storage_path: String,
    pub storage_url: Option<String>,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analyses: Vec<Analysis>,
}

/// Fields required to register a freshly uploaded blob as a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub original_file_name: String,
    pub storage_path: String,
    pub storage_url: Option<String>,
    pub file_size_bytes: i64,
    pub mime_type: String,
}

/// State of an analysis row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(AnalysisStatus::Processing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// Key findings, concerns and recommendations extracted from a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub key_findings: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Good,
    Fair,
    Concerning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VitalStatus {
    Normal,
    Abnormal,
    Borderline,
}

/// One measured vital sign from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vital {
    pub name: String,
    pub value: String,
    pub status: VitalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
}

/// Condensed health summary rendered as a card in the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCard {
    pub overall_status: OverallStatus,
    pub vitals: Vec<Vital>,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineEventType {
    Test,
    Diagnosis,
    Treatment,
    Medication,
    Other,
}

/// One dated event on a document's medical timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub date: String,
    pub event: String,
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// One AI-generated assessment of a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: Uuid,
    pub document_id: Uuid,
    pub summary: String,
    pub insights: Insights,
    pub health_card: HealthCard,
    pub timeline: Vec<TimelineEvent>,
    pub suggested_questions: Vec<String>,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
    pub processing_time_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The payload an analysis engine produces; persisted as a completed
/// Analysis row.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub summary: String,
    pub insights: Insights,
    pub health_card: HealthCard,
    pub timeline: Vec<TimelineEvent>,
    pub suggested_questions: Vec<String>,
    pub processing_time_seconds: Option<i32>,
}
