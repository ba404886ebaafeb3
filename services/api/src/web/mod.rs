pub mod analyze_task;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::{
    analyze_document_handler, get_analysis_handler, get_document_handler, health_handler,
    list_analyses_handler, list_documents_handler, upload_document_handler,
};
