pub mod domain;
pub mod pagination;
pub mod ports;

pub use domain::{
    Analysis, AnalysisStatus, Document, DocumentStatus, HealthCard, Insights, NewAnalysis,
    NewDocument, OverallStatus, TimelineEvent, TimelineEventType, User, UserProfile, Vital,
    VitalStatus,
};
pub use pagination::{DocumentPage, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use ports::{
    AnalysisEngine, AuthClaims, BlobStorage, DocumentStore, PortError, PortResult, ProgressFn,
    StoredBlob, TokenVerifier, UploadProgress,
};
