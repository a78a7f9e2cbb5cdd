pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pipeline;

pub use domain::chat::{ChatMessage, ChatRole};
pub use domain::evidence::{dedup_evidence, EvidenceItem};
pub use domain::profile::{
    CargoCategory, CompanyProfile, ContactInfo, FleetVehicle, MonitoringPreferences,
    ProfileViolation, RoutePoint, TransportRoute, VehicleType,
};
pub use domain::report::{
    LegalChange, RecommendedAction, ReportContent, ReportSummary, RiskLevel, RouteImpact,
};
pub use domain::run::{
    Report, ReportId, ReportStatus, SearchMetadata, ValidationRecord, ValidationVerdict,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pipeline::{
    CompliancePipeline, PipelineContext, PipelineEngine, PipelineEvent, PipelineState,
};
