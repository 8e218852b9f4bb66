//! Lateness recording, sanction triggers and the side effects tied to them.
//!
//! A recorded lateness is counted against the configured start date, run through the
//! trigger registry, and may open a disciplinary case in the case-management module.
//! Justifying or deleting the lateness retracts that case and the matching attendance
//! record.

pub mod attendance;
pub mod domain;
pub mod evaluation;
pub mod export;
pub mod notify;
pub mod query;
pub mod receipt;
pub mod repository;
pub mod router;
pub mod sanctions;
pub mod service;
pub mod settings;
pub mod triggers;

#[cfg(test)]
mod tests;

pub use attendance::{
    AttendanceError, AttendanceRecord, AttendanceStatus, AttendanceSync, AttendanceTracker,
    Period, PeriodId, SyncOutcome,
};
pub use domain::{
    Classe, ClasseId, GroupId, LatenessEvent, LatenessId, LatenessUpdate, NewLateness,
    PrintRequest, RequestContext, Student, StudentId, TeachingId, UserRef,
};
pub use evaluation::{
    sanction_datetime, EvaluationOutcome, FiredTrigger, TriggerAction, TriggerEvaluator,
};
pub use export::{build_export, ExportBatch, ExportError, ExportFeed, PartOfDay};
pub use notify::{lateness_subject, NotificationContext, NotificationError, NotificationSender, Recipient};
pub use query::{LatenessQuery, TopLatenessEntry, DEFAULT_TOP_LIMIT};
pub use receipt::{PrinterError, Receipt, ReceiptPrinter};
pub use repository::{LatenessRepository, RepositoryError, SchoolDirectory};
pub use router::lateness_router;
pub use sanctions::{CaseId, NewSanctionCase, SanctionCaseBridge, SanctionDefinitionId, SanctionError};
pub use service::{LatenessCollaborators, LatenessService, LatenessServiceError, RecordedLateness};
pub use settings::{LatenessSettings, SettingsRepository, SettingsStore, SettingsUpdate};
pub use triggers::{
    SanctionDay, SanctionSchedule, SanctionTrigger, TimeWindow, TriggerConfigError, TriggerDraft,
    TriggerId, TriggerRegistry, TriggerRegistryError, TriggerRepository,
};
