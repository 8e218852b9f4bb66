use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{info, warn};

use super::attendance::{AttendanceError, AttendanceSync, AttendanceTracker, SyncOutcome};
use super::domain::{
    ClasseId, LatenessEvent, LatenessId, LatenessUpdate, NewLateness, RequestContext, StudentId,
    UserRef,
};
use super::evaluation::{EvaluationOutcome, TriggerEvaluator};
use super::export::{build_export, ExportBatch, ExportError, ExportFeed, PartOfDay};
use super::notify::{
    lateness_subject, NotificationContext, NotificationError, NotificationSender,
    LATENESS_TEMPLATE,
};
use super::query::{rank_students, LatenessQuery, TopLatenessEntry};
use super::receipt::{Receipt, ReceiptPrinter};
use super::repository::{LatenessRepository, RepositoryError, SchoolDirectory};
use super::sanctions::{SanctionCaseBridge, SanctionError};
use super::settings::{LatenessSettings, SettingsRepository, SettingsStore, SettingsUpdate};
use super::triggers::{
    SanctionTrigger, TriggerDraft, TriggerId, TriggerRegistry, TriggerRegistryError,
    TriggerRepository,
};

/// External collaborators the lateness service talks to. Optional capabilities are
/// resolved once when the service is built.
#[derive(Clone)]
pub struct LatenessCollaborators {
    pub lateness: Arc<dyn LatenessRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub triggers: Arc<dyn TriggerRepository>,
    pub directory: Arc<dyn SchoolDirectory>,
    pub cases: Arc<dyn SanctionCaseBridge>,
    pub notifier: Arc<dyn NotificationSender>,
    pub printer: Arc<dyn ReceiptPrinter>,
    pub attendance: Option<Arc<dyn AttendanceTracker>>,
    pub export: Option<Arc<dyn ExportFeed>>,
}

/// Records lateness, counts it, runs the sanction triggers and fans out side effects.
pub struct LatenessService {
    lateness: Arc<dyn LatenessRepository>,
    directory: Arc<dyn SchoolDirectory>,
    settings: SettingsStore,
    registry: TriggerRegistry,
    evaluator: TriggerEvaluator,
    notifier: Arc<dyn NotificationSender>,
    printer: Arc<dyn ReceiptPrinter>,
    attendance: AttendanceSync,
    export: Option<Arc<dyn ExportFeed>>,
}

static LATENESS_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_lateness_id() -> LatenessId {
    LatenessId(LATENESS_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Result of recording a lateness, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedLateness {
    pub lateness: LatenessEvent,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationOutcome>,
    pub printed: bool,
    pub notified: bool,
    pub attendance: SyncOutcome,
}

impl LatenessService {
    pub fn new(collaborators: LatenessCollaborators) -> Self {
        let LatenessCollaborators {
            lateness,
            settings,
            triggers,
            directory,
            cases,
            notifier,
            printer,
            attendance,
            export,
        } = collaborators;

        Self {
            lateness,
            settings: SettingsStore::new(settings, directory.clone()),
            directory,
            registry: TriggerRegistry::new(triggers),
            evaluator: TriggerEvaluator::new(cases),
            notifier,
            printer,
            attendance: AttendanceSync::new(attendance),
            export,
        }
    }

    /// Record a new lateness and run every side effect tied to it.
    pub fn record(
        &self,
        new: NewLateness,
        ctx: &RequestContext,
    ) -> Result<RecordedLateness, LatenessServiceError> {
        let student = self
            .directory
            .student(new.matricule)?
            .ok_or(LatenessServiceError::UnknownStudent(new.matricule))?;

        let event = LatenessEvent::new(next_lateness_id(), student, new.justified, ctx.now);
        let mut event = self.lateness.insert(event)?;

        let settings = self.settings.current()?;
        let count = self
            .lateness
            .count_unjustified_since(event.student.matricule, settings.date_count_start)?;
        info!(
            lateness = %event.id,
            student = %event.student.matricule,
            justified = event.justified,
            count,
            "recorded lateness"
        );

        let printed = self.print_receipt(&settings, &event, count, ctx);

        let evaluation = if event.justified {
            None
        } else {
            let outcome = self.evaluate(&mut event, count, &ctx.user, ctx.now)?;
            self.lateness.update(&event)?;
            Some(outcome)
        };

        let notified = if settings.notify_responsible {
            self.notify(&event, count)?
        } else {
            false
        };

        let attendance = self.attendance.sync(&event, &ctx.user)?;

        Ok(RecordedLateness {
            lateness: event,
            count,
            evaluation,
            printed,
            notified,
            attendance,
        })
    }

    /// Apply a correction. Justifying retracts any open case; reverting a
    /// justification re-runs the triggers.
    pub fn update(
        &self,
        id: LatenessId,
        update: LatenessUpdate,
        ctx: &RequestContext,
    ) -> Result<LatenessEvent, LatenessServiceError> {
        let mut event = self.fetch(id)?;
        let was_justified = event.justified;

        if let Some(justified) = update.justified {
            event.justified = justified;
        }
        event.touch(ctx.now);

        if event.justified {
            self.evaluator.retract(&mut event)?;
        } else if was_justified {
            let settings = self.settings.current()?;
            self.lateness.update(&event)?;
            let count = self
                .lateness
                .count_unjustified_since(event.student.matricule, settings.date_count_start)?;
            self.evaluate(&mut event, count, &ctx.user, ctx.now)?;
        }

        self.lateness.update(&event)?;
        self.attendance.sync(&event, &ctx.user)?;
        Ok(event)
    }

    /// Delete a lateness, retracting its sanction case and attendance record first.
    pub fn delete(&self, id: LatenessId) -> Result<(), LatenessServiceError> {
        let mut event = self.fetch(id)?;
        if self.evaluator.retract(&mut event)? {
            self.lateness.update(&event)?;
        }
        self.attendance.remove(&event)?;
        self.lateness.delete(id)?;
        info!(lateness = %id, "deleted lateness");
        Ok(())
    }

    pub fn get(&self, id: LatenessId) -> Result<LatenessEvent, LatenessServiceError> {
        self.fetch(id)
    }

    pub fn list(&self, query: &LatenessQuery) -> Result<Vec<LatenessEvent>, LatenessServiceError> {
        let settings = self.settings.current()?;
        let counts = self
            .lateness
            .unjustified_counts_since(settings.date_count_start)?;
        Ok(query.apply(self.lateness.list()?, settings.date_count_start, &counts))
    }

    /// Students with the most counted lateness, optionally limited to some classes.
    pub fn top(
        &self,
        limit: usize,
        classes: Option<&BTreeSet<ClasseId>>,
    ) -> Result<Vec<TopLatenessEntry>, LatenessServiceError> {
        let settings = self.settings.current()?;
        let counts = self
            .lateness
            .unjustified_counts_since(settings.date_count_start)?;
        let events = self.lateness.list()?;
        Ok(rank_students(&events, &counts, classes, limit))
    }

    /// Build today's export and hand it to the export feed.
    pub fn export(
        &self,
        part: PartOfDay,
        now: NaiveDateTime,
    ) -> Result<ExportBatch, LatenessServiceError> {
        let feed = self.export.as_ref().ok_or(ExportError::NotConfigured)?;
        let batch = build_export(&self.lateness.list()?, now, part);
        feed.publish(&batch)?;
        info!(
            file = %batch.file_name,
            students = batch.students.len(),
            "published lateness export"
        );
        Ok(batch)
    }

    /// Build today's export without publishing it.
    pub fn preview_export(
        &self,
        part: PartOfDay,
        now: NaiveDateTime,
    ) -> Result<ExportBatch, LatenessServiceError> {
        Ok(build_export(&self.lateness.list()?, now, part))
    }

    pub fn settings(&self) -> Result<LatenessSettings, LatenessServiceError> {
        Ok(self.settings.current()?)
    }

    pub fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<LatenessSettings, LatenessServiceError> {
        Ok(self.settings.update(update)?)
    }

    pub fn register_trigger(
        &self,
        draft: TriggerDraft,
    ) -> Result<SanctionTrigger, LatenessServiceError> {
        Ok(self.registry.register(draft)?)
    }

    pub fn triggers(&self) -> Result<Vec<SanctionTrigger>, LatenessServiceError> {
        Ok(self.registry.list()?)
    }

    pub fn remove_trigger(&self, id: TriggerId) -> Result<(), LatenessServiceError> {
        Ok(self.registry.remove(id)?)
    }

    fn fetch(&self, id: LatenessId) -> Result<LatenessEvent, LatenessServiceError> {
        self.lateness
            .fetch(id)?
            .ok_or(LatenessServiceError::NotFound(id))
    }

    fn evaluate(
        &self,
        event: &mut LatenessEvent,
        count: u32,
        requester: &UserRef,
        now: NaiveDateTime,
    ) -> Result<EvaluationOutcome, LatenessServiceError> {
        let triggers = self.registry.list()?;
        let visibility = self.directory.groups()?;
        Ok(self
            .evaluator
            .evaluate(event, count, &triggers, &visibility, requester, now)?)
    }

    fn print_receipt(
        &self,
        settings: &LatenessSettings,
        event: &LatenessEvent,
        count: u32,
        ctx: &RequestContext,
    ) -> bool {
        let Some(request) = &ctx.print else {
            return false;
        };
        let Some(address) = settings.printer_for(request.printer.as_deref()) else {
            return false;
        };

        let receipt = Receipt::for_lateness(event, count);
        match self.printer.print_receipt(&address, &receipt) {
            Ok(()) => true,
            Err(err) => {
                warn!(lateness = %event.id, %address, error = %err, "receipt printing failed");
                false
            }
        }
    }

    fn notify(&self, event: &LatenessEvent, count: u32) -> Result<bool, LatenessServiceError> {
        let recipients = self
            .directory
            .responsibles(event.student.teaching, event.student.classe.year)?;
        if recipients.is_empty() {
            return Ok(false);
        }

        let context = NotificationContext {
            template: LATENESS_TEMPLATE,
            lateness: event.clone(),
            lateness_count: count,
        };
        self.notifier
            .send(&recipients, &lateness_subject(event), &context)?;
        Ok(true)
    }
}

/// Error raised by the lateness service.
#[derive(Debug, thiserror::Error)]
pub enum LatenessServiceError {
    #[error("unknown student {0}")]
    UnknownStudent(StudentId),
    #[error("lateness {0} not found")]
    NotFound(LatenessId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Trigger(#[from] TriggerRegistryError),
    #[error(transparent)]
    Sanction(#[from] SanctionError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Export(#[from] ExportError),
}
