use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::workflows::lateness::attendance::{
    AttendanceError, AttendanceRecord, AttendanceStatus, AttendanceTracker, Period, PeriodId,
};
use crate::workflows::lateness::domain::{
    Classe, ClasseId, GroupId, LatenessEvent, LatenessId, RequestContext, Student, StudentId,
    TeachingId, UserRef,
};
use crate::workflows::lateness::export::{ExportBatch, ExportError, ExportFeed};
use crate::workflows::lateness::notify::{
    NotificationContext, NotificationError, NotificationSender, Recipient,
};
use crate::workflows::lateness::receipt::{PrinterError, Receipt, ReceiptPrinter};
use crate::workflows::lateness::repository::{
    LatenessRepository, RepositoryError, SchoolDirectory,
};
use crate::workflows::lateness::sanctions::{
    CaseId, NewSanctionCase, SanctionCaseBridge, SanctionDefinitionId, SanctionError,
};
use crate::workflows::lateness::settings::{LatenessSettings, SettingsRepository};
use crate::workflows::lateness::triggers::{
    SanctionDay, SanctionSchedule, SanctionTrigger, TriggerDraft, TriggerId, TriggerRepository,
};
use crate::workflows::lateness::{LatenessCollaborators, LatenessService};

/// 2024-09-02 is a Monday.
pub(super) fn school_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).expect("valid date")
}

pub(super) fn at(hour: u32, minute: u32) -> NaiveDateTime {
    school_day()
        .and_hms_opt(hour, minute, 0)
        .expect("valid time")
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

pub(super) fn student() -> Student {
    Student {
        matricule: StudentId(1001),
        first_name: "Zoé".to_string(),
        last_name: "Lemaître".to_string(),
        teaching: TeachingId(1),
        classe: Classe {
            id: ClasseId(31),
            year: 3,
            letter: "B".to_string(),
        },
    }
}

pub(super) fn other_student() -> Student {
    Student {
        matricule: StudentId(2002),
        first_name: "Hugo".to_string(),
        last_name: "Martin".to_string(),
        teaching: TeachingId(1),
        classe: Classe {
            id: ClasseId(52),
            year: 5,
            letter: "A".to_string(),
        },
    }
}

pub(super) fn educator() -> UserRef {
    UserRef {
        username: "jdoe".to_string(),
        full_name: "Jane Doe".to_string(),
    }
}

pub(super) fn ctx(now: NaiveDateTime) -> RequestContext {
    RequestContext::new(educator(), now)
}

pub(super) fn sanction_draft(first: u16, repeat: u16) -> TriggerDraft {
    TriggerDraft {
        teaching: TeachingId(1),
        years: BTreeSet::from([3]),
        classes: BTreeSet::new(),
        window_start: None,
        window_stop: None,
        first_threshold: first,
        repeat_interval: repeat,
        only_warn: false,
        sanction: Some(SanctionDefinitionId(7)),
        schedule: SanctionSchedule {
            day: SanctionDay::Weekday(Weekday::Wed),
            delay_days: Some(1),
            time: Some(time(12, 45)),
        },
    }
}

pub(super) fn trigger(id: u32, first: u16, repeat: u16) -> SanctionTrigger {
    sanction_draft(first, repeat)
        .validate(TriggerId(id))
        .expect("valid trigger")
}

pub(super) fn lateness(id: u64, student: Student, at: NaiveDateTime) -> LatenessEvent {
    LatenessEvent::new(LatenessId(id), student, false, at)
}

pub(super) fn settings_from(date_count_start: NaiveDate) -> LatenessSettings {
    LatenessSettings {
        date_count_start,
        ..LatenessSettings::default()
    }
}

#[derive(Default)]
pub(super) struct MemoryLateness {
    pub(super) events: Mutex<BTreeMap<LatenessId, LatenessEvent>>,
}

impl MemoryLateness {
    pub(super) fn seed(&self, event: LatenessEvent) {
        self.events
            .lock()
            .expect("lateness mutex poisoned")
            .insert(event.id, event);
    }

    pub(super) fn stored(&self, id: LatenessId) -> Option<LatenessEvent> {
        self.events
            .lock()
            .expect("lateness mutex poisoned")
            .get(&id)
            .cloned()
    }
}

impl LatenessRepository for MemoryLateness {
    fn insert(&self, event: LatenessEvent) -> Result<LatenessEvent, RepositoryError> {
        let mut guard = self.events.lock().expect("lateness mutex poisoned");
        if guard.contains_key(&event.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(event.id, event.clone());
        Ok(event)
    }

    fn update(&self, event: &LatenessEvent) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("lateness mutex poisoned");
        match guard.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: LatenessId) -> Result<Option<LatenessEvent>, RepositoryError> {
        Ok(self.stored(id))
    }

    fn delete(&self, id: LatenessId) -> Result<(), RepositoryError> {
        self.events
            .lock()
            .expect("lateness mutex poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self) -> Result<Vec<LatenessEvent>, RepositoryError> {
        Ok(self
            .events
            .lock()
            .expect("lateness mutex poisoned")
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemorySettings {
    pub(super) current: Mutex<Option<LatenessSettings>>,
    pub(super) saves: Mutex<u32>,
}

impl MemorySettings {
    pub(super) fn with(settings: LatenessSettings) -> Self {
        Self {
            current: Mutex::new(Some(settings)),
            saves: Mutex::new(0),
        }
    }

    pub(super) fn saves(&self) -> u32 {
        *self.saves.lock().expect("settings mutex poisoned")
    }
}

impl SettingsRepository for MemorySettings {
    fn load(&self) -> Result<Option<LatenessSettings>, RepositoryError> {
        Ok(self.current.lock().expect("settings mutex poisoned").clone())
    }

    fn save(&self, settings: &LatenessSettings) -> Result<(), RepositoryError> {
        *self.current.lock().expect("settings mutex poisoned") = Some(settings.clone());
        *self.saves.lock().expect("settings mutex poisoned") += 1;
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryTriggers {
    pub(super) triggers: Mutex<Vec<SanctionTrigger>>,
}

impl MemoryTriggers {
    pub(super) fn with(triggers: Vec<SanctionTrigger>) -> Self {
        Self {
            triggers: Mutex::new(triggers),
        }
    }
}

impl TriggerRepository for MemoryTriggers {
    fn next_id(&self) -> Result<TriggerId, RepositoryError> {
        let guard = self.triggers.lock().expect("trigger mutex poisoned");
        let next = guard.iter().map(|trigger| trigger.id.0).max().unwrap_or(0) + 1;
        Ok(TriggerId(next))
    }

    fn insert(&self, trigger: SanctionTrigger) -> Result<SanctionTrigger, RepositoryError> {
        self.triggers
            .lock()
            .expect("trigger mutex poisoned")
            .push(trigger.clone());
        Ok(trigger)
    }

    fn list(&self) -> Result<Vec<SanctionTrigger>, RepositoryError> {
        Ok(self.triggers.lock().expect("trigger mutex poisoned").clone())
    }

    fn delete(&self, id: TriggerId) -> Result<(), RepositoryError> {
        let mut guard = self.triggers.lock().expect("trigger mutex poisoned");
        let before = guard.len();
        guard.retain(|trigger| trigger.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub(super) struct MemoryDirectory {
    pub(super) students: Vec<Student>,
    pub(super) teachings: Vec<TeachingId>,
    pub(super) groups: Vec<GroupId>,
    pub(super) responsibles: Vec<Recipient>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self {
            students: vec![student(), other_student()],
            teachings: vec![TeachingId(1)],
            groups: vec![GroupId("educators".to_string()), GroupId("direction".to_string())],
            responsibles: vec![Recipient {
                email: "educ3@school.test".to_string(),
                display: "Third-year educators".to_string(),
            }],
        }
    }
}

impl SchoolDirectory for MemoryDirectory {
    fn student(&self, matricule: StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self
            .students
            .iter()
            .find(|student| student.matricule == matricule)
            .cloned())
    }

    fn teachings(&self) -> Result<Vec<TeachingId>, RepositoryError> {
        Ok(self.teachings.clone())
    }

    fn groups(&self) -> Result<Vec<GroupId>, RepositoryError> {
        Ok(self.groups.clone())
    }

    fn responsibles(
        &self,
        _teaching: TeachingId,
        _year: u8,
    ) -> Result<Vec<Recipient>, RepositoryError> {
        Ok(self.responsibles.clone())
    }
}

#[derive(Default)]
pub(super) struct RecordingCases {
    pub(super) created: Mutex<Vec<NewSanctionCase>>,
    pub(super) open: Mutex<BTreeSet<CaseId>>,
    pub(super) deleted: Mutex<Vec<CaseId>>,
    pub(super) visibility: Mutex<Vec<(CaseId, Vec<GroupId>)>>,
    pub(super) sharing_down: AtomicBool,
}

impl RecordingCases {
    pub(super) fn created(&self) -> Vec<NewSanctionCase> {
        self.created.lock().expect("cases mutex poisoned").clone()
    }

    pub(super) fn deleted(&self) -> Vec<CaseId> {
        self.deleted.lock().expect("cases mutex poisoned").clone()
    }

    pub(super) fn open_cases(&self) -> BTreeSet<CaseId> {
        self.open.lock().expect("cases mutex poisoned").clone()
    }
}

impl SanctionCaseBridge for RecordingCases {
    fn create_case(&self, case: NewSanctionCase) -> Result<CaseId, SanctionError> {
        let mut created = self.created.lock().expect("cases mutex poisoned");
        created.push(case);
        let id = CaseId(500 + created.len() as u64);
        self.open.lock().expect("cases mutex poisoned").insert(id);
        Ok(id)
    }

    fn delete_case(&self, id: CaseId) -> Result<(), SanctionError> {
        self.deleted.lock().expect("cases mutex poisoned").push(id);
        if self.open.lock().expect("cases mutex poisoned").remove(&id) {
            Ok(())
        } else {
            Err(SanctionError::NotFound(id))
        }
    }

    fn set_visibility(&self, id: CaseId, groups: &[GroupId]) -> Result<(), SanctionError> {
        if self.sharing_down.load(Ordering::SeqCst) {
            return Err(SanctionError::Unavailable("sharing offline".to_string()));
        }
        self.visibility
            .lock()
            .expect("cases mutex poisoned")
            .push((id, groups.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) sent: Mutex<Vec<(Vec<Recipient>, String, u32)>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<(Vec<Recipient>, String, u32)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        self.sent.lock().expect("notifier mutex poisoned").push((
            recipients.to_vec(),
            subject.to_string(),
            context.lateness_count,
        ));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingPrinter {
    pub(super) printed: Mutex<Vec<(String, Receipt)>>,
    pub(super) fail: bool,
}

impl RecordingPrinter {
    pub(super) fn failing() -> Self {
        Self {
            printed: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(super) fn printed(&self) -> Vec<(String, Receipt)> {
        self.printed.lock().expect("printer mutex poisoned").clone()
    }
}

impl ReceiptPrinter for RecordingPrinter {
    fn print_receipt(&self, address: &str, receipt: &Receipt) -> Result<(), PrinterError> {
        if self.fail {
            return Err(PrinterError::Unreachable {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "no route to printer"),
            });
        }
        self.printed
            .lock()
            .expect("printer mutex poisoned")
            .push((address.to_string(), receipt.clone()));
        Ok(())
    }
}

pub(super) struct MemoryAttendance {
    pub(super) periods: Vec<Period>,
    pub(super) records: Mutex<Vec<AttendanceRecord>>,
    pub(super) deletions: Mutex<u32>,
}

impl Default for MemoryAttendance {
    fn default() -> Self {
        Self {
            periods: vec![
                Period {
                    id: PeriodId(1),
                    name: "P1".to_string(),
                    start: time(8, 0),
                    end: time(8, 50),
                },
                Period {
                    id: PeriodId(2),
                    name: "P2".to_string(),
                    start: time(8, 50),
                    end: time(9, 40),
                },
            ],
            records: Mutex::new(Vec::new()),
            deletions: Mutex::new(0),
        }
    }
}

impl MemoryAttendance {
    pub(super) fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().expect("attendance mutex poisoned").clone()
    }

    pub(super) fn deletions(&self) -> u32 {
        *self.deletions.lock().expect("attendance mutex poisoned")
    }
}

fn same_slot(record: &AttendanceRecord, other: &AttendanceRecord) -> bool {
    record.student == other.student
        && record.date == other.date
        && record.period == other.period
        && record.status == other.status
}

impl AttendanceTracker for MemoryAttendance {
    fn find_period(&self, time: NaiveTime) -> Result<Option<Period>, AttendanceError> {
        Ok(self
            .periods
            .iter()
            .find(|period| period.contains(time))
            .cloned())
    }

    fn find_record(
        &self,
        student: StudentId,
        date: NaiveDate,
        period: PeriodId,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceRecord>, AttendanceError> {
        Ok(self
            .records()
            .into_iter()
            .find(|record| {
                record.student == student
                    && record.date == date
                    && record.period == period
                    && record.status == status
            }))
    }

    fn create_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        self.records
            .lock()
            .expect("attendance mutex poisoned")
            .push(record);
        Ok(())
    }

    fn update_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        if let Some(existing) = guard.iter_mut().find(|existing| same_slot(existing, &record)) {
            *existing = record;
        }
        Ok(())
    }

    fn delete_record(&self, record: &AttendanceRecord) -> Result<(), AttendanceError> {
        self.records
            .lock()
            .expect("attendance mutex poisoned")
            .retain(|existing| !same_slot(existing, record));
        *self.deletions.lock().expect("attendance mutex poisoned") += 1;
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingExport {
    pub(super) published: Mutex<Vec<ExportBatch>>,
}

impl ExportFeed for RecordingExport {
    fn publish(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        self.published
            .lock()
            .expect("export mutex poisoned")
            .push(batch.clone());
        Ok(())
    }
}

/// Service wired to in-memory collaborators, with handles for assertions.
pub(super) struct Harness {
    pub(super) service: LatenessService,
    pub(super) lateness: Arc<MemoryLateness>,
    pub(super) settings: Arc<MemorySettings>,
    pub(super) triggers: Arc<MemoryTriggers>,
    pub(super) cases: Arc<RecordingCases>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) printer: Arc<RecordingPrinter>,
    pub(super) attendance: Arc<MemoryAttendance>,
    pub(super) export: Arc<RecordingExport>,
}

pub(super) struct HarnessBuilder {
    settings: LatenessSettings,
    triggers: Vec<SanctionTrigger>,
    printer: RecordingPrinter,
    attendance: bool,
    export: bool,
}

impl HarnessBuilder {
    pub(super) fn new() -> Self {
        Self {
            settings: settings_from(school_day() - Duration::days(7)),
            triggers: Vec::new(),
            printer: RecordingPrinter::default(),
            attendance: true,
            export: true,
        }
    }

    pub(super) fn settings(mut self, settings: LatenessSettings) -> Self {
        self.settings = settings;
        self
    }

    pub(super) fn trigger(mut self, trigger: SanctionTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub(super) fn printer(mut self, printer: RecordingPrinter) -> Self {
        self.printer = printer;
        self
    }

    pub(super) fn without_attendance(mut self) -> Self {
        self.attendance = false;
        self
    }

    pub(super) fn without_export(mut self) -> Self {
        self.export = false;
        self
    }

    pub(super) fn build(self) -> Harness {
        let lateness = Arc::new(MemoryLateness::default());
        let settings = Arc::new(MemorySettings::with(self.settings));
        let triggers = Arc::new(MemoryTriggers::with(self.triggers));
        let cases = Arc::new(RecordingCases::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let printer = Arc::new(self.printer);
        let attendance = Arc::new(MemoryAttendance::default());
        let export = Arc::new(RecordingExport::default());

        let service = LatenessService::new(LatenessCollaborators {
            lateness: lateness.clone(),
            settings: settings.clone(),
            triggers: triggers.clone(),
            directory: Arc::new(MemoryDirectory::default()),
            cases: cases.clone(),
            notifier: notifier.clone(),
            printer: printer.clone(),
            attendance: if self.attendance {
                Some(attendance.clone() as Arc<dyn AttendanceTracker>)
            } else {
                None
            },
            export: if self.export {
                Some(export.clone() as Arc<dyn ExportFeed>)
            } else {
                None
            },
        });

        Harness {
            service,
            lateness,
            settings,
            triggers,
            cases,
            notifier,
            printer,
            attendance,
            export,
        }
    }
}
