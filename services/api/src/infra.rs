use chrono::{NaiveDate, NaiveTime};
use lateness::config::IntegrationConfig;
use lateness::workflows::lateness::{
    AttendanceError, AttendanceRecord, AttendanceStatus, AttendanceTracker, CaseId, Classe,
    ClasseId, ExportBatch, ExportError, ExportFeed, GroupId, LatenessCollaborators, LatenessEvent,
    LatenessId, LatenessRepository, LatenessSettings, NewSanctionCase, NotificationContext,
    NotificationError, NotificationSender, Period, PeriodId, PrinterError, Receipt,
    ReceiptPrinter, Recipient, RepositoryError, SanctionCaseBridge, SanctionError,
    SanctionTrigger, SchoolDirectory, SettingsRepository, Student, StudentId, TeachingId,
    TriggerId, TriggerRepository,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryLatenessRepository {
    events: Arc<Mutex<HashMap<LatenessId, LatenessEvent>>>,
}

impl LatenessRepository for InMemoryLatenessRepository {
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
        let guard = self.events.lock().expect("lateness mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn delete(&self, id: LatenessId) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("lateness mutex poisoned");
        guard
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn list(&self) -> Result<Vec<LatenessEvent>, RepositoryError> {
        let guard = self.events.lock().expect("lateness mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySettingsRepository {
    settings: Arc<Mutex<Option<LatenessSettings>>>,
}

impl SettingsRepository for InMemorySettingsRepository {
    fn load(&self) -> Result<Option<LatenessSettings>, RepositoryError> {
        Ok(self.settings.lock().expect("settings mutex poisoned").clone())
    }

    fn save(&self, settings: &LatenessSettings) -> Result<(), RepositoryError> {
        *self.settings.lock().expect("settings mutex poisoned") = Some(settings.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryTriggerRepository {
    triggers: Arc<Mutex<Vec<SanctionTrigger>>>,
    sequence: Arc<AtomicU64>,
}

impl TriggerRepository for InMemoryTriggerRepository {
    fn next_id(&self) -> Result<TriggerId, RepositoryError> {
        let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        u32::try_from(next)
            .map(TriggerId)
            .map_err(|_| RepositoryError::Unavailable("trigger ids exhausted".to_string()))
    }

    fn insert(&self, trigger: SanctionTrigger) -> Result<SanctionTrigger, RepositoryError> {
        let mut guard = self.triggers.lock().expect("trigger mutex poisoned");
        if guard.iter().any(|existing| existing.id == trigger.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(trigger.clone());
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

/// Small fixed school used by the local server and the demo.
#[derive(Clone)]
pub(crate) struct SeededDirectory {
    students: Arc<Vec<Student>>,
}

impl Default for SeededDirectory {
    fn default() -> Self {
        let student = |matricule: u32, first: &str, last: &str, class: (u32, u8, &str)| Student {
            matricule: StudentId(matricule),
            first_name: first.to_string(),
            last_name: last.to_string(),
            teaching: TeachingId(1),
            classe: Classe {
                id: ClasseId(class.0),
                year: class.1,
                letter: class.2.to_string(),
            },
        };

        Self {
            students: Arc::new(vec![
                student(1001, "Zoé", "Lemaître", (31, 3, "B")),
                student(1002, "Hugo", "Martin", (31, 3, "B")),
                student(1003, "Inès", "Dubois", (12, 1, "A")),
                student(1004, "Noah", "Peeters", (52, 5, "A")),
            ]),
        }
    }
}

impl SeededDirectory {
    pub(crate) fn students(&self) -> &[Student] {
        &self.students
    }
}

impl SchoolDirectory for SeededDirectory {
    fn student(&self, matricule: StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self
            .students
            .iter()
            .find(|student| student.matricule == matricule)
            .cloned())
    }

    fn teachings(&self) -> Result<Vec<TeachingId>, RepositoryError> {
        Ok(vec![TeachingId(1)])
    }

    fn groups(&self) -> Result<Vec<GroupId>, RepositoryError> {
        Ok(["educators", "coordinators", "direction"]
            .into_iter()
            .map(|group| GroupId(group.to_string()))
            .collect())
    }

    fn responsibles(
        &self,
        _teaching: TeachingId,
        year: u8,
    ) -> Result<Vec<Recipient>, RepositoryError> {
        Ok(vec![Recipient {
            email: format!("educators-year{year}@school.local"),
            display: format!("Year {year} educators"),
        }])
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCaseBridge {
    cases: Arc<Mutex<HashMap<CaseId, NewSanctionCase>>>,
    visibility: Arc<Mutex<HashMap<CaseId, Vec<GroupId>>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryCaseBridge {
    pub(crate) fn open_cases(&self) -> Vec<(CaseId, NewSanctionCase)> {
        let guard = self.cases.lock().expect("case mutex poisoned");
        let mut cases: Vec<_> = guard
            .iter()
            .map(|(id, case)| (*id, case.clone()))
            .collect();
        cases.sort_by_key(|(id, _)| *id);
        cases
    }
}

impl SanctionCaseBridge for InMemoryCaseBridge {
    fn create_case(&self, case: NewSanctionCase) -> Result<CaseId, SanctionError> {
        let id = CaseId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        self.cases
            .lock()
            .expect("case mutex poisoned")
            .insert(id, case);
        Ok(id)
    }

    fn delete_case(&self, id: CaseId) -> Result<(), SanctionError> {
        self.visibility
            .lock()
            .expect("case mutex poisoned")
            .remove(&id);
        self.cases
            .lock()
            .expect("case mutex poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or(SanctionError::NotFound(id))
    }

    fn set_visibility(&self, id: CaseId, groups: &[GroupId]) -> Result<(), SanctionError> {
        if !self.cases.lock().expect("case mutex poisoned").contains_key(&id) {
            return Err(SanctionError::NotFound(id));
        }
        self.visibility
            .lock()
            .expect("case mutex poisoned")
            .insert(id, groups.to_vec());
        Ok(())
    }
}

/// Mail transport stand-in that logs what would be sent.
#[derive(Clone)]
pub(crate) struct LogMailer {
    from: String,
}

impl LogMailer {
    pub(crate) fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl NotificationSender for LogMailer {
    fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        context: &NotificationContext,
    ) -> Result<(), NotificationError> {
        let to: Vec<&str> = recipients
            .iter()
            .map(|recipient| recipient.email.as_str())
            .collect();
        info!(
            from = %self.from,
            to = ?to,
            subject,
            template = context.template,
            count = context.lateness_count,
            "lateness notification"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct LogPrinter;

impl ReceiptPrinter for LogPrinter {
    fn print_receipt(&self, address: &str, receipt: &Receipt) -> Result<(), PrinterError> {
        info!(%address, receipt = %receipt.render(), "receipt printed");
        Ok(())
    }
}

type AttendanceKey = (StudentId, NaiveDate, PeriodId, AttendanceStatus);

#[derive(Clone)]
pub(crate) struct InMemoryAttendance {
    periods: Arc<Vec<Period>>,
    records: Arc<Mutex<HashMap<AttendanceKey, AttendanceRecord>>>,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for InMemoryAttendance {
    fn default() -> Self {
        let slots = [
            ((8, 15), (9, 5)),
            ((9, 5), (9, 55)),
            ((10, 10), (11, 0)),
            ((11, 0), (11, 50)),
            ((12, 40), (13, 30)),
            ((13, 30), (14, 20)),
            ((14, 20), (15, 10)),
        ];
        let periods = slots
            .into_iter()
            .zip(1u32..)
            .map(|(((start_h, start_m), (end_h, end_m)), id)| Period {
                id: PeriodId(id),
                name: format!("P{id}"),
                start: hm(start_h, start_m),
                end: hm(end_h, end_m),
            })
            .collect();

        Self {
            periods: Arc::new(periods),
            records: Arc::default(),
        }
    }
}

impl InMemoryAttendance {
    pub(crate) fn records(&self) -> Vec<AttendanceRecord> {
        let guard = self.records.lock().expect("attendance mutex poisoned");
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by_key(|record| (record.date, record.period, record.student));
        records
    }
}

fn key_of(record: &AttendanceRecord) -> AttendanceKey {
    (record.student, record.date, record.period, record.status)
}

impl AttendanceTracker for InMemoryAttendance {
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
        let guard = self.records.lock().expect("attendance mutex poisoned");
        Ok(guard.get(&(student, date, period, status)).cloned())
    }

    fn create_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        guard.insert(key_of(&record), record);
        Ok(())
    }

    fn update_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        match guard.get_mut(&key_of(&record)) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(AttendanceError::Unavailable(
                "attendance record vanished before update".to_string(),
            )),
        }
    }

    fn delete_record(&self, record: &AttendanceRecord) -> Result<(), AttendanceError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        guard.remove(&key_of(record));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryExportFeed {
    batches: Arc<Mutex<Vec<ExportBatch>>>,
}

impl InMemoryExportFeed {
    pub(crate) fn batches(&self) -> Vec<ExportBatch> {
        self.batches.lock().expect("export mutex poisoned").clone()
    }
}

impl ExportFeed for InMemoryExportFeed {
    fn publish(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        self.batches
            .lock()
            .expect("export mutex poisoned")
            .push(batch.clone());
        Ok(())
    }
}

/// In-process stand-ins for every collaborator of the lateness service.
#[derive(Default, Clone)]
pub(crate) struct InMemoryBackends {
    pub(crate) lateness: InMemoryLatenessRepository,
    pub(crate) settings: InMemorySettingsRepository,
    pub(crate) triggers: InMemoryTriggerRepository,
    pub(crate) directory: SeededDirectory,
    pub(crate) cases: InMemoryCaseBridge,
    pub(crate) attendance: InMemoryAttendance,
    pub(crate) export: InMemoryExportFeed,
}

impl InMemoryBackends {
    /// Optional collaborators are only wired when the matching integration flag is on.
    pub(crate) fn collaborators(&self, integrations: &IntegrationConfig) -> LatenessCollaborators {
        let attendance: Option<Arc<dyn AttendanceTracker>> = if integrations.attendance_sync {
            Some(Arc::new(self.attendance.clone()))
        } else {
            None
        };
        let export: Option<Arc<dyn ExportFeed>> = if integrations.export_feed {
            Some(Arc::new(self.export.clone()))
        } else {
            None
        };

        LatenessCollaborators {
            lateness: Arc::new(self.lateness.clone()),
            settings: Arc::new(self.settings.clone()),
            triggers: Arc::new(self.triggers.clone()),
            directory: Arc::new(self.directory.clone()),
            cases: Arc::new(self.cases.clone()),
            notifier: Arc::new(LogMailer::new(integrations.mail_from.clone())),
            printer: Arc::new(LogPrinter),
            attendance,
            export,
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
