use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{LatenessEvent, StudentId, UserRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodId(pub u32);

/// Teaching period of the school day, covering `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Period {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Presence,
    Lateness,
    Absence,
    Excluded,
    Internship,
}

/// Per-period, per-day status entry owned by the attendance tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student: StudentId,
    pub date: NaiveDate,
    pub period: PeriodId,
    pub status: AttendanceStatus,
    pub comment: String,
    pub recorded_by: String,
}

/// Period-based attendance tracker deployed alongside the lateness module.
pub trait AttendanceTracker: Send + Sync {
    fn find_period(&self, time: NaiveTime) -> Result<Option<Period>, AttendanceError>;
    fn find_record(
        &self,
        student: StudentId,
        date: NaiveDate,
        period: PeriodId,
        status: AttendanceStatus,
    ) -> Result<Option<AttendanceRecord>, AttendanceError>;
    fn create_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError>;
    fn update_record(&self, record: AttendanceRecord) -> Result<(), AttendanceError>;
    fn delete_record(&self, record: &AttendanceRecord) -> Result<(), AttendanceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("attendance tracker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Disabled,
    SkippedNoPeriod,
    Created,
    Updated,
}

/// Keeps at most one lateness-status attendance record per (student, date, period)
/// aligned with the lateness events. Without a tracker every call is a no-op.
#[derive(Clone, Default)]
pub struct AttendanceSync {
    tracker: Option<Arc<dyn AttendanceTracker>>,
}

impl AttendanceSync {
    pub fn new(tracker: Option<Arc<dyn AttendanceTracker>>) -> Self {
        Self { tracker }
    }

    pub fn disabled() -> Self {
        Self { tracker: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn sync(
        &self,
        event: &LatenessEvent,
        user: &UserRef,
    ) -> Result<SyncOutcome, AttendanceError> {
        let Some(tracker) = &self.tracker else {
            return Ok(SyncOutcome::Disabled);
        };

        let time = event.created_at.time();
        let Some(period) = tracker.find_period(time)? else {
            debug!(lateness = %event.id, %time, "no period covers lateness; attendance untouched");
            return Ok(SyncOutcome::SkippedNoPeriod);
        };

        let comment = comment_for(event);
        let date = event.created_at.date();
        let existing = tracker.find_record(
            event.student.matricule,
            date,
            period.id,
            AttendanceStatus::Lateness,
        )?;

        match existing {
            Some(mut record) => {
                record.comment = comment;
                record.recorded_by = user.username.clone();
                tracker.update_record(record)?;
                Ok(SyncOutcome::Updated)
            }
            None => {
                tracker.create_record(AttendanceRecord {
                    student: event.student.matricule,
                    date,
                    period: period.id,
                    status: AttendanceStatus::Lateness,
                    comment,
                    recorded_by: user.username.clone(),
                })?;
                Ok(SyncOutcome::Created)
            }
        }
    }

    /// Deletes the lateness record matching the event's creation time, returning
    /// whether one existed.
    pub fn remove(&self, event: &LatenessEvent) -> Result<bool, AttendanceError> {
        let Some(tracker) = &self.tracker else {
            return Ok(false);
        };

        let Some(period) = tracker.find_period(event.created_at.time())? else {
            return Ok(false);
        };

        let record = tracker.find_record(
            event.student.matricule,
            event.created_at.date(),
            period.id,
            AttendanceStatus::Lateness,
        )?;

        match record {
            Some(record) => {
                tracker.delete_record(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn comment_for(event: &LatenessEvent) -> String {
    let mut comment = format!("Lateness at {}", event.created_at.format("%H:%M"));
    if event.justified {
        comment.push_str(" (justified)");
    }
    comment
}
