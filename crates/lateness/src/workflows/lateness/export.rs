use std::collections::BTreeSet;
use std::io::Write;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::domain::{LatenessEvent, StudentId};

/// Half of the school day covered by an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartOfDay {
    Am,
    Pm,
    FullDay,
}

impl FromStr for PartOfDay {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_uppercase().as_str() {
            "AM" => Self::Am,
            "PM" => Self::Pm,
            _ => Self::FullDay,
        })
    }
}

impl PartOfDay {
    fn includes(self, time: NaiveTime) -> bool {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        match self {
            PartOfDay::Am => time <= noon,
            PartOfDay::Pm => time > noon,
            PartOfDay::FullDay => true,
        }
    }
}

/// Students late today, ready for the administrative export feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportBatch {
    pub file_name: String,
    pub part_of_day: PartOfDay,
    pub students: Vec<StudentId>,
}

impl ExportBatch {
    /// One matricule per line, no header.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for student in &self.students {
            csv_writer.write_record([student.0.to_string()])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Today's unjustified lateness, restricted to `part`, de-duplicated in creation order.
pub fn build_export(events: &[LatenessEvent], now: NaiveDateTime, part: PartOfDay) -> ExportBatch {
    let today = now.date();
    let mut ordered: Vec<&LatenessEvent> = events
        .iter()
        .filter(|event| {
            !event.justified
                && event.created_at.date() == today
                && part.includes(event.created_at.time())
        })
        .collect();
    ordered.sort_by_key(|event| (event.created_at, event.id));

    let mut seen = BTreeSet::new();
    let students = ordered
        .into_iter()
        .map(|event| event.student.matricule)
        .filter(|matricule| seen.insert(*matricule))
        .collect();

    ExportBatch {
        file_name: format!("Pref_NOMS_{}_retards.TXT", now.format("%y-%m-%d")),
        part_of_day: part,
        students,
    }
}

/// Downstream administrative system consuming the daily lateness export.
pub trait ExportFeed: Send + Sync {
    fn publish(&self, batch: &ExportBatch) -> Result<(), ExportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export feed is not configured")]
    NotConfigured,
    #[error("export encoding failed: {0}")]
    Encoding(#[from] csv::Error),
    #[error("export feed unavailable: {0}")]
    Unavailable(String),
}
