use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::domain::{GroupId, LatenessEvent, LatenessId, Student, StudentId, TeachingId};
use super::notify::Recipient;

/// Storage abstraction for lateness events so the service can be exercised in isolation.
pub trait LatenessRepository: Send + Sync {
    fn insert(&self, event: LatenessEvent) -> Result<LatenessEvent, RepositoryError>;
    fn update(&self, event: &LatenessEvent) -> Result<(), RepositoryError>;
    fn fetch(&self, id: LatenessId) -> Result<Option<LatenessEvent>, RepositoryError>;
    fn delete(&self, id: LatenessId) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<LatenessEvent>, RepositoryError>;

    /// Unjustified events of `student` created on or after `since`.
    fn count_unjustified_since(
        &self,
        student: StudentId,
        since: NaiveDate,
    ) -> Result<u32, RepositoryError> {
        let count = self
            .list()?
            .iter()
            .filter(|event| {
                event.student.matricule == student
                    && !event.justified
                    && event.created_at.date() >= since
            })
            .count();
        Ok(count as u32)
    }

    /// Unjustified counts grouped by student, for events created on or after `since`.
    fn unjustified_counts_since(
        &self,
        since: NaiveDate,
    ) -> Result<BTreeMap<StudentId, u32>, RepositoryError> {
        let mut counts = BTreeMap::new();
        for event in self.list()? {
            if !event.justified && event.created_at.date() >= since {
                *counts.entry(event.student.matricule).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

/// Read-only school reference data: students, teachings, groups and responsible contacts.
pub trait SchoolDirectory: Send + Sync {
    fn student(&self, matricule: StudentId) -> Result<Option<Student>, RepositoryError>;
    fn teachings(&self) -> Result<Vec<TeachingId>, RepositoryError>;
    fn groups(&self) -> Result<Vec<GroupId>, RepositoryError>;
    fn responsibles(
        &self,
        teaching: TeachingId,
        year: u8,
    ) -> Result<Vec<Recipient>, RepositoryError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
