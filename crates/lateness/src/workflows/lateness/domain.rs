use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::sanctions::CaseId;

/// Identifier of a recorded lateness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LatenessId(pub u64);

impl fmt::Display for LatenessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Student matricule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub u32);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeachingId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClasseId(pub u32);

/// Authorization group, used for case visibility and unrestricted listing access.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// Class a student belongs to, e.g. year 3 letter "B".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classe {
    pub id: ClasseId,
    pub year: u8,
    pub letter: String,
}

impl Classe {
    pub fn compact(&self) -> String {
        format!("{}{}", self.year, self.letter)
    }
}

/// Snapshot of the student a lateness event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub matricule: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub teaching: TeachingId,
    pub classe: Classe,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// Staff member on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub username: String,
    pub full_name: String,
}

impl UserRef {
    pub fn system() -> Self {
        Self {
            username: "system".to_string(),
            full_name: "System".to_string(),
        }
    }
}

/// One recorded instance of a student arriving late.
///
/// `has_sanction` and `sanction_id` are owned by the trigger evaluator; callers only
/// ever submit a [`NewLateness`] or a [`LatenessUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatenessEvent {
    pub id: LatenessId,
    pub student: Student,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub justified: bool,
    pub has_sanction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanction_id: Option<CaseId>,
}

impl LatenessEvent {
    pub fn new(id: LatenessId, student: Student, justified: bool, now: NaiveDateTime) -> Self {
        Self {
            id,
            student,
            created_at: now,
            updated_at: now,
            justified,
            has_sanction: false,
            sanction_id: None,
        }
    }

    pub fn touch(&mut self, now: NaiveDateTime) {
        self.updated_at = now;
    }
}

/// Payload accepted when recording a new lateness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLateness {
    pub matricule: StudentId,
    #[serde(default)]
    pub justified: bool,
}

/// Mutable fields of an existing lateness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatenessUpdate {
    #[serde(default)]
    pub justified: Option<bool>,
}

/// Receipt printing requested alongside a new lateness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintRequest {
    pub printer: Option<String>,
}

/// Request-scoped inputs: who is acting, when, and whether a receipt is wanted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: UserRef,
    pub now: NaiveDateTime,
    pub print: Option<PrintRequest>,
}

impl RequestContext {
    pub fn new(user: UserRef, now: NaiveDateTime) -> Self {
        Self {
            user,
            now,
            print: None,
        }
    }

    pub fn with_print(mut self, print: PrintRequest) -> Self {
        self.print = Some(print);
        self
    }
}
