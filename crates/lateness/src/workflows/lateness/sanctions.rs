use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::domain::{GroupId, Student};

/// Opaque reference to a disciplinary case managed by the case-management module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of sanction (detention, exclusion, ...) defined in the case-management module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SanctionDefinitionId(pub u32);

pub const LATENESS_EXPLANATION: &str = "Sanction for lateness.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSanctionCase {
    pub student: Student,
    pub requester: String,
    pub sanction: SanctionDefinitionId,
    pub explanation: String,
    pub scheduled_for: NaiveDateTime,
}

/// Outbound hooks into the disciplinary case-management module.
pub trait SanctionCaseBridge: Send + Sync {
    fn create_case(&self, case: NewSanctionCase) -> Result<CaseId, SanctionError>;
    /// Implementations report a missing case as [`SanctionError::NotFound`].
    fn delete_case(&self, id: CaseId) -> Result<(), SanctionError>;
    fn set_visibility(&self, id: CaseId, groups: &[GroupId]) -> Result<(), SanctionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SanctionError {
    #[error("sanction case {0} not found")]
    NotFound(CaseId),
    #[error("case management unavailable: {0}")]
    Unavailable(String),
}
