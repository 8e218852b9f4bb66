use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{ClasseId, TeachingId};
use super::repository::RepositoryError;
use super::sanctions::SanctionDefinitionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub u32);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open `[start, stop)` wall-clock window during which a trigger is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.stop
    }
}

/// Day on which an opened sanction case is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionDay {
    SameDay,
    Weekday(Weekday),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionSchedule {
    pub day: SanctionDay,
    /// Minimum number of days between the lateness and a weekday-shifted sanction.
    pub delay_days: Option<u16>,
    pub time: Option<NaiveTime>,
}

impl Default for SanctionSchedule {
    fn default() -> Self {
        Self {
            day: SanctionDay::SameDay,
            delay_days: Some(1),
            time: None,
        }
    }
}

/// Validated rule mapping accumulated lateness counts to a warning or a sanction case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionTrigger {
    pub id: TriggerId,
    pub teaching: TeachingId,
    pub years: BTreeSet<u8>,
    pub classes: BTreeSet<ClasseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    pub first_threshold: u16,
    pub repeat_interval: u16,
    pub only_warn: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanction: Option<SanctionDefinitionId>,
    pub schedule: SanctionSchedule,
}

/// Unvalidated trigger as submitted by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDraft {
    pub teaching: TeachingId,
    #[serde(default)]
    pub years: BTreeSet<u8>,
    #[serde(default)]
    pub classes: BTreeSet<ClasseId>,
    #[serde(default)]
    pub window_start: Option<NaiveTime>,
    #[serde(default)]
    pub window_stop: Option<NaiveTime>,
    #[serde(default = "default_first_threshold")]
    pub first_threshold: u16,
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval: u16,
    #[serde(default)]
    pub only_warn: bool,
    #[serde(default)]
    pub sanction: Option<SanctionDefinitionId>,
    #[serde(default)]
    pub schedule: SanctionSchedule,
}

fn default_first_threshold() -> u16 {
    4
}

fn default_repeat_interval() -> u16 {
    3
}

impl TriggerDraft {
    pub fn validate(self, id: TriggerId) -> Result<SanctionTrigger, TriggerConfigError> {
        let window = match (self.window_start, self.window_stop) {
            (None, None) => None,
            (Some(start), Some(stop)) if start < stop => Some(TimeWindow { start, stop }),
            (Some(_), Some(_)) => return Err(TriggerConfigError::EmptyWindow),
            _ => return Err(TriggerConfigError::PartialWindow),
        };

        if self.first_threshold == 0 {
            return Err(TriggerConfigError::ZeroFirstThreshold);
        }
        if self.repeat_interval == 0 {
            return Err(TriggerConfigError::ZeroRepeatInterval);
        }

        if let SanctionDay::Weekday(weekday) = self.schedule.day {
            if weekday == Weekday::Sun {
                return Err(TriggerConfigError::SundayNotAllowed);
            }
            if self.schedule.delay_days.is_none() {
                return Err(TriggerConfigError::MissingDelay);
            }
            if self.schedule.time.is_none() {
                return Err(TriggerConfigError::MissingSanctionTime);
            }
        }

        if !self.only_warn && self.sanction.is_none() {
            return Err(TriggerConfigError::MissingSanction);
        }

        Ok(SanctionTrigger {
            id,
            teaching: self.teaching,
            years: self.years,
            classes: self.classes,
            window,
            first_threshold: self.first_threshold,
            repeat_interval: self.repeat_interval,
            only_warn: self.only_warn,
            sanction: self.sanction,
            schedule: self.schedule,
        })
    }
}

/// Configuration errors detected when a trigger is saved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerConfigError {
    #[error("time window needs both a start and a stop")]
    PartialWindow,
    #[error("time window start must be before its stop")]
    EmptyWindow,
    #[error("first threshold must be at least 1")]
    ZeroFirstThreshold,
    #[error("repeat interval must be at least 1")]
    ZeroRepeatInterval,
    #[error("sanctions cannot be scheduled on a Sunday")]
    SundayNotAllowed,
    #[error("a weekday shift requires a delay")]
    MissingDelay,
    #[error("a weekday shift requires a sanction time")]
    MissingSanctionTime,
    #[error("a trigger that opens cases requires a sanction definition")]
    MissingSanction,
}

/// Storage for triggers. `list` returns them in registry order.
pub trait TriggerRepository: Send + Sync {
    fn next_id(&self) -> Result<TriggerId, RepositoryError>;
    fn insert(&self, trigger: SanctionTrigger) -> Result<SanctionTrigger, RepositoryError>;
    fn list(&self) -> Result<Vec<SanctionTrigger>, RepositoryError>;
    fn delete(&self, id: TriggerId) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerRegistryError {
    #[error(transparent)]
    Invalid(#[from] TriggerConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Ordered set of trigger rules, validated on the way in.
pub struct TriggerRegistry {
    repository: Arc<dyn TriggerRepository>,
}

impl TriggerRegistry {
    pub fn new(repository: Arc<dyn TriggerRepository>) -> Self {
        Self { repository }
    }

    pub fn register(&self, draft: TriggerDraft) -> Result<SanctionTrigger, TriggerRegistryError> {
        let id = self.repository.next_id()?;
        let trigger = draft.validate(id)?;
        let stored = self.repository.insert(trigger)?;
        info!(trigger = %stored.id, teaching = stored.teaching.0, "registered sanction trigger");
        Ok(stored)
    }

    pub fn list(&self) -> Result<Vec<SanctionTrigger>, RepositoryError> {
        let mut triggers = self.repository.list()?;
        triggers.sort_by_key(|trigger| trigger.id);
        Ok(triggers)
    }

    pub fn remove(&self, id: TriggerId) -> Result<(), RepositoryError> {
        self.repository.delete(id)
    }
}
