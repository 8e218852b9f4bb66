use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{GroupId, TeachingId};
use super::repository::{RepositoryError, SchoolDirectory};

/// Module-wide lateness settings. Exactly one instance exists per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatenessSettings {
    /// Only lateness created on or after this date counts toward trigger thresholds.
    pub date_count_start: NaiveDate,
    pub notify_responsible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer_address: Option<String>,
    pub enable_camera_scan: bool,
    pub teachings: BTreeSet<TeachingId>,
    pub all_access: BTreeSet<GroupId>,
}

impl Default for LatenessSettings {
    fn default() -> Self {
        Self {
            date_count_start: NaiveDate::from_ymd_opt(2019, 9, 1).unwrap_or_default(),
            notify_responsible: false,
            printer_address: None,
            enable_camera_scan: false,
            teachings: BTreeSet::new(),
            all_access: BTreeSet::new(),
        }
    }
}

impl LatenessSettings {
    /// Printer to use for a receipt: the requested one, else the configured one.
    /// `None` when no printer is configured, which disables printing altogether.
    pub fn printer_for(&self, requested: Option<&str>) -> Option<String> {
        let configured = self
            .printer_address
            .as_deref()
            .filter(|address| !address.trim().is_empty())?;
        let target = requested
            .filter(|address| !address.trim().is_empty())
            .unwrap_or(configured);
        Some(target.to_string())
    }

    fn apply(&mut self, update: SettingsUpdate) {
        if let Some(date) = update.date_count_start {
            self.date_count_start = date;
        }
        if let Some(notify) = update.notify_responsible {
            self.notify_responsible = notify;
        }
        if let Some(printer) = update.printer_address {
            self.printer_address = Some(printer).filter(|address| !address.trim().is_empty());
        }
        if let Some(scan) = update.enable_camera_scan {
            self.enable_camera_scan = scan;
        }
        if let Some(teachings) = update.teachings {
            self.teachings = teachings;
        }
        if let Some(groups) = update.all_access {
            self.all_access = groups;
        }
    }
}

/// Partial settings update; absent fields are left untouched.
/// An empty `printer_address` clears the printer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub date_count_start: Option<NaiveDate>,
    #[serde(default)]
    pub notify_responsible: Option<bool>,
    #[serde(default)]
    pub printer_address: Option<String>,
    #[serde(default)]
    pub enable_camera_scan: Option<bool>,
    #[serde(default)]
    pub teachings: Option<BTreeSet<TeachingId>>,
    #[serde(default)]
    pub all_access: Option<BTreeSet<GroupId>>,
}

/// Persistence for the settings singleton.
pub trait SettingsRepository: Send + Sync {
    fn load(&self) -> Result<Option<LatenessSettings>, RepositoryError>;
    fn save(&self, settings: &LatenessSettings) -> Result<(), RepositoryError>;
}

/// Lazily initialised access to the settings singleton.
pub struct SettingsStore {
    repository: Arc<dyn SettingsRepository>,
    directory: Arc<dyn SchoolDirectory>,
}

impl SettingsStore {
    pub fn new(repository: Arc<dyn SettingsRepository>, directory: Arc<dyn SchoolDirectory>) -> Self {
        Self {
            repository,
            directory,
        }
    }

    pub fn current(&self) -> Result<LatenessSettings, RepositoryError> {
        if let Some(settings) = self.repository.load()? {
            return Ok(settings);
        }

        let mut settings = LatenessSettings::default();
        let teachings = self.directory.teachings()?;
        if let [only] = teachings.as_slice() {
            settings.teachings.insert(*only);
        }
        self.repository.save(&settings)?;
        info!(
            teachings = settings.teachings.len(),
            "created default lateness settings"
        );
        Ok(settings)
    }

    pub fn update(&self, update: SettingsUpdate) -> Result<LatenessSettings, RepositoryError> {
        let mut settings = self.current()?;
        settings.apply(update);
        self.repository.save(&settings)?;
        Ok(settings)
    }
}
