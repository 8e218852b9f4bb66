use serde::{Deserialize, Serialize};

use super::domain::LatenessEvent;

pub const LATENESS_TEMPLATE: &str = "lateness/lateness_email";

/// Responsible contact (educator, coordinator) receiving lateness notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub display: String,
}

/// Values handed to the mail template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationContext {
    pub template: &'static str,
    pub lateness: LatenessEvent,
    pub lateness_count: u32,
}

/// Mail transport used for lateness notifications.
pub trait NotificationSender: Send + Sync {
    fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        context: &NotificationContext,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// `[Lateness][Sanction] Doe John 3B`, the sanction tag only when a trigger fired.
pub fn lateness_subject(event: &LatenessEvent) -> String {
    format!(
        "[Lateness]{} {} {}",
        if event.has_sanction { "[Sanction]" } else { "" },
        event.student.full_name(),
        event.student.classe.compact()
    )
}
