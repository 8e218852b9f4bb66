mod rules;
mod schedule;

pub use schedule::sanction_datetime;

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{GroupId, LatenessEvent, UserRef};
use super::sanctions::{
    CaseId, NewSanctionCase, SanctionCaseBridge, SanctionError, LATENESS_EXPLANATION,
};
use super::triggers::{SanctionTrigger, TriggerId};

/// Decides which triggers fire for a lateness and opens the resulting sanction cases.
pub struct TriggerEvaluator {
    cases: Arc<dyn SanctionCaseBridge>,
}

impl TriggerEvaluator {
    pub fn new(cases: Arc<dyn SanctionCaseBridge>) -> Self {
        Self { cases }
    }

    /// Runs every candidate trigger against `count`, the student's unjustified
    /// lateness count including `event`.
    ///
    /// Each firing non-warn trigger opens its own case; only the last opened id is
    /// kept on the event. The caller persists the event afterwards.
    pub fn evaluate(
        &self,
        event: &mut LatenessEvent,
        count: u32,
        triggers: &[SanctionTrigger],
        visibility: &[GroupId],
        requester: &UserRef,
        now: NaiveDateTime,
    ) -> Result<EvaluationOutcome, SanctionError> {
        let candidates = rules::candidates(triggers, &event.student, now.time());
        debug!(
            lateness = %event.id,
            count,
            candidates = candidates.len(),
            "evaluating sanction triggers"
        );

        let mut fired = Vec::new();
        for trigger in candidates {
            if !rules::fires(trigger.first_threshold, trigger.repeat_interval, count) {
                continue;
            }

            event.has_sanction = true;

            let sanction = match trigger.sanction {
                Some(sanction) if !trigger.only_warn => sanction,
                _ => {
                    fired.push(FiredTrigger {
                        trigger: trigger.id,
                        action: TriggerAction::Warned,
                    });
                    continue;
                }
            };

            let scheduled_for = sanction_datetime(&trigger.schedule, now);
            let case_id = self.cases.create_case(NewSanctionCase {
                student: event.student.clone(),
                requester: requester.full_name.clone(),
                sanction,
                explanation: LATENESS_EXPLANATION.to_string(),
                scheduled_for,
            })?;
            // Linked before sharing so a failed visibility update stays retractable.
            event.sanction_id = Some(case_id);
            self.cases.set_visibility(case_id, visibility)?;

            info!(
                lateness = %event.id,
                trigger = %trigger.id,
                case = %case_id,
                %scheduled_for,
                "opened sanction case"
            );
            fired.push(FiredTrigger {
                trigger: trigger.id,
                action: TriggerAction::CaseOpened {
                    case_id,
                    scheduled_for,
                },
            });
        }

        let outcome = EvaluationOutcome { count, fired };
        if outcome.opened_cases().count() > 1 {
            warn!(
                lateness = %event.id,
                kept = ?event.sanction_id,
                "several sanction cases opened for one lateness; only the last is tracked"
            );
        }
        Ok(outcome)
    }

    /// Removes the case linked to `event`, if any. A case that is already gone counts
    /// as removed. Returns whether a deletion was attempted.
    pub fn retract(&self, event: &mut LatenessEvent) -> Result<bool, SanctionError> {
        let Some(case_id) = event.sanction_id else {
            return Ok(false);
        };

        match self.cases.delete_case(case_id) {
            Ok(()) => info!(lateness = %event.id, case = %case_id, "retracted sanction case"),
            Err(SanctionError::NotFound(_)) => {
                debug!(lateness = %event.id, case = %case_id, "sanction case already removed")
            }
            Err(other) => return Err(other),
        }

        event.sanction_id = None;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TriggerAction {
    Warned,
    CaseOpened {
        case_id: CaseId,
        scheduled_for: NaiveDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredTrigger {
    pub trigger: TriggerId,
    #[serde(flatten)]
    pub action: TriggerAction,
}

/// What a single evaluation did, for logging and API responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub count: u32,
    pub fired: Vec<FiredTrigger>,
}

impl EvaluationOutcome {
    pub fn triggered(&self) -> bool {
        !self.fired.is_empty()
    }

    pub fn opened_cases(&self) -> impl Iterator<Item = CaseId> + '_ {
        self.fired.iter().filter_map(|fired| match fired.action {
            TriggerAction::CaseOpened { case_id, .. } => Some(case_id),
            TriggerAction::Warned => None,
        })
    }
}
