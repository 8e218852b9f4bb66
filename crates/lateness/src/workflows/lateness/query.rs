use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{ClasseId, LatenessEvent, Student, StudentId};

/// Listing filters offered to staff. All present filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatenessQuery {
    #[serde(default)]
    pub matricule: Option<u32>,
    /// Case-insensitive substring of "last first".
    #[serde(default)]
    pub name: Option<String>,
    /// Case-insensitive prefix of the compact class, e.g. "3" or "3b".
    #[serde(default)]
    pub classe: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Inclusive through the end of that day.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub justified: Option<bool>,
    /// Only events counted toward thresholds.
    #[serde(default)]
    pub after_count_start: bool,
    /// Unjustified events of students with at least this many counted lateness.
    #[serde(default)]
    pub min_count: Option<u32>,
}

impl LatenessQuery {
    pub(crate) fn apply(
        &self,
        events: Vec<LatenessEvent>,
        count_start: NaiveDate,
        counts: &BTreeMap<StudentId, u32>,
    ) -> Vec<LatenessEvent> {
        let name = self.name.as_ref().map(|name| name.to_lowercase());
        let classe = self.classe.as_ref().map(|classe| classe.to_lowercase());

        let mut selected: Vec<LatenessEvent> = events
            .into_iter()
            .filter(|event| {
                self.matricule
                    .map_or(true, |matricule| event.student.matricule == StudentId(matricule))
            })
            .filter(|event| {
                name.as_ref().map_or(true, |name| {
                    event.student.full_name().to_lowercase().contains(name.as_str())
                })
            })
            .filter(|event| {
                classe.as_ref().map_or(true, |classe| {
                    event
                        .student
                        .classe
                        .compact()
                        .to_lowercase()
                        .starts_with(classe.as_str())
                })
            })
            .filter(|event| {
                let date = event.created_at.date();
                self.date_from.map_or(true, |from| date >= from)
                    && self.date_to.map_or(true, |to| date <= to)
            })
            .filter(|event| self.justified.map_or(true, |flag| event.justified == flag))
            .filter(|event| !self.after_count_start || event.created_at.date() >= count_start)
            .filter(|event| match self.min_count {
                Some(minimum) => {
                    !event.justified
                        && counts
                            .get(&event.student.matricule)
                            .is_some_and(|count| *count >= minimum)
                }
                None => true,
            })
            .collect();

        selected.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        selected
    }
}

pub const DEFAULT_TOP_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLatenessEntry {
    pub student: Student,
    pub count: u32,
}

/// Students ranked by counted lateness, optionally restricted to some classes.
pub(crate) fn rank_students(
    events: &[LatenessEvent],
    counts: &BTreeMap<StudentId, u32>,
    classes: Option<&BTreeSet<ClasseId>>,
    limit: usize,
) -> Vec<TopLatenessEntry> {
    let mut students: BTreeMap<StudentId, &Student> = BTreeMap::new();
    for event in events {
        students
            .entry(event.student.matricule)
            .or_insert(&event.student);
    }

    let mut ranked: Vec<TopLatenessEntry> = counts
        .iter()
        .filter_map(|(matricule, count)| {
            let student = students.get(matricule)?;
            let allowed = classes.map_or(true, |classes| classes.contains(&student.classe.id));
            allowed.then(|| TopLatenessEntry {
                student: (*student).clone(),
                count: *count,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.student.matricule.cmp(&b.student.matricule))
    });
    ranked.truncate(limit);
    ranked
}
