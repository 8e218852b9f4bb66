use chrono::NaiveTime;

use super::super::domain::Student;
use super::super::triggers::SanctionTrigger;

/// Scope check: same teaching, and the student's year OR class is listed.
pub(crate) fn in_scope(trigger: &SanctionTrigger, student: &Student) -> bool {
    if trigger.teaching != student.teaching {
        return false;
    }

    let year_listed = trigger.years.contains(&student.classe.year);
    let class_listed = trigger.classes.contains(&student.classe.id);
    year_listed || class_listed
}

pub(crate) fn active_at(trigger: &SanctionTrigger, time: NaiveTime) -> bool {
    match &trigger.window {
        Some(window) => window.contains(time),
        None => true,
    }
}

/// Triggers that may fire for `student` at `time`, in registry order.
pub(crate) fn candidates<'a>(
    triggers: &'a [SanctionTrigger],
    student: &Student,
    time: NaiveTime,
) -> Vec<&'a SanctionTrigger> {
    let mut selected: Vec<&SanctionTrigger> = Vec::new();
    for trigger in triggers {
        if selected.iter().any(|seen| seen.id == trigger.id) {
            continue;
        }
        if in_scope(trigger, student) && active_at(trigger, time) {
            selected.push(trigger);
        }
    }
    selected
}

/// Fires at exactly `first`, then every `repeat` counts after it.
pub(crate) fn fires(first: u16, repeat: u16, count: u32) -> bool {
    let first = u32::from(first);
    let repeat = u32::from(repeat);

    if count < first {
        return false;
    }
    if count == first {
        return true;
    }
    repeat != 0 && (count - first) % repeat == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fires_below_first_threshold() {
        for count in 0..3 {
            assert!(!fires(3, 2, count), "count {count} must not fire");
        }
    }

    #[test]
    fn fires_at_threshold_then_every_interval() {
        let firing: Vec<u32> = (0..=12).filter(|count| fires(3, 2, *count)).collect();
        assert_eq!(firing, vec![3, 5, 7, 9, 11]);

        let firing: Vec<u32> = (0..=20).filter(|count| fires(4, 5, *count)).collect();
        assert_eq!(firing, vec![4, 9, 14, 19]);
    }

    #[test]
    fn interval_of_one_fires_on_every_count_from_threshold() {
        let firing: Vec<u32> = (0..=6).filter(|count| fires(2, 1, *count)).collect();
        assert_eq!(firing, vec![2, 3, 4, 5, 6]);
    }
}
