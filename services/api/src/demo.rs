use crate::infra::InMemoryBackends;
use chrono::{Duration, Local, NaiveDate, NaiveTime, Weekday};
use clap::Args;
use lateness::config::IntegrationConfig;
use lateness::error::AppError;
use lateness::workflows::lateness::{
    LatenessService, LatenessUpdate, NewLateness, PartOfDay, PrintRequest, RecordedLateness,
    RequestContext, SanctionDay, SanctionDefinitionId, SanctionSchedule, SettingsUpdate,
    StudentId, TriggerAction, TriggerDraft, UserRef,
};
use std::collections::BTreeSet;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First school day of the demo week (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Matricule of the late student.
    #[arg(long, default_value_t = 1001)]
    pub(crate) matricule: u32,
    /// Count at which the demo trigger first fires.
    #[arg(long, default_value_t = 3)]
    pub(crate) first: u16,
    /// Interval between later firings.
    #[arg(long, default_value_t = 2)]
    pub(crate) repeat: u16,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        matricule,
        first,
        repeat,
    } = args;
    let start = start.unwrap_or_else(|| Local::now().date_naive());

    let backends = InMemoryBackends::default();
    let integrations = IntegrationConfig {
        attendance_sync: true,
        export_feed: true,
        mail_from: "noreply@school.local".to_string(),
    };
    let service = LatenessService::new(backends.collaborators(&integrations));

    let Some(student) = backends
        .directory
        .students()
        .iter()
        .find(|student| student.matricule == StudentId(matricule))
        .cloned()
    else {
        println!("Unknown student {matricule}; known matricules:");
        for student in backends.directory.students() {
            println!("  - {} {}", student.matricule, student.full_name());
        }
        return Ok(());
    };

    service.update_settings(SettingsUpdate {
        date_count_start: Some(start - Duration::days(30)),
        notify_responsible: Some(true),
        printer_address: Some("demo-printer".to_string()),
        ..SettingsUpdate::default()
    })?;

    let trigger = service.register_trigger(TriggerDraft {
        teaching: student.teaching,
        years: BTreeSet::from([student.classe.year]),
        classes: BTreeSet::new(),
        window_start: None,
        window_stop: None,
        first_threshold: first,
        repeat_interval: repeat,
        only_warn: false,
        sanction: Some(SanctionDefinitionId(1)),
        schedule: SanctionSchedule {
            day: SanctionDay::Weekday(Weekday::Wed),
            delay_days: Some(1),
            time: NaiveTime::from_hms_opt(12, 45, 0),
        },
    })?;

    println!("Lateness demo");
    println!(
        "- Student {} ({}) | trigger {} fires at {} then every {}",
        student.full_name(),
        student.classe.compact(),
        trigger.id,
        trigger.first_threshold,
        trigger.repeat_interval
    );

    let educator = UserRef {
        username: "educator".to_string(),
        full_name: "Demo Educator".to_string(),
    };

    let mut recorded = Vec::new();
    for offset in 0..5 {
        let Some(arrival) = (start + Duration::days(offset)).and_hms_opt(8, 20, 0) else {
            continue;
        };
        let ctx = RequestContext::new(educator.clone(), arrival)
            .with_print(PrintRequest::default());
        let entry = service.record(
            NewLateness {
                matricule: student.matricule,
                justified: false,
            },
            &ctx,
        )?;
        render_recorded(&entry);
        recorded.push(entry);
    }

    if let Some(third) = recorded.get(2) {
        let now = third.lateness.created_at + Duration::hours(2);
        let updated = service.update(
            third.lateness.id,
            LatenessUpdate {
                justified: Some(true),
            },
            &RequestContext::new(educator.clone(), now),
        )?;
        println!(
            "\nJustified lateness {} -> sanction case {}",
            updated.id,
            if updated.sanction_id.is_none() {
                "retracted"
            } else {
                "kept"
            }
        );
    }

    let last_day = start + Duration::days(4);
    if let Some(noon) = last_day.and_hms_opt(12, 30, 0) {
        let batch = service.export(PartOfDay::Am, noon)?;
        println!(
            "\nExport {} -> {} student(s)",
            batch.file_name,
            batch.students.len()
        );
    }

    println!("\nOpen sanction cases:");
    for (id, case) in backends.cases.open_cases() {
        println!(
            "  - case {} for {} on {}",
            id,
            case.student.full_name(),
            case.scheduled_for.format("%a %d/%m %H:%M")
        );
    }
    println!(
        "Attendance records: {} | exports published: {}",
        backends.attendance.records().len(),
        backends.export.batches().len()
    );

    Ok(())
}

fn render_recorded(entry: &RecordedLateness) {
    println!(
        "\n{} | count {} | printed {} | attendance {:?}",
        entry.lateness.created_at.format("%a %d/%m %H:%M"),
        entry.count,
        entry.printed,
        entry.attendance
    );

    let Some(evaluation) = &entry.evaluation else {
        return;
    };
    for fired in &evaluation.fired {
        match &fired.action {
            TriggerAction::Warned => println!("  trigger {} warned", fired.trigger),
            TriggerAction::CaseOpened {
                case_id,
                scheduled_for,
            } => println!(
                "  trigger {} opened case {} for {}",
                fired.trigger,
                case_id,
                scheduled_for.format("%a %d/%m %H:%M")
            ),
        }
    }
}
