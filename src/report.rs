use std::fmt::Write;

use crate::models::{ClassStatusEntry, DashboardSummary};

/// Renders the summary as plain text for the CLI.
pub fn render_summary(summary: &DashboardSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Dashboard for {}", summary.teacher_name);
    let _ = writeln!(output, "Aggregated at {}", summary.cached_at.to_rfc3339());
    let _ = writeln!(output);

    if let Some(alert) = &summary.critical_alert {
        let _ = writeln!(output, "!! {}", alert.message);
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## Today's Classes");
    if summary.today_classes.is_empty() {
        let _ = writeln!(output, "No classes today.");
    } else {
        for class in summary.today_classes.iter() {
            let _ = writeln!(output, "{}", class_line(class));
        }
    }

    if let Some(next) = &summary.next_class {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Next: period {} {} in {} min{}",
            next.period,
            next.course_name,
            next.starts_in_minutes,
            next.room
                .as_deref()
                .map(|room| format!(" ({room})"))
                .unwrap_or_default()
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Backlog");
    let _ = writeln!(
        output,
        "- Attendance pending: {}",
        summary.attendance_pending_count
    );
    match summary.assignments.to_evaluate {
        Some(count) => {
            let _ = writeln!(
                output,
                "- Submissions to evaluate: {}{}",
                count,
                if summary.assignments.overdue {
                    " (overdue)"
                } else {
                    ""
                }
            );
        }
        None => {
            let _ = writeln!(output, "- Submissions to evaluate: unavailable");
        }
    }
    match (&summary.internal_marks.exam_name, summary.internal_marks.pending) {
        (Some(exam), Some(pending)) => {
            let _ = writeln!(
                output,
                "- Mark entry for {}: {} schedule(s) pending{}",
                exam,
                pending,
                if summary.internal_marks.deadline_today {
                    ", deadline today"
                } else {
                    ""
                }
            );
        }
        (Some(exam), None) => {
            let _ = writeln!(output, "- Mark entry for {exam}: unavailable");
        }
        _ => {}
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Notices ({} unread)", summary.notices.unread_count);
    if summary.notices.important.is_empty() {
        let _ = writeln!(output, "No recent notices.");
    } else {
        for notice in summary.notices.important.iter() {
            let _ = writeln!(
                output,
                "- [{}] {} ({})",
                notice.scope.as_str(),
                notice.title,
                notice.published_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    output
}

pub fn class_line(class: &ClassStatusEntry) -> String {
    let window = match (&class.start_minutes, &class.end_minutes) {
        (Some(start), Some(end)) => format!(" {}-{}", clock(*start), clock(*end)),
        _ => String::new(),
    };
    format!(
        "- P{}{} {} [{}]{}",
        class.entry.period,
        window,
        class.entry.course_name,
        class.status.label(),
        class
            .entry
            .room
            .as_deref()
            .map(|room| format!(" {room}"))
            .unwrap_or_default()
    )
}

fn clock(minutes: i32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
