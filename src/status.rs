use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::warn;
use uuid::Uuid;

use crate::calendar;
use crate::db::DataSource;
use crate::models::{
    AttendanceRoute, ClassStatus, ClassStatusEntry, NextClassPreview, PeriodTiming, TimetableEntry,
};
use crate::timings::PeriodTimingResolver;

/// Joins a teacher's timetable for one date with period timings and
/// attendance-marking existence, yielding a per-class status.
pub struct ClassStatusDeriver {
    source: Arc<dyn DataSource>,
    timings: Arc<PeriodTimingResolver>,
}

impl ClassStatusDeriver {
    pub fn new(source: Arc<dyn DataSource>, timings: Arc<PeriodTimingResolver>) -> Self {
        Self { source, timings }
    }

    /// Derives today's class list, ordered by period ascending. Returns an
    /// empty list on weekends, holidays, or when the timetable fetch fails.
    pub async fn derive_today_classes(
        &self,
        teacher_id: Uuid,
        academic_year_id: Uuid,
        date: NaiveDate,
        now: NaiveTime,
    ) -> Vec<ClassStatusEntry> {
        if !calendar::is_teaching_day(self.source.as_ref(), date).await {
            return Vec::new();
        }

        let entries = match self
            .source
            .fetch_timetable_entries(teacher_id, calendar::weekday_number(date), academic_year_id)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%teacher_id, %date, error = %err, "timetable fetch failed");
                return Vec::new();
            }
        };
        if entries.is_empty() {
            return Vec::new();
        }

        // One timing table per day, resolved for the first entry's
        // department. A mixed-department day gets a single department's
        // timings; timetables are assumed single-department per teacher.
        let org_unit = entries[0].department_id;
        let timings = self.timings.resolve(org_unit).await;

        let entry_ids: Vec<Uuid> = entries.iter().map(|entry| entry.id).collect();
        let marked = match self.source.fetch_attendance_existence(&entry_ids, date).await {
            Ok(set) => set,
            Err(err) => {
                warn!(%teacher_id, %date, error = %err, "attendance lookup failed");
                HashSet::new()
            }
        };

        let now_min = minutes_of(now);
        let mut classes: Vec<ClassStatusEntry> = entries
            .into_iter()
            .map(|entry| classify(entry, &timings, &marked, now_min))
            .collect();

        // Entries arrive period-sorted from the query, but re-sort after the
        // per-entry work so the ordering invariant never depends on it.
        classes.sort_by_key(|class| class.entry.period);
        classes
    }
}

pub fn minutes_of(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

/// Status precedence, first match wins:
/// current+unmarked, current, past+marked, past+unmarked, future, fallback.
fn classify(
    entry: TimetableEntry,
    timings: &[PeriodTiming],
    marked: &HashSet<Uuid>,
    now_min: i32,
) -> ClassStatusEntry {
    let timing = timings.iter().find(|timing| timing.period == entry.period);
    let start_minutes = timing.and_then(|timing| timing.start_minutes());
    let end_minutes = timing.and_then(|timing| timing.end_minutes());
    let has_marking = marked.contains(&entry.id);

    let is_current = matches!(
        (start_minutes, end_minutes),
        (Some(start), Some(end)) if start <= now_min && now_min <= end
    );
    let is_past = end_minutes.is_some_and(|end| now_min > end);

    let status = if is_current && !has_marking {
        ClassStatus::AttendancePending
    } else if is_current {
        ClassStatus::Ongoing
    } else if is_past && has_marking {
        ClassStatus::Completed
    } else if is_past {
        ClassStatus::AttendancePending
    } else {
        // Future classes and unresolved timings both read as upcoming.
        ClassStatus::Upcoming
    };

    let route = (status == ClassStatus::AttendancePending).then(|| AttendanceRoute {
        timetable_entry_id: entry.id,
        course_id: entry.course_id,
        year_id: entry.year_id,
        section_id: entry.section_id,
        programme_id: entry.programme_id,
        department_id: entry.department_id,
        period: entry.period,
    });

    ClassStatusEntry {
        entry,
        status,
        start_minutes,
        end_minutes,
        route,
    }
}

/// Picks the lowest-period upcoming class and computes minutes until it
/// starts. A negative or unresolvable start suppresses the preview.
pub fn next_class_preview(classes: &[ClassStatusEntry], now_min: i32) -> Option<NextClassPreview> {
    let next = classes
        .iter()
        .filter(|class| class.status == ClassStatus::Upcoming)
        .min_by_key(|class| class.entry.period)?;
    let start = next.start_minutes?;
    let starts_in_minutes = start - now_min;
    if starts_in_minutes < 0 {
        return None;
    }
    Some(NextClassPreview {
        period: next.entry.period,
        course_id: next.entry.course_id,
        course_name: next.entry.course_name.clone(),
        room: next.entry.room.clone(),
        starts_in_minutes,
    })
}
