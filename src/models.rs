use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One class-period time window, ordered by `period`. `start`/`end` are
/// wall-clock strings in `HH:MM`; malformed values simply never match the
/// current time rather than erroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTiming {
    pub period: u32,
    pub start: String,
    pub end: String,
}

impl PeriodTiming {
    pub fn start_minutes(&self) -> Option<i32> {
        minutes_of_day(&self.start)
    }

    pub fn end_minutes(&self) -> Option<i32> {
        minutes_of_day(&self.end)
    }
}

/// Parses `HH:MM` into minutes since midnight. Returns `None` for anything
/// that does not look like a clock time.
pub fn minutes_of_day(value: &str) -> Option<i32> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: i32 = hours.trim().parse().ok()?;
    let minutes: i32 = minutes.get(..2).unwrap_or(minutes).trim().parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// A recurring weekly timetable slot. `day_of_week` is 1..=7 with Monday = 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub day_of_week: u8,
    pub period: u32,
    pub course_id: Uuid,
    pub course_name: String,
    pub year_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub programme_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub room: Option<String>,
    pub academic_year_id: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct TeacherProfile {
    pub id: Uuid,
    pub full_name: String,
    pub department_id: Option<Uuid>,
    pub is_head_of_department: bool,
}

#[derive(Debug, Clone)]
pub struct AcademicYear {
    pub id: Uuid,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Exam {
    pub id: Uuid,
    pub name: String,
    pub exam_type: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ExamSchedule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub scope: NoticeScope,
    pub department_id: Option<Uuid>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeScope {
    College,
    Exam,
    Department,
}

impl NoticeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeScope::College => "college",
            NoticeScope::Exam => "exam",
            NoticeScope::Department => "department",
        }
    }
}

/// Raw period-timing row as the data source returns it. The resolver
/// renumbers and reformats these; the remote `period` field is not trusted.
#[derive(Debug, Clone)]
pub struct PeriodTimingRow {
    pub period: u32,
    pub start: String,
    pub end: String,
    pub is_break: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    AttendancePending,
    Ongoing,
    Completed,
    Upcoming,
}

impl ClassStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ClassStatus::AttendancePending => "Attendance Pending",
            ClassStatus::Ongoing => "Ongoing",
            ClassStatus::Completed => "Completed",
            ClassStatus::Upcoming => "Upcoming",
        }
    }
}

/// Everything a caller needs to navigate straight into the attendance-marking
/// flow for one class occurrence. Attached only to Attendance Pending rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRoute {
    pub timetable_entry_id: Uuid,
    pub course_id: Uuid,
    pub year_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub programme_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub period: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassStatusEntry {
    pub entry: TimetableEntry,
    pub status: ClassStatus,
    pub start_minutes: Option<i32>,
    pub end_minutes: Option<i32>,
    pub route: Option<AttendanceRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextClassPreview {
    pub period: u32,
    pub course_id: Uuid,
    pub course_name: String,
    pub room: Option<String>,
    pub starts_in_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Attendance,
    MarksDeadline,
    AssignmentsOverdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub kind: AlertKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentBacklog {
    pub to_evaluate: Option<i64>,
    pub overdue: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalMarksBacklog {
    pub exam_name: Option<String>,
    pub pending: Option<i64>,
    pub deadline_today: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeDigest {
    pub unread_count: i64,
    pub important: Vec<Notice>,
}

/// The per-user derived summary. Replaced wholesale on every aggregation
/// pass; `cached_at` strictly increases across writes for the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub cached_at: DateTime<Utc>,
    pub teacher_name: String,
    pub today_classes: Vec<ClassStatusEntry>,
    pub next_class: Option<NextClassPreview>,
    pub attendance_pending_count: usize,
    pub assignments: AssignmentBacklog,
    pub internal_marks: InternalMarksBacklog,
    pub notices: NoticeDigest,
    pub critical_alert: Option<CriticalAlert>,
}
