use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::db::DataSource;
use crate::models::{
    AlertKind, AssignmentBacklog, CriticalAlert, InternalMarksBacklog, Notice, NoticeDigest,
    NoticeScope,
};

const NOTICE_SCOPE_LIMIT: i64 = 25;
const NOTICE_UNREAD_WINDOW: usize = 50;
const IMPORTANT_NOTICE_COUNT: usize = 2;

/// Exam types that feed the internal-marks backlog.
const MARK_ENTRY_EXAM_TYPES: [&str; 2] = ["internal", "model"];

/// Counts submissions awaiting evaluation for the teacher's assignments. A
/// failed count degrades to `None` rather than failing the pass.
pub async fn assignment_backlog(
    source: &dyn DataSource,
    teacher_id: Uuid,
    today: NaiveDate,
) -> AssignmentBacklog {
    let to_evaluate = match source.count_unmarked_submissions(teacher_id).await {
        Ok(count) => Some(count),
        Err(err) => {
            warn!(%teacher_id, error = %err, "unmarked submission count failed");
            None
        }
    };

    let overdue = match source
        .count_unmarked_submissions_overdue(teacher_id, today)
        .await
    {
        Ok(count) => count > 0,
        Err(err) => {
            warn!(%teacher_id, error = %err, "overdue submission count failed");
            false
        }
    };

    AssignmentBacklog {
        to_evaluate,
        overdue,
    }
}

/// Resolves the most recently started published internal/model exam and
/// counts its unlocked schedules (for the teacher's courses) whose date has
/// arrived. `deadline_today` flags any unlocked schedule dated today.
pub async fn internal_marks_backlog(
    source: &dyn DataSource,
    teacher_id: Uuid,
    academic_year_id: Uuid,
    today: NaiveDate,
) -> InternalMarksBacklog {
    let exam = match source
        .fetch_latest_published_exam(academic_year_id, &MARK_ENTRY_EXAM_TYPES)
        .await
    {
        Ok(Some(exam)) => exam,
        Ok(None) => return InternalMarksBacklog::default(),
        Err(err) => {
            warn!(%teacher_id, error = %err, "exam lookup failed");
            return InternalMarksBacklog::default();
        }
    };

    let course_ids = match source
        .fetch_teacher_course_ids(teacher_id, academic_year_id)
        .await
    {
        Ok(ids) => ids,
        Err(err) => {
            warn!(%teacher_id, error = %err, "taught-course lookup failed");
            Vec::new()
        }
    };

    let schedules = match source.fetch_exam_schedules(exam.id, &course_ids).await {
        Ok(schedules) => schedules,
        Err(err) => {
            warn!(exam = %exam.id, error = %err, "exam schedule fetch failed");
            return InternalMarksBacklog {
                exam_name: Some(exam.name),
                pending: None,
                deadline_today: false,
            };
        }
    };

    let schedule_ids: Vec<Uuid> = schedules.iter().map(|schedule| schedule.id).collect();
    let locked = match source.fetch_locked_schedules(&schedule_ids).await {
        Ok(locked) => locked,
        Err(err) => {
            warn!(exam = %exam.id, error = %err, "schedule lock fetch failed");
            Default::default()
        }
    };

    let pending = schedules
        .iter()
        .filter(|schedule| schedule.date <= today && !locked.contains(&schedule.id))
        .count() as i64;
    let deadline_today = schedules
        .iter()
        .any(|schedule| schedule.date == today && !locked.contains(&schedule.id));

    InternalMarksBacklog {
        exam_name: Some(exam.name),
        pending: Some(pending),
        deadline_today,
    }
}

/// Pulls the scope-filtered notice feeds, keeps the two most recent as
/// "important" and diffs the recent window against the user's read receipts.
/// A head-of-department caller sees department-scope notices only.
pub async fn notice_digest(
    source: &dyn DataSource,
    user_id: Uuid,
    department_id: Option<Uuid>,
    is_head_of_department: bool,
) -> NoticeDigest {
    let scopes: &[(NoticeScope, Option<Uuid>)] = if is_head_of_department {
        &[(NoticeScope::Department, department_id)]
    } else {
        &[
            (NoticeScope::College, None),
            (NoticeScope::Exam, None),
            (NoticeScope::Department, department_id),
        ]
    };

    let mut candidates: Vec<Notice> = Vec::new();
    for (scope, department) in scopes.iter().copied() {
        match source.fetch_notices(scope, department, NOTICE_SCOPE_LIMIT).await {
            Ok(notices) => candidates.extend(notices),
            Err(err) => {
                warn!(scope = scope.as_str(), error = %err, "notice fetch failed");
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|notice| seen.insert(notice.id));
    candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let important = candidates
        .iter()
        .take(IMPORTANT_NOTICE_COUNT)
        .cloned()
        .collect();

    let recent: Vec<Uuid> = candidates
        .iter()
        .take(NOTICE_UNREAD_WINDOW)
        .map(|notice| notice.id)
        .collect();
    let unread_count = if recent.is_empty() {
        0
    } else {
        match source.fetch_notice_reads(user_id, &recent).await {
            Ok(read) => recent.iter().filter(|id| !read.contains(id)).count() as i64,
            Err(err) => {
                warn!(%user_id, error = %err, "notice read-receipt fetch failed");
                0
            }
        }
    };

    NoticeDigest {
        unread_count,
        important,
    }
}

/// Single-slot alert, first match wins: attendance pending beats a marks
/// deadline beats overdue assignment evaluation.
pub fn critical_alert(
    attendance_pending: usize,
    marks: &InternalMarksBacklog,
    assignments: &AssignmentBacklog,
) -> Option<CriticalAlert> {
    if attendance_pending > 0 {
        return Some(CriticalAlert {
            kind: AlertKind::Attendance,
            message: format!(
                "{} class{} waiting for attendance",
                attendance_pending,
                if attendance_pending == 1 { " is" } else { "es are" }
            ),
        });
    }
    if marks.deadline_today {
        let exam = marks.exam_name.as_deref().unwrap_or("internal exam");
        return Some(CriticalAlert {
            kind: AlertKind::MarksDeadline,
            message: format!("Mark entry for {exam} closes today"),
        });
    }
    if assignments.overdue {
        return Some(CriticalAlert {
            kind: AlertKind::AssignmentsOverdue,
            message: "Assignment evaluations are past their due date".to_string(),
        });
    }
    None
}
