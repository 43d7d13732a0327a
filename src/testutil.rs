//! In-memory `DataSource` fake shared by the unit tests. State is mutable
//! behind a mutex so tests can reconfigure responses mid-flight; call
//! counters make fetch de-duplication observable.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::DataSource;
use crate::models::{
    AcademicYear, Exam, ExamSchedule, Notice, NoticeScope, PeriodTimingRow, TeacherProfile,
    TimetableEntry,
};

#[derive(Default)]
pub struct FakeState {
    pub profile: Option<TeacherProfile>,
    pub profile_fails: bool,
    pub profile_delay: Option<Duration>,
    pub academic_year: Option<AcademicYear>,
    pub timetable: Vec<TimetableEntry>,
    pub timetable_fails: bool,
    pub attendance: HashSet<Uuid>,
    pub holidays: HashSet<NaiveDate>,
    pub holidays_fail: bool,
    pub timing_rows: Vec<PeriodTimingRow>,
    pub timings_fail: bool,
    pub unmarked: i64,
    pub unmarked_overdue: i64,
    pub assignments_fail: bool,
    pub exam: Option<Exam>,
    pub course_ids: Vec<Uuid>,
    pub schedules: Vec<ExamSchedule>,
    pub locked: HashSet<Uuid>,
    pub notices: Vec<Notice>,
    pub notice_reads: HashSet<Uuid>,
}

#[derive(Default)]
pub struct Calls {
    pub profile: AtomicUsize,
    pub timetable: AtomicUsize,
    pub attendance: AtomicUsize,
    pub timings: AtomicUsize,
    pub notices: AtomicUsize,
    pub notice_reads: AtomicUsize,
}

#[derive(Default)]
pub struct FakeSource {
    pub state: Mutex<FakeState>,
    pub calls: Calls,
}

pub fn entry_for(teacher_id: Uuid, academic_year_id: Uuid, day: u8, period: u32) -> TimetableEntry {
    TimetableEntry {
        id: Uuid::new_v4(),
        teacher_id,
        day_of_week: day,
        period,
        course_id: Uuid::new_v4(),
        course_name: format!("Course P{period}"),
        year_id: Some(Uuid::new_v4()),
        section_id: Some(Uuid::new_v4()),
        programme_id: None,
        department_id: Some(Uuid::new_v4()),
        room: Some(format!("R-{period}")),
        academic_year_id,
        is_active: true,
    }
}

pub fn notice_at(scope: NoticeScope, department_id: Option<Uuid>, hours_ago: i64) -> Notice {
    Notice {
        id: Uuid::new_v4(),
        title: format!("Notice {hours_ago}h ago"),
        scope,
        department_id,
        published_at: Utc::now() - ChronoDuration::hours(hours_ago),
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch_teacher_profile(&self, user_id: Uuid) -> anyhow::Result<Option<TeacherProfile>> {
        self.calls.profile.fetch_add(1, Ordering::SeqCst);
        let (fails, delay, profile) = {
            let state = self.state.lock().unwrap();
            (
                state.profile_fails,
                state.profile_delay,
                state.profile.clone(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fails {
            anyhow::bail!("fake profile fetch failure");
        }
        Ok(profile.filter(|profile| profile.id == user_id))
    }

    async fn current_academic_year(&self) -> anyhow::Result<Option<AcademicYear>> {
        Ok(self.state.lock().unwrap().academic_year.clone())
    }

    async fn fetch_timetable_entries(
        &self,
        teacher_id: Uuid,
        day_of_week: u8,
        academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<TimetableEntry>> {
        self.calls.timetable.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.timetable_fails {
            anyhow::bail!("fake timetable fetch failure");
        }
        Ok(state
            .timetable
            .iter()
            .filter(|entry| {
                entry.teacher_id == teacher_id
                    && entry.day_of_week == day_of_week
                    && entry.academic_year_id == academic_year_id
                    && entry.is_active
            })
            .cloned()
            .collect())
    }

    async fn fetch_attendance_existence(
        &self,
        entry_ids: &[Uuid],
        _date: NaiveDate,
    ) -> anyhow::Result<HashSet<Uuid>> {
        self.calls.attendance.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(entry_ids
            .iter()
            .filter(|id| state.attendance.contains(id))
            .copied()
            .collect())
    }

    async fn holiday_exists(&self, date: NaiveDate) -> anyhow::Result<bool> {
        let state = self.state.lock().unwrap();
        if state.holidays_fail {
            anyhow::bail!("fake holiday lookup failure");
        }
        Ok(state.holidays.contains(&date))
    }

    async fn fetch_period_timings(
        &self,
        _org_unit: Option<Uuid>,
    ) -> anyhow::Result<Vec<PeriodTimingRow>> {
        self.calls.timings.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.timings_fail {
            anyhow::bail!("fake timing fetch failure");
        }
        Ok(state.timing_rows.clone())
    }

    async fn count_unmarked_submissions(&self, _teacher_id: Uuid) -> anyhow::Result<i64> {
        let state = self.state.lock().unwrap();
        if state.assignments_fail {
            anyhow::bail!("fake submission count failure");
        }
        Ok(state.unmarked)
    }

    async fn count_unmarked_submissions_overdue(
        &self,
        _teacher_id: Uuid,
        _today: NaiveDate,
    ) -> anyhow::Result<i64> {
        let state = self.state.lock().unwrap();
        if state.assignments_fail {
            anyhow::bail!("fake overdue count failure");
        }
        Ok(state.unmarked_overdue)
    }

    async fn fetch_latest_published_exam(
        &self,
        _academic_year_id: Uuid,
        exam_types: &[&str],
    ) -> anyhow::Result<Option<Exam>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .exam
            .clone()
            .filter(|exam| exam_types.contains(&exam.exam_type.as_str())))
    }

    async fn fetch_teacher_course_ids(
        &self,
        _teacher_id: Uuid,
        _academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<Uuid>> {
        Ok(self.state.lock().unwrap().course_ids.clone())
    }

    async fn fetch_exam_schedules(
        &self,
        _exam_id: Uuid,
        course_ids: &[Uuid],
    ) -> anyhow::Result<Vec<ExamSchedule>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .schedules
            .iter()
            .filter(|schedule| course_ids.contains(&schedule.course_id))
            .cloned()
            .collect())
    }

    async fn fetch_locked_schedules(
        &self,
        schedule_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(schedule_ids
            .iter()
            .filter(|id| state.locked.contains(id))
            .copied()
            .collect())
    }

    async fn fetch_notices(
        &self,
        scope: NoticeScope,
        department_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notice>> {
        self.calls.notices.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .notices
            .iter()
            .filter(|notice| {
                notice.scope == scope
                    && department_id.map_or(true, |dept| notice.department_id == Some(dept))
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_notice_reads(
        &self,
        _user_id: Uuid,
        notice_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>> {
        self.calls.notice_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(notice_ids
            .iter()
            .filter(|id| state.notice_reads.contains(id))
            .copied()
            .collect())
    }
}
