use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AcademicYear, Exam, ExamSchedule, Notice, NoticeScope, PeriodTimingRow, TeacherProfile,
    TimetableEntry,
};

/// The logical read operations the aggregation core depends on. Every method
/// returns a typed record; row shapes are pinned down at this boundary.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_teacher_profile(&self, user_id: Uuid) -> anyhow::Result<Option<TeacherProfile>>;

    async fn current_academic_year(&self) -> anyhow::Result<Option<AcademicYear>>;

    async fn fetch_timetable_entries(
        &self,
        teacher_id: Uuid,
        day_of_week: u8,
        academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<TimetableEntry>>;

    async fn fetch_attendance_existence(
        &self,
        entry_ids: &[Uuid],
        date: NaiveDate,
    ) -> anyhow::Result<HashSet<Uuid>>;

    async fn holiday_exists(&self, date: NaiveDate) -> anyhow::Result<bool>;

    async fn fetch_period_timings(
        &self,
        org_unit: Option<Uuid>,
    ) -> anyhow::Result<Vec<PeriodTimingRow>>;

    async fn count_unmarked_submissions(&self, teacher_id: Uuid) -> anyhow::Result<i64>;

    async fn count_unmarked_submissions_overdue(
        &self,
        teacher_id: Uuid,
        today: NaiveDate,
    ) -> anyhow::Result<i64>;

    async fn fetch_latest_published_exam(
        &self,
        academic_year_id: Uuid,
        exam_types: &[&str],
    ) -> anyhow::Result<Option<Exam>>;

    async fn fetch_teacher_course_ids(
        &self,
        teacher_id: Uuid,
        academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<Uuid>>;

    async fn fetch_exam_schedules(
        &self,
        exam_id: Uuid,
        course_ids: &[Uuid],
    ) -> anyhow::Result<Vec<ExamSchedule>>;

    async fn fetch_locked_schedules(
        &self,
        schedule_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>>;

    async fn fetch_notices(
        &self,
        scope: NoticeScope,
        department_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notice>>;

    async fn fetch_notice_reads(
        &self,
        user_id: Uuid,
        notice_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>>;
}

pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn fetch_teacher_profile(&self, user_id: Uuid) -> anyhow::Result<Option<TeacherProfile>> {
        let row = sqlx::query(
            "SELECT id, full_name, department_id, is_head_of_department \
             FROM teacher_dashboard.teachers WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TeacherProfile {
            id: row.get("id"),
            full_name: row.get("full_name"),
            department_id: row.get("department_id"),
            is_head_of_department: row.get("is_head_of_department"),
        }))
    }

    async fn current_academic_year(&self) -> anyhow::Result<Option<AcademicYear>> {
        let row = sqlx::query(
            "SELECT id, label FROM teacher_dashboard.academic_years WHERE is_current LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AcademicYear {
            id: row.get("id"),
            label: row.get("label"),
        }))
    }

    async fn fetch_timetable_entries(
        &self,
        teacher_id: Uuid,
        day_of_week: u8,
        academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<TimetableEntry>> {
        let rows = sqlx::query(
            "SELECT t.id, t.teacher_id, t.day_of_week, t.period, t.course_id, \
             c.name AS course_name, t.year_id, t.section_id, t.programme_id, \
             t.department_id, t.room, t.academic_year_id, t.is_active \
             FROM teacher_dashboard.timetable_entries t \
             JOIN teacher_dashboard.courses c ON c.id = t.course_id \
             WHERE t.teacher_id = $1 AND t.day_of_week = $2 \
             AND t.academic_year_id = $3 AND t.is_active \
             ORDER BY t.period",
        )
        .bind(teacher_id)
        .bind(day_of_week as i16)
        .bind(academic_year_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(TimetableEntry {
                id: row.get("id"),
                teacher_id: row.get("teacher_id"),
                day_of_week: row.get::<i16, _>("day_of_week") as u8,
                period: row.get::<i32, _>("period") as u32,
                course_id: row.get("course_id"),
                course_name: row.get("course_name"),
                year_id: row.get("year_id"),
                section_id: row.get("section_id"),
                programme_id: row.get("programme_id"),
                department_id: row.get("department_id"),
                room: row.get("room"),
                academic_year_id: row.get("academic_year_id"),
                is_active: row.get("is_active"),
            });
        }
        Ok(entries)
    }

    async fn fetch_attendance_existence(
        &self,
        entry_ids: &[Uuid],
        date: NaiveDate,
    ) -> anyhow::Result<HashSet<Uuid>> {
        if entry_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT timetable_entry_id FROM teacher_dashboard.attendance_markings \
             WHERE timetable_entry_id = ANY($1) AND date = $2",
        )
        .bind(entry_ids)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get("timetable_entry_id"))
            .collect())
    }

    async fn holiday_exists(&self, date: NaiveDate) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM teacher_dashboard.holidays WHERE date = $1) AS present",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("present"))
    }

    async fn fetch_period_timings(
        &self,
        org_unit: Option<Uuid>,
    ) -> anyhow::Result<Vec<PeriodTimingRow>> {
        let rows = sqlx::query(
            "SELECT period, start_time, end_time, is_break \
             FROM teacher_dashboard.period_timings \
             WHERE $1::uuid IS NULL OR department_id = $1 \
             ORDER BY period",
        )
        .bind(org_unit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PeriodTimingRow {
                period: row.get::<i32, _>("period") as u32,
                start: row
                    .get::<NaiveTime, _>("start_time")
                    .format("%H:%M:%S")
                    .to_string(),
                end: row
                    .get::<NaiveTime, _>("end_time")
                    .format("%H:%M:%S")
                    .to_string(),
                is_break: row.get("is_break"),
            })
            .collect())
    }

    async fn count_unmarked_submissions(&self, teacher_id: Uuid) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending \
             FROM teacher_dashboard.assignment_submissions s \
             JOIN teacher_dashboard.assignments a ON a.id = s.assignment_id \
             WHERE a.teacher_id = $1 AND s.mark IS NULL",
        )
        .bind(teacher_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("pending"))
    }

    async fn count_unmarked_submissions_overdue(
        &self,
        teacher_id: Uuid,
        today: NaiveDate,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending \
             FROM teacher_dashboard.assignment_submissions s \
             JOIN teacher_dashboard.assignments a ON a.id = s.assignment_id \
             WHERE a.teacher_id = $1 AND s.mark IS NULL AND a.due_date < $2",
        )
        .bind(teacher_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("pending"))
    }

    async fn fetch_latest_published_exam(
        &self,
        academic_year_id: Uuid,
        exam_types: &[&str],
    ) -> anyhow::Result<Option<Exam>> {
        let types: Vec<String> = exam_types.iter().map(|t| t.to_string()).collect();
        let row = sqlx::query(
            "SELECT id, name, exam_type, start_date FROM teacher_dashboard.exams \
             WHERE academic_year_id = $1 AND is_published AND exam_type = ANY($2) \
             ORDER BY start_date DESC LIMIT 1",
        )
        .bind(academic_year_id)
        .bind(&types)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Exam {
            id: row.get("id"),
            name: row.get("name"),
            exam_type: row.get("exam_type"),
            start_date: row.get("start_date"),
        }))
    }

    async fn fetch_teacher_course_ids(
        &self,
        teacher_id: Uuid,
        academic_year_id: Uuid,
    ) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT DISTINCT course_id FROM teacher_dashboard.timetable_entries \
             WHERE teacher_id = $1 AND academic_year_id = $2 AND is_active",
        )
        .bind(teacher_id)
        .bind(academic_year_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("course_id")).collect())
    }

    async fn fetch_exam_schedules(
        &self,
        exam_id: Uuid,
        course_ids: &[Uuid],
    ) -> anyhow::Result<Vec<ExamSchedule>> {
        if course_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, course_id, date FROM teacher_dashboard.exam_schedules \
             WHERE exam_id = $1 AND course_id = ANY($2) ORDER BY date",
        )
        .bind(exam_id)
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ExamSchedule {
                id: row.get("id"),
                course_id: row.get("course_id"),
                date: row.get("date"),
            })
            .collect())
    }

    async fn fetch_locked_schedules(
        &self,
        schedule_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>> {
        if schedule_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT schedule_id FROM teacher_dashboard.exam_schedule_locks \
             WHERE schedule_id = ANY($1)",
        )
        .bind(schedule_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("schedule_id")).collect())
    }

    async fn fetch_notices(
        &self,
        scope: NoticeScope,
        department_id: Option<Uuid>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notice>> {
        let rows = sqlx::query(
            "SELECT id, title, scope, department_id, published_at \
             FROM teacher_dashboard.notices \
             WHERE scope = $1 AND ($2::uuid IS NULL OR department_id = $2) \
             ORDER BY published_at DESC LIMIT $3",
        )
        .bind(scope.as_str())
        .bind(department_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Notice {
                id: row.get("id"),
                title: row.get("title"),
                scope,
                department_id: row.get("department_id"),
                published_at: row.get("published_at"),
            })
            .collect())
    }

    async fn fetch_notice_reads(
        &self,
        user_id: Uuid,
        notice_ids: &[Uuid],
    ) -> anyhow::Result<HashSet<Uuid>> {
        if notice_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT notice_id FROM teacher_dashboard.notice_reads \
             WHERE user_id = $1 AND notice_id = ANY($2)",
        )
        .bind(user_id)
        .bind(notice_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("notice_id")).collect())
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Loads a small but realistic dataset: one department, one current academic
/// year, a teacher with a weekly timetable, period timings, an internal exam
/// with schedules, an assignment with ungraded submissions, and notices.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let department_id = Uuid::parse_str("7b1c9a44-6f0e-4f83-9d2a-5a1f0c9e2b11")?;
    let academic_year_id = Uuid::parse_str("c3a8e1d0-4b7f-4e2a-8c6d-9f0b1a2c3d4e")?;
    let teacher_id = Uuid::parse_str("f2d4b6a8-1c3e-4f5a-9b8d-7e6c5a4b3d2f")?;

    sqlx::query(
        r#"
        INSERT INTO teacher_dashboard.departments (id, name)
        VALUES ($1, 'Computer Science')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(department_id)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO teacher_dashboard.academic_years (id, label, is_current)
        VALUES ($1, '2026-27', TRUE)
        ON CONFLICT (id) DO UPDATE SET is_current = TRUE
        "#,
    )
    .bind(academic_year_id)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO teacher_dashboard.teachers (id, full_name, department_id, is_head_of_department)
        VALUES ($1, 'Meera Nair', $2, FALSE)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(teacher_id)
    .bind(department_id)
    .execute(pool)
    .await?;

    let courses = vec![
        (
            Uuid::parse_str("a1b2c3d4-0001-4000-8000-000000000001")?,
            "Data Structures",
        ),
        (
            Uuid::parse_str("a1b2c3d4-0002-4000-8000-000000000002")?,
            "Operating Systems",
        ),
        (
            Uuid::parse_str("a1b2c3d4-0003-4000-8000-000000000003")?,
            "Compiler Design",
        ),
    ];

    for (id, name) in &courses {
        sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.courses (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let timings = vec![
        (1, "09:40", "10:35", false),
        (2, "10:35", "10:50", true),
        (3, "10:50", "11:40", false),
        (4, "11:50", "12:45", false),
        (5, "13:25", "14:15", false),
        (6, "14:20", "15:10", false),
    ];

    for (period, start, end, is_break) in timings {
        sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.period_timings
            (id, department_id, period, start_time, end_time, is_break)
            VALUES ($1, $2, $3, $4::time, $5::time, $6)
            ON CONFLICT (department_id, period) DO UPDATE
            SET start_time = EXCLUDED.start_time, end_time = EXCLUDED.end_time
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(department_id)
        .bind(period)
        .bind(start)
        .bind(end)
        .bind(is_break)
        .execute(pool)
        .await?;
    }

    // Monday through Friday, periods 1-3, cycling over the three courses.
    for day in 1..=5i16 {
        for period in 1..=3i32 {
            let course = &courses[((day as i32 + period) % 3) as usize];
            sqlx::query(
                r#"
                INSERT INTO teacher_dashboard.timetable_entries
                (id, teacher_id, day_of_week, period, course_id, department_id,
                 room, academic_year_id, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
                ON CONFLICT (teacher_id, day_of_week, period, academic_year_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(teacher_id)
            .bind(day)
            .bind(period)
            .bind(course.0)
            .bind(department_id)
            .bind(format!("CS-{}0{}", day, period))
            .bind(academic_year_id)
            .execute(pool)
            .await?;
        }
    }

    let exam_id = Uuid::parse_str("e5f6a7b8-0001-4000-8000-00000000000e")?;
    sqlx::query(
        r#"
        INSERT INTO teacher_dashboard.exams
        (id, academic_year_id, name, exam_type, start_date, is_published)
        VALUES ($1, $2, 'Internal Assessment I', 'internal', CURRENT_DATE - 7, TRUE)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(exam_id)
    .bind(academic_year_id)
    .execute(pool)
    .await?;

    for (offset, (course_id, _)) in courses.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.exam_schedules (id, exam_id, course_id, date)
            VALUES ($1, $2, $3, CURRENT_DATE + $4)
            ON CONFLICT (exam_id, course_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(exam_id)
        .bind(course_id)
        .bind(offset as i32 - 1)
        .execute(pool)
        .await?;
    }

    let assignment_id = Uuid::parse_str("b9c0d1e2-0001-4000-8000-00000000000b")?;
    sqlx::query(
        r#"
        INSERT INTO teacher_dashboard.assignments (id, teacher_id, course_id, title, due_date)
        VALUES ($1, $2, $3, 'AVL Trees Problem Set', CURRENT_DATE - 2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(assignment_id)
    .bind(teacher_id)
    .bind(courses[0].0)
    .execute(pool)
    .await?;

    for _ in 0..4 {
        sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.assignment_submissions
            (id, assignment_id, submitted_at, mark)
            VALUES ($1, $2, NOW(), NULL)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assignment_id)
        .execute(pool)
        .await?;
    }

    let notices = vec![
        ("Annual sports day schedule", "college", None),
        ("Internal exam hall allocation", "exam", None),
        ("CS department meeting Friday", "department", Some(department_id)),
    ];

    for (title, scope, dept) in notices {
        sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.notices (id, title, scope, department_id, published_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(scope)
        .bind(dept)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Upserts holiday rows from a CSV with `date,name` columns.
pub async fn import_holidays_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        date: NaiveDate,
        name: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let result = sqlx::query(
            r#"
            INSERT INTO teacher_dashboard.holidays (id, date, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.date)
        .bind(&row.name)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
