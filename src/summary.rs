use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::db::DataSource;
use crate::models::{ClassStatus, DashboardSummary};
use crate::signals;
use crate::status::{self, ClassStatusDeriver};
use crate::timings::PeriodTimingResolver;

const SUMMARY_TTL_SECS: i64 = 60;
const PASS_TIMEOUT: Duration = Duration::from_secs(15);

/// Read-through, write-after cache around the full dashboard aggregation.
///
/// `get` serves the persisted slot at any staleness for
/// stale-while-revalidate callers; `refresh` runs at most one aggregation
/// pass at a time, with concurrent callers awaiting the in-flight pass and
/// re-reading the slot it wrote.
pub struct SummaryService {
    source: Arc<dyn DataSource>,
    deriver: ClassStatusDeriver,
    store: CacheStore,
    ttl: ChronoDuration,
    pass_timeout: Duration,
    clock: fn() -> DateTime<Local>,
    inflight: Mutex<()>,
}

impl SummaryService {
    pub fn new(source: Arc<dyn DataSource>, store: CacheStore) -> Self {
        Self::with_config(
            source,
            store,
            ChronoDuration::seconds(SUMMARY_TTL_SECS),
            PASS_TIMEOUT,
        )
    }

    pub fn with_config(
        source: Arc<dyn DataSource>,
        store: CacheStore,
        ttl: ChronoDuration,
        pass_timeout: Duration,
    ) -> Self {
        let timings = Arc::new(PeriodTimingResolver::new(source.clone()));
        let deriver = ClassStatusDeriver::new(source.clone(), timings);
        Self {
            source,
            deriver,
            store,
            ttl,
            pass_timeout,
            clock: Local::now,
            inflight: Mutex::new(()),
        }
    }

    /// Replaces the wall clock the aggregation pass reads. Class statuses
    /// depend on the local date and time of day, so tests pin it.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the cached summary at any staleness. Callers showing this
    /// value are expected to follow up with a non-forced `refresh`.
    pub fn get(&self, user_id: Uuid) -> Option<DashboardSummary> {
        self.store.read(user_id)
    }

    /// Returns a summary no older than the freshness window, running the
    /// aggregation when needed. A pass that fails outright falls back to the
    /// previous cached value when one exists.
    pub async fn refresh(&self, user_id: Uuid, force: bool) -> anyhow::Result<DashboardSummary> {
        let requested_at = Utc::now();

        if !force {
            if let Some(cached) = self.fresh_slot(user_id) {
                debug!(%user_id, "serving fresh cached summary");
                return Ok(cached);
            }
        }

        let _guard = self.inflight.lock().await;

        // A pass that completed while we waited on the guard covers this
        // request; re-read instead of aggregating again.
        if let Some(cached) = self.store.read(user_id) {
            if cached.cached_at >= requested_at {
                return Ok(cached);
            }
            if !force && self.is_fresh(&cached) {
                return Ok(cached);
            }
        }

        match tokio::time::timeout(self.pass_timeout, self.aggregate(user_id)).await {
            Ok(Ok(mut summary)) => {
                if let Some(previous) = self.store.read(user_id) {
                    if summary.cached_at <= previous.cached_at {
                        summary.cached_at = previous.cached_at + ChronoDuration::milliseconds(1);
                    }
                }
                if let Err(err) = self.store.write(user_id, &summary) {
                    warn!(%user_id, error = %err, "summary cache write failed");
                }
                Ok(summary)
            }
            Ok(Err(err)) => self.previous_or(user_id, err),
            Err(_) => self.previous_or(
                user_id,
                anyhow::anyhow!("aggregation pass timed out after {:?}", self.pass_timeout),
            ),
        }
    }

    fn previous_or(
        &self,
        user_id: Uuid,
        err: anyhow::Error,
    ) -> anyhow::Result<DashboardSummary> {
        warn!(%user_id, error = %err, "aggregation pass skipped");
        match self.store.read(user_id) {
            Some(previous) => Ok(previous),
            None => Err(err),
        }
    }

    fn fresh_slot(&self, user_id: Uuid) -> Option<DashboardSummary> {
        self.store.read(user_id).filter(|cached| self.is_fresh(cached))
    }

    fn is_fresh(&self, summary: &DashboardSummary) -> bool {
        Utc::now().signed_duration_since(summary.cached_at) < self.ttl
    }

    /// One full aggregation pass: resolve identity, then fan out the class
    /// deriver and the three signal aggregators concurrently and join on all
    /// of them. Sub-aggregator failures have already degraded to neutral
    /// values by the time the join completes.
    async fn aggregate(&self, user_id: Uuid) -> anyhow::Result<DashboardSummary> {
        let profile = self
            .source
            .fetch_teacher_profile(user_id)
            .await?
            .context("teacher profile not found")?;
        let year = self
            .source
            .current_academic_year()
            .await?
            .context("no current academic year")?;

        let local_now = (self.clock)();
        let date = local_now.date_naive();
        let time = local_now.time();

        let (today_classes, assignments, internal_marks, notices) = tokio::join!(
            self.deriver
                .derive_today_classes(profile.id, year.id, date, time),
            signals::assignment_backlog(self.source.as_ref(), profile.id, date),
            signals::internal_marks_backlog(self.source.as_ref(), profile.id, year.id, date),
            signals::notice_digest(
                self.source.as_ref(),
                user_id,
                profile.department_id,
                profile.is_head_of_department
            ),
        );

        let attendance_pending_count = today_classes
            .iter()
            .filter(|class| class.status == ClassStatus::AttendancePending)
            .count();
        let next_class = status::next_class_preview(&today_classes, status::minutes_of(time));
        let critical_alert =
            signals::critical_alert(attendance_pending_count, &internal_marks, &assignments);

        Ok(DashboardSummary {
            cached_at: Utc::now(),
            teacher_name: profile.full_name,
            today_classes,
            next_class,
            attendance_pending_count,
            assignments,
            internal_marks,
            notices,
            critical_alert,
        })
    }
}
