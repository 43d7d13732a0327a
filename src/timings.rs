use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DataSource;
use crate::models::{PeriodTiming, PeriodTimingRow};

const TIMINGS_TTL: Duration = Duration::from_secs(5 * 60);

/// Loads and caches the ordered period time windows for an org unit.
///
/// The cache is keyed by org unit with a 5 minute freshness window. A failed
/// or empty fetch falls back to a fixed default table and deliberately skips
/// the cache write, so failures retry on every call while successes are
/// served from cache.
pub struct PeriodTimingResolver {
    source: Arc<dyn DataSource>,
    cache: Mutex<HashMap<Option<Uuid>, CachedTimings>>,
    ttl: Duration,
}

struct CachedTimings {
    timings: Vec<PeriodTiming>,
    fetched_at: Instant,
}

impl PeriodTimingResolver {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self::with_ttl(source, TIMINGS_TTL)
    }

    pub fn with_ttl(source: Arc<dyn DataSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn resolve(&self, org_unit: Option<Uuid>) -> Vec<PeriodTiming> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&org_unit) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.timings.clone();
                }
            }
        }

        match self.source.fetch_period_timings(org_unit).await {
            Ok(rows) if !rows.is_empty() => {
                let timings = normalize(rows);
                if timings.is_empty() {
                    debug!(?org_unit, "period timings were all break rows, using defaults");
                    return default_timings();
                }
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(
                        org_unit,
                        CachedTimings {
                            timings: timings.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                timings
            }
            Ok(_) => {
                debug!(?org_unit, "no period timings configured, using defaults");
                default_timings()
            }
            Err(err) => {
                warn!(?org_unit, error = %err, "period timing fetch failed, using defaults");
                default_timings()
            }
        }
    }
}

/// Drops break rows, renumbers the survivors sequentially from 1 (the remote
/// period number is not trusted) and truncates times to `HH:MM`.
fn normalize(rows: Vec<PeriodTimingRow>) -> Vec<PeriodTiming> {
    rows.into_iter()
        .filter(|row| !row.is_break)
        .enumerate()
        .map(|(index, row)| PeriodTiming {
            period: index as u32 + 1,
            start: truncate_clock(&row.start),
            end: truncate_clock(&row.end),
        })
        .collect()
}

fn truncate_clock(value: &str) -> String {
    value.get(..5).unwrap_or(value).to_string()
}

/// Fixed fallback schedule used whenever the remote table is unavailable.
pub fn default_timings() -> Vec<PeriodTiming> {
    [
        ("09:40", "10:35"),
        ("10:50", "11:40"),
        ("11:50", "12:45"),
        ("13:25", "14:15"),
        ("14:20", "15:10"),
    ]
    .iter()
    .enumerate()
    .map(|(index, (start, end))| PeriodTiming {
        period: index as u32 + 1,
        start: start.to_string(),
        end: end.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeSource;
    use std::sync::atomic::Ordering;

    fn row(period: u32, start: &str, end: &str, is_break: bool) -> PeriodTimingRow {
        PeriodTimingRow {
            period,
            start: start.to_string(),
            end: end.to_string(),
            is_break,
        }
    }

    #[tokio::test]
    async fn breaks_are_dropped_and_periods_renumbered() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timing_rows = vec![
            row(1, "09:40:00", "10:35:00", false),
            row(2, "10:35:00", "10:50:00", true),
            row(3, "10:50:00", "11:40:00", false),
        ];

        let resolver = PeriodTimingResolver::new(source);
        let timings = resolver.resolve(None).await;

        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].period, 1);
        assert_eq!(timings[0].start, "09:40");
        assert_eq!(timings[1].period, 2);
        assert_eq!(timings[1].start, "10:50");
        assert_eq!(timings[1].end, "11:40");
    }

    #[tokio::test]
    async fn fetch_failure_returns_the_fixed_default_table() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timings_fail = true;

        let resolver = PeriodTimingResolver::new(source);
        let timings = resolver.resolve(None).await;

        assert_eq!(timings, default_timings());
        assert_eq!(timings[0].start, "09:40");
        assert_eq!(timings[4].end, "15:10");
    }

    #[tokio::test]
    async fn fallback_is_not_cached_so_recovery_is_immediate() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timings_fail = true;

        let resolver = PeriodTimingResolver::new(source.clone());
        assert_eq!(resolver.resolve(None).await, default_timings());

        {
            let mut state = source.state.lock().unwrap();
            state.timings_fail = false;
            state.timing_rows = vec![row(1, "08:00:00", "09:00:00", false)];
        }

        let timings = resolver.resolve(None).await;
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].start, "08:00");
        assert_eq!(source.calls.timings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn successful_fetch_is_cached_within_the_window() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timing_rows = vec![row(1, "08:00:00", "09:00:00", false)];

        let resolver = PeriodTimingResolver::new(source.clone());
        resolver.resolve(None).await;
        resolver.resolve(None).await;
        resolver.resolve(None).await;

        assert_eq!(source.calls.timings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_is_keyed_per_org_unit() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timing_rows = vec![row(1, "08:00:00", "09:00:00", false)];

        let resolver = PeriodTimingResolver::new(source.clone());
        let a = Some(Uuid::new_v4());
        let b = Some(Uuid::new_v4());

        resolver.resolve(a).await;
        resolver.resolve(b).await;
        resolver.resolve(a).await;

        assert_eq!(source.calls.timings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let source = Arc::new(FakeSource::default());
        source.state.lock().unwrap().timing_rows = vec![row(1, "08:00:00", "09:00:00", false)];

        let resolver = PeriodTimingResolver::with_ttl(source.clone(), Duration::ZERO);
        resolver.resolve(None).await;
        resolver.resolve(None).await;

        assert_eq!(source.calls.timings.load(Ordering::SeqCst), 2);
    }
}
