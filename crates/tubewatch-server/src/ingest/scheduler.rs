//! Cron-driven fetch scheduling
//!
//! The fetcher runs once right away and then on every tick of the cron
//! schedule. With the overlap guard enabled a tick that fires while the
//! previous cycle is still running is skipped. A fatal fetch error (key pool
//! exhausted under fail-fast) stops the scheduler with that error.
//! Cancellation aborts any cycle still in flight.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::fetcher::{FetchError, Fetcher};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression {expr:?}: {source}")]
    InvalidCron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("Cron expression {0:?} never fires")]
    NoUpcoming(String),

    #[error("Fetching stopped: {0}")]
    Fatal(#[source] FetchError),
}

/// Parse a cron expression.
///
/// Five-field expressions (`min hour dom mon dow`) use standard cron
/// numbering for weekdays (0-6 from Sunday, 7 also Sunday). They get a `0`
/// seconds field prepended and numeric weekdays rewritten as day names.
/// Six and seven field expressions pass through unchanged.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ScheduleError> {
    let invalid = |source: cron::error::Error| ScheduleError::InvalidCron {
        expr: expr.to_string(),
        source,
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, dom, month, dow] => {
            let dow = weekday_names(dow).ok_or_else(|| {
                invalid(cron::error::Error::from(cron::error::ErrorKind::Expression(
                    format!("invalid day of week {dow:?}"),
                )))
            })?;
            format!("0 {minute} {hour} {dom} {month} {dow}")
        },
        _ => fields.join(" "),
    };

    Schedule::from_str(&normalized).map_err(invalid)
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Rewrite a standard day-of-week field as a list of day names. Parts that
/// already use names are kept as they are.
fn weekday_names(field: &str) -> Option<String> {
    if field == "*" || field == "?" {
        return Some(field.to_string());
    }

    let mut days: Vec<String> = Vec::new();
    for part in field.split(',') {
        if part.chars().any(|c| c.is_ascii_alphabetic()) {
            days.push(part.to_string());
            continue;
        }

        let (base, step) = match part.split_once('/') {
            Some((base, step)) => (base, Some(step.parse::<usize>().ok().filter(|s| *s > 0)?)),
            None => (part, None),
        };
        let (start, end) = match base.split_once('-') {
            _ if base == "*" => (0, 6),
            Some((a, b)) => (a.parse::<usize>().ok()?, b.parse::<usize>().ok()?),
            None => {
                let day = base.parse::<usize>().ok()?;
                (day, if step.is_some() { 6 } else { day })
            },
        };
        if start > end || end > 7 {
            return None;
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            let name = DAY_NAMES[day % 7].to_string();
            if !days.contains(&name) {
                days.push(name);
            }
        }
    }

    Some(days.join(","))
}

pub struct FetchScheduler {
    fetcher: Fetcher,
    schedule: Schedule,
    expression: String,
    prevent_overlap: bool,
    running: Arc<Mutex<()>>,
}

impl FetchScheduler {
    pub fn new(fetcher: Fetcher, expression: &str, prevent_overlap: bool) -> Result<Self, ScheduleError> {
        Ok(Self {
            fetcher,
            schedule: parse_schedule(expression)?,
            expression: expression.to_string(),
            prevent_overlap,
            running: Arc::new(Mutex::new(())),
        })
    }

    /// Run until cancelled or until a fatal fetch error occurs. Non-fatal
    /// errors are logged and the next tick proceeds normally. Cycles still in
    /// flight are aborted and awaited before this returns.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ScheduleError> {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<FetchError>(1);
        let mut cycles = JoinSet::new();

        tracing::info!(cron = %self.expression, overlap_guard = self.prevent_overlap, "Fetch scheduler started");
        self.trigger(&mut cycles, &fatal_tx);

        loop {
            let next = self
                .schedule
                .upcoming(Utc)
                .next()
                .ok_or_else(|| ScheduleError::NoUpcoming(self.expression.clone()))?;
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "Waiting for next fetch tick");

            tokio::select! {
                _ = cancel.cancelled() => {
                    cycles.shutdown().await;
                    tracing::info!("Fetch scheduler cancelled");
                    return Ok(());
                },
                _ = tokio::time::sleep(wait) => self.trigger(&mut cycles, &fatal_tx),
                Some(err) = fatal_rx.recv() => {
                    tracing::error!(error = %err, "Fatal fetch error, stopping scheduler");
                    cycles.shutdown().await;
                    return Err(ScheduleError::Fatal(err));
                },
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Fetch cycle panicked");
                        }
                    }
                },
            }
        }
    }

    fn trigger(&self, cycles: &mut JoinSet<()>, fatal_tx: &mpsc::Sender<FetchError>) {
        let guard = if self.prevent_overlap {
            match Arc::clone(&self.running).try_lock_owned() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    tracing::warn!("Previous fetch still running, skipping tick");
                    return;
                },
            }
        } else {
            None
        };

        let fetcher = self.fetcher.clone();
        let fatal_tx = fatal_tx.clone();
        cycles.spawn(async move {
            let _guard = guard;
            match fetcher.fetch_once().await {
                Ok(_) => {},
                Err(e) if e.is_fatal() => {
                    let _ = fatal_tx.send(e).await;
                },
                Err(e) => tracing::warn!(error = %e, "Fetch cycle failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::credentials::{CredentialRotator, ExhaustionPolicy};
    use crate::ingest::fetcher::FetcherSettings;
    use crate::ingest::memory::InMemoryStore;
    use crate::ingest::youtube::{SearchApi, SearchApiError, SearchPage, SearchRequest};
    use crate::queue::InMemoryQueue;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Search that never answers until released.
    #[derive(Default)]
    struct StalledSearch {
        calls: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl SearchApi for StalledSearch {
        async fn search(
            &self,
            _request: &SearchRequest,
            _api_key: &str,
        ) -> Result<SearchPage, SearchApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(SearchPage {
                next_page_token: None,
                items: vec![],
            })
        }
    }

    fn stalled_fetcher(search: Arc<StalledSearch>) -> Fetcher {
        let credentials =
            CredentialRotator::new(vec!["key-0".to_string()], ExhaustionPolicy::FailFast).unwrap();
        Fetcher::new(
            Arc::new(InMemoryStore::new()),
            search,
            Arc::new(InMemoryQueue::new()),
            Arc::new(credentials),
            FetcherSettings {
                keyword: "rust".to_string(),
                page_size: 10,
                lookback: chrono::Duration::hours(2),
                max_rotations: 3,
            },
        )
    }

    /// Run an every-second schedule against a stalled search for a few ticks
    /// and return how many cycles reached the API.
    async fn cycles_started(prevent_overlap: bool) -> (usize, Arc<StalledSearch>) {
        let search = Arc::new(StalledSearch::default());
        let scheduler =
            FetchScheduler::new(stalled_fetcher(search.clone()), "* * * * * *", prevent_overlap)
                .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let calls = search.calls.load(Ordering::SeqCst);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        (calls, search)
    }

    #[tokio::test]
    async fn test_overlap_guard_skips_ticks_while_running() {
        let (calls, _) = cycles_started(true).await;
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_ticks_overlap_without_guard() {
        let (calls, _) = cycles_started(false).await;
        assert!(calls >= 2, "expected overlapping cycles, got {calls}");
    }

    #[tokio::test]
    async fn test_cancel_aborts_cycles_in_flight() {
        let (_, search) = cycles_started(false).await;
        // Every stalled cycle held a clone of the fetcher; all must be gone.
        assert_eq!(Arc::strong_count(&search), 1);
    }

    #[test]
    fn test_parse_six_field() {
        let schedule = parse_schedule("0 */5 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_five_field_gets_seconds() {
        let schedule = parse_schedule("*/5 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.timestamp() % 60, 0);
        assert_eq!(next.format("%M").to_string().parse::<u32>().unwrap() % 5, 0);
    }

    fn fire_days(expr: &str, count: usize) -> Vec<String> {
        use chrono::TimeZone;
        // A Sunday
        let start = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        parse_schedule(expr)
            .unwrap()
            .after(&start)
            .take(count)
            .map(|t| t.format("%a").to_string())
            .collect()
    }

    #[test]
    fn test_five_field_weekdays_use_standard_numbering() {
        assert_eq!(fire_days("0 9 * * 1-5", 5), vec!["Mon", "Tue", "Wed", "Thu", "Fri"]);
        assert_eq!(fire_days("0 9 * * 0", 2), vec!["Sun", "Sun"]);
        assert_eq!(fire_days("0 9 * * 7", 1), vec!["Sun"]);
        assert_eq!(fire_days("0 9 * * 5-7", 3), vec!["Sun", "Fri", "Sat"]);
        assert_eq!(fire_days("0 9 * * */2", 4), vec!["Sun", "Tue", "Thu", "Sat"]);
    }

    #[test]
    fn test_five_field_named_weekdays_pass_through() {
        assert_eq!(fire_days("0 9 * * Mon,Wed", 2), vec!["Mon", "Wed"]);
    }

    #[test]
    fn test_five_field_weekday_out_of_range() {
        assert!(matches!(
            parse_schedule("0 9 * * 8"),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(parse_schedule("0 9 * * 5-2").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            parse_schedule("every tuesday"),
            Err(ScheduleError::InvalidCron { .. })
        ));
    }
}
