//! Background refresh loop
//!
//! One task owns the [`CachePublisher`] and cycles through
//! `Fetching -> Scoring -> Publishing -> Waiting`, dropping into `Backoff`
//! whenever the fetch or the scoring fails. Failures never end the loop;
//! only the shutdown signal does.

use chrono::{DateTime, Utc};
use msense_core::{
    CacheEntry, CachePublisher, FailureKind, ScoreVector, Scorer, StaleReason, TelemetrySource,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Refresh loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefreshState {
    Fetching,
    Scoring,
    Publishing,
    Waiting,
    Backoff,
}

impl RefreshState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Scoring => "scoring",
            Self::Publishing => "publishing",
            Self::Waiting => "waiting",
            Self::Backoff => "backoff",
        }
    }
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn allowed_transitions(from: RefreshState) -> Vec<RefreshState> {
    use RefreshState::{Backoff, Fetching, Publishing, Scoring, Waiting};
    match from {
        Fetching => vec![Scoring, Backoff],
        Scoring => vec![Publishing, Backoff],
        Publishing => vec![Waiting],
        Waiting | Backoff => vec![Fetching],
    }
}

#[must_use]
pub fn is_allowed(from: RefreshState, to: RefreshState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Result of one refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Fresh scores were published
    Published {
        scores: ScoreVector,
        timestamp: DateTime<Utc>,
    },
    /// The cycle failed; `republished` is false when the cache already held
    /// a stale entry with the same reason
    Failed {
        failure: FailureKind,
        republished: bool,
    },
}

impl CycleOutcome {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Hook notified as the loop runs
pub trait RefreshObserver: Send + Sync {
    /// Called on entry to every state
    fn on_state(&self, state: RefreshState);

    /// Called once per completed cycle
    fn on_cycle(&self, _outcome: &CycleOutcome) {}
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub stale_publishes: u64,
    pub last_success: Option<DateTime<Utc>>,
}

/// Owns the only publisher and drives the refresh cycle
pub struct Refresher<S, C> {
    publisher: CachePublisher,
    source: S,
    scorer: C,
    refresh_interval: Duration,
    retry_interval: Duration,
    observer: Option<Arc<dyn RefreshObserver>>,
    state: Option<RefreshState>,
    summary: RefreshSummary,
}

impl<S, C> fmt::Debug for Refresher<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refresher")
            .field("refresh_interval", &self.refresh_interval)
            .field("retry_interval", &self.retry_interval)
            .field("state", &self.state)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl<S: TelemetrySource, C: Scorer> Refresher<S, C> {
    /// Create with the default 300 s refresh and 60 s retry intervals
    pub fn new(publisher: CachePublisher, source: S, scorer: C) -> Self {
        Self {
            publisher,
            source,
            scorer,
            refresh_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(60),
            observer: None,
            state: None,
            summary: RefreshSummary::default(),
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, refresh: Duration, retry: Duration) -> Self {
        self.refresh_interval = refresh;
        self.retry_interval = retry;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run until `shutdown` turns true or its sender is dropped
    ///
    /// The signal is checked before every state entry and interrupts the
    /// sleep of `Waiting` or `Backoff`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RefreshSummary {
        tracing::info!(
            "Background refresher started: source {}, refresh {:?}, retry {:?}",
            self.source.describe(),
            self.refresh_interval,
            self.retry_interval
        );

        while !stopping(&shutdown) {
            let Some(outcome) = self.cycle(&shutdown).await else {
                break;
            };
            self.record(&outcome);

            let (next, delay) = if outcome.is_success() {
                (RefreshState::Waiting, self.refresh_interval)
            } else {
                (RefreshState::Backoff, self.retry_interval)
            };
            if stopping(&shutdown) {
                break;
            }
            self.enter(next);
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        tracing::info!(
            "Background refresher stopped after {} cycles ({} ok, {} failed)",
            self.summary.cycles,
            self.summary.successes,
            self.summary.failures
        );
        self.summary
    }

    /// One pass from `Fetching` to just before `Waiting` or `Backoff`
    ///
    /// `None` if shutdown was requested mid-cycle.
    async fn cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Option<CycleOutcome> {
        self.enter(RefreshState::Fetching);
        let features = match self.source.fetch().await {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!("Fetch failed: {}", e);
                return Some(self.fail(e.kind()));
            }
        };

        if stopping(shutdown) {
            return None;
        }
        self.enter(RefreshState::Scoring);
        let scores = match self.scorer.score(&features) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::error!("Scoring failed: {}", e);
                return Some(self.fail(e.kind()));
            }
        };

        if stopping(shutdown) {
            return None;
        }
        self.enter(RefreshState::Publishing);
        Some(self.publish_fresh(scores))
    }

    fn publish_fresh(&mut self, scores: ScoreVector) -> CycleOutcome {
        let mut timestamp = Utc::now();
        if let Some(prev) = self.summary.last_success {
            if timestamp <= prev {
                timestamp = prev + chrono::Duration::milliseconds(1);
            }
        }
        self.publisher.publish(CacheEntry::fresh(scores, timestamp));
        self.summary.last_success = Some(timestamp);
        tracing::info!("Updated predictions: {:?}", scores.values());
        CycleOutcome::Published { scores, timestamp }
    }

    fn fail(&mut self, failure: FailureKind) -> CycleOutcome {
        let reason = StaleReason::from(failure);
        let redundant = self.publisher.current().stale_reason() == Some(reason);
        if !redundant {
            self.publisher
                .publish(CacheEntry::stale(failure, self.summary.last_success));
            self.summary.stale_publishes += 1;
        }
        CycleOutcome::Failed {
            failure,
            republished: !redundant,
        }
    }

    fn record(&mut self, outcome: &CycleOutcome) {
        self.summary.cycles += 1;
        match outcome {
            CycleOutcome::Published { .. } => self.summary.successes += 1,
            CycleOutcome::Failed { failure, republished } => {
                self.summary.failures += 1;
                tracing::debug!(
                    "Cycle {} failed ({}), stale published: {}",
                    self.summary.cycles,
                    failure,
                    republished
                );
            }
        }
        if let Some(observer) = &self.observer {
            observer.on_cycle(outcome);
        }
    }

    fn enter(&mut self, to: RefreshState) {
        debug_assert!(
            self.state
                .map_or(to == RefreshState::Fetching, |from| is_allowed(from, to)),
            "illegal refresh transition {:?} -> {:?}",
            self.state,
            to
        );
        tracing::trace!("Refresher state: {}", to);
        self.state = Some(to);
        if let Some(observer) = &self.observer {
            observer.on_state(to);
        }
    }
}

fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `delay`; `true` if shutdown arrived first
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RefreshState; 5] = [
        RefreshState::Fetching,
        RefreshState::Scoring,
        RefreshState::Publishing,
        RefreshState::Waiting,
        RefreshState::Backoff,
    ];

    #[test]
    fn every_state_has_a_way_forward() {
        for from in ALL {
            assert!(!allowed_transitions(from).is_empty(), "{from}");
        }
    }

    #[test]
    fn sleeps_only_lead_back_to_fetching() {
        assert_eq!(allowed_transitions(RefreshState::Waiting), vec![RefreshState::Fetching]);
        assert_eq!(allowed_transitions(RefreshState::Backoff), vec![RefreshState::Fetching]);
    }

    #[test]
    fn publishing_is_reached_only_through_scoring() {
        for from in ALL {
            assert_eq!(
                is_allowed(from, RefreshState::Publishing),
                from == RefreshState::Scoring
            );
        }
        assert!(!is_allowed(RefreshState::Publishing, RefreshState::Backoff));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let sleeper = tokio::spawn(async move {
            sleep_or_shutdown(Duration::from_secs(300), &mut rx).await
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();

        assert!(sleeper.await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_runs_to_completion_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
    }
}
