//! Bounded-concurrency execution of one batch.
//!
//! `N` worker futures share one immutable batch snapshot and a single claim
//! cursor. They are joined on the calling task, so concurrency is cooperative:
//! a claim never suspends, and workers yield between validations so results
//! and stop requests interleave fairly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::mpsc;

use super::models::{Credential, ProviderConfig, ValidationResult};
use super::provider::ProviderMeta;
use super::validator::CheckCredential;

/// Cooperative cancellation flag shared between a session and its pool.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every worker to stop before its next claim.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a pool run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// Every credential in the batch was checked.
    Completed,
    /// A stop was observed; remaining credentials were not claimed.
    Stopped,
}

/// Runs a checker over a batch with at most `concurrency` checks in flight.
#[derive(Debug)]
pub struct WorkerPool<C> {
    checker: Arc<C>,
    concurrency: usize,
}

impl<C> Clone for WorkerPool<C> {
    fn clone(&self) -> Self {
        Self {
            checker: Arc::clone(&self.checker),
            concurrency: self.concurrency,
        }
    }
}

impl<C: CheckCredential> WorkerPool<C> {
    /// Create a pool. A concurrency of 0 is treated as 1.
    #[must_use]
    pub fn new(checker: Arc<C>, concurrency: usize) -> Self {
        Self {
            checker,
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Check every credential in `batch`, sending results as they complete.
    ///
    /// Returns [`PoolOutcome::Stopped`] if `stop` was raised at any point or
    /// the result receiver went away.
    pub async fn run(
        &self,
        batch: Arc<[Credential]>,
        meta: &ProviderMeta,
        config: &ProviderConfig,
        results: &mpsc::Sender<ValidationResult>,
        stop: &StopSignal,
    ) -> PoolOutcome {
        let cursor = AtomicUsize::new(0);
        let workers = self.concurrency.min(batch.len());

        tracing::debug!(
            batch = batch.len(),
            workers,
            provider = %meta.key,
            "Worker pool starting"
        );

        let tasks = (0..workers).map(|worker| {
            let batch = Arc::clone(&batch);
            let cursor = &cursor;
            async move {
                let mut checked = 0usize;
                loop {
                    if stop.is_raised() {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(credential) = batch.get(index) else {
                        break;
                    };

                    let result = self.checker.check(credential, meta, config).await;
                    if stop.is_raised() {
                        break;
                    }
                    if results.send(result).await.is_err() {
                        stop.raise();
                        break;
                    }
                    checked += 1;
                    tokio::task::yield_now().await;
                }
                tracing::trace!(worker, checked, "Worker drained");
            }
        });
        join_all(tasks).await;

        if stop.is_raised() {
            PoolOutcome::Stopped
        } else {
            PoolOutcome::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderRegistry;
    use crate::test_utils::{ScriptedChecker, make_credentials};
    use std::time::Duration;

    fn fixtures() -> (ProviderMeta, ProviderConfig) {
        (
            ProviderRegistry::builtin().get("openai").unwrap().clone(),
            ProviderConfig::for_provider("openai"),
        )
    }

    async fn drain(mut rx: mpsc::Receiver<ValidationResult>) -> Vec<ValidationResult> {
        let mut out = Vec::new();
        while let Some(result) = rx.recv().await {
            out.push(result);
        }
        out
    }

    #[tokio::test]
    async fn every_credential_checked_exactly_once() {
        let checker = Arc::new(ScriptedChecker::new());
        let pool = WorkerPool::new(Arc::clone(&checker), 7);
        let batch: Arc<[Credential]> = make_credentials(100).into();
        let (meta, config) = fixtures();
        let (tx, rx) = mpsc::channel(16);

        let (outcome, results) = tokio::join!(
            async move {
                let outcome = pool.run(batch, &meta, &config, &tx, &StopSignal::new()).await;
                drop(tx);
                outcome
            },
            drain(rx)
        );
        let mut orders: Vec<u64> = results.iter().map(|r| r.order).collect();
        orders.sort_unstable();
        assert_eq!(orders, (0..100).collect::<Vec<_>>());
        assert_eq!(outcome, PoolOutcome::Completed);
        assert_eq!(checker.calls(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_concurrency() {
        let checker = Arc::new(ScriptedChecker::new().with_delay(Duration::from_millis(20)));
        let pool = WorkerPool::new(Arc::clone(&checker), 3);
        let batch: Arc<[Credential]> = make_credentials(25).into();
        let (meta, config) = fixtures();
        let (tx, rx) = mpsc::channel(64);

        let outcome = pool.run(batch, &meta, &config, &tx, &StopSignal::new()).await;
        drop(tx);
        assert_eq!(outcome, PoolOutcome::Completed);
        assert_eq!(drain(rx).await.len(), 25);
        assert!(checker.peak_in_flight() <= 3);
        assert!(checker.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_runs_one_worker() {
        let pool = WorkerPool::new(Arc::new(ScriptedChecker::new()), 0);
        assert_eq!(pool.concurrency(), 1);
    }

    #[tokio::test]
    async fn raised_stop_prevents_claims() {
        let checker = Arc::new(ScriptedChecker::new());
        let pool = WorkerPool::new(Arc::clone(&checker), 4);
        let (meta, config) = fixtures();
        let (tx, rx) = mpsc::channel(8);
        let stop = StopSignal::new();
        stop.raise();

        let outcome = pool
            .run(make_credentials(10).into(), &meta, &config, &tx, &stop)
            .await;
        drop(tx);
        assert_eq!(outcome, PoolOutcome::Stopped);
        assert!(drain(rx).await.is_empty());
        assert_eq!(checker.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_batch_leaves_remaining_unclaimed() {
        let checker = Arc::new(ScriptedChecker::new().with_delay(Duration::from_millis(10)));
        let pool = WorkerPool::new(Arc::clone(&checker), 2);
        let (meta, config) = fixtures();
        let (tx, mut rx) = mpsc::channel(64);
        let stop = StopSignal::new();

        let stopper = {
            let stop = stop.clone();
            async move {
                let mut seen = 0;
                while rx.recv().await.is_some() {
                    seen += 1;
                    if seen == 4 {
                        stop.raise();
                    }
                }
                seen
            }
        };
        let (outcome, seen) = tokio::join!(
            async move {
                let outcome = pool
                    .run(make_credentials(50).into(), &meta, &config, &tx, &stop)
                    .await;
                drop(tx);
                outcome
            },
            stopper
        );

        assert_eq!(outcome, PoolOutcome::Stopped);
        assert!(seen >= 4 && seen < 50, "saw {seen}");
        assert!(checker.calls() < 50);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_pool() {
        let pool = WorkerPool::new(Arc::new(ScriptedChecker::new()), 2);
        let (meta, config) = fixtures();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = pool
            .run(make_credentials(5).into(), &meta, &config, &tx, &StopSignal::new())
            .await;
        assert_eq!(outcome, PoolOutcome::Stopped);
    }
}
