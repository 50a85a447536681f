// src/publish/mod.rs
//! # Publish Scheduler
//! Serializes every outbound publish through one gate, waits out destination
//! throttles, retries transient failures with exponential backoff and paces
//! successful publishes. A configuration failure (revoked token) ends the job
//! as [`PublishOutcome::Fatal`] so the caller can stop without losing it.
//!
//! State per job: `Pending → InFlight → {Published | Throttled(wait) | FailedDropped}`,
//! with `Throttled(wait) → Pending` after exactly `wait`.

pub mod log;
pub mod telegram;

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::ingest::MediaRef;
use crate::shutdown::Shutdown;

pub use self::log::LogDestination;
pub use self::telegram::TelegramDestination;

/// Where rewritten groups end up. One call = one post (or one album).
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// `Err(RelayError::Throttled { wait })` when the destination demands a pause.
    async fn publish(&self, text: Option<&str>, media: &[MediaRef]) -> Result<()>;
}

/// Rendered once, then retried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishJob {
    pub source: String,
    pub min_id: i64,
    pub max_id: i64,
    pub text: Option<String>,
    pub media: Vec<MediaRef>,
}

#[derive(Debug)]
pub enum PublishOutcome {
    Published,
    /// Gave up on the job; carries the last error.
    Dropped(RelayError),
    /// The destination refused our credentials or settings. Nothing was
    /// published and nothing further can be.
    Fatal(RelayError),
    /// Shutdown arrived while waiting; nothing was published.
    Cancelled,
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published)
    }
}

pub struct PublishScheduler {
    destination: Arc<dyn Destination>,
    gate: Mutex<()>,
    pacing: Duration,
    max_retries: u32,
    retry_base: Duration,
}

impl PublishScheduler {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self {
            destination,
            gate: Mutex::new(()),
            pacing: Duration::from_secs(15),
            max_retries: 3,
            retry_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &RelayConfig, destination: Arc<dyn Destination>) -> Self {
        Self::new(destination)
            .with_pacing(config.pacing_delay())
            .with_retries(config.publish_retries, config.retry_base_ms)
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// `retries` extra attempts after the first one for transient failures.
    pub fn with_retries(mut self, retries: u32, base_ms: u64) -> Self {
        self.max_retries = retries;
        self.retry_base = Duration::from_millis(base_ms);
        self
    }

    fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.retry_base.saturating_mul(1u32 << shift)
    }

    /// Run one job to a terminal outcome. Holding the gate for the whole
    /// lifecycle (throttle waits and pacing included) keeps exactly one
    /// publish in flight and spaces consecutive publishes.
    pub async fn submit(&self, job: &PublishJob, shutdown: &mut Shutdown) -> PublishOutcome {
        let _gate = self.gate.lock().await;
        let mut retries: u32 = 0;

        loop {
            if shutdown.is_triggered() {
                return PublishOutcome::Cancelled;
            }

            tracing::debug!(
                source = %job.source,
                first_id = job.min_id,
                last_id = job.max_id,
                destination = self.destination.name(),
                "publish in flight"
            );
            let res = self
                .destination
                .publish(job.text.as_deref(), &job.media)
                .await;

            match res {
                Ok(()) => {
                    counter!("relay_published_total").increment(1);
                    tracing::info!(
                        source = %job.source,
                        first_id = job.min_id,
                        last_id = job.max_id,
                        media = job.media.len(),
                        "published"
                    );
                    if !self.pacing.is_zero() && !shutdown.sleep(self.pacing).await {
                        tracing::debug!("pacing delay cut short by shutdown");
                    }
                    return PublishOutcome::Published;
                }
                Err(RelayError::Throttled { wait }) => {
                    counter!("relay_throttled_total").increment(1);
                    tracing::warn!(
                        source = %job.source,
                        first_id = job.min_id,
                        last_id = job.max_id,
                        wait_secs = wait.as_secs(),
                        "destination throttled, waiting before retry"
                    );
                    if !shutdown.sleep(wait).await {
                        return PublishOutcome::Cancelled;
                    }
                }
                Err(e @ RelayError::TransientIo(_)) if retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff(retries);
                    tracing::warn!(
                        source = %job.source,
                        first_id = job.min_id,
                        last_id = job.max_id,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient publish failure, retrying"
                    );
                    if !shutdown.sleep(delay).await {
                        return PublishOutcome::Cancelled;
                    }
                }
                Err(e @ RelayError::Configuration(_)) => {
                    tracing::error!(
                        source = %job.source,
                        first_id = job.min_id,
                        last_id = job.max_id,
                        destination = self.destination.name(),
                        error = %e,
                        "destination refused configuration, stopping"
                    );
                    return PublishOutcome::Fatal(e);
                }
                Err(e) => {
                    counter!("relay_dropped_total").increment(1);
                    tracing::warn!(
                        source = %job.source,
                        first_id = job.min_id,
                        last_id = job.max_id,
                        kind = e.kind(),
                        error = %e,
                        "publish failed, dropping group"
                    );
                    return PublishOutcome::Dropped(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted results and records every call.
    struct Scripted {
        script: StdMutex<VecDeque<Result<()>>>,
        calls: StdMutex<Vec<(Option<String>, tokio::time::Instant)>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<()>>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }
        fn calls(&self) -> Vec<(Option<String>, tokio::time::Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Destination for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn publish(&self, text: Option<&str>, _media: &[MediaRef]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((text.map(str::to_string), tokio::time::Instant::now()));
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn job(text: &str) -> PublishJob {
        PublishJob {
            source: "news".into(),
            min_id: 10,
            max_id: 12,
            text: Some(text.into()),
            media: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_waits_exactly_then_resubmits_same_job() {
        let dest = Scripted::new(vec![Err(RelayError::Throttled {
            wait: Duration::from_secs(30),
        })]);
        let sched = PublishScheduler::new(dest.clone()).with_pacing(Duration::ZERO);
        let (_t, mut sd) = Shutdown::new();

        let out = sched.submit(&job("Мост закрыт."), &mut sd).await;
        assert!(out.is_published());

        let calls = dest.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, calls[1].0);
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_drop() {
        let dest = Scripted::new(vec![
            Err(RelayError::TransientIo("a".into())),
            Err(RelayError::TransientIo("b".into())),
            Err(RelayError::TransientIo("c".into())),
        ]);
        let sched = PublishScheduler::new(dest.clone())
            .with_pacing(Duration::ZERO)
            .with_retries(2, 500);
        let (_t, mut sd) = Shutdown::new();

        let out = sched.submit(&job("x y z"), &mut sd).await;
        assert!(matches!(out, PublishOutcome::Dropped(RelayError::TransientIo(_))));

        let calls = dest.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_millis(500));
        assert_eq!(calls[2].1 - calls[1].1, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_reject_is_not_retried() {
        let dest = Scripted::new(vec![Err(RelayError::PermanentReject("bad".into()))]);
        let sched = PublishScheduler::new(dest.clone()).with_pacing(Duration::ZERO);
        let (_t, mut sd) = Shutdown::new();

        let out = sched.submit(&job("x"), &mut sd).await;
        assert!(matches!(out, PublishOutcome::Dropped(RelayError::PermanentReject(_))));
        assert_eq!(dest.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_error_is_fatal_not_dropped() {
        let dest = Scripted::new(vec![Err(RelayError::Configuration("token revoked".into()))]);
        let sched = PublishScheduler::new(dest.clone()).with_pacing(Duration::ZERO);
        let (_t, mut sd) = Shutdown::new();

        let out = sched.submit(&job("x"), &mut sd).await;
        assert!(matches!(out, PublishOutcome::Fatal(RelayError::Configuration(_))));
        assert_eq!(dest.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_consecutive_publishes() {
        let dest = Scripted::new(vec![]);
        let sched = PublishScheduler::new(dest.clone()).with_pacing(Duration::from_secs(15));
        let (_t, mut sd) = Shutdown::new();

        assert!(sched.submit(&job("one"), &mut sd).await.is_published());
        assert!(sched.submit(&job("two"), &mut sd).await.is_published());
        let calls = dest.calls();
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_throttle_cancels() {
        let dest = Scripted::new(vec![Err(RelayError::Throttled {
            wait: Duration::from_secs(600),
        })]);
        let sched = Arc::new(PublishScheduler::new(dest.clone()));
        let (trigger, mut sd) = Shutdown::new();

        let s = sched.clone();
        let task = tokio::spawn(async move { s.submit(&job("x"), &mut sd).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.trigger();

        assert!(matches!(task.await.unwrap(), PublishOutcome::Cancelled));
        assert_eq!(dest.calls().len(), 1);
    }
}
