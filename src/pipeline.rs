// src/pipeline.rs
//! # Relay pipeline
//! Drives each group through offsets → content dedup → rewrite → publish →
//! persist. The state mutex is the single critical section: whichever task
//! holds it owns the offset map, the fingerprint map and the publish slot
//! until the group reaches a terminal outcome and the state file is written.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RelayConfig;
use crate::dedup::{fingerprint, FingerprintStore};
use crate::error::{RelayError, Result};
use crate::ingest::{assemble_groups, ItemGroup, OffsetTracker, PullSource, PushSource, Source};
use crate::publish::{Destination, PublishJob, PublishOutcome, PublishScheduler};
use crate::rewrite::Rewriter;
use crate::shutdown::Shutdown;
use crate::state::{PersistedState, StateStore};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_groups_total", "Groups handed to the pipeline.");
        describe_counter!("relay_published_total", "Groups published to the destination.");
        describe_counter!(
            "relay_duplicates_total",
            "Groups suppressed by content fingerprint."
        );
        describe_counter!(
            "relay_dropped_total",
            "Groups dropped after a non-retryable publish failure."
        );
        describe_counter!(
            "relay_throttled_total",
            "Throttle signals received from the destination."
        );
        describe_counter!(
            "relay_skipped_total",
            "Groups with neither text nor media after rewriting."
        );
        describe_counter!("relay_items_fetched_total", "Items read from pull sources.");
        describe_gauge!("relay_last_pass_ts", "Unix ts when the last pull pass finished.");
    });
}

/// Terminal result of [`Relay::process_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Published,
    /// Content fingerprint already seen within the TTL.
    Duplicate,
    /// Nothing left to publish after rewriting.
    Skipped,
    /// Offset already past this group, or the group bootstrapped its source.
    NotProcessable,
    /// Our own post echoed back.
    Outgoing,
    Dropped,
    /// Shutdown interrupted a wait before publishing; offset untouched.
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub groups: usize,
    pub published: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub failed: usize,
    /// The destination refused our configuration; the relay must stop.
    pub fatal: bool,
}

impl PassReport {
    fn record(&mut self, outcome: GroupOutcome) {
        self.groups += 1;
        match outcome {
            GroupOutcome::Published => self.published += 1,
            GroupOutcome::Duplicate => self.duplicates += 1,
            GroupOutcome::Skipped => self.skipped += 1,
            GroupOutcome::Dropped => self.dropped += 1,
            _ => {}
        }
    }
}

struct RelayState {
    offsets: OffsetTracker,
    fingerprints: FingerprintStore,
}

impl RelayState {
    fn snapshot(&self) -> PersistedState {
        PersistedState {
            offsets: self.offsets.snapshot(),
            fingerprints: self.fingerprints.snapshot(),
        }
    }
}

pub struct Relay {
    config: Arc<RelayConfig>,
    rewriter: Rewriter,
    scheduler: PublishScheduler,
    store: StateStore,
    state: Mutex<RelayState>,
}

impl Relay {
    /// Build the pipeline and restore offsets + fingerprints from `store`.
    pub async fn new(
        config: RelayConfig,
        destination: Arc<dyn Destination>,
        store: StateStore,
    ) -> Result<Self> {
        ensure_metrics_described();
        config.validate()?;
        let rewriter = Rewriter::new(&config.rewrite)?;
        let scheduler = PublishScheduler::from_config(&config, destination);

        let persisted = store.load().await?;
        tracing::info!(
            sources = persisted.offsets.len(),
            fingerprints = persisted.fingerprints.len(),
            path = %store.path().display(),
            "relay state restored"
        );
        let state = RelayState {
            offsets: OffsetTracker::from_offsets(persisted.offsets, config.start_from_now)
                .with_started_at(chrono::Utc::now().timestamp()),
            fingerprints: FingerprintStore::from_entries(persisted.fingerprints, config.dedup_text),
        };

        Ok(Self {
            config: Arc::new(config),
            rewriter,
            scheduler,
            store,
            state: Mutex::new(state),
        })
    }

    /// Override the start time used to tell backlog from live pushes.
    pub fn with_started_at(mut self, ts: i64) -> Self {
        self.state.get_mut().offsets.set_started_at(ts);
        self
    }

    pub async fn snapshot(&self) -> PersistedState {
        self.state.lock().await.snapshot()
    }

    async fn persist(&self, st: &RelayState) -> Result<()> {
        self.store.save(&st.snapshot()).await.map_err(|e| {
            tracing::error!(error = %e, path = %self.store.path().display(), "state persist failed");
            e
        })
    }

    /// Drop expired fingerprints and persist if anything went.
    pub async fn evict_expired(&self, now: i64) -> Result<usize> {
        let mut st = self.state.lock().await;
        let evicted = st.fingerprints.evict(self.config.fingerprint_ttl(), now);
        if evicted > 0 {
            self.persist(&st).await?;
        }
        Ok(evicted)
    }

    /// Take one group to a terminal outcome. `now` is unix seconds, used as
    /// the fingerprint first-seen time and for the TTL check.
    ///
    /// A destination configuration failure comes back as
    /// `Err(RelayError::Configuration)` with the offset left where it was.
    pub async fn process_group(
        &self,
        group: &ItemGroup,
        now: i64,
        shutdown: &mut Shutdown,
    ) -> Result<GroupOutcome> {
        counter!("relay_groups_total").increment(1);
        let source = group.source();
        let (first_id, last_id) = (group.min_id(), group.max_id());

        let mut st = self.state.lock().await;

        // 1) our own echoes only move the offset
        if group.is_outgoing() {
            st.offsets.advance(source, last_id);
            self.persist(&st).await?;
            return Ok(GroupOutcome::Outgoing);
        }

        // 2) offset gate (may bootstrap an unknown source)
        let had_offset = st.offsets.offset(source).is_some();
        if !st.offsets.should_process(source, last_id, group.newest_ts()) {
            if !had_offset {
                self.persist(&st).await?;
            }
            tracing::debug!(source, first_id, last_id, "group at or below offset");
            return Ok(GroupOutcome::NotProcessable);
        }

        // 3) content dedup, checked before publishing
        let ttl = self.config.fingerprint_ttl();
        let hash = fingerprint(group.text(), self.rewriter.promo());
        if let Some(h) = hash.as_deref() {
            if st.fingerprints.seen(h, ttl, now) {
                counter!("relay_duplicates_total").increment(1);
                tracing::info!(source, first_id, last_id, "duplicate content, skipping");
                st.offsets.advance(source, last_id);
                self.persist(&st).await?;
                return Ok(GroupOutcome::Duplicate);
            }
        }

        // 4) rewrite once; retries reuse this job verbatim
        let media = group.media();
        let text = self.rewriter.render(group.text(), !media.is_empty());
        if text.is_empty() && media.is_empty() {
            counter!("relay_skipped_total").increment(1);
            tracing::info!(source, first_id, last_id, "nothing left to publish, skipping");
            st.offsets.advance(source, last_id);
            self.persist(&st).await?;
            return Ok(GroupOutcome::Skipped);
        }
        let job = PublishJob {
            source: source.to_string(),
            min_id: first_id,
            max_id: last_id,
            text: (!text.is_empty()).then_some(text),
            media,
        };

        // 5) publish, then record
        match self.scheduler.submit(&job, shutdown).await {
            PublishOutcome::Published => {
                st.offsets.advance(source, last_id);
                if let Some(h) = hash.as_deref() {
                    st.fingerprints.mark(h, ttl, now);
                }
                self.persist(&st).await?;
                Ok(GroupOutcome::Published)
            }
            PublishOutcome::Dropped(e) => {
                tracing::warn!(
                    source,
                    first_id,
                    last_id,
                    kind = e.kind(),
                    "group dropped, offset advanced without fingerprint"
                );
                st.offsets.advance(source, last_id);
                self.persist(&st).await?;
                Ok(GroupOutcome::Dropped)
            }
            PublishOutcome::Fatal(e) => Err(e),
            PublishOutcome::Cancelled => {
                tracing::info!(source, first_id, last_id, "publish cancelled by shutdown");
                Ok(GroupOutcome::Cancelled)
            }
        }
    }

    /// One pull pass over every configured source. Stops early on shutdown,
    /// when the run budget is spent, or on a destination configuration
    /// failure (`fatal` set). Any other failing source or group is logged
    /// and the pass moves on.
    pub async fn run_pull_pass(
        &self,
        source: &dyn PullSource,
        now: i64,
        shutdown: &mut Shutdown,
    ) -> PassReport {
        let started = Instant::now();
        let budget = self.config.run_budget();
        let mut report = PassReport::default();

        if let Err(e) = self.evict_expired(now).await {
            tracing::warn!(error = %e, "fingerprint eviction not persisted");
        }

        'sources: for id in &self.config.sources {
            if shutdown.is_triggered() {
                break;
            }
            if started.elapsed() >= budget {
                tracing::info!(source = %id, "run budget spent, deferring to next pass");
                break;
            }

            // 1) bootstrap on first contact
            let needs_bootstrap = {
                let st = self.state.lock().await;
                st.offsets.offset(id).is_none() && self.config.start_from_now
            };
            if needs_bootstrap {
                match source.latest_id(id).await {
                    Ok(latest) => {
                        let mut st = self.state.lock().await;
                        if st.offsets.bootstrap(id, latest) {
                            if let Err(e) = self.persist(&st).await {
                                tracing::warn!(source = %id, error = %e, "bootstrap not persisted");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source = %id, provider = source.name(), error = %e, "latest id lookup failed");
                    }
                }
                continue;
            }

            // 2) fetch past the offset
            let floor = self.state.lock().await.offsets.fetch_floor(id);
            let items = match source
                .fetch(id, floor, self.config.max_items_per_pass)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(source = %id, provider = source.name(), error = %e, "fetch failed");
                    continue;
                }
            };

            // 3) groups in arrival order, each isolated
            for group in assemble_groups(items) {
                if started.elapsed() >= budget {
                    tracing::info!(source = %id, "run budget spent mid-source");
                    break 'sources;
                }
                match self.process_group(&group, now, shutdown).await {
                    Ok(GroupOutcome::Cancelled) => break 'sources,
                    Ok(outcome) => report.record(outcome),
                    Err(RelayError::Configuration(_)) => {
                        report.fatal = true;
                        break 'sources;
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            source = %id,
                            first_id = group.min_id(),
                            last_id = group.max_id(),
                            error = %e,
                            "group failed"
                        );
                    }
                }
                if shutdown.is_triggered() {
                    break 'sources;
                }
            }
        }

        gauge!("relay_last_pass_ts").set(now as f64);
        tracing::info!(
            groups = report.groups,
            published = report.published,
            duplicates = report.duplicates,
            skipped = report.skipped,
            dropped = report.dropped,
            failed = report.failed,
            fatal = report.fatal,
            "pull pass finished"
        );
        report
    }

    /// Consume a push source until it ends or shutdown fires.
    pub async fn run_push(&self, source: &mut dyn PushSource, shutdown: &mut Shutdown) -> PassReport {
        let mut report = PassReport::default();

        // Configured sources the push transport can tell us about bootstrap now;
        // for the rest, groups dated before start are backlog.
        if self.config.start_from_now {
            for id in &self.config.sources {
                if self.state.lock().await.offsets.offset(id).is_some() {
                    continue;
                }
                match source.latest_id(id).await {
                    Ok(Some(latest)) => {
                        let mut st = self.state.lock().await;
                        if st.offsets.bootstrap(id, Some(latest)) {
                            if let Err(e) = self.persist(&st).await {
                                tracing::warn!(source = %id, error = %e, "bootstrap not persisted");
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(source = %id, error = %e, "latest id lookup failed"),
                }
            }
        }

        loop {
            let next = tokio::select! {
                g = source.next_group() => g,
                _ = shutdown.wait() => None,
            };
            let Some(group) = next else { break };

            let now = chrono::Utc::now().timestamp();
            match self.process_group(&group, now, shutdown).await {
                Ok(GroupOutcome::Cancelled) => break,
                Ok(outcome) => report.record(outcome),
                Err(RelayError::Configuration(_)) => {
                    report.fatal = true;
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        source = group.source(),
                        first_id = group.min_id(),
                        last_id = group.max_id(),
                        error = %e,
                        "group failed"
                    );
                }
            }
        }
        tracing::info!(provider = source.name(), groups = report.groups, "push source stopped");
        report
    }

    /// Run until shutdown: push sources on their own tasks, pull sources on
    /// the poll interval from this one. Returns `Err(Configuration)` when the
    /// destination refuses our configuration; every task stops in that case.
    pub async fn run(self: Arc<Self>, sources: Vec<Source>, mut shutdown: Shutdown) -> Result<()> {
        if let Err(e) = self.evict_expired(chrono::Utc::now().timestamp()).await {
            tracing::warn!(error = %e, "startup eviction not persisted");
        }

        // internal stop signal, fired by the caller's shutdown or a fatal error
        let (halt, halted) = Shutdown::new();
        let halt = Arc::new(halt);
        let forward = {
            let halt = Arc::clone(&halt);
            tokio::spawn(async move {
                shutdown.wait().await;
                halt.trigger();
            })
        };

        let mut pulls: Vec<Box<dyn PullSource>> = Vec::new();
        let mut tasks = Vec::new();
        for source in sources {
            match source {
                Source::Pull(p) => pulls.push(p),
                Source::Push(mut p) => {
                    let relay = Arc::clone(&self);
                    let halt = Arc::clone(&halt);
                    let mut sd = halted.clone();
                    tasks.push(tokio::spawn(async move {
                        let report = relay.run_push(p.as_mut(), &mut sd).await;
                        if report.fatal {
                            halt.trigger();
                        }
                        report
                    }));
                }
            }
        }

        let mut fatal = false;
        let mut sd = halted.clone();
        if !pulls.is_empty() {
            tracing::info!(
                providers = pulls.len(),
                sources = self.config.sources.len(),
                poll_secs = self.config.poll_interval_secs,
                "pull loop started"
            );
            loop {
                for p in &pulls {
                    let now = chrono::Utc::now().timestamp();
                    let report = self.run_pull_pass(p.as_ref(), now, &mut sd).await;
                    if report.fatal {
                        fatal = true;
                        halt.trigger();
                    }
                    if sd.is_triggered() {
                        break;
                    }
                }
                if !sd.sleep(self.config.poll_interval()).await {
                    break;
                }
            }
        }

        for t in tasks {
            match t.await {
                Ok(report) => fatal |= report.fatal,
                Err(e) => tracing::error!(error = %e, "push task panicked"),
            }
        }
        forward.abort();

        let st = self.state.lock().await;
        self.persist(&st).await?;
        if fatal {
            tracing::error!("relay stopped on a destination configuration error");
            return Err(RelayError::Configuration(
                "destination rejected the relay configuration".into(),
            ));
        }
        tracing::info!("relay stopped");
        Ok(())
    }
}
