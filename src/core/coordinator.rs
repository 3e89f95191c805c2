use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::instrument;

use crate::analyzers::swap::TradeProbe;
use crate::analyzers::RiskAnalyzer;
use crate::config::{AuditConfig, RetryConfig};
use crate::core::traits::SandboxProvider;
use crate::models::{AuditReport, Candidate, StepOutcome};
use crate::sandbox::SandboxLease;
use crate::utils::{AuditError, Result};

/// Running totals across all sessions.
#[derive(Debug, Default)]
pub struct SessionStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub cancelled: u64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Runs one session per candidate: provision, probe, analyze, terminate.
pub struct SessionCoordinator {
    provider: Arc<dyn SandboxProvider>,
    probe: TradeProbe,
    analyzer: RiskAnalyzer,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    retry: RetryConfig,
    session_timeout: Duration,
    fork_at_discovery_block: bool,
    shutdown: watch::Sender<bool>,
    stats: SessionStats,
}

impl SessionCoordinator {
    pub fn new(config: &AuditConfig, provider: Arc<dyn SandboxProvider>) -> Result<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        let max_concurrent = config.session.max_concurrent_sessions;

        Ok(Self {
            provider,
            probe: TradeProbe::new(config.probe.clone()),
            analyzer: RiskAnalyzer::new(config.scoring.clone()),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            retry: config.retry.clone(),
            session_timeout: config.session.session_timeout(),
            fork_at_discovery_block: config.sandbox.fork_at_discovery_block,
            shutdown,
            stats: SessionStats::default(),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Cancel queued and in-flight sessions. Their sandboxes are terminated
    /// as the sessions unwind.
    pub fn shutdown(&self) {
        tracing::info!("🛑 Shutdown requested, cancelling sessions");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Audit one candidate.
    ///
    /// Every failure short of shutdown comes back as a failed report;
    /// `Err` is only ever [`AuditError::Cancelled`].
    #[instrument(skip(self), fields(candidate = %candidate))]
    pub async fn submit(&self, candidate: Candidate) -> Result<AuditReport> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(AuditError::Cancelled);
        }
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let slot = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                return Err(AuditError::Cancelled);
            }
            permit = self.slots.clone().acquire_owned() => {
                Arc::new(permit.map_err(|_| AuditError::Cancelled)?)
            }
        };
        tracing::debug!("Slot acquired ({} free)", self.slots.available_permits());

        let attempts = AtomicU32::new(0);
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => None,
            result = tokio::time::timeout(self.session_timeout, self.run_with_retry(&candidate, &slot, &attempts)) => Some(result),
        };
        // A lease dropped above still holds a clone until its terminate finishes
        drop(slot);

        let attempts = attempts.load(Ordering::Relaxed);
        let report = match outcome {
            None => {
                tracing::info!("Session cancelled after {} attempt(s)", attempts);
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                return Err(AuditError::Cancelled);
            }
            Some(Ok(Ok(report))) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                report
            }
            Some(Ok(Err(err))) => {
                tracing::warn!("❌ Session failed after {} attempt(s): {}", attempts, err);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.analyzer.failed_report(&candidate, &err, attempts, Utc::now())
            }
            Some(Err(_)) => {
                let err = AuditError::Timeout(format!("session exceeded {:?}", self.session_timeout));
                tracing::warn!("⏱️  {}", err);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.analyzer.failed_report(&candidate, &err, attempts, Utc::now())
            }
        };

        tracing::info!(
            "{} Score {}/100 ({:?}), honeypot: {}",
            report.risk_label.emoji(),
            report.risk_score,
            report.confidence,
            report.honeypot
        );

        Ok(report)
    }

    /// Audit a stream of candidates, up to the slot count at a time.
    /// Results arrive in completion order.
    pub fn submit_all<'a, S>(&'a self, candidates: S) -> impl Stream<Item = (Candidate, Result<AuditReport>)> + 'a
    where
        S: Stream<Item = Candidate> + 'a,
    {
        candidates
            .map(move |candidate| async move {
                let result = self.submit(candidate.clone()).await;
                (candidate, result)
            })
            .buffer_unordered(self.max_concurrent)
    }

    async fn run_with_retry(
        &self,
        candidate: &Candidate,
        slot: &Arc<OwnedSemaphorePermit>,
        attempts: &AtomicU32,
    ) -> Result<AuditReport> {
        let factor = (self.retry.initial_delay_ms / 2).max(1);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .take(self.retry.max_attempts.saturating_sub(1) as usize);

        RetryIf::spawn(
            strategy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                self.attempt(candidate, slot.clone(), attempt)
            },
            |err: &AuditError| {
                let retry = err.is_retryable()
                    && attempts.load(Ordering::Relaxed) < self.retry.max_attempts;
                if retry {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("🔁 Retryable failure: {}", err);
                }
                retry
            },
        )
        .await
    }

    /// One sandbox, start to finish. The lease is released on every path
    /// out of here, including when this future is dropped.
    async fn attempt(
        &self,
        candidate: &Candidate,
        slot: Arc<OwnedSemaphorePermit>,
        attempt: u32,
    ) -> Result<AuditReport> {
        let fork_height = self
            .fork_at_discovery_block
            .then_some(candidate.discovery_block);
        tracing::debug!("Attempt {} (fork {:?})", attempt, fork_height);

        let mut lease = SandboxLease::acquire(self.provider.clone(), fork_height, slot).await?;
        let outcome = self.probe_in(&mut lease, candidate).await;

        if let Err(e) = lease.release().await {
            tracing::warn!("Sandbox terminate reported: {}", e);
        }

        outcome
    }

    async fn probe_in(&self, lease: &mut SandboxLease, candidate: &Candidate) -> Result<AuditReport> {
        if !lease.health_check().await {
            return Err(AuditError::Rpc(format!(
                "sandbox {} failed health check",
                lease.sandbox().id
            )));
        }
        lease.mark_in_use();

        let rpc = lease.connect()?;
        let probe = self.probe.run(rpc.as_ref(), candidate).await?;

        if probe.has_infra_failure() {
            let message = probe
                .steps
                .iter()
                .find_map(|s| match &s.outcome {
                    StepOutcome::InfraError { message } => Some(message.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            return Err(AuditError::Rpc(format!("trade step failed: {}", message)));
        }

        Ok(self.analyzer.analyze(candidate, &probe))
    }
}

/// Resolves once shutdown is signalled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
