use crate::browser::{PageDriver, SessionVerifier};
use crate::config::PacingConfig;
use crate::engine::handle::Handle;
use crate::engine::pacing::pause;
use crate::engine::progress::ProgressLedger;
use crate::error::Result;
use crate::suno::harvest::{HarvestTarget, Harvester};
use crate::suno::{ApiResponse, PlatformApi};
use std::sync::Arc;
use std::time::Duration;

/// How an unfollow response should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowStatus {
    Success,
    Unauthorized,
    RateLimited(Duration),
    Unexpected(u16),
}

pub fn classify(resp: &ApiResponse, default_retry_after: Duration) -> UnfollowStatus {
    match resp.status {
        204 => UnfollowStatus::Success,
        401 => UnfollowStatus::Unauthorized,
        429 => UnfollowStatus::RateLimited(resp.retry_after_or(default_retry_after)),
        status => UnfollowStatus::Unexpected(status),
    }
}

enum Step {
    Done,
    Retry,
    GiveUp,
}

/// Totals for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub targets: usize,
    pub unfollowed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct UnfollowDriver {
    api: Arc<dyn PlatformApi>,
    harvester: Harvester,
    verifier: SessionVerifier,
    pacing: PacingConfig,
    ledger: ProgressLedger,
}

impl UnfollowDriver {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        harvester: Harvester,
        verifier: SessionVerifier,
        pacing: &PacingConfig,
        ledger: ProgressLedger,
    ) -> Self {
        Self {
            api,
            harvester,
            verifier,
            pacing: pacing.clone(),
            ledger,
        }
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Unfollow one account. A handle already in the ledger succeeds without
    /// touching the network. Failure is per handle and never aborts a sweep.
    pub async fn unfollow(&mut self, page: &dyn PageDriver, handle: &Handle) -> bool {
        if self.ledger.contains(handle) {
            tracing::debug!(handle = %handle, "already processed");
            return true;
        }

        let max_attempts = self.pacing.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let remaining = attempt < max_attempts;
            match self.attempt(page, handle, attempt, remaining).await {
                Ok(Step::Done) => return true,
                Ok(Step::Retry) => {}
                Ok(Step::GiveUp) => return false,
                Err(e) => {
                    tracing::error!(handle = %handle, attempt, error = %e, "unfollow attempt failed");
                    if remaining {
                        let wait = pause(self.pacing.error_backoff_s).await;
                        tracing::debug!(handle = %handle, waited = ?wait, "backed off after error");
                    }
                }
            }
        }
        tracing::error!(handle = %handle, attempts = max_attempts, "giving up on handle");
        false
    }

    async fn attempt(
        &mut self,
        page: &dyn PageDriver,
        handle: &Handle,
        attempt: u32,
        remaining: bool,
    ) -> Result<Step> {
        let credentials = self.harvester.harvest(page, HarvestTarget::Follow).await?;
        let resp = self.api.unfollow(page, &credentials, handle).await?;
        let default_wait = Duration::from_secs(self.pacing.default_retry_after_s);

        match classify(&resp, default_wait) {
            UnfollowStatus::Success => {
                if let Err(e) = self.ledger.append(handle) {
                    tracing::error!(handle = %handle, error = %e, "failed to record progress");
                }
                tracing::info!(handle = %handle, attempt, "unfollowed");
                let wait = pause(self.pacing.unfollow_cooldown_s).await;
                tracing::debug!(waited = ?wait, "cooldown finished");
                Ok(Step::Done)
            }
            UnfollowStatus::Unauthorized => {
                tracing::warn!(handle = %handle, attempt, "unauthorized, re-verifying session");
                self.verifier.verify(page).await?;
                Ok(Step::Retry)
            }
            UnfollowStatus::RateLimited(wait) => {
                tracing::warn!(handle = %handle, attempt, wait = ?wait, "rate limited");
                if remaining {
                    tokio::time::sleep(wait).await;
                }
                Ok(Step::Retry)
            }
            UnfollowStatus::Unexpected(status) => {
                tracing::warn!(handle = %handle, attempt, status, body = %resp.excerpt(), "unexpected response");
                if !remaining {
                    return Ok(Step::GiveUp);
                }
                pause(self.pacing.unexpected_status_backoff_s).await;
                Ok(Step::Retry)
            }
        }
    }

    /// Work through `targets` in fixed-size batches with a long randomized
    /// pause between batches.
    pub async fn run_batches(&mut self, page: &dyn PageDriver, targets: &[Handle]) -> SweepSummary {
        let mut summary = SweepSummary {
            targets: targets.len(),
            ..SweepSummary::default()
        };
        let batch_size = self.pacing.batch_size.max(1);
        let batch_count = targets.len().div_ceil(batch_size);

        for (index, batch) in targets.chunks(batch_size).enumerate() {
            tracing::info!(batch = index + 1, of = batch_count, size = batch.len(), "processing batch");
            for handle in batch {
                if self.ledger.contains(handle) {
                    summary.skipped += 1;
                    continue;
                }
                if self.unfollow(page, handle).await {
                    summary.unfollowed += 1;
                } else {
                    summary.failed += 1;
                }
            }
            if index + 1 < batch_count {
                let wait = pause(self.pacing.batch_pause_s).await;
                tracing::info!(waited = ?wait, "batch pause finished");
            }
        }
        summary
    }
}
