//! One sweep end to end: verify the session, collect both listings,
//! reconcile, unfollow in batches.

use crate::browser::{BrowserLauncher, LaunchOptions, SessionManager, SessionState, SessionVerifier};
use crate::config::Config;
use crate::engine::{reconcile, Handle, ProgressLedger};
use crate::error::Result;
use crate::execution::{SweepSummary, UnfollowDriver};
use crate::feed::Collector;
use crate::suno::{Harvester, ListingKind, PlatformApi};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

pub struct UnfollowBot {
    session: SessionManager,
    collector: Collector,
    driver: UnfollowDriver,
    session_error_cooldown: Duration,
}

impl UnfollowBot {
    /// Checks the browser data directory and loads the ledger; nothing is
    /// launched until [`UnfollowBot::run`].
    pub fn new(config: &Config, launcher: Box<dyn BrowserLauncher>, api: Arc<dyn PlatformApi>) -> Result<Self> {
        config.browser.prepare_data_dir()?;
        let ledger = ProgressLedger::open(&config.progress.ledger_path).with_context(|| {
            format!("failed to load progress ledger {}", config.progress.ledger_path.display())
        })?;

        let navigation_timeout = config.browser.navigation_timeout();
        let verifier = SessionVerifier::new(&config.platform, &config.session, &config.contract, navigation_timeout);
        let harvester = Harvester::new(&config.platform, &config.contract, &config.harvest, navigation_timeout);
        let collector = Collector::new(
            api.clone(),
            harvester.clone(),
            &config.platform,
            &config.contract,
            &config.pacing,
        );
        let driver = UnfollowDriver::new(api, harvester, verifier.clone(), &config.pacing, ledger);
        let session = SessionManager::new(launcher, LaunchOptions::from_config(&config.browser), verifier);

        tracing::info!(contract = %config.contract.version, "bot initialized");
        Ok(Self {
            session,
            collector,
            driver,
            session_error_cooldown: Duration::from_secs(config.pacing.session_error_cooldown_s),
        })
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn ledger(&self) -> &ProgressLedger {
        self.driver.ledger()
    }

    /// Run one sweep and clean up afterwards. Session failures other than
    /// timeouts get a short cooldown before the error is returned.
    pub async fn run(&mut self) -> Result<SweepSummary> {
        let result = self.sweep().await;
        match &result {
            Ok(summary) => tracing::info!(
                targets = summary.targets,
                unfollowed = summary.unfollowed,
                failed = summary.failed,
                skipped = summary.skipped,
                "sweep finished"
            ),
            Err(e) => {
                tracing::error!(error = %e, "sweep failed");
                if e.is_session() && !e.is_timeout() {
                    tokio::time::sleep(self.session_error_cooldown).await;
                }
            }
        }
        self.cleanup().await;
        result
    }

    async fn sweep(&mut self) -> Result<SweepSummary> {
        let Self {
            session,
            collector,
            driver,
            ..
        } = self;
        session
            .with_page(|page| async move {
                let following = collector.collect(page.as_ref(), ListingKind::Following).await?;
                let followers = collector.collect(page.as_ref(), ListingKind::Followers).await?;
                let targets: Vec<Handle> = reconcile(&following, &followers).into_iter().collect();
                tracing::info!(
                    following = following.len(),
                    followers = followers.len(),
                    targets = targets.len(),
                    "non-reciprocal follows found"
                );

                driver.ledger().start_run()?;
                Ok(driver.run_batches(page.as_ref(), &targets).await)
            })
            .await
    }

    /// Close every page and the browser. Safe to call more than once.
    pub async fn cleanup(&mut self) {
        self.session.cleanup().await;
    }
}
