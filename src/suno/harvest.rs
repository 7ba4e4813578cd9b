//! Captures credential headers by letting the web app make its own API call
//! and observing the traffic.

use super::auth::CredentialBundle;
use super::types::ListingKind;
use crate::browser::{ExchangeStream, ObservedExchange, PageDriver, WaitUntil, SCROLL_TO_BOTTOM};
use crate::config::{ContractConfig, HarvestConfig, PlatformConfig};
use crate::engine::poll::poll_until;
use crate::error::{Result, SweepError};
use std::time::Duration;
use tokio::time::Instant;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Which API call to harvest credentials from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestTarget {
    Listing(ListingKind),
    Follow,
}

impl HarvestTarget {
    fn page_path(&self) -> String {
        match self {
            Self::Listing(kind) => kind.page_path(),
            Self::Follow => ListingKind::Following.page_path(),
        }
    }

    fn matcher(&self, credential_header: &str) -> ExchangeMatcher {
        let path = match self {
            Self::Listing(kind) => kind.api_path(),
            Self::Follow => "/api/profiles/".to_string(),
        };
        ExchangeMatcher::new(path).requiring(credential_header)
    }

    fn wait(&self) -> WaitUntil {
        match self {
            Self::Listing(_) => WaitUntil::DomContentLoaded,
            Self::Follow => WaitUntil::NetworkIdle,
        }
    }
}

/// A 2xx exchange whose URL contains `path_fragment`. With a required
/// header set, exchanges whose request lacks it do not count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMatcher {
    path_fragment: String,
    required_header: Option<String>,
}

impl ExchangeMatcher {
    pub fn new(path_fragment: impl Into<String>) -> Self {
        Self {
            path_fragment: path_fragment.into(),
            required_header: None,
        }
    }

    pub fn requiring(mut self, header: &str) -> Self {
        self.required_header = Some(header.to_ascii_lowercase());
        self
    }

    pub fn matches(&self, exchange: &ObservedExchange) -> bool {
        if !(200..300).contains(&exchange.status) || !exchange.url.contains(&self.path_fragment) {
            return false;
        }
        match self.required_header {
            Some(ref name) => exchange
                .request_headers
                .get(name)
                .is_some_and(|v| !v.trim().is_empty()),
            None => true,
        }
    }
}

/// An armed observer. The first matching exchange is the result; the
/// observer is deregistered when the capture is dropped.
pub struct Capture {
    rx: ExchangeStream,
    matcher: ExchangeMatcher,
}

impl Capture {
    pub async fn arm(page: &dyn PageDriver, matcher: ExchangeMatcher) -> Result<Self> {
        let rx = page.observe_exchanges().await?;
        Ok(Self { rx, matcher })
    }

    /// Wait for a match, scrolling the page every `nudge` to coax the app
    /// into issuing the call.
    pub async fn await_capture(
        &mut self,
        page: &dyn PageDriver,
        timeout: Duration,
        nudge: Duration,
    ) -> Result<ObservedExchange> {
        let expiry = tokio::time::sleep_until(Instant::now() + timeout);
        tokio::pin!(expiry);
        let nudge = nudge.max(Duration::from_millis(1));
        let mut nudges = tokio::time::interval_at(Instant::now() + nudge, nudge);

        loop {
            tokio::select! {
                biased;
                received = self.rx.recv() => match received {
                    Some(exchange) if self.matcher.matches(&exchange) => return Ok(exchange),
                    Some(exchange) => {
                        tracing::trace!(url = %exchange.url, status = exchange.status, "ignoring exchange");
                    }
                    None => {
                        return Err(SweepError::Session("network observer closed".into()));
                    }
                },
                _ = &mut expiry => return Err(SweepError::HarvestTimeout(timeout)),
                _ = nudges.tick() => {
                    if let Err(e) = page.evaluate(SCROLL_TO_BOTTOM).await {
                        tracing::debug!(error = %e, "scroll nudge failed");
                    }
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Harvester {
    platform: PlatformConfig,
    contract: ContractConfig,
    config: HarvestConfig,
    navigation_timeout: Duration,
}

impl Harvester {
    pub fn new(
        platform: &PlatformConfig,
        contract: &ContractConfig,
        config: &HarvestConfig,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            platform: platform.clone(),
            contract: contract.clone(),
            config: config.clone(),
            navigation_timeout,
        }
    }

    /// One capture attempt: arm, navigate to the page that triggers the
    /// call, wait for it.
    pub async fn harvest(&self, page: &dyn PageDriver, target: HarvestTarget) -> Result<CredentialBundle> {
        let matcher = target.matcher(&self.contract.authorization_header);
        let mut capture = Capture::arm(page, matcher).await?;
        let exchange = self.trigger_and_wait(page, target, &mut capture).await?;
        drop(capture);

        let bundle = match target {
            HarvestTarget::Listing(_) => CredentialBundle::for_listing(&exchange, &self.contract),
            HarvestTarget::Follow => {
                CredentialBundle::for_follow(&exchange, &self.contract, &self.platform.base_url)
            }
        };
        tracing::info!(harvest = ?target, headers = ?bundle, "captured auth headers");
        Ok(bundle)
    }

    async fn trigger_and_wait(
        &self,
        page: &dyn PageDriver,
        target: HarvestTarget,
        capture: &mut Capture,
    ) -> Result<ObservedExchange> {
        let url = self.platform.page_url(&target.page_path());
        page.goto(&url, target.wait(), self.navigation_timeout).await?;
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        if target == HarvestTarget::Follow {
            let selector = self.contract.following_ready_selector.as_str();
            let ready = poll_until(
                READY_POLL_INTERVAL,
                Duration::from_secs(self.config.ready_timeout_s),
                move || async move { page.has_selector(selector).await.ok().filter(|found| *found) },
            )
            .await;
            if ready.is_none() {
                tracing::warn!(selector, "following list did not render, continuing");
            }
        }

        if let Err(e) = page.evaluate(SCROLL_TO_BOTTOM).await {
            tracing::debug!(error = %e, "initial scroll failed");
        }
        capture
            .await_capture(
                page,
                Duration::from_secs(self.config.capture_timeout_s),
                Duration::from_millis(self.config.nudge_interval_ms),
            )
            .await
    }

    /// Navigate away to the neutral base page, then harvest again. Retries
    /// with a fixed backoff; the last failure is returned.
    pub async fn refresh(&self, page: &dyn PageDriver, target: HarvestTarget) -> Result<CredentialBundle> {
        let attempts = self.config.refresh_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            tracing::info!(attempt, harvest = ?target, "refreshing auth headers");
            let result: Result<CredentialBundle> = async {
                page.goto(&self.platform.base_url, WaitUntil::DomContentLoaded, self.navigation_timeout)
                    .await?;
                tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
                self.harvest(page, target).await
            }
            .await;

            match result {
                Ok(bundle) => return Ok(bundle),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "auth refresh failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(self.config.refresh_backoff_s)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| SweepError::Session("auth refresh failed".into())))
    }
}
