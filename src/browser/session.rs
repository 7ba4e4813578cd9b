//! Authenticated browsing session: launch, login verification, page scope.

use super::{BrowserContext, BrowserLauncher, LaunchOptions, PageDriver, WaitUntil};
use crate::config::{ContractConfig, PlatformConfig, SessionConfig};
use crate::engine::poll::poll_until;
use crate::error::{Result, SweepError};
use anyhow::Context;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    BrowserReady,
    SessionVerified,
    LoginWait,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Verification {
    Selector(String),
    ProfileUrl(String),
}

/// Checks that a page is logged in, waiting for a manual login if not.
#[derive(Clone)]
pub struct SessionVerifier {
    profile_url: String,
    selectors: Vec<String>,
    url_markers: Vec<String>,
    config: SessionConfig,
    navigation_timeout: Duration,
    state: Arc<Mutex<SessionState>>,
}

impl SessionVerifier {
    pub fn new(
        platform: &PlatformConfig,
        session: &SessionConfig,
        contract: &ContractConfig,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            profile_url: platform.page_url(&session.profile_path),
            selectors: contract.login_selectors.clone(),
            url_markers: contract.profile_url_markers.clone(),
            config: session.clone(),
            navigation_timeout,
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Failed)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != next {
                tracing::debug!(from = ?*state, to = ?next, "session state");
                *state = next;
            }
        }
    }

    pub async fn verify(&self, page: &dyn PageDriver) -> Result<Verification> {
        match self.verify_inner(page).await {
            Ok(v) => {
                self.set_state(SessionState::SessionVerified);
                Ok(v)
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                tracing::error!(error = %e, "session verification failed");
                Err(e)
            }
        }
    }

    async fn verify_inner(&self, page: &dyn PageDriver) -> Result<Verification> {
        page.goto(&self.profile_url, WaitUntil::Load, self.navigation_timeout)
            .await
            .map_err(|e| SweepError::Session(format!("failed to open profile page: {:#}", e)))?;
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let probe_timeout = Duration::from_secs(self.config.probe_timeout_s);
        for attempt in 1..=self.config.probe_attempts {
            if let Some(selector) = self.wait_for_indicator(page, interval, probe_timeout).await {
                tracing::info!(selector = %selector, "login detected");
                return Ok(Verification::Selector(selector));
            }
            tracing::debug!(attempt, "no login indicator yet");
            if attempt < self.config.probe_attempts {
                tokio::time::sleep(Duration::from_secs(self.config.probe_gap_s)).await;
            }
        }

        self.set_state(SessionState::LoginWait);
        let login_wait = Duration::from_secs(self.config.login_wait_s);
        tracing::info!(timeout = ?login_wait, "not logged in, please log in manually in the browser window");
        if let Some(selector) = self.wait_for_indicator(page, interval, login_wait).await {
            tracing::info!(selector = %selector, "login successful");
            return Ok(Verification::Selector(selector));
        }

        let url = page.current_url().await.unwrap_or_default();
        if self.url_markers.iter().any(|m| url.contains(m.as_str())) {
            tracing::info!(url = %url, "profile URL detected, assuming logged in");
            return Ok(Verification::ProfileUrl(url));
        }
        Err(SweepError::LoginTimeout(login_wait))
    }

    async fn wait_for_indicator(
        &self,
        page: &dyn PageDriver,
        interval: Duration,
        timeout: Duration,
    ) -> Option<String> {
        poll_until(interval, timeout, move || self.first_present(page)).await
    }

    async fn first_present(&self, page: &dyn PageDriver) -> Option<String> {
        for selector in &self.selectors {
            match page.has_selector(selector).await {
                Ok(true) => return Some(selector.clone()),
                Ok(false) => {}
                Err(e) => tracing::debug!(selector = %selector, error = %e, "selector probe failed"),
            }
        }
        None
    }
}

/// Owns the one browser context of a run and every page opened from it.
pub struct SessionManager {
    launcher: Box<dyn BrowserLauncher>,
    options: LaunchOptions,
    verifier: SessionVerifier,
    context: Option<Box<dyn BrowserContext>>,
    open_pages: Vec<Arc<dyn PageDriver>>,
}

impl SessionManager {
    pub fn new(launcher: Box<dyn BrowserLauncher>, options: LaunchOptions, verifier: SessionVerifier) -> Self {
        Self {
            launcher,
            options,
            verifier,
            context: None,
            open_pages: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.verifier.state()
    }

    pub fn verifier(&self) -> &SessionVerifier {
        &self.verifier
    }

    /// Launch the persistent context, or reuse the one already running.
    /// Launch failures are not retried.
    pub async fn initialize_browser(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Ok(());
        }
        let context = self
            .launcher
            .launch(&self.options)
            .await
            .context("failed to initialize browser")?;
        self.context = Some(context);
        self.verifier.set_state(SessionState::BrowserReady);
        Ok(())
    }

    /// Open a page, verify the session on it, and hand it to `f`. The page is
    /// closed afterwards whatever `f` returns; if the future is dropped
    /// instead, [`SessionManager::cleanup`] closes it.
    pub async fn with_page<T, F, Fut>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn PageDriver>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.initialize_browser().await?;
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| SweepError::Session("browser context missing".into()))?;
        let page = context.new_page().await.context("failed to open page")?;
        self.open_pages.push(page.clone());

        let result = match self.verifier.verify(page.as_ref()).await {
            Ok(_) => f(page.clone()).await,
            Err(e) => Err(e),
        };

        self.close_page(&page).await;
        result
    }

    async fn close_page(&mut self, page: &Arc<dyn PageDriver>) {
        self.open_pages.retain(|p| !Arc::ptr_eq(p, page));
        if let Err(e) = page.close().await {
            tracing::error!(error = %e, "error closing page");
        }
    }

    /// Close leftover pages and the context. Never fails; safe to repeat.
    pub async fn cleanup(&mut self) {
        for page in std::mem::take(&mut self.open_pages) {
            if let Err(e) = page.close().await {
                tracing::error!(error = %e, "error closing page during cleanup");
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                tracing::error!(error = %e, "error closing browser context");
            }
            tracing::info!("cleanup completed");
        }
        self.verifier.set_state(SessionState::Uninitialized);
    }
}
