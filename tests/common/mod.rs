// Shared in-memory doubles for the browser seam and the platform API.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use suno_unfollow::browser::{
    BrowserContext, BrowserLauncher, ExchangeStream, LaunchOptions, ObservedExchange, PageDriver,
    WaitUntil,
};
use suno_unfollow::config::Config;
use suno_unfollow::engine::Handle;
use suno_unfollow::suno::{ApiResponse, CredentialBundle, ListingKind, PlatformApi};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const BASE_URL: &str = "https://suno.test";
pub const API_BASE: &str = "https://api.suno.test";

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.platform.base_url = BASE_URL.to_string();
    config.platform.api_base = API_BASE.to_string();
    config.browser.user_data_dir = dir.join("profile");
    config.progress.ledger_path = dir.join("unfollow_progress.txt");
    config
}

pub fn handle(name: &str) -> Handle {
    Handle::parse(name).unwrap()
}

pub fn profiles_body(handles: &[String], total: u64) -> String {
    let profiles: Vec<serde_json::Value> = handles
        .iter()
        .map(|h| serde_json::json!({ "handle": h, "display_name": h.to_uppercase() }))
        .collect();
    serde_json::json!({ "num_total_profiles": total, "profiles": profiles }).to_string()
}

/// `user00`..`user{total-1}`, served `page_size` at a time.
pub fn numbered_page(page_no: u32, total: u64, page_size: u64) -> ApiResponse {
    let start = u64::from(page_no - 1) * page_size;
    let end = (start + page_size).min(total);
    let handles: Vec<String> = (start..end).map(|i| format!("user{:02}", i)).collect();
    ApiResponse::new(200, profiles_body(&handles, total))
}

pub fn ledger_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// A page that fires a listing API exchange whenever it is sent to one of
/// the `/me/following` or `/me/followers` pages.
pub struct MockPage {
    selectors: Mutex<HashSet<String>>,
    url_override: Mutex<Option<String>>,
    visits: Mutex<Vec<String>>,
    observers: Mutex<Vec<mpsc::UnboundedSender<ObservedExchange>>>,
    tokens: AtomicU32,
    silent: AtomicBool,
    anonymous: AtomicBool,
    closed: AtomicBool,
}

impl MockPage {
    /// Logged in: the profile widget and the Following button are present.
    pub fn logged_in() -> Arc<Self> {
        Self::with_selectors(&[".profile-section", "button:has-text(\"Following\")"])
    }

    pub fn with_selectors(selectors: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            selectors: Mutex::new(selectors.iter().map(|s| s.to_string()).collect()),
            url_override: Mutex::new(None),
            visits: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            tokens: AtomicU32::new(0),
            silent: AtomicBool::new(false),
            anonymous: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_current_url(&self, url: &str) {
        *self.url_override.lock().unwrap() = Some(url.to_string());
    }

    /// Stop firing API exchanges, as when the web app changes its calls.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Fire the profile calls without an authorization header only.
    pub fn set_anonymous(&self, anonymous: bool) {
        self.anonymous.store(anonymous, Ordering::SeqCst);
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn visits_to(&self, url: &str) -> usize {
        self.visits().iter().filter(|v| v.as_str() == url).count()
    }

    pub fn tokens_minted(&self) -> u32 {
        self.tokens.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock().unwrap();
        observers.retain(|tx| !tx.is_closed());
        observers.len()
    }

    fn emit(&self, kind: &str) {
        if self.silent.load(Ordering::SeqCst) {
            return;
        }
        let feed = ObservedExchange {
            url: format!("{}/api/feed", API_BASE),
            status: 200,
            ..ObservedExchange::default()
        };
        // The app's unauthenticated warm-up call hits the same path.
        let warm_up = ObservedExchange {
            url: format!("{}/api/profiles/{}?page=1", API_BASE, kind),
            status: 200,
            ..ObservedExchange::default()
        };
        let mut exchanges = vec![feed, warm_up];

        if !self.anonymous.load(Ordering::SeqCst) {
            let token = self.tokens.fetch_add(1, Ordering::SeqCst) + 1;
            let mut exchange = ObservedExchange {
                url: format!("{}/api/profiles/{}?page=1", API_BASE, kind),
                status: 200,
                ..ObservedExchange::default()
            };
            exchange
                .request_headers
                .insert("authorization".into(), format!("Bearer tok-{}", token));
            exchange.request_headers.insert("device-id".into(), "device-1".into());
            exchange.response_headers.insert("session-id".into(), format!("sess-{}", token));
            exchanges.push(exchange);
        }

        self.observers
            .lock()
            .unwrap()
            .retain(|tx| exchanges.iter().all(|e| tx.send(e.clone()).is_ok()));
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<()> {
        self.visits.lock().unwrap().push(url.to_string());
        if url.ends_with("/me/following") {
            self.emit("following");
        } else if url.ends_with("/me/followers") {
            self.emit("followers");
        }
        Ok(())
    }

    async fn has_selector(&self, selector: &str) -> Result<bool> {
        Ok(self.selectors.lock().unwrap().contains(selector))
    }

    async fn current_url(&self) -> Result<String> {
        if let Some(url) = self.url_override.lock().unwrap().clone() {
            return Ok(url);
        }
        Ok(self.visits().last().cloned().unwrap_or_default())
    }

    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn observe_exchanges(&self) -> Result<ExchangeStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type ListingFn = Box<dyn FnMut(ListingKind, u32) -> ApiResponse + Send>;

#[derive(Debug, Clone)]
pub struct ListingCall {
    pub kind: ListingKind,
    pub page: u32,
    pub authorization: Option<String>,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct UnfollowCall {
    pub handle: String,
    pub at: Instant,
    pub content_type: Option<String>,
}

/// Scripted platform API. Unfollow answers 204 once its queue is empty.
pub struct MockApi {
    listing: Mutex<ListingFn>,
    unfollow_responses: Mutex<VecDeque<ApiResponse>>,
    listing_calls: Mutex<Vec<ListingCall>>,
    unfollow_calls: Mutex<Vec<UnfollowCall>>,
}

impl MockApi {
    pub fn new(listing: impl FnMut(ListingKind, u32) -> ApiResponse + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            listing: Mutex::new(Box::new(listing)),
            unfollow_responses: Mutex::new(VecDeque::new()),
            listing_calls: Mutex::new(Vec::new()),
            unfollow_calls: Mutex::new(Vec::new()),
        })
    }

    /// Following and followers served as single pages.
    pub fn with_graph(following: &[&str], followers: &[&str]) -> Arc<Self> {
        let following: Vec<String> = following.iter().map(|s| s.to_string()).collect();
        let followers: Vec<String> = followers.iter().map(|s| s.to_string()).collect();
        Self::new(move |kind, _page| {
            let handles = match kind {
                ListingKind::Following => &following,
                ListingKind::Followers => &followers,
            };
            ApiResponse::new(200, profiles_body(handles, handles.len() as u64))
        })
    }

    pub fn queue_unfollow(&self, responses: impl IntoIterator<Item = ApiResponse>) {
        self.unfollow_responses.lock().unwrap().extend(responses);
    }

    pub fn listing_calls(&self) -> Vec<ListingCall> {
        self.listing_calls.lock().unwrap().clone()
    }

    pub fn unfollow_calls(&self) -> Vec<UnfollowCall> {
        self.unfollow_calls.lock().unwrap().clone()
    }

    pub fn unfollowed_handles(&self) -> Vec<String> {
        self.unfollow_calls().into_iter().map(|c| c.handle).collect()
    }
}

#[async_trait]
impl PlatformApi for MockApi {
    async fn fetch_listing(
        &self,
        _page: &dyn PageDriver,
        kind: ListingKind,
        page_no: u32,
        credentials: &CredentialBundle,
    ) -> Result<ApiResponse> {
        self.listing_calls.lock().unwrap().push(ListingCall {
            kind,
            page: page_no,
            authorization: credentials.get("authorization").map(str::to_string),
            at: Instant::now(),
        });
        let mut listing = self.listing.lock().unwrap();
        let respond = &mut *listing;
        Ok(respond(kind, page_no))
    }

    async fn unfollow(
        &self,
        _page: &dyn PageDriver,
        credentials: &CredentialBundle,
        handle: &Handle,
    ) -> Result<ApiResponse> {
        self.unfollow_calls.lock().unwrap().push(UnfollowCall {
            handle: handle.to_string(),
            at: Instant::now(),
            content_type: credentials.get("content-type").map(str::to_string),
        });
        Ok(self
            .unfollow_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ApiResponse::new(204, "")))
    }
}

/// Hands out the same [`MockPage`] for every `new_page`.
pub struct MockLauncher {
    pub page: Arc<MockPage>,
    pub launches: Arc<AtomicU32>,
    pub context_closed: Arc<AtomicBool>,
}

impl MockLauncher {
    pub fn new(page: Arc<MockPage>) -> Self {
        Self {
            page,
            launches: Arc::new(AtomicU32::new(0)),
            context_closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct MockContext {
    page: Arc<MockPage>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn BrowserContext>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            page: self.page.clone(),
            closed: self.context_closed.clone(),
        }))
    }
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>> {
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
