//! Seam to the browser-automation engine.
//!
//! Everything above this module talks to a page through [`PageDriver`]; the
//! only implementation that touches a real browser is [`chromium`].

pub mod chromium;
pub mod session;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use session::{SessionManager, SessionState, SessionVerifier};

/// Hides `navigator.webdriver` from page scripts.
pub const STEALTH_INIT_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub viewport: (u32, u32),
    pub user_agent: String,
    pub init_script: String,
    pub blocked_url_patterns: Vec<String>,
}

impl LaunchOptions {
    pub fn from_config(config: &crate::config::BrowserConfig) -> Self {
        Self {
            user_data_dir: config.user_data_dir.clone(),
            headless: config.headless,
            executable: config.executable.clone(),
            viewport: config.viewport,
            user_agent: config.user_agent.clone(),
            init_script: STEALTH_INIT_SCRIPT.to_string(),
            blocked_url_patterns: config.blocked_url_patterns.clone(),
        }
    }
}

/// A response the page received, paired with the headers its request carried.
/// Header names are lowercased.
#[derive(Debug, Clone, Default)]
pub struct ObservedExchange {
    pub url: String,
    pub status: u16,
    pub request_headers: HashMap<String, String>,
    pub response_headers: HashMap<String, String>,
}

/// Live feed of exchanges. Dropping the receiver deregisters the observer.
pub type ExchangeStream = mpsc::UnboundedReceiver<ObservedExchange>;

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()>;

    /// Non-blocking check for an element. Supports a trailing
    /// `:has-text("...")` pseudo-class on top of plain CSS.
    async fn has_selector(&self, selector: &str) -> Result<bool>;

    async fn current_url(&self) -> Result<String>;

    /// Evaluate an expression in the page, awaiting it if it is a promise.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Start observing network exchanges made by this page.
    async fn observe_exchanges(&self) -> Result<ExchangeStream>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a persistent context bound to `options.user_data_dir`.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserContext>>;
}

/// Lowercase-keyed header map from a CDP-style JSON object.
pub fn headers_from_json(value: &serde_json::Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Null => return None,
                        other => other.to_string(),
                    };
                    Some((k.to_ascii_lowercase(), v))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_from_json_lowercases() {
        let json = serde_json::json!({
            "Authorization": "Bearer abc",
            "Device-Id": "d1",
            "X-Count": 3,
            "X-Null": null
        });
        let headers = headers_from_json(&json);
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(headers.get("device-id").unwrap(), "d1");
        assert_eq!(headers.get("x-count").unwrap(), "3");
        assert!(!headers.contains_key("x-null"));
    }

    #[test]
    fn test_headers_from_non_object() {
        assert!(headers_from_json(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn test_launch_options_from_config() {
        let config = crate::config::BrowserConfig::default();
        let options = LaunchOptions::from_config(&config);
        assert_eq!(options.viewport, (1920, 1080));
        assert!(options.init_script.contains("webdriver"));
        assert!(options.blocked_url_patterns.iter().any(|p| p == "*.png"));
    }
}
