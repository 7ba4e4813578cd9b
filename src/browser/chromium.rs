//! Chrome DevTools Protocol implementation of the browser seam.

use super::{
    headers_from_json, BrowserContext, BrowserLauncher, ExchangeStream, LaunchOptions,
    ObservedExchange, PageDriver, WaitUntil,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived, RequestId, SetBlockedUrLsParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// chromiumoxide's `goto` resolves on the load event; network-idle callers
/// get this extra quiet period on top.
const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(500);

pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserContext>> {
        let (width, height) = options.viewport;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--ignore-certificate-errors");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(ref exe) = options.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler error");
                }
            }
        });

        tracing::info!(
            dir = %options.user_data_dir.display(),
            headless = options.headless,
            "browser initialized with persistent context"
        );

        Ok(Box::new(ChromiumContext {
            browser: Mutex::new(browser),
            handler: Mutex::new(Some(handler_task)),
            user_agent: options.user_agent.clone(),
            init_script: options.init_script.clone(),
            blocked_url_patterns: options.blocked_url_patterns.clone(),
        }))
    }
}

struct ChromiumContext {
    browser: Mutex<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    user_agent: String,
    init_script: String,
    blocked_url_patterns: Vec<String>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .context("failed to set user agent")?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            self.init_script.clone(),
        ))
        .await
        .context("failed to install init script")?;
        if !self.blocked_url_patterns.is_empty() {
            page.execute(EnableParams::default())
                .await
                .context("failed to enable network domain")?;
            page.execute(SetBlockedUrLsParams::new(self.blocked_url_patterns.clone()))
                .await
                .context("failed to block resource URLs")?;
        }

        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "browser process wait failed");
        }
        if let Some(task) = self.handler.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("navigation to {} timed out after {:?}", url, timeout))?
            .with_context(|| format!("navigation to {} failed", url))?;
        if wait == WaitUntil::NetworkIdle {
            tokio::time::sleep(NETWORK_IDLE_GRACE).await;
        }
        Ok(())
    }

    async fn has_selector(&self, selector: &str) -> Result<bool> {
        let script = SelectorQuery::parse(selector).to_script();
        let value = self.evaluate(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.context("failed to read page URL")?.unwrap_or_default())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("invalid evaluate params: {}", e))?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("script evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn observe_exchanges(&self) -> Result<ExchangeStream> {
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to subscribe to requests")?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to responses")?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut pending: HashMap<RequestId, HashMap<String, String>> = HashMap::new();
            // Events are fanned out in protocol order, so a buffered response
            // always has its request buffered ahead of it. Drain requests first.
            loop {
                tokio::select! {
                    biased;
                    _ = tx.closed() => break,
                    Some(event) = requests.next() => {
                        pending.insert(event.request_id.clone(), headers_from_json(event.request.headers.inner()));
                    }
                    Some(event) = responses.next() => {
                        let mut request_headers = pending.remove(&event.request_id).unwrap_or_default();
                        if let Some(ref extra) = event.response.request_headers {
                            for (k, v) in headers_from_json(extra.inner()) {
                                request_headers.entry(k).or_insert(v);
                            }
                        }
                        let exchange = ObservedExchange {
                            url: event.response.url.clone(),
                            status: u16::try_from(event.response.status).unwrap_or(0),
                            request_headers,
                            response_headers: headers_from_json(event.response.headers.inner()),
                        };
                        if tx.send(exchange).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.context("failed to close page")?;
        Ok(())
    }
}

/// A CSS selector, optionally narrowed by a trailing `:has-text("...")`.
#[derive(Debug, PartialEq, Eq)]
struct SelectorQuery<'a> {
    css: &'a str,
    text: Option<&'a str>,
}

impl<'a> SelectorQuery<'a> {
    fn parse(selector: &'a str) -> Self {
        let selector = selector.trim();
        if let Some(start) = selector.rfind(":has-text(") {
            let inner = &selector[start + ":has-text(".len()..];
            if let Some(quoted) = inner.strip_suffix(')') {
                let text = quoted
                    .strip_prefix('"')
                    .and_then(|q| q.strip_suffix('"'))
                    .or_else(|| quoted.strip_prefix('\'').and_then(|q| q.strip_suffix('\'')));
                if let Some(text) = text {
                    let css = selector[..start].trim();
                    return Self {
                        css: if css.is_empty() { "*" } else { css },
                        text: Some(text),
                    };
                }
            }
        }
        Self { css: selector, text: None }
    }

    /// Expression yielding `true` when a match exists. Invalid selectors
    /// evaluate to `false` rather than throwing.
    fn to_script(&self) -> String {
        let css = serde_json::Value::from(self.css).to_string();
        match self.text {
            None => format!(
                "(() => {{ try {{ return document.querySelector({css}) !== null; }} catch (e) {{ return false; }} }})()"
            ),
            Some(text) => {
                let text = serde_json::Value::from(text.to_lowercase()).to_string();
                format!(
                    "(() => {{ try {{ for (const el of document.querySelectorAll({css})) {{ \
                     if ((el.textContent || '').toLowerCase().includes({text})) return true; }} \
                     return false; }} catch (e) {{ return false; }} }})()"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_selector() {
        let q = SelectorQuery::parse(".profile-section");
        assert_eq!(q, SelectorQuery { css: ".profile-section", text: None });
        assert!(q.to_script().contains("document.querySelector(\".profile-section\")"));
    }

    #[test]
    fn test_has_text_selector() {
        let q = SelectorQuery::parse("button:has-text(\"Following\")");
        assert_eq!(q, SelectorQuery { css: "button", text: Some("Following") });
        let script = q.to_script();
        assert!(script.contains("querySelectorAll(\"button\")"));
        assert!(script.contains("includes(\"following\")"));
    }

    #[test]
    fn test_has_text_single_quotes_and_bare() {
        assert_eq!(
            SelectorQuery::parse("a:has-text('My Profile')"),
            SelectorQuery { css: "a", text: Some("My Profile") }
        );
        assert_eq!(
            SelectorQuery::parse(":has-text(\"Hi\")"),
            SelectorQuery { css: "*", text: Some("Hi") }
        );
    }

    #[test]
    fn test_unterminated_has_text_is_left_as_css() {
        let q = SelectorQuery::parse("button:has-text(Following");
        assert_eq!(q.text, None);
    }

    #[test]
    fn test_attribute_selector_is_escaped() {
        let script = SelectorQuery::parse("[data-testid=\"profile\"]").to_script();
        assert!(script.contains("\"[data-testid=\\\"profile\\\"]\""));
    }
}
