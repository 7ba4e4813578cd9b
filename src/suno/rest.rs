use super::auth::CredentialBundle;
use super::types::{ApiResponse, ListingKind, UnfollowRequest};
use crate::browser::PageDriver;
use crate::engine::handle::Handle;
use anyhow::{Context, Result};
use async_trait::async_trait;

/// The two platform calls the sweep makes. Responses come back raw; status
/// handling belongs to the callers.
///
/// Both calls run inside `page`, so they carry the browser's cookies, user
/// agent and origin.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn fetch_listing(
        &self,
        page: &dyn PageDriver,
        kind: ListingKind,
        page_no: u32,
        credentials: &CredentialBundle,
    ) -> Result<ApiResponse>;

    async fn unfollow(
        &self,
        page: &dyn PageDriver,
        credentials: &CredentialBundle,
        handle: &Handle,
    ) -> Result<ApiResponse>;
}

pub struct SunoRest {
    api_base: String,
}

impl SunoRest {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn listing_url(&self, kind: ListingKind, page_no: u32) -> String {
        format!("{}{}?page={}", self.api_base, kind.api_path(), page_no)
    }

    pub fn follow_url(&self) -> String {
        format!("{}/api/profiles/follow", self.api_base)
    }

    async fn send(
        &self,
        page: &dyn PageDriver,
        method: &str,
        url: &str,
        credentials: &CredentialBundle,
        body: Option<&str>,
    ) -> Result<ApiResponse> {
        let value = page
            .evaluate(&fetch_script(method, url, credentials, body))
            .await
            .with_context(|| format!("in-page {} {} failed", method, url))?;
        serde_json::from_value(value).context("unexpected in-page fetch result")
    }
}

/// In-page `fetch` resolving to `{status, retryAfter, body}`. The browser
/// drops headers it controls itself (`origin`, `referer`) and fills them from
/// the page.
pub fn fetch_script(method: &str, url: &str, credentials: &CredentialBundle, body: Option<&str>) -> String {
    let headers: serde_json::Map<String, serde_json::Value> = credentials
        .headers()
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::from(v.as_str())))
        .collect();
    let mut init = serde_json::Map::new();
    init.insert("method".into(), method.into());
    init.insert("headers".into(), serde_json::Value::Object(headers));
    init.insert("credentials".into(), "include".into());
    if let Some(body) = body {
        init.insert("body".into(), body.into());
    }
    format!(
        "(async () => {{ \
         const response = await fetch({url}, {init}); \
         return {{ status: response.status, retryAfter: response.headers.get('retry-after'), body: await response.text() }}; \
         }})()",
        url = serde_json::Value::from(url),
        init = serde_json::Value::Object(init),
    )
}

#[async_trait]
impl PlatformApi for SunoRest {
    async fn fetch_listing(
        &self,
        page: &dyn PageDriver,
        kind: ListingKind,
        page_no: u32,
        credentials: &CredentialBundle,
    ) -> Result<ApiResponse> {
        let url = self.listing_url(kind, page_no);
        let resp = self.send(page, "GET", &url, credentials, None).await?;
        tracing::debug!(kind = %kind, page = page_no, status = resp.status, "listing fetched");
        Ok(resp)
    }

    async fn unfollow(
        &self,
        page: &dyn PageDriver,
        credentials: &CredentialBundle,
        handle: &Handle,
    ) -> Result<ApiResponse> {
        let body = serde_json::to_string(&UnfollowRequest {
            unfollow: true,
            handle: handle.as_str(),
        })?;
        let resp = self
            .send(page, "POST", &self.follow_url(), credentials, Some(&body))
            .await?;
        tracing::debug!(handle = %handle, status = resp.status, "follow endpoint answered");
        Ok(resp)
    }
}
