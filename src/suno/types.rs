use crate::config::ContractConfig;
use crate::engine::handle::Handle;
use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Following,
    Followers,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Followers => "followers",
        }
    }

    /// Web app page that lists these accounts.
    pub fn page_path(&self) -> String {
        format!("/me/{}", self.as_str())
    }

    /// API path the web app calls to fill that page.
    pub fn api_path(&self) -> String {
        format!("/api/profiles/{}", self.as_str())
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status, `Retry-After` and raw body of one platform API call.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default, rename = "retryAfter")]
    pub retry_after: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` as whole seconds, or `default` when absent or not an
    /// integer.
    pub fn retry_after_or(&self, default: Duration) -> Duration {
        self.retry_after
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    /// Start of the body, for log lines.
    pub fn excerpt(&self) -> &str {
        match self.body.char_indices().nth(EXCERPT_CHARS) {
            Some((end, _)) => &self.body[..end],
            None => &self.body,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnfollowRequest<'a> {
    pub unfollow: bool,
    pub handle: &'a str,
}

/// One page of a following/followers listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub total: Option<u64>,
    pub handles: Vec<Handle>,
    /// Entries without a usable handle.
    pub skipped: usize,
}

/// Parse a listing body. Anything that is not an object with a profiles
/// array is malformed; individual bad entries are only counted.
pub fn parse_listing(body: &str, contract: &ContractConfig) -> Result<ListingPage> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SweepError::MalformedResponse(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| SweepError::MalformedResponse("expected a JSON object".into()))?;
    let profiles = object
        .get(&contract.profiles_field)
        .ok_or_else(|| {
            SweepError::MalformedResponse(format!("no `{}` key in response", contract.profiles_field))
        })?
        .as_array()
        .ok_or_else(|| {
            SweepError::MalformedResponse(format!("`{}` is not an array", contract.profiles_field))
        })?;

    let mut page = ListingPage {
        total: object.get(&contract.total_field).and_then(|t| t.as_u64()),
        ..ListingPage::default()
    };
    for profile in profiles {
        match profile
            .get(&contract.handle_field)
            .and_then(|h| h.as_str())
            .and_then(Handle::parse)
        {
            Some(handle) => page.handles.push(handle),
            None => page.skipped += 1,
        }
    }
    Ok(page)
}

/// Pages needed for `total` items: ceiling division.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    u32::try_from(total.div_ceil(size)).unwrap_or(u32::MAX)
}
