//! Paginated walk of the following/followers listings.

use crate::browser::PageDriver;
use crate::config::{ContractConfig, PacingConfig, PlatformConfig};
use crate::engine::handle::Handle;
use crate::error::{Result, SweepError};
use crate::suno::harvest::{HarvestTarget, Harvester};
use crate::suno::types::{parse_listing, total_pages, ListingKind, ListingPage};
use crate::suno::{CredentialBundle, PlatformApi};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct Collector {
    api: Arc<dyn PlatformApi>,
    harvester: Harvester,
    contract: ContractConfig,
    pacing: PacingConfig,
    page_size: u32,
}

impl Collector {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        harvester: Harvester,
        platform: &PlatformConfig,
        contract: &ContractConfig,
        pacing: &PacingConfig,
    ) -> Self {
        Self {
            api,
            harvester,
            contract: contract.clone(),
            pacing: pacing.clone(),
            page_size: platform.page_size,
        }
    }

    /// Every valid handle in the listing. Stops at the server-declared page
    /// count, or at the first page after page 1 that adds nothing new.
    pub async fn collect(&self, page: &dyn PageDriver, kind: ListingKind) -> Result<HashSet<Handle>> {
        tracing::info!(kind = %kind, "collecting");
        let mut credentials = self.harvester.harvest(page, HarvestTarget::Listing(kind)).await?;
        let mut handles = HashSet::new();
        let mut last_page: Option<u32> = None;
        let mut page_no = 1u32;

        loop {
            let listing = self.fetch_page(page, kind, page_no, &mut credentials).await?;
            if page_no == 1 {
                last_page = listing.total.map(|total| total_pages(total, self.page_size));
                tracing::info!(kind = %kind, total = ?listing.total, pages = ?last_page, "listing size");
            }
            if listing.skipped > 0 {
                tracing::debug!(kind = %kind, page = page_no, skipped = listing.skipped, "entries without a valid handle");
            }

            let before = handles.len();
            handles.extend(listing.handles);
            let added = handles.len() - before;
            tracing::info!(kind = %kind, page = page_no, added, collected = handles.len(), "page collected");

            if page_no > 1 && added == 0 {
                tracing::info!(kind = %kind, page = page_no, "no new handles, stopping");
                break;
            }
            match last_page {
                Some(last) if page_no < last => {}
                _ => break,
            }
            tokio::time::sleep(Duration::from_millis(self.pacing.page_delay_ms)).await;
            page_no += 1;
        }

        tracing::info!(kind = %kind, count = handles.len(), "collection complete");
        Ok(handles)
    }

    /// One page with local recovery. 5xx gateway errors use the attempt
    /// budget; a 401 re-harvests credentials under its own cap.
    async fn fetch_page(
        &self,
        page: &dyn PageDriver,
        kind: ListingKind,
        page_no: u32,
        credentials: &mut CredentialBundle,
    ) -> Result<ListingPage> {
        let max_attempts = self.pacing.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut refreshes = 0u32;

        loop {
            let resp = self.api.fetch_listing(page, kind, page_no, credentials).await?;
            match resp.status {
                200..=299 => return parse_listing(&resp.body, &self.contract),
                401 => {
                    if refreshes >= self.pacing.max_auth_refreshes {
                        return Err(SweepError::Unauthorized { refreshes });
                    }
                    refreshes += 1;
                    tracing::warn!(kind = %kind, page = page_no, refreshes, "auth expired, refreshing headers");
                    *credentials = self.harvester.refresh(page, HarvestTarget::Listing(kind)).await?;
                }
                429 => {
                    let wait = resp.retry_after_or(Duration::from_secs(self.pacing.default_retry_after_s));
                    tracing::warn!(kind = %kind, page = page_no, wait = ?wait, "rate limited while collecting");
                    return Err(SweepError::RateLimited(wait));
                }
                502..=504 => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(SweepError::TransientHttp {
                            status: resp.status,
                            attempts,
                        });
                    }
                    tracing::warn!(
                        kind = %kind,
                        page = page_no,
                        status = resp.status,
                        attempt = attempts,
                        "gateway error, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(self.pacing.transient_backoff_s)).await;
                }
                status => {
                    tracing::error!(kind = %kind, page = page_no, status, body = %resp.excerpt(), "listing request failed");
                    return Err(SweepError::Http {
                        status,
                        body: resp.excerpt().to_string(),
                    });
                }
            }
        }
    }
}
