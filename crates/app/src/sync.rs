use std::sync::Arc;

use metrics::counter;
use tracing::{error, info, warn};

use contentgen_providers::{LinkSynergyClient, LinkSynergyError};
use contentgen_storage::{Database, MerchantDetails, MerchantError, MerchantListing};
use contentgen_util::MerchantConfig;

use crate::pipeline::Clock;
use crate::throttle::Throttle;

/// Totals reported by a merchant sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub listed: u64,
    pub details_fetched: u64,
    pub failed: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("required environment variable {0} is not set")]
    MissingCredential(&'static str),
    #[error("failed to obtain access token: {0}")]
    Token(LinkSynergyError),
    #[error("failed to fetch merchant listing: {0}")]
    Listing(LinkSynergyError),
    #[error("merchant storage error: {0}")]
    Storage(#[from] MerchantError),
}

/// Mirrors the partner network's advertiser list into `merchants`.
pub struct MerchantSync {
    database: Database,
    client: LinkSynergyClient,
    throttle: Arc<Throttle>,
    credential: String,
    scope: String,
    clock: Clock,
}

impl MerchantSync {
    /// Validates the credentials before any network traffic happens.
    pub fn new(
        database: Database,
        client: LinkSynergyClient,
        throttle: Arc<Throttle>,
        config: &MerchantConfig,
        clock: Clock,
    ) -> Result<Self, SyncError> {
        let credential = config
            .bearer_token
            .clone()
            .ok_or(SyncError::MissingCredential("RAKUTEN_BEARER_TOKEN"))?;
        let scope = config
            .scope
            .clone()
            .ok_or(SyncError::MissingCredential("RAKUTEN_SCOPE"))?;

        Ok(Self {
            database,
            client,
            throttle,
            credential,
            scope,
            clock,
        })
    }

    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        info!(stage = "sync", "starting merchant sync");
        let token = self
            .client
            .access_token(&self.credential, &self.scope)
            .await
            .map_err(SyncError::Token)?;

        self.throttle.acquire().await;
        let listing = self
            .client
            .list_merchants(&token)
            .await
            .map_err(SyncError::Listing)?;
        if listing.is_empty() {
            warn!(stage = "sync", "advertiser listing is empty");
        }

        let rows: Vec<MerchantListing> = listing
            .into_iter()
            .map(|merchant| MerchantListing {
                advertiser_id: merchant.mid,
                name: merchant
                    .merchant_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect();
        self.database
            .merchants()
            .upsert_listing(&rows, (self.clock)())
            .await?;

        let mut summary = SyncSummary {
            listed: rows.len() as u64,
            ..SyncSummary::default()
        };
        info!(stage = "sync", listed = summary.listed, "merchant listing stored");

        // The id cursor moves past every merchant once, so failures are not retried in this run.
        let mut after_id = 0;
        while let Some(merchant) = self.database.merchants().next_pending(after_id).await? {
            after_id = merchant.id;
            self.throttle.acquire().await;

            let details = match self
                .client
                .merchant_details(&token, merchant.advertiser_id)
                .await
            {
                Ok(Some(details)) => details,
                Ok(None) => {
                    warn!(stage = "sync", advertiser = merchant.advertiser_id, "advertiser details were empty");
                    counter!("merchant_sync_total", "result" => "empty").increment(1);
                    summary.failed += 1;
                    continue;
                }
                Err(err) => {
                    error!(stage = "sync", advertiser = merchant.advertiser_id, error = %err, "failed to fetch advertiser details");
                    counter!("merchant_sync_total", "result" => "error").increment(1);
                    summary.failed += 1;
                    continue;
                }
            };

            let raw = details.raw.to_string();
            let stored = self
                .database
                .merchants()
                .store_details(
                    merchant.id,
                    &MerchantDetails {
                        name: details.name.as_deref(),
                        url: details.url.as_deref(),
                        description: details.description.as_deref(),
                        details_json: &raw,
                    },
                    (self.clock)(),
                )
                .await;

            match stored {
                Ok(_) => {
                    info!(stage = "sync", advertiser = merchant.advertiser_id, name = %details.name.as_deref().unwrap_or(&merchant.name), "merchant details stored");
                    counter!("merchant_sync_total", "result" => "ok").increment(1);
                    summary.details_fetched += 1;
                }
                Err(err) => {
                    error!(stage = "storage", advertiser = merchant.advertiser_id, error = %err, "failed to store advertiser details");
                    counter!("merchant_sync_total", "result" => "store_error").increment(1);
                    summary.failed += 1;
                }
            }
        }

        info!(
            stage = "sync",
            listed = summary.listed,
            details_fetched = summary.details_fetched,
            failed = summary.failed,
            "merchant sync finished"
        );
        Ok(summary)
    }
}
