//! Pagination planner: probes the metadata endpoint for the total entry count
//! and turns it into page descriptors.

use crate::error::{Error, Result};
use crate::session::get_json;
use crate::types::{Account, PageDescriptor};

/// Metadata page URL for one page of an account
pub fn media_url(api_base: &str, account: &Account, page: u64, size: u64) -> String {
    format!(
        "{}/{}/2.0/medias?site_id={}&page={}&size={}",
        api_base.trim_end_matches('/'),
        account.token,
        account.owner_id,
        page,
        size
    )
}

/// Number of pages needed to cover `total` entries, capped by `limit`
pub fn page_count(total: u64, page_size: u64, limit: Option<u64>) -> u64 {
    let needed = total.div_ceil(page_size.max(1));
    match limit {
        Some(limit) => needed.min(limit),
        None => needed,
    }
}

/// Descriptors for pages `1..=page_count(total, page_size, limit)`
pub fn build_pages(
    api_base: &str,
    account: &Account,
    total: u64,
    page_size: u64,
    limit: Option<u64>,
) -> Vec<PageDescriptor> {
    (1..=page_count(total, page_size, limit))
        .map(|page| PageDescriptor {
            page,
            size: page_size,
            url: media_url(api_base, account, page, page_size),
        })
        .collect()
}

/// Result of planning a metadata run
#[derive(Clone, Debug)]
pub struct PagePlan {
    /// Total entries reported by the probe
    pub total: u64,
    /// Pages to fetch, numbered from 1
    pub pages: Vec<PageDescriptor>,
}

/// Issue a one-entry probe and plan the pages needed to cover the account.
///
/// A probe that fails or lacks an integer `total` aborts the plan: either the
/// token is invalid or the endpoint changed shape, and fetching zero pages
/// would look like an empty account.
pub async fn plan_pages(
    client: &reqwest::Client,
    api_base: &str,
    account: &Account,
    page_size: u64,
    limit: Option<u64>,
) -> Result<PagePlan> {
    let probe_url = media_url(api_base, account, 1, 1);
    tracing::debug!(url = %probe_url, "probing metadata endpoint");

    let body = get_json(client, &probe_url).await?;
    let total = body
        .get("total")
        .and_then(|t| t.as_u64())
        .ok_or_else(|| Error::MissingField {
            field: "total".to_string(),
            url: probe_url.clone(),
        })?;

    let pages = build_pages(api_base, account, total, page_size, limit);
    tracing::debug!(total, pages = pages.len(), "built media urls");
    Ok(PagePlan { total, pages })
}
