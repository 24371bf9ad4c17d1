//! HTTP session setup: client construction, access-token resolution and
//! owner id lookup.
//!
//! Both lookups read `<meta>` tags out of HTML pages served by the site,
//! parsed with `scraper`. They run once, before any pool starts, so workers
//! only ever see a fully configured client.

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

/// Fixed owner id of the site-wide `grid` account
pub const SITE_GRID_OWNER_ID: u64 = 113_950;

/// Cookie carrying the access token
pub const TOKEN_COOKIE: &str = "vs";

#[allow(clippy::expect_used)]
static META_WITH_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[property][content]").expect("meta selector is valid"));

#[allow(clippy::expect_used)]
static TOKEN_IN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://im\.vsco\.co/\d/[0-9a-fA-F]*/(?P<token>[0-9a-fA-F]+)/")
        .expect("token pattern is valid")
});

#[allow(clippy::expect_used)]
static OWNER_IN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"user/(?P<user_id>\d+)/grid").expect("owner pattern is valid")
});

/// Content of the first `<meta property="...">` tag with the given property
///
/// Commented-out markup is ignored and attribute values come back with
/// character references decoded.
pub fn meta_content(html: &str, property: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&META_WITH_CONTENT)
        .find(|meta| meta.value().attr("property") == Some(property))
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
}

/// Source of the access token used for metadata requests
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolve a token using an unauthenticated client
    async fn resolve(&self, client: &reqwest::Client) -> Result<String>;
}

/// A token known up front
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenResolver for StaticToken {
    async fn resolve(&self, _client: &reqwest::Client) -> Result<String> {
        if self.0.is_empty() {
            return Err(Error::TokenResolution("empty token".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Reads the token out of the `og:image` URL of a public page
#[derive(Clone, Debug)]
pub struct PageTokenResolver {
    /// Page to fetch
    pub url: String,
}

impl PageTokenResolver {
    /// Resolver for the configured token page
    pub fn from_config(http: &HttpConfig) -> Self {
        Self {
            url: http.token_page.clone(),
        }
    }
}

#[async_trait]
impl TokenResolver for PageTokenResolver {
    async fn resolve(&self, client: &reqwest::Client) -> Result<String> {
        let html = get_text(client, &self.url)
            .await
            .map_err(|e| Error::TokenResolution(e.to_string()))?;
        let image_url = meta_content(&html, "og:image").ok_or_else(|| {
            Error::TokenResolution(format!("no og:image meta tag on {}", self.url))
        })?;
        let token = TOKEN_IN_URL
            .captures(&image_url)
            .and_then(|c| c.name("token"))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                tracing::debug!(url = %image_url, "couldn't get the token out of og:image");
                Error::TokenResolution(format!("no token in {image_url}"))
            })?;
        tracing::debug!("access token resolved");
        Ok(token)
    }
}

/// Build an HTTP client with the configured user agent and timeout; when a
/// token is given it is attached as the session cookie.
pub fn build_client(http: &HttpConfig, token: Option<&str>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&http.user_agent)
        .map_err(|e| Error::config("http.user_agent", e.to_string()))?;
    headers.insert(USER_AGENT, agent);
    if let Some(token) = token {
        let cookie = HeaderValue::from_str(&format!("{TOKEN_COOKIE}={token}"))
            .map_err(|e| Error::TokenResolution(format!("token is not a valid header: {e}")))?;
        headers.insert(COOKIE, cookie);
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(http.timeout())
        .build()?)
}

/// GET a URL and return its body as text; non-2xx is an error
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

/// GET a URL and parse its body as JSON; non-2xx is an error
pub async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.json().await?)
}

/// URL of an account's public grid page
pub fn grid_url(http: &HttpConfig, subdomain: &str) -> String {
    format!("{}/{}/grid/1", http.site_base.trim_end_matches('/'), subdomain)
}

/// Resolve the numeric owner id of an account.
///
/// The site-wide `grid` account has a fixed id; an explicit id wins over a
/// lookup; otherwise the id is read from the grid page's `al:ios:url` tag.
pub async fn resolve_owner_id(
    client: &reqwest::Client,
    http: &HttpConfig,
    subdomain: &str,
    explicit: Option<u64>,
) -> Result<u64> {
    if subdomain == "grid" {
        return Ok(SITE_GRID_OWNER_ID);
    }
    if let Some(id) = explicit {
        return Ok(id);
    }

    let url = grid_url(http, subdomain);
    let html = get_text(client, &url)
        .await
        .map_err(|e| Error::OwnerResolution(e.to_string()))?;
    let app_url = meta_content(&html, "al:ios:url")
        .ok_or_else(|| Error::OwnerResolution(format!("no al:ios:url meta tag on {url}")))?;

    OWNER_IN_URL
        .captures(&app_url)
        .and_then(|c| c.name("user_id"))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| {
            tracing::debug!(url = %app_url, "couldn't get the user_id out of al:ios:url");
            Error::OwnerResolution(format!("no user id in {app_url}"))
        })
}
