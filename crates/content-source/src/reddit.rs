//! Reddit listing client.
//!
//! Uses application-only OAuth (`client_credentials`) against
//! `oauth.reddit.com` when credentials are configured, and the public `.json`
//! listings otherwise. Every request passes through the shared token bucket,
//! and transient failures are retried with backoff before surfacing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use reelsmith_common::config::SourceConfig;
use reelsmith_common::error::{is_transient_status, FetchError};
use reelsmith_common::{retry_async, RetryPolicy, TokenBucket};
use reelsmith_story_model::CandidateItem;

use crate::query::FetchQuery;
use crate::{AccessMode, ContentSource};

const PROVIDER: &str = "reddit";

/// Reddit caps listing pages at 100 children.
const MAX_PAGE_SIZE: usize = 100;

/// Pages requested per category before giving up on filling the limit.
const MAX_PAGES: usize = 5;

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RedditListing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<RedditChild>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    #[serde(default)]
    kind: String,
    data: RedditPost,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RedditPost {
    id: String,
    subreddit: String,
    title: String,
    selftext: String,
    author: Option<String>,
    permalink: String,
    score: i64,
    num_comments: u64,
    over_18: bool,
    is_self: bool,
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Content source backed by the Reddit API.
pub struct RedditClient {
    http: reqwest::Client,
    config: SourceConfig,
    retry: RetryPolicy,
    bucket: Arc<TokenBucket>,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(
        config: &SourceConfig,
        retry: RetryPolicy,
        bucket: Arc<TokenBucket>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| FetchError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config: config.clone(),
            retry,
            bucket,
            token: Mutex::new(None),
        })
    }

    pub fn access_mode(&self) -> AccessMode {
        if self.credentials().is_some() {
            AccessMode::OAuth
        } else {
            AccessMode::Public
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.config.client_id.as_deref()?.trim();
        let secret = self.config.client_secret.as_deref()?.trim();
        (!id.is_empty() && !secret.is_empty()).then_some((id, secret))
    }

    fn base_url(&self) -> &str {
        let base = match self.access_mode() {
            AccessMode::OAuth => &self.config.api_base,
            AccessMode::Public => &self.config.public_base,
        };
        base.trim_end_matches('/')
    }

    /// Bearer token for OAuth mode, refreshed when close to expiry.
    async fn bearer(&self) -> Result<Option<String>, FetchError> {
        let Some((client_id, client_secret)) = self.credentials() else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(Some(token.value.clone()));
        }

        let url = format!(
            "{}/api/v1/access_token",
            self.config.public_base.trim_end_matches('/')
        );
        self.bucket.acquire().await;
        let response = self
            .http
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &body, "access token"));
        }

        let token = parse_token_response(&body)?;
        tracing::info!(
            expires_in_secs = token
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs(),
            "Obtained Reddit access token"
        );
        let value = token.value.clone();
        *cached = Some(token);
        Ok(Some(value))
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let bearer = self.bearer().await?;
        self.bucket.acquire().await;

        let mut request = self.http.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &body, url));
        }
        serde_json::from_str(&body).map_err(|e| FetchError::decode(format!("{url}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        tracing::debug!(url, "Reddit request");
        retry_async(&self.retry, "reddit request", || self.get_json_once::<T>(url)).await
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<CandidateItem>, FetchError> {
        let oauth = self.access_mode() == AccessMode::OAuth;
        let mut items = Vec::with_capacity(query.limit);
        let mut after: Option<String> = None;
        let mut skipped = 0usize;

        tracing::info!(
            category = %query.category,
            sort = %query.sort,
            time_filter = %query.time_filter,
            limit = query.limit,
            "Fetching Reddit listing"
        );

        for _ in 0..MAX_PAGES {
            if items.len() >= query.limit {
                break;
            }
            let page_size = (query.limit - items.len()).clamp(25, MAX_PAGE_SIZE);
            let url = listing_url(self.base_url(), query, oauth, page_size, after.as_deref());
            let listing: RedditListing = self.get_json(&url).await?;

            let page_len = listing.data.children.len();
            for child in listing.data.children {
                match listing_candidate(child, &query.category) {
                    Some(item) if items.len() < query.limit => items.push(item),
                    Some(_) => {}
                    None => skipped += 1,
                }
            }

            after = listing.data.after;
            if after.is_none() || page_len == 0 {
                break;
            }
        }

        tracing::info!(
            category = %query.category,
            fetched = items.len(),
            skipped_non_text = skipped,
            "Fetched Reddit listing"
        );
        Ok(items)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<CandidateItem, FetchError> {
        let post_id = normalize_post_id(id).ok_or_else(|| FetchError::NotFound {
            id: id.to_string(),
        })?;
        let suffix = match self.access_mode() {
            AccessMode::OAuth => "",
            AccessMode::Public => ".json",
        };
        let url = format!("{}/by_id/t3_{post_id}{suffix}?raw_json=1", self.base_url());

        let listing: RedditListing = self.get_json(&url).await?;
        let post = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .find(|post| post.id == post_id)
            .ok_or_else(|| FetchError::NotFound {
                id: post_id.clone(),
            })?;

        tracing::info!(item_id = %post_id, subreddit = %post.subreddit, "Fetched Reddit post");
        let category = post.subreddit.clone();
        Ok(post_to_item(post, &category))
    }

    async fn test_connection(&self) -> Result<AccessMode, FetchError> {
        let category = self
            .config
            .categories
            .first()
            .cloned()
            .unwrap_or_else(|| "popular".to_string());
        let query = FetchQuery::new(category, 1);
        let url = listing_url(
            self.base_url(),
            &query,
            self.access_mode() == AccessMode::OAuth,
            1,
            None,
        );
        let _: RedditListing = self.get_json(&url).await?;
        let mode = self.access_mode();
        tracing::info!(mode = %mode, "Reddit connection test succeeded");
        Ok(mode)
    }
}

/// Listing URL for one page of `query`.
fn listing_url(
    base: &str,
    query: &FetchQuery,
    oauth: bool,
    page_size: usize,
    after: Option<&str>,
) -> String {
    let category = query
        .category
        .trim()
        .trim_start_matches("/r/")
        .trim_start_matches("r/")
        .trim_end_matches('/');
    let suffix = if oauth { "" } else { ".json" };
    let mut url = format!(
        "{base}/r/{category}/{sort}{suffix}?limit={page_size}&raw_json=1",
        sort = query.sort
    );
    if query.sort.uses_time_filter() {
        url.push_str("&t=");
        url.push_str(query.time_filter.as_str());
    }
    if let Some(after) = after {
        url.push_str("&after=");
        url.push_str(after);
    }
    url
}

/// Accept a bare id, a `t3_` fullname, or a post permalink.
fn normalize_post_id(input: &str) -> Option<String> {
    let input = input.trim();
    let id = match input.split_once("/comments/") {
        Some((_, rest)) => rest.split(['/', '?']).next().unwrap_or(""),
        None => input.trim_start_matches("t3_"),
    };
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| id.to_ascii_lowercase())
}

/// Text posts with a non-empty body become candidates; everything else is skipped.
fn listing_candidate(child: RedditChild, category: &str) -> Option<CandidateItem> {
    if !child.kind.is_empty() && child.kind != "t3" {
        return None;
    }
    let post = child.data;
    if !post.is_self {
        tracing::debug!(item_id = %post.id, "Skipping non-text post");
        return None;
    }
    if post.selftext.trim().is_empty() {
        tracing::debug!(item_id = %post.id, "Skipping post with empty body");
        return None;
    }
    Some(post_to_item(post, category))
}

fn post_to_item(post: RedditPost, fallback_category: &str) -> CandidateItem {
    let category = if post.subreddit.is_empty() {
        fallback_category.to_string()
    } else {
        post.subreddit
    };
    CandidateItem {
        url: format!("https://www.reddit.com{}", post.permalink),
        id: post.id,
        category,
        title: post.title,
        body: post.selftext,
        author: post.author.unwrap_or_else(|| "[deleted]".to_string()),
        score: post.score,
        num_comments: post.num_comments,
        nsfw: post.over_18,
        created_utc: post.created_utc,
    }
}

fn parse_token_response(body: &str) -> Result<CachedToken, FetchError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| FetchError::decode(format!("access token: {e}")))?;
    if let Some(error) = response.error {
        return Err(FetchError::Auth {
            provider: PROVIDER.to_string(),
            message: error,
        });
    }
    let value = response.access_token.ok_or_else(|| FetchError::Auth {
        provider: PROVIDER.to_string(),
        message: "token response carried no access_token".to_string(),
    })?;
    Ok(CachedToken {
        value,
        expires_at: Instant::now() + Duration::from_secs(response.expires_in.unwrap_or(3600)),
    })
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::decode(err.to_string())
    } else {
        FetchError::network(err.to_string())
    }
}

/// Map a non-success HTTP status to the fetch taxonomy.
///
/// A 403 carrying a `reason` (private or banned subreddit) is a missing
/// resource, not rejected credentials.
fn status_error(status: u16, body: &str, context: &str) -> FetchError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        403 if body.contains("\"reason\"") => FetchError::NotFound {
            id: context.to_string(),
        },
        401 | 403 => FetchError::Auth {
            provider: PROVIDER.to_string(),
            message: format!("HTTP {status}: {snippet}"),
        },
        404 => FetchError::NotFound {
            id: context.to_string(),
        },
        429 => FetchError::RateLimited {
            message: format!("HTTP 429 from {context}"),
        },
        s if is_transient_status(s) => FetchError::network(format!("HTTP {s} from {context}")),
        s => FetchError::decode(format!("unexpected HTTP {s} from {context}: {snippet}")),
    }
}
