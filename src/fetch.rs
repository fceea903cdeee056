//! Resilient HTTP fetch layer: timeout, capped retries, exponential backoff
//! with full jitter. Exhaustion is an item-scoped failure the caller can
//! skip past, never a process-fatal condition.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FetchError;

/// A fetched page: final HTTP status and decoded body.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

/// Anything that can fetch pages under the resilient contract. Implemented
/// by the direct [`Fetcher`] and by the [`RenderClient`] proxy variant;
/// callers cannot tell them apart.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch a page, retrying per the backoff policy.
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;

    /// Fetch a raw body (image bytes), same retry contract.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Retry schedule: up to `max_attempts` tries, sleeping a uniform random
/// duration in `[0, backoff)` between tries, with `backoff` doubling each
/// time from `initial_backoff`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl BackoffPolicy {
    /// Production default: long waits to stay under anti-scraping limits.
    pub fn production() -> Self {
        BackoffPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(30),
        }
    }

    /// Short waits for less-sensitive crawl targets.
    pub fn fast() -> Self {
        BackoffPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }

    /// A single attempt, no sleeping. Used by the liveness sweep where a
    /// dead link is the interesting outcome, not something to retry.
    pub fn single_attempt() -> Self {
        BackoffPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Uniform random jitter in `[0, backoff)`.
    pub(crate) fn jitter(&self, backoff: Duration) -> Duration {
        backoff.mul_f64(rand::random::<f64>())
    }
}

/// One failed attempt, for logging and for the terminal error.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    Status(u16),
    Transport(String),
}

/// Drive `attempt` under the policy. Sleeps between failures; after the
/// last failure returns immediately with the exhaustion error.
pub(crate) async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    url: &str,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, AttemptFailure>> + Send,
    T: Send,
{
    let mut backoff = policy.initial_backoff;
    let mut last_status = None;

    for tries in 1..=policy.max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptFailure::Status(status)) => {
                warn!(url, status, "non-success status");
                last_status = Some(status);
            }
            Err(AttemptFailure::Transport(error)) => {
                warn!(url, %error, "request failed");
            }
        }

        if tries < policy.max_attempts {
            let wait = policy.jitter(backoff);
            info!(url, wait_ms = wait.as_millis() as u64, "retrying after backoff");
            tokio::time::sleep(wait).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    Err(FetchError::RetriesExhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
        last_status,
    })
}

/// Direct HTTP fetcher.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: BackoffPolicy,
}

impl Fetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        policy: BackoffPolicy,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Fetcher { client, policy })
    }

    async fn get_once(&self, url: &str) -> Result<reqwest::Response, AttemptFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(AttemptFailure::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl Fetch for Fetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        with_backoff(&self.policy, url, || async move {
            let response = self.get_once(url).await?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| AttemptFailure::Transport(e.to_string()))?;
            Ok(Page { status, body })
        })
        .await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        with_backoff(&self.policy, url, || async move {
            let response = self.get_once(url).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AttemptFailure::Transport(e.to_string()))?;
            Ok(bytes.to_vec())
        })
        .await
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    #[serde(rename = "browserHtml")]
    browser_html: bool,
}

#[derive(Deserialize)]
struct RenderResponse {
    #[serde(rename = "browserHtml")]
    browser_html: Option<String>,
    #[serde(rename = "statusCode")]
    status_code: Option<u16>,
}

/// Fetch variant routed through an upstream rendering proxy, for
/// JavaScript-heavy targets. Same `(status, body)` contract as the direct
/// fetcher; image bytes still go direct.
#[derive(Clone)]
pub struct RenderClient {
    client: reqwest::Client,
    direct: Fetcher,
    endpoint: String,
    api_key: String,
    policy: BackoffPolicy,
}

impl RenderClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        direct: Fetcher,
        policy: BackoffPolicy,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(RenderClient {
            client,
            direct,
            endpoint,
            api_key,
            policy,
        })
    }

    async fn render_once(&self, url: &str) -> Result<RenderResponse, AttemptFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.api_key, Some(""))
            .json(&RenderRequest {
                url,
                browser_html: true,
            })
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status.as_u16()));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;
        Ok(rendered)
    }
}

/// A proxy answer that arrived intact but carries no usable HTML is
/// terminal; retrying re-renders the same page at cost.
fn rendered_page(url: &str, rendered: RenderResponse) -> Result<Page, FetchError> {
    match rendered.browser_html {
        Some(body) if !body.is_empty() => Ok(Page {
            status: rendered.status_code.unwrap_or(200),
            body,
        }),
        _ => Err(FetchError::Render {
            url: url.to_string(),
            reason: "empty rendered body".to_string(),
        }),
    }
}

#[async_trait]
impl Fetch for RenderClient {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let rendered = with_backoff(&self.policy, url, || self.render_once(url)).await?;
        rendered_page(url, rendered)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.direct.fetch_bytes(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn test_policy() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = test_policy();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_backoff(&policy, "http://t", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 3 {
                    Err(AttemptFailure::Status(503))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Three sleeps, bounded by the doubling schedule: 1s + 2s + 4s.
        assert!(start.elapsed() <= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_stops_at_max_attempts() {
        let policy = test_policy();
        let calls = AtomicU32::new(0);

        let err = with_backoff::<(), _, _>(&policy, "http://t", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptFailure::Status(500)) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            FetchError::RetriesExhausted {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_status, Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success_never_sleeps() {
        let policy = test_policy();
        let start = Instant::now();

        let value = with_backoff(&policy, "http://t", || async { Ok(42) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_reports_status() {
        let policy = BackoffPolicy::single_attempt();
        let err = with_backoff::<(), _, _>(&policy, "http://t", || async {
            Err(AttemptFailure::Status(404))
        })
        .await
        .unwrap_err();

        assert_eq!(err.last_status(), Some(404));
    }

    #[test]
    fn empty_rendered_body_is_a_terminal_render_error() {
        let err = rendered_page(
            "http://t",
            RenderResponse {
                browser_html: None,
                status_code: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::Render { .. }));

        let err = rendered_page(
            "http://t",
            RenderResponse {
                browser_html: Some(String::new()),
                status_code: Some(200),
            },
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::Render { .. }));

        let page = rendered_page(
            "http://t",
            RenderResponse {
                browser_html: Some("<html>".to_string()),
                status_code: None,
            },
        )
        .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<html>");
    }

    #[test]
    fn jitter_stays_below_backoff() {
        let policy = test_policy();
        let backoff = Duration::from_secs(8);
        for _ in 0..1000 {
            assert!(policy.jitter(backoff) < backoff);
        }
    }
}
