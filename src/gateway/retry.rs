use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(super) const BASE_DELAY: Duration = Duration::from_secs(2);
pub(super) const MAX_DELAY: Duration = Duration::from_secs(60);

/// Overload and throttling responses worth another attempt. Anything else is
/// returned to the caller, which has its own fallback chain.
pub(super) fn is_retryable(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let code = status.as_u16();
    if code == 503 || code == 529 {
        return true;
    }
    if status.is_success() {
        return false;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("throttl")
}

pub(super) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(super) async fn wait_with_backoff(
    operation: &str,
    attempt: usize,
    max_attempts: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = match retry_after {
        Some(requested) if requested > delay => requested.min(MAX_DELAY),
        _ => delay,
    };
    warn!(
        "{} throttled; retrying in {:.1}s (attempt {}/{})",
        operation,
        wait.as_secs_f32(),
        attempt,
        max_attempts
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(super) fn next_delay(current: Duration) -> Duration {
    let next = Duration::from_secs(current.as_secs().saturating_mul(2).max(BASE_DELAY.as_secs()));
    next.min(MAX_DELAY)
}
