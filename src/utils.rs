//! Utility functions shared by the pipeline stages.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;
use url::Url;

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` attempts have been made.
///
/// `op` receives the 1-based attempt number. Every failed attempt is
/// logged; the last error is returned when the budget runs out.
///
/// # Arguments
/// * `max_attempts` - Total attempts, including the first (at least 1 is made)
/// * `retryable` - Decides whether an error may be retried
/// * `op` - The fallible operation
pub async fn with_retry<T, E, F, Fut, P>(
    max_attempts: u32,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts || !retryable(&e) {
                    return Err(e);
                }
                warn!(attempt, max_attempts, error = %e, "Attempt failed, retrying");
                attempt += 1;
            }
        }
    }
}

/// Returns the final path segment of a URL, used as the local file name.
pub fn file_name_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = with_retry(5, |_| true, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 4 {
                    Err(format!("failure {}", attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(4));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(5, |_| true, |_| {
            calls.set(calls.get() + 1);
            async { Err("always".to_string()) }
        })
        .await;

        assert_eq!(result, Err("always".to_string()));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(5, |e: &String| e != "fatal", |_| {
            calls.set(calls.get() + 1);
            async { Err("fatal".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retry_zero_budget_still_runs_once() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(0, |_| true, |_| {
            calls.set(calls.get() + 1);
            async { Ok(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://i.pximg.net/img-original/img/2019/10/24/00/00/01/77_p0.png"),
            Some("77_p0.png".to_string())
        );
        assert_eq!(
            file_name_from_url("https://i.pximg.net/a/b.jpg?x=1"),
            Some("b.jpg".to_string())
        );
        assert_eq!(file_name_from_url("https://i.pximg.net/"), None);
        assert_eq!(file_name_from_url("not a url"), None);
    }
}
