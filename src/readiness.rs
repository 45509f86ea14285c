//! Readiness Prober (spec §4.2).
//!
//! A single generic retry loop (`probe`) races one "check" attempt at a time
//! against the overall timeout, sleeping `interval_ms` between attempts, up
//! to `retries` times. Callers (the local runner, the container runner)
//! supply the actual check as an async closure — over a host subprocess, a
//! `docker exec`, or an HTTP GET — so this module stays free of any runner's
//! specific plumbing.
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::ReadinessSpec;

/// Runs `check` up to `spec.retries` times, sleeping `spec.interval_ms`
/// between attempts, never running past `spec.timeout_ms` total. Returns
/// `true` on the first successful attempt, `false` if retries or the
/// deadline are exhausted first.
///
/// `retries = 1, timeout_ms = 0` is the documented boundary case: the
/// deadline has already elapsed by the time the first attempt would start,
/// so `probe` returns `false` without ever invoking `check`.
pub async fn probe<F, Fut>(mut check: F, spec: &ReadinessSpec, service: &str) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_millis(spec.timeout_ms);
    let retries = spec.retries.max(1);

    for attempt in 1..=retries {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, check()).await {
            Ok(true) => {
                info!(service, attempt, "readiness check succeeded");
                return true;
            }
            Ok(false) => info!(service, attempt, "readiness check reported not ready"),
            Err(_) => info!(service, attempt, "readiness check timed out"),
        }

        if attempt < retries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let sleep_for = Duration::from_millis(spec.interval_ms).min(remaining);
            if sleep_for.is_zero() {
                break;
            }
            tokio::time::sleep(sleep_for).await;
        }
    }

    error!(service, "readiness checks exhausted without success");
    false
}

/// Single-shot HTTP GET check: success is any 2xx status.
pub async fn http_check(url: &str) -> bool {
    match reqwest::Client::new().get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_first_successful_attempt() {
        let spec = ReadinessSpec {
            command: None,
            endpoint: None,
            interval_ms: 1,
            timeout_ms: 1000,
            retries: 5,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let ready = probe(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { true }
            },
            &spec,
            "api",
        )
        .await;
        assert!(ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_gives_up() {
        let spec = ReadinessSpec {
            command: None,
            endpoint: None,
            interval_ms: 1,
            timeout_ms: 1000,
            retries: 3,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let ready = probe(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
            &spec,
            "api",
        )
        .await;
        assert!(!ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_timeout_with_one_retry_fails_immediately_without_checking() {
        let spec = ReadinessSpec {
            command: None,
            endpoint: None,
            interval_ms: 1,
            timeout_ms: 0,
            retries: 1,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let ready = probe(
            move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { true }
            },
            &spec,
            "api",
        )
        .await;
        assert!(!ready);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
