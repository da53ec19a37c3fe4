//! Resilient invocation: retry with exponential backoff plus provider fallback.
//!
//! - Retryable errors are retried on the same provider with
//!   `base_delay * 2^attempt`, capped at `max_delay`
//! - Fatal errors move straight to the next provider
//! - Invalid input ends the chain
//! - Every attempt runs under a per-call timeout
//! - Failure counts survive across invocations and order the fallbacks

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use mgen_models::Capability;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::{record_attempt, record_failure, record_fallback, record_latency};
use crate::traits::Provider;

// =============================================================================
// Policy
// =============================================================================

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, per provider.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Timeout applied to each attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            call_timeout: Duration::from_secs(180),
        }
    }
}

impl RetryPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_retries: std::env::var("PROVIDER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_delay: std::env::var("PROVIDER_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: std::env::var("PROVIDER_RETRY_MAX_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            call_timeout: std::env::var("PROVIDER_CALL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// A successful invocation.
#[derive(Debug, Clone)]
pub struct Invoked<T> {
    pub value: T,
    /// Provider that produced the value
    pub provider: String,
    /// Attempts made on that provider
    pub attempts: u32,
}

/// The last error of one provider after its retries ran out.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
    pub attempts: u32,
}

/// Errors returned by a fallback chain.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No configured {0} providers")]
    NoProviders(&'static str),

    #[error("All {capability} providers failed: {}", summarize(.failures))]
    Exhausted {
        capability: &'static str,
        failures: Vec<ProviderFailure>,
    },
}

impl InvokeError {
    /// Error from the last provider tried.
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            InvokeError::NoProviders(_) => None,
            InvokeError::Exhausted { failures, .. } => failures.last().map(|f| &f.error),
        }
    }

    /// Whether the last failure was transient.
    pub fn is_retryable(&self) -> bool {
        self.last_error().is_some_and(ProviderError::is_retryable)
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({} attempts): {}", f.provider, f.attempts, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Single provider
// =============================================================================

/// Run `op` against one provider with retry and backoff.
pub async fn invoke<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    capability: Capability,
    mut op: F,
) -> Result<Invoked<T>, ProviderFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0;

    loop {
        let span = info_span!(
            "provider_call",
            provider = %provider,
            capability = capability.as_str(),
            attempt = attempt + 1
        );
        record_attempt(provider, capability.as_str());

        let started = Instant::now();
        let result = tokio::time::timeout(policy.call_timeout, op())
            .instrument(span)
            .await
            .unwrap_or(Err(ProviderError::Timeout(policy.call_timeout)));

        match result {
            Ok(value) => {
                record_latency(provider, capability.as_str(), started.elapsed().as_secs_f64());
                return Ok(Invoked {
                    value,
                    provider: provider.to_string(),
                    attempts: attempt + 1,
                });
            }
            Err(e) => {
                record_failure(provider, capability.as_str(), e.kind());

                if !e.is_retryable() || attempt >= policy.max_retries {
                    return Err(ProviderFailure {
                        provider: provider.to_string(),
                        error: e,
                        attempts: attempt + 1,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    provider = %provider,
                    capability = capability.as_str(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Provider call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// Fallback chain
// =============================================================================

/// Ordered providers for one capability.
///
/// The first provider is the primary. Failure counts are kept for the life
/// of the chain.
pub struct FallbackChain<P: ?Sized> {
    capability: Capability,
    providers: Vec<Arc<P>>,
    failures: Vec<AtomicU64>,
    policy: RetryPolicy,
}

impl<P: Provider + ?Sized> FallbackChain<P> {
    pub fn new(capability: Capability, providers: Vec<Arc<P>>, policy: RetryPolicy) -> Self {
        let failures = providers.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            capability,
            providers,
            failures,
            policy,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn providers(&self) -> &[Arc<P>] {
        &self.providers
    }

    /// Whether any provider can be tried.
    pub fn has_configured(&self) -> bool {
        self.providers.iter().any(|p| p.is_configured())
    }

    /// Cumulative failures recorded for `provider`.
    pub fn failure_count(&self, provider: &str) -> u64 {
        self.providers
            .iter()
            .zip(&self.failures)
            .filter(|(p, _)| p.name() == provider)
            .map(|(_, count)| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Indices in the order they will be tried.
    ///
    /// Primary first when configured, then the other configured providers
    /// by ascending failure count. Ties keep declaration order.
    pub fn order(&self) -> Vec<usize> {
        let mut rest: Vec<usize> = (1..self.providers.len())
            .filter(|&i| self.providers[i].is_configured())
            .collect();
        rest.sort_by_key(|&i| self.failures[i].load(Ordering::Relaxed));

        let mut order = Vec::with_capacity(self.providers.len());
        if self.providers.first().is_some_and(|p| p.is_configured()) {
            order.push(0);
        }
        order.extend(rest);
        order
    }

    /// Invoke `op` on each provider in turn until one succeeds.
    pub async fn invoke<T, F, Fut>(&self, op: F) -> Result<Invoked<T>, InvokeError>
    where
        F: Fn(Arc<P>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let capability = self.capability.as_str();
        let order = self.order();
        if order.is_empty() {
            return Err(InvokeError::NoProviders(capability));
        }

        let mut failures = Vec::new();
        for (position, index) in order.into_iter().enumerate() {
            let provider = Arc::clone(&self.providers[index]);
            if position > 0 {
                record_fallback(capability);
                debug!(capability, provider = %provider.name(), "Falling back");
            }

            let name = provider.name().to_string();
            match invoke(&self.policy, &name, self.capability, || op(Arc::clone(&provider))).await {
                Ok(invoked) => return Ok(invoked),
                Err(failure) => {
                    self.failures[index].fetch_add(1, Ordering::Relaxed);
                    warn!(
                        capability,
                        provider = %failure.provider,
                        attempts = failure.attempts,
                        retryable = failure.error.is_retryable(),
                        "Provider exhausted: {}",
                        failure.error
                    );
                    let stop = failure.error.ends_chain();
                    failures.push(failure);
                    if stop {
                        break;
                    }
                }
            }
        }

        Err(InvokeError::Exhausted {
            capability,
            failures,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct Scripted {
        name: &'static str,
        configured: bool,
        script: Mutex<VecDeque<ProviderResult<u32>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &'static str, script: Vec<ProviderResult<u32>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: true,
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn unconfigured(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                configured: false,
                script: Mutex::new(VecDeque::new()),
                calls: AtomicU32::new(0),
            })
        }

        async fn call(&self) -> ProviderResult<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::from_http_status(503, "exhausted script")))
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    fn server_error() -> ProviderResult<u32> {
        Err(ProviderError::from_http_status(503, "unavailable"))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_secs(1))
    }

    fn chain(providers: Vec<Arc<Scripted>>) -> FallbackChain<Scripted> {
        FallbackChain::new(Capability::Image, providers, policy())
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            call_timeout: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_then_succeeds() {
        let a = Scripted::new(
            "a",
            vec![server_error(), Err(ProviderError::RateLimited("429".into())), Ok(7)],
        );
        let chain = chain(vec![a.clone()]);

        let start = tokio::time::Instant::now();
        let invoked = chain.invoke(|p| async move { p.call().await }).await.unwrap();

        assert_eq!(invoked.value, 7);
        assert_eq!(invoked.provider, "a");
        assert_eq!(invoked.attempts, 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(chain.failure_count("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_falls_back_without_retry() {
        let a = Scripted::new("a", vec![Err(ProviderError::Unauthorized("bad key".into()))]);
        let b = Scripted::new("b", vec![Ok(1)]);
        let chain = chain(vec![a.clone(), b.clone()]);

        let start = tokio::time::Instant::now();
        let invoked = chain.invoke(|p| async move { p.call().await }).await.unwrap();

        assert_eq!(invoked.provider, "b");
        assert_eq!(a.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(chain.failure_count("a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_every_provider() {
        let a = Scripted::new("a", vec![]);
        let b = Scripted::new("b", vec![]);
        let chain = chain(vec![a.clone(), b.clone()]);

        let err = chain
            .invoke(|p| async move { p.call().await })
            .await
            .unwrap_err();

        match &err {
            InvokeError::Exhausted { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.attempts == 3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 3);
        assert!(err.to_string().contains("a (3 attempts)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_retries_two_failures_then_success() {
        let policy = RetryPolicy::default()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(200));
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));

        let a = Scripted::new("a", vec![server_error(), server_error(), Ok(9)]);
        let start = tokio::time::Instant::now();
        let invoked = invoke(&policy, "a", Capability::Image, || a.call())
            .await
            .unwrap();

        assert_eq!(invoked.value, 9);
        assert_eq!(invoked.attempts, 3);
        assert_eq!(a.calls(), 3);
        // 200ms + 400ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_invalid_input_ends_chain() {
        let a = Scripted::new("a", vec![Err(ProviderError::InvalidInput("no scenes".into()))]);
        let b = Scripted::new("b", vec![Ok(1)]);
        let chain = chain(vec![a.clone(), b.clone()]);

        let err = chain
            .invoke(|p| async move { p.call().await })
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(matches!(err.last_error(), Some(ProviderError::InvalidInput(_))));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_primary_is_skipped() {
        let a = Scripted::unconfigured("a");
        let b = Scripted::new("b", vec![Ok(2)]);
        let chain = chain(vec![a.clone(), b]);

        assert_eq!(chain.order(), vec![1]);
        let invoked = chain.invoke(|p| async move { p.call().await }).await.unwrap();
        assert_eq!(invoked.provider, "b");
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_configured_providers() {
        let chain = chain(vec![Scripted::unconfigured("a")]);
        let err = chain
            .invoke(|p| async move { p.call().await })
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::NoProviders("image")));
        assert!(!chain.has_configured());
    }

    #[tokio::test]
    async fn test_fallbacks_ordered_by_failure_count() {
        let fatal = || Err(ProviderError::BadRequest("nope".into()));
        let a = Scripted::new("a", vec![fatal(), Ok(1)]);
        let b = Scripted::new("b", vec![fatal()]);
        let c = Scripted::new("c", vec![Ok(3), Ok(4)]);
        let chain = chain(vec![a, b, c]);

        assert_eq!(chain.order(), vec![0, 1, 2]);
        let first = chain.invoke(|p| async move { p.call().await }).await.unwrap();
        assert_eq!(first.provider, "c");

        // Primary stays first; b now has more failures than c.
        assert_eq!(chain.order(), vec![0, 2, 1]);
        assert_eq!(chain.failure_count("b"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_retryable() {
        let policy = RetryPolicy::default()
            .with_max_retries(1)
            .with_base_delay(Duration::from_secs(1))
            .with_call_timeout(Duration::from_secs(5));

        let failure = invoke(&policy, "slow", Capability::Speech, || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<u32, ProviderError>(1)
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert!(matches!(failure.error, ProviderError::Timeout(_)));
    }
}
