//! Inference client adapter
//!
//! Boundary glue between the pipeline and the external compression service.
//! The adapter owns the per-request latency bound and a circuit breaker so
//! a dead or slow service degrades to pass-through instead of stalling
//! packet delivery. The service contract itself lives in
//! [`InferenceService`]; its transport and encoding are external concerns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::{CompressionError, Result};
use crate::types::{CompressionHints, CompressionRequest, CompressionResult};

/// Contract implemented by the external compression service.
///
/// Calls complete within a bounded time or report failure through their
/// return value; ordinary unavailability (network down, overloaded) never
/// surfaces as an error. Implementations must be safe to call from many
/// packets concurrently.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Prepare the service for traffic
    async fn initialize(&self) -> Result<()>;

    /// Release service resources
    async fn shutdown(&self) -> Result<()>;

    /// Whether the service is ready to take requests
    async fn is_available(&self) -> bool;

    /// Compress one frame; `None` means the service could not serve the request
    async fn compress_frame(&self, request: &CompressionRequest) -> Option<CompressionResult>;

    /// Advisory bitrate/quality hints without performing compression
    async fn compression_hints(&self, request: &CompressionRequest) -> Option<CompressionHints>;

    /// Service-side statistics as a key/value map
    async fn statistics(&self) -> HashMap<String, String>;
}

/// Configuration for the inference client adapter
#[derive(Debug, Clone)]
pub struct InferenceClientConfig {
    /// Per-request latency bound
    pub request_timeout: Duration,
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    pub cooldown: Duration,
}

impl Default for InferenceClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(50), // per-frame latency budget
            failure_threshold: 5,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq)]
enum BreakerState {
    /// Traffic flows; tracks consecutive failures
    Closed { failures: u32 },
    /// Traffic rejected until the cooldown elapses
    Open { since: Instant },
    /// One probe request in flight after the cooldown
    HalfOpen,
}

/// Adapter wrapping the external inference service
pub struct InferenceClient {
    /// The external service
    service: Arc<dyn InferenceService>,
    /// Adapter settings
    config: InferenceClientConfig,
    /// Circuit breaker state
    breaker: Mutex<BreakerState>,
    /// Requests admitted past the breaker
    requests: AtomicU64,
    /// Requests that produced a usable result
    successes: AtomicU64,
    /// Requests that failed (any reason)
    failures: AtomicU64,
    /// Requests that exceeded the latency bound
    timeouts: AtomicU64,
    /// Times the breaker transitioned to open
    breaker_opens: AtomicU64,
}

impl InferenceClient {
    /// Wrap an external inference service
    pub fn new(service: Arc<dyn InferenceService>, config: InferenceClientConfig) -> Self {
        Self {
            service,
            config,
            breaker: Mutex::new(BreakerState::Closed { failures: 0 }),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            breaker_opens: AtomicU64::new(0),
        }
    }

    /// Initialize the underlying service.
    ///
    /// Failure here is the one fatal startup condition; the owning process
    /// decides whether to continue in permanently-disabled mode.
    pub async fn initialize(&self) -> Result<()> {
        self.service.initialize().await
    }

    /// Shut the underlying service down
    pub async fn shutdown(&self) -> Result<()> {
        self.service.shutdown().await
    }

    /// Whether a request issued now would be admitted
    pub async fn is_available(&self) -> bool {
        self.breaker_allows() && self.service.is_available().await
    }

    /// Compress one frame, bounded by the configured timeout.
    ///
    /// Exactly one attempt; retries would blow the frame's latency budget
    /// and are the caller's responsibility to never perform.
    pub async fn compress_frame(&self, request: &CompressionRequest) -> Result<CompressionResult> {
        if !self.admit() {
            return Err(CompressionError::Unavailable);
        }
        self.requests.fetch_add(1, Ordering::Relaxed);

        match time::timeout(self.config.request_timeout, self.service.compress_frame(request)).await {
            Ok(Some(result)) if result.success => {
                if result.is_well_formed() {
                    self.record_success();
                    Ok(result)
                } else {
                    self.record_failure();
                    Err(CompressionError::MalformedResult {
                        details: format!(
                            "sizes {}/{} vs payload {}, ratio {}",
                            result.original_size,
                            result.compressed_size,
                            result.compressed_data.len(),
                            result.ratio
                        ),
                    })
                }
            }
            Ok(Some(result)) => {
                self.record_failure();
                Err(CompressionError::InferenceFailed {
                    reason: result.fallback_reason.unwrap_or_else(|| "unspecified".to_string()),
                })
            }
            Ok(None) => {
                self.record_failure();
                Err(CompressionError::Unavailable)
            }
            Err(_elapsed) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                Err(CompressionError::Timeout {
                    timeout_ms: self.config.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Query advisory hints. Read-only: does not drive the breaker.
    pub async fn compression_hints(&self, request: &CompressionRequest) -> Option<CompressionHints> {
        if !self.breaker_allows() {
            return None;
        }
        time::timeout(self.config.request_timeout, self.service.compression_hints(request))
            .await
            .ok()
            .flatten()
    }

    /// Adapter counters merged with the service-side statistics
    pub async fn statistics(&self) -> HashMap<String, String> {
        let mut stats = self.service.statistics().await;
        stats.insert(
            "client_requests".to_string(),
            self.requests.load(Ordering::Relaxed).to_string(),
        );
        stats.insert(
            "client_successes".to_string(),
            self.successes.load(Ordering::Relaxed).to_string(),
        );
        stats.insert(
            "client_failures".to_string(),
            self.failures.load(Ordering::Relaxed).to_string(),
        );
        stats.insert(
            "client_timeouts".to_string(),
            self.timeouts.load(Ordering::Relaxed).to_string(),
        );
        stats.insert(
            "client_breaker_opens".to_string(),
            self.breaker_opens.load(Ordering::Relaxed).to_string(),
        );
        stats
    }

    /// Non-mutating breaker view: would a request be admitted
    fn breaker_allows(&self) -> bool {
        match *self.breaker.lock() {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since } => since.elapsed() >= self.config.cooldown,
            BreakerState::HalfOpen => false,
        }
    }

    /// Admit a request, transitioning open -> half-open after the cooldown.
    /// Half-open admits exactly the one probe that made the transition.
    fn admit(&self) -> bool {
        let mut breaker = self.breaker.lock();
        match *breaker {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.config.cooldown {
                    *breaker = BreakerState::HalfOpen;
                    debug!("Circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        let mut breaker = self.breaker.lock();
        if matches!(*breaker, BreakerState::HalfOpen) {
            info!("Circuit breaker closed after successful probe");
        }
        *breaker = BreakerState::Closed { failures: 0 };
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut breaker = self.breaker.lock();
        *breaker = match *breaker {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    self.breaker_opens.fetch_add(1, Ordering::Relaxed);
                    warn!("Circuit breaker opened after {} consecutive failures", failures);
                    BreakerState::Open { since: Instant::now() }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            BreakerState::HalfOpen => {
                debug!("Probe failed, circuit breaker re-opened");
                BreakerState::Open { since: Instant::now() }
            }
            open @ BreakerState::Open { .. } => open,
        };
    }
}
