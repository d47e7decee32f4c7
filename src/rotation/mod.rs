//! Rotation controller: the integration surface between the host request
//! pipeline and the proxy pool
//!
//! The host calls [`RotationController::before_request`] to get a proxy for
//! an outbound request and feeds the result back through
//! [`RotationController::on_response`] or [`RotationController::on_error`].
//! Retries are modelled as fresh attempts with a new assignment rather than
//! mutation of the original request.

mod policy;

pub use policy::{BanClassifier, DefaultBanPolicy};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CarouselError, Result};
use crate::pool::{Outcome, ProxyPool};

/// A proxy assigned to one request attempt
///
/// `attempt` counts reassignments for the logical request, starting at 0.
/// Each retry produces a new assignment; existing ones are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAssignment {
    pub proxy: String,
    pub attempt: u32,
}

/// What the host should do with a request after an outcome was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// The response is usable; deliver it
    Accept,
    /// Resend the request through the given assignment
    Retry(ProxyAssignment),
    /// Retry budget exhausted (or no proxy left); fail the request
    Abandon,
}

/// Host-visible view of a received response
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Response body, when the host captured it for classification
    pub body: Option<Vec<u8>>,
    /// Time from send to response, when the host measured it
    pub elapsed: Option<Duration>,
}

impl ResponseDescriptor {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
            elapsed: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Transport-level failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Dns,
    Tls,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::ConnectionReset => "connection_reset",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Dns => "dns",
            ErrorKind::Tls => "tls",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host-visible view of a transport failure
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Translates request lifecycle events into pool operations
pub struct RotationController {
    pool: Arc<ProxyPool>,
    classifier: Arc<dyn BanClassifier>,
    max_retry_attempts: u32,
}

impl RotationController {
    pub fn new(
        pool: Arc<ProxyPool>,
        classifier: Arc<dyn BanClassifier>,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            pool,
            classifier,
            max_retry_attempts,
        }
    }

    /// Build a controller (and its pool) from configuration, using the
    /// default ban policy
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ProxyPool::from_config(config)?);
        Ok(Self::new(
            pool,
            Arc::new(DefaultBanPolicy::default()),
            config.max_retry_attempts,
        ))
    }

    /// The pool backing this controller, for observability export
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Assign a proxy to a new request.
    ///
    /// Fails with `NoProxyAvailable` when the pool has no eligible proxy;
    /// the host decides whether to queue, delay, or abort.
    pub fn before_request(&self, now: DateTime<Utc>) -> Result<ProxyAssignment> {
        match self.pool.select(now) {
            Ok(proxy) => {
                debug!(proxy = %proxy, "proxy assigned");
                Ok(ProxyAssignment { proxy, attempt: 0 })
            }
            Err(CarouselError::PoolExhausted) => Err(CarouselError::NoProxyAvailable),
            Err(e) => Err(e),
        }
    }

    /// Feed a received response back into the pool.
    ///
    /// The classifier decides between success and ban; on a ban the retry
    /// budget determines whether the request gets a fresh assignment or is
    /// abandoned.
    pub fn on_response(
        &self,
        assignment: &ProxyAssignment,
        response: &ResponseDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Directive> {
        if self.classifier.response_is_ban(response) {
            debug!(
                proxy = %assignment.proxy,
                status = %response.status,
                "ban detected in response"
            );
            self.pool
                .record_outcome(&assignment.proxy, Outcome::BanSignal, now)?;
            Ok(self.next_attempt(assignment, now))
        } else {
            self.pool.record_outcome(
                &assignment.proxy,
                Outcome::Success {
                    response_time: response.elapsed,
                },
                now,
            )?;
            Ok(Directive::Accept)
        }
    }

    /// Feed a transport failure back into the pool; same retry logic as a
    /// banned response, but transport errors use the shorter backoff curve
    /// unless the classifier escalates them.
    pub fn on_error(
        &self,
        assignment: &ProxyAssignment,
        error: &ErrorDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Directive> {
        let outcome = if self.classifier.error_is_ban(error) {
            Outcome::BanSignal
        } else {
            Outcome::TransportError
        };
        debug!(
            proxy = %assignment.proxy,
            kind = %error.kind,
            error = %error.message,
            "transport error"
        );
        self.pool.record_outcome(&assignment.proxy, outcome, now)?;
        Ok(self.next_attempt(assignment, now))
    }

    /// Produce the next attempt for a failed request, or give up
    fn next_attempt(&self, assignment: &ProxyAssignment, now: DateTime<Utc>) -> Directive {
        let attempt = assignment.attempt + 1;
        if attempt > self.max_retry_attempts {
            debug!(
                attempts = attempt,
                max_retries = self.max_retry_attempts,
                "retry budget exhausted, abandoning request"
            );
            return Directive::Abandon;
        }

        match self.pool.select(now) {
            Ok(proxy) => {
                debug!(
                    proxy = %proxy,
                    attempt = attempt,
                    max_retries = self.max_retry_attempts,
                    "retrying with another proxy"
                );
                Directive::Retry(ProxyAssignment { proxy, attempt })
            }
            Err(_) => {
                warn!("no eligible proxy left for retry, abandoning request");
                Directive::Abandon
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::models::ProxyStatus;

    fn test_config(proxies: &[&str], max_retries: u32) -> Config {
        Config {
            proxy_list: proxies.iter().map(|s| s.to_string()).collect(),
            max_failures_before_removal: 5,
            backoff: BackoffConfig {
                base: Duration::from_secs(10),
                cap: Duration::from_secs(3600),
                jitter: 0.0,
            },
            transport_backoff: BackoffConfig {
                base: Duration::from_secs(5),
                cap: Duration::from_secs(600),
                jitter: 0.0,
            },
            max_retry_attempts: max_retries,
            logstats_interval: Duration::from_secs(30),
        }
    }

    fn controller(proxies: &[&str], max_retries: u32) -> RotationController {
        RotationController::from_config(&test_config(proxies, max_retries)).unwrap()
    }

    #[test]
    fn test_before_request_assigns_proxy() {
        let controller = controller(&["http://a:8080"], 5);

        let assignment = controller.before_request(Utc::now()).unwrap();
        assert_eq!(assignment.proxy, "http://a:8080");
        assert_eq!(assignment.attempt, 0);
    }

    #[test]
    fn test_before_request_empty_pool() {
        let controller = controller(&[], 5);

        let err = controller.before_request(Utc::now()).unwrap_err();
        assert!(matches!(err, CarouselError::NoProxyAvailable));
    }

    #[test]
    fn test_successful_response_accepted() {
        let controller = controller(&["http://a:8080"], 5);
        let now = Utc::now();

        let assignment = controller.before_request(now).unwrap();
        let response = ResponseDescriptor::new(StatusCode::OK)
            .with_body(b"hello".to_vec())
            .with_elapsed(Duration::from_millis(120));

        let directive = controller.on_response(&assignment, &response, now).unwrap();
        assert_eq!(directive, Directive::Accept);

        let snapshot = &controller.pool().snapshot()[0];
        assert_eq!(snapshot.status, ProxyStatus::Alive);
        assert_eq!(snapshot.total_requests, 1);
        assert!(snapshot.mean_response_time.is_some());
    }

    #[test]
    fn test_banned_response_retries_with_other_proxy() {
        let controller = controller(&["http://a:8080", "http://b:8080"], 5);
        let now = Utc::now();

        let assignment = controller.before_request(now).unwrap();
        let response = ResponseDescriptor::new(StatusCode::FORBIDDEN);

        let directive = controller.on_response(&assignment, &response, now).unwrap();
        match directive {
            Directive::Retry(next) => {
                assert_ne!(next.proxy, assignment.proxy);
                assert_eq!(next.attempt, 1);
            }
            other => panic!("expected retry, got {:?}", other),
        }

        let banned = controller
            .pool()
            .snapshot()
            .into_iter()
            .find(|s| s.address == assignment.proxy)
            .unwrap();
        assert_eq!(banned.status, ProxyStatus::Banned);
    }

    #[test]
    fn test_transport_error_retries() {
        let controller = controller(&["http://a:8080", "http://b:8080"], 5);
        let now = Utc::now();

        let assignment = controller.before_request(now).unwrap();
        let error = ErrorDescriptor::new(ErrorKind::ConnectionRefused, "connection refused");

        let directive = controller.on_error(&assignment, &error, now).unwrap();
        assert!(matches!(directive, Directive::Retry(_)));

        // Transport curve: banned for 5s, not the 10s ban curve.
        let banned = controller
            .pool()
            .snapshot()
            .into_iter()
            .find(|s| s.address == assignment.proxy)
            .unwrap();
        assert_eq!(
            banned.banned_until.unwrap(),
            now + chrono::Duration::seconds(5)
        );
    }

    #[test]
    fn test_retry_budget_exhaustion_abandons() {
        let controller = controller(&["http://a:8080", "http://b:8080"], 1);
        let now = Utc::now();
        let response = ResponseDescriptor::new(StatusCode::FORBIDDEN);

        let first = controller.before_request(now).unwrap();
        let second = match controller.on_response(&first, &response, now).unwrap() {
            Directive::Retry(next) => next,
            other => panic!("expected retry, got {:?}", other),
        };

        let directive = controller.on_response(&second, &response, now).unwrap();
        assert_eq!(directive, Directive::Abandon);
    }

    #[test]
    fn test_pool_exhaustion_during_retry_abandons() {
        let controller = controller(&["http://a:8080"], 5);
        let now = Utc::now();

        let assignment = controller.before_request(now).unwrap();
        let response = ResponseDescriptor::new(StatusCode::FORBIDDEN);

        // The only proxy just got banned, so the retry cannot be assigned.
        let directive = controller.on_response(&assignment, &response, now).unwrap();
        assert_eq!(directive, Directive::Abandon);
    }

    #[test]
    fn test_classifier_escalates_error_to_ban() {
        struct TimeoutIsBan;
        impl BanClassifier for TimeoutIsBan {
            fn response_is_ban(&self, _response: &ResponseDescriptor) -> bool {
                false
            }
            fn error_is_ban(&self, error: &ErrorDescriptor) -> bool {
                error.kind == ErrorKind::Timeout
            }
        }

        let config = test_config(&["http://a:8080", "http://b:8080"], 5);
        let pool = Arc::new(ProxyPool::from_config(&config).unwrap());
        let controller = RotationController::new(pool, Arc::new(TimeoutIsBan), 5);
        let now = Utc::now();

        let assignment = controller.before_request(now).unwrap();
        let error = ErrorDescriptor::new(ErrorKind::Timeout, "deadline exceeded");
        controller.on_error(&assignment, &error, now).unwrap();

        // Escalated to the ban curve: 10s, not the 5s transport ban.
        let banned = controller
            .pool()
            .snapshot()
            .into_iter()
            .find(|s| s.address == assignment.proxy)
            .unwrap();
        assert_eq!(
            banned.banned_until.unwrap(),
            now + chrono::Duration::seconds(10)
        );
    }

    #[test]
    fn test_outcome_for_foreign_assignment_propagates_error() {
        let controller = controller(&["http://a:8080"], 5);
        let now = Utc::now();

        let foreign = ProxyAssignment {
            proxy: "http://never-registered:1".to_string(),
            attempt: 0,
        };
        let response = ResponseDescriptor::new(StatusCode::OK);

        let err = controller.on_response(&foreign, &response, now).unwrap_err();
        assert!(matches!(err, CarouselError::UnknownProxy { .. }));
    }
}
