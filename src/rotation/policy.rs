//! Ban detection policy
//!
//! Whether a response indicates a ban is target-specific (CAPTCHA pages,
//! blocked-status codes, empty bodies), so the boundary between a ban signal
//! and a transport error is a pluggable predicate rather than a fixed list.

use std::collections::HashSet;

use http::StatusCode;

use super::{ErrorDescriptor, ResponseDescriptor};

/// Classifies responses and transport errors as ban signals
///
/// Hosts implement this to encode target-specific ban heuristics; the
/// controller consults it before recording an outcome against the pool.
pub trait BanClassifier: Send + Sync {
    /// Decide whether a received response indicates the proxy is banned
    fn response_is_ban(&self, response: &ResponseDescriptor) -> bool;

    /// Decide whether a transport error should count as a ban signal rather
    /// than a plain transport failure (which uses the shorter backoff curve)
    fn error_is_ban(&self, _error: &ErrorDescriptor) -> bool {
        false
    }
}

/// Default ban detection policy
///
/// A response is a ban when its status falls outside a configurable allow-set,
/// or when a 200 arrives with a captured-but-empty body.
#[derive(Debug, Clone)]
pub struct DefaultBanPolicy {
    not_ban_statuses: HashSet<StatusCode>,
    ban_on_empty_body: bool,
}

impl Default for DefaultBanPolicy {
    fn default() -> Self {
        Self {
            not_ban_statuses: [
                StatusCode::OK,
                StatusCode::MOVED_PERMANENTLY,
                StatusCode::FOUND,
            ]
            .into_iter()
            .collect(),
            ban_on_empty_body: true,
        }
    }
}

impl DefaultBanPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of statuses treated as non-bans
    pub fn with_allowed_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.not_ban_statuses = statuses.into_iter().collect();
        self
    }

    /// Control whether an empty 200 body counts as a ban
    pub fn with_ban_on_empty_body(mut self, enabled: bool) -> Self {
        self.ban_on_empty_body = enabled;
        self
    }
}

impl BanClassifier for DefaultBanPolicy {
    fn response_is_ban(&self, response: &ResponseDescriptor) -> bool {
        if !self.not_ban_statuses.contains(&response.status) {
            return true;
        }
        if self.ban_on_empty_body && response.status == StatusCode::OK {
            if let Some(body) = &response.body {
                return body.is_empty();
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::ErrorKind;

    #[test]
    fn test_default_policy_allows_ok_and_redirects() {
        let policy = DefaultBanPolicy::default();

        for status in [
            StatusCode::OK,
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::FOUND,
        ] {
            let response = ResponseDescriptor::new(status).with_body(b"content".to_vec());
            assert!(!policy.response_is_ban(&response), "{} flagged", status);
        }
    }

    #[test]
    fn test_default_policy_flags_block_statuses() {
        let policy = DefaultBanPolicy::default();

        for status in [
            StatusCode::FORBIDDEN,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let response = ResponseDescriptor::new(status);
            assert!(policy.response_is_ban(&response), "{} not flagged", status);
        }
    }

    #[test]
    fn test_default_policy_empty_body_is_ban() {
        let policy = DefaultBanPolicy::default();

        let empty = ResponseDescriptor::new(StatusCode::OK).with_body(Vec::new());
        assert!(policy.response_is_ban(&empty));

        // Body not captured: nothing to judge.
        let unknown = ResponseDescriptor::new(StatusCode::OK);
        assert!(!policy.response_is_ban(&unknown));

        let relaxed = DefaultBanPolicy::new().with_ban_on_empty_body(false);
        assert!(!relaxed.response_is_ban(&empty));
    }

    #[test]
    fn test_custom_allowed_statuses() {
        let policy =
            DefaultBanPolicy::new().with_allowed_statuses([StatusCode::OK, StatusCode::NOT_FOUND]);

        assert!(!policy.response_is_ban(&ResponseDescriptor::new(StatusCode::NOT_FOUND)));
        assert!(policy.response_is_ban(&ResponseDescriptor::new(StatusCode::FOUND)));
    }

    #[test]
    fn test_errors_are_not_bans_by_default() {
        let policy = DefaultBanPolicy::default();
        let error = ErrorDescriptor::new(ErrorKind::Timeout, "deadline exceeded");
        assert!(!policy.error_is_ban(&error));
    }
}
