//! Carousel - Adaptive Proxy Rotation Engine
//!
//! A library for rotating outbound requests across a pool of upstream
//! proxies, tracking per-proxy health from response outcomes.
//!
//! ## Features
//!
//! - Health-aware selection biased toward proxies with the fewest recent failures
//! - Exponential backoff with jitter for banned proxies, with lazy resurrection
//! - Separate (shorter) backoff curve for transport-level failures
//! - Pluggable ban detection policy
//! - Per-request retry budget with retry-as-new-attempt semantics
//! - Read-only pool snapshots and periodic stats logging
//!
//! The engine owns no transport: the host pipeline calls
//! [`RotationController::before_request`] to get a proxy assignment, sends the
//! request itself, and reports the result via
//! [`RotationController::on_response`] or [`RotationController::on_error`].

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod rotation;
pub mod services;

pub use config::{BackoffConfig, Config};
pub use error::{CarouselError, Result};
pub use models::{PoolStats, ProxySnapshot, ProxyStatus};
pub use pool::{BackoffPolicy, Outcome, ProxyPool};
pub use rotation::{
    BanClassifier, DefaultBanPolicy, Directive, ErrorDescriptor, ErrorKind, ProxyAssignment,
    ResponseDescriptor, RotationController,
};
pub use services::{LogStatsConfig, LogStatsHandle, LogStatsService};
