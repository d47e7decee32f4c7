//! Proxy pool: per-proxy health tracking, selection, and outcome feedback
//!
//! The pool owns every [`ProxyRecord`] and is the only writer of their state.
//! A single coarse lock guards the map; all operations are computation-only
//! and return promptly, so lock hold time stays short even with many requests
//! in flight.

mod backoff;

pub use backoff::BackoffPolicy;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CarouselError, Result};
use crate::models::{PoolStats, ProxyRecord, ProxySnapshot, ProxyStatus};

/// Outcome of a single request attempt through a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The response was usable
    Success { response_time: Option<Duration> },
    /// The host detected a ban-indicating response
    BanSignal,
    /// Connection refused, timeout, or similar transport failure
    TransportError,
}

/// Pool of upstream proxies with adaptive health tracking
///
/// Selection prefers proxies with the fewest consecutive failures; banned
/// proxies return to rotation lazily once their ban expires, evaluated
/// against a caller-supplied `now` rather than a background timer.
#[derive(Debug)]
pub struct ProxyPool {
    records: Mutex<HashMap<String, ProxyRecord>>,
    max_failures_before_removal: u32,
    ban_backoff: BackoffPolicy,
    /// Transport errors are often transient infra issues, so they get a
    /// (typically shorter) curve of their own.
    transport_backoff: BackoffPolicy,
}

impl ProxyPool {
    /// Create an empty pool.
    ///
    /// Fails with `InvalidConfig` if `max_failures_before_removal` is zero.
    pub fn new(
        max_failures_before_removal: u32,
        ban_backoff: BackoffPolicy,
        transport_backoff: BackoffPolicy,
    ) -> Result<Self> {
        if max_failures_before_removal == 0 {
            return Err(CarouselError::InvalidConfig(
                "max_failures_before_removal must be at least 1".into(),
            ));
        }
        Ok(Self {
            records: Mutex::new(HashMap::new()),
            max_failures_before_removal,
            ban_backoff,
            transport_backoff,
        })
    }

    /// Build a pool from configuration, pre-populated with its proxy list
    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = Self::new(
            config.max_failures_before_removal,
            BackoffPolicy::new(
                config.backoff.base,
                config.backoff.cap,
                config.backoff.jitter,
            )?,
            BackoffPolicy::new(
                config.transport_backoff.base,
                config.transport_backoff.cap,
                config.transport_backoff.jitter,
            )?,
        )?;
        for address in &config.proxy_list {
            pool.add(address);
        }
        Ok(pool)
    }

    /// Add a proxy to the pool.
    ///
    /// Idempotent: returns true if the proxy was newly added, false if it was
    /// already present (existing state is left untouched).
    pub fn add(&self, address: &str) -> bool {
        let mut records = self.records.lock();
        if records.contains_key(address) {
            return false;
        }
        records.insert(address.to_string(), ProxyRecord::new(address));
        debug!(proxy = %address, "proxy added to pool");
        true
    }

    /// Select an eligible proxy for a request.
    ///
    /// Expired bans are lifted first (the proxy moves back to `Unchecked`).
    /// Among eligible proxies those with the fewest consecutive failures are
    /// considered; ties prefer the lowest tracked mean response time, falling
    /// back to a uniform random pick. Fails with `PoolExhausted` when nothing
    /// is eligible.
    pub fn select(&self, now: DateTime<Utc>) -> Result<String> {
        let mut records = self.records.lock();

        // Lazy ban expiry, evaluated at read time.
        for record in records.values_mut() {
            if record.status == ProxyStatus::Banned {
                if let Some(until) = record.banned_until {
                    if now >= until {
                        record.status = ProxyStatus::Unchecked;
                        record.banned_until = None;
                        debug!(proxy = %record.address, "ban expired, proxy back in rotation");
                    }
                }
            }
        }

        let fewest_failures = records
            .values()
            .filter(|r| r.is_eligible(now))
            .map(|r| r.consecutive_failures)
            .min()
            .ok_or(CarouselError::PoolExhausted)?;

        let candidates: Vec<&ProxyRecord> = records
            .values()
            .filter(|r| r.is_eligible(now) && r.consecutive_failures == fewest_failures)
            .collect();

        let timed = candidates
            .iter()
            .filter(|r| r.mean_response_time.is_some())
            .min_by_key(|r| r.mean_response_time);

        let chosen = match timed {
            Some(record) => record,
            None => candidates
                .choose(&mut rand::thread_rng())
                .ok_or(CarouselError::PoolExhausted)?,
        };

        Ok(chosen.address.clone())
    }

    /// Record the outcome of a request attempt for a proxy.
    ///
    /// Fails with `UnknownProxy` (without mutating anything) if the address
    /// was never registered. Outcomes against a dead proxy only update the
    /// totals; a late success from the race window between selection and
    /// removal must not resurrect it.
    pub fn record_outcome(&self, address: &str, outcome: Outcome, now: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(address)
            .ok_or_else(|| CarouselError::UnknownProxy {
                address: address.to_string(),
            })?;

        record.total_requests += 1;

        if record.status == ProxyStatus::Dead {
            if !matches!(outcome, Outcome::Success { .. }) {
                record.total_failures += 1;
            }
            debug!(proxy = %address, "outcome recorded against dead proxy, state unchanged");
            return Ok(());
        }

        match outcome {
            Outcome::Success { response_time } => {
                record.consecutive_failures = 0;
                record.status = ProxyStatus::Alive;
                record.banned_until = None;
                if let Some(sample) = response_time {
                    record.observe_response_time(sample);
                }
                debug!(proxy = %address, "success recorded");
            }
            Outcome::BanSignal | Outcome::TransportError => {
                record.total_failures += 1;
                record.consecutive_failures += 1;

                if record.consecutive_failures > self.max_failures_before_removal {
                    record.status = ProxyStatus::Dead;
                    record.banned_until = None;
                    warn!(
                        proxy = %address,
                        consecutive_failures = record.consecutive_failures,
                        "proxy exceeded failure budget, removed from rotation"
                    );
                } else {
                    let policy = match outcome {
                        Outcome::BanSignal => &self.ban_backoff,
                        _ => &self.transport_backoff,
                    };
                    let delay = policy.next_backoff(record.consecutive_failures)?;
                    record.status = ProxyStatus::Banned;
                    record.banned_until = Some(ban_expiry(now, delay));
                    debug!(
                        proxy = %address,
                        consecutive_failures = record.consecutive_failures,
                        backoff_secs = delay.as_secs_f64(),
                        "proxy banned"
                    );
                }
            }
        }

        Ok(())
    }

    /// Copy-out snapshot of every record, ordered by address
    pub fn snapshot(&self) -> Vec<ProxySnapshot> {
        let records = self.records.lock();
        let mut snapshots: Vec<ProxySnapshot> = records.values().map(|r| r.snapshot()).collect();
        snapshots.sort_by(|a, b| a.address.cmp(&b.address));
        snapshots
    }

    /// Aggregate statistics for observability export
    pub fn stats(&self, now: DateTime<Utc>) -> PoolStats {
        let records = self.records.lock();

        let mut stats = PoolStats {
            total: records.len(),
            unchecked: 0,
            alive: 0,
            banned: 0,
            dead: 0,
            eligible: 0,
            mean_backoff_secs: 0.0,
        };

        let mut remaining_secs = 0.0;
        for record in records.values() {
            match record.status {
                ProxyStatus::Unchecked => stats.unchecked += 1,
                ProxyStatus::Alive => stats.alive += 1,
                ProxyStatus::Banned => {
                    stats.banned += 1;
                    if let Some(until) = record.banned_until {
                        let remaining = (until - now).num_milliseconds().max(0);
                        remaining_secs += remaining as f64 / 1000.0;
                    }
                }
                ProxyStatus::Dead => stats.dead += 1,
            }
            if record.is_eligible(now) {
                stats.eligible += 1;
            }
        }

        if stats.banned > 0 {
            stats.mean_backoff_secs = remaining_secs / stats.banned as f64;
        }

        stats
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Ban expiry timestamp, saturating instead of panicking on overflow
fn ban_expiry(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
