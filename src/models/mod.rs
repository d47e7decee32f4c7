//! Data models for the Carousel engine

mod proxy;

pub use proxy::{PoolStats, ProxyRecord, ProxySnapshot, ProxyStatus};
