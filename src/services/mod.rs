//! Background services

mod logstats;

pub use logstats::{LogStatsConfig, LogStatsHandle, LogStatsService};
