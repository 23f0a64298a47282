use crate::{
    api::maintenance::MaintenanceConfig,
    counter::{CounterConfig, MAX_QUEUE_CAPACITY},
};
use clap::{builder::RangedU64ValueParser, Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_COUNTER_CACHE_TTL_SECONDS: &str = "counter-cache-ttl-seconds";
pub const ARG_COUNTER_QUEUE_CAPACITY: &str = "counter-queue-capacity";
pub const ARG_PURGE_INTERVAL_SECONDS: &str = "purge-interval-seconds";
pub const ARG_SNAPSHOT_INTERVAL_SECONDS: &str = "snapshot-interval-seconds";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub counter: CounterConfig,
    pub maintenance: MaintenanceConfig,
}

impl Options {
    /// Parse counter and maintenance arguments from matches.
    ///
    /// # Errors
    /// Never fails today; kept fallible like the other argument groups.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut counter = CounterConfig::new();
        if let Some(seconds) = matches.get_one::<u64>(ARG_COUNTER_CACHE_TTL_SECONDS) {
            counter = counter.with_cache_ttl_seconds(*seconds);
        }
        if let Some(capacity) = matches.get_one::<usize>(ARG_COUNTER_QUEUE_CAPACITY) {
            counter = counter.with_queue_capacity(*capacity);
        }

        let mut maintenance = MaintenanceConfig::new();
        if let Some(seconds) = matches.get_one::<u64>(ARG_PURGE_INTERVAL_SECONDS) {
            maintenance = maintenance.with_purge_interval(Duration::from_secs(*seconds));
        }
        if let Some(seconds) = matches.get_one::<u64>(ARG_SNAPSHOT_INTERVAL_SECONDS) {
            maintenance = maintenance.with_snapshot_interval(Duration::from_secs(*seconds));
        }

        Ok(Self {
            counter: counter.normalize(),
            maintenance: maintenance.normalize(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COUNTER_CACHE_TTL_SECONDS)
                .long(ARG_COUNTER_CACHE_TTL_SECONDS)
                .help("How long a read of the counter is served from cache, in seconds")
                .env("BRICKS_COUNTER_CACHE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_COUNTER_QUEUE_CAPACITY)
                .long(ARG_COUNTER_QUEUE_CAPACITY)
                .help("Pending counter writes before callers wait")
                .env("BRICKS_COUNTER_QUEUE_CAPACITY")
                .default_value("1024")
                .value_parser(
                    RangedU64ValueParser::<usize>::new().range(1..=MAX_QUEUE_CAPACITY as u64),
                ),
        )
        .arg(
            Arg::new(ARG_PURGE_INTERVAL_SECONDS)
                .long(ARG_PURGE_INTERVAL_SECONDS)
                .help("Interval between sweeps of expired blocks and failures, in seconds")
                .env("BRICKS_PURGE_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SNAPSHOT_INTERVAL_SECONDS)
                .long(ARG_SNAPSHOT_INTERVAL_SECONDS)
                .help("Interval between counter snapshots in the log table, in seconds")
                .env("BRICKS_SNAPSHOT_INTERVAL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
}
