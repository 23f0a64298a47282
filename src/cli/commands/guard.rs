use crate::guard::GuardConfig;
use clap::{Arg, ArgMatches, Command};

pub const ARG_MAX_FAILED_ATTEMPTS: &str = "max-failed-attempts";
pub const ARG_FAILURE_WINDOW_MINUTES: &str = "failure-window-minutes";
pub const ARG_BLOCK_DURATION_MINUTES: &str = "block-duration-minutes";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub config: GuardConfig,
}

impl Options {
    /// Parse attempt guard arguments from matches.
    ///
    /// # Errors
    /// Never fails today; kept fallible like the other argument groups.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut config = GuardConfig::new();
        if let Some(attempts) = matches.get_one::<usize>(ARG_MAX_FAILED_ATTEMPTS) {
            config = config.with_max_failed_attempts(*attempts);
        }
        if let Some(minutes) = matches.get_one::<u64>(ARG_FAILURE_WINDOW_MINUTES) {
            config = config.with_failure_window_minutes(*minutes);
        }
        if let Some(minutes) = matches.get_one::<u64>(ARG_BLOCK_DURATION_MINUTES) {
            config = config.with_block_duration_minutes(*minutes);
        }

        Ok(Self {
            config: config.normalize(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_FAILED_ATTEMPTS)
                .long(ARG_MAX_FAILED_ATTEMPTS)
                .help("Wrong codes allowed inside the failure window before a block")
                .env("BRICKS_MAX_FAILED_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_FAILURE_WINDOW_MINUTES)
                .long(ARG_FAILURE_WINDOW_MINUTES)
                .help("Sliding window for counting wrong codes, in minutes")
                .env("BRICKS_FAILURE_WINDOW_MINUTES")
                .default_value("3")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BLOCK_DURATION_MINUTES)
                .long(ARG_BLOCK_DURATION_MINUTES)
                .help("How long a blocked client stays blocked, in minutes")
                .env("BRICKS_BLOCK_DURATION_MINUTES")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
}
