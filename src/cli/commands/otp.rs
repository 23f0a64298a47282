use crate::otp::{OtpConfig, MAX_MASK_BITS};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_OTP_SECRET: &str = "otp-secret";
pub const ARG_OTP_INTERVAL_SECONDS: &str = "otp-interval-seconds";
pub const ARG_OTP_MASK_BITS: &str = "otp-mask-bits";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub config: OtpConfig,
}

impl Options {
    /// Parse one-time code arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the shared secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_OTP_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_OTP_SECRET}"))?;

        let mut config = OtpConfig::new();
        if let Some(seconds) = matches.get_one::<u64>(ARG_OTP_INTERVAL_SECONDS) {
            config = config.with_interval_seconds(*seconds);
        }
        if let Some(bits) = matches.get_one::<u32>(ARG_OTP_MASK_BITS) {
            config = config.with_mask_bits(*bits);
        }

        Ok(Self {
            secret: SecretString::from(secret),
            config,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_SECRET)
                .long(ARG_OTP_SECRET)
                .help("Shared secret the one-time codes are derived from")
                .env("BRICKS_OTP_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_OTP_INTERVAL_SECONDS)
                .long(ARG_OTP_INTERVAL_SECONDS)
                .help("Length of a code window in seconds")
                .env("BRICKS_OTP_INTERVAL_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OTP_MASK_BITS)
                .long(ARG_OTP_MASK_BITS)
                .help("Code width in bits; codes fall in [1, 2^bits]")
                .env("BRICKS_OTP_MASK_BITS")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..=i64::from(MAX_MASK_BITS))),
        )
}
