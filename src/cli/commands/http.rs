use crate::api::{ApiConfig, DEFAULT_CLIENT_IP_HEADER};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_CLIENT_IP_HEADER: &str = "client-ip-header";
pub const ARG_ADMIN_TOKEN: &str = "admin-token";

#[derive(Debug, Clone)]
pub struct Options {
    pub api: ApiConfig,
}

impl Options {
    /// Parse HTTP surface arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the client IP header is not a valid header name.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let header = matches
            .get_one::<String>(ARG_CLIENT_IP_HEADER)
            .map_or(DEFAULT_CLIENT_IP_HEADER, String::as_str);

        let admin_token = matches
            .get_one::<String>(ARG_ADMIN_TOKEN)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .map(SecretString::from);

        let api = ApiConfig::new()
            .with_client_ip_header(header)
            .map_err(|e| anyhow::anyhow!("invalid --{ARG_CLIENT_IP_HEADER}: {e}"))?
            .with_admin_token(admin_token);

        Ok(Self { api })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_IP_HEADER)
                .long(ARG_CLIENT_IP_HEADER)
                .help("Header carrying the client address when behind a proxy")
                .env("BRICKS_CLIENT_IP_HEADER")
                .default_value(DEFAULT_CLIENT_IP_HEADER),
        )
        .arg(
            Arg::new(ARG_ADMIN_TOKEN)
                .long(ARG_ADMIN_TOKEN)
                .help("Bearer token for the /admin endpoints; they are not served without it")
                .env("BRICKS_ADMIN_TOKEN")
                .hide_env_values(true),
        )
}
