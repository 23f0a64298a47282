use crate::cli::{
    actions::{server::Args, Action},
    commands::{counter, guard, http, otp, ARG_DSN, ARG_PORT},
};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|v| !v.trim().is_empty())
        .cloned();

    let otp = otp::Options::parse(matches)?;
    let guard = guard::Options::parse(matches)?;
    let counter = counter::Options::parse(matches)?;
    let http = http::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        otp,
        guard: guard.config,
        counter: counter.counter,
        maintenance: counter.maintenance,
        api: http.api,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{commands, with_env};
    use secrecy::ExposeSecret;
    use std::time::Duration;

    #[test]
    fn test_handler_defaults() {
        with_env(&[], || {
            let matches = commands::new().get_matches_from(vec!["bricks", "--otp-secret", "abc"]);
            let Ok(Action::Server(args)) = handler(&matches) else {
                panic!("expected server action");
            };

            assert_eq!(args.port, 8080);
            assert!(args.dsn.is_none());
            assert_eq!(args.otp.secret.expose_secret(), "abc");
            assert_eq!(args.otp.config.interval_seconds(), 10);
            assert_eq!(args.otp.config.mask_bits(), 10);
            assert_eq!(args.guard.max_failed_attempts(), 3);
            assert_eq!(args.guard.failure_window(), Duration::from_secs(180));
            assert_eq!(args.guard.block_duration(), Duration::from_secs(60));
            assert_eq!(args.counter.cache_ttl(), Duration::from_secs(60));
            assert_eq!(args.maintenance.purge_interval(), Duration::from_secs(60));
            assert_eq!(args.api.client_ip_header().as_str(), "cf-connecting-ip");
            assert!(args.api.admin_token().is_none());
        });
    }

    #[test]
    fn test_handler_custom() {
        with_env(
            &[
                ("BRICKS_OTP_SECRET", "s3cret"),
                ("BRICKS_DSN", "postgres://bricks@localhost/bricks"),
                ("BRICKS_MAX_FAILED_ATTEMPTS", "5"),
                ("BRICKS_CLIENT_IP_HEADER", "X-Forwarded-For"),
                ("BRICKS_ADMIN_TOKEN", "t0ken"),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["bricks", "-p", "9000"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };

                assert_eq!(args.port, 9000);
                assert_eq!(
                    args.dsn.as_deref(),
                    Some("postgres://bricks@localhost/bricks")
                );
                assert_eq!(args.guard.max_failed_attempts(), 5);
                assert_eq!(args.api.client_ip_header().as_str(), "x-forwarded-for");
                assert_eq!(
                    args.api.admin_token().map(|t| t.expose_secret().to_string()),
                    Some("t0ken".to_string())
                );
            },
        );
    }

    #[test]
    fn test_handler_blank_secret() {
        with_env(&[], || {
            let matches = commands::new().get_matches_from(vec!["bricks", "--otp-secret", "  "]);
            assert!(handler(&matches).is_err());
        });
    }

    #[test]
    fn test_handler_bad_header() {
        with_env(&[], || {
            let matches = commands::new().get_matches_from(vec![
                "bricks",
                "--otp-secret",
                "abc",
                "--client-ip-header",
                "bad header",
            ]);
            assert!(handler(&matches).is_err());
        });
    }
}
