pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

mod start;
pub use self::start::start;

#[cfg(test)]
const ENV_VARS: [&str; 15] = [
    "BRICKS_PORT",
    "BRICKS_DSN",
    "BRICKS_OTP_SECRET",
    "BRICKS_OTP_INTERVAL_SECONDS",
    "BRICKS_OTP_MASK_BITS",
    "BRICKS_MAX_FAILED_ATTEMPTS",
    "BRICKS_FAILURE_WINDOW_MINUTES",
    "BRICKS_BLOCK_DURATION_MINUTES",
    "BRICKS_COUNTER_CACHE_TTL_SECONDS",
    "BRICKS_COUNTER_QUEUE_CAPACITY",
    "BRICKS_PURGE_INTERVAL_SECONDS",
    "BRICKS_SNAPSHOT_INTERVAL_SECONDS",
    "BRICKS_CLIENT_IP_HEADER",
    "BRICKS_ADMIN_TOKEN",
    "BRICKS_LOG_LEVEL",
];

/// Run `f` with every `BRICKS_*` variable unset except those in `set`.
#[cfg(test)]
pub(crate) fn with_env<F: FnOnce()>(set: &[(&str, &str)], f: F) {
    let vars: Vec<(&str, Option<&str>)> = ENV_VARS
        .iter()
        .map(|key| {
            let value = set.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
            (*key, value)
        })
        .collect();
    temp_env::with_vars(vars, f);
}
