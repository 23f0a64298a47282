//! # Bricks
//!
//! `bricks` serves a single shared counter that anyone may read but only
//! holders of a short-lived one-time code may increase.
//!
//! ## Codes
//!
//! Codes are derived from a shared secret and the current time window, so a
//! client that knows the secret computes the same code as the server. The code
//! of the previous window stays valid to absorb clock drift. See [`otp`].
//!
//! ## Abuse handling
//!
//! Wrong codes are counted per client over a sliding window; too many and the
//! client is blocked for a while. Blocked clients are refused without their
//! code being checked. See [`guard`].
//!
//! ## Counter
//!
//! The counter lives in Postgres (`bricks` table, one row) or in memory when no
//! DSN is configured. Reads are cached; writes go through a single writer task
//! so increments never interleave. See [`counter`].

pub mod api;
pub mod cli;
pub mod clock;
pub mod counter;
pub mod guard;
pub mod otp;
pub mod service;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_hex_or_unknown() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
