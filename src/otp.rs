//! Time-windowed one-time codes.
//!
//! A code is derived from the shared secret and the current window
//! (`floor(unix_seconds / interval)`): SHA-256 over `secret || decimal(window)`,
//! the first four hex digits of the digest read as an unsigned integer, masked
//! to `mask_bits` and shifted into `[1, 2^mask_bits]`.
//!
//! Validation accepts the code of the current window and of the one before it,
//! which absorbs clock skew and request latency of up to one interval.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_MASK_BITS: u32 = 10;
pub const MAX_MASK_BITS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("OTP shared secret is missing or empty")]
    MissingSecret,
    #[error("OTP interval must be a positive number of seconds")]
    InvalidInterval,
    #[error("OTP mask width must be between 1 and 16 bits, got {0}")]
    InvalidMaskBits(u32),
}

#[derive(Clone, Copy, Debug)]
pub struct OtpConfig {
    interval_seconds: u64,
    mask_bits: u32,
}

impl OtpConfig {
    /// Default: 10 second windows, 10 bit codes (`[1, 1024]`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            mask_bits: DEFAULT_MASK_BITS,
        }
    }

    #[must_use]
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mask_bits(mut self, bits: u32) -> Self {
        self.mask_bits = bits;
        self
    }

    #[must_use]
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    #[must_use]
    pub fn mask_bits(&self) -> u32 {
        self.mask_bits
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug)]
struct CachedCode {
    window: i64,
    code: u32,
    expires_at: DateTime<Utc>,
}

pub struct OtpEngine {
    secret: SecretString,
    interval: i64,
    mask: u32,
    cache: Mutex<Option<CachedCode>>,
}

impl OtpEngine {
    /// Build an engine from the shared secret.
    ///
    /// # Errors
    /// Returns `ConfigError` if the secret is empty, the interval is zero, or the
    /// mask width is outside `1..=16`.
    pub fn new(secret: SecretString, config: OtpConfig) -> Result<Self, ConfigError> {
        if secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        let interval = i64::try_from(config.interval_seconds())
            .ok()
            .filter(|interval| *interval > 0)
            .ok_or(ConfigError::InvalidInterval)?;

        let bits = config.mask_bits();
        if bits == 0 || bits > MAX_MASK_BITS {
            return Err(ConfigError::InvalidMaskBits(bits));
        }

        Ok(Self {
            secret,
            interval,
            mask: (1_u32 << bits) - 1,
            cache: Mutex::new(None),
        })
    }

    /// Largest code this engine can produce.
    #[must_use]
    pub fn max_code(&self) -> u32 {
        self.mask + 1
    }

    #[must_use]
    pub fn window_at(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.interval)
    }

    fn window_start(&self, window: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(window.saturating_mul(self.interval), 0)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Derive the code for `window`. Pure: depends only on the secret and the window.
    #[must_use]
    pub fn code_for(&self, window: i64) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.expose_secret().as_bytes());
        hasher.update(window.to_string().as_bytes());
        let digest = hasher.finalize();

        // The first four hex digits of the digest are its first two bytes.
        let prefix = u32::from(u16::from_be_bytes([digest[0], digest[1]]));

        (prefix & self.mask) + 1
    }

    /// Code for the window containing `now`, memoized until the window ends.
    pub fn current_code(&self, now: DateTime<Utc>) -> u32 {
        let window = self.window_at(now);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = *cache {
            if entry.window == window && now < entry.expires_at {
                return entry.code;
            }
        }

        let code = self.code_for(window);
        *cache = Some(CachedCode {
            window,
            code,
            expires_at: self.window_start(window.saturating_add(1)),
        });

        code
    }

    /// Check a claimed code against the current and the previous window.
    ///
    /// Anything that does not parse as a code in `[1, max_code]` is a miss.
    pub fn validate(&self, claimed: &str, now: DateTime<Utc>) -> bool {
        let Some(claimed) = self.parse_claim(claimed) else {
            debug!("rejecting unparsable or out of range OTP claim");
            return false;
        };

        let window = self.window_at(now);

        claimed == self.current_code(now) || claimed == self.code_for(window.saturating_sub(1))
    }

    fn parse_claim(&self, claimed: &str) -> Option<u32> {
        claimed
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|code| (1..=self.max_code()).contains(code))
    }

    /// Drop the memoized code once its window has passed.
    /// Returns `true` if an entry was removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match *cache {
            Some(entry) if now >= entry.expires_at => {
                *cache = None;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for OtpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpEngine")
            .field("secret", &"***")
            .field("interval", &self.interval)
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}
