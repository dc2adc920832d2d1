// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seeded identifier and timestamp primitives.
//!
//! All deterministic state lives in a [`DeterminismContext`] value that the
//! executor passes explicitly to semantic memory and the structure
//! constructors. One context per logical job; re-initializing the seed
//! resets every counter, which is what makes a recorded request replayable
//! with the exact counter sequence.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{Duration, SecondsFormat, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Development-only fallback seed used when no seed is set in NORMAL mode.
pub const DEFAULT_UNSAFE_SEED: &str = "default_unsafe_seed";

/// Derived timestamps are offsets from this instant, capped at ten years.
const TIMESTAMP_RANGE_SECONDS: u64 = 315_360_000;

/// Well-known counter scopes.
///
/// Each structure kind draws its `created_at` from its own counter so that
/// inserting a new object kind never shifts the timestamps of another.
pub mod scopes {
    /// Generic identifier counter used when no explicit counter is passed.
    pub const ID: &str = "id";
    /// Semantic-memory write counter; also the journal `write_counter`.
    pub const SEM_WRITE: &str = "sem_write";
    /// Percept construction.
    pub const PERCEPT_TIME: &str = "percept_time";
    /// Router decision construction.
    pub const DECISION_TIME: &str = "decision_time";
    /// Error event construction.
    pub const ERROR_TIME: &str = "error_time";
    /// Reflective log entry construction.
    pub const LOG_TIME: &str = "log_time";
    /// Evidence objects; one counter feeds both the id and the timestamp.
    pub const EVIDENCE: &str = "evidence";
    /// Governance amendment records.
    pub const AMENDMENT_TIME: &str = "amendment_time";
}

/// Operating mode for the deterministic primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Unseeded wall-clock fallbacks are permitted at explicit call sites.
    #[default]
    Normal,
    /// Every fallback to wall-clock or unseeded state is a hard error.
    Deterministic,
}

/// Errors from the deterministic primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeterminismError {
    /// No seed has been initialized and the mode forbids the fallback.
    #[error("NO_SEED: seed not initialized in deterministic mode")]
    NoSeed,

    /// A wall-clock timestamp was requested in deterministic mode.
    #[error("WALL_CLOCK_FORBIDDEN: counter required for deterministic timestamp")]
    WallClockForbidden,
}

/// Per-job seed, counters, and mode.
///
/// # Examples
///
/// ```
/// use mace_determinism::DeterminismContext;
///
/// let mut det = DeterminismContext::with_seed("golden");
/// let a = det.derive_id("percept", "2 + 2", None).unwrap();
/// assert_eq!(a.len(), 64);
///
/// // Re-initializing the seed resets every counter, so the same calls
/// // reproduce the same ids.
/// det.init_seed("golden");
/// let b = det.derive_id("percept", "2 + 2", None).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeterminismContext {
    seed: Option<String>,
    counters: BTreeMap<String, u64>,
    mode: Mode,
}

impl DeterminismContext {
    /// Create a context with no seed, in NORMAL mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context already seeded with `seed`.
    #[must_use]
    pub fn with_seed(seed: impl Into<SeedSource>) -> Self {
        let mut ctx = Self::new();
        ctx.init_seed(seed);
        ctx
    }

    /// Set the seed and clear every counter.
    ///
    /// Integers are stringified before use so `init_seed(42)` and
    /// `init_seed("42")` are indistinguishable.
    pub fn init_seed(&mut self, seed: impl Into<SeedSource>) {
        self.seed = Some(seed.into().into_string());
        self.counters.clear();
    }

    /// Switch between NORMAL and DETERMINISTIC behavior.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Current operating mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The active seed, if one has been initialized.
    #[must_use]
    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    /// Increment a named counter and return the new value.
    ///
    /// The first call for any name returns 1.
    pub fn increment(&mut self, name: &str) -> u64 {
        let slot = self.counters.entry(name.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Derive a 64-hex-character identifier.
    ///
    /// Computes `HMAC_SHA256(seed, "{namespace}:{payload}:{counter}")`. When
    /// `counter` is `None` the generic [`scopes::ID`] counter is advanced;
    /// passing an explicit counter leaves all counters untouched.
    ///
    /// # Errors
    ///
    /// [`DeterminismError::NoSeed`] when no seed is set in DETERMINISTIC
    /// mode. In NORMAL mode the fixed development seed is used instead.
    pub fn derive_id(
        &mut self,
        namespace: &str,
        payload: &str,
        counter: Option<u64>,
    ) -> Result<String, DeterminismError> {
        let counter = match counter {
            Some(c) => c,
            None => self.increment(scopes::ID),
        };
        let seed = self.effective_seed()?;
        let message = format!("{namespace}:{payload}:{counter}");
        Ok(hmac_sha256_hex(seed.as_bytes(), message.as_bytes()))
    }

    /// Derive an RFC-3339 UTC timestamp from a counter.
    ///
    /// The HMAC of the stringified counter under the seed yields a second
    /// offset (mod ten years) from 2025-01-01T00:00:00Z. With no counter,
    /// NORMAL mode returns the current wall-clock time and DETERMINISTIC
    /// mode fails.
    ///
    /// # Errors
    ///
    /// [`DeterminismError::WallClockForbidden`] for `counter = None` in
    /// DETERMINISTIC mode; [`DeterminismError::NoSeed`] when no seed is set
    /// in DETERMINISTIC mode.
    pub fn derive_timestamp(&self, counter: Option<u64>) -> Result<String, DeterminismError> {
        let Some(counter) = counter else {
            return match self.mode {
                Mode::Normal => Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                Mode::Deterministic => Err(DeterminismError::WallClockForbidden),
            };
        };

        let seed = self.effective_seed()?;
        let digest = hmac_sha256(seed.as_bytes(), counter.to_string().as_bytes());
        let offset = u64::from(u32::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3],
        ])) % TIMESTAMP_RANGE_SECONDS;

        let base = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("fixed base instant is valid");
        let derived = base + Duration::seconds(offset as i64);
        Ok(derived.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    fn effective_seed(&self) -> Result<&str, DeterminismError> {
        match (&self.seed, self.mode) {
            (Some(seed), _) => Ok(seed),
            (None, Mode::Normal) => Ok(DEFAULT_UNSAFE_SEED),
            (None, Mode::Deterministic) => Err(DeterminismError::NoSeed),
        }
    }
}

/// A seed input; integers are stringified before use.
#[derive(Debug, Clone)]
pub struct SeedSource(String);

impl SeedSource {
    fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for SeedSource {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SeedSource {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for SeedSource {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Hex-encoded HMAC-SHA256 of `message` under `key`.
#[must_use]
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    format!("{:x}", hmac_sha256(key, message))
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> hmac::digest::Output<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes()
}
