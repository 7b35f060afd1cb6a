//! Test intensity configuration and the explicit test fixture
//!
//! `TestConfig` holds the knobs that scale how hard the testers push (corpus
//! size, thread counts, simulated document totals). `TestContext` bundles a
//! config with the master seed and the postings format under test, so no
//! process-wide default codec is ever consulted.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::codec::PostingsFormat;
use crate::error::{Error, Result};

pub const ENV_CONFIG: &str = "TESTKIT_CONFIG";
pub const ENV_MULTIPLIER: &str = "TESTKIT_MULTIPLIER";
pub const ENV_NIGHTLY: &str = "TESTKIT_NIGHTLY";
pub const ENV_THREADS: &str = "TESTKIT_THREADS";
pub const ENV_SEED: &str = "TESTKIT_SEED";

/// Test intensity knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Scales randomized lower bounds and low/medium/big term doc freqs (default: 1)
    pub multiplier: usize,
    /// Enables the `big_` term class and wider worker counts (default: false)
    pub nightly: bool,
    /// Worker count for threaded verification rounds (default: 2)
    pub min_threads: usize,
    /// Upper worker count used when `nightly` is set (default: 5)
    pub max_threads: usize,
    /// Wall-clock budget for one threaded round (default: 300s)
    pub round_timeout_secs: u64,
    /// Probability that a mock directory operation fails (default: 0.0)
    pub fault_rate: f64,
    /// Upper bound on synthetic corpus fields (default: 5)
    pub max_fields: usize,
    /// Upper bound on terms per field in the common case (default: 20)
    pub max_terms: usize,
    pub append_only_total_docs: usize,
    pub append_only_max_docs_per_flush: usize,
    pub updates_total_docs: usize,
    pub updates_max_docs_per_flush: usize,
    pub pathological_total_docs: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            multiplier: 1,
            nightly: false,
            min_threads: 2,
            max_threads: 5,
            round_timeout_secs: 300,
            fault_rate: 0.0,
            max_fields: 5,
            max_terms: 20,
            append_only_total_docs: 10_000_000,
            append_only_max_docs_per_flush: 10_000,
            updates_total_docs: 1_000_000,
            updates_max_docs_per_flush: 2_500,
            pathological_total_docs: 10_000,
        }
    }
}

impl TestConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TestConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        log::debug!("[config] loaded {}", path.display());
        Self::from_json(&json)
    }

    /// Load from `TESTKIT_CONFIG` (if set) and apply the single-knob
    /// environment overrides on top.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };

        if let Some(multiplier) = env_parse::<usize>(ENV_MULTIPLIER)? {
            config.multiplier = multiplier;
        }
        if let Ok(nightly) = std::env::var(ENV_NIGHTLY) {
            config.nightly = matches!(nightly.trim(), "1" | "true" | "yes");
        }
        if let Some(threads) = env_parse::<usize>(ENV_THREADS)? {
            config.min_threads = threads;
            config.max_threads = threads;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.multiplier == 0 {
            return Err(Error::Config("multiplier must be >= 1".into()));
        }
        if self.min_threads == 0 || self.min_threads > self.max_threads {
            return Err(Error::Config(format!(
                "invalid thread range {}..={}",
                self.min_threads, self.max_threads
            )));
        }
        if !(0.0..=1.0).contains(&self.fault_rate) {
            return Err(Error::Config(format!(
                "fault_rate must be within [0, 1], got {}",
                self.fault_rate
            )));
        }
        if self.max_fields == 0 || self.max_terms < 2 {
            return Err(Error::Config(format!(
                "corpus needs at least 1 field and 2 terms, got {} and {}",
                self.max_fields, self.max_terms
            )));
        }
        if self.append_only_max_docs_per_flush == 0 || self.updates_max_docs_per_flush < 2 {
            return Err(Error::Config("docs per flush must be positive".into()));
        }
        Ok(())
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    /// Randomized lower bound: at least `n` scaled by the multiplier (doubled
    /// for nightly runs), and at most half again as much.
    pub fn at_least<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> usize {
        let nightly_factor = if self.nightly { 2 } else { 1 };
        let min = n * nightly_factor * self.multiplier;
        let max = min + min / 2;
        rng.random_range(min..=max)
    }

    /// Number of workers for one threaded round.
    pub fn num_threads<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if self.nightly {
            rng.random_range(self.min_threads..=self.max_threads)
        } else {
            self.min_threads
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{}={:?} is not a valid value", key, value))),
        _ => Ok(None),
    }
}

/// Parse a seed given as decimal or `0x`-prefixed hex.
pub fn parse_seed(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| Error::Config(format!("invalid seed {:?}", text)))
}

/// Explicit fixture threaded through every tester.
#[derive(Clone)]
pub struct TestContext {
    pub seed: u64,
    pub config: TestConfig,
    pub postings_format: Arc<dyn PostingsFormat>,
}

impl TestContext {
    pub fn new(seed: u64, config: TestConfig, postings_format: Arc<dyn PostingsFormat>) -> Self {
        Self {
            seed,
            config,
            postings_format,
        }
    }

    /// Build a context from `TESTKIT_SEED` and `TestConfig::from_env`, drawing
    /// a fresh seed when none is configured.
    pub fn from_env(postings_format: Arc<dyn PostingsFormat>) -> Result<Self> {
        let config = TestConfig::from_env()?;
        let seed = match std::env::var(ENV_SEED) {
            Ok(text) if !text.trim().is_empty() => parse_seed(&text)?,
            _ => rand::random::<u64>(),
        };
        log::info!(
            "[config] seed=0x{:016x} format={} (rerun with {}=0x{:016x})",
            seed,
            postings_format.name(),
            ENV_SEED,
            seed
        );
        Ok(Self::new(seed, config, postings_format))
    }

    /// Master random source for this context.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("seed", &format_args!("0x{:016x}", self.seed))
            .field("config", &self.config)
            .field("postings_format", &self.postings_format.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TestConfig::from_json(r#"{"multiplier": 3, "nightly": true}"#).unwrap();
        assert_eq!(config.multiplier, 3);
        assert!(config.nightly);
        assert_eq!(config.max_fields, TestConfig::default().max_fields);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(TestConfig::from_json(r#"{"multiplier": 0}"#).is_err());
        assert!(TestConfig::from_json(r#"{"min_threads": 6, "max_threads": 2}"#).is_err());
        assert!(TestConfig::from_json(r#"{"fault_rate": 1.5}"#).is_err());
        assert!(TestConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_terms": 7, "fault_rate": 0.25}}"#).unwrap();
        let config = TestConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_terms, 7);
        assert_eq!(config.fault_rate, 0.25);
    }

    #[test]
    fn test_at_least_bounds() {
        let config = TestConfig {
            multiplier: 2,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let n = config.at_least(&mut rng, 50);
            assert!((100..=150).contains(&n));
        }
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42").unwrap(), 42);
        assert_eq!(parse_seed("0x2A").unwrap(), 42);
        assert!(parse_seed("zz").is_err());
    }
}
