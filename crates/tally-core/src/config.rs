//! Reconciliation configuration
//!
//! Loaded in layers: built-in defaults, then the TOML file (an explicit path,
//! else `<data_local_dir>/tally/config.toml` when present), then `TALLY_*`
//! environment overrides.
//!
//! ```toml
//! [reconcile]
//! similarity_threshold = 0.6
//! date_window_days = 3
//! amount_tolerance = 0.01
//! candidate_limit = 10
//! external_id_matching = "fuzzy"
//!
//! [store]
//! lock_timeout_secs = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_DATE_WINDOW_DAYS: u32 = 3;
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;

/// Whether rows carrying a bank identifier go through fuzzy matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalIdMatching {
    /// Bank-identified rows are still checked for near-duplicates
    #[default]
    Fuzzy,
    /// A bank identifier is trusted: only exact duplicates are filtered
    ExactOnly,
}

impl ExternalIdMatching {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fuzzy => "fuzzy",
            Self::ExactOnly => "exact_only",
        }
    }
}

impl FromStr for ExternalIdMatching {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fuzzy" => Ok(Self::Fuzzy),
            "exact_only" | "exact-only" => Ok(Self::ExactOnly),
            _ => Err(format!("Unknown external id matching policy: {}", s)),
        }
    }
}

impl std::fmt::Display for ExternalIdMatching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunables of the near-duplicate search
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Minimum description similarity for a near-duplicate, in [0, 1]
    pub similarity_threshold: f64,
    /// Days on either side of the candidate's date
    pub date_window_days: u32,
    /// Absolute amount difference still considered the same amount
    pub amount_tolerance: Decimal,
    /// Maximum ledger rows scored per candidate
    pub candidate_limit: usize,
    pub external_id_matching: ExternalIdMatching,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            date_window_days: DEFAULT_DATE_WINDOW_DAYS,
            amount_tolerance: Decimal::new(1, 2),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            external_id_matching: ExternalIdMatching::Fuzzy,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity_threshold must be between 0 and 1, got {}",
                self.similarity_threshold
            )));
        }
        if self.amount_tolerance.is_sign_negative() {
            return Err(Error::Config(format!(
                "amount_tolerance must not be negative, got {}",
                self.amount_tolerance
            )));
        }
        if self.candidate_limit == 0 {
            return Err(Error::Config(
                "candidate_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full configuration: reconciliation tunables plus store settings
#[derive(Debug, Clone, PartialEq)]
pub struct TallyConfig {
    pub reconcile: ReconcileConfig,
    /// Upper bound on waiting for the SQLite write lock and for a pooled connection
    pub lock_timeout: Duration,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }
}

/// Default config location (~/.local/share/tally/config.toml on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config.toml"))
}

impl TallyConfig {
    /// Load defaults, then the config file, then environment overrides
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut config = match override_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::parse(&content)
    }

    /// Parse TOML on top of the built-in defaults
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Self::default();

        if let Some(reconcile) = raw.reconcile {
            let target = &mut config.reconcile;
            if let Some(threshold) = reconcile.similarity_threshold {
                target.similarity_threshold = threshold;
            }
            if let Some(days) = reconcile.date_window_days {
                target.date_window_days = days;
            }
            if let Some(tolerance) = reconcile.amount_tolerance {
                target.amount_tolerance = Decimal::from_f64(tolerance)
                    .map(|d| d.round_dp(4))
                    .ok_or_else(|| {
                        Error::Config(format!("Invalid amount_tolerance: {}", tolerance))
                    })?;
            }
            if let Some(limit) = reconcile.candidate_limit {
                target.candidate_limit = limit;
            }
            if let Some(policy) = reconcile.external_id_matching {
                target.external_id_matching = policy;
            }
        }

        if let Some(store) = raw.store {
            if let Some(secs) = store.lock_timeout_secs {
                config.lock_timeout = Duration::from_secs(secs);
            }
        }

        Ok(config)
    }

    /// Apply `TALLY_*` overrides from a variable lookup
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("TALLY_SIMILARITY_THRESHOLD") {
            self.reconcile.similarity_threshold = parse_env("TALLY_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("TALLY_DATE_WINDOW_DAYS") {
            self.reconcile.date_window_days = parse_env("TALLY_DATE_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = get("TALLY_AMOUNT_TOLERANCE") {
            self.reconcile.amount_tolerance = parse_env("TALLY_AMOUNT_TOLERANCE", &v)?;
        }
        if let Some(v) = get("TALLY_CANDIDATE_LIMIT") {
            self.reconcile.candidate_limit = parse_env("TALLY_CANDIDATE_LIMIT", &v)?;
        }
        if let Some(v) = get("TALLY_EXTERNAL_ID_MATCHING") {
            self.reconcile.external_id_matching = v.parse().map_err(Error::Config)?;
        }
        if let Some(v) = get("TALLY_LOCK_TIMEOUT_SECS") {
            self.lock_timeout = Duration::from_secs(parse_env("TALLY_LOCK_TIMEOUT_SECS", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.reconcile.validate()?;
        if self.lock_timeout.is_zero() {
            return Err(Error::Config(
                "lock_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        let raw = RawConfig {
            reconcile: Some(RawReconcile {
                similarity_threshold: Some(self.reconcile.similarity_threshold),
                date_window_days: Some(self.reconcile.date_window_days),
                amount_tolerance: self.reconcile.amount_tolerance.to_f64(),
                candidate_limit: Some(self.reconcile.candidate_limit),
                external_id_matching: Some(self.reconcile.external_id_matching),
            }),
            store: Some(RawStore {
                lock_timeout_secs: Some(self.lock_timeout.as_secs()),
            }),
        };
        toml::to_string(&raw).map_err(|e| Error::Config(format!("Failed to render config: {}", e)))
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawConfig {
    reconcile: Option<RawReconcile>,
    store: Option<RawStore>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawReconcile {
    similarity_threshold: Option<f64>,
    date_window_days: Option<u32>,
    amount_tolerance: Option<f64>,
    candidate_limit: Option<usize>,
    external_id_matching: Option<ExternalIdMatching>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawStore {
    lock_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TallyConfig::default();
        assert_eq!(config.reconcile.similarity_threshold, 0.6);
        assert_eq!(config.reconcile.date_window_days, 3);
        assert_eq!(config.reconcile.amount_tolerance, Decimal::new(1, 2));
        assert_eq!(config.reconcile.candidate_limit, 10);
        assert_eq!(config.reconcile.external_id_matching, ExternalIdMatching::Fuzzy);
        assert_eq!(config.lock_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = TallyConfig::parse(
            r#"
            [reconcile]
            date_window_days = 10
            external_id_matching = "exact_only"

            [store]
            lock_timeout_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.reconcile.date_window_days, 10);
        assert_eq!(config.reconcile.external_id_matching, ExternalIdMatching::ExactOnly);
        assert_eq!(config.reconcile.similarity_threshold, 0.6);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(matches!(
            TallyConfig::parse("[reconcile\nfoo"),
            Err(Error::Config(_))
        ));
        assert!(TallyConfig::parse("[reconcile]\nexternal_id_matching = \"sometimes\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TALLY_SIMILARITY_THRESHOLD", "0.8"),
            ("TALLY_AMOUNT_TOLERANCE", "0.05"),
            ("TALLY_EXTERNAL_ID_MATCHING", "exact-only"),
        ]
        .into_iter()
        .collect();

        let mut config = TallyConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.reconcile.similarity_threshold, 0.8);
        assert_eq!(config.reconcile.amount_tolerance, Decimal::new(5, 2));
        assert_eq!(config.reconcile.external_id_matching, ExternalIdMatching::ExactOnly);
        assert_eq!(config.reconcile.date_window_days, 3);

        let mut config = TallyConfig::default();
        let result = config.apply_env(|key| {
            (key == "TALLY_CANDIDATE_LIMIT").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate() {
        let mut config = TallyConfig::default();
        config.reconcile.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.reconcile.candidate_limit = 0;
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.lock_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconcile]\ncandidate_limit = 25").unwrap();

        let config = TallyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.reconcile.candidate_limit, 25);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            TallyConfig::load(Some(&missing)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = TallyConfig::default();
        config.reconcile.date_window_days = 7;
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("date_window_days = 7"));
        assert_eq!(TallyConfig::parse(&rendered).unwrap(), config);
    }
}
