//! Engine configuration
//!
//! Every section deserializes with defaults, so a config file only needs the
//! values it changes:
//!
//! ```toml
//! [index]
//! dim = 384
//! backend = "hnsw"
//!
//! [scoring.weights]
//! similarity = 1.0
//! location = 0.2
//!
//! [scoring.recency]
//! curve = "exponential"
//! window_days = 14.0
//! ```

use placerank_core::{Error, IndexConfig, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub scoring: ScoringConfig,
    pub retrieval: RetrievalConfig,
    pub quality: QualityThresholds,
}

impl EngineConfig {
    pub fn with_dim(dim: usize) -> Self {
        Self {
            index: IndexConfig::with_dim(dim),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.index.validate()?;
        self.scoring.validate()?;
        self.retrieval.validate()?;
        self.quality.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayCurve {
    /// `1 - age / window`
    Linear,
    /// `0.5 ^ (age / window)`; the window is the half-life
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyConfig {
    pub curve: DecayCurve,
    pub window_days: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            curve: DecayCurve::Linear,
            window_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight overrides keyed by booster name; `similarity` sets the similarity weight.
    /// Boosters not listed keep their built-in default weight.
    pub weights: BTreeMap<String, f32>,
    /// Upper bound of each booster's contribution, 1.0 when not listed
    pub booster_max: BTreeMap<String, f32>,
    /// Share of the full boost given when either side leaves an attribute unset
    pub partial_match: f32,
    pub recency: RecencyConfig,
    /// Compare locations and skills case-sensitively
    pub case_sensitive: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            booster_max: BTreeMap::new(),
            partial_match: 0.5,
            recency: RecencyConfig::default(),
            case_sensitive: false,
        }
    }
}

impl ScoringConfig {
    /// Range checks. Booster names are checked when the adjuster is built.
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "weight for '{}' must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        for (name, max) in &self.booster_max {
            if !max.is_finite() || *max <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "booster_max for '{}' must be positive, got {}",
                    name, max
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.partial_match) {
            return Err(Error::InvalidConfig(format!(
                "partial_match must be in [0, 1], got {}",
                self.partial_match
            )));
        }
        if !self.recency.window_days.is_finite() || self.recency.window_days <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "recency.window_days must be positive, got {}",
                self.recency.window_days
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default over-fetch is `max(top_n * over_fetch_factor, top_n + over_fetch_min_extra)`
    pub over_fetch_factor: usize,
    pub over_fetch_min_extra: usize,
    /// Retrieval rounds before settling for a short result; each round doubles the fetch
    pub max_attempts: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            over_fetch_factor: 3,
            over_fetch_min_extra: 20,
            max_attempts: 3,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.over_fetch_factor == 0 {
            return Err(Error::InvalidConfig(
                "over_fetch_factor must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn default_over_fetch(&self, top_n: usize) -> usize {
        top_n
            .saturating_mul(self.over_fetch_factor)
            .max(top_n.saturating_add(self.over_fetch_min_extra))
    }
}

/// Best-score thresholds used to label a ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub no_results: f32,
    pub suggestion: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            no_results: 0.30,
            suggestion: 0.45,
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.no_results.is_finite() || !self.suggestion.is_finite() {
            return Err(Error::InvalidConfig(
                "quality thresholds must be finite".to_string(),
            ));
        }
        if self.no_results > self.suggestion {
            return Err(Error::InvalidConfig(format!(
                "quality.no_results ({}) must not exceed quality.suggestion ({})",
                self.no_results, self.suggestion
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_over_fetch() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.default_over_fetch(5), 25);
        assert_eq!(retrieval.default_over_fetch(10), 30);
        assert_eq!(retrieval.default_over_fetch(50), 150);
        assert_eq!(retrieval.default_over_fetch(0), 20);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = EngineConfig::default();
        config.scoring.weights.insert("location".to_string(), -0.1);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut scoring = ScoringConfig::default();
        scoring.partial_match = 1.5;
        assert!(scoring.validate().is_err());

        let mut scoring = ScoringConfig::default();
        scoring.recency.window_days = 0.0;
        assert!(scoring.validate().is_err());

        let mut scoring = ScoringConfig::default();
        scoring.booster_max.insert("skills".to_string(), 0.0);
        assert!(scoring.validate().is_err());

        let retrieval = RetrievalConfig {
            max_attempts: 0,
            ..RetrievalConfig::default()
        };
        assert!(retrieval.validate().is_err());

        let quality = QualityThresholds {
            no_results: 0.5,
            suggestion: 0.4,
        };
        assert!(quality.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"index": {"dim": 8}, "scoring": {"recency": {"curve": "exponential"}}}"#,
        )
        .unwrap();
        assert_eq!(config.index.dim, 8);
        assert_eq!(config.scoring.recency.curve, DecayCurve::Exponential);
        assert_eq!(config.scoring.recency.window_days, 30.0);
        assert_eq!(config.retrieval.max_attempts, 3);
    }
}
