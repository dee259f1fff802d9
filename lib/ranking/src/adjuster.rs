//! Score composition
//!
//! `final_score = raw_similarity * similarity_weight + Σ weight_i * contribution_i`
//!
//! where `contribution_i = booster_max_i * fit_i` and `fit_i` is the booster's
//! normalized score in [0, 1]. The computation is pure: identical inputs give
//! identical scores and breakdowns.

use crate::boosters::{
    Booster, DurationBooster, LocationBooster, RecencyBooster, SkillsBooster, StipendBooster,
};
use crate::config::ScoringConfig;
use crate::query::Query;
use chrono::{DateTime, Utc};
use placerank_core::{Error, ItemAttributes, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key for the similarity weight in weight maps
pub const SIMILARITY: &str = "similarity";

/// Default weight of the raw similarity term
pub const DEFAULT_SIMILARITY_WEIGHT: f32 = 1.0;

/// Resolved weights for one computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoosterWeights {
    pub similarity: f32,
    pub boosters: BTreeMap<String, f32>,
}

impl BoosterWeights {
    #[inline]
    pub fn get(&self, booster: &str) -> f32 {
        self.boosters.get(booster).copied().unwrap_or(0.0)
    }

    /// Sum of booster weights, excluding similarity
    pub fn booster_total(&self) -> f32 {
        self.boosters.values().sum()
    }
}

/// Score and per-booster breakdown for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub final_score: f32,
    /// Unweighted contribution of each booster, within [0, booster_max]
    pub contributions: BTreeMap<String, f32>,
}

/// Composes raw similarity with registered boosters
#[derive(Debug, Clone)]
pub struct ScoreAdjuster {
    boosters: Vec<Arc<dyn Booster>>,
    booster_max: BTreeMap<String, f32>,
    defaults: BoosterWeights,
}

impl ScoreAdjuster {
    /// Adjuster with the built-in location, stipend, skills, recency and duration boosters
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        Self::with_boosters(config, Self::default_boosters(config))
    }

    pub fn default_boosters(config: &ScoringConfig) -> Vec<Arc<dyn Booster>> {
        vec![
            Arc::new(LocationBooster {
                partial: config.partial_match,
                case_sensitive: config.case_sensitive,
            }),
            Arc::new(StipendBooster {
                partial: config.partial_match,
            }),
            Arc::new(SkillsBooster {
                case_sensitive: config.case_sensitive,
            }),
            Arc::new(RecencyBooster::from(&config.recency)),
            Arc::new(DurationBooster {
                partial: config.partial_match,
            }),
        ]
    }

    /// Adjuster over an arbitrary booster set. Config weights and maxima must name
    /// registered boosters.
    pub fn with_boosters(config: &ScoringConfig, boosters: Vec<Arc<dyn Booster>>) -> Result<Self> {
        config.validate()?;

        let mut default_weights = BTreeMap::new();
        for booster in &boosters {
            let name = booster.name();
            if name == SIMILARITY || default_weights.contains_key(name) {
                return Err(Error::InvalidConfig(format!(
                    "booster name '{}' is reserved or registered twice",
                    name
                )));
            }
            default_weights.insert(name.to_string(), booster.default_weight());
        }

        for name in config.booster_max.keys() {
            if !default_weights.contains_key(name) {
                return Err(Error::UnknownBooster(name.clone()));
            }
        }
        let booster_max = default_weights
            .keys()
            .map(|name| {
                let max = config.booster_max.get(name).copied().unwrap_or(1.0);
                (name.clone(), max)
            })
            .collect();

        let base = BoosterWeights {
            similarity: DEFAULT_SIMILARITY_WEIGHT,
            boosters: default_weights,
        };
        let defaults = apply_overrides(&base, &config.weights)?;

        Ok(Self {
            boosters,
            booster_max,
            defaults,
        })
    }

    /// Weights used when a query has no overrides
    #[inline]
    pub fn default_weights(&self) -> &BoosterWeights {
        &self.defaults
    }

    pub fn booster_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.boosters.iter().map(|b| b.name())
    }

    #[inline]
    pub fn booster_max(&self, booster: &str) -> f32 {
        self.booster_max.get(booster).copied().unwrap_or(1.0)
    }

    /// Defaults with per-query overrides applied; unknown names and negative or
    /// non-finite weights are configuration errors.
    pub fn resolve_weights(&self, overrides: &BTreeMap<String, f32>) -> Result<BoosterWeights> {
        apply_overrides(&self.defaults, overrides)
    }

    /// Final score and contribution breakdown for one candidate
    pub fn compute(
        &self,
        raw_similarity: f32,
        item: &ItemAttributes,
        query: &Query,
        weights: &BoosterWeights,
        now: DateTime<Utc>,
    ) -> Adjustment {
        let mut final_score = raw_similarity * weights.similarity;
        let mut contributions = BTreeMap::new();

        for booster in &self.boosters {
            let name = booster.name();
            let fit = booster.score(item, query, now);
            let fit = if fit.is_finite() { fit.clamp(0.0, 1.0) } else { 0.0 };
            let contribution = fit * self.booster_max(name);
            final_score += weights.get(name) * contribution;
            contributions.insert(name.to_string(), contribution);
        }

        Adjustment {
            final_score,
            contributions,
        }
    }
}

fn apply_overrides(
    base: &BoosterWeights,
    overrides: &BTreeMap<String, f32>,
) -> Result<BoosterWeights> {
    let mut weights = base.clone();
    for (name, weight) in overrides {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "weight for '{}' must be a non-negative number, got {}",
                name, weight
            )));
        }
        if name == SIMILARITY {
            weights.similarity = *weight;
        } else if let Some(slot) = weights.boosters.get_mut(name) {
            *slot = *weight;
        } else {
            return Err(Error::UnknownBooster(name.clone()));
        }
    }
    Ok(weights)
}
