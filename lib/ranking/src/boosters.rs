//! Rule-based boosters
//!
//! Each booster scores one aspect of how well a posting fits a query. Scores are
//! normalized to [0.0, 1.0]; the [`ScoreAdjuster`](crate::ScoreAdjuster) scales
//! them by the configured maximum and weight.

use crate::config::{DecayCurve, RecencyConfig};
use crate::query::Query;
use chrono::{DateTime, Utc};
use placerank_core::ItemAttributes;
use std::collections::BTreeSet;

pub const LOCATION: &str = "location";
pub const STIPEND: &str = "stipend";
pub const SKILLS: &str = "skills";
pub const RECENCY: &str = "recency";
pub const DURATION: &str = "duration";

/// A named scoring rule
pub trait Booster: Send + Sync + std::fmt::Debug {
    /// Name used in weight maps and contribution breakdowns
    fn name(&self) -> &'static str;

    /// Weight applied when neither config nor query overrides it
    fn default_weight(&self) -> f32;

    /// Normalized fit in [0.0, 1.0]. Must be deterministic.
    fn score(&self, item: &ItemAttributes, query: &Query, now: DateTime<Utc>) -> f32;
}

#[inline]
fn normalize(value: &str, case_sensitive: bool) -> String {
    let trimmed = value.trim();
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[inline]
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Full boost on an exact location match, partial when either side is unset
#[derive(Debug, Clone)]
pub struct LocationBooster {
    pub partial: f32,
    pub case_sensitive: bool,
}

impl Booster for LocationBooster {
    fn name(&self) -> &'static str {
        LOCATION
    }

    fn default_weight(&self) -> f32 {
        0.15
    }

    fn score(&self, item: &ItemAttributes, query: &Query, _now: DateTime<Utc>) -> f32 {
        match (non_blank(&item.location), non_blank(&query.desired_location)) {
            (Some(have), Some(want)) => {
                if normalize(have, self.case_sensitive) == normalize(want, self.case_sensitive) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => self.partial,
        }
    }
}

/// Full boost when stipend ranges overlap, decaying linearly with the gap otherwise
#[derive(Debug, Clone)]
pub struct StipendBooster {
    pub partial: f32,
}

impl Booster for StipendBooster {
    fn name(&self) -> &'static str {
        STIPEND
    }

    fn default_weight(&self) -> f32 {
        0.10
    }

    fn score(&self, item: &ItemAttributes, query: &Query, _now: DateTime<Utc>) -> f32 {
        let Some(wanted) = &query.desired_stipend else {
            return 1.0;
        };
        let Some(offered) = &item.stipend else {
            return self.partial;
        };
        if offered.overlaps(wanted) {
            return 1.0;
        }
        let scale = wanted.max.max(1) as f64;
        let gap = offered.gap(wanted) as f64;
        (1.0 - gap / scale).max(0.0) as f32
    }
}

/// Jaccard overlap of skill sets
#[derive(Debug, Clone)]
pub struct SkillsBooster {
    pub case_sensitive: bool,
}

impl SkillsBooster {
    fn normalized(&self, skills: &BTreeSet<String>) -> BTreeSet<String> {
        skills
            .iter()
            .map(|s| normalize(s, self.case_sensitive))
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Booster for SkillsBooster {
    fn name(&self) -> &'static str {
        SKILLS
    }

    fn default_weight(&self) -> f32 {
        0.15
    }

    fn score(&self, item: &ItemAttributes, query: &Query, _now: DateTime<Utc>) -> f32 {
        let wanted = self.normalized(&query.desired_skills);
        if wanted.is_empty() {
            return 1.0;
        }
        let offered = self.normalized(&item.skills);
        if offered.is_empty() {
            return 0.0;
        }
        let intersection = wanted.intersection(&offered).count();
        let union = wanted.union(&offered).count();
        intersection as f32 / union as f32
    }
}

/// Decays with the age of the posting
#[derive(Debug, Clone)]
pub struct RecencyBooster {
    pub curve: DecayCurve,
    pub window_days: f64,
}

impl From<&RecencyConfig> for RecencyBooster {
    fn from(config: &RecencyConfig) -> Self {
        Self {
            curve: config.curve,
            window_days: config.window_days,
        }
    }
}

impl Booster for RecencyBooster {
    fn name(&self) -> &'static str {
        RECENCY
    }

    fn default_weight(&self) -> f32 {
        0.10
    }

    fn score(&self, item: &ItemAttributes, _query: &Query, now: DateTime<Utc>) -> f32 {
        let age_days = (now - item.posted_at).num_seconds() as f64 / 86_400.0;
        if age_days <= 0.0 {
            return 1.0;
        }
        let fit = match self.curve {
            DecayCurve::Linear => 1.0 - age_days / self.window_days,
            DecayCurve::Exponential => 0.5f64.powf(age_days / self.window_days),
        };
        fit.clamp(0.0, 1.0) as f32
    }
}

/// Closeness of the posting's duration to the desired one
#[derive(Debug, Clone)]
pub struct DurationBooster {
    pub partial: f32,
}

impl Booster for DurationBooster {
    fn name(&self) -> &'static str {
        DURATION
    }

    fn default_weight(&self) -> f32 {
        0.05
    }

    fn score(&self, item: &ItemAttributes, query: &Query, _now: DateTime<Utc>) -> f32 {
        let Some(wanted) = query.desired_duration_months.filter(|m| *m > 0) else {
            return 1.0;
        };
        let Some(offered) = item.duration_months else {
            return self.partial;
        };
        let diff = (offered as f32 - wanted as f32).abs();
        (1.0 - diff / wanted as f32).max(0.0)
    }
}
