//! Ranked output with per-booster explanations

use crate::adjuster::BoosterWeights;
use crate::config::QualityThresholds;
use placerank_core::{ItemAttributes, ItemId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One ranked posting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub id: ItemId,
    pub final_score: f32,
    /// Similarity under the index metric, before adjustment
    pub raw_similarity: f32,
    /// Unweighted contribution per booster
    pub contributions: BTreeMap<String, f32>,
    pub item: Arc<ItemAttributes>,
}

impl RankedItem {
    /// Booster with the largest weighted share of the final score, if any
    pub fn top_booster(&self, weights: &BoosterWeights) -> Option<(&str, f32)> {
        self.contributions
            .iter()
            .map(|(name, value)| (name.as_str(), value * weights.get(name)))
            .filter(|(_, weighted)| *weighted > 0.0)
            .fold(None, |best, (name, weighted)| match best {
                Some((_, top)) if top >= weighted => best,
                _ => Some((name, weighted)),
            })
    }
}

/// Label for how well the best result fits the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    NoResults,
    Suggestion,
    Results,
}

impl MatchQuality {
    pub fn classify(best_score: Option<f32>, thresholds: &QualityThresholds) -> Self {
        match best_score {
            None => MatchQuality::NoResults,
            Some(score) if score < thresholds.no_results => MatchQuality::NoResults,
            Some(score) if score < thresholds.suggestion => MatchQuality::Suggestion,
            Some(_) => MatchQuality::Results,
        }
    }
}

/// Counters from one ranking call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankStats {
    /// Hits returned by the index in the final round
    pub candidates_fetched: usize,
    pub expired_filtered: usize,
    /// Indexed ids with no catalog entry
    pub integrity_faults: Vec<ItemId>,
    pub rounds: usize,
    pub snapshot_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_score: Option<f32>,
}

/// Result of [`RankingEngine::rank`](crate::RankingEngine::rank)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub results: Vec<RankedItem>,
    pub quality: MatchQuality,
    /// Weights applied to every result
    pub weights: BoosterWeights,
    pub stats: RankStats,
}

impl Ranking {
    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.results.iter().map(|r| r.id.clone()).collect()
    }

    /// Render a short human-readable summary, one line per result
    pub fn explain(&self) -> String {
        let mut lines = Vec::with_capacity(self.results.len() + 1);
        lines.push(format!(
            "{:?}: {} result(s) from {} candidate(s)",
            self.quality,
            self.results.len(),
            self.stats.candidates_fetched
        ));
        for (rank, result) in self.results.iter().enumerate() {
            let driver = match result.top_booster(&self.weights) {
                Some((name, weighted)) => format!(", top booster {} (+{:.3})", name, weighted),
                None => String::new(),
            };
            let title = if result.item.title.is_empty() {
                result.id.to_string()
            } else {
                format!("{} ({})", result.item.title, result.id)
            };
            lines.push(format!(
                "{}. {} score {:.3}, similarity {:.3}{}",
                rank + 1,
                title,
                result.final_score,
                result.raw_similarity,
                driver
            ));
        }
        lines.join("\n")
    }
}
