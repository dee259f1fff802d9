//! # placerank Ranking
//!
//! Turns nearest-neighbor candidates into an explainable ranked list of postings.
//!
//! ## Features
//!
//! - **Boosters**: Named scoring rules for location, stipend, skills, recency and duration
//! - **Score Adjuster**: Combines raw similarity with weighted booster contributions
//! - **Ranking Engine**: Over-fetch, catalog join, expiry filter, scoring and sort
//! - **Explainability**: Per-booster contributions and match-quality labels
//!
//! ## Example
//!
//! ```rust
//! use placerank_core::{Item, ItemAttributes, Vector};
//! use placerank_ranking::{EngineConfig, Query, RankingEngine};
//!
//! let engine = RankingEngine::new(EngineConfig::with_dim(3)).unwrap();
//! let posting = ItemAttributes::new(1u64, chrono::Utc::now())
//!     .with_title("Data Analyst", "Acme")
//!     .with_location("NYC")
//!     .with_skills(["python", "sql"]);
//! engine.upsert(Item::new(posting, Vector::new(vec![1.0, 0.0, 0.0]))).unwrap();
//!
//! let query = Query::new(Vector::new(vec![0.9, 0.1, 0.0]))
//!     .with_location("NYC")
//!     .with_skills(["python"]);
//! let ranking = engine.rank(&query, 5, None).unwrap();
//! assert_eq!(ranking.len(), 1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Query     │────>│ VectorIndex │────>│ ItemCatalog │
//! │ (embedding) │     │ (snapshot)  │     │   (join)    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Ranking   │<────│  Adjuster   │
//!                     │  (explain)  │     │ (boosters)  │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod adjuster;
pub mod boosters;
pub mod config;
pub mod engine;
pub mod explain;
pub mod query;

pub use adjuster::{Adjustment, BoosterWeights, ScoreAdjuster, SIMILARITY};
pub use boosters::{
    Booster, DurationBooster, LocationBooster, RecencyBooster, SkillsBooster, StipendBooster,
};
pub use config::{
    DecayCurve, EngineConfig, QualityThresholds, RecencyConfig, RetrievalConfig, ScoringConfig,
};
pub use engine::{IntegrityReport, RankingEngine};
pub use explain::{MatchQuality, RankStats, RankedItem, Ranking};
pub use query::Query;
