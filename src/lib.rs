//! # placerank
//!
//! Ranks internship postings for a candidate by combining embedding similarity
//! with rule-based boosters for location, stipend, skills, recency and duration.
//!
//! ## Quick Start
//!
//! ### From the Command Line
//!
//! ```bash
//! placerank --catalog postings.json rank --text "data analyst python" --location NYC
//! placerank --catalog postings.json check
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use placerank::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::with_dim(256);
//! let embedder = Arc::new(HashingEmbedder::new(256).unwrap());
//! let source = JsonPostingsSource::new("postings.json", embedder.clone());
//!
//! let engine = RankingEngine::new(config).unwrap();
//! engine.rebuild(source.load().unwrap()).unwrap();
//!
//! let query = Query::new(embedder.embed("data analyst python sql").unwrap())
//!     .with_location("NYC")
//!     .with_skills(["python"]);
//! let ranking = engine.rank(&query, 10, None).unwrap();
//! println!("{}", ranking.explain());
//! ```
//!
//! ## Crate Structure
//!
//! - `placerank-core` - Vectors, items, the versioned ANN index, the catalog and the embedder interface
//! - `placerank-ranking` - Boosters, the score adjuster and the ranking engine
//! - this crate - Posting sources, config file loading and the `placerank` binary

pub mod config;
pub mod store;

// Re-export core types
pub use placerank_core::{
    Embedder, Error, ErrorKind, HashingEmbedder, Item, ItemAttributes, ItemCatalog, ItemId,
    Result, StipendRange, Vector, VectorIndex,
};

// Re-export ranking
pub use placerank_ranking::{
    EngineConfig, MatchQuality, Query, RankedItem, Ranking, RankingEngine, ScoreAdjuster,
};

pub use store::{EmbeddingCache, ItemSource, JsonPostingsSource, PostingRecord};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Embedder, Error, HashingEmbedder, Item, ItemAttributes, ItemId, Result, Vector,
        EngineConfig, Query, Ranking, RankingEngine,
        ItemSource, JsonPostingsSource,
    };
}
