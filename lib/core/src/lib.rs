//! # placerank Core
//!
//! Core library for the placerank posting matcher.
//!
//! This crate provides the retrieval half of the ranking pipeline:
//!
//! - [`Vector`] - Dense embedding with similarity helpers
//! - [`Item`] / [`ItemAttributes`] - A posting and the attributes used for rescoring
//! - [`VectorIndex`] - Versioned, copy-on-write index over embeddings
//! - [`HnswIndex`] / [`FlatIndex`] - Approximate and exact [`AnnIndex`] backends
//! - [`ItemCatalog`] - Attribute store joined with the index by [`ItemId`]
//! - [`Embedder`] - Text to vector capability, with [`HashingEmbedder`]
//!
//! ## Example
//!
//! ```rust
//! use placerank_core::{IndexConfig, ItemId, Vector, VectorIndex};
//!
//! let index = VectorIndex::new(IndexConfig::with_dim(3)).unwrap();
//! index.insert(ItemId::from("p1"), Vector::new(vec![1.0, 0.0, 0.0])).unwrap();
//!
//! let query = Vector::new(vec![1.0, 0.0, 0.0]);
//! let hits = index.search(&query, 10).unwrap();
//! assert_eq!(hits[0].id, ItemId::from("p1"));
//! ```

pub mod catalog;
pub mod embedder;
pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod item;
mod slots;
pub mod vector;

pub use catalog::{BatchLookup, ItemCatalog};
pub use embedder::{Embedder, HashingEmbedder, DEFAULT_HASHING_DIM};
pub use error::{Error, ErrorKind, Result};
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use index::{
    AnnIndex, HnswConfig, IndexBackend, IndexConfig, IndexSnapshot, Metric, SearchHit,
    VectorIndex,
};
pub use item::{parse_deadline, Item, ItemAttributes, ItemId, StipendRange};
pub use vector::Vector;
