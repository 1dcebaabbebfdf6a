//! Similarity retrieval over past agent decisions

pub mod engine;
pub mod scoring;

pub use engine::SimilarityRetrieval;
pub use scoring::{IndicatorSet, RetrievalTier, SimilarDecision, DEFAULT_TOLERANCE};
