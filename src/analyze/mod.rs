// src/analyze/mod.rs
//! Language-model backed analysis: per-article sentiment, weight allocation
//! across an article batch, and the keyword rule engine.

pub mod ai_adapter;
pub mod cache;
pub mod classifier;
pub mod rules;
pub mod weights;

pub use crate::analyze::cache::WeightCache;
pub use crate::analyze::classifier::{SentimentClassifier, SentimentScale, SentimentVerdict};
pub use crate::analyze::rules::{HotReloadRules, KeywordRuleSet, RuleEngine};
pub use crate::analyze::weights::{AllocatorError, WeightAllocation, WeightAllocator, WeightRequest};
