//! # Reclassification
//! Batch pass over general headlines that still carry a fallback tag
//! (`MARKET`, `GENERAL`). Each row's `title + " " + description` is matched
//! against the keyword rules; the first matching rule rewrites the row's
//! symbol and category.
//!
//! Rows that match nothing are left alone. Rows already moved to a real
//! ticker are no longer selected, so a second run is a no-op.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;

use crate::analyze::rules::HotReloadRules;
use crate::store::{DynStore, StoreResult};
use crate::symbols::FALLBACK_SYMBOLS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolUpdate {
    pub id: i64,
    pub title: String,
    pub old_symbol: String,
    pub new_symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclassifyReport {
    pub success: bool,
    pub message: String,
    pub total_processed: usize,
    pub updated_count: usize,
    pub updates: Vec<SymbolUpdate>,
}

pub struct Reclassifier {
    store: DynStore,
    rules: Arc<HotReloadRules>,
}

impl Reclassifier {
    pub fn new(store: DynStore, rules: Arc<HotReloadRules>) -> Self {
        Self { store, rules }
    }

    /// Listing failures abort the pass; individual update failures are
    /// logged and skipped.
    pub async fn run(&self) -> StoreResult<ReclassifyReport> {
        let engine = self.rules.current();
        let rows = self
            .store
            .list_by_symbols(FALLBACK_SYMBOLS, usize::MAX)
            .await?;

        let mut updates = Vec::new();
        for row in &rows {
            let Some(id) = row.id else {
                continue;
            };
            let Some(rule) = engine.first_match(row.search_text().as_str()) else {
                continue;
            };
            let target = &rule.target;
            match self
                .store
                .update_symbol(id, &target.symbol, &target.category)
                .await
            {
                Ok(()) => {
                    tracing::debug!(id, rule = %rule.name, from = %row.symbol, to = %target.symbol, "article reclassified");
                    updates.push(SymbolUpdate {
                        id,
                        title: row.title.clone(),
                        old_symbol: row.symbol.clone(),
                        new_symbol: target.symbol.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(id, error = %e, "reclassify update failed; skipping row");
                }
            }
        }

        counter!("reclassify_updates_total").increment(updates.len() as u64);
        let report = ReclassifyReport {
            success: true,
            message: format!(
                "Reclassified {} of {} general articles",
                updates.len(),
                rows.len()
            ),
            total_processed: rows.len(),
            updated_count: updates.len(),
            updates,
        };
        tracing::info!(
            processed = report.total_processed,
            updated = report.updated_count,
            "reclassification finished"
        );
        Ok(report)
    }
}
