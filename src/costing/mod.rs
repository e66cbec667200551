//! Cost enrichment and margin summaries for quotations.
//!
//! [`calculate_summary`] is pure. [`enrich_item_with_cost`] consults the
//! material and personnel catalogs under a timeout and falls back to the
//! caller-supplied cost.

mod enrich;
mod summary;

pub use enrich::{apply_margin, enrich_item_with_cost, enrich_items};
pub use summary::{
    CalcSummary, CostSummary, DraftSummary, LockedSummary, calculate_summary, recalculate_summary,
};
