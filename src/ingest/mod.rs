//! Ingestion Module
//!
//! バッチ取り込み・統合

mod consolidator;
mod records;
mod types;

pub use consolidator::consolidate;
pub use records::{consolidate_records, decode_batch, REQUIRED_FIELDS};
pub use types::{Batch, ConsolidatedDataset, Quality, Reading};
