//! Summary Module
//!
//! センサー/品質別の統計集計と時間窓集計

pub mod aggregator;
pub mod source;
pub mod types;
pub mod window;

pub use aggregator::{summarize, summarize_by, DEFAULT_GROUP_BY};
pub use source::{Column, RowView, SummarySource};
pub use types::{GroupedSummary, SummaryMap, SummaryRecord};
pub use window::TimeWindow;
