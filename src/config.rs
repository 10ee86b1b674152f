//! Pipeline configuration
//!
//! 既定値 → TOMLファイル → 環境変数 の順に上書きする。

mod loader;
mod types;

pub use loader::{ConfigLoader, DEFAULT_CONFIG_NAME, ENV_PREFIX};
pub use types::{DetectionConfig, IngestConfig, PipelineConfig, SummaryConfig};
