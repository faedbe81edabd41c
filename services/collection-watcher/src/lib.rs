//! Collection watcher library: declarations loading, granule scanning,
//! and the classify → publish → record producer.

pub mod config;
pub mod declarations;
pub mod producer;
pub mod scan;

pub use config::WatcherConfig;
pub use declarations::load_declarations;
pub use producer::{render_pipeline_config, CollectionProcessor, ProcessOutcome};
pub use scan::scan_granules;
