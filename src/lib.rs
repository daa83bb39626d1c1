pub mod config;
pub mod decoder;
pub mod driver;
pub mod metrics;
pub mod oracle;
pub mod source;
pub mod store;
pub mod types;

pub use driver::PoolMonitor;
pub use metrics::{MetricsEngine, WashConfig};
pub use types::{DecodedEvent, PoolSnapshot, RawLog, TrackedPool};
