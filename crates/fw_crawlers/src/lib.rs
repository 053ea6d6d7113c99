pub mod adapters;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod manager;
pub mod market;

pub use adapters::{AdapterContext, AdapterEntry, Region, SourceAdapter};
pub use fetch::{FetchError, Fetcher, RetryPolicy};
pub use logging::init_logging;
pub use manager::{CrawlManager, RunOutcome, RunReport};
pub use market::{DragonTigerSource, TushareSectorSource};

pub mod prelude {
    pub use super::adapters::SourceAdapter;
    pub use fw_core::{Candidate, Error, Result};
}
