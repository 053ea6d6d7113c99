pub mod config;
pub mod date;
pub mod error;
pub mod models;
pub mod storage;
pub mod types;

pub use config::{EmailSettings, Settings};
pub use error::{Error, Result};
pub use models::{MarketMoverSource, TextGenerator};
pub use storage::ArticleStorage;
pub use types::{
    AnalysisDetails, AnalysisMode, AnalysisResult, Article, Candidate, CollectionRef, MarketMover,
    SaveCounts,
};
