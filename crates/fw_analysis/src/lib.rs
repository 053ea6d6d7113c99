pub mod alerts;
pub mod email;
pub mod models;
pub mod movers;
pub mod parse;
pub mod pipeline;
pub mod prompt;

pub use alerts::{compose_digest, select_alerts, AlertThresholds, Digest};
pub use email::{Mailer, SmtpMailer};
pub use models::{create_models, FallbackChain, ModelKind, ModelSpec, GEMINI_MODELS};
pub use parse::extract_analysis_details;
pub use pipeline::{CollectionSummary, FailedAnalysisPolicy, NewsAnalyzer, RunSummary};
pub use prompt::build_prompt;
