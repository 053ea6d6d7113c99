use async_trait::async_trait;

use crate::types::MarketMover;
use crate::Result;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Key used in logs and stored on analysis results.
    fn name(&self) -> &str;

    /// Generate a completion for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait MarketMoverSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_movers(&self) -> Result<Vec<MarketMover>>;
}
