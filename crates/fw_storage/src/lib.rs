use std::sync::Arc;

use fw_core::{ArticleStorage, Error, Result};

pub mod backends;
pub mod maintenance;

pub use backends::*;

/// Open the backend named by a storage URL.
///
/// `memory://` gives a process-local store; `sqlite:<path>` (with the
/// `sqlite` feature) opens or creates a database file.
pub async fn create_storage(url: &str) -> Result<Arc<dyn ArticleStorage>> {
    let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or(url);
    match scheme {
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SQLiteStorage::connect(url).await?)),
        _ => Err(Error::Config(format!("Unsupported storage URL: {}", url))),
    }
}
