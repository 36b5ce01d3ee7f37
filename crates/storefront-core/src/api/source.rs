use std::future::Future;

use crate::models::AppEntry;

use super::ApiError;

/// The three remote fetches the repository depends on.
///
/// `CatalogClient` is the HTTP implementation; tests substitute in-memory
/// sources.
pub trait CatalogSource: Send + Sync {
    /// Ranked top-grossing feed, parsed as feed entries.
    fn top_grossing(&self, limit: usize) -> impl Future<Output = Result<Vec<AppEntry>, ApiError>> + Send;

    /// Ranked top-free feed, parsed as feed entries.
    fn top_free(&self, limit: usize) -> impl Future<Output = Result<Vec<AppEntry>, ApiError>> + Send;

    /// Batch lookup, same length and order as `ids`.
    fn details(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Option<AppEntry>>, ApiError>> + Send;
}
