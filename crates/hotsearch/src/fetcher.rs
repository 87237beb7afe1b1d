use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::FetchResult;

/// Capability implemented by every source.
///
/// Implementations must be safe to call concurrently and repeatedly, and must
/// not carry state between calls. Each call is expected to enforce its own
/// deadline (usually through the HTTP client's timeout); nothing above the
/// fetcher cancels it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve and normalize the source's current ranked list.
    ///
    /// Returns `Err` for transport or parse failures. A reachable upstream
    /// that yields no rows is reported as `Ok` with a code-500 result.
    async fn fetch(&self) -> Result<FetchResult, FetchError>;
}
