use thiserror::Error;

/// Hard failures from a single fetcher call.
///
/// Payloads are plain strings so the error can be cloned and handed to every
/// caller waiting on the same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("upstream returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed upstream payload: {0}")]
    Parse(String),
}

/// Errors from the snapshot store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

/// Errors raised while building the fetcher registry at startup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate source id: {0}")]
    Duplicate(String),

    #[error("alias {alias} points at unregistered source {target}")]
    UnknownTarget { alias: String, target: String },
}
