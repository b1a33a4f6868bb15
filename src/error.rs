use std::fmt;

/// Crate-wide error type. Mirrors the error kinds the engine must
/// distinguish on: validator failures never stop the loop, adapter
/// Transient/RateLimited errors trigger backoff-and-retry, Auth/Permanent
/// errors halt the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    InvalidGrid(String),
    ValidatorRejection(String),
    AdapterTransient(String),
    AdapterRateLimited(String),
    AdapterAuth(String),
    AdapterPermanent(String),
    NotFound(String),
    IllegalState(String),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::InvalidGrid(m) => write!(f, "invalid grid: {}", m),
            GridError::ValidatorRejection(m) => write!(f, "validator rejection: {}", m),
            GridError::AdapterTransient(m) => write!(f, "adapter transient error: {}", m),
            GridError::AdapterRateLimited(m) => write!(f, "adapter rate limited: {}", m),
            GridError::AdapterAuth(m) => write!(f, "adapter auth error: {}", m),
            GridError::AdapterPermanent(m) => write!(f, "adapter permanent error: {}", m),
            GridError::NotFound(m) => write!(f, "not found: {}", m),
            GridError::IllegalState(m) => write!(f, "illegal state: {}", m),
        }
    }
}

impl std::error::Error for GridError {}

impl From<reqwest::Error> for GridError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            GridError::AdapterTransient(e.to_string())
        } else {
            GridError::AdapterPermanent(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::AdapterPermanent(format!("json: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, GridError>;

/// Whether an adapter error classification should cause the engine to
/// retry this tick step (with backoff) or halt the loop entirely.
pub fn is_retryable(err: &GridError) -> bool {
    matches!(
        err,
        GridError::AdapterTransient(_) | GridError::AdapterRateLimited(_)
    )
}

pub fn is_halting(err: &GridError) -> bool {
    matches!(err, GridError::AdapterAuth(_) | GridError::AdapterPermanent(_))
}
