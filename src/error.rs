//! Error types for the authorization engine.

use thiserror::Error;

/// Top-level error type returned by non-infallible engine operations.
///
/// Under normal operation (`fail_closed = true`, the default) the engine never surfaces these
/// to callers of [`crate::engine::PolicyEngine::evaluate`] — it catches them at the stage
/// boundary and folds them into an `evaluation_error` [`crate::types::PolicyDecision`] instead.
/// They are only propagated when `fail_closed = false`, or from APIs that are infallible by
/// construction (config validation, cache construction).
#[derive(Error, Debug, Clone)]
pub enum AuthzError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("invalid evaluation context: {0}")]
    InvalidContext(String),

    #[error("evaluation timed out after {0}ms")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cache ttl_ms must be positive, got {0}")]
    InvalidTtl(u64),

    #[error("cache max_size must be positive, got {0}")]
    InvalidMaxSize(usize),
}

/// Policy cache errors. Never surfaced to callers of the engine — cache failures are
/// advisory and are logged, per spec.md §7 ("Cache errors: logged, never surfaced").
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("policy provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalidation hint rejected: {0}")]
    InvalidationFailed(String),
}

/// Errors raised by the kill-switch, rate-limiter, approval-gate, or policy-provider
/// collaborators.
#[derive(Error, Debug, Clone)]
pub enum CollaboratorError {
    #[error("kill switch check failed: {0}")]
    KillSwitch(String),

    #[error("rate limiter check failed: {0}")]
    RateLimiter(String),

    #[error("approval gate operation failed: {0}")]
    ApprovalGate(String),

    #[error("policy provider operation failed: {0}")]
    PolicyProvider(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthzError>;
