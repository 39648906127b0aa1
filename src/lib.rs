//! `authz-core`: a multi-tenant policy authorization engine.
//!
//! The engine composes four decision stages — kill switch, rate limiter, rule evaluator, and
//! approval gate — into a single fail-closed pipeline (see [`engine::PolicyEngine`]). Policy
//! storage, transport, and schema validation are deliberately out of scope; callers supply
//! [`collaborators`] implementations for those concerns.

pub mod audit;
pub mod cache;
pub mod collaborators;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod rules;
pub mod types;

pub use engine::{EngineConfig, PolicyEngine, PolicyEngineBuilder};
pub use error::{AuthzError, Result};
pub use types::{EvaluationContext, Policy, PolicyDecision, PolicyRule};

/// Installs a `tracing_subscriber::EnvFilter`-driven subscriber, honoring `RUST_LOG` (default
/// `info`). Intended for binaries embedding this crate; library code only emits `tracing` events
/// and never configures a subscriber itself.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().ok();
}
