//! # DeepDive Core
//!
//! Domain types, traits, and error definitions for the DeepDive research
//! pipeline. This crate has **no I/O of its own**. It defines the domain
//! model that the store, provider, and pipeline crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generative model, key-value store, event
//! transport) is a trait or a small type here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted providers and in-memory stores
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod provider;
pub mod research;
pub mod retry;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, PipelineError, ProviderError, Result, RetryError, StoreError, TransitionError};
pub use event::{DomainEvent, EventBus};
pub use provider::{GenerateRequest, Provider};
pub use research::{
    Analysis, Depth, ErrorDetails, Finding, Phase, Report, ResearchPlan, ResearchRecord,
    ResearchStatus, Stage, StageArtifact, StageProgress, StageState,
};
pub use retry::{RetryAttempt, RetryConfig, RetryExecutor};
pub use store::{Collection, StateStore, Versioned};
