//! RUBRIC Sync - Derived Summaries and Lifecycle Cascades
//!
//! Keeps the cached summaries on studies, question lines and study question
//! lines consistent with the association graph, and propagates association
//! deactivations to the records that depend on them.
//!
//! The host raises one [`MutationEvent`] per committed write; the
//! [`TriggerDispatcher`] routes it to an [`Orchestrator`] entry point, which
//! resolves effective entries with the [`SubsetResolver`], renders through
//! `rubric-render`, runs the [`CascadeSynchronizer`] for lifecycle
//! transitions, and writes back only what changed. A [`RecursionGuard`]
//! threaded through every call stops the events caused by the engine's own
//! writes from cascading further.

pub mod cascade;
pub mod dispatch;
pub mod guard;
pub mod orchestrator;
pub mod resolver;
pub mod telemetry;
pub mod views;

pub use cascade::{CascadeReport, CascadeSynchronizer};
pub use dispatch::{ChainStep, MutationEvent, TriggerDispatcher};
pub use guard::RecursionGuard;
pub use orchestrator::{Orchestrator, SkipReason, SyncOutcome};
pub use resolver::{ResolvedEntries, ResolvedEntry, SubsetResolver};
pub use telemetry::{init_tracing, TracingConfig};
pub use views::{answer_summary_layout, line_summary_layout, subset_listing_layout, SummaryBuilder};
