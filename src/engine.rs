//! Transformation engine internals.
//!
//! This module is the operational core behind [`crate::Engine`]. It is split
//! into focused submodules under `src/engine/`:
//!
//! ## How the parts work together
//!
//! One frame flows through the engine like this:
//!
//! ```text
//! LoadReport ──▶ Engine::install ──▶ ActiveRuleSet   (hotswap.rs)
//!                                       │ atomic Arc<RuleSet> swap
//!                                       v
//! InputSample ──▶ resolve_frame ── multi-pass binding  (resolver.rs)
//!                   │  - seed `known` from channels
//!                   │  - per pass: bind refs, eval, clamp
//!                   │  - stop on fixpoint / no progress
//!                   v
//!            FrameResolution ──▶ TransformationResult  (result.rs)
//!                   │
//!                   v
//!              EngineStats                             (stats.rs)
//!                - counters, status machine, snapshot
//! ```
//!
//! The resolver leans on **fixed-point iteration**: rules that reference other
//! rules' outputs simply stay pending until a pass has produced the names they
//! need, so no evaluation order is ever declared by the rule author. A pass
//! that makes no progress ends the frame early; whatever is still pending is
//! reported as abandoned-rule diagnostics rather than an error.
//!
//! ## Responsibilities by module
//!
//! - `resolver.rs`: the per-frame multi-pass resolution algorithm and the
//!   per-rule outcome type.
//! - `result.rs`: the per-frame output bundle handed to downstream consumers.
//! - `stats.rs`: status state machine, monotonic counters, pull-based
//!   snapshot.
//! - `hotswap.rs`: the atomically replaceable active-rule-set handle; the one
//!   piece of shared mutable state in the whole engine.

#[path = "engine/hotswap.rs"]
mod hotswap;
#[path = "engine/resolver.rs"]
mod resolver;
#[path = "engine/result.rs"]
mod result;
#[path = "engine/stats.rs"]
mod stats;

pub use resolver::MAX_PASSES;
pub use result::{ParameterRange, PassTrace, ResolvedOutput, TransformationResult};
pub use stats::{EngineStatus, StatsSnapshot};

pub(crate) use hotswap::ActiveRuleSet;
pub(crate) use resolver::resolve_frame;
pub(crate) use stats::EngineStats;
