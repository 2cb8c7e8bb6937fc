//! Per-frame transformation output.
//!
//! `TransformationResult` is what one call to [`crate::Engine::transform`]
//! hands back: the resolved parameters, the range/default map a downstream
//! synchronization step uses to register output channels, the expression map
//! for UI display, and a compact per-pass trace for diagnostics. Delivery to
//! the downstream consumer is external; this crate only produces the value.

use serde::Serialize;
use std::collections::HashMap;

/// One successfully resolved parameter for the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOutput {
    pub name: String,
    /// The expression result clamped to `[min, max]`.
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Source expression text, for downstream display.
    pub expression_text: String,
}

/// Declared range and default for a parameter, used for downstream
/// registration (`name → (min, max, default)`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// Resolution counts for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassTrace {
    pub pass: usize,
    pub resolved: usize,
    pub pending: usize,
}

/// The complete output of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformationResult {
    /// Copied through from the input sample.
    pub detected: bool,
    /// Resolved parameters in resolution order. Duplicate-named rules each
    /// contribute their own entry.
    pub outputs: Vec<ResolvedOutput>,
    /// Registration map; on duplicate names the first resolver's range wins.
    pub ranges: HashMap<String, ParameterRange>,
    /// `name → expression text`, for UI display.
    pub expressions: HashMap<String, String>,
    /// Per-pass resolution trace. Empty on short-circuited frames.
    pub passes: Vec<PassTrace>,
}

impl TransformationResult {
    /// The short-circuit result: no outputs, flag copied through.
    ///
    /// Used when the subject is not detected, no rule set is installed, or
    /// the frame degraded after an internal failure.
    pub(crate) fn pass_through(detected: bool) -> Self {
        TransformationResult {
            detected,
            outputs: Vec::new(),
            ranges: HashMap::new(),
            expressions: HashMap::new(),
            passes: Vec::new(),
        }
    }

    /// Assemble a result from resolved outputs and the pass trace.
    pub(crate) fn from_outputs(detected: bool, outputs: Vec<ResolvedOutput>, passes: Vec<PassTrace>) -> Self {
        let mut ranges = HashMap::with_capacity(outputs.len());
        let mut expressions = HashMap::with_capacity(outputs.len());
        for out in &outputs {
            ranges
                .entry(out.name.clone())
                .or_insert(ParameterRange { min: out.min, max: out.max, default: out.default });
            expressions.entry(out.name.clone()).or_insert_with(|| out.expression_text.clone());
        }
        TransformationResult { detected, outputs, ranges, expressions, passes }
    }
}
