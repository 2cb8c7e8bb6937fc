//! Multi-pass dependency resolution.
//!
//! Given one frame's channel values and a rule-set snapshot, compute the
//! largest self-consistent subset of rule outputs within a bounded number of
//! passes. Rules whose expressions reference other rules' outputs are not
//! ordered by the author; they resolve naturally once an earlier pass has
//! produced the names they need.
//!
//! ```text
//! known = channel map            remaining = all rules
//!    │                                │
//!    └────────── pass N ◀─────────────┘
//!                 │
//!      for each remaining rule:
//!        all refs in `known`? ──no──▶ stays pending (missing dependency)
//!              │yes
//!        eval + clamp ──err──▶ stays pending (eval failed)
//!              │ok
//!        insert into `known` (first writer wins), record output
//!                 │
//!      progress this pass? ──no──▶ stop: leftovers are abandoned
//! ```
//!
//! Each resolved rule's clamped value is computed exactly once and reused both
//! for dependent lookups and for the returned output entry. A rule that fails
//! to evaluate stays pending for the next pass; it never aborts the pass or
//! the frame.

use crate::engine::result::{PassTrace, ResolvedOutput};
use crate::{AbandonKind, AbandonedRule, InputSample, Rule, RuleSet};
use std::collections::HashMap;
use tracing::debug;

/// Upper bound on resolution passes per frame.
///
/// The early stop on a no-progress pass means this is a worst-case bound, not
/// a typical cost; a rule set whose longest dependency chain has depth `d`
/// finishes in `d` passes.
pub const MAX_PASSES: usize = 10;

/// Why a rule is still pending after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingReason {
    /// A referenced name was not bound this pass.
    MissingDependency(String),
    /// The expression evaluated but failed (runtime error, non-finite result).
    EvalFailed(String),
}

impl PendingReason {
    fn detail(&self) -> String {
        match self {
            PendingReason::MissingDependency(name) => format!("missing dependency `{name}`"),
            PendingReason::EvalFailed(msg) => msg.clone(),
        }
    }
}

/// Outcome of attempting one rule in one pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RuleOutcome {
    /// The rule evaluated; the payload is its clamped output value.
    Resolved(f64),
    Pending(PendingReason),
}

/// Everything one frame's resolution produced.
#[derive(Debug, Clone)]
pub(crate) struct FrameResolution {
    /// Outputs in resolution order.
    pub outputs: Vec<ResolvedOutput>,
    /// Rules left unresolved when the loop stopped (evaluation kind).
    pub abandoned: Vec<AbandonedRule>,
    /// Compact per-pass trace for diagnostics.
    pub passes: Vec<PassTrace>,
}

/// Resolve one frame against a rule-set snapshot.
///
/// The caller handles the short-circuit paths (subject not detected, empty
/// rule set) and frame-level degradation; this function assumes it should run
/// the full iteration.
pub(crate) fn resolve_frame(sample: &InputSample, ruleset: &RuleSet) -> FrameResolution {
    let mut known: HashMap<String, f64> = sample.channels().clone();
    let mut remaining: Vec<&Rule> = ruleset.rules().iter().collect();
    let mut outputs: Vec<ResolvedOutput> = Vec::with_capacity(remaining.len());
    let mut passes: Vec<PassTrace> = Vec::new();
    // Reason from the most recent attempt, per still-pending rule.
    let mut reasons: Vec<PendingReason> = Vec::new();

    for pass in 0..MAX_PASSES {
        let mut next: Vec<&Rule> = Vec::new();
        let mut next_reasons: Vec<PendingReason> = Vec::new();
        let resolved_before = outputs.len();

        for rule in remaining {
            match try_resolve(rule, &known) {
                RuleOutcome::Resolved(value) => {
                    // First writer wins: a later rule redeclaring a name keeps
                    // its own output entry but never changes what dependents
                    // (or earlier outputs) observe.
                    known.entry(rule.name().to_string()).or_insert(value);
                    outputs.push(ResolvedOutput {
                        name: rule.name().to_string(),
                        value,
                        min: rule.min(),
                        max: rule.max(),
                        default: rule.default_value(),
                        expression_text: rule.expression_text().to_string(),
                    });
                }
                RuleOutcome::Pending(reason) => {
                    next.push(rule);
                    next_reasons.push(reason);
                }
            }
        }

        let resolved_this_pass = outputs.len() - resolved_before;
        passes.push(PassTrace { pass, resolved: resolved_this_pass, pending: next.len() });
        debug!(pass, resolved = resolved_this_pass, pending = next.len(), "resolution pass");

        remaining = next;
        reasons = next_reasons;
        if remaining.is_empty() || resolved_this_pass == 0 {
            break;
        }
    }

    let abandoned: Vec<AbandonedRule> = remaining
        .iter()
        .zip(&reasons)
        .map(|(rule, reason)| {
            debug!(rule = rule.name(), reason = %reason.detail(), "rule abandoned");
            AbandonedRule {
                name: rule.name().to_string(),
                expression_text: rule.expression_text().to_string(),
                kind: AbandonKind::Evaluation,
                detail: reason.detail(),
            }
        })
        .collect();

    FrameResolution { outputs, abandoned, passes }
}

/// Attempt one rule against the current `known` map.
///
/// Binding is checked before evaluation so a missing dependency is cheap and
/// precisely attributed. Non-finite results count as failures: clamping a NaN
/// into range would silently poison every dependent rule.
fn try_resolve(rule: &Rule, known: &HashMap<String, f64>) -> RuleOutcome {
    for name in rule.expression().references() {
        if !known.contains_key(name) {
            return RuleOutcome::Pending(PendingReason::MissingDependency(name.clone()));
        }
    }

    match rule.expression().eval(known) {
        Ok(value) if value.is_finite() => RuleOutcome::Resolved(value.clamp(rule.min(), rule.max())),
        Ok(value) => RuleOutcome::Pending(PendingReason::EvalFailed(format!("non-finite result: {value}"))),
        Err(e) => RuleOutcome::Pending(PendingReason::EvalFailed(e.to_string())),
    }
}
