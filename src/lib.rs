//! Expression-driven parameter transformation for face/head tracking input.
//!
//! Each frame, a flattened [`InputSample`] (head position/rotation, per-eye
//! orientation, blend-shape weights) is run against the currently installed
//! [`RuleSet`]. Every [`Rule`] derives one named output parameter from an
//! arithmetic/logical expression; expressions may reference raw channels *and*
//! other rules' outputs, so the engine resolves the implicit dependency graph
//! by fixed-point iteration rather than requiring authors to order their rules.
//!
//! The [`Engine`] is the public entry point: install rule sets produced by an
//! external loader, feed it one sample per frame, and pull statistics snapshots
//! for observability. Rules that cannot be resolved in a frame (missing
//! dependency, evaluation error, cycle) become diagnostics; they never abort
//! the other rules or the frame.

mod api;
mod engine;
mod expr;
mod sample;

pub use api::Engine;
pub use engine::{
    EngineStatus, MAX_PASSES, ParameterRange, PassTrace, ResolvedOutput, StatsSnapshot, TransformationResult,
};
pub use expr::Expression;
pub use sample::{BASE_CHANNELS, InputSample, RawTrackingFrame, Vec3};

use serde::Serialize;
use thiserror::Error;

// --- Errors ------------------------------------------------------------------

/// Error type for `mimika` operations.
///
/// Only constructor validation crosses the crate boundary as an `Err`; runtime
/// failure states (abandoned rules, failed loads, degraded frames) are
/// represented as data in diagnostics and the stats snapshot.
#[derive(Debug, Error)]
pub enum MimikaError {
    /// A rule declared an output range with `min > max`.
    #[error("invalid range for rule `{name}`: min {min} > max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    /// An expression failed to compile.
    #[error("expression syntax error: {0}")]
    ExpressionSyntax(String),

    /// An expression failed to evaluate.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Result type alias for `mimika` operations.
pub type Result<T> = std::result::Result<T, MimikaError>;

// --- Rule / RuleSet ----------------------------------------------------------

/// A named output definition: compiled expression plus declared output range.
///
/// Immutable once constructed. Rules are replaced wholesale by installing a
/// new [`RuleSet`], never mutated in place.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    expression: Expression,
    expression_text: String,
    min: f64,
    max: f64,
    default: f64,
}

impl Rule {
    /// Compile `expression_text` and build a rule.
    ///
    /// Fails fast on `min > max` or an expression that does not parse; these
    /// are the only fatal errors in the crate.
    pub fn new(
        name: impl Into<String>,
        expression_text: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
    ) -> Result<Self> {
        let name = name.into();
        let expression_text = expression_text.into();
        if min > max {
            return Err(MimikaError::InvalidRange { name, min, max });
        }
        let expression = Expression::compile(&expression_text)?;
        Ok(Rule { name, expression, expression_text, min, max, default })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn expression_text(&self) -> &str {
        &self.expression_text
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }
}

/// An immutable, versioned collection of rules, replaceable as a unit.
///
/// `invalid` carries the rules the external loader rejected (syntax errors,
/// duplicate definitions, ...). The version is stamped when the set is
/// installed into an [`Engine`]; it exists purely for diagnostics.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    invalid: Vec<InvalidRuleInfo>,
    pub(crate) version: u64,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>, invalid: Vec<InvalidRuleInfo>) -> Self {
        RuleSet { rules, invalid, version: 0 }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn invalid(&self) -> &[InvalidRuleInfo] {
        &self.invalid
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

// --- Loader contract ---------------------------------------------------------

/// Why the external loader rejected a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorKind {
    /// The rule text did not parse.
    Syntax,
    /// Another rule already defines this output name.
    Duplicate,
    /// Anything else the loader chose to reject.
    Other,
}

/// A rule rejected at load time, carried on the [`RuleSet`] for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidRuleInfo {
    pub name: String,
    pub expression_text: String,
    pub error: String,
    pub kind: LoadErrorKind,
}

/// The outcome of one load attempt by the external rule loader.
///
/// The engine does not read files or parse rule syntax itself; the loader
/// hands it this report and [`Engine::install`] applies the state machine
/// (install, keep serving the previous set on total failure, ...).
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rules: Vec<Rule>,
    pub invalid: Vec<InvalidRuleInfo>,
    /// Set when the load failed entirely (unreadable source, ...). A report
    /// with `error` set installs nothing.
    pub error: Option<String>,
    /// Whether the loader served this report from its cache.
    pub from_cache: bool,
}

// --- Diagnostics -------------------------------------------------------------

/// Classification of why a rule is not producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonKind {
    /// The rule could not be resolved within the pass budget this frame.
    Evaluation,
    /// The loader rejected the rule before it ever ran.
    LoadTime,
}

/// A rule that is currently not producing output, with the reason.
///
/// Evaluation-kind entries are replaced by each frame that runs resolution;
/// load-time entries persist until the next reload.
#[derive(Debug, Clone, Serialize)]
pub struct AbandonedRule {
    pub name: String,
    pub expression_text: String,
    pub kind: AbandonKind,
    pub detail: String,
}

impl AbandonedRule {
    pub(crate) fn from_invalid(info: &InvalidRuleInfo) -> Self {
        AbandonedRule {
            name: info.name.clone(),
            expression_text: info.expression_text.clone(),
            kind: AbandonKind::LoadTime,
            detail: info.error.clone(),
        }
    }
}
