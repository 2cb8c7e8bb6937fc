//! Engine status and statistics.
//!
//! Running counters, the load/health state machine, and the pull-based
//! snapshot consumed by observability/UI code. The hot path only touches
//! atomics and one short uncontended mutex, so taking a snapshot never blocks
//! a frame in any meaningful way.
//!
//! Counters are monotonic; status and diagnostics reflect the current rule
//! set and the most recent frame that ran resolution.

use crate::{AbandonedRule, RuleSet};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Load/health state of the engine.
///
/// Driven by [`crate::Engine::install`] outcomes; per-frame resolution can
/// additionally move the state between `AllRulesValid` and
/// `RulesPartiallyValid` without changing the installed rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    /// No load has been attempted yet.
    NeverLoaded,
    /// The installed set loaded cleanly and the last resolving frame
    /// abandoned nothing.
    AllRulesValid,
    /// Some rules are not producing output (load-time rejects or per-frame
    /// abandonment).
    RulesPartiallyValid,
    /// The last load succeeded but produced zero valid rules.
    NoValidRules,
    /// The last load failed entirely; a previously installed set (possibly
    /// empty) keeps serving frames.
    ConfigErrorCached,
}

impl EngineStatus {
    /// The derived health signal: serving frames from a usable rule set.
    pub fn healthy(self) -> bool {
        matches!(self, EngineStatus::AllRulesValid | EngineStatus::RulesPartiallyValid)
    }
}

/// Point-in-time view of the engine's counters and status.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub status: EngineStatus,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub last_transform_at: Option<DateTime<Utc>>,
    pub last_load_at: Option<DateTime<Utc>>,
    pub last_load_from_cache: bool,
    pub total_transformations: u64,
    pub successful_transformations: u64,
    pub failed_transformations: u64,
    pub reload_attempts: u64,
    pub reload_successes: u64,
    pub valid_rules: usize,
    pub invalid_rules: usize,
    /// Version of the currently installed rule set, if any.
    pub ruleset_version: Option<u64>,
    /// Load-time rejects followed by the latest frame's abandoned rules.
    pub abandoned: Vec<AbandonedRule>,
}

#[derive(Debug)]
struct StatsInner {
    status: EngineStatus,
    last_error: Option<String>,
    last_transform_at: Option<DateTime<Utc>>,
    last_load_at: Option<DateTime<Utc>>,
    last_load_from_cache: bool,
    valid_rules: usize,
    invalid_rules: usize,
    ruleset_version: Option<u64>,
    load_diagnostics: Vec<AbandonedRule>,
    eval_diagnostics: Vec<AbandonedRule>,
}

/// Shared statistics store, updated from both the resolution path and the
/// installation path.
#[derive(Debug)]
pub(crate) struct EngineStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    reload_attempts: AtomicU64,
    reload_successes: AtomicU64,
    inner: Mutex<StatsInner>,
}

impl EngineStats {
    pub fn new() -> Self {
        EngineStats {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            reload_attempts: AtomicU64::new(0),
            reload_successes: AtomicU64::new(0),
            inner: Mutex::new(StatsInner {
                status: EngineStatus::NeverLoaded,
                last_error: None,
                last_transform_at: None,
                last_load_at: None,
                last_load_from_cache: false,
                valid_rules: 0,
                invalid_rules: 0,
                ruleset_version: None,
                load_diagnostics: Vec::new(),
                eval_diagnostics: Vec::new(),
            }),
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.lock().status
    }

    /// A load produced an installable rule set (possibly with rejects, or
    /// even zero valid rules).
    pub fn record_load_success(&self, ruleset: &RuleSet, from_cache: bool) -> EngineStatus {
        self.reload_attempts.fetch_add(1, Ordering::Relaxed);
        self.reload_successes.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.valid_rules = ruleset.rules().len();
        inner.invalid_rules = ruleset.invalid().len();
        inner.ruleset_version = Some(ruleset.version());
        inner.last_load_at = Some(Utc::now());
        inner.last_load_from_cache = from_cache;
        inner.last_error = None;
        inner.load_diagnostics = ruleset.invalid().iter().map(AbandonedRule::from_invalid).collect();
        // A reload supersedes the previous set's per-frame diagnostics.
        inner.eval_diagnostics.clear();

        inner.status = match (ruleset.rules().len(), ruleset.invalid().len()) {
            (0, _) => EngineStatus::NoValidRules,
            (_, 0) => EngineStatus::AllRulesValid,
            (_, _) => EngineStatus::RulesPartiallyValid,
        };
        inner.status
    }

    /// The load failed entirely; nothing was installed.
    pub fn record_load_failure(&self, error: String, had_previous: bool) -> EngineStatus {
        self.reload_attempts.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.last_error = Some(error);
        inner.status = if had_previous { EngineStatus::ConfigErrorCached } else { EngineStatus::NoValidRules };
        inner.status
    }

    /// A frame completed. `abandoned` is `Some` only when resolution actually
    /// ran; short-circuited frames (not detected, no rules) leave the current
    /// diagnostics and status untouched.
    pub fn record_frame_success(&self, abandoned: Option<Vec<AbandonedRule>>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.successful.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.last_transform_at = Some(Utc::now());
        if let Some(abandoned) = abandoned {
            let any_abandoned = !abandoned.is_empty();
            inner.eval_diagnostics = abandoned;
            // Frame outcomes only move the state between the two healthy
            // variants; load-level states stay until the next load.
            if inner.status.healthy() {
                inner.status = if any_abandoned || inner.invalid_rules > 0 {
                    EngineStatus::RulesPartiallyValid
                } else {
                    EngineStatus::AllRulesValid
                };
            }
        }
    }

    /// A frame degraded to the pass-through result after an internal failure.
    pub fn record_frame_failure(&self, error: String) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().last_error = Some(error);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let mut abandoned = inner.load_diagnostics.clone();
        abandoned.extend(inner.eval_diagnostics.iter().cloned());

        StatsSnapshot {
            status: inner.status,
            healthy: inner.status.healthy(),
            last_error: inner.last_error.clone(),
            last_transform_at: inner.last_transform_at,
            last_load_at: inner.last_load_at,
            last_load_from_cache: inner.last_load_from_cache,
            total_transformations: self.total.load(Ordering::Relaxed),
            successful_transformations: self.successful.load(Ordering::Relaxed),
            failed_transformations: self.failed.load(Ordering::Relaxed),
            reload_attempts: self.reload_attempts.load(Ordering::Relaxed),
            reload_successes: self.reload_successes.load(Ordering::Relaxed),
            valid_rules: inner.valid_rules,
            invalid_rules: inner.invalid_rules,
            ruleset_version: inner.ruleset_version,
            abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InvalidRuleInfo, LoadErrorKind, Rule};

    fn valid_rule(name: &str) -> Rule {
        Rule::new(name, "1.0", -1.0, 1.0, 0.0).unwrap()
    }

    fn invalid_rule(name: &str) -> InvalidRuleInfo {
        InvalidRuleInfo {
            name: name.to_string(),
            expression_text: "(1 + 2".to_string(),
            error: "syntax error".to_string(),
            kind: LoadErrorKind::Syntax,
        }
    }

    #[test]
    fn initial_state_is_never_loaded_and_unhealthy() {
        let stats = EngineStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.status, EngineStatus::NeverLoaded);
        assert!(!snap.healthy);
        assert_eq!(snap.total_transformations, 0);
    }

    #[test]
    fn load_outcomes_drive_status() {
        let stats = EngineStats::new();

        let rs = RuleSet::new(vec![valid_rule("A")], Vec::new());
        assert_eq!(stats.record_load_success(&rs, false), EngineStatus::AllRulesValid);

        let rs = RuleSet::new(vec![valid_rule("A")], vec![invalid_rule("Bad")]);
        assert_eq!(stats.record_load_success(&rs, false), EngineStatus::RulesPartiallyValid);

        let rs = RuleSet::new(Vec::new(), vec![invalid_rule("Bad")]);
        assert_eq!(stats.record_load_success(&rs, false), EngineStatus::NoValidRules);

        assert_eq!(stats.record_load_failure("unreadable".into(), true), EngineStatus::ConfigErrorCached);
        assert_eq!(stats.snapshot().reload_attempts, 4);
        assert_eq!(stats.snapshot().reload_successes, 3);
    }

    #[test]
    fn frame_abandonment_toggles_between_healthy_states() {
        let stats = EngineStats::new();
        let rs = RuleSet::new(vec![valid_rule("A")], Vec::new());
        stats.record_load_success(&rs, false);

        let abandoned = AbandonedRule {
            name: "A".into(),
            expression_text: "x".into(),
            kind: crate::AbandonKind::Evaluation,
            detail: "missing dependency `x`".into(),
        };
        stats.record_frame_success(Some(vec![abandoned]));
        assert_eq!(stats.status(), EngineStatus::RulesPartiallyValid);

        stats.record_frame_success(Some(Vec::new()));
        assert_eq!(stats.status(), EngineStatus::AllRulesValid);
    }

    #[test]
    fn clean_frame_does_not_mask_load_time_rejects() {
        let stats = EngineStats::new();
        let rs = RuleSet::new(vec![valid_rule("A")], vec![invalid_rule("Bad")]);
        stats.record_load_success(&rs, false);

        stats.record_frame_success(Some(Vec::new()));
        assert_eq!(stats.status(), EngineStatus::RulesPartiallyValid);
        // The load-time reject is still in the diagnostics.
        let snap = stats.snapshot();
        assert_eq!(snap.abandoned.len(), 1);
        assert_eq!(snap.abandoned[0].kind, crate::AbandonKind::LoadTime);
    }

    #[test]
    fn short_circuit_frames_leave_status_alone() {
        let stats = EngineStats::new();
        let rs = RuleSet::new(vec![valid_rule("A")], Vec::new());
        stats.record_load_success(&rs, false);

        let abandoned = AbandonedRule {
            name: "A".into(),
            expression_text: "x".into(),
            kind: crate::AbandonKind::Evaluation,
            detail: "missing dependency `x`".into(),
        };
        stats.record_frame_success(Some(vec![abandoned]));

        // A not-detected frame counts as successful but carries diagnostics
        // forward unchanged.
        stats.record_frame_success(None);
        assert_eq!(stats.status(), EngineStatus::RulesPartiallyValid);
        assert_eq!(stats.snapshot().abandoned.len(), 1);
        assert_eq!(stats.snapshot().successful_transformations, 2);
    }

    #[test]
    fn failures_count_and_record_error() {
        let stats = EngineStats::new();
        stats.record_frame_failure("corrupted sample".into());
        let snap = stats.snapshot();
        assert_eq!(snap.failed_transformations, 1);
        assert_eq!(snap.total_transformations, 1);
        assert_eq!(snap.last_error.as_deref(), Some("corrupted sample"));
    }

    #[test]
    fn snapshot_serializes() {
        let stats = EngineStats::new();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("NEVER_LOADED"));
    }
}
