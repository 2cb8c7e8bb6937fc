//! Public engine surface.
//!
//! [`Engine`] ties the pieces together: the hot-swappable active rule set,
//! the per-frame resolver, and the statistics store. It is built for the
//! surrounding application's shape — one synchronous `transform` call per
//! frame from the frame loop, `install` calls from whatever context the rule
//! loader runs in (file watcher, reload command), and `snapshot` pulls from
//! the observability/UI side.
//!
//! Nothing here returns an error or panics across the boundary: bad rules,
//! failed loads, and even internal panics degrade to data (pass-through
//! results, diagnostics, counters).

use crate::engine::{ActiveRuleSet, EngineStats, resolve_frame};
use crate::{EngineStatus, InputSample, LoadReport, RuleSet, StatsSnapshot, TransformationResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

/// The per-frame transformation engine.
///
/// Shared-state layout: the active rule set is an atomically swapped
/// `Arc<RuleSet>` snapshot, counters are atomics, and everything the resolver
/// scribbles on during a frame is call-local. `&self` methods are safe to use
/// from multiple threads.
#[derive(Debug)]
pub struct Engine {
    active: ActiveRuleSet,
    stats: EngineStats,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine { active: ActiveRuleSet::empty(), stats: EngineStats::new() }
    }

    /// Apply one load attempt from the external rule loader.
    ///
    /// A report with `error` set installs nothing: the previously installed
    /// set (if any) keeps serving frames and the status moves to
    /// `ConfigErrorCached`. Otherwise the rules are published as a new
    /// immutable rule set in a single atomic swap; a frame in flight sees
    /// either the old set or the new one in full.
    pub fn install(&self, report: LoadReport) -> EngineStatus {
        if let Some(error) = report.error {
            let had_previous = self.active.is_installed();
            warn!(%error, had_previous, "rule load failed");
            return self.stats.record_load_failure(error, had_previous);
        }

        let installed = self.active.install(RuleSet::new(report.rules, report.invalid));
        let status = self.stats.record_load_success(&installed, report.from_cache);
        info!(
            version = installed.version(),
            valid = installed.rules().len(),
            invalid = installed.invalid().len(),
            from_cache = report.from_cache,
            "rule set installed"
        );
        status
    }

    /// Transform one frame.
    ///
    /// Never fails: a frame whose resolution blows up outside the per-rule
    /// path degrades to the pass-through result and is counted as a failed
    /// transformation, with the error text recorded for the next snapshot.
    pub fn transform(&self, sample: &InputSample) -> TransformationResult {
        let active = self.active.load();
        self.transform_guarded(sample, || self.transform_inner(sample, active.as_deref()))
    }

    /// Run one frame with the degradation guard around it.
    ///
    /// Split out of [`transform`] so the guard itself is testable: any panic
    /// from `frame` is converted into the pass-through result, counted as a
    /// failed transformation, and recorded for the next snapshot.
    fn transform_guarded(
        &self,
        sample: &InputSample,
        frame: impl FnOnce() -> TransformationResult,
    ) -> TransformationResult {
        match panic::catch_unwind(AssertUnwindSafe(frame)) {
            Ok(result) => result,
            Err(payload) => {
                let error = panic_message(payload.as_ref());
                warn!(%error, "frame degraded to pass-through");
                self.stats.record_frame_failure(error);
                TransformationResult::pass_through(sample.detected())
            }
        }
    }

    fn transform_inner(&self, sample: &InputSample, ruleset: Option<&RuleSet>) -> TransformationResult {
        // Short-circuit paths are successes: nothing to resolve, flag copied
        // through, current diagnostics left untouched.
        let ruleset = match ruleset {
            Some(rs) if sample.detected() && !rs.is_empty() => rs,
            _ => {
                self.stats.record_frame_success(None);
                return TransformationResult::pass_through(sample.detected());
            }
        };

        let resolution = resolve_frame(sample, ruleset);
        let result = TransformationResult::from_outputs(sample.detected(), resolution.outputs, resolution.passes);
        self.stats.record_frame_success(Some(resolution.abandoned));
        result
    }

    /// Current load/health state.
    pub fn status(&self) -> EngineStatus {
        self.stats.status()
    }

    /// Point-in-time statistics snapshot for observability/UI.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown internal error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AbandonKind, InvalidRuleInfo, LoadErrorKind, Rule};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn sample(pairs: &[(&str, f64)]) -> InputSample {
        InputSample::new(true, pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    fn rule(name: &str, expr: &str, min: f64, max: f64) -> Rule {
        Rule::new(name, expr, min, max, 0.0).unwrap()
    }

    fn report(rules: Vec<Rule>) -> LoadReport {
        LoadReport { rules, ..LoadReport::default() }
    }

    #[test]
    fn clamps_to_declared_range() {
        let engine = Engine::new();
        engine.install(report(vec![rule("A", "HeadPosX * 2", -1.0, 1.0)]));

        let res = engine.transform(&sample(&[("HeadPosX", 5.0)]));
        assert_eq!(res.outputs.len(), 1);
        assert_eq!(res.outputs[0].name, "A");
        assert_eq!(res.outputs[0].value, 1.0);
    }

    #[test]
    fn resolves_dependency_chain_in_one_call() {
        let engine = Engine::new();
        engine.install(report(vec![
            rule("B", "A + 1", -1000.0, 1000.0),
            rule("A", "HeadPosX", -1000.0, 1000.0),
        ]));

        let res = engine.transform(&sample(&[("HeadPosX", 3.0)]));
        let by_name: HashMap<&str, f64> = res.outputs.iter().map(|o| (o.name.as_str(), o.value)).collect();
        assert_eq!(by_name["A"], 3.0);
        assert_eq!(by_name["B"], 4.0);
    }

    #[test]
    fn not_detected_short_circuits_as_success() {
        let engine = Engine::new();
        engine.install(report(vec![rule("A", "1.0", -1.0, 1.0)]));

        let res = engine.transform(&InputSample::new(false, HashMap::new()));
        assert!(!res.detected);
        assert!(res.outputs.is_empty());

        let snap = engine.snapshot();
        assert_eq!(snap.successful_transformations, 1);
        assert_eq!(snap.failed_transformations, 0);
    }

    #[test]
    fn no_ruleset_installed_passes_through() {
        let engine = Engine::new();
        let res = engine.transform(&sample(&[("HeadPosX", 1.0)]));
        assert!(res.detected);
        assert!(res.outputs.is_empty());
        assert_eq!(engine.status(), EngineStatus::NeverLoaded);
    }

    #[test]
    fn install_status_follows_load_outcome() {
        let engine = Engine::new();
        assert_eq!(engine.status(), EngineStatus::NeverLoaded);

        assert_eq!(engine.install(report(vec![rule("A", "1.0", -1.0, 1.0)])), EngineStatus::AllRulesValid);

        let invalid = InvalidRuleInfo {
            name: "Bad".into(),
            expression_text: "(1 + 2".into(),
            error: "syntax error".into(),
            kind: LoadErrorKind::Syntax,
        };
        let partial = LoadReport { rules: vec![rule("A", "1.0", -1.0, 1.0)], invalid: vec![invalid], ..LoadReport::default() };
        assert_eq!(engine.install(partial), EngineStatus::RulesPartiallyValid);

        assert_eq!(engine.install(report(Vec::new())), EngineStatus::NoValidRules);
    }

    #[test]
    fn failed_load_keeps_serving_previous_rules() {
        let engine = Engine::new();
        engine.install(report(vec![rule("A", "2.0", -10.0, 10.0)]));

        let failed = LoadReport { error: Some("config unreadable".into()), ..LoadReport::default() };
        assert_eq!(engine.install(failed), EngineStatus::ConfigErrorCached);

        // The old set still answers frames.
        let res = engine.transform(&sample(&[]));
        assert_eq!(res.outputs[0].value, 2.0);
        assert_eq!(engine.snapshot().last_error.as_deref(), Some("config unreadable"));
    }

    #[test]
    fn abandoned_rules_surface_in_snapshot_until_recovery() {
        let engine = Engine::new();
        engine.install(report(vec![
            rule("A", "Missing + 1", -10.0, 10.0),
            rule("B", "1.0", -10.0, 10.0),
        ]));

        engine.transform(&sample(&[]));
        let snap = engine.snapshot();
        assert_eq!(snap.status, EngineStatus::RulesPartiallyValid);
        assert_eq!(snap.abandoned.len(), 1);
        assert_eq!(snap.abandoned[0].kind, AbandonKind::Evaluation);

        // Once the dependency exists, the next frame clears the diagnostic.
        engine.transform(&sample(&[("Missing", 0.0)]));
        let snap = engine.snapshot();
        assert_eq!(snap.status, EngineStatus::AllRulesValid);
        assert!(snap.abandoned.is_empty());
    }

    #[test]
    fn transform_is_idempotent_for_identical_input() {
        let engine = Engine::new();
        engine.install(report(vec![
            rule("B", "A * 2", -100.0, 100.0),
            rule("A", "HeadPosX + EyeLeftX", -100.0, 100.0),
        ]));

        let s = sample(&[("HeadPosX", 1.5), ("EyeLeftX", 2.5)]);
        let first = engine.transform(&s);
        let second = engine.transform(&s);
        assert_eq!(first, second);
    }

    #[test]
    fn registration_maps_cover_resolved_outputs() {
        let engine = Engine::new();
        engine.install(report(vec![rule("A", "HeadPosX", -1.0, 1.0)]));

        let res = engine.transform(&sample(&[("HeadPosX", 0.5)]));
        assert_eq!(res.ranges["A"].min, -1.0);
        assert_eq!(res.ranges["A"].max, 1.0);
        assert_eq!(res.expressions["A"], "HeadPosX");
    }

    #[test]
    fn internal_panic_degrades_to_counted_pass_through() {
        let engine = Engine::new();
        engine.install(report(vec![rule("A", "1.0", -1.0, 1.0)]));

        let s = sample(&[]);
        let res = engine.transform_guarded(&s, || panic!("corrupted sample"));
        assert!(res.detected);
        assert!(res.outputs.is_empty());

        let snap = engine.snapshot();
        assert_eq!(snap.failed_transformations, 1);
        assert_eq!(snap.total_transformations, 1);
        assert_eq!(snap.last_error.as_deref(), Some("corrupted sample"));

        // The engine keeps serving normal frames afterwards.
        let res = engine.transform(&s);
        assert_eq!(res.outputs.len(), 1);
        assert_eq!(engine.snapshot().successful_transformations, 1);
    }

    #[test]
    fn concurrent_reload_never_tears_a_frame() {
        // Two rule-set generations where every rule yields the generation
        // constant; a torn read would show mixed values within one frame.
        let engine = Arc::new(Engine::new());
        engine.install(report(vec![rule("X", "1.0", -10.0, 10.0), rule("Y", "1.0", -10.0, 10.0)]));

        let installer = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let c = if i % 2 == 0 { "2.0" } else { "1.0" };
                    engine.install(report(vec![rule("X", c, -10.0, 10.0), rule("Y", c, -10.0, 10.0)]));
                }
            })
        };

        let s = sample(&[]);
        for _ in 0..200 {
            let res = engine.transform(&s);
            assert_eq!(res.outputs.len(), 2);
            assert_eq!(res.outputs[0].value, res.outputs[1].value, "frame observed a mixed rule set");
        }
        installer.join().unwrap();
    }
}
