use nlp_core::{ConvergenceStatus, Solver, SolverSettings};
use serde::{Deserialize, Serialize};

use crate::test_problems::{test_problems, TestProblem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionResult {
    pub name: String,
    pub status: Option<ConvergenceStatus>,
    pub obj_val: f64,
    /// |f - f*| / max(1, |f*|) where the optimum is known
    pub obj_error: Option<f64>,
    pub iters: usize,
    pub restoration_calls: usize,
    pub solve_time_ms: u64,
    pub expected_to_fail: bool,
    pub error: Option<String>,
}

impl RegressionResult {
    /// Solved (or failed, for problems expected to fail) as intended.
    pub fn is_pass(&self, obj_tol: f64) -> bool {
        match self.status {
            Some(status) if self.expected_to_fail => !status.is_success(),
            Some(status) => status.is_success() && self.obj_error.map_or(true, |e| e <= obj_tol),
            None => false,
        }
    }
}

/// Baseline entry written by `regression --write-baseline`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub name: String,
    pub status: Option<ConvergenceStatus>,
    pub iters: usize,
    pub solve_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub cases: Vec<BaselineEntry>,
}

impl Baseline {
    pub fn from_results(results: &[RegressionResult]) -> Self {
        Self {
            cases: results
                .iter()
                .map(|r| BaselineEntry {
                    name: r.name.clone(),
                    status: r.status,
                    iters: r.iters,
                    solve_time_ms: r.solve_time_ms,
                })
                .collect(),
        }
    }
}

/// Differences against a baseline: status changes and iteration counts
/// growing by more than `max_iter_regression` (relative).
pub fn compare_baseline(baseline: &Baseline, results: &[RegressionResult], max_iter_regression: f64) -> Vec<String> {
    let mut failures = Vec::new();
    for base in &baseline.cases {
        let Some(res) = results.iter().find(|r| r.name == base.name) else {
            failures.push(format!("{}: missing from current run", base.name));
            continue;
        };
        if res.status != base.status {
            failures.push(format!(
                "{}: status changed {:?} -> {:?}",
                base.name, base.status, res.status
            ));
            continue;
        }
        let allowed = (base.iters as f64 * (1.0 + max_iter_regression)).ceil() as usize;
        if res.iters > allowed.max(base.iters + 1) {
            failures.push(format!(
                "{}: iterations {} -> {} (allowed {})",
                base.name, base.iters, res.iters, allowed
            ));
        }
    }
    failures
}

pub fn run_case(problem: &TestProblem, settings: &SolverSettings) -> RegressionResult {
    let mut nlp = (problem.builder)();
    let mut solver = Solver::new(settings.clone());
    let result = match solver.solve(nlp.as_mut()) {
        Ok(res) => RegressionResult {
            name: problem.name.to_string(),
            status: Some(res.status),
            obj_val: res.obj_val,
            obj_error: problem
                .expected_objective
                .map(|f| (res.obj_val - f).abs() / f.abs().max(1.0)),
            iters: res.info.iters,
            restoration_calls: res.info.restoration_calls,
            solve_time_ms: res.info.solve_time_ms,
            expected_to_fail: problem.expected_to_fail,
            error: None,
        },
        Err(e) => RegressionResult {
            name: problem.name.to_string(),
            status: None,
            obj_val: f64::NAN,
            obj_error: None,
            iters: 0,
            restoration_calls: 0,
            solve_time_ms: 0,
            expected_to_fail: problem.expected_to_fail,
            error: Some(e.to_string()),
        },
    };
    match (&result.status, &result.error) {
        (Some(status), _) => log::info!(
            "{}: {} after {} iterations ({} restorations, {} ms)",
            result.name,
            status,
            result.iters,
            result.restoration_calls,
            result.solve_time_ms
        ),
        (None, Some(e)) => log::warn!("{}: solve error: {}", result.name, e),
        (None, None) => {}
    }
    result
}

pub fn run_regression_suite(settings: &SolverSettings) -> Vec<RegressionResult> {
    test_problems().iter().map(|p| run_case(p, settings)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn regression_suite_smoke() {
        let max_iter = env::var("NLP_REGRESSION_MAX_ITER")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(500);

        let settings = SolverSettings {
            max_iter,
            ..Default::default()
        };

        let results = run_regression_suite(&settings);
        let failures: Vec<String> = results
            .iter()
            .filter(|r| !r.is_pass(1e-6))
            .map(|r| {
                format!(
                    "{}: status={:?} obj={:.6e} obj_err={:?} {}",
                    r.name,
                    r.status,
                    r.obj_val,
                    r.obj_error,
                    r.error.as_deref().unwrap_or("")
                )
            })
            .collect();

        if !failures.is_empty() {
            panic!("regression failures:\n{}", failures.join("\n"));
        }

        if let Ok(path) = env::var("NLP_ITER_BASELINE") {
            let contents =
                std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read baseline {}: {}", path, e));
            let baseline: Baseline =
                serde_json::from_str(&contents).unwrap_or_else(|e| panic!("failed to parse baseline {}: {}", path, e));
            let diffs = compare_baseline(&baseline, &results, 0.2);
            if !diffs.is_empty() {
                panic!("iteration regression:\n{}", diffs.join("\n"));
            }
        }
    }

    #[test]
    fn run_case_reports_solver_errors() {
        let problem = &test_problems()[0];
        let settings = SolverSettings {
            tol: -1.0,
            ..Default::default()
        };
        let result = run_case(problem, &settings);
        assert_eq!(result.name, problem.name);
        assert!(result.status.is_none());
        assert!(result.error.as_deref().is_some_and(|e| e.contains("tol")), "{:?}", result.error);
        assert!(!result.is_pass(1e-6));
    }

    #[test]
    fn baseline_comparison_flags_changes() {
        let result = |name: &str, status, iters| RegressionResult {
            name: name.to_string(),
            status: Some(status),
            obj_val: 0.0,
            obj_error: None,
            iters,
            restoration_calls: 0,
            solve_time_ms: 1,
            expected_to_fail: false,
            error: None,
        };
        let baseline = Baseline::from_results(&[
            result("A", ConvergenceStatus::Converged, 10),
            result("B", ConvergenceStatus::Converged, 10),
            result("C", ConvergenceStatus::Converged, 10),
        ]);
        let current = vec![
            result("A", ConvergenceStatus::Converged, 12),
            result("B", ConvergenceStatus::MaxIterExceeded, 10),
        ];

        let diffs = compare_baseline(&baseline, &current, 0.2);
        assert_eq!(diffs.len(), 2, "{:?}", diffs);
        assert!(diffs[0].starts_with("B: status changed"));
        assert!(diffs[1].starts_with("C: missing"));

        let json = serde_json::to_string(&baseline).unwrap();
        let parsed: Baseline = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cases.len(), 3);
    }
}
