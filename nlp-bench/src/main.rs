//! Benchmarking CLI for the nlp-core solver.

mod regression;
mod solver_choice;
mod test_problems;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nlp_core::{AlgorithmMode, IterationSummary, Solver, SolverSettings};

use regression::{compare_baseline, run_regression_suite, Baseline};
use solver_choice::{apply_choices, LinearSolverChoice, MuStrategyChoice};
use test_problems::{find_problem, test_problems};

#[derive(Parser)]
#[command(name = "nlp-bench", about = "Benchmark and regression runner for nlp-core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered test problems
    List,
    /// Solve one test problem and print the iteration log
    Run {
        name: String,
        #[arg(long, value_enum)]
        linear_solver: Option<LinearSolverChoice>,
        #[arg(long, value_enum)]
        mu_strategy: Option<MuStrategyChoice>,
        #[arg(long)]
        max_iter: Option<usize>,
        #[arg(long)]
        verbose: bool,
    },
    /// Solve every test problem and compare against a baseline
    Regression {
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long)]
        write_baseline: Option<PathBuf>,
        #[arg(long, value_enum)]
        linear_solver: Option<LinearSolverChoice>,
        #[arg(long, value_enum)]
        mu_strategy: Option<MuStrategyChoice>,
        /// Allowed relative growth of iteration counts
        #[arg(long, default_value_t = 0.2)]
        max_regression: f64,
    },
}

fn print_iteration(s: &IterationSummary) {
    let marker = if s.mode == AlgorithmMode::RestorationPhase { 'r' } else { ' ' };
    println!(
        "{:>4}{} {:>14.7e} {:>9.2e} {:>9.2e} {:>6.1} {:>9.2e} {:>9.2e} {:>9.2e} {:>9.2e} {:>3}",
        s.iter,
        marker,
        s.obj_value,
        s.inf_pr,
        s.inf_du,
        s.mu.log10(),
        s.d_norm,
        s.regularization_size,
        s.alpha_du,
        s.alpha_pr,
        s.ls_trials
    );
}

fn run_one(
    name: &str,
    linear_solver: Option<LinearSolverChoice>,
    mu_strategy: Option<MuStrategyChoice>,
    max_iter: Option<usize>,
    verbose: bool,
) -> Result<()> {
    let Some(problem) = find_problem(name) else {
        bail!("unknown problem {:?} (see `nlp-bench list`)", name);
    };

    let mut settings = SolverSettings::default();
    apply_choices(&mut settings, linear_solver, mu_strategy);
    if let Some(max_iter) = max_iter {
        settings.max_iter = max_iter;
    }
    log::debug!(
        "{}: linear solver {:?}, mu strategy {:?}, max_iter {}",
        problem.name,
        settings.linear_solver,
        settings.mu_strategy,
        settings.max_iter
    );

    println!("\n{}", "=".repeat(60));
    println!("{} ({}, {})", problem.name, problem.problem_class, problem.source);
    println!("{}", "=".repeat(60));

    let mut nlp = (problem.builder)();
    println!("Variables (n):    {}", nlp.num_variables());
    println!("Constraints (m):  {}", nlp.num_constraints());
    println!();

    let start = Instant::now();
    let result = {
        let mut solver = Solver::new(settings).with_intermediate_callback(|s: &IterationSummary| {
            if verbose {
                print_iteration(s);
            }
            true
        });
        solver
            .solve(nlp.as_mut())
            .with_context(|| format!("solving {}", problem.name))?
    };
    let elapsed = start.elapsed();

    println!();
    println!("Status:           {}", result.status);
    println!("Iterations:       {}", result.info.iters);
    println!("Objective:        {:.10e}", result.obj_val);
    if let Some(expected) = problem.expected_objective {
        println!("Expected:         {:.10e}", expected);
    }
    println!("Constr. viol.:    {:.3e}", result.info.constr_viol);
    println!("Dual inf.:        {:.3e}", result.info.dual_inf);
    println!("Final mu:         {:.3e}", result.info.mu);
    println!("Restorations:     {}", result.info.restoration_calls);
    println!(
        "Evaluations:      f {} grad {} g {} jac {} hess {}",
        result.info.evals.obj, result.info.evals.grad, result.info.evals.constr, result.info.evals.jac, result.info.evals.hess
    );
    println!("Solve time:       {:.3} ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

fn run_regression(
    baseline: Option<PathBuf>,
    write_baseline: Option<PathBuf>,
    linear_solver: Option<LinearSolverChoice>,
    mu_strategy: Option<MuStrategyChoice>,
    max_regression: f64,
) -> Result<()> {
    let mut settings = SolverSettings::default();
    apply_choices(&mut settings, linear_solver, mu_strategy);

    let results = run_regression_suite(&settings);
    println!("{:<26} {:<32} {:>6} {:>16} {:>10}", "problem", "status", "iters", "objective", "time [ms]");
    let mut failures = Vec::new();
    for res in &results {
        let status = res
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("error: {}", res.error.as_deref().unwrap_or("")));
        println!(
            "{:<26} {:<32} {:>6} {:>16.8e} {:>10}",
            res.name, status, res.iters, res.obj_val, res.solve_time_ms
        );
        if !res.is_pass(1e-6) {
            failures.push(res.name.clone());
        }
    }

    if let Some(path) = write_baseline {
        let json = serde_json::to_string_pretty(&Baseline::from_results(&results))?;
        std::fs::write(&path, json).with_context(|| format!("writing baseline {}", path.display()))?;
        println!("\nbaseline written to {}", path.display());
    }

    if let Some(path) = baseline {
        let contents =
            std::fs::read_to_string(&path).with_context(|| format!("reading baseline {}", path.display()))?;
        let baseline: Baseline =
            serde_json::from_str(&contents).with_context(|| format!("parsing baseline {}", path.display()))?;
        let diffs = compare_baseline(&baseline, &results, max_regression);
        for diff in &diffs {
            println!("REGRESSION {}", diff);
        }
        if !diffs.is_empty() {
            bail!("{} baseline regressions", diffs.len());
        }
    }

    if !failures.is_empty() {
        bail!("failed problems: {}", failures.join(", "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::List => {
            for p in test_problems() {
                let iters = p
                    .expected_iterations
                    .map(|k| format!("~{} iters", k))
                    .unwrap_or_default();
                println!(
                    "{:<26} {:<8} {:<20} {:<10} {}",
                    p.name,
                    p.problem_class,
                    p.source,
                    iters,
                    if p.expected_to_fail { "expected to fail" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Run {
            name,
            linear_solver,
            mu_strategy,
            max_iter,
            verbose,
        } => run_one(&name, linear_solver, mu_strategy, max_iter, verbose),
        Commands::Regression {
            baseline,
            write_baseline,
            linear_solver,
            mu_strategy,
            max_regression,
        } => run_regression(baseline, write_baseline, linear_solver, mu_strategy, max_regression),
    }
}
