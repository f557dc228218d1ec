use clap::ValueEnum;
use nlp_core::{LinearSolverKind, MuStrategy, SolverSettings};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LinearSolverChoice {
    SparseLdl,
    Dense,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MuStrategyChoice {
    Monotone,
    Adaptive,
}

pub fn apply_choices(
    settings: &mut SolverSettings,
    linear_solver: Option<LinearSolverChoice>,
    mu_strategy: Option<MuStrategyChoice>,
) {
    if let Some(choice) = linear_solver {
        settings.linear_solver = match choice {
            LinearSolverChoice::SparseLdl => LinearSolverKind::SparseLdl,
            LinearSolverChoice::Dense => LinearSolverKind::DenseEigen,
        };
    }
    if let Some(choice) = mu_strategy {
        settings.mu_strategy = match choice {
            MuStrategyChoice::Monotone => MuStrategy::Monotone,
            MuStrategyChoice::Adaptive => MuStrategy::Adaptive,
        };
    }
}
