//! Barrier parameter updates.
//!
//! `Monotone` is the Fiacco-McCormick rule: μ decreases once the barrier
//! subproblem is solved to `barrier_tol_factor * μ`. `Adaptive` chooses μ
//! every iteration from the complementarity and centrality of the iterate,
//! and switches to monotone mode whenever the optimality error stops
//! decreasing; it returns to free mode once enough progress is made.

use std::collections::VecDeque;

use super::quantities::IterateQuantities;
use crate::settings::{MuStrategy, SolverSettings};

/// Result of one barrier update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierUpdate {
    pub mu: f64,
    pub tau: f64,
    /// μ differs from the previous iteration; the filter must be reset
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdaptiveMode {
    Free,
    Fixed,
}

pub struct BarrierUpdater {
    strategy: MuStrategy,
    mu: f64,
    tau: f64,

    mu_target: f64,
    mu_min: f64,
    mu_max: f64,
    /// Monotone floor max(mu_target, min(tol, compl_inf_tol) / (κε + 1))
    mu_floor: f64,
    barrier_tol_factor: f64,
    linear_decrease: f64,
    superlinear_power: f64,
    tau_min: f64,

    sigma_factor: f64,
    centrality_exponent: f64,
    lower_ratio: f64,
    upper_ratio: f64,
    red_iters: usize,
    red_fact: f64,
    monotone_init_factor: f64,

    mode: AdaptiveMode,
    /// Recent accepted optimality errors (free mode)
    references: VecDeque<f64>,
    /// Optimality error when fixed mode was entered
    fixed_reference: f64,
    force_monotone: bool,
}

impl BarrierUpdater {
    pub fn new(settings: &SolverSettings, initial: &IterateQuantities) -> Self {
        let mu_floor = settings
            .mu_target
            .max(settings.tol.min(settings.compl_inf_tol) / (settings.barrier_tol_factor + 1.0));
        let initial_compl = initial.average_complementarity();
        let mu_max = if initial_compl > 0.0 {
            settings.mu_max_fact * initial_compl
        } else {
            settings.mu_max_fact
        };
        let mu = match settings.mu_strategy {
            MuStrategy::Monotone => settings.mu_init,
            MuStrategy::Adaptive => settings.mu_init.min(mu_max),
        };

        Self {
            strategy: settings.mu_strategy,
            mu,
            tau: settings.tau_min.max(1.0 - mu),
            mu_target: settings.mu_target,
            mu_min: settings.mu_min.max(settings.mu_target),
            mu_max,
            mu_floor,
            barrier_tol_factor: settings.barrier_tol_factor,
            linear_decrease: settings.mu_linear_decrease_factor,
            superlinear_power: settings.mu_superlinear_decrease_power,
            tau_min: settings.tau_min,
            sigma_factor: settings.adaptive_mu_sigma_factor,
            centrality_exponent: settings.adaptive_mu_centrality_exponent,
            lower_ratio: settings.adaptive_mu_lower_ratio,
            upper_ratio: settings.adaptive_mu_upper_ratio,
            red_iters: settings.adaptive_mu_kkterror_red_iters,
            red_fact: settings.adaptive_mu_kkterror_red_fact,
            monotone_init_factor: settings.adaptive_mu_monotone_init_factor,
            mode: AdaptiveMode::Free,
            references: VecDeque::new(),
            fixed_reference: f64::INFINITY,
            force_monotone: false,
        }
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// The restoration phase returned a new point; the adaptive strategy
    /// continues in monotone mode from there.
    pub fn notify_restoration(&mut self) {
        self.force_monotone = true;
    }

    /// Choose μ and τ for the next direction.
    pub fn update(&mut self, q: &IterateQuantities, tiny_step: bool) -> BarrierUpdate {
        let previous = self.mu;
        match self.strategy {
            MuStrategy::Monotone => self.monotone_update(q, tiny_step),
            MuStrategy::Adaptive => self.adaptive_update(q, tiny_step),
        }
        BarrierUpdate {
            mu: self.mu,
            tau: self.tau,
            changed: self.mu != previous,
        }
    }

    /// Decrease μ while the subproblem is solved, possibly several times in
    /// one iteration. A tiny step forces one decrease.
    fn monotone_update(&mut self, q: &IterateQuantities, tiny_step: bool) {
        let mut force = tiny_step;
        loop {
            let solved = q.barrier_error(self.mu) <= self.barrier_tol_factor * self.mu;
            if !(solved || force) {
                break;
            }
            force = false;
            let next = self.monotone_decrease(self.mu);
            if next >= self.mu {
                break;
            }
            log::trace!("barrier subproblem solved, mu {:.2e} -> {:.2e}", self.mu, next);
            self.mu = next;
        }
        self.tau = self.tau_min.max(1.0 - self.mu);
    }

    fn monotone_decrease(&self, mu: f64) -> f64 {
        (self.linear_decrease * mu)
            .min(mu.powf(self.superlinear_power))
            .max(self.mu_floor)
    }

    fn adaptive_update(&mut self, q: &IterateQuantities, tiny_step: bool) {
        let layout = q.layout();
        if layout.num_bounds() == 0 {
            self.mu = self.mu_min;
            self.tau = self.tau_min.max(1.0 - self.mu);
            return;
        }

        let error = q.nlp_error(self.mu_target);

        if self.mode == AdaptiveMode::Free && (tiny_step || self.force_monotone || !self.sufficient_progress(error)) {
            let mu = (self.monotone_init_factor * q.average_complementarity())
                .max(self.mu_min)
                .min(self.mu_max);
            log::debug!("adaptive mu: switching to monotone mode with mu {:.2e}", mu);
            self.mode = AdaptiveMode::Fixed;
            self.fixed_reference = error;
            self.references.clear();
            self.force_monotone = false;
            self.mu = mu;
            self.tau = self.tau_min.max(1.0 - self.mu);
            return;
        }
        self.force_monotone = false;

        if self.mode == AdaptiveMode::Fixed {
            if error <= self.red_fact * self.fixed_reference && !tiny_step {
                log::debug!("adaptive mu: returning to free mode");
                self.mode = AdaptiveMode::Free;
                self.references.clear();
            } else {
                let mu_floor = self.mu_floor;
                self.mu_floor = self.mu_floor.max(self.mu_min);
                self.monotone_update(q, tiny_step);
                self.mu_floor = mu_floor;
                return;
            }
        }

        self.remember(error);
        let xi = q.centrality();
        let sigma = self.oracle_sigma(xi);
        let lower = self.mu_min.max(self.lower_ratio * self.mu);
        let upper = self.mu_max.min(self.upper_ratio * self.mu).max(lower);
        self.mu = (sigma * q.average_complementarity()).clamp(lower, upper);
        self.tau = self.tau_min.max(1.0 - error);
    }

    /// σ = σ₀ · min(0.05 (1 - ξ) / ξ, 2)^p
    fn oracle_sigma(&self, xi: f64) -> f64 {
        let ratio = if xi > 0.0 { (0.05 * (1.0 - xi) / xi).min(2.0) } else { 2.0 };
        self.sigma_factor * ratio.max(0.0).powf(self.centrality_exponent)
    }

    fn sufficient_progress(&self, error: f64) -> bool {
        if self.references.len() < self.red_iters {
            return true;
        }
        self.references.iter().any(|&r| error <= self.red_fact * r)
    }

    fn remember(&mut self, error: f64) {
        self.references.push_back(error);
        while self.references.len() > self.red_iters {
            self.references.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipm::init::IterateInitializer;
    use crate::ipm::nlp::tests::SmallProblem;
    use crate::ipm::nlp::NlpAdapter;

    fn with_quantities(settings: &SolverSettings, check: impl FnOnce(&IterateQuantities)) {
        let mut problem = SmallProblem;
        let mut nlp = NlpAdapter::new(&mut problem, settings).unwrap();
        let q = IterateInitializer::new(settings).initialize(&mut nlp).unwrap();
        check(&q);
    }

    #[test]
    fn test_monotone_keeps_mu_until_subproblem_solved() {
        let settings = SolverSettings::default();
        with_quantities(&settings, |q| {
            let mut updater = BarrierUpdater::new(&settings, q);
            assert!(q.barrier_error(0.1) > 1.0);
            let update = updater.update(q, false);
            assert_eq!(update.mu, 0.1);
            assert!(!update.changed);
            assert_eq!(update.tau, 0.99);
        });
    }

    #[test]
    fn test_monotone_decrease_rule() {
        let settings = SolverSettings::default();
        with_quantities(&settings, |q| {
            let updater = BarrierUpdater::new(&settings, q);
            // min(0.2 * 0.1, 0.1^1.5) = 0.02
            assert!((updater.monotone_decrease(0.1) - 0.02).abs() < 1e-15);
            // superlinear once mu is small: 1e-4^1.5 = 1e-6
            assert!((updater.monotone_decrease(1e-4) - 1e-6).abs() < 1e-18);
            // never below the floor min(tol, compl_inf_tol) / 11
            assert_eq!(updater.monotone_decrease(1e-12), 1e-8 / 11.0);
        });
    }

    #[test]
    fn test_tiny_step_forces_decrease() {
        let settings = SolverSettings::default();
        with_quantities(&settings, |q| {
            let mut updater = BarrierUpdater::new(&settings, q);
            let update = updater.update(q, true);
            assert!(update.changed);
            assert!((update.mu - 0.02).abs() < 1e-15);
        });
    }

    #[test]
    fn test_tiny_step_at_floor_leaves_mu() {
        let settings = SolverSettings {
            mu_init: 1e-9,
            ..Default::default()
        };
        with_quantities(&settings, |q| {
            let mut updater = BarrierUpdater::new(&settings, q);
            let floor = 1e-8 / 11.0;
            assert_eq!(updater.update(q, true).mu, floor);
            let update = updater.update(q, true);
            assert!(!update.changed);
            assert_eq!(update.mu, floor);
        });
    }

    #[test]
    fn test_oracle_sigma() {
        let settings = SolverSettings {
            mu_strategy: MuStrategy::Adaptive,
            ..Default::default()
        };
        with_quantities(&settings, |q| {
            let updater = BarrierUpdater::new(&settings, q);
            // Perfectly centered: no reduction pressure from the oracle
            assert_eq!(updater.oracle_sigma(1.0), 0.0);
            // Badly centered: capped at σ₀ 2³
            assert!((updater.oracle_sigma(1e-6) - 0.8).abs() < 1e-15);
        });
    }

    #[test]
    fn test_adaptive_mu_stays_within_ratio_limits() {
        let settings = SolverSettings {
            mu_strategy: MuStrategy::Adaptive,
            ..Default::default()
        };
        with_quantities(&settings, |q| {
            let mut updater = BarrierUpdater::new(&settings, q);
            let mu0 = updater.mu();
            let update = updater.update(q, false);
            assert!(update.mu >= 0.01 * mu0 * (1.0 - 1e-12));
            assert!(update.mu <= 10.0 * mu0 * (1.0 + 1e-12));
            assert!(update.tau >= settings.tau_min);
        });
    }

    #[test]
    fn test_adaptive_switches_to_monotone_after_restoration() {
        let settings = SolverSettings {
            mu_strategy: MuStrategy::Adaptive,
            ..Default::default()
        };
        with_quantities(&settings, |q| {
            let mut updater = BarrierUpdater::new(&settings, q);
            updater.notify_restoration();
            let update = updater.update(q, false);
            let expected = 0.8 * q.average_complementarity();
            assert!((update.mu - expected).abs() < 1e-12);
            assert_eq!(updater.mode, AdaptiveMode::Fixed);
        });
    }
}
