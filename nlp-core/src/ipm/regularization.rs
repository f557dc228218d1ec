//! Inertia-correcting perturbations of the KKT matrix.
//!
//! Every direction starts unperturbed. A singular matrix first gets a
//! constraint regularization δc; wrong inertia grows the Hessian shift δw,
//! starting from the last successful value when there is one. The protocol
//! is a bounded state machine: once δw would exceed its ceiling or the trial
//! budget is spent, the direction computation is reported as fatal.

use crate::settings::SolverSettings;

#[derive(Debug, Clone)]
pub struct RegularizationPolicy {
    pub first_hessian_perturbation: f64,
    pub min_hessian_perturbation: f64,
    pub max_hessian_perturbation: f64,
    pub inc_fact_first: f64,
    pub inc_fact: f64,
    pub dec_fact: f64,
    pub jacobian_value: f64,
    pub jacobian_exponent: f64,
    pub max_trials: usize,
}

impl RegularizationPolicy {
    pub fn from_settings(settings: &SolverSettings) -> Self {
        Self {
            first_hessian_perturbation: settings.first_hessian_perturbation,
            min_hessian_perturbation: settings.min_hessian_perturbation,
            max_hessian_perturbation: settings.max_hessian_perturbation,
            inc_fact_first: settings.perturb_inc_fact_first,
            inc_fact: settings.perturb_inc_fact,
            dec_fact: settings.perturb_dec_fact,
            jacobian_value: settings.jacobian_regularization_value,
            jacobian_exponent: settings.jacobian_regularization_exponent,
            max_trials: settings.max_perturbation_trials,
        }
    }
}

impl Default for RegularizationPolicy {
    fn default() -> Self {
        Self::from_settings(&SolverSettings::default())
    }
}

/// Next action after a factorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perturbation {
    /// Refactor with the current (δw, δc)
    Retry,
    /// No admissible perturbation is left
    Fatal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegularizationState {
    pub delta_w: f64,
    pub delta_c: f64,
    /// δw of the last direction that needed one; 0 if none so far
    pub delta_w_last: f64,
    pub trials: usize,
}

impl RegularizationState {
    /// Reset the perturbations for a new direction.
    pub fn begin(&mut self) {
        self.delta_w = 0.0;
        self.delta_c = 0.0;
        self.trials = 1;
    }

    /// The matrix was singular.
    pub fn on_singular(&mut self, policy: &RegularizationPolicy, mu: f64) -> Perturbation {
        if self.delta_c == 0.0 {
            self.delta_c = policy.jacobian_value * mu.powf(policy.jacobian_exponent);
            self.next_trial(policy)
        } else {
            self.on_wrong_inertia(policy)
        }
    }

    /// The factorization succeeded with the wrong inertia.
    pub fn on_wrong_inertia(&mut self, policy: &RegularizationPolicy) -> Perturbation {
        if self.delta_w == 0.0 {
            self.delta_w = if self.delta_w_last == 0.0 {
                policy.first_hessian_perturbation
            } else {
                (self.delta_w_last * policy.dec_fact).max(policy.min_hessian_perturbation)
            };
        } else {
            let factor = if self.delta_w_last == 0.0 {
                policy.inc_fact_first
            } else {
                policy.inc_fact
            };
            self.delta_w *= factor;
        }

        if self.delta_w > policy.max_hessian_perturbation {
            return Perturbation::Fatal;
        }
        self.next_trial(policy)
    }

    fn next_trial(&mut self, policy: &RegularizationPolicy) -> Perturbation {
        self.trials += 1;
        if self.trials > policy.max_trials {
            Perturbation::Fatal
        } else {
            Perturbation::Retry
        }
    }

    /// The current perturbation gave the required inertia.
    pub fn on_success(&mut self) {
        if self.delta_w > 0.0 {
            self.delta_w_last = self.delta_w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_perturbation_sequence() {
        let policy = RegularizationPolicy::default();
        let mut state = RegularizationState::default();
        state.begin();
        assert_eq!(state.on_wrong_inertia(&policy), Perturbation::Retry);
        assert_eq!(state.delta_w, 1e-4);
        assert_eq!(state.on_wrong_inertia(&policy), Perturbation::Retry);
        assert!((state.delta_w - 1e-2).abs() < 1e-18);
        state.on_success();
        assert!((state.delta_w_last - 1e-2).abs() < 1e-18);

        // Next direction starts from a third of the last value, grows by 8.
        state.begin();
        assert_eq!(state.delta_w, 0.0);
        state.on_wrong_inertia(&policy);
        assert!((state.delta_w - 1e-2 / 3.0).abs() < 1e-15);
        state.on_wrong_inertia(&policy);
        assert!((state.delta_w - 8e-2 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn test_singular_sets_jacobian_regularization_first() {
        let policy = RegularizationPolicy::default();
        let mut state = RegularizationState::default();
        state.begin();
        assert_eq!(state.on_singular(&policy, 1e-4), Perturbation::Retry);
        assert!((state.delta_c - 1e-9).abs() < 1e-22);
        assert_eq!(state.delta_w, 0.0);

        // Still singular: the Hessian shift starts.
        assert_eq!(state.on_singular(&policy, 1e-4), Perturbation::Retry);
        assert_eq!(state.delta_w, 1e-4);
    }

    #[test]
    fn test_perturbation_ceiling_is_fatal() {
        let policy = RegularizationPolicy::default();
        let mut state = RegularizationState::default();
        state.begin();
        let mut outcome = Perturbation::Retry;
        let mut steps = 0;
        while outcome == Perturbation::Retry {
            outcome = state.on_wrong_inertia(&policy);
            steps += 1;
            assert!(steps < 100, "perturbation loop must terminate");
        }
        assert_eq!(outcome, Perturbation::Fatal);
        assert!(state.delta_w > policy.max_hessian_perturbation);
    }

    #[test]
    fn test_trial_budget_is_fatal() {
        let policy = RegularizationPolicy {
            max_trials: 3,
            ..Default::default()
        };
        let mut state = RegularizationState::default();
        state.begin();
        assert_eq!(state.on_wrong_inertia(&policy), Perturbation::Retry);
        assert_eq!(state.on_wrong_inertia(&policy), Perturbation::Retry);
        assert_eq!(state.on_wrong_inertia(&policy), Perturbation::Fatal);
    }
}
