use std::env;

fn flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v != "0" && v.to_lowercase() != "false")
}

/// Extra per-iteration detail, toggled through the environment.
///
/// `NLP_DIAG` enables it, `NLP_DIAG_EVERY` thins it out and
/// `NLP_DIAG_FILTER=0` drops the filter and barrier error lines.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub every: usize,
    pub filter: bool,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let every = env::var("NLP_DIAG_EVERY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1);

        Self {
            enabled: flag("NLP_DIAG").unwrap_or(false),
            every,
            filter: flag("NLP_DIAG_FILTER").unwrap_or(true),
        }
    }

    #[inline]
    pub fn should_log(&self, iter: usize) -> bool {
        self.enabled && (iter % self.every == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_log_respects_stride() {
        let diag = DiagnosticsConfig {
            enabled: true,
            every: 3,
            filter: true,
        };
        assert!(diag.should_log(0));
        assert!(!diag.should_log(2));
        assert!(diag.should_log(6));

        let off = DiagnosticsConfig { enabled: false, ..diag };
        assert!(!off.should_log(0));
    }
}
