//! Filter of (infeasibility, barrier objective) pairs.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterEntry {
    pub theta: f64,
    pub phi: f64,
}

/// Set of pairs that future trial points must not be dominated by.
///
/// The filter only grows between resets; dominated entries are dropped on
/// insertion since the new entry excludes everything they excluded.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    entries: Vec<FilterEntry>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// A pair is acceptable if no entry is at least as good in both measures.
    pub fn is_acceptable(&self, theta: f64, phi: f64) -> bool {
        self.entries.iter().all(|e| theta < e.theta || phi < e.phi)
    }

    pub fn add(&mut self, theta: f64, phi: f64) {
        self.entries.retain(|e| e.theta < theta || e.phi < phi);
        self.entries.push(FilterEntry { theta, phi });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
