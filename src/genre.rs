//! Genre frequency across a run.
//!
//! Owned by whoever drives the run and passed down explicitly.

use std::collections::HashMap;

/// Counts genres written during a run.
#[derive(Debug, Default, Clone)]
pub struct GenreTally {
    counts: HashMap<String, usize>,
    // first spelling seen wins for display
    spellings: HashMap<String, String>,
}

impl GenreTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count each genre once per call. Matching is case-insensitive.
    pub fn record<S: AsRef<str>>(&mut self, genres: &[S]) {
        let mut seen = Vec::new();
        for genre in genres {
            let display = genre.as_ref().trim();
            if display.is_empty() {
                continue;
            }
            let key = display.to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            self.spellings.entry(key.clone()).or_insert_with(|| display.to_string());
            *self.counts.entry(key.clone()).or_insert(0) += 1;
            seen.push(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sorted by count (highest first), then name. Leaves the tally empty.
    pub fn finalize(&mut self) -> Vec<(String, usize)> {
        let mut spellings = std::mem::take(&mut self.spellings);
        let mut totals: Vec<(String, usize)> = std::mem::take(&mut self.counts)
            .into_iter()
            .map(|(key, count)| (spellings.remove(&key).unwrap_or(key), count))
            .collect();
        totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase())));
        totals
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.spellings.clear();
    }
}
