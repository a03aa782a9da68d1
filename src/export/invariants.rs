// Initial-marking statistics and their sanity checks
//
// Pure computations over counts gathered while collecting initial places.
// The checks are diagnostic: results are logged and returned, never enforced.

use serde::Serialize;
use tracing::info;

/// Token counts over the initially marked places
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkingSummary {
    pub total_tokens: u64,
    pub initial_places: u64,
    pub unsafe_places: u64,
    pub min_unsafe_marking: Option<u64>,
    pub max_unsafe_marking: Option<u64>,
}

impl MarkingSummary {
    /// Account for one marked place; returns true when it is unsafe (> 1 token)
    pub fn record(&mut self, tokens: u64) -> bool {
        self.total_tokens += tokens;
        self.initial_places += 1;
        if tokens <= 1 {
            return false;
        }
        self.unsafe_places += 1;
        self.min_unsafe_marking = Some(self.min_unsafe_marking.map_or(tokens, |m| m.min(tokens)));
        self.max_unsafe_marking = Some(self.max_unsafe_marking.map_or(tokens, |m| m.max(tokens)));
        true
    }

    pub fn unsafe_range(&self) -> Option<(u64, u64)> {
        self.min_unsafe_marking.zip(self.max_unsafe_marking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkingInvariants {
    /// total tokens > number of initial places
    pub tokens_exceed_places: bool,
    /// unsafe initial places <= initial places
    pub unsafe_within_initial: bool,
    /// (init - unsafe) + unsafe * min <= total <= (init - unsafe) + unsafe * max
    pub tokens_within_bounds: bool,
}

impl MarkingInvariants {
    pub fn all_hold(&self) -> bool {
        self.tokens_exceed_places && self.unsafe_within_initial && self.tokens_within_bounds
    }
}

/// Evaluate and log the three marking invariants
pub fn check_marking_invariants(summary: &MarkingSummary) -> MarkingInvariants {
    let init = summary.initial_places;
    let unsafe_count = summary.unsafe_places;
    let (min, max) = summary.unsafe_range().unwrap_or((1, 1));
    let safe_count = init.saturating_sub(unsafe_count);

    let lower = safe_count.saturating_add(unsafe_count.saturating_mul(min));
    let upper = safe_count.saturating_add(unsafe_count.saturating_mul(max));

    let result = MarkingInvariants {
        tokens_exceed_places: summary.total_tokens > init,
        unsafe_within_initial: unsafe_count <= init,
        tokens_within_bounds: lower <= summary.total_tokens && summary.total_tokens <= upper,
    };

    info!(
        "Checking invariant 'total nb of tokens > nb initial places': {}",
        result.tokens_exceed_places
    );
    info!(
        "Checking invariant 'nb unsafe initial places <= nb initial places': {}",
        result.unsafe_within_initial
    );
    info!(
        "Checking invariant '(nb_init - nb_unsafe) + (nb_unsafe * min) <= nb_tokens <= (nb_init - nb_unsafe) + (nb_unsafe * max)': {}",
        result.tokens_within_bounds
    );
    result
}
