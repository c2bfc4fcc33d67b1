use serde::Serialize;

use super::RegimeMemoryEntry;

/// Entries older than this are replaced regardless of score
pub const STALE_AFTER_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplaceReason {
    /// Candidate scored at least as well as the stored entry
    BetterScore,
    /// Stored entry outlived the staleness window
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateDecision {
    Insert,
    Replace(ReplaceReason),
    Discard,
}

impl UpdateDecision {
    pub fn is_write(&self) -> bool {
        !matches!(self, UpdateDecision::Discard)
    }
}

/// Resolve a candidate write against the stored entry
///
/// Ties go to the candidate. A NaN candidate score never wins on score but
/// can still replace a stale entry.
pub fn decide_update(
    existing: Option<&RegimeMemoryEntry>,
    candidate_score: f64,
    now_ms: i64,
) -> UpdateDecision {
    let Some(existing) = existing else {
        return UpdateDecision::Insert;
    };

    if candidate_score >= existing.score {
        UpdateDecision::Replace(ReplaceReason::BetterScore)
    } else if now_ms - existing.timestamp > STALE_AFTER_MS {
        UpdateDecision::Replace(ReplaceReason::Stale)
    } else {
        UpdateDecision::Discard
    }
}
