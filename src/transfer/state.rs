//! Coordinator Phase Definitions
//!
//! ```text
//! INIT → PREPARING → PREPARED → COMMITTING → COMMITTED
//!                                          → ABORTED
//!                                          → IN_DOUBT ──recover──▶ COMMITTED
//! ```
//!
//! Any non-terminal phase may jump straight to ABORTED or IN_DOUBT when a
//! step fails. Phases never move backwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::types::LedgerStatus;

/// Coordinator phase of a single transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorPhase {
    /// Id allocated, nothing opened yet
    Init,
    /// Both store transactions open, prepare steps running
    Preparing,
    /// Balances moved and ledger PENDING row written, nothing committed
    Prepared,
    /// Commit sequence started (core first, then ledger)
    Committing,
    /// Terminal: both sides committed
    Committed,
    /// Terminal: neither side committed, everything rolled back
    Aborted,
    /// Exactly one side committed. Needs an explicit recovery call.
    InDoubt,
}

impl CoordinatorPhase {
    /// Position in the forward-only ordering.
    /// The three outcome phases share the last rank.
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            CoordinatorPhase::Init => 0,
            CoordinatorPhase::Preparing => 1,
            CoordinatorPhase::Prepared => 2,
            CoordinatorPhase::Committing => 3,
            CoordinatorPhase::Committed
            | CoordinatorPhase::Aborted
            | CoordinatorPhase::InDoubt => 4,
        }
    }

    /// COMMITTED and ABORTED accept no further transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorPhase::Committed | CoordinatorPhase::Aborted)
    }

    /// Whether `next` is a legal move from `self`.
    ///
    /// Staying in place is always allowed. IN_DOUBT may only resolve to
    /// COMMITTED (forward recovery).
    pub fn can_transition_to(&self, next: CoordinatorPhase) -> bool {
        if *self == next {
            return true;
        }
        match self {
            CoordinatorPhase::Committed | CoordinatorPhase::Aborted => false,
            CoordinatorPhase::InDoubt => next == CoordinatorPhase::Committed,
            _ => next.rank() > self.rank(),
        }
    }

    /// Phase implied by a persisted ledger status, when the volatile table has no entry
    pub fn from_ledger_status(status: &str) -> Option<Self> {
        match LedgerStatus::parse(status)? {
            LedgerStatus::Pending => Some(CoordinatorPhase::Prepared),
            LedgerStatus::Committed => Some(CoordinatorPhase::Committed),
            LedgerStatus::Aborted => Some(CoordinatorPhase::Aborted),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorPhase::Init => "INIT",
            CoordinatorPhase::Preparing => "PREPARING",
            CoordinatorPhase::Prepared => "PREPARED",
            CoordinatorPhase::Committing => "COMMITTING",
            CoordinatorPhase::Committed => "COMMITTED",
            CoordinatorPhase::Aborted => "ABORTED",
            CoordinatorPhase::InDoubt => "IN_DOUBT",
        }
    }
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CoordinatorPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(CoordinatorPhase::Init),
            "PREPARING" => Ok(CoordinatorPhase::Preparing),
            "PREPARED" => Ok(CoordinatorPhase::Prepared),
            "COMMITTING" => Ok(CoordinatorPhase::Committing),
            "COMMITTED" => Ok(CoordinatorPhase::Committed),
            "ABORTED" => Ok(CoordinatorPhase::Aborted),
            "IN_DOUBT" => Ok(CoordinatorPhase::InDoubt),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CoordinatorPhase; 7] = [
        CoordinatorPhase::Init,
        CoordinatorPhase::Preparing,
        CoordinatorPhase::Prepared,
        CoordinatorPhase::Committing,
        CoordinatorPhase::Committed,
        CoordinatorPhase::Aborted,
        CoordinatorPhase::InDoubt,
    ];

    #[test]
    fn test_terminal_phases() {
        assert!(CoordinatorPhase::Committed.is_terminal());
        assert!(CoordinatorPhase::Aborted.is_terminal());

        assert!(!CoordinatorPhase::Init.is_terminal());
        assert!(!CoordinatorPhase::Preparing.is_terminal());
        assert!(!CoordinatorPhase::Prepared.is_terminal());
        assert!(!CoordinatorPhase::Committing.is_terminal());
        assert!(!CoordinatorPhase::InDoubt.is_terminal());
    }

    #[test]
    fn test_forward_only() {
        assert!(CoordinatorPhase::Init.can_transition_to(CoordinatorPhase::Preparing));
        assert!(CoordinatorPhase::Preparing.can_transition_to(CoordinatorPhase::Aborted));
        assert!(CoordinatorPhase::Committing.can_transition_to(CoordinatorPhase::InDoubt));
        assert!(CoordinatorPhase::InDoubt.can_transition_to(CoordinatorPhase::Committed));

        assert!(!CoordinatorPhase::Prepared.can_transition_to(CoordinatorPhase::Preparing));
        assert!(!CoordinatorPhase::InDoubt.can_transition_to(CoordinatorPhase::Aborted));
        assert!(!CoordinatorPhase::Committed.can_transition_to(CoordinatorPhase::InDoubt));
        assert!(!CoordinatorPhase::Aborted.can_transition_to(CoordinatorPhase::Committed));
    }

    #[test]
    fn test_phase_from_ledger_status() {
        assert_eq!(
            CoordinatorPhase::from_ledger_status("PENDING"),
            Some(CoordinatorPhase::Prepared)
        );
        assert_eq!(
            CoordinatorPhase::from_ledger_status("committed"),
            Some(CoordinatorPhase::Committed)
        );
        assert_eq!(
            CoordinatorPhase::from_ledger_status("ABORTED"),
            Some(CoordinatorPhase::Aborted)
        );
        assert_eq!(CoordinatorPhase::from_ledger_status("VOID"), None);
    }

    #[test]
    fn test_display_matches_serde() {
        for phase in ALL {
            let json = serde_json::to_value(phase).unwrap();
            assert_eq!(json, phase.to_string());
            assert_eq!(phase.as_str().parse::<CoordinatorPhase>(), Ok(phase));
        }
        assert_eq!(CoordinatorPhase::InDoubt.to_string(), "IN_DOUBT");
    }
}
