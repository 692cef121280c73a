//! Failpoint Injection
//!
//! Deterministic fault hooks for the transfer protocol. The five checkpoint
//! names are a fixed vocabulary selectable from outside (test harness,
//! operator endpoint); renaming one is a breaking change.
//!
//! Test-only machinery: with nothing configured `assert_no_failure` always
//! returns `Ok(())`.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use super::error::TransferError;

/// Named point in the transfer protocol where a partition can be simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailPoint {
    BeforeCorePrepare,
    BeforeLedgerPrepare,
    /// Last point before any commit
    BeforeCommit,
    AfterCoreCommit,
    AfterLedgerCommit,
}

impl FailPoint {
    pub const ALL: [FailPoint; 5] = [
        FailPoint::BeforeCorePrepare,
        FailPoint::BeforeLedgerPrepare,
        FailPoint::BeforeCommit,
        FailPoint::AfterCoreCommit,
        FailPoint::AfterLedgerCommit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailPoint::BeforeCorePrepare => "BEFORE_CORE_PREPARE",
            FailPoint::BeforeLedgerPrepare => "BEFORE_LEDGER_PREPARE",
            FailPoint::BeforeCommit => "BEFORE_COMMIT",
            FailPoint::AfterCoreCommit => "AFTER_CORE_COMMIT",
            FailPoint::AfterLedgerCommit => "AFTER_LEDGER_COMMIT",
        }
    }
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailPoint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailPoint::ALL
            .into_iter()
            .find(|fp| fp.as_str() == s.trim())
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveFailPoint {
    fail_point: FailPoint,
    one_shot: bool,
}

/// Process-wide failpoint configuration, shared by all concurrent transfers
#[derive(Debug, Default)]
pub struct FailpointInjector {
    active: Mutex<Option<ActiveFailPoint>>,
}

impl FailpointInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every checkpoint name the injector understands
    pub fn available(&self) -> &'static [FailPoint] {
        &FailPoint::ALL
    }

    /// Arm a checkpoint. One-shot points clear themselves after firing once.
    pub fn set(&self, fail_point: FailPoint, one_shot: bool) {
        warn!(fail_point = %fail_point, one_shot, "Failpoint armed");
        *self.lock() = Some(ActiveFailPoint {
            fail_point,
            one_shot,
        });
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn active(&self) -> Option<FailPoint> {
        self.lock().map(|a| a.fail_point)
    }

    pub fn is_one_shot(&self) -> bool {
        self.lock().map(|a| a.one_shot).unwrap_or(true)
    }

    /// Fail with `PartitionSimulated(stage)` when either the process-wide
    /// checkpoint or the request's own checkpoint equals `stage`.
    pub fn assert_no_failure(
        &self,
        stage: FailPoint,
        request_fail_point: Option<FailPoint>,
    ) -> Result<(), TransferError> {
        let request_hit = request_fail_point == Some(stage);

        let global_hit = {
            let mut active = self.lock();
            match *active {
                Some(a) if a.fail_point == stage => {
                    if a.one_shot {
                        *active = None;
                    }
                    true
                }
                _ => false,
            }
        };

        if request_hit || global_hit {
            warn!(stage = %stage, request_hit, global_hit, "Simulating partition");
            return Err(TransferError::PartitionSimulated(stage));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveFailPoint>> {
        // A poisoned lock still holds a valid Option; keep serving it.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for fp in FailPoint::ALL {
            assert_eq!(fp.as_str().parse::<FailPoint>(), Ok(fp));
            assert_eq!(serde_json::to_value(fp).unwrap(), fp.as_str());
        }
        assert!("BEFORE_COMMITT".parse::<FailPoint>().is_err());
    }

    #[test]
    fn test_nothing_configured_never_fires() {
        let injector = FailpointInjector::new();
        for fp in FailPoint::ALL {
            assert!(injector.assert_no_failure(fp, None).is_ok());
        }
    }

    #[test]
    fn test_request_scoped_fires_only_at_its_stage() {
        let injector = FailpointInjector::new();
        let req = Some(FailPoint::BeforeCommit);

        assert!(injector.assert_no_failure(FailPoint::BeforeCorePrepare, req).is_ok());
        assert_eq!(
            injector.assert_no_failure(FailPoint::BeforeCommit, req),
            Err(TransferError::PartitionSimulated(FailPoint::BeforeCommit))
        );
        // request scope does not leak into the global config
        assert!(injector.assert_no_failure(FailPoint::BeforeCommit, None).is_ok());
    }

    #[test]
    fn test_one_shot_clears_after_firing() {
        let injector = FailpointInjector::new();
        injector.set(FailPoint::AfterCoreCommit, true);

        assert!(injector.assert_no_failure(FailPoint::BeforeCommit, None).is_ok());
        assert_eq!(injector.active(), Some(FailPoint::AfterCoreCommit));

        assert!(injector.assert_no_failure(FailPoint::AfterCoreCommit, None).is_err());
        assert_eq!(injector.active(), None);
        assert!(injector.assert_no_failure(FailPoint::AfterCoreCommit, None).is_ok());
    }

    #[test]
    fn test_persistent_keeps_firing() {
        let injector = FailpointInjector::new();
        injector.set(FailPoint::BeforeLedgerPrepare, false);

        for _ in 0..3 {
            assert!(injector
                .assert_no_failure(FailPoint::BeforeLedgerPrepare, None)
                .is_err());
        }
        assert!(!injector.is_one_shot());

        injector.clear();
        assert!(injector.assert_no_failure(FailPoint::BeforeLedgerPrepare, None).is_ok());
    }
}
