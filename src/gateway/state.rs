use std::sync::Arc;

use crate::transfer::{FailPoint, TransferService};

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    /// Transfer coordinator (backend agnostic)
    pub transfers: Arc<dyn TransferService>,
    /// Default checkpoint for transfers that name none
    pub simulate_failure: bool,
}

impl AppState {
    pub fn new(transfers: Arc<dyn TransferService>, simulate_failure: bool) -> Self {
        Self {
            transfers,
            simulate_failure,
        }
    }

    pub fn default_fail_point(&self) -> Option<FailPoint> {
        self.simulate_failure.then_some(FailPoint::BeforeCommit)
    }
}
