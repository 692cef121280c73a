//! Object-safe view of the coordinator
//!
//! The coordinator is generic over its two stores; the gateway and the
//! recovery worker only need its operations, so they hold an
//! `Arc<dyn TransferService>` and stay backend agnostic.

use std::sync::Arc;

use async_trait::async_trait;

use super::coordinator::TransferCoordinator;
use super::error::TransferError;
use super::failpoint::FailpointInjector;
use super::repository::{BalanceRepository, LedgerRepository};
use super::types::{
    HealthCheckResult, RecoveryResult, TransactionId, TransactionStatusResult, TransferRequest,
    TransferResult,
};

#[async_trait]
pub trait TransferService: Send + Sync {
    async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferResult, TransferError>;

    async fn get_transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> Result<TransactionStatusResult, TransferError>;

    async fn recover_transaction(&self, transaction_id: TransactionId) -> RecoveryResult;

    async fn health_check(&self) -> HealthCheckResult;

    fn in_doubt_ids(&self) -> Vec<TransactionId>;

    fn failpoints(&self) -> &Arc<FailpointInjector>;
}

#[async_trait]
impl<B, L> TransferService for TransferCoordinator<B, L>
where
    B: BalanceRepository + 'static,
    L: LedgerRepository + 'static,
{
    async fn execute_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<TransferResult, TransferError> {
        TransferCoordinator::execute_transfer(self, request).await
    }

    async fn get_transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> Result<TransactionStatusResult, TransferError> {
        TransferCoordinator::get_transaction_status(self, transaction_id).await
    }

    async fn recover_transaction(&self, transaction_id: TransactionId) -> RecoveryResult {
        TransferCoordinator::recover_transaction(self, transaction_id).await
    }

    async fn health_check(&self) -> HealthCheckResult {
        TransferCoordinator::health_check(self).await
    }

    fn in_doubt_ids(&self) -> Vec<TransactionId> {
        TransferCoordinator::in_doubt_ids(self)
    }

    fn failpoints(&self) -> &Arc<FailpointInjector> {
        TransferCoordinator::failpoints(self)
    }
}
