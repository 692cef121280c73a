//! Core balance store (PostgreSQL)
//!
//! `balances(acc_id uuid PRIMARY KEY, user_id text, amount numeric, updated_at timestamptz)`

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::error::TransferError;
use super::repository::{BalanceRepository, lock_order};
use super::types::TransferRequest;

pub struct PgBalanceRepository {
    pool: PgPool,
}

impl PgBalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

}

/// Accounts are uuid rows; compare them as uuids, not as request text.
fn parse_account_id(raw: &str) -> Result<Uuid, TransferError> {
    Uuid::parse_str(raw.trim()).map_err(|_| TransferError::AccountNotFound)
}

#[async_trait]
impl BalanceRepository for PgBalanceRepository {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, TransferError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError> {
        tx.rollback().await?;
        Ok(())
    }

    async fn prepare_transfer(
        &self,
        tx: &mut Self::Tx,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        if request.from_account_id == request.to_account_id {
            return Err(TransferError::validation(
                "Source and destination accounts must be different.",
            ));
        }

        let from = parse_account_id(&request.from_account_id)?;
        let to = parse_account_id(&request.to_account_id)?;
        if from == to {
            return Err(TransferError::validation(
                "Source and destination accounts must be different.",
            ));
        }

        // FOR UPDATE in uuid order: two transfers over the same pair in
        // opposite directions queue instead of deadlocking.
        let order: Vec<String> = lock_order(from, to).iter().map(Uuid::to_string).collect();

        let locked = sqlx::query(
            r#"
            SELECT acc_id::text AS acc_id, amount
            FROM balances
            WHERE acc_id = ANY($1::uuid[])
            ORDER BY acc_id
            FOR UPDATE
            "#,
        )
        .bind(&order)
        .fetch_all(&mut **tx)
        .await?;

        if locked.len() != 2 {
            return Err(TransferError::AccountNotFound);
        }

        let mut source_balance = None;
        for row in &locked {
            let acc_id: String = row.try_get("acc_id")?;
            if parse_account_id(&acc_id)? == from {
                source_balance = Some(row.try_get::<Decimal, _>("amount")?);
            }
        }
        let source_balance = source_balance.ok_or(TransferError::AccountNotFound)?;

        if source_balance < request.amount {
            return Err(TransferError::InsufficientFunds);
        }

        let debit = sqlx::query(
            r#"
            UPDATE balances
            SET amount = amount - $1, updated_at = NOW()
            WHERE acc_id = $2::uuid
              AND amount >= $1
            "#,
        )
        .bind(request.amount)
        .bind(from.to_string())
        .execute(&mut **tx)
        .await?;

        if debit.rows_affected() != 1 {
            return Err(TransferError::InsufficientFunds);
        }

        let credit = sqlx::query(
            r#"
            UPDATE balances
            SET amount = amount + $1, updated_at = NOW()
            WHERE acc_id = $2::uuid
            "#,
        )
        .bind(request.amount)
        .bind(to.to_string())
        .execute(&mut **tx)
        .await?;

        if credit.rows_affected() != 1 {
            return Err(TransferError::AccountNotFound);
        }

        debug!(
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = %request.amount,
            "Core balances prepared"
        );
        Ok(())
    }

    async fn get_balance(&self, account_id: &str) -> Result<Option<Decimal>, TransferError> {
        let amount = sqlx::query_scalar::<_, Decimal>(
            "SELECT amount FROM balances WHERE acc_id = $1::uuid",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(amount)
    }

    async fn ping(&self) -> Result<(), TransferError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
